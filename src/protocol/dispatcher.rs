use crate::config::CodecConfig;
use crate::core::decoder::Decoder;
use crate::core::encoder::to_vec_with_config;
use crate::core::marker::Kind;
use crate::error::{constants, PackStreamError, Result};
use crate::protocol::message::{Message, MessageTable};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

type HandlerFn = dyn Fn(&Message) -> Result<Message> + Send + Sync + 'static;

/// Message dispatcher routing decoded structs to handlers by message name.
///
/// The tag-to-name table is supplied by the caller and owned by the dispatcher;
/// there is no process-wide registry.
pub struct Dispatcher {
    table: MessageTable,
    handlers: Arc<RwLock<HashMap<Cow<'static, str>, Arc<HandlerFn>>>>,
    config: CodecConfig,
}

impl Dispatcher {
    pub fn new(table: MessageTable) -> Self {
        Self::with_config(table, CodecConfig::default())
    }

    pub fn with_config(table: MessageTable, config: CodecConfig) -> Self {
        Self {
            table,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn table(&self) -> &MessageTable {
        &self.table
    }

    /// Register `handler` for the message called `name`. The name must be in the table.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&Message) -> Result<Message> + Send + Sync + 'static,
    {
        if self.table.tag_of(name).is_none() {
            return Err(PackStreamError::UnknownMessageName(name.to_string()));
        }

        let mut handlers = self.handlers.write().map_err(|_| {
            PackStreamError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.insert(Cow::Owned(name.to_string()), Arc::new(handler));
        Ok(())
    }

    /// Run the handler registered for `msg`. The handler runs without the
    /// registry lock held, so it may register handlers itself.
    pub fn dispatch(&self, msg: &Message) -> Result<Message> {
        let handler = {
            let handlers = self.handlers.read().map_err(|_| {
                PackStreamError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
            })?;
            handlers
                .get(msg.name.as_ref())
                .cloned()
                .ok_or_else(|| PackStreamError::NoHandler(msg.name.to_string()))?
        };

        debug!(tag = msg.tag, name = %msg.name, fields = msg.fields.len(), "dispatching message");
        handler(msg)
    }

    /// Decode one inbound message. The top-level value must be a Struct with a known tag.
    pub fn decode_message(&self, bytes: &[u8]) -> Result<Message> {
        let mut decoder = Decoder::with_config(bytes, &self.config);
        let kind = decoder.peek_kind()?;
        if kind != Kind::Struct {
            return Err(PackStreamError::UnexpectedMessage(kind));
        }

        let structure = decoder
            .decode()?
            .into_struct()
            .ok_or(PackStreamError::UnexpectedMessage(kind))?;
        let tag = structure.tag;
        Message::from_structure(&self.table, structure).map_err(|e| {
            warn!(tag, "unknown message tag");
            e
        })
    }

    /// Encode an outbound message.
    pub fn encode_message(&self, msg: Message) -> Result<Vec<u8>> {
        to_vec_with_config(&msg.into_value(), &self.config)
    }

    /// Decode a request, run its handler and encode the reply.
    pub fn dispatch_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let request = self.decode_message(bytes)?;
        let reply = self.dispatch(&request)?;
        self.encode_message(reply)
    }
}
