//! # Protocol Messages
//!
//! A message is a top-level Struct whose tag byte names its type. The tag to
//! name mapping is owned by the caller as a [`MessageTable`]; the codec never
//! consults it.

use crate::core::value::{Structure, Value};
use crate::error::{PackStreamError, Result};
use std::borrow::Cow;
use std::collections::HashMap;

/// Struct tags of the Bolt v1 message set.
pub mod tags {
    pub const INIT: u8 = 0x01;
    pub const ACK_FAILURE: u8 = 0x0E;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const DISCARD_ALL: u8 = 0x2F;
    pub const PULL_ALL: u8 = 0x3F;
    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}

/// Mapping from struct tag to message name.
#[derive(Debug, Clone, Default)]
pub struct MessageTable {
    names: HashMap<u8, Cow<'static, str>>,
}

impl MessageTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the Bolt v1 request and response messages.
    pub fn bolt_v1() -> Self {
        let mut table = Self::new();
        for (tag, name) in [
            (tags::INIT, "INIT"),
            (tags::ACK_FAILURE, "ACK_FAILURE"),
            (tags::RESET, "RESET"),
            (tags::RUN, "RUN"),
            (tags::DISCARD_ALL, "DISCARD_ALL"),
            (tags::PULL_ALL, "PULL_ALL"),
            (tags::SUCCESS, "SUCCESS"),
            (tags::RECORD, "RECORD"),
            (tags::IGNORED, "IGNORED"),
            (tags::FAILURE, "FAILURE"),
        ] {
            table.insert(tag, name);
        }
        table
    }

    /// Map `tag` to `name`, returning the name it replaces.
    pub fn insert(
        &mut self,
        tag: u8,
        name: impl Into<Cow<'static, str>>,
    ) -> Option<Cow<'static, str>> {
        self.names.insert(tag, name.into())
    }

    pub fn name_of(&self, tag: u8) -> Option<&str> {
        self.names.get(&tag).map(|name| name.as_ref())
    }

    pub fn tag_of(&self, name: &str) -> Option<u8> {
        self.names
            .iter()
            .find(|(_, n)| n.as_ref() == name)
            .map(|(tag, _)| *tag)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn entry(&self, tag: u8) -> Option<Cow<'static, str>> {
        self.names.get(&tag).cloned()
    }
}

/// A decoded protocol message: a struct tag resolved to its name.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub tag: u8,
    pub name: Cow<'static, str>,
    pub fields: Vec<Value>,
}

impl Message {
    /// Build a message by name, looking its tag up in `table`.
    pub fn new(table: &MessageTable, name: &str, fields: Vec<Value>) -> Result<Self> {
        let tag = table
            .tag_of(name)
            .ok_or_else(|| PackStreamError::UnknownMessageName(name.to_string()))?;
        Ok(Self {
            tag,
            name: table.entry(tag).unwrap_or_else(|| Cow::Owned(name.to_string())),
            fields,
        })
    }

    /// Resolve a decoded struct against `table`.
    pub fn from_structure(table: &MessageTable, structure: Structure) -> Result<Self> {
        let name = table
            .entry(structure.tag)
            .ok_or(PackStreamError::UnknownMessageTag(structure.tag))?;
        Ok(Self {
            tag: structure.tag,
            name,
            fields: structure.fields,
        })
    }

    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn into_structure(self) -> Structure {
        Structure::new(self.tag, self.fields)
    }

    pub fn into_value(self) -> Value {
        Value::Struct(self.into_structure())
    }
}
