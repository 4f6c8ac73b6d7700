//! # Value Codec
//!
//! [`tokio_util::codec`] adapter that frames a byte stream as a sequence of
//! PackStream values. PackStream is self-delimiting, so no length prefix is
//! added: a value ends where its encoding ends.
//!
//! The adapter owns no transport; it only turns a [`BytesMut`] buffer into
//! values and back. A buffer holding only a prefix of a value yields
//! `Ok(None)` and is left untouched until more bytes arrive. The length the
//! truncated parse asked for is remembered, so a large value arriving in
//! small reads is not re-parsed on every read.
//!
//! A failed encode leaves the destination buffer as it was.

use crate::config::CodecConfig;
use crate::core::decoder::Decoder as ValueReader;
use crate::core::encoder::Encoder as ValueWriter;
use crate::core::value::Value;
use crate::error::{PackStreamError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames PackStream values over a byte stream.
#[derive(Debug, Clone, Default)]
pub struct ValueCodec {
    config: CodecConfig,
    /// Buffer length below which the pending value cannot be complete.
    awaiting: usize,
}

impl ValueCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            config,
            awaiting: 0,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl Decoder for ValueCodec {
    type Item = Value;
    type Error = PackStreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() || src.len() < self.awaiting {
            return Ok(None);
        }

        let mut reader = ValueReader::with_config(&src[..], &self.config);
        match reader.decode() {
            Ok(value) => {
                let consumed = reader.position() as usize;
                src.advance(consumed);
                self.awaiting = 0;
                Ok(Some(value))
            }
            // Only a prefix has arrived; wait until at least the missing bytes have.
            Err(PackStreamError::TruncatedInput { offset, needed }) => {
                self.awaiting = (offset as usize).saturating_add(needed);
                Ok(None)
            }
            Err(e) => {
                self.awaiting = 0;
                Err(e)
            }
        }
    }
}

impl Encoder<Value> for ValueCodec {
    type Error = PackStreamError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        let mut writer = ValueWriter::with_config((&mut *dst).writer(), &self.config);
        let result = writer.encode(&item);
        if result.is_err() {
            dst.truncate(start);
        }
        result
    }
}
