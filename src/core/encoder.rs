//! # Encoder
//!
//! Writes PackStream values to any [`Write`] sink, always choosing the
//! narrowest header that represents the value:
//!
//! - Ints: tiny inline, then Int8, Int16, Int32, Int64
//! - Sized kinds: tiny (Text, List, Map, Struct only), then 8, 16 and 32-bit
//!   headers (Struct stops at 16-bit)
//!
//! Lists and maps whose length is not known up front can be written as
//! streams instead: [`Encoder::begin_list_stream`] or
//! [`Encoder::begin_map_stream`], any number of elements, then
//! [`Encoder::end_stream`]. Decoders do not distinguish the two forms.
//!
//! ## Usage
//! ```rust
//! use packstream::{Encoder, Value};
//!
//! let mut encoder = Encoder::new(Vec::new());
//! encoder.begin_list_stream()?;
//! for i in 0..3 {
//!     encoder.encode(&Value::Int(i))?;
//! }
//! encoder.end_stream()?;
//!
//! let bytes = encoder.into_inner();
//! assert_eq!(bytes, vec![0xD7, 0x00, 0x01, 0x02, 0xDF]);
//! assert_eq!(
//!     packstream::from_slice(&bytes)?,
//!     Value::from(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
//! );
//! # Ok::<(), packstream::PackStreamError>(())
//! ```

use crate::config::CodecConfig;
use crate::core::marker::{self, Kind, SizeClass};
use crate::core::value::{Structure, Value};
use crate::error::{constants, PackStreamError, Result};
use std::borrow::Borrow;
use std::io::Write;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenStream {
    List,
    Map,
}

/// Streaming PackStream encoder.
pub struct Encoder<W> {
    writer: W,
    streams: Vec<OpenStream>,
    config: CodecConfig,
}

impl<W: Write> Encoder<W> {
    /// Encoder with default limits.
    pub fn new(writer: W) -> Self {
        Self::with_config(writer, &CodecConfig::default())
    }

    /// Encoder with the given limits. `max_depth` is clamped to
    /// [`MAX_DEPTH_CEILING`](crate::config::MAX_DEPTH_CEILING).
    pub fn with_config(writer: W, config: &CodecConfig) -> Self {
        Self {
            writer,
            streams: Vec::new(),
            config: CodecConfig {
                max_depth: config.effective_max_depth(),
                ..config.clone()
            },
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Number of streams opened and not yet ended.
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Encode one complete value.
    ///
    /// Inside a list stream this writes the next element. Inside a map stream
    /// use [`Encoder::write_map_entry`] instead.
    ///
    /// Size and depth limits are checked over the whole value before the
    /// first byte is written, so a limit error leaves the sink untouched.
    pub fn encode(&mut self, value: &Value) -> Result<()> {
        if self.streams.last() == Some(&OpenStream::Map) {
            return Err(PackStreamError::StreamMismatch(
                constants::ERR_BARE_VALUE_IN_MAP_STREAM,
            ));
        }
        self.check_limits(value)?;
        self.write_value(value)
    }

    /// Write a list stream marker. Elements follow via [`Encoder::encode`].
    pub fn begin_list_stream(&mut self) -> Result<()> {
        self.open_stream(OpenStream::List, marker::LIST_STREAM)
    }

    /// Write a map stream marker. Pairs follow via [`Encoder::write_map_entry`].
    pub fn begin_map_stream(&mut self) -> Result<()> {
        self.open_stream(OpenStream::Map, marker::MAP_STREAM)
    }

    /// Write one key/value pair into the innermost open map stream.
    pub fn write_map_entry(&mut self, key: &str, value: &Value) -> Result<()> {
        if self.streams.last() != Some(&OpenStream::Map) {
            return Err(PackStreamError::StreamMismatch(
                constants::ERR_ENTRY_OUTSIDE_MAP_STREAM,
            ));
        }
        SizeClass::select(Kind::Text, key.len())?;
        self.check_limits(value)?;
        self.write_text(key)?;
        self.write_value(value)
    }

    /// Terminate the innermost open stream.
    pub fn end_stream(&mut self) -> Result<()> {
        let stream = self
            .streams
            .pop()
            .ok_or(PackStreamError::StreamMismatch(constants::ERR_NO_OPEN_STREAM))?;
        self.write_all(&[marker::END_OF_STREAM])?;
        trace!(?stream, depth = self.streams.len(), "stream closed");
        Ok(())
    }

    /// Write every item of `items` as one list stream.
    pub fn encode_list_stream<I, V>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        self.begin_list_stream()?;
        for item in items {
            self.encode(item.borrow())?;
        }
        self.end_stream()
    }

    /// Write every pair of `entries` as one map stream.
    pub fn encode_map_stream<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Borrow<Value>,
    {
        self.begin_map_stream()?;
        for (key, value) in entries {
            self.write_map_entry(key.as_ref(), value.borrow())?;
        }
        self.end_stream()
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_all(&[marker::NULL])
    }

    pub fn write_bool(&mut self, b: bool) -> Result<()> {
        self.write_all(&[if b { marker::TRUE } else { marker::FALSE }])
    }

    /// Write an integer in the narrowest representation that holds it exactly.
    pub fn write_int(&mut self, i: i64) -> Result<()> {
        if (marker::MIN_TINY_INT..=marker::MAX_TINY_INT).contains(&i) {
            // Two's-complement low byte is the marker itself.
            return self.write_all(&[i as u8]);
        }
        if let Ok(v) = i8::try_from(i) {
            return self.write_all(&[marker::INT_8, v as u8]);
        }
        if let Ok(v) = i16::try_from(i) {
            self.write_all(&[marker::INT_16])?;
            return self.write_all(&v.to_be_bytes());
        }
        if let Ok(v) = i32::try_from(i) {
            self.write_all(&[marker::INT_32])?;
            return self.write_all(&v.to_be_bytes());
        }
        self.write_all(&[marker::INT_64])?;
        self.write_all(&i.to_be_bytes())
    }

    pub fn write_float(&mut self, f: f64) -> Result<()> {
        self.write_all(&[marker::FLOAT_64])?;
        self.write_all(&f.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_header(Kind::Bytes, bytes.len())?;
        self.write_all(bytes)
    }

    /// Write text; its size is the UTF-8 byte length, not the character count.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.write_header(Kind::Text, text.len())?;
        self.write_all(text.as_bytes())
    }

    /// Write a sized list header. Exactly `len` values must follow.
    pub fn write_list_header(&mut self, len: usize) -> Result<()> {
        self.write_header(Kind::List, len)
    }

    /// Write a sized map header. Exactly `len` key/value pairs must follow.
    pub fn write_map_header(&mut self, len: usize) -> Result<()> {
        self.write_header(Kind::Map, len)
    }

    /// Write a struct header and its tag. Exactly `fields` values must follow.
    pub fn write_struct_header(&mut self, tag: u8, fields: usize) -> Result<()> {
        self.write_header(Kind::Struct, fields)?;
        self.write_all(&[tag])
    }

    fn open_stream(&mut self, stream: OpenStream, marker: u8) -> Result<()> {
        if self.streams.last() == Some(&OpenStream::Map) {
            return Err(PackStreamError::StreamMismatch(
                constants::ERR_BARE_VALUE_IN_MAP_STREAM,
            ));
        }
        let depth = self.streams.len() + 1;
        self.check_depth(depth)?;
        self.write_all(&[marker])?;
        self.streams.push(stream);
        trace!(?stream, depth, "stream opened");
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn write_header(&mut self, kind: Kind, len: usize) -> Result<()> {
        let class = SizeClass::select(kind, len)?;
        let marker = class
            .marker_for(kind)
            .ok_or(PackStreamError::SizeLimitExceeded {
                kind,
                size: len as u64,
                limit: kind.max_len() as u64,
            })?;
        match class {
            SizeClass::Tiny => self.write_all(&[marker | len as u8]),
            SizeClass::Bits8 => self.write_all(&[marker, len as u8]),
            SizeClass::Bits16 => {
                self.write_all(&[marker])?;
                self.write_all(&(len as u16).to_be_bytes())
            }
            SizeClass::Bits32 => {
                self.write_all(&[marker])?;
                self.write_all(&(len as u32).to_be_bytes())
            }
        }
    }

    /// Walk `value` without recursing and reject anything the wire cannot
    /// declare or that nests past the depth ceiling.
    fn check_limits(&self, value: &Value) -> Result<()> {
        let mut pending = vec![(value, self.streams.len())];
        while let Some((value, depth)) = pending.pop() {
            let depth = depth + 1;
            match value {
                Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {}
                Value::Bytes(bytes) => {
                    SizeClass::select(Kind::Bytes, bytes.len())?;
                }
                Value::Text(text) => {
                    SizeClass::select(Kind::Text, text.len())?;
                }
                Value::List(items) => {
                    SizeClass::select(Kind::List, items.len())?;
                    self.check_depth(depth)?;
                    pending.extend(items.iter().map(|item| (item, depth)));
                }
                Value::Map(map) => {
                    SizeClass::select(Kind::Map, map.len())?;
                    self.check_depth(depth)?;
                    for (key, item) in map {
                        SizeClass::select(Kind::Text, key.len())?;
                        pending.push((item, depth));
                    }
                }
                Value::Struct(s) => {
                    SizeClass::select(Kind::Struct, s.fields.len())?;
                    self.check_depth(depth)?;
                    pending.extend(s.fields.iter().map(|field| (field, depth)));
                }
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(PackStreamError::DepthLimitExceeded {
                depth,
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    /// Write an already checked value.
    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_null(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(i) => self.write_int(*i),
            Value::Float(f) => self.write_float(*f),
            Value::Bytes(bytes) => self.write_bytes(bytes),
            Value::Text(text) => self.write_text(text),
            Value::List(items) => {
                self.write_list_header(items.len())?;
                items.iter().try_for_each(|item| self.write_value(item))
            }
            Value::Map(map) => {
                self.write_map_header(map.len())?;
                for (key, item) in map {
                    self.write_text(key)?;
                    self.write_value(item)?;
                }
                Ok(())
            }
            Value::Struct(Structure { tag, fields }) => {
                self.write_struct_header(*tag, fields.len())?;
                fields.iter().try_for_each(|field| self.write_value(field))
            }
        }
    }
}

/// Encode `value` into `writer` with default limits.
pub fn encode<W: Write>(value: &Value, writer: W) -> Result<()> {
    Encoder::new(writer).encode(value)
}

/// Encode `value` into a fresh buffer.
pub fn to_vec(value: &Value) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new());
    encoder.encode(value)?;
    Ok(encoder.into_inner())
}

/// Encode `value` into a fresh buffer with the given limits.
pub fn to_vec_with_config(value: &Value, config: &CodecConfig) -> Result<Vec<u8>> {
    let mut encoder = Encoder::with_config(Vec::new(), config);
    encoder.encode(value)?;
    Ok(encoder.into_inner())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::collections::BTreeMap;
    use std::io;

    fn bytes_of(value: impl Into<Value>) -> Vec<u8> {
        to_vec(&value.into()).unwrap()
    }

    #[test]
    fn test_tiny_ints() {
        assert_eq!(bytes_of(-16i64), vec![0xF0]);
        assert_eq!(bytes_of(-1i64), vec![0xFF]);
        assert_eq!(bytes_of(0i64), vec![0x00]);
        assert_eq!(bytes_of(42i64), vec![0x2A]);
        assert_eq!(bytes_of(127i64), vec![0x7F]);
    }

    #[test]
    fn test_int_width_selection() {
        assert_eq!(bytes_of(-17i64), vec![0xC8, 0xEF]);
        assert_eq!(bytes_of(-128i64), vec![0xC8, 0x80]);
        assert_eq!(bytes_of(128i64), vec![0xC9, 0x00, 0x80]);
        assert_eq!(bytes_of(-129i64), vec![0xC9, 0xFF, 0x7F]);
        assert_eq!(bytes_of(32_767i64), vec![0xC9, 0x7F, 0xFF]);
        assert_eq!(bytes_of(32_768i64), vec![0xCA, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(
            bytes_of(i64::from(i32::MIN)),
            vec![0xCA, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes_of(2_147_483_648i64),
            vec![0xCB, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes_of(i64::MIN),
            vec![0xCB, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_float_is_big_endian() {
        assert_eq!(
            bytes_of(1.1),
            vec![0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]
        );
    }

    #[test]
    fn test_fixed_markers() {
        assert_eq!(bytes_of(Value::Null), vec![0xC0]);
        assert_eq!(bytes_of(true), vec![0xC3]);
        assert_eq!(bytes_of(false), vec![0xC2]);
    }

    #[test]
    fn test_text_tiny_boundary() {
        let fifteen = "a".repeat(15);
        let out = bytes_of(fifteen.as_str());
        assert_eq!(out[0], 0x8F);
        assert_eq!(out.len(), 16);

        let sixteen = "a".repeat(16);
        let out = bytes_of(sixteen.as_str());
        assert_eq!(&out[..2], &[0xD0, 0x10]);
        assert_eq!(out.len(), 18);
    }

    #[test]
    fn test_text_length_counts_bytes() {
        // Five characters, ten UTF-8 bytes.
        let out = bytes_of("ééééé");
        assert_eq!(out[0], 0x8A);
    }

    #[test]
    fn test_bytes_always_sized() {
        assert_eq!(bytes_of(Vec::<u8>::new()), vec![0xCC, 0x00]);
        assert_eq!(bytes_of(vec![1u8, 2]), vec![0xCC, 0x02, 0x01, 0x02]);
        let out = bytes_of(vec![0u8; 256]);
        assert_eq!(&out[..3], &[0xCD, 0x01, 0x00]);
        let out = bytes_of(vec![0u8; 65_536]);
        assert_eq!(&out[..5], &[0xCE, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_collection_headers() {
        assert_eq!(bytes_of(Value::List(vec![])), vec![0x90]);
        assert_eq!(bytes_of(Value::Map(BTreeMap::new())), vec![0xA0]);

        let list: Value = (0..16).map(Value::Int).collect();
        assert_eq!(&bytes_of(list)[..2], &[0xD4, 0x10]);

        let list: Value = (0..256).map(Value::Int).collect();
        assert_eq!(&bytes_of(list)[..3], &[0xD5, 0x01, 0x00]);
    }

    #[test]
    fn test_map_writes_key_then_value() {
        let map: Value = [("a".to_string(), Value::Int(1))].into_iter().collect();
        assert_eq!(bytes_of(map), vec![0xA1, 0x81, b'a', 0x01]);
    }

    #[test]
    fn test_struct_headers() {
        let s = Structure::new(0x70, vec![Value::Int(1)]);
        assert_eq!(bytes_of(s), vec![0xB1, 0x70, 0x01]);

        let s = Structure::new(0x71, vec![Value::Null; 16]);
        assert_eq!(&bytes_of(s)[..3], &[0xDC, 0x10, 0x71]);

        let s = Structure::new(0x71, vec![Value::Null; 256]);
        assert_eq!(&bytes_of(s)[..4], &[0xDD, 0x01, 0x00, 0x71]);
    }

    #[test]
    fn test_struct_field_count_limit() {
        let s = Structure::new(0x01, vec![Value::Null; 65_536]);
        assert!(matches!(
            to_vec(&Value::Struct(s)),
            Err(PackStreamError::SizeLimitExceeded {
                kind: Kind::Struct,
                size: 65_536,
                limit: 65_535
            })
        ));
    }

    #[test]
    fn test_list_stream() {
        let mut encoder = Encoder::new(Vec::new());
        encoder
            .encode_list_stream([Value::Int(1), Value::from("x")])
            .unwrap();
        assert_eq!(encoder.into_inner(), vec![0xD7, 0x01, 0x81, b'x', 0xDF]);
    }

    #[test]
    fn test_map_stream() {
        let mut encoder = Encoder::new(Vec::new());
        encoder
            .encode_map_stream([("k", Value::Bool(true))])
            .unwrap();
        assert_eq!(encoder.into_inner(), vec![0xDB, 0x81, b'k', 0xC3, 0xDF]);
    }

    #[test]
    fn test_nested_streams() {
        let mut encoder = Encoder::new(Vec::new());
        encoder.begin_list_stream().unwrap();
        encoder.begin_list_stream().unwrap();
        assert_eq!(encoder.open_streams(), 2);
        encoder.end_stream().unwrap();
        encoder.end_stream().unwrap();
        assert_eq!(encoder.into_inner(), vec![0xD7, 0xD7, 0xDF, 0xDF]);
    }

    #[test]
    fn test_stream_misuse() {
        let mut encoder = Encoder::new(Vec::new());
        assert!(matches!(
            encoder.end_stream(),
            Err(PackStreamError::StreamMismatch(_))
        ));
        assert!(matches!(
            encoder.write_map_entry("k", &Value::Null),
            Err(PackStreamError::StreamMismatch(_))
        ));

        encoder.begin_map_stream().unwrap();
        assert!(matches!(
            encoder.encode(&Value::Null),
            Err(PackStreamError::StreamMismatch(_))
        ));
        assert!(matches!(
            encoder.begin_list_stream(),
            Err(PackStreamError::StreamMismatch(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let config = CodecConfig {
            max_depth: 2,
            ..CodecConfig::default()
        };
        let ok = Value::List(vec![Value::List(vec![])]);
        assert!(to_vec_with_config(&ok, &config).is_ok());

        let deep = Value::List(vec![ok]);
        assert!(matches!(
            to_vec_with_config(&deep, &config),
            Err(PackStreamError::DepthLimitExceeded { depth: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_limit_errors_leave_sink_untouched() {
        let config = CodecConfig {
            max_depth: 1,
            ..CodecConfig::default()
        };
        let mut encoder = Encoder::with_config(vec![0x01], &config);
        let nested = Value::List(vec![Value::List(vec![])]);
        assert!(matches!(
            encoder.encode(&nested),
            Err(PackStreamError::DepthLimitExceeded { depth: 2, limit: 1 })
        ));
        assert_eq!(encoder.get_ref(), &vec![0x01]);

        let oversized = Value::List(vec![
            Value::Int(1),
            Value::Struct(Structure::new(0x01, vec![Value::Null; 65_536])),
        ]);
        let mut encoder = Encoder::new(Vec::new());
        assert!(matches!(
            encoder.encode(&oversized),
            Err(PackStreamError::SizeLimitExceeded { kind: Kind::Struct, .. })
        ));
        assert!(encoder.get_ref().is_empty());

        encoder.begin_map_stream().unwrap();
        assert!(encoder.write_map_entry("k", &oversized).is_err());
        assert_eq!(encoder.get_ref(), &vec![0xDB]);
    }

    #[test]
    fn test_open_streams_count_toward_depth() {
        let config = CodecConfig {
            max_depth: 2,
            ..CodecConfig::default()
        };
        let mut encoder = Encoder::with_config(Vec::new(), &config);
        encoder.begin_list_stream().unwrap();
        encoder.encode(&Value::List(vec![])).unwrap();
        assert!(matches!(
            encoder.encode(&Value::List(vec![Value::List(vec![])])),
            Err(PackStreamError::DepthLimitExceeded { .. })
        ));
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_propagates() {
        match encode(&Value::Int(1), FailingSink) {
            Err(PackStreamError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
