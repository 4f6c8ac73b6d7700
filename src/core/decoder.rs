//! # Decoder
//!
//! Reads PackStream values from any [`BufRead`] source.
//!
//! One marker byte is read and classified through the format table, then the
//! matching reader consumes the payload. Compound values recurse through a
//! depth counter that is checked against [`CodecConfig::max_depth`] before any
//! child is read.
//!
//! [`Decoder::peek_kind`] inspects the next marker through `fill_buf` without
//! consuming it, so a caller can branch on the shape of a value before
//! committing to a full decode.
//!
//! ## Security
//! - Declared collection counts are checked against `max_collection_len`
//! - Declared payload lengths are checked against `max_payload_size`
//! - Payload buffers grow with the bytes that actually arrive, never with the
//!   declared length alone

use crate::config::CodecConfig;
use crate::core::marker::{self, Header, Kind, SizeClass};
use crate::core::value::{Structure, Value};
use crate::error::{PackStreamError, Result};
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use tracing::trace;

/// Upper bound on bytes reserved up front for a Bytes or Text payload.
const PREALLOC_LIMIT: usize = 8 * 1024;

/// Upper bound on elements reserved up front for a List or Struct.
const PREALLOC_ELEMENTS: usize = 32;

/// Streaming PackStream decoder.
pub struct Decoder<R> {
    reader: R,
    position: u64,
    depth: usize,
    config: CodecConfig,
}

impl<R: BufRead> Decoder<R> {
    /// Decoder with default limits.
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, &CodecConfig::default())
    }

    /// Decoder with the given limits. `max_depth` is clamped to
    /// [`MAX_DEPTH_CEILING`](crate::config::MAX_DEPTH_CEILING).
    pub fn with_config(reader: R, config: &CodecConfig) -> Self {
        Self {
            reader,
            position: 0,
            depth: 0,
            config: CodecConfig {
                max_depth: config.effective_max_depth(),
                ..config.clone()
            },
        }
    }

    /// Bytes consumed from the source so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Decode the next value from the source.
    pub fn decode(&mut self) -> Result<Value> {
        self.depth = 0;
        self.read_value()
    }

    /// Report the kind of the next value without consuming any byte.
    ///
    /// Only the marker is inspected; size headers are not validated.
    pub fn peek_kind(&mut self) -> Result<Kind> {
        let offset = self.position;
        let marker = self.peek_marker()?;
        let header =
            marker::header_of(marker).ok_or(PackStreamError::UnknownMarker { marker, offset })?;
        header
            .kind()
            .ok_or(PackStreamError::UnexpectedEndOfStream { offset })
    }

    /// Whether the source has no bytes left.
    pub fn is_exhausted(&mut self) -> Result<bool> {
        self.with_buffered(|available| available.is_empty())
    }

    /// Run `f` over the bytes currently buffered, refilling first if needed.
    /// An empty slice means the source is exhausted.
    fn with_buffered<T>(&mut self, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        loop {
            match self.reader.fill_buf() {
                Ok(available) => return Ok(f(available)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PackStreamError::Io(e)),
            }
        }
    }

    fn peek_marker(&mut self) -> Result<u8> {
        let offset = self.position;
        self.with_buffered(|available| available.first().copied())?
            .ok_or(PackStreamError::TruncatedInput { offset, needed: 1 })
    }

    fn consume(&mut self, n: usize) {
        self.reader.consume(n);
        self.position += n as u64;
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let rest = &mut buf[filled..];
            let n = self.with_buffered(|available| {
                let n = available.len().min(rest.len());
                rest[..n].copy_from_slice(&available[..n]);
                n
            })?;
            if n == 0 {
                return Err(PackStreamError::TruncatedInput {
                    offset: self.position,
                    needed: buf.len() - filled,
                });
            }
            self.consume(n);
            filled += n;
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    fn read_payload(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        while out.len() < len {
            let wanted = len - out.len();
            let n = self.with_buffered(|available| {
                let n = available.len().min(wanted);
                out.extend_from_slice(&available[..n]);
                n
            })?;
            if n == 0 {
                return Err(PackStreamError::TruncatedInput {
                    offset: self.position,
                    needed: wanted,
                });
            }
            self.consume(n);
        }
        Ok(out)
    }

    fn read_size(&mut self, class: SizeClass) -> Result<usize> {
        let size = match class {
            SizeClass::Tiny => 0,
            SizeClass::Bits8 => usize::from(self.read_u8()?),
            SizeClass::Bits16 => usize::from(u16::from_be_bytes(self.read_array()?)),
            SizeClass::Bits32 => u32::from_be_bytes(self.read_array()?) as usize,
        };
        Ok(size)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(PackStreamError::DepthLimitExceeded {
                depth: self.depth,
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn check_payload(&self, kind: Kind, len: usize) -> Result<()> {
        if len > self.config.max_payload_size {
            return Err(PackStreamError::SizeLimitExceeded {
                kind,
                size: len as u64,
                limit: self.config.max_payload_size as u64,
            });
        }
        Ok(())
    }

    fn check_collection(&self, kind: Kind, len: usize) -> Result<()> {
        if len > self.config.max_collection_len {
            return Err(PackStreamError::SizeLimitExceeded {
                kind,
                size: len as u64,
                limit: self.config.max_collection_len as u64,
            });
        }
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value> {
        let offset = self.position;
        let marker = self.read_u8()?;
        let header =
            marker::header_of(marker).ok_or(PackStreamError::UnknownMarker { marker, offset })?;

        match header {
            Header::Null => Ok(Value::Null),
            Header::Bool(b) => Ok(Value::Bool(b)),
            Header::TinyInt(i) => Ok(Value::Int(i64::from(i))),
            Header::Int8 => Ok(Value::Int(i64::from(i8::from_be_bytes(self.read_array()?)))),
            Header::Int16 => Ok(Value::Int(i64::from(i16::from_be_bytes(self.read_array()?)))),
            Header::Int32 => Ok(Value::Int(i64::from(i32::from_be_bytes(self.read_array()?)))),
            Header::Int64 => Ok(Value::Int(i64::from_be_bytes(self.read_array()?))),
            Header::Float => Ok(Value::Float(f64::from_be_bytes(self.read_array()?))),
            Header::Tiny(kind, size) => self.read_sized(kind, usize::from(size), marker, offset),
            Header::Sized(kind, class) => {
                let size = self.read_size(class)?;
                self.read_sized(kind, size, marker, offset)
            }
            Header::ListStream => self.read_list_stream(),
            Header::MapStream => self.read_map_stream(),
            Header::EndOfStream => Err(PackStreamError::UnexpectedEndOfStream { offset }),
        }
    }

    fn read_sized(&mut self, kind: Kind, size: usize, marker: u8, offset: u64) -> Result<Value> {
        match kind {
            Kind::Bytes => {
                self.check_payload(kind, size)?;
                Ok(Value::Bytes(self.read_payload(size)?))
            }
            Kind::Text => {
                self.check_payload(kind, size)?;
                let payload_offset = self.position;
                let bytes = self.read_payload(size)?;
                String::from_utf8(bytes).map(Value::Text).map_err(|_| {
                    PackStreamError::InvalidUtf8 {
                        offset: payload_offset,
                    }
                })
            }
            Kind::List => {
                self.check_collection(kind, size)?;
                self.enter()?;
                let mut items = Vec::with_capacity(size.min(PREALLOC_ELEMENTS));
                for _ in 0..size {
                    items.push(self.read_value()?);
                }
                self.leave();
                Ok(Value::List(items))
            }
            Kind::Map => {
                self.check_collection(kind, size)?;
                self.enter()?;
                let mut map = BTreeMap::new();
                for _ in 0..size {
                    let key = self.read_map_key()?;
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
                self.leave();
                Ok(Value::Map(map))
            }
            Kind::Struct => {
                self.check_collection(kind, size)?;
                self.enter()?;
                let tag = self.read_u8()?;
                let mut fields = Vec::with_capacity(size.min(PREALLOC_ELEMENTS));
                for _ in 0..size {
                    fields.push(self.read_value()?);
                }
                self.leave();
                Ok(Value::Struct(Structure { tag, fields }))
            }
            // The format table never attaches a size to scalar kinds.
            Kind::Null | Kind::Bool | Kind::Int | Kind::Float => {
                Err(PackStreamError::UnknownMarker { marker, offset })
            }
        }
    }

    fn read_map_key(&mut self) -> Result<String> {
        let offset = self.position;
        let marker = self.peek_marker()?;
        let header =
            marker::header_of(marker).ok_or(PackStreamError::UnknownMarker { marker, offset })?;
        match header.kind() {
            Some(Kind::Text) => {}
            Some(found) => return Err(PackStreamError::NonTextMapKey { found, offset }),
            None => return Err(PackStreamError::UnexpectedEndOfStream { offset }),
        }
        match self.read_value()? {
            Value::Text(key) => Ok(key),
            other => Err(PackStreamError::NonTextMapKey {
                found: other.kind(),
                offset,
            }),
        }
    }

    /// Consume an EndOfStream marker if it is next.
    fn end_of_stream(&mut self) -> Result<bool> {
        if self.peek_marker()? == marker::END_OF_STREAM {
            self.consume(1);
            return Ok(true);
        }
        Ok(false)
    }

    fn read_list_stream(&mut self) -> Result<Value> {
        self.enter()?;
        let mut items = Vec::new();
        while !self.end_of_stream()? {
            self.check_collection(Kind::List, items.len() + 1)?;
            items.push(self.read_value()?);
        }
        self.leave();
        trace!(elements = items.len(), "list stream closed");
        Ok(Value::List(items))
    }

    fn read_map_stream(&mut self) -> Result<Value> {
        self.enter()?;
        let mut map = BTreeMap::new();
        let mut pairs = 0usize;
        while !self.end_of_stream()? {
            pairs += 1;
            self.check_collection(Kind::Map, pairs)?;
            let key = self.read_map_key()?;
            let value = self.read_value()?;
            map.insert(key, value);
        }
        self.leave();
        trace!(pairs, "map stream closed");
        Ok(Value::Map(map))
    }
}

/// Decode the first value in `bytes` with default limits. Bytes after it are ignored.
pub fn from_slice(bytes: &[u8]) -> Result<Value> {
    Decoder::new(bytes).decode()
}

/// Decode the first value in `bytes` with the given limits.
pub fn from_slice_with_config(bytes: &[u8], config: &CodecConfig) -> Result<Value> {
    Decoder::with_config(bytes, config).decode()
}

/// Decode exactly one value; any bytes left after it are an error.
pub fn from_slice_exact(bytes: &[u8]) -> Result<Value> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode()?;
    let rest = decoder.get_ref();
    if !rest.is_empty() {
        return Err(PackStreamError::TrailingBytes {
            offset: decoder.position(),
            remaining: rest.len(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn decode(bytes: &[u8]) -> Result<Value> {
        from_slice(bytes)
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode(&[0xC0]).unwrap(), Value::Null);
        assert_eq!(decode(&[0xC2]).unwrap(), Value::Bool(false));
        assert_eq!(decode(&[0xC3]).unwrap(), Value::Bool(true));
        assert_eq!(decode(&[0x2A]).unwrap(), Value::Int(42));
        assert_eq!(decode(&[0xF0]).unwrap(), Value::Int(-16));
        assert_eq!(
            decode(&[0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]).unwrap(),
            Value::Float(1.1)
        );
    }

    #[test]
    fn test_ints_widen() {
        assert_eq!(decode(&[0xC8, 0xD6]).unwrap(), Value::Int(-42));
        assert_eq!(decode(&[0xC9, 0xFF, 0x7F]).unwrap(), Value::Int(-129));
        assert_eq!(
            decode(&[0xCA, 0x80, 0x00, 0x00, 0x00]).unwrap(),
            Value::Int(i64::from(i32::MIN))
        );
        assert_eq!(
            decode(&[0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            Value::Int(i64::MAX)
        );
    }

    #[test]
    fn test_bytes32_reads_four_byte_length() {
        let mut bytes = vec![0xCE, 0x00, 0x00, 0x00, 0x03];
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decode(&bytes).unwrap(), Value::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_struct_tag_then_fields() {
        let value = decode(&[0xB2, 0x70, 0x01, 0x81, b'a']).unwrap();
        assert_eq!(
            value,
            Value::Struct(Structure::new(0x70, vec![Value::Int(1), Value::from("a")]))
        );
    }

    #[test]
    fn test_map_duplicate_keys_last_wins() {
        let bytes = [0xA2, 0x81, b'k', 0x01, 0x81, b'k', 0x02];
        let value = decode(&bytes).unwrap();
        assert_eq!(value.as_map().unwrap().get("k"), Some(&Value::Int(2)));
        assert_eq!(value.as_map().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_streams() {
        assert_eq!(decode(&[0xD7, 0xDF]).unwrap(), Value::List(vec![]));
        assert_eq!(decode(&[0xDB, 0xDF]).unwrap(), Value::Map(BTreeMap::new()));
    }

    #[test]
    fn test_list_stream_elements() {
        let value = decode(&[0xD7, 0x01, 0x02, 0x90, 0xDF]).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::List(vec![])])
        );
    }

    #[test]
    fn test_nested_streams_terminate_independently() {
        let value = decode(&[0xD7, 0xD7, 0x01, 0xDF, 0x02, 0xDF]).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::List(vec![Value::Int(1)]), Value::Int(2)])
        );
    }

    #[test]
    fn test_truncated_int32() {
        match decode(&[0xCA]) {
            Err(PackStreamError::TruncatedInput { offset, needed }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_source_is_truncated() {
        assert!(matches!(
            decode(&[]),
            Err(PackStreamError::TruncatedInput { offset: 0, needed: 1 })
        ));
    }

    #[test]
    fn test_unterminated_stream_is_truncated() {
        assert!(decode(&[0xD7, 0x01]).unwrap_err().is_truncation());
    }

    #[test]
    fn test_unknown_marker() {
        assert!(matches!(
            decode(&[0x91, 0xC4]),
            Err(PackStreamError::UnknownMarker { marker: 0xC4, offset: 1 })
        ));
    }

    #[test]
    fn test_end_of_stream_outside_stream() {
        assert!(matches!(
            decode(&[0xDF]),
            Err(PackStreamError::UnexpectedEndOfStream { offset: 0 })
        ));
        assert!(matches!(
            decode(&[0x92, 0x01, 0xDF]),
            Err(PackStreamError::UnexpectedEndOfStream { offset: 2 })
        ));
    }

    #[test]
    fn test_end_of_stream_in_value_position_of_map_stream() {
        assert!(matches!(
            decode(&[0xDB, 0x81, b'k', 0xDF]),
            Err(PackStreamError::UnexpectedEndOfStream { offset: 3 })
        ));
    }

    #[test]
    fn test_non_text_map_key() {
        assert!(matches!(
            decode(&[0xA1, 0x01, 0x02]),
            Err(PackStreamError::NonTextMapKey { found: Kind::Int, offset: 1 })
        ));
        assert!(matches!(
            decode(&[0xDB, 0xC8, 0x05, 0x01, 0xDF]),
            Err(PackStreamError::NonTextMapKey { found: Kind::Int, offset: 1 })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            decode(&[0x82, 0xC3, 0x28]),
            Err(PackStreamError::InvalidUtf8 { offset: 1 })
        ));
    }

    #[test]
    fn test_collection_ceiling() {
        let config = CodecConfig {
            max_collection_len: 2,
            ..CodecConfig::default()
        };
        assert!(matches!(
            from_slice_with_config(&[0x93, 0x01, 0x02, 0x03], &config),
            Err(PackStreamError::SizeLimitExceeded { kind: Kind::List, size: 3, limit: 2 })
        ));
        assert!(matches!(
            from_slice_with_config(&[0xD7, 0x01, 0x02, 0x03, 0xDF], &config),
            Err(PackStreamError::SizeLimitExceeded { kind: Kind::List, size: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_payload_ceiling_checked_before_read() {
        let config = CodecConfig {
            max_payload_size: 4,
            ..CodecConfig::default()
        };
        // Claims 4 GiB of bytes with nothing behind it.
        assert!(matches!(
            from_slice_with_config(&[0xCE, 0xFF, 0xFF, 0xFF, 0xFF], &config),
            Err(PackStreamError::SizeLimitExceeded { kind: Kind::Bytes, .. })
        ));
    }

    #[test]
    fn test_depth_ceiling() {
        let config = CodecConfig {
            max_depth: 2,
            ..CodecConfig::default()
        };
        assert!(from_slice_with_config(&[0x91, 0x90], &config).is_ok());
        assert!(matches!(
            from_slice_with_config(&[0x91, 0x91, 0x90], &config),
            Err(PackStreamError::DepthLimitExceeded { depth: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let bytes = [0xB1, 0x70, 0xA0];
        let mut decoder = Decoder::new(&bytes[..]);
        assert_eq!(decoder.peek_kind().unwrap(), Kind::Struct);
        assert_eq!(decoder.peek_kind().unwrap(), Kind::Struct);
        assert_eq!(decoder.position(), 0);
        let value = decoder.decode().unwrap();
        assert_eq!(value.kind(), Kind::Struct);
        assert_eq!(decoder.position(), 3);
    }

    #[test]
    fn test_peek_skips_size_validation() {
        // A String32 marker with a truncated header still peeks as Text.
        let mut decoder = Decoder::new(&[0xD2, 0x00][..]);
        assert_eq!(decoder.peek_kind().unwrap(), Kind::Text);
        assert!(decoder.decode().unwrap_err().is_truncation());
    }

    #[test]
    fn test_peek_unknown_marker() {
        let mut decoder = Decoder::new(&[0xE5][..]);
        assert!(matches!(
            decoder.peek_kind(),
            Err(PackStreamError::UnknownMarker { marker: 0xE5, offset: 0 })
        ));
    }

    #[test]
    fn test_sequential_values() {
        let mut decoder = Decoder::new(&[0x01, 0x81, b'x', 0xC0][..]);
        assert_eq!(decoder.decode().unwrap(), Value::Int(1));
        assert_eq!(decoder.decode().unwrap(), Value::from("x"));
        assert_eq!(decoder.decode().unwrap(), Value::Null);
        assert!(decoder.is_exhausted().unwrap());
    }

    #[test]
    fn test_from_slice_exact_rejects_trailing_bytes() {
        assert!(matches!(
            from_slice_exact(&[0x01, 0x02]),
            Err(PackStreamError::TrailingBytes { offset: 1, remaining: 1 })
        ));
        assert_eq!(from_slice_exact(&[0x01]).unwrap(), Value::Int(1));
    }

    /// Source that reports `Interrupted` before every refill and counts refills.
    struct Flaky<'a> {
        data: &'a [u8],
        interrupt: bool,
        fills: usize,
    }

    impl io::Read for Flaky<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    impl BufRead for Flaky<'_> {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.fills += 1;
            Ok(&self.data[..self.data.len().min(2)])
        }

        fn consume(&mut self, amt: usize) {
            self.data = &self.data[amt..];
        }
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let bytes = crate::to_vec(&Value::from("hello")).unwrap();
        let mut decoder = Decoder::new(Flaky {
            data: &bytes,
            interrupt: false,
            fills: 0,
        });
        assert_eq!(decoder.peek_kind().unwrap(), Kind::Text);
        assert_eq!(decoder.decode().unwrap(), Value::from("hello"));
        assert!(decoder.is_exhausted().unwrap());

        // Peek, marker, three two-byte payload windows, then the exhaustion check.
        assert_eq!(decoder.get_ref().fills, 1 + 1 + 3 + 1);
    }
}
