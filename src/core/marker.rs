//! # Format Table
//!
//! Marker bytes, size-class boundaries and the value-kind enumeration.
//!
//! ```text
//! 0x00..=0x7F  tiny int (value itself)     0xC8..=0xCB  Int8/16/32/64
//! 0x80..=0x8F  tiny text (len in nibble)   0xCC..=0xCE  Bytes8/16/32
//! 0x90..=0x9F  tiny list                   0xD0..=0xD2  String8/16/32
//! 0xA0..=0xAF  tiny map                    0xD4..=0xD7  List8/16/32, ListStream
//! 0xB0..=0xBF  tiny struct                 0xD8..=0xDB  Map8/16/32, MapStream
//! 0xC0 null, 0xC1 float, 0xC2/C3 bool      0xDC/0xDD    Struct8/16
//! 0xF0..=0xFF  tiny int (negative)         0xDF         EndOfStream
//! ```
//!
//! The table is immutable process-wide state; every lookup is a pure match.

use crate::error::{PackStreamError, Result};
use std::fmt;

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;
pub const LIST_STREAM: u8 = 0xD7;

pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;
pub const MAP_STREAM: u8 = 0xDB;

pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

pub const END_OF_STREAM: u8 = 0xDF;

// High nibbles of the tiny families; the low nibble carries the size.
pub const TINY_STRING: u8 = 0x80;
pub const TINY_LIST: u8 = 0x90;
pub const TINY_MAP: u8 = 0xA0;
pub const TINY_STRUCT: u8 = 0xB0;

pub const HIGH_NIBBLE: u8 = 0xF0;
pub const LOW_NIBBLE: u8 = 0x0F;

/// Largest size a tiny marker can carry in its low nibble.
pub const MAX_TINY_SIZE: usize = 15;

pub const MIN_TINY_INT: i64 = -16;
pub const MAX_TINY_INT: i64 = 127;

/// Struct field counts never use a 32-bit header.
pub const MAX_STRUCT_FIELDS: usize = u16::MAX as usize;

/// Largest length any 32-bit size header can declare.
pub const MAX_SIZED_LEN: usize = u32::MAX as usize;

/// The shape of a value, as seen from its marker byte alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Float,
    Bytes,
    Text,
    List,
    Map,
    Struct,
}

impl Kind {
    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "Null",
            Kind::Bool => "Bool",
            Kind::Int => "Int",
            Kind::Float => "Float",
            Kind::Bytes => "Bytes",
            Kind::Text => "Text",
            Kind::List => "List",
            Kind::Map => "Map",
            Kind::Struct => "Struct",
        }
    }

    /// Largest element count (or byte length) this kind can declare on the wire.
    pub fn max_len(self) -> usize {
        match self {
            Kind::Struct => MAX_STRUCT_FIELDS,
            _ => MAX_SIZED_LEN,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width of the size header in front of a sized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Size lives in the marker's low nibble.
    Tiny,
    Bits8,
    Bits16,
    Bits32,
}

impl SizeClass {
    /// Number of header bytes following the marker.
    pub fn header_len(self) -> usize {
        match self {
            SizeClass::Tiny => 0,
            SizeClass::Bits8 => 1,
            SizeClass::Bits16 => 2,
            SizeClass::Bits32 => 4,
        }
    }

    /// Pick the narrowest class able to declare `len` for `kind`.
    ///
    /// Bytes has no tiny class; Struct has no 32-bit class.
    pub fn select(kind: Kind, len: usize) -> Result<Self> {
        let has_tiny = matches!(kind, Kind::Text | Kind::List | Kind::Map | Kind::Struct);
        if has_tiny && len <= MAX_TINY_SIZE {
            return Ok(SizeClass::Tiny);
        }
        if len <= u8::MAX as usize {
            return Ok(SizeClass::Bits8);
        }
        if len <= u16::MAX as usize {
            return Ok(SizeClass::Bits16);
        }
        if kind != Kind::Struct && len <= MAX_SIZED_LEN {
            return Ok(SizeClass::Bits32);
        }
        Err(PackStreamError::SizeLimitExceeded {
            kind,
            size: len as u64,
            limit: kind.max_len() as u64,
        })
    }

    /// Marker byte announcing this class for `kind`, or `None` for pairs the
    /// format does not define.
    ///
    /// For [`SizeClass::Tiny`] the returned byte is the family's high nibble;
    /// the caller ORs the size into it.
    pub fn marker_for(self, kind: Kind) -> Option<u8> {
        let marker = match (kind, self) {
            (Kind::Bytes, SizeClass::Bits8) => BYTES_8,
            (Kind::Bytes, SizeClass::Bits16) => BYTES_16,
            (Kind::Bytes, SizeClass::Bits32) => BYTES_32,
            (Kind::Text, SizeClass::Tiny) => TINY_STRING,
            (Kind::Text, SizeClass::Bits8) => STRING_8,
            (Kind::Text, SizeClass::Bits16) => STRING_16,
            (Kind::Text, SizeClass::Bits32) => STRING_32,
            (Kind::List, SizeClass::Tiny) => TINY_LIST,
            (Kind::List, SizeClass::Bits8) => LIST_8,
            (Kind::List, SizeClass::Bits16) => LIST_16,
            (Kind::List, SizeClass::Bits32) => LIST_32,
            (Kind::Map, SizeClass::Tiny) => TINY_MAP,
            (Kind::Map, SizeClass::Bits8) => MAP_8,
            (Kind::Map, SizeClass::Bits16) => MAP_16,
            (Kind::Map, SizeClass::Bits32) => MAP_32,
            (Kind::Struct, SizeClass::Tiny) => TINY_STRUCT,
            (Kind::Struct, SizeClass::Bits8) => STRUCT_8,
            (Kind::Struct, SizeClass::Bits16) => STRUCT_16,
            _ => return None,
        };
        Some(marker)
    }
}

/// How a marker byte introduces the value behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Null,
    Bool(bool),
    /// Tiny int; the marker is the value.
    TinyInt(i8),
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    /// Size carried inline by a tiny marker.
    Tiny(Kind, u8),
    /// Size carried by an explicit big-endian header of the given class.
    Sized(Kind, SizeClass),
    ListStream,
    MapStream,
    EndOfStream,
}

impl Header {
    /// The value kind this header dispatches to. `None` for EndOfStream.
    pub fn kind(self) -> Option<Kind> {
        match self {
            Header::Null => Some(Kind::Null),
            Header::Bool(_) => Some(Kind::Bool),
            Header::TinyInt(_)
            | Header::Int8
            | Header::Int16
            | Header::Int32
            | Header::Int64 => Some(Kind::Int),
            Header::Float => Some(Kind::Float),
            Header::Tiny(kind, _) | Header::Sized(kind, _) => Some(kind),
            Header::ListStream => Some(Kind::List),
            Header::MapStream => Some(Kind::Map),
            Header::EndOfStream => None,
        }
    }
}

/// Classify a marker byte. Returns `None` for bytes the format leaves undefined.
pub fn header_of(marker: u8) -> Option<Header> {
    // Tiny ints occupy both ends of the byte range.
    if marker <= 0x7F || marker >= 0xF0 {
        return Some(Header::TinyInt(marker as i8));
    }

    let size = marker & LOW_NIBBLE;
    match marker & HIGH_NIBBLE {
        TINY_STRING => return Some(Header::Tiny(Kind::Text, size)),
        TINY_LIST => return Some(Header::Tiny(Kind::List, size)),
        TINY_MAP => return Some(Header::Tiny(Kind::Map, size)),
        TINY_STRUCT => return Some(Header::Tiny(Kind::Struct, size)),
        _ => {}
    }

    let header = match marker {
        NULL => Header::Null,
        FLOAT_64 => Header::Float,
        FALSE => Header::Bool(false),
        TRUE => Header::Bool(true),
        INT_8 => Header::Int8,
        INT_16 => Header::Int16,
        INT_32 => Header::Int32,
        INT_64 => Header::Int64,
        BYTES_8 => Header::Sized(Kind::Bytes, SizeClass::Bits8),
        BYTES_16 => Header::Sized(Kind::Bytes, SizeClass::Bits16),
        BYTES_32 => Header::Sized(Kind::Bytes, SizeClass::Bits32),
        STRING_8 => Header::Sized(Kind::Text, SizeClass::Bits8),
        STRING_16 => Header::Sized(Kind::Text, SizeClass::Bits16),
        STRING_32 => Header::Sized(Kind::Text, SizeClass::Bits32),
        LIST_8 => Header::Sized(Kind::List, SizeClass::Bits8),
        LIST_16 => Header::Sized(Kind::List, SizeClass::Bits16),
        LIST_32 => Header::Sized(Kind::List, SizeClass::Bits32),
        LIST_STREAM => Header::ListStream,
        MAP_8 => Header::Sized(Kind::Map, SizeClass::Bits8),
        MAP_16 => Header::Sized(Kind::Map, SizeClass::Bits16),
        MAP_32 => Header::Sized(Kind::Map, SizeClass::Bits32),
        MAP_STREAM => Header::MapStream,
        STRUCT_8 => Header::Sized(Kind::Struct, SizeClass::Bits8),
        STRUCT_16 => Header::Sized(Kind::Struct, SizeClass::Bits16),
        END_OF_STREAM => Header::EndOfStream,
        _ => return None,
    };
    Some(header)
}

/// Kind a marker would dispatch to, without looking at anything after it.
pub fn kind_of(marker: u8) -> Option<Kind> {
    header_of(marker).and_then(Header::kind)
}
