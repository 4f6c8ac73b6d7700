//! # PackStream
//!
//! A binary codec for the PackStream value model: null, boolean, integer,
//! float, bytes, text, list, map and tagged struct, as carried beneath
//! Bolt-style request/response protocols.
//!
//! ## Layout
//! - [`core`]: format table, value model, decoder, encoder, framing codec
//! - [`protocol`]: message table and dispatcher consuming decoded structs
//! - [`config`]: codec limits and logging settings
//! - [`error`]: the crate error type
//!
//! ## Example
//! ```rust
//! use packstream::{Kind, Structure, Value};
//!
//! let run = Value::from(Structure::new(0x10, vec![Value::from("RETURN 1")]));
//! let bytes = packstream::to_vec(&run)?;
//!
//! let mut decoder = packstream::Decoder::new(&bytes[..]);
//! assert_eq!(decoder.peek_kind()?, Kind::Struct);
//! assert_eq!(decoder.decode()?, run);
//! # Ok::<(), packstream::PackStreamError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use crate::config::{CodecConfig, PackStreamConfig};
pub use crate::core::codec::ValueCodec;
pub use crate::core::decoder::{from_slice, from_slice_exact, from_slice_with_config, Decoder};
pub use crate::core::encoder::{encode, to_vec, to_vec_with_config, Encoder};
pub use crate::core::marker::Kind;
pub use crate::core::value::{Structure, Value};
pub use crate::error::{PackStreamError, Result};
