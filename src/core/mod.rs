//! # Core Codec Components
//!
//! The PackStream format table, value model, decoder and encoder.
//!
//! ## Components
//! - **Marker**: marker bytes, size classes and value kinds
//! - **Value**: the closed set of values the format carries
//! - **Decoder**: bytes to values, with non-consuming lookahead
//! - **Encoder**: values to bytes, narrowest header first, sized or streamed
//! - **Codec**: `tokio_util` framing adapter over `BytesMut`
//!
//! ## Wire Format
//! ```text
//! [Marker(1)] [Size(0|1|2|4)] [Payload(N)]
//! ```
//! All multi-byte integers are big-endian.
//!
//! ## Security
//! - Nesting depth bounded by configuration (default 256)
//! - Declared sizes validated before allocation

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod value;
