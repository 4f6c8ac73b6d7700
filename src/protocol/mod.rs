//! # Message Dispatch
//!
//! The layer above the codec: it expects each inbound value to be a Struct,
//! resolves the struct tag through a caller-owned [`message::MessageTable`],
//! and routes the resulting [`message::Message`] to a registered handler.

pub mod dispatcher;
pub mod message;
