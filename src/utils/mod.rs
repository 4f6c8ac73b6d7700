//! # Utility Modules
//!
//! Supporting utilities shared by the codec and the dispatch layer.
//!
//! ## Components
//! - **Logging**: Structured logging configuration

pub mod logging;
