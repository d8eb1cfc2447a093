//! # Bovin Common Library
//!
//! Shared code for the Bovin services:
//! - Error type
//! - Bootstrap configuration loading (TOML + environment)
//! - Event types (BovinEvent enum) and the EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
