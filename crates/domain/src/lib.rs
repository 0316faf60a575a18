//! Shared domain types for Kagura: messages, intents, config, and errors.

pub mod config;
pub mod envelope;
pub mod error;
pub mod intent;
pub mod message;
pub mod params;
pub mod raw;
pub mod topics;

pub use error::{Error, Result};
