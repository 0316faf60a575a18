//! Raw input observations as emitted by input providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse classification of a raw observation's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Text,
    Audio,
    Image,
    Event,
    Json,
    Binary,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Text => "text",
            DataKind::Audio => "audio",
            DataKind::Image => "image",
            DataKind::Event => "event",
            DataKind::Json => "json",
            DataKind::Binary => "binary",
        }
    }
}

/// The opaque content payload of a [`RawData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawContent {
    Text { text: String },
    Json { value: serde_json::Value },
    Binary { bytes: Vec<u8> },
}

impl RawContent {
    /// Best-effort textual rendering, used when a provider hands us
    /// something it never bothered to label.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// What an input provider emits: one unprocessed observation from a single
/// source. Created by the provider, consumed exactly once by the input
/// normalizer, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawData {
    pub content: RawContent,
    /// Name of the provider that produced this observation.
    pub source: String,
    pub data_type: DataKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RawData {
    /// Convenience constructor for plain text observations.
    pub fn text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content: RawContent::Text { text: text.into() },
            source: source.into(),
            data_type: DataKind::Text,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
