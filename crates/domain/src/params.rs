//! Rendering bundle handed to output providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::intent::IntentAction;

/// Everything an output provider needs to render one response: speech
/// text, subtitle text, expression sliders, hotkeys. Output pipelines may
/// mutate or drop the bundle; after emission every provider receives an
/// immutable view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionParameters {
    pub tts_text: String,
    pub subtitle_text: String,
    /// Expression slider values by name, clamped to `[0, 1]`.
    #[serde(default)]
    pub expressions: HashMap<String, f32>,
    /// Hotkey names to trigger, in order.
    #[serde(default)]
    pub hotkeys: Vec<String>,
    /// Actions passed through from the intent.
    #[serde(default)]
    pub actions: Vec<IntentAction>,
    #[serde(default = "enabled")]
    pub tts_enabled: bool,
    #[serde(default = "enabled")]
    pub subtitle_enabled: bool,
    #[serde(default = "enabled")]
    pub expression_enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

fn enabled() -> bool {
    true
}

impl ExpressionParameters {
    pub fn new(tts_text: impl Into<String>, subtitle_text: impl Into<String>) -> Self {
        Self {
            tts_text: tts_text.into(),
            subtitle_text: subtitle_text.into(),
            expressions: HashMap::new(),
            hotkeys: Vec::new(),
            actions: Vec::new(),
            tts_enabled: true,
            subtitle_enabled: true,
            expression_enabled: true,
            priority: 0,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set an expression slider, clamping into `[0, 1]`.
    pub fn set_expression(&mut self, name: impl Into<String>, value: f32) {
        self.expressions.insert(name.into(), value.clamp(0.0, 1.0));
    }
}
