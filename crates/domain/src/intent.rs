//! Decision output: what the VTuber intends to say and do.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The emotion a decision provider attached to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Love,
}

impl Emotion {
    /// Tolerant parser for emotion labels coming back from an LLM.
    /// Case-insensitive; unknown labels map to `Neutral`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" | "joy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "angry" | "anger" => Emotion::Angry,
            "surprised" | "surprise" => Emotion::Surprised,
            "love" => Emotion::Love,
            _ => Emotion::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Love => "love",
        }
    }
}

/// One action the decision attached to its response, e.g. trigger an
/// expression or a hotkey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAction {
    /// Action kind, e.g. "expression", "hotkey", "motion".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub priority: i32,
}

impl IntentAction {
    /// An expression action with a single `expression` parameter — the
    /// shape the intent parser produces for bare action strings.
    pub fn expression(name: impl Into<String>) -> Self {
        let mut params = HashMap::new();
        params.insert(
            "expression".to_string(),
            serde_json::Value::String(name.into()),
        );
        Self {
            kind: "expression".into(),
            params,
            priority: 0,
        }
    }
}

/// Decision output. Exactly one `Intent` is produced per surviving
/// normalized message, even when the decider fails (fallback intent with
/// `metadata.error` set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// The normalized text the decision was made for.
    pub original_text: String,
    /// What the VTuber should say.
    pub response_text: String,
    #[serde(default)]
    pub emotion: Emotion,
    #[serde(default)]
    pub actions: Vec<IntentAction>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Intent {
    pub fn new(original_text: impl Into<String>, response_text: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            response_text: response_text.into(),
            emotion: Emotion::Neutral,
            actions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = emotion;
        self
    }

    /// Synthetic fallback produced when the active decider fails. The
    /// runtime must never stall on a failing decider, so this is emitted
    /// in place of a real decision.
    pub fn fallback(original_text: impl Into<String>, error_kind: &str) -> Self {
        let mut intent = Self::new(original_text, "(decision unavailable)");
        intent.metadata.insert(
            "error".to_string(),
            serde_json::Value::String(error_kind.to_string()),
        );
        intent
    }

    /// The error kind recorded by [`Intent::fallback`], if any.
    pub fn error_kind(&self) -> Option<&str> {
        self.metadata.get("error").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_parse_is_case_insensitive() {
        assert_eq!(Emotion::parse("HAPPY"), Emotion::Happy);
        assert_eq!(Emotion::parse("Surprise"), Emotion::Surprised);
        assert_eq!(Emotion::parse("  love "), Emotion::Love);
    }

    #[test]
    fn emotion_parse_unknown_is_neutral() {
        assert_eq!(Emotion::parse("ecstatic"), Emotion::Neutral);
        assert_eq!(Emotion::parse(""), Emotion::Neutral);
    }

    #[test]
    fn fallback_records_error_kind() {
        let intent = Intent::fallback("hello", "timeout");
        assert_eq!(intent.response_text, "(decision unavailable)");
        assert_eq!(intent.emotion, Emotion::Neutral);
        assert_eq!(intent.error_kind(), Some("timeout"));
    }

    #[test]
    fn intent_serde_roundtrip() {
        let intent = Intent::new("hi", "hello there")
            .with_emotion(Emotion::Happy);
        let json = serde_json::to_string(&intent).unwrap();
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intent);
    }

    #[test]
    fn expression_action_shape() {
        let action = IntentAction::expression("SMILE");
        assert_eq!(action.kind, "expression");
        assert_eq!(
            action.params.get("expression").and_then(|v| v.as_str()),
            Some("SMILE")
        );
    }
}
