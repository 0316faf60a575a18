//! LLM-driven conversion of freeform reply text into a structured intent.
//!
//! The platform backend answers in natural language ("hello [happy]
//! [smile]"); a small, cheap model re-renders that as strict JSON
//! `{response_text, emotion, actions}`. Anything that goes wrong falls
//! back to a neutral intent carrying the raw text, so parsing failures
//! never cost a response.

use std::sync::Arc;

use kg_domain::intent::{Emotion, Intent, IntentAction};
use kg_llm::{ChatOptions, LlmService};
use kg_prompt::PromptManager;

/// System prompt used when no `intent_parser` template is on disk.
const DEFAULT_SYSTEM_PROMPT: &str = "You convert a VTuber's chat reply into strict JSON. \
Respond with a single JSON object and nothing else: \
{\"response_text\": string, \"emotion\": one of \
[\"neutral\",\"happy\",\"sad\",\"angry\",\"surprised\",\"love\"], \
\"actions\": array of action name strings}. \
Keep response_text verbatim minus any bracketed stage directions.";

pub struct IntentParser {
    llm: Arc<LlmService>,
    prompts: Option<Arc<PromptManager>>,
    backend: String,
}

impl IntentParser {
    /// Prefers the `llm_fast` backend when configured; parsing is a small
    /// low-temperature job.
    pub fn new(llm: Arc<LlmService>, prompts: Option<Arc<PromptManager>>) -> Self {
        let backend = if llm.has_backend("llm_fast") {
            "llm_fast"
        } else {
            "llm"
        };
        Self {
            llm,
            prompts,
            backend: backend.to_string(),
        }
    }

    /// Parse `reply_text` into an [`Intent`] for `original_text`.
    /// Infallible: every failure path degrades to the raw-text fallback.
    pub async fn parse(&self, original_text: &str, reply_text: &str) -> Intent {
        let system = self.system_prompt();
        let response = self
            .llm
            .chat(
                reply_text,
                &self.backend,
                ChatOptions {
                    system_message: Some(system),
                    temperature: Some(0.1),
                    json_mode: true,
                    ..ChatOptions::default()
                },
            )
            .await;

        if !response.success {
            tracing::warn!(
                error = ?response.error,
                "intent parser LLM call failed, using raw-text fallback"
            );
            return fallback(original_text, reply_text);
        }

        match intent_from_json(original_text, &response.content) {
            Some(intent) => intent,
            None => {
                tracing::warn!(
                    content = %response.content,
                    "intent parser returned unusable JSON, using raw-text fallback"
                );
                fallback(original_text, reply_text)
            }
        }
    }

    fn system_prompt(&self) -> String {
        if let Some(prompts) = &self.prompts {
            if let Ok(rendered) = prompts.render_safe("intent_parser", &Default::default()) {
                return rendered;
            }
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }
}

fn fallback(original_text: &str, reply_text: &str) -> Intent {
    Intent::new(original_text, reply_text)
}

/// Strict-JSON extraction. `None` on any schema problem; tolerant of
/// fenced code blocks and of emotion/action casing.
pub fn intent_from_json(original_text: &str, content: &str) -> Option<Intent> {
    let stripped = strip_fences(content);
    let value: serde_json::Value = serde_json::from_str(stripped).ok()?;

    let response_text = value.get("response_text")?.as_str()?.to_string();
    let emotion = value
        .get("emotion")
        .and_then(|e| e.as_str())
        .map(Emotion::parse)
        .unwrap_or_default();

    let mut actions = Vec::new();
    if let Some(raw_actions) = value.get("actions").and_then(|a| a.as_array()) {
        for raw in raw_actions {
            match raw {
                serde_json::Value::String(name) => {
                    actions.push(IntentAction::expression(name.clone()));
                }
                serde_json::Value::Object(_) => {
                    match serde_json::from_value::<IntentAction>(raw.clone()) {
                        Ok(action) => actions.push(action),
                        Err(_) => return None,
                    }
                }
                _ => return None,
            }
        }
    }

    let mut intent = Intent::new(original_text, response_text).with_emotion(emotion);
    intent.actions = actions;
    Some(intent)
}

/// Remove a surrounding ``` fence (with optional language tag) if present.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or(trimmed)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reply_parses_fully() {
        let json = r#"{"response_text":"hello","emotion":"HAPPY","actions":["SMILE"]}"#;
        let intent = intent_from_json("hello [happy] [smile]", json).unwrap();
        assert_eq!(intent.response_text, "hello");
        assert_eq!(intent.emotion, Emotion::Happy);
        assert_eq!(intent.actions.len(), 1);
        assert_eq!(intent.actions[0].kind, "expression");
        assert_eq!(
            intent.actions[0].params.get("expression").and_then(|v| v.as_str()),
            Some("SMILE")
        );
        assert_eq!(intent.original_text, "hello [happy] [smile]");
    }

    #[test]
    fn object_actions_are_accepted() {
        let json = r#"{
            "response_text": "hi",
            "emotion": "neutral",
            "actions": [{"type": "hotkey", "params": {"hotkey": "Wave"}, "priority": 2}]
        }"#;
        let intent = intent_from_json("x", json).unwrap();
        assert_eq!(intent.actions[0].kind, "hotkey");
        assert_eq!(intent.actions[0].priority, 2);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let fenced = "```json\n{\"response_text\":\"ok\"}\n```";
        let intent = intent_from_json("x", fenced).unwrap();
        assert_eq!(intent.response_text, "ok");
        assert_eq!(intent.emotion, Emotion::Neutral);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(intent_from_json("x", "not json at all").is_none());
        assert!(intent_from_json("x", "{\"emotion\":\"happy\"}").is_none());
        assert!(intent_from_json("x", "{\"response_text\": 5}").is_none());
    }

    #[test]
    fn non_string_action_entries_are_rejected() {
        let json = r#"{"response_text":"x","actions":[42]}"#;
        assert!(intent_from_json("x", json).is_none());
    }

    #[test]
    fn unknown_emotion_degrades_to_neutral() {
        let json = r#"{"response_text":"x","emotion":"bouncy"}"#;
        let intent = intent_from_json("x", json).unwrap();
        assert_eq!(intent.emotion, Emotion::Neutral);
    }

    #[test]
    fn roundtrip_through_serialization() {
        let json = r#"{"response_text":"hello","emotion":"happy","actions":[]}"#;
        let intent = intent_from_json("orig", json).unwrap();
        let serialized = serde_json::json!({
            "response_text": intent.response_text,
            "emotion": intent.emotion.as_str(),
            "actions": [],
        })
        .to_string();
        let reparsed = intent_from_json("orig", &serialized).unwrap();
        assert_eq!(reparsed, intent);
    }
}
