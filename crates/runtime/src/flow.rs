//! Flow coordinator: `decision.intent` → expression mapping → output
//! pipeline chain → `output.intent`.

use std::collections::HashMap;
use std::sync::Arc;

use kg_bus::{handler, EventBus};
use kg_domain::config::FlowConfig;
use kg_domain::envelope::EventPayload;
use kg_domain::intent::{Emotion, Intent};
use kg_domain::params::ExpressionParameters;
use kg_domain::topics;
use kg_domain::{Error, Result};
use kg_pipeline::Chain;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Default tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn default_emotion_expressions() -> HashMap<String, HashMap<String, f32>> {
    let table = |pairs: &[(&str, f32)]| {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect::<HashMap<String, f32>>()
    };
    HashMap::from([
        ("neutral".to_string(), table(&[])),
        (
            "happy".to_string(),
            table(&[("mouth_smile", 1.0), ("eye_open", 0.7)]),
        ),
        (
            "sad".to_string(),
            table(&[("mouth_frown", 0.8), ("brow_down", 0.6)]),
        ),
        (
            "angry".to_string(),
            table(&[("brow_angry", 0.9), ("mouth_frown", 0.5)]),
        ),
        (
            "surprised".to_string(),
            table(&[("eye_wide", 1.0), ("mouth_open", 0.6)]),
        ),
        (
            "love".to_string(),
            table(&[("mouth_smile", 0.9), ("cheek_blush", 0.8)]),
        ),
    ])
}

fn default_action_hotkeys() -> HashMap<String, String> {
    HashMap::from([
        ("wave".to_string(), "Wave".to_string()),
        ("nod".to_string(), "Nod".to_string()),
    ])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bridges decision intents to rendering parameters. The config's tables
/// are merged over the defaults, so overriding one emotion leaves the
/// rest intact.
pub struct FlowCoordinator {
    bus: Arc<EventBus>,
    chain: Arc<Chain<ExpressionParameters>>,
    emotion_expressions: Arc<HashMap<String, HashMap<String, f32>>>,
    action_hotkeys: Arc<HashMap<String, String>>,
}

impl FlowCoordinator {
    pub fn new(bus: Arc<EventBus>, config: &FlowConfig, chain: Chain<ExpressionParameters>) -> Self {
        let mut emotion_expressions = default_emotion_expressions();
        for (emotion, sliders) in &config.emotion_expressions {
            emotion_expressions.insert(emotion.clone(), sliders.clone());
        }
        let mut action_hotkeys = default_action_hotkeys();
        for (action, hotkey) in &config.action_hotkeys {
            action_hotkeys.insert(action.clone(), hotkey.clone());
        }

        Self {
            bus,
            chain: Arc::new(chain),
            emotion_expressions: Arc::new(emotion_expressions),
            action_hotkeys: Arc::new(action_hotkeys),
        }
    }

    /// Subscribe to `decision.intent`.
    pub fn start(&self) {
        let bus = self.bus.clone();
        let chain = self.chain.clone();
        let emotion_expressions = self.emotion_expressions.clone();
        let action_hotkeys = self.action_hotkeys.clone();

        self.bus.subscribe(
            topics::DECISION_INTENT,
            handler(move |envelope| {
                let bus = bus.clone();
                let chain = chain.clone();
                let emotion_expressions = emotion_expressions.clone();
                let action_hotkeys = action_hotkeys.clone();
                async move {
                    let Some(intent) = envelope.payload.as_intent().cloned() else {
                        return Err(Error::Other(
                            "decision.intent carried a non-intent payload".into(),
                        ));
                    };

                    if intent.response_text.is_empty() {
                        tracing::debug!("intent has no response text, nothing to render");
                        return Ok(());
                    }

                    let params =
                        map_intent(&intent, &emotion_expressions, &action_hotkeys);
                    let Some(params) = chain.run(params).await else {
                        return Ok(());
                    };

                    bus.emit(
                        topics::OUTPUT_INTENT,
                        EventPayload::Params(Arc::new(params)),
                        "flow",
                    )
                    .await
                }
            }),
            0,
        );
    }
}

/// Pure mapping from an intent to the initial parameter bundle.
pub fn map_intent(
    intent: &Intent,
    emotion_expressions: &HashMap<String, HashMap<String, f32>>,
    action_hotkeys: &HashMap<String, String>,
) -> ExpressionParameters {
    let mut params =
        ExpressionParameters::new(intent.response_text.clone(), intent.response_text.clone());

    if let Some(sliders) = emotion_expressions.get(intent.emotion.as_str()) {
        for (name, value) in sliders {
            params.set_expression(name.clone(), *value);
        }
    }

    for action in &intent.actions {
        // Explicit hotkey actions pass through; anything else goes through
        // the action → hotkey table.
        if action.kind == "hotkey" {
            if let Some(hotkey) = action.params.get("hotkey").and_then(|v| v.as_str()) {
                params.hotkeys.push(hotkey.to_string());
            }
        } else if let Some(hotkey) = action_hotkeys.get(&action.kind) {
            params.hotkeys.push(hotkey.clone());
        }
        params.priority = params.priority.max(action.priority);
    }
    params.actions = intent.actions.clone();

    if let Some(error) = intent.error_kind() {
        params
            .metadata
            .insert("decision_error".into(), serde_json::Value::String(error.into()));
    }
    params
}
