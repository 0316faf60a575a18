//! Normalized messages and their structured content variants.
//!
//! Normalization turns a [`RawData`](crate::raw::RawData) into a
//! [`NormalizedMessage`]: the canonical form every pipeline and decision
//! provider consumes. The polymorphic payload is a closed
//! [`StructuredContent`] enum so downstream code dispatches on methods
//! instead of re-testing payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::raw::DataKind;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StructuredContent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured payload of a normalized message.
///
/// Importance is pre-computed per variant and is idempotent: calling
/// [`StructuredContent::importance`] twice always yields the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredContent {
    Text {
        text: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        user_name: Option<String>,
    },
    Gift {
        gift_name: String,
        count: u32,
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },
    SuperChat {
        text: String,
        /// Monetary amount in cents of the platform currency.
        amount_cents: u64,
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },
    Membership {
        tier: String,
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },
}

impl StructuredContent {
    /// Relative importance in `[0, 1]`, used by pipelines to prioritize.
    pub fn importance(&self) -> f32 {
        match self {
            StructuredContent::Text { .. } => 0.3,
            StructuredContent::Gift { count, .. } => (0.5 + 0.05 * *count as f32).min(0.9),
            StructuredContent::SuperChat { amount_cents, .. } => {
                // Scale with the amount, saturating at 1.0 around $50.
                (0.6 + *amount_cents as f32 / 12_500.0).min(1.0)
            }
            StructuredContent::Membership { .. } => 0.8,
        }
    }

    /// LLM-ready textual rendering of this content.
    pub fn display_text(&self) -> String {
        match self {
            StructuredContent::Text { text, .. } => text.clone(),
            StructuredContent::Gift {
                gift_name,
                count,
                user_name,
                user_id,
                ..
            } => {
                let who = user_name.as_deref().unwrap_or(user_id);
                format!("{who} sent {count}x {gift_name}")
            }
            StructuredContent::SuperChat {
                text,
                amount_cents,
                user_name,
                user_id,
            } => {
                let who = user_name.as_deref().unwrap_or(user_id);
                format!(
                    "{who} sent a {:.2} super chat: {text}",
                    *amount_cents as f64 / 100.0
                )
            }
            StructuredContent::Membership {
                tier,
                user_name,
                user_id,
            } => {
                let who = user_name.as_deref().unwrap_or(user_id);
                format!("{who} joined as a {tier} member")
            }
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            StructuredContent::Text { user_id, .. } => user_id.as_deref(),
            StructuredContent::Gift { user_id, .. }
            | StructuredContent::SuperChat { user_id, .. }
            | StructuredContent::Membership { user_id, .. } => Some(user_id),
        }
    }

    /// Whether this content should bypass ordinary filtering (paid or
    /// membership events are never silently dropped).
    pub fn requires_special_handling(&self) -> bool {
        !matches!(self, StructuredContent::Text { .. })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NormalizedMessage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical input form after normalization.
///
/// Immutable once built: pipelines that want to change a message produce a
/// new one. `text` is guaranteed non-empty by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// LLM-ready textual rendering, computed from the content variant.
    pub text: String,
    pub content: StructuredContent,
    /// Name of the input provider this message originated from.
    pub source: String,
    pub data_type: DataKind,
    /// Pre-computed from the content variant; in `[0, 1]`.
    pub importance: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedMessage {
    pub fn new(
        content: StructuredContent,
        source: impl Into<String>,
        data_type: DataKind,
    ) -> Self {
        let text = content.display_text();
        let importance = content.importance();
        Self {
            text,
            content,
            source: source.into(),
            data_type,
            importance,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.content.user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_idempotent() {
        let content = StructuredContent::SuperChat {
            text: "hi".into(),
            amount_cents: 5000,
            user_id: "U1".into(),
            user_name: None,
        };
        assert_eq!(content.importance(), content.importance());
    }

    #[test]
    fn importance_stays_in_unit_interval() {
        let contents = [
            StructuredContent::Text {
                text: "x".into(),
                user_id: None,
                user_name: None,
            },
            StructuredContent::Gift {
                gift_name: "rocket".into(),
                count: 500,
                user_id: "U1".into(),
                user_name: None,
            },
            StructuredContent::SuperChat {
                text: "big".into(),
                amount_cents: 1_000_000,
                user_id: "U1".into(),
                user_name: None,
            },
            StructuredContent::Membership {
                tier: "gold".into(),
                user_id: "U1".into(),
                user_name: None,
            },
        ];
        for c in contents {
            let imp = c.importance();
            assert!((0.0..=1.0).contains(&imp), "importance {imp} out of range");
        }
    }

    #[test]
    fn gift_display_text_prefers_user_name() {
        let content = StructuredContent::Gift {
            gift_name: "rose".into(),
            count: 3,
            user_id: "U42".into(),
            user_name: Some("mika".into()),
        };
        assert_eq!(content.display_text(), "mika sent 3x rose");
    }

    #[test]
    fn normalized_message_text_matches_display_text() {
        let content = StructuredContent::Text {
            text: "hello world".into(),
            user_id: Some("U1".into()),
            user_name: None,
        };
        let msg = NormalizedMessage::new(content, "console", DataKind::Text);
        assert_eq!(msg.text, "hello world");
        assert_eq!(msg.user_id(), Some("U1"));
    }

    #[test]
    fn paid_content_requires_special_handling() {
        let plain = StructuredContent::Text {
            text: "x".into(),
            user_id: None,
            user_name: None,
        };
        let paid = StructuredContent::SuperChat {
            text: "x".into(),
            amount_cents: 100,
            user_id: "U1".into(),
            user_name: None,
        };
        assert!(!plain.requires_special_handling());
        assert!(paid.requires_special_handling());
    }
}
