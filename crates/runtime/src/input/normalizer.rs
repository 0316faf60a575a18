//! RawData → NormalizedMessage.
//!
//! Pure and side-effect-free: the content variant is deduced from the
//! data kind plus metadata shape, `text` comes from the variant's display
//! rendering, importance from the variant. Observations that normalize to
//! empty text are rejected here, never later.

use kg_domain::message::{NormalizedMessage, StructuredContent};
use kg_domain::raw::{DataKind, RawContent, RawData};

/// Normalize one observation. `None` means the observation carried
/// nothing renderable (logged at debug level).
pub fn normalize(raw: RawData) -> Option<NormalizedMessage> {
    let content = deduce_content(&raw)?;

    let message = NormalizedMessage {
        text: content.display_text(),
        importance: content.importance(),
        content,
        source: raw.source,
        data_type: raw.data_type,
        metadata: raw.metadata,
        timestamp: raw.timestamp,
    };

    if message.text.trim().is_empty() {
        tracing::debug!(source = %message.source, "normalized text is empty, rejecting");
        return None;
    }
    Some(message)
}

fn deduce_content(raw: &RawData) -> Option<StructuredContent> {
    let meta_str = |key: &str| {
        raw.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    };
    let user_id = meta_str("user_id");
    let user_name = meta_str("user_name");

    // Paid/membership events are recognized by their metadata shape,
    // whatever channel they arrived on.
    if let Some(gift_name) = meta_str("gift_name") {
        let count = raw
            .metadata
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32;
        return Some(StructuredContent::Gift {
            gift_name,
            count,
            user_id: user_id.unwrap_or_else(|| "unknown".into()),
            user_name,
        });
    }
    if let Some(amount) = raw.metadata.get("amount_cents").and_then(|v| v.as_u64()) {
        return Some(StructuredContent::SuperChat {
            text: plain_text(raw).unwrap_or_default(),
            amount_cents: amount,
            user_id: user_id.unwrap_or_else(|| "unknown".into()),
            user_name,
        });
    }
    if let Some(tier) = meta_str("member_tier") {
        return Some(StructuredContent::Membership {
            tier,
            user_id: user_id.unwrap_or_else(|| "unknown".into()),
            user_name,
        });
    }

    let text = plain_text(raw)?;
    Some(StructuredContent::Text {
        text,
        user_id,
        user_name,
    })
}

/// Best-effort text extraction from the raw payload.
fn plain_text(raw: &RawData) -> Option<String> {
    match &raw.content {
        RawContent::Text { text } => Some(text.clone()),
        RawContent::Json { value } => value
            .get("text")
            .and_then(|t| t.as_str())
            .map(String::from)
            .or_else(|| {
                // Event payloads without a text field render as their kind.
                if raw.data_type == DataKind::Event {
                    value
                        .get("kind")
                        .and_then(|k| k.as_str())
                        .map(|k| format!("[event: {k}]"))
                } else {
                    None
                }
            }),
        RawContent::Binary { .. } => None,
    }
}
