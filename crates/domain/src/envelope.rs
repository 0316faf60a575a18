//! Bus envelope and payload types.
//!
//! Payloads are a closed enum rather than `dyn Any`: handlers match on the
//! variant they expect, and the bus can validate topic/payload pairings
//! without downcasting.

use std::sync::Arc;

use serde::Serialize;

use crate::intent::Intent;
use crate::message::NormalizedMessage;
use crate::params::ExpressionParameters;

/// Lifecycle notification for a provider in one of the three domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEvent {
    pub provider: String,
    /// Domain the provider belongs to: "input", "decision", or "output".
    pub domain: String,
    pub connected: bool,
}

/// Typed payload carried by an [`EventEnvelope`].
///
/// Payloads are `Arc`ed so fan-out to many handlers never clones the
/// underlying data; subscribers receive an immutable view.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Message(Arc<NormalizedMessage>),
    Intent(Arc<Intent>),
    Params(Arc<ExpressionParameters>),
    Provider(ProviderEvent),
    Json(Arc<serde_json::Value>),
}

impl EventPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            EventPayload::Message(_) => PayloadKind::Message,
            EventPayload::Intent(_) => PayloadKind::Intent,
            EventPayload::Params(_) => PayloadKind::Params,
            EventPayload::Provider(_) => PayloadKind::Provider,
            EventPayload::Json(_) => PayloadKind::Json,
        }
    }

    pub fn as_message(&self) -> Option<&Arc<NormalizedMessage>> {
        match self {
            EventPayload::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_intent(&self) -> Option<&Arc<Intent>> {
        match self {
            EventPayload::Intent(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_params(&self) -> Option<&Arc<ExpressionParameters>> {
        match self {
            EventPayload::Params(p) => Some(p),
            _ => None,
        }
    }
}

/// Payload variant tag, used by the bus topic/payload validation registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Message,
    Intent,
    Params,
    Provider,
    Json,
}

/// One message on the bus.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub topic: String,
    pub payload: EventPayload,
    /// Name of the component that emitted the event.
    pub source: String,
    /// Monotonic per-bus sequence number.
    pub seq: u64,
    /// Reply topic for request/response correlation; `None` for plain emits.
    pub reply_to: Option<String>,
}

