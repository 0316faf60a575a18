//! Canonical bus topic constants.
//!
//! Every emit and subscription references topics through these constants;
//! free-form topic strings are reserved for reply topics generated by the
//! bus itself (prefixed with [`REPLY_PREFIX`]).

/// A normalized message survived the input pipeline chain.
/// Payload: `NormalizedMessage`.
pub const DATA_MESSAGE: &str = "data.message";

/// The decision domain produced an intent for a message.
/// Payload: `Intent`.
pub const DECISION_INTENT: &str = "decision.intent";

/// The flow coordinator produced a rendering bundle.
/// Payload: `ExpressionParameters`.
pub const OUTPUT_INTENT: &str = "output.intent";

// --- Provider lifecycle ---

pub const INPUT_PROVIDER_CONNECTED: &str = "input.provider.connected";
pub const INPUT_PROVIDER_DISCONNECTED: &str = "input.provider.disconnected";
pub const DECISION_PROVIDER_CONNECTED: &str = "decision.provider.connected";
pub const DECISION_PROVIDER_DISCONNECTED: &str = "decision.provider.disconnected";
pub const OUTPUT_PROVIDER_CONNECTED: &str = "output.provider.connected";
pub const OUTPUT_PROVIDER_DISCONNECTED: &str = "output.provider.disconnected";

/// Prefix for per-request reply topics generated by `EventBus::request`.
pub const REPLY_PREFIX: &str = "$reply.";
