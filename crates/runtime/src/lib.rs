//! The Kagura runtime: three business domains wired over the event bus.
//!
//! Input providers feed raw observations into the input domain, which
//! normalizes and filters them onto `data.message`. The decision domain
//! holds exactly one active decision provider and turns each message into
//! a `decision.intent`. The flow coordinator maps intents to rendering
//! parameters and the output domain fans them out to every enabled output
//! provider. The bus is the only inter-domain channel.

pub mod audio;
pub mod bootstrap;
pub mod callbacks;
pub mod cli;
pub mod context;
pub mod decision;
pub mod flow;
pub mod input;
pub mod output;
pub mod registry;
pub mod traits;
