//! Ordered, filterable transform chains.
//!
//! Input pipelines operate on [`NormalizedMessage`]s between normalization
//! and `data.message`; output pipelines operate on
//! [`ExpressionParameters`] between the flow coordinator and
//! `output.intent`. Both share the same [`Pipeline`] contract and
//! [`Chain`] executor.
//!
//! [`NormalizedMessage`]: kg_domain::message::NormalizedMessage
//! [`ExpressionParameters`]: kg_domain::params::ExpressionParameters

mod chain;
mod length_limit;
mod profanity;
mod rate_limit;
mod similarity;

pub use chain::Chain;
pub use length_limit::TextLengthPipeline;
pub use profanity::ProfanityPipeline;
pub use rate_limit::RateLimitPipeline;
pub use similarity::SimilarTextPipeline;

use async_trait::async_trait;
use kg_domain::Result;

/// One stage of a transform chain.
///
/// `process` may return the value unchanged, a modified value, or `None`
/// to drop it. Stages must respect the `timeout_secs` declared in their
/// config; the chain enforces it from the outside as well.
#[async_trait]
pub trait Pipeline<T>: Send + Sync {
    fn name(&self) -> &str;

    /// Chain position used when the config does not override `priority`.
    fn default_priority(&self) -> i32 {
        0
    }

    async fn process(&self, value: T) -> Result<Option<T>>;
}
