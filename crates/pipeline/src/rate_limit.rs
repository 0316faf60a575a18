//! Sliding-window rate limiting for normalized messages.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use kg_domain::config::PipelineConfig;
use kg_domain::message::NormalizedMessage;
use kg_domain::Result;

use crate::Pipeline;

/// Drops messages when a global or per-user sliding window overflows.
///
/// Paid and membership events (`requires_special_handling`) bypass the
/// limiter entirely and are not counted.
pub struct RateLimitPipeline {
    window: Duration,
    max_global: usize,
    max_per_user: usize,
    state: Mutex<Windows>,
}

#[derive(Default)]
struct Windows {
    global: VecDeque<Instant>,
    per_user: HashMap<String, VecDeque<Instant>>,
}

impl RateLimitPipeline {
    pub fn new(window: Duration, max_global: usize, max_per_user: usize) -> Self {
        Self {
            window,
            max_global,
            max_per_user,
            state: Mutex::new(Windows::default()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Duration::from_secs(config.opt::<u64>("window_secs").unwrap_or(60)),
            config.opt::<usize>("max_global_per_window").unwrap_or(60),
            config.opt::<usize>("max_per_user_per_window").unwrap_or(5),
        )
    }

    fn admit(&self, user_id: Option<&str>, now: Instant) -> Admission {
        let mut state = self.state.lock();
        // Underflows only in the first `window` of process lifetime on
        // some platforms; nothing is old enough to prune then anyway.
        let cutoff = now.checked_sub(self.window);

        prune(&mut state.global, cutoff);
        if state.global.len() >= self.max_global {
            return Admission::GlobalLimit;
        }

        if let Some(user) = user_id {
            let window = state.per_user.entry(user.to_string()).or_default();
            prune(window, cutoff);
            if window.len() >= self.max_per_user {
                return Admission::UserLimit;
            }
            window.push_back(now);
        }
        state.global.push_back(now);
        Admission::Accepted
    }
}

#[derive(PartialEq)]
enum Admission {
    Accepted,
    GlobalLimit,
    UserLimit,
}

fn prune(window: &mut VecDeque<Instant>, cutoff: Option<Instant>) {
    let Some(cutoff) = cutoff else { return };
    while window.front().is_some_and(|t| *t < cutoff) {
        window.pop_front();
    }
}

#[async_trait]
impl Pipeline<NormalizedMessage> for RateLimitPipeline {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn default_priority(&self) -> i32 {
        100
    }

    async fn process(&self, message: NormalizedMessage) -> Result<Option<NormalizedMessage>> {
        if message.content.requires_special_handling() {
            return Ok(Some(message));
        }

        match self.admit(message.user_id(), Instant::now()) {
            Admission::Accepted => Ok(Some(message)),
            Admission::GlobalLimit => {
                tracing::debug!(
                    source = %message.source,
                    "rate limit: global window full, dropping message"
                );
                Ok(None)
            }
            Admission::UserLimit => {
                tracing::debug!(
                    source = %message.source,
                    user = ?message.user_id(),
                    "rate limit: per-user window full, dropping message"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_domain::message::StructuredContent;
    use kg_domain::raw::DataKind;

    fn text_message(user: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage::new(
            StructuredContent::Text {
                text: text.into(),
                user_id: Some(user.into()),
                user_name: None,
            },
            "test",
            DataKind::Text,
        )
    }

    #[tokio::test]
    async fn second_message_within_window_is_dropped() {
        let limiter = RateLimitPipeline::new(Duration::from_secs(60), 100, 1);
        let first = limiter.process(text_message("U1", "a")).await.unwrap();
        let second = limiter.process(text_message("U1", "b")).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn users_are_limited_independently() {
        let limiter = RateLimitPipeline::new(Duration::from_secs(60), 100, 1);
        assert!(limiter.process(text_message("U1", "a")).await.unwrap().is_some());
        assert!(limiter.process(text_message("U2", "b")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn global_window_caps_anonymous_traffic() {
        let limiter = RateLimitPipeline::new(Duration::from_secs(60), 2, 100);
        let anon = |text: &str| {
            NormalizedMessage::new(
                StructuredContent::Text {
                    text: text.into(),
                    user_id: None,
                    user_name: None,
                },
                "test",
                DataKind::Text,
            )
        };
        assert!(limiter.process(anon("a")).await.unwrap().is_some());
        assert!(limiter.process(anon("b")).await.unwrap().is_some());
        assert!(limiter.process(anon("c")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn paid_content_bypasses_the_limiter() {
        let limiter = RateLimitPipeline::new(Duration::from_secs(60), 0, 0);
        let superchat = NormalizedMessage::new(
            StructuredContent::SuperChat {
                text: "thanks".into(),
                amount_cents: 500,
                user_id: "U1".into(),
                user_name: None,
            },
            "test",
            DataKind::Text,
        );
        assert!(limiter.process(superchat).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn window_expiry_readmits() {
        let limiter = RateLimitPipeline::new(Duration::from_millis(10), 100, 1);
        assert!(limiter.process(text_message("U1", "a")).await.unwrap().is_some());
        assert!(limiter.process(text_message("U1", "b")).await.unwrap().is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.process(text_message("U1", "c")).await.unwrap().is_some());
    }
}
