//! Near-duplicate suppression for normalized messages.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use kg_domain::config::PipelineConfig;
use kg_domain::message::NormalizedMessage;
use kg_domain::Result;

use crate::Pipeline;

/// Drops a message whose token-set Jaccard similarity to any recent
/// message from the same source reaches the threshold. Chat spam ("888",
/// "www", copied memes) collapses to one decision per window.
pub struct SimilarTextPipeline {
    threshold: f64,
    time_window: Duration,
    history_size: usize,
    state: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

struct HistoryEntry {
    tokens: HashSet<String>,
    seen_at: Instant,
}

impl SimilarTextPipeline {
    pub fn new(threshold: f64, time_window: Duration, history_size: usize) -> Self {
        Self {
            threshold,
            time_window,
            history_size,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.opt::<f64>("threshold").unwrap_or(0.85),
            Duration::from_secs(config.opt::<u64>("time_window_secs").unwrap_or(30)),
            config.opt::<usize>("history_size").unwrap_or(10),
        )
    }

    /// True when the text duplicates something recent from this source.
    /// Non-duplicates are recorded into the source's history ring.
    fn is_duplicate(&self, source: &str, text: &str, now: Instant) -> bool {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return false;
        }

        let mut state = self.state.lock();
        let history = state.entry(source.to_string()).or_default();

        if let Some(cutoff) = now.checked_sub(self.time_window) {
            while history.front().is_some_and(|e| e.seen_at < cutoff) {
                history.pop_front();
            }
        }

        let duplicate = history
            .iter()
            .any(|e| jaccard(&e.tokens, &tokens) >= self.threshold);

        if !duplicate {
            if history.len() == self.history_size {
                history.pop_front();
            }
            history.push_back(HistoryEntry {
                tokens,
                seen_at: now,
            });
        }
        duplicate
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = (a.len() + b.len()) as f64 - intersection;
    intersection / union
}

#[async_trait]
impl Pipeline<NormalizedMessage> for SimilarTextPipeline {
    fn name(&self) -> &str {
        "similarity"
    }

    fn default_priority(&self) -> i32 {
        500
    }

    async fn process(&self, message: NormalizedMessage) -> Result<Option<NormalizedMessage>> {
        if message.content.requires_special_handling() {
            return Ok(Some(message));
        }

        if self.is_duplicate(&message.source, &message.text, Instant::now()) {
            tracing::debug!(
                source = %message.source,
                text = %message.text,
                "similarity: near-duplicate of a recent message, dropping"
            );
            return Ok(None);
        }
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_domain::message::StructuredContent;
    use kg_domain::raw::DataKind;

    fn msg(source: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage::new(
            StructuredContent::Text {
                text: text.into(),
                user_id: None,
                user_name: None,
            },
            source,
            DataKind::Text,
        )
    }

    #[test]
    fn jaccard_identical_sets() {
        let a = tokenize("hello world");
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn jaccard_disjoint_sets() {
        let a = tokenize("hello world");
        let b = tokenize("goodbye moon");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn exact_repeat_is_dropped() {
        let filter = SimilarTextPipeline::new(0.85, Duration::from_secs(30), 10);
        assert!(filter.process(msg("chat", "hello world")).await.unwrap().is_some());
        assert!(filter.process(msg("chat", "hello world")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn case_and_order_do_not_defeat_the_filter() {
        let filter = SimilarTextPipeline::new(0.85, Duration::from_secs(30), 10);
        assert!(filter.process(msg("chat", "Hello World")).await.unwrap().is_some());
        assert!(filter.process(msg("chat", "world HELLO")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn different_text_passes() {
        let filter = SimilarTextPipeline::new(0.85, Duration::from_secs(30), 10);
        assert!(filter.process(msg("chat", "hello world")).await.unwrap().is_some());
        assert!(filter
            .process(msg("chat", "completely different sentence here"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn sources_have_independent_history() {
        let filter = SimilarTextPipeline::new(0.85, Duration::from_secs(30), 10);
        assert!(filter.process(msg("a", "hello world")).await.unwrap().is_some());
        assert!(filter.process(msg("b", "hello world")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn window_expiry_forgets_history() {
        let filter = SimilarTextPipeline::new(0.85, Duration::from_millis(10), 10);
        assert!(filter.process(msg("chat", "hello world")).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(filter.process(msg("chat", "hello world")).await.unwrap().is_some());
    }
}
