//! Per-topic dispatch statistics.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use kg_domain::Error;

/// Most recent errors kept per topic.
const ERROR_RING_CAPACITY: usize = 10;

/// Snapshot of one topic's counters.
#[derive(Debug, Clone, Default)]
pub struct TopicStats {
    pub emits: u64,
    pub invocations: u64,
    pub errors: u64,
    pub recent_errors: Vec<String>,
}

#[derive(Default)]
struct TopicCounters {
    emits: u64,
    invocations: u64,
    errors: u64,
    recent_errors: VecDeque<String>,
}

pub(crate) struct StatsTable {
    topics: Mutex<HashMap<String, TopicCounters>>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_emit(&self, topic: &str) {
        self.topics.lock().entry(topic.to_string()).or_default().emits += 1;
    }

    pub fn record_invocation(&self, topic: &str) {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .invocations += 1;
    }

    pub fn record_error(&self, topic: &str, error: &Error) {
        let mut topics = self.topics.lock();
        let counters = topics.entry(topic.to_string()).or_default();
        counters.errors += 1;
        if counters.recent_errors.len() == ERROR_RING_CAPACITY {
            counters.recent_errors.pop_front();
        }
        counters.recent_errors.push_back(error.to_string());
    }

    pub fn snapshot(&self) -> HashMap<String, TopicStats> {
        self.topics
            .lock()
            .iter()
            .map(|(topic, c)| {
                (
                    topic.clone(),
                    TopicStats {
                        emits: c.emits,
                        invocations: c.invocations,
                        errors: c.errors,
                        recent_errors: c.recent_errors.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }
}
