//! Token accounting across backends.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use crate::types::Usage;

/// Accumulated totals for one backend.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

pub(crate) struct UsageTracker {
    totals: Mutex<HashMap<String, UsageTotals>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, backend: &str, usage: Option<Usage>) {
        let mut totals = self.totals.lock();
        let entry = totals.entry(backend.to_string()).or_default();
        entry.requests += 1;
        if let Some(usage) = usage {
            entry.prompt_tokens += u64::from(usage.prompt_tokens);
            entry.completion_tokens += u64::from(usage.completion_tokens);
            entry.total_tokens += u64::from(usage.total_tokens);
        }
    }

    pub fn snapshot(&self) -> HashMap<String, UsageTotals> {
        self.totals.lock().clone()
    }
}
