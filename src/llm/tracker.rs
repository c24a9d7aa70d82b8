//! Per-caller token accounting.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Usage reported for one LLM call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub model: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CallerStats {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// End-of-run summary surfaced in the final report and the task log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_calls: u64,
    pub by_caller: FxHashMap<String, CallerStats>,
}

impl TokenSummary {
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }
}

/// Thread-safe recorder the LLM client calls with every response's counts.
///
/// The caller key is the agent name, optionally suffixed with the
/// operation (`writer`, `researcher.distill`). Stats are keyed by the
/// agent part only.
#[derive(Debug, Default)]
pub struct TokenTracker {
    inner: Mutex<TokenSummary>,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, caller: &str, usage: TokenUsage) {
        let agent = caller.split('.').next().unwrap_or(caller).to_string();
        let mut inner = self.inner.lock().expect("token tracker poisoned");
        inner.total_input_tokens += usage.input_tokens;
        inner.total_output_tokens += usage.output_tokens;
        inner.total_calls += 1;
        let stats = inner.by_caller.entry(agent).or_default();
        stats.calls += 1;
        stats.input_tokens += usage.input_tokens;
        stats.output_tokens += usage.output_tokens;
    }

    #[must_use]
    pub fn summary(&self) -> TokenSummary {
        self.inner.lock().expect("token tracker poisoned").clone()
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.summary().total_tokens()
    }

    /// Human-readable summary block for logs.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let summary = self.summary();
        let mut lines = vec![format!(
            "token usage: {} calls, {} in / {} out",
            summary.total_calls, summary.total_input_tokens, summary.total_output_tokens
        )];
        let mut callers: Vec<_> = summary.by_caller.iter().collect();
        callers.sort_by(|a, b| {
            (b.1.input_tokens + b.1.output_tokens).cmp(&(a.1.input_tokens + a.1.output_tokens))
        });
        for (caller, stats) in callers {
            lines.push(format!(
                "  {caller}: {} calls, {} in / {} out",
                stats.calls, stats.input_tokens, stats.output_tokens
            ));
        }
        lines.join("\n")
    }
}
