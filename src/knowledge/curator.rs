//! Source quality weighting and health accounting.
//!
//! Each named source carries a quality weight in [0.5, 0.95]; results are
//! ranked by weight descending. Health is tracked per source: after three
//! consecutive failures a source is disabled for a cooldown period, and a
//! success resets its failure counter.

use rustc_hash::FxHashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::article::SearchResult;

const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Fallback weights for well-known sources. A registry file can override
/// these through [`SourceCurator::with_weights`].
fn fallback_weights() -> Vec<(&'static str, f32)> {
    vec![
        ("Anthropic Research", 0.95),
        ("OpenAI Blog", 0.95),
        ("Google DeepMind", 0.95),
        ("Meta AI", 0.95),
        ("Google AI Blog", 0.90),
        ("Mistral AI", 0.90),
        ("Microsoft Research", 0.90),
        ("arXiv", 0.90),
        ("LangChain Blog", 0.85),
        ("Hugging Face", 0.85),
        ("xAI", 0.85),
        ("AWS Blog", 0.80),
        ("Microsoft DevBlogs", 0.80),
        ("Hacker News", 0.75),
        ("GitHub", 0.75),
        ("Stack Overflow", 0.75),
        ("Dev.to", 0.70),
        ("Reddit AI", 0.70),
        ("Google Search", 0.60),
        ("generic_search", 0.50),
    ]
}

#[derive(Debug, Default)]
struct HealthState {
    failure_counts: FxHashMap<String, u32>,
    disabled_at: FxHashMap<String, Instant>,
}

/// Quality weights plus per-source health counters.
///
/// Health state is interior-mutable so the curator can be shared behind an
/// `Arc` by the smart search fan-out.
#[derive(Debug)]
pub struct SourceCurator {
    weights: FxHashMap<String, f32>,
    default_weight: f32,
    max_failures: u32,
    cooldown: Duration,
    health: Mutex<HealthState>,
}

impl Default for SourceCurator {
    fn default() -> Self {
        SourceCurator::new()
    }
}

impl SourceCurator {
    pub fn new() -> Self {
        SourceCurator {
            weights: fallback_weights()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            default_weight: 0.50,
            max_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            cooldown: DEFAULT_COOLDOWN,
            health: Mutex::new(HealthState::default()),
        }
    }

    /// Merge registry-provided weights over the fallbacks.
    #[must_use]
    pub fn with_weights(mut self, weights: impl IntoIterator<Item = (String, f32)>) -> Self {
        for (name, weight) in weights {
            self.weights.insert(name, weight.clamp(0.5, 0.95));
        }
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    #[must_use]
    pub fn weight_of(&self, source: &str) -> f32 {
        self.weights.get(source).copied().unwrap_or(self.default_weight)
    }

    /// Rank results by source quality, descending. Stable for equal
    /// weights, so intra-source ordering is preserved.
    pub fn rank(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        results.sort_by(|a, b| {
            self.weight_of(&b.source)
                .partial_cmp(&self.weight_of(&a.source))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Is the source currently usable? A disabled source re-enables itself
    /// once the cooldown has elapsed.
    pub fn check_health(&self, source_id: &str) -> bool {
        let mut health = self.health.lock().expect("curator poisoned");
        if let Some(&disabled_at) = health.disabled_at.get(source_id) {
            if disabled_at.elapsed() >= self.cooldown {
                tracing::info!(source = source_id, "cooldown elapsed, re-enabling source");
                health.disabled_at.remove(source_id);
                health.failure_counts.remove(source_id);
                return true;
            }
            return false;
        }
        true
    }

    pub fn record_failure(&self, source_id: &str) {
        let mut health = self.health.lock().expect("curator poisoned");
        let count = health
            .failure_counts
            .entry(source_id.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        if *count >= self.max_failures {
            let count = *count;
            health.disabled_at.insert(source_id.to_string(), Instant::now());
            tracing::warn!(source = source_id, count, "source disabled after consecutive failures");
        }
    }

    pub fn record_success(&self, source_id: &str) {
        let mut health = self.health.lock().expect("curator poisoned");
        health.failure_counts.remove(source_id);
    }

    /// Filter to the currently healthy subset, preserving order.
    pub fn healthy_sources<'a>(&self, source_ids: &[&'a str]) -> Vec<&'a str> {
        source_ids
            .iter()
            .copied()
            .filter(|id| self.check_health(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str) -> SearchResult {
        SearchResult {
            title: source.to_string(),
            url: format!("https://example.com/{source}"),
            source: source.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn ranking_prefers_high_weight_sources() {
        let curator = SourceCurator::new();
        let ranked = curator.rank(vec![
            result("generic_search"),
            result("Anthropic Research"),
            result("GitHub"),
        ]);
        assert_eq!(ranked[0].source, "Anthropic Research");
        assert_eq!(ranked[2].source, "generic_search");
    }

    #[test]
    fn three_failures_disable_until_cooldown() {
        let curator = SourceCurator::new().with_cooldown(Duration::from_millis(30));
        assert!(curator.check_health("arxiv"));
        curator.record_failure("arxiv");
        curator.record_failure("arxiv");
        assert!(curator.check_health("arxiv"));
        curator.record_failure("arxiv");
        assert!(!curator.check_health("arxiv"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(curator.check_health("arxiv"));
    }

    #[test]
    fn success_resets_the_failure_counter() {
        let curator = SourceCurator::new();
        curator.record_failure("web");
        curator.record_failure("web");
        curator.record_success("web");
        curator.record_failure("web");
        curator.record_failure("web");
        assert!(curator.check_health("web"));
    }

    #[test]
    fn healthy_sources_filters_in_order() {
        let curator = SourceCurator::new().with_max_failures(1);
        curator.record_failure("b");
        assert_eq!(curator.healthy_sources(&["a", "b", "c"]), vec!["a", "c"]);
    }
}
