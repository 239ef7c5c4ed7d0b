//! Engine configuration.
//!
//! Every tunable threshold in the engine lives here so that callers (and
//! tests) have a single place to adjust behavior. Defaults match the
//! shipped heuristics; builders follow the usual `with_*` pattern.

use serde::{Deserialize, Serialize};

/// Configuration for the behavior engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Confidence at or above which a learned behavior is auto-accepted.
    pub auto_accept_threshold: f64,
    /// Similarity at or above which a new candidate merges into an
    /// existing behavior instead of being inserted.
    pub auto_merge_threshold: f64,
    /// Lower bound (inclusive) of the similarity band that derives a
    /// `similar-to` edge.
    pub similar_floor: f64,
    /// Upper bound (exclusive) of the `similar-to` band; at or above this
    /// the pair is a merge candidate, not a link.
    pub similar_ceiling: f64,
    /// Number of shared tags that derives a `similar-to` edge regardless
    /// of lexical score.
    pub shared_tag_link_count: usize,
    /// PageRank damping factor.
    pub pagerank_damping: f64,
    /// PageRank convergence threshold (max per-node delta).
    pub pagerank_epsilon: f64,
    /// PageRank iteration cap.
    pub pagerank_max_iterations: usize,
    /// Maximum propagation depth for spreading activation.
    pub spread_depth: usize,
    /// Per-depth decay factor for spreading activation.
    pub spread_decay: f64,
    /// Activation below which results are dropped.
    pub min_activation: f64,
    /// Activation increase required to re-inject a behavior at a higher
    /// tier within one session.
    pub upgrade_margin: f64,
    /// Seconds since a behavior's last injection after which it may be
    /// re-emitted as reinforcement in a long-running session.
    pub reinforce_interval_secs: u64,
    /// Token budget used when the caller does not supply one.
    pub default_token_budget: usize,
    /// Top-ranked behaviors reserved for the Full tier regardless of
    /// budget.
    pub min_full: usize,
    /// Timeout for semantic analyzer calls, in seconds.
    pub semantic_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 0.8,
            auto_merge_threshold: 0.9,
            similar_floor: 0.5,
            similar_ceiling: 0.9,
            shared_tag_link_count: 2,
            pagerank_damping: 0.85,
            pagerank_epsilon: 1e-6,
            pagerank_max_iterations: 100,
            spread_depth: 3,
            spread_decay: 0.5,
            min_activation: 0.1,
            upgrade_margin: 0.2,
            reinforce_interval_secs: 1800,
            default_token_budget: 2000,
            min_full: 1,
            semantic_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Create a config with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_accept_threshold(mut self, threshold: f64) -> Self {
        self.auto_accept_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_auto_merge_threshold(mut self, threshold: f64) -> Self {
        self.auto_merge_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_spread_depth(mut self, depth: usize) -> Self {
        self.spread_depth = depth;
        self
    }

    pub fn with_spread_decay(mut self, decay: f64) -> Self {
        self.spread_decay = decay.clamp(0.0, 1.0);
        self
    }

    pub fn with_min_activation(mut self, min: f64) -> Self {
        self.min_activation = min.clamp(0.0, 1.0);
        self
    }

    pub fn with_upgrade_margin(mut self, margin: f64) -> Self {
        self.upgrade_margin = margin.clamp(0.0, 1.0);
        self
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.default_token_budget = budget;
        self
    }

    pub fn with_min_full(mut self, min_full: usize) -> Self {
        self.min_full = min_full;
        self
    }

    pub fn with_semantic_timeout(mut self, secs: u64) -> Self {
        self.semantic_timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.auto_accept_threshold, 0.8);
        assert_eq!(config.auto_merge_threshold, 0.9);
        assert_eq!(config.spread_depth, 3);
        assert_eq!(config.upgrade_margin, 0.2);
    }

    #[test]
    fn test_builder_clamps() {
        let config = EngineConfig::new()
            .with_auto_accept_threshold(1.5)
            .with_spread_decay(-0.2);
        assert_eq!(config.auto_accept_threshold, 1.0);
        assert_eq!(config.spread_decay, 0.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = EngineConfig::default().with_token_budget(4000);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
