// Copyright 2025 Ragcheck Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Run configuration: thresholds, timeouts, retry policy, concurrency.

use serde::{Deserialize, Serialize};

/// Configuration for one evaluation run. Thresholds default to reasonable
/// starting points; tune them against a labeled validation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Chunks requested from the retriever per query.
    pub retrieval_k: usize,

    /// Per-call timeout for external collaborators, in seconds.
    pub retrieval_timeout_secs: u64,

    /// Bounded retries per collaborator call before the item is skipped.
    pub max_retries: u32,

    /// Base backoff between retries, in milliseconds (jittered).
    pub retry_backoff_ms: u64,

    /// Maximum concurrent per-query evaluations.
    pub max_concurrency: usize,

    /// Adjacent pairs with semantic coherence below this are flagged.
    pub coherence_threshold: f64,

    /// Similarity-threshold relevance strategy cutoff.
    pub similarity_threshold: f64,

    /// Minimum fraction of salient phrases a cited chunk must contain.
    pub support_threshold: f64,

    /// Capacity of the bounded embedding cache.
    pub embedding_cache_capacity: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 5,
            retrieval_timeout_secs: 10,
            max_retries: 1,
            retry_backoff_ms: 200,
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            coherence_threshold: 0.3,
            similarity_threshold: 0.7,
            support_threshold: 0.5,
            embedding_cache_capacity: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.retrieval_k, 5);
        assert_eq!(config.retrieval_timeout_secs, 10);
        assert_eq!(config.max_retries, 1);
        assert!((config.coherence_threshold - 0.3).abs() < f64::EPSILON);
        assert!((config.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.support_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.max_concurrency >= 1);
    }
}
