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

//! Completeness scoring: does the candidate (generated answer or union of
//! retrieved chunks) contain everything the ground truth expects?
//!
//! Two ground-truth signals, tried in order: expected entities, then
//! relevant chunk ids. With neither the query is skipped, never scored —
//! the report must distinguish "scored low" from "could not be scored".

use crate::collaborators::Judge;
use crate::EvalError;
use ragcheck_core::{CompletenessResult, Query};
use std::collections::HashSet;
use std::sync::Arc;

/// Strategy for the entity-presence check.
#[derive(Clone)]
pub enum EntityCheck {
    /// Case-insensitive substring match (deterministic default).
    Substring,
    /// Delegate each entity-presence decision to an external judge.
    Judge(Arc<dyn Judge>),
}

/// The candidate material a query is scored against.
pub struct Candidate<'a> {
    /// Generated answer text, or the union of retrieved chunk texts.
    pub text: &'a str,
    /// Chunk ids actually retrieved for the query.
    pub chunk_ids: &'a HashSet<String>,
}

/// Completeness scorer. Stateless apart from the configured entity check;
/// the contract (inputs, [0, 1] output, skip on missing ground truth) is
/// identical for every strategy.
pub struct CompletenessScorer {
    entity_check: EntityCheck,
}

impl CompletenessScorer {
    pub fn new() -> Self {
        Self {
            entity_check: EntityCheck::Substring,
        }
    }

    pub fn with_judge(judge: Arc<dyn Judge>) -> Self {
        Self {
            entity_check: EntityCheck::Judge(judge),
        }
    }

    /// Score one query against a candidate.
    ///
    /// Returns `EvalError::InsufficientGroundTruth` when the query carries
    /// neither expected entities nor relevant chunk ids; the caller must
    /// record the skip, not fabricate a score.
    pub async fn score(
        &self,
        query: &Query,
        candidate: &Candidate<'_>,
    ) -> Result<CompletenessResult, EvalError> {
        if !query.expected_entities.is_empty() {
            return self.score_entities(query, candidate.text).await;
        }

        if !query.relevant_chunk_ids.is_empty() {
            return Ok(Self::score_chunk_coverage(query, candidate.chunk_ids));
        }

        Err(EvalError::InsufficientGroundTruth(query.query_id.clone()))
    }

    async fn score_entities(
        &self,
        query: &Query,
        candidate_text: &str,
    ) -> Result<CompletenessResult, EvalError> {
        let lowered = candidate_text.to_lowercase();
        let mut matched = 0usize;
        let mut missing = Vec::new();

        for entity in &query.expected_entities {
            let present = match &self.entity_check {
                EntityCheck::Substring => lowered.contains(&entity.to_lowercase()),
                EntityCheck::Judge(judge) => judge
                    .judge_relevance(entity, candidate_text)
                    .await
                    .map_err(EvalError::from)?,
            };
            if present {
                matched += 1;
            } else {
                missing.push(entity.clone());
            }
        }

        let expected = query.expected_entities.len();
        Ok(CompletenessResult {
            matched_count: matched,
            expected_count: expected,
            score: matched as f64 / expected as f64,
            missing,
        })
    }

    fn score_chunk_coverage(query: &Query, candidate_chunk_ids: &HashSet<String>) -> CompletenessResult {
        let mut missing: Vec<String> = query
            .relevant_chunk_ids
            .iter()
            .filter(|id| !candidate_chunk_ids.contains(*id))
            .cloned()
            .collect();
        missing.sort();

        let expected = query.relevant_chunk_ids.len();
        let matched = expected - missing.len();
        CompletenessResult {
            matched_count: matched,
            expected_count: expected,
            score: matched as f64 / expected as f64,
            missing,
        }
    }
}

impl Default for CompletenessScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(text: &'a str, chunk_ids: &'a HashSet<String>) -> Candidate<'a> {
        Candidate { text, chunk_ids }
    }

    #[tokio::test]
    async fn test_entity_presence_fraction() {
        // Scenario: three expected entities, two present.
        let query = Query::new("q1", "auth methods")
            .with_expected_entities(["OAuth2", "JWT", "API Key"]);
        let ids = HashSet::new();
        let result = CompletenessScorer::new()
            .score(
                &query,
                &candidate("Use OAuth2 with a JWT bearer token.", &ids),
            )
            .await
            .unwrap();

        assert_eq!(result.matched_count, 2);
        assert_eq!(result.expected_count, 3);
        assert!((result.score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.missing, vec!["API Key".to_string()]);
    }

    #[tokio::test]
    async fn test_entity_match_is_case_insensitive() {
        let query = Query::new("q1", "auth").with_expected_entities(["oauth2"]);
        let ids = HashSet::new();
        let result = CompletenessScorer::new()
            .score(&query, &candidate("OAUTH2 is supported.", &ids))
            .await
            .unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_chunk_coverage_fallback() {
        let query = Query::new("q1", "auth").with_relevant_chunks(["c1", "c2", "c3", "c4"]);
        let ids: HashSet<String> = ["c1", "c3", "c9"].iter().map(|s| s.to_string()).collect();
        let result = CompletenessScorer::new()
            .score(&query, &candidate("", &ids))
            .await
            .unwrap();

        assert_eq!(result.matched_count, 2);
        assert_eq!(result.expected_count, 4);
        assert_eq!(result.score, 0.5);
        assert_eq!(result.missing, vec!["c2".to_string(), "c4".to_string()]);
    }

    #[tokio::test]
    async fn test_entities_take_priority_over_chunk_ids() {
        let query = Query::new("q1", "auth")
            .with_expected_entities(["JWT"])
            .with_relevant_chunks(["c1"]);
        let ids = HashSet::new();
        let result = CompletenessScorer::new()
            .score(&query, &candidate("JWT everywhere", &ids))
            .await
            .unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_no_ground_truth_is_a_skip_not_a_score() {
        let query = Query::new("q1", "auth");
        let ids = HashSet::new();
        let err = CompletenessScorer::new()
            .score(&query, &candidate("anything", &ids))
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InsufficientGroundTruth(_)));
    }

    #[tokio::test]
    async fn test_adding_covering_chunk_never_decreases_score() {
        let query = Query::new("q1", "auth").with_relevant_chunks(["c1", "c2"]);

        let before: HashSet<String> = ["c1"].iter().map(|s| s.to_string()).collect();
        let mut after = before.clone();
        after.insert("c2".to_string());

        let scorer = CompletenessScorer::new();
        let score_before = scorer
            .score(&query, &candidate("", &before))
            .await
            .unwrap()
            .score;
        let score_after = scorer
            .score(&query, &candidate("", &after))
            .await
            .unwrap()
            .score;
        assert!(score_after >= score_before);
        assert_eq!(score_after, 1.0);
    }
}
