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

//! Retrieval precision scoring.
//!
//! The relevance judgment is a strategy selected once per run: ground-truth
//! labels, embedding similarity against a threshold, or an external binary
//! judge. Judge failures exclude the affected chunk from both numerator and
//! denominator and flag it in the report rather than silently mis-scoring.

use crate::collaborators::{cosine_similarity, Embedder, Judge};
use crate::EvalError;
use ragcheck_core::{Corpus, Defect, DefectKind, PrecisionResult, Query, RetrievalResult};
use std::sync::Arc;
use tracing::warn;

/// Relevance judgment strategy, fixed at run configuration time.
#[derive(Clone)]
pub enum RelevanceStrategy {
    /// Relevant iff the chunk id is in the query's ground-truth set.
    GroundTruth,
    /// Relevant iff cosine(query embedding, chunk embedding) >= threshold.
    SimilarityThreshold {
        embedder: Arc<dyn Embedder>,
        threshold: f64,
    },
    /// Relevant iff the external judge says so.
    ExternalJudge { judge: Arc<dyn Judge> },
}

/// Precision result plus the defects observed while judging.
#[derive(Debug)]
pub struct PrecisionOutcome {
    /// `None` when every retrieved chunk was excluded from judgment: the
    /// query is skipped for precision, never scored 0.0 from an empty
    /// denominator.
    pub result: Option<PrecisionResult>,
    pub defects: Vec<Defect>,
}

pub struct PrecisionScorer {
    strategy: RelevanceStrategy,
}

impl PrecisionScorer {
    pub fn new(strategy: RelevanceStrategy) -> Self {
        Self { strategy }
    }

    /// Score one retrieval result for a query.
    ///
    /// `total_count` is the number of chunks actually judged. An empty
    /// retrieval result yields precision 0.0 with a zero-retrieval defect,
    /// never a division error; a result whose chunks were all excluded from
    /// judgment yields no precision at all. Ground-truth strategy on a query
    /// without labels is an `InsufficientGroundTruth` skip.
    pub async fn score(
        &self,
        query: &Query,
        retrieval: &RetrievalResult,
        corpus: &Corpus,
    ) -> Result<PrecisionOutcome, EvalError> {
        let mut defects = Vec::new();

        if retrieval.is_empty() {
            defects.push(Defect::for_query(
                DefectKind::ZeroRetrieval,
                &query.query_id,
                "retriever returned no chunks",
            ));
            return Ok(PrecisionOutcome {
                result: Some(PrecisionResult {
                    relevant_count: 0,
                    total_count: 0,
                    excluded_count: 0,
                    precision: 0.0,
                }),
                defects,
            });
        }

        if matches!(self.strategy, RelevanceStrategy::GroundTruth)
            && query.relevant_chunk_ids.is_empty()
        {
            return Err(EvalError::InsufficientGroundTruth(query.query_id.clone()));
        }

        // Embed the query once; shared across all chunk judgments.
        let query_embedding = match &self.strategy {
            RelevanceStrategy::SimilarityThreshold { embedder, .. } => {
                Some(embedder.embed(&query.text).await?)
            }
            _ => None,
        };

        let mut relevant_count = 0usize;
        let mut total_count = 0usize;
        let mut excluded_count = 0usize;

        for hit in &retrieval.hits {
            let Some(chunk) = corpus.resolve_chunk(&hit.chunk_id) else {
                excluded_count += 1;
                defects.push(
                    Defect::for_query(
                        DefectKind::UnknownChunk,
                        &query.query_id,
                        format!("retrieved chunk id {} not in corpus", hit.chunk_id),
                    ),
                );
                continue;
            };

            match &self.strategy {
                RelevanceStrategy::GroundTruth => {
                    total_count += 1;
                    if query.relevant_chunk_ids.contains(&hit.chunk_id) {
                        relevant_count += 1;
                    }
                }
                RelevanceStrategy::SimilarityThreshold { embedder, threshold } => {
                    let chunk_embedding = embedder.embed(&chunk.text).await?;
                    let similarity = cosine_similarity(
                        query_embedding.as_deref().unwrap_or(&[]),
                        &chunk_embedding,
                    );
                    total_count += 1;
                    if similarity >= *threshold {
                        relevant_count += 1;
                    }
                }
                RelevanceStrategy::ExternalJudge { judge } => {
                    match judge.judge_relevance(&query.text, &chunk.text).await {
                        Ok(relevant) => {
                            total_count += 1;
                            if relevant {
                                relevant_count += 1;
                            }
                        }
                        Err(e) => {
                            // Excluded from both counts, flagged, scoring continues.
                            excluded_count += 1;
                            warn!(
                                query_id = %query.query_id,
                                chunk_id = %hit.chunk_id,
                                error = %e,
                                "judge failed, excluding chunk from precision"
                            );
                            defects.push(
                                Defect::for_chunk(
                                    DefectKind::JudgeUnavailable,
                                    &chunk.doc_id,
                                    &hit.chunk_id,
                                    format!("judge failed: {e}"),
                                )
                                .with_query(&query.query_id),
                            );
                        }
                    }
                }
            }
        }

        // Every chunk excluded: the denominator is empty and any score
        // would be fabricated. Skip the metric; the exclusions are already
        // flagged above.
        if total_count == 0 {
            return Ok(PrecisionOutcome {
                result: None,
                defects,
            });
        }

        Ok(PrecisionOutcome {
            result: Some(PrecisionResult {
                relevant_count,
                total_count,
                excluded_count,
                precision: relevant_count as f64 / total_count as f64,
            }),
            defects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{EmbedError, JudgeError};
    use async_trait::async_trait;
    use ragcheck_core::{Chunk, Document, ScoredChunk};

    fn corpus() -> Corpus {
        let chunks = vec![
            Chunk::new("c1", "D1", "alpha one.", 0),
            Chunk::new("c2", "D1", "alpha two.", 10),
            Chunk::new("c3", "D1", "beta three.", 20),
            Chunk::new("c4", "D1", "alpha four.", 31),
            Chunk::new("c5", "D1", "beta five.", 42),
        ];
        let full_text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        Corpus::from_documents(vec![Document::new("D1", full_text, chunks)]).unwrap()
    }

    fn retrieved(ids: &[&str]) -> RetrievalResult {
        let hits = ids
            .iter()
            .enumerate()
            .map(|(rank, id)| ScoredChunk::new(*id, 1.0 - rank as f64 * 0.1))
            .collect();
        RetrievalResult::new("q1", hits)
    }

    #[tokio::test]
    async fn test_ground_truth_four_of_five() {
        // Scenario: 5 retrieved, ground truth marks 4 relevant.
        let query = Query::new("q1", "alpha").with_relevant_chunks(["c1", "c2", "c3", "c4"]);
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "c2", "c3", "c4", "c5"]), &corpus())
            .await
            .unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result.relevant_count, 4);
        assert_eq!(result.total_count, 5);
        assert!((result.precision - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_relevant_is_exactly_one() {
        let query = Query::new("q1", "alpha").with_relevant_chunks(["c1", "c2"]);
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "c2"]), &corpus())
            .await
            .unwrap();
        assert_eq!(outcome.result.unwrap().precision, 1.0);
    }

    #[tokio::test]
    async fn test_empty_retrieval_is_zero_with_defect() {
        let query = Query::new("q1", "alpha").with_relevant_chunks(["c1"]);
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let outcome = scorer.score(&query, &retrieved(&[]), &corpus()).await.unwrap();

        assert_eq!(outcome.result.unwrap().precision, 0.0);
        assert_eq!(outcome.defects.len(), 1);
        assert_eq!(outcome.defects[0].kind, DefectKind::ZeroRetrieval);
    }

    #[tokio::test]
    async fn test_ground_truth_without_labels_is_a_skip() {
        let query = Query::new("q1", "alpha");
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let err = scorer
            .score(&query, &retrieved(&["c1"]), &corpus())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InsufficientGroundTruth(_)));
    }

    #[tokio::test]
    async fn test_unknown_chunk_excluded_and_flagged() {
        let query = Query::new("q1", "alpha").with_relevant_chunks(["c1"]);
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "ghost"]), &corpus())
            .await
            .unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.excluded_count, 1);
        assert_eq!(result.precision, 1.0);
        assert!(outcome
            .defects
            .iter()
            .any(|d| d.kind == DefectKind::UnknownChunk));
    }

    #[tokio::test]
    async fn test_all_chunks_excluded_skips_the_metric() {
        // Nothing was judged, so no precision exists; a 0.0 here would be
        // indistinguishable from a genuinely irrelevant retrieval.
        let query = Query::new("q1", "alpha").with_relevant_chunks(["c1"]);
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let outcome = scorer
            .score(&query, &retrieved(&["ghost1", "ghost2"]), &corpus())
            .await
            .unwrap();

        assert!(outcome.result.is_none());
        assert_eq!(
            outcome
                .defects
                .iter()
                .filter(|d| d.kind == DefectKind::UnknownChunk)
                .count(),
            2
        );
    }

    struct PrefixEmbedder;

    #[async_trait]
    impl Embedder for PrefixEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
            if text.starts_with("alpha") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    #[tokio::test]
    async fn test_similarity_threshold_strategy() {
        let query = Query::new("q1", "alpha topic");
        let scorer = PrecisionScorer::new(RelevanceStrategy::SimilarityThreshold {
            embedder: Arc::new(PrefixEmbedder),
            threshold: 0.7,
        });
        // c1/c2/c4 embed parallel to the query, c3/c5 orthogonal.
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "c2", "c3", "c4", "c5"]), &corpus())
            .await
            .unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result.relevant_count, 3);
        assert_eq!(result.total_count, 5);
        assert!((result.precision - 0.6).abs() < 1e-9);
    }

    /// Judge that errors on one specific chunk text.
    struct FlakyJudge;

    #[async_trait]
    impl Judge for FlakyJudge {
        async fn judge_relevance(&self, _query: &str, chunk_text: &str) -> Result<bool, JudgeError> {
            if chunk_text.contains("three") {
                Err(JudgeError::Unavailable("timeout".into()))
            } else {
                Ok(chunk_text.starts_with("alpha"))
            }
        }
    }

    #[tokio::test]
    async fn test_judge_failure_excludes_chunk_from_both_counts() {
        let query = Query::new("q1", "alpha");
        let scorer = PrecisionScorer::new(RelevanceStrategy::ExternalJudge {
            judge: Arc::new(FlakyJudge),
        });
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "c2", "c3", "c4", "c5"]), &corpus())
            .await
            .unwrap();

        // c3 excluded; of the remaining four, c1/c2/c4 are relevant.
        let result = outcome.result.unwrap();
        assert_eq!(result.total_count, 4);
        assert_eq!(result.relevant_count, 3);
        assert_eq!(result.excluded_count, 1);
        assert!((result.precision - 0.75).abs() < 1e-9);
        assert!(outcome
            .defects
            .iter()
            .any(|d| d.kind == DefectKind::JudgeUnavailable));
    }

    /// Judge that is down for every call.
    struct DownJudge;

    #[async_trait]
    impl Judge for DownJudge {
        async fn judge_relevance(&self, _q: &str, _c: &str) -> Result<bool, JudgeError> {
            Err(JudgeError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_judge_down_for_every_chunk_skips_not_scores() {
        let query = Query::new("q1", "alpha");
        let scorer = PrecisionScorer::new(RelevanceStrategy::ExternalJudge {
            judge: Arc::new(DownJudge),
        });
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "c2", "c3"]), &corpus())
            .await
            .unwrap();

        assert!(outcome.result.is_none());
        assert_eq!(
            outcome
                .defects
                .iter()
                .filter(|d| d.kind == DefectKind::JudgeUnavailable)
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_precision_stays_in_bounds() {
        let query = Query::new("q1", "alpha").with_relevant_chunks(["c9"]);
        let scorer = PrecisionScorer::new(RelevanceStrategy::GroundTruth);
        let outcome = scorer
            .score(&query, &retrieved(&["c1", "c2"]), &corpus())
            .await
            .unwrap();
        let result = outcome.result.unwrap();
        assert!(result.precision >= 0.0 && result.precision <= 1.0);
        assert_eq!(result.precision, 0.0);
    }
}
