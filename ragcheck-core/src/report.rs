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

//! The evaluation report: the sole externally persisted artifact of a run.
//!
//! Everything here is serde-serializable; the recommended wire form is JSON.
//! Per-item failures are attached as defect records rather than propagated,
//! so a completed run with skipped items is always distinguishable from a
//! clean full-coverage evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of defects and skips an evaluation run can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// Chunk metadata does not match the source document text.
    PositionMismatch,
    /// A chunk boundary splits a sentence.
    MidSentenceSplit,
    /// A chunk boundary splits an enumerated list.
    SplitEnumeration,
    /// Adjacent chunks with semantic coherence below threshold.
    LowCoherence,
    /// A citation whose referenced chunk does not exist or fails position
    /// verification.
    BrokenCitation,
    /// A citation with some, but insufficient, content support.
    PartialSupport,
    /// The retriever returned no chunks for a query.
    ZeroRetrieval,
    /// The retriever failed or timed out for a query.
    RetrievalFailed,
    /// The external judge failed for a chunk; excluded from scoring.
    JudgeUnavailable,
    /// The embedding collaborator failed; the dependent metric was skipped.
    EmbedderUnavailable,
    /// Neither expected entities nor relevant chunk ids were available.
    InsufficientGroundTruth,
    /// A retrieved or cited chunk id the corpus cannot resolve.
    UnknownChunk,
}

/// One flagged defect, keyed by whichever identifiers apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defect {
    pub kind: DefectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub detail: String,
}

impl Defect {
    pub fn for_query(kind: DefectKind, query_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            query_id: Some(query_id.into()),
            doc_id: None,
            chunk_id: None,
            detail: detail.into(),
        }
    }

    pub fn for_chunk(
        kind: DefectKind,
        doc_id: impl Into<String>,
        chunk_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            query_id: None,
            doc_id: Some(doc_id.into()),
            chunk_id: Some(chunk_id.into()),
            detail: detail.into(),
        }
    }

    pub fn with_query(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }
}

/// Precision over one retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecisionResult {
    /// Chunks judged relevant.
    pub relevant_count: usize,
    /// Chunks actually judged (excluded chunks are not counted here).
    pub total_count: usize,
    /// Chunks excluded from judgment (judge failures, unresolvable ids).
    pub excluded_count: usize,
    /// `relevant_count / total_count`; 0.0 for an empty retrieval result.
    /// A fully excluded result produces no `PrecisionResult` at all.
    pub precision: f64,
}

/// Completeness of a candidate answer or chunk set against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessResult {
    pub matched_count: usize,
    pub expected_count: usize,
    pub score: f64,
    /// Expected entities or chunk ids not covered by the candidate.
    pub missing: Vec<String>,
}

/// Verdict for a single citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationVerdict {
    /// Both the structural and content-support checks passed.
    Supported,
    /// Content support above zero but below the configured threshold.
    /// Counts as inaccurate in the aggregate.
    PartialSupport,
    /// No salient phrase of the citing sentence appears in the chunk.
    Unsupported,
    /// The referenced chunk does not exist or fails position verification.
    Broken,
}

impl CitationVerdict {
    pub fn is_accurate(&self) -> bool {
        matches!(self, CitationVerdict::Supported)
    }
}

/// Outcome of checking one citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationRecord {
    pub query_id: String,
    pub doc_id: String,
    pub chunk_id: String,
    pub verdict: CitationVerdict,
    /// Fraction of salient phrases found in the cited chunk. Absent for
    /// broken citations, which never reach the content check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_ratio: Option<f64>,
    pub detail: String,
}

/// One flagged boundary between two adjacent chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryIssue {
    pub kind: DefectKind,
    pub doc_id: String,
    pub left_chunk_id: String,
    pub right_chunk_id: String,
    pub detail: String,
}

/// Corpus-level boundary analysis outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryReport {
    pub pairs_examined: usize,
    /// Pairs flagged by any rule; a pair flagged by several rules counts
    /// once here while every issue is reported individually.
    pub flagged_pairs: usize,
    pub issue_rate: f64,
    pub issues: Vec<BoundaryIssue>,
}

impl BoundaryReport {
    pub fn empty() -> Self {
        Self {
            pairs_examined: 0,
            flagged_pairs: 0,
            issue_rate: 0.0,
            issues: Vec::new(),
        }
    }
}

/// Per-query scoring outcome. `None` metrics were skipped, with the reason
/// recorded in the defect list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvaluation {
    pub query_id: String,
    pub retrieved_count: usize,
    pub retrieval_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<PrecisionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessResult>,
}

impl QueryEvaluation {
    /// A query that produced no usable metric at all.
    pub fn is_skipped(&self) -> bool {
        self.precision.is_none() && self.completeness.is_none()
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Run finished; `skipped` queries produced no metric and are excluded
    /// from the aggregates.
    Complete { skipped: usize },
    /// Run hit an unrecoverable error; the report is partial.
    Failed { errors: Vec<String> },
}

/// Aggregate metrics across all scored queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregates {
    pub precision_mean: Option<f64>,
    pub precision_median: Option<f64>,
    pub completeness_mean: Option<f64>,
    pub completeness_median: Option<f64>,
    pub boundary_issue_rate: f64,
    /// Citations passing both checks over citations examined. Absent when
    /// no citations were supplied.
    pub citation_accuracy: Option<f64>,
    pub queries_scored: usize,
    pub queries_skipped: usize,
    pub queries_failed: usize,
}

impl Aggregates {
    /// Compute aggregates from per-query records, the boundary report, and
    /// citation records. Skipped and failed queries are excluded from the
    /// means but counted separately.
    pub fn compute(
        queries: &[QueryEvaluation],
        boundary: &BoundaryReport,
        citations: &[CitationRecord],
    ) -> Self {
        let precisions: Vec<f64> = queries
            .iter()
            .filter_map(|q| q.precision.as_ref().map(|p| p.precision))
            .collect();
        let completenesses: Vec<f64> = queries
            .iter()
            .filter_map(|q| q.completeness.as_ref().map(|c| c.score))
            .collect();

        let queries_failed = queries.iter().filter(|q| q.retrieval_failed).count();
        let queries_skipped = queries
            .iter()
            .filter(|q| !q.retrieval_failed && q.is_skipped())
            .count();
        let queries_scored = queries.len() - queries_failed - queries_skipped;

        let citation_accuracy = if citations.is_empty() {
            None
        } else {
            let accurate = citations.iter().filter(|c| c.verdict.is_accurate()).count();
            Some(accurate as f64 / citations.len() as f64)
        };

        Self {
            precision_mean: mean(&precisions),
            precision_median: median(&precisions),
            completeness_mean: mean(&completenesses),
            completeness_median: median(&completenesses),
            boundary_issue_rate: boundary.issue_rate,
            citation_accuracy,
            queries_scored,
            queries_skipped,
            queries_failed,
        }
    }
}

/// The full evaluation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Per-query records, sorted by `query_id`.
    pub queries: Vec<QueryEvaluation>,
    pub boundary: BoundaryReport,
    pub citations: Vec<CitationRecord>,
    pub aggregates: Aggregates,
    pub defects: Vec<Defect>,
}

impl EvaluationReport {
    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        match &self.status {
            RunStatus::Complete { skipped } if *skipped > 0 => format!(
                "Complete with {} skipped items: {}/{} queries scored, boundary issue rate {:.3}",
                skipped,
                self.aggregates.queries_scored,
                self.queries.len(),
                self.aggregates.boundary_issue_rate
            ),
            RunStatus::Complete { .. } => format!(
                "Complete: {}/{} queries scored, boundary issue rate {:.3}",
                self.aggregates.queries_scored,
                self.queries.len(),
                self.aggregates.boundary_issue_rate
            ),
            RunStatus::Failed { errors } => {
                format!("Failed with {} unrecoverable error(s)", errors.len())
            }
        }
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median; `None` for an empty slice. Even-length slices average the two
/// middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_query(id: &str, precision: f64, completeness: f64) -> QueryEvaluation {
        QueryEvaluation {
            query_id: id.to_string(),
            retrieved_count: 5,
            retrieval_failed: false,
            precision: Some(PrecisionResult {
                relevant_count: (precision * 5.0) as usize,
                total_count: 5,
                excluded_count: 0,
                precision,
            }),
            completeness: Some(CompletenessResult {
                matched_count: 1,
                expected_count: 1,
                score: completeness,
                missing: vec![],
            }),
        }
    }

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[]), None);
        assert_eq!(median(&[]), None);
        assert_eq!(mean(&[0.5, 1.0]), Some(0.75));
        assert_eq!(median(&[0.2, 0.8, 1.0]), Some(0.8));
        assert_eq!(median(&[0.2, 0.4, 0.6, 1.0]), Some(0.5));
    }

    #[test]
    fn test_aggregates_exclude_skipped_and_failed() {
        let queries = vec![
            scored_query("q1", 0.8, 1.0),
            scored_query("q2", 0.4, 0.5),
            QueryEvaluation {
                query_id: "q3".to_string(),
                retrieved_count: 0,
                retrieval_failed: true,
                precision: None,
                completeness: None,
            },
            QueryEvaluation {
                query_id: "q4".to_string(),
                retrieved_count: 3,
                retrieval_failed: false,
                precision: Some(PrecisionResult {
                    relevant_count: 3,
                    total_count: 3,
                    excluded_count: 0,
                    precision: 1.0,
                }),
                completeness: None,
            },
        ];

        let aggregates = Aggregates::compute(&queries, &BoundaryReport::empty(), &[]);
        assert_eq!(aggregates.queries_failed, 1);
        assert_eq!(aggregates.queries_skipped, 0);
        assert_eq!(aggregates.queries_scored, 3);
        let precision_mean = aggregates.precision_mean.unwrap();
        assert!((precision_mean - (0.8 + 0.4 + 1.0) / 3.0).abs() < 1e-9);
        // Only q1/q2 had completeness scores.
        assert_eq!(aggregates.completeness_mean, Some(0.75));
    }

    #[test]
    fn test_citation_accuracy_excludes_broken_and_partial() {
        let citations = vec![
            CitationRecord {
                query_id: "q1".into(),
                doc_id: "D1".into(),
                chunk_id: "c1".into(),
                verdict: CitationVerdict::Supported,
                support_ratio: Some(0.9),
                detail: String::new(),
            },
            CitationRecord {
                query_id: "q1".into(),
                doc_id: "D1".into(),
                chunk_id: "c9".into(),
                verdict: CitationVerdict::Broken,
                support_ratio: None,
                detail: "chunk not found".into(),
            },
            CitationRecord {
                query_id: "q2".into(),
                doc_id: "D1".into(),
                chunk_id: "c2".into(),
                verdict: CitationVerdict::PartialSupport,
                support_ratio: Some(0.25),
                detail: String::new(),
            },
        ];

        let aggregates = Aggregates::compute(&[], &BoundaryReport::empty(), &citations);
        let accuracy = aggregates.citation_accuracy.unwrap();
        assert!((accuracy - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_summary_mentions_skips() {
        let report = EvaluationReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            status: RunStatus::Complete { skipped: 2 },
            queries: vec![],
            boundary: BoundaryReport::empty(),
            citations: vec![],
            aggregates: Aggregates::default(),
            defects: vec![],
        };
        assert!(report.summary().contains("2 skipped"));
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = EvaluationReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            status: RunStatus::Complete { skipped: 0 },
            queries: vec![scored_query("q1", 0.8, 1.0)],
            boundary: BoundaryReport::empty(),
            citations: vec![],
            aggregates: Aggregates::default(),
            defects: vec![Defect::for_chunk(
                DefectKind::PositionMismatch,
                "D1",
                "c1",
                "substring mismatch at offset 3",
            )],
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed: EvaluationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.queries.len(), 1);
        assert_eq!(parsed.defects[0].kind, DefectKind::PositionMismatch);
        assert_eq!(parsed.status, RunStatus::Complete { skipped: 0 });
    }
}
