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

//! Evaluation orchestrator: fans the scorers out over a query set with
//! bounded concurrency and assembles the report.
//!
//! Per-query failures degrade that query only; the run aborts solely on
//! run-level errors (empty query set, unusable corpus). Cancellation stops
//! dispatching new queries and reports whatever finished, marked as a run
//! with skipped items.

use crate::collaborators::{Embedder, Judge, Retriever, RetrieverError};
use crate::embedding_cache::CachedEmbedder;
use crate::retry::{RetryPolicy, RetryingEmbedder, RetryingJudge};
use crate::scorers::{
    position, BoundaryAnalyzer, Candidate, CitationChecker, CompletenessScorer, PrecisionScorer,
    RelevanceStrategy,
};
use crate::EvalError;
use chrono::Utc;
use parking_lot::Mutex;
use ragcheck_core::{
    Aggregates, Answer, CitationVerdict, Corpus, Defect, DefectKind, EvaluationReport, Query,
    QueryEvaluation, RetrievalResult, RunConfig, RunStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a run, observable while it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Retrieving,
    Scoring,
    Aggregating,
    Complete,
    Failed,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    corpus: Arc<Corpus>,
    retriever: Arc<dyn Retriever>,
    strategy: RelevanceStrategy,
    embedder: Option<Arc<dyn Embedder>>,
    entity_judge: Option<Arc<dyn Judge>>,
    config: RunConfig,
}

impl OrchestratorBuilder {
    /// Relevance strategy for precision scoring. Defaults to ground truth.
    pub fn relevance_strategy(mut self, strategy: RelevanceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Embedder used for boundary coherence analysis. Wrapped in a bounded
    /// cache so repeated chunk texts embed once per run.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Judge for entity-presence checks in completeness scoring. Without
    /// one, entities are matched by case-insensitive substring.
    pub fn entity_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.entity_judge = Some(judge);
        self
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Orchestrator, EvalError> {
        if self.corpus.is_empty() {
            return Err(EvalError::CorpusUnavailable(
                "corpus contains no documents".to_string(),
            ));
        }

        // Every collaborator shares the same retry budget; the cache sits
        // outside the retrying embedder so hits never pay for a retry.
        let policy = RetryPolicy::from_config(&self.config);

        let embedder: Option<Arc<dyn Embedder>> = self.embedder.map(|inner| {
            let retrying: Arc<dyn Embedder> = Arc::new(RetryingEmbedder::new(inner, policy));
            Arc::new(CachedEmbedder::new(retrying, self.config.embedding_cache_capacity))
                as Arc<dyn Embedder>
        });

        let strategy = match self.strategy {
            RelevanceStrategy::GroundTruth => RelevanceStrategy::GroundTruth,
            RelevanceStrategy::SimilarityThreshold { embedder, threshold } => {
                RelevanceStrategy::SimilarityThreshold {
                    embedder: Arc::new(RetryingEmbedder::new(embedder, policy)),
                    threshold,
                }
            }
            RelevanceStrategy::ExternalJudge { judge } => RelevanceStrategy::ExternalJudge {
                judge: Arc::new(RetryingJudge::new(judge, policy)),
            },
        };

        let completeness = match self.entity_judge {
            Some(judge) => {
                CompletenessScorer::with_judge(Arc::new(RetryingJudge::new(judge, policy)))
            }
            None => CompletenessScorer::new(),
        };

        Ok(Orchestrator {
            corpus: self.corpus,
            retriever: self.retriever,
            precision: Arc::new(PrecisionScorer::new(strategy)),
            completeness: Arc::new(completeness),
            citation: CitationChecker::new(self.config.support_threshold),
            boundary: BoundaryAnalyzer::new(self.config.coherence_threshold),
            embedder,
            config: self.config,
            cancel: CancellationToken::new(),
            state: Mutex::new(RunState::Initialized),
        })
    }
}

/// Coordinates one evaluation run over a corpus, a query set, and optional
/// generated answers.
pub struct Orchestrator {
    corpus: Arc<Corpus>,
    retriever: Arc<dyn Retriever>,
    precision: Arc<PrecisionScorer>,
    completeness: Arc<CompletenessScorer>,
    citation: CitationChecker,
    boundary: BoundaryAnalyzer,
    embedder: Option<Arc<dyn Embedder>>,
    config: RunConfig,
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder(corpus: Arc<Corpus>, retriever: Arc<dyn Retriever>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            corpus,
            retriever,
            strategy: RelevanceStrategy::GroundTruth,
            embedder: None,
            entity_judge: None,
            config: RunConfig::default(),
        }
    }

    /// Token that cancels the run when triggered. Queries not yet dispatched
    /// are recorded as skipped; the report covers everything that finished.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock();
        debug!(from = ?*state, to = ?next, "run state transition");
        *state = next;
    }

    /// Execute one full evaluation run.
    ///
    /// `answers` are optional generated answers; queries without one are
    /// scored against the union of their retrieved chunk texts, and citation
    /// checking covers only the answers supplied.
    pub async fn run(
        &self,
        queries: &[Query],
        answers: &[Answer],
    ) -> Result<EvaluationReport, EvalError> {
        if queries.is_empty() {
            return Err(EvalError::EmptyQuerySet);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, queries = queries.len(), answers = answers.len(), "starting evaluation run");

        let answer_by_query: HashMap<&str, &Answer> = answers
            .iter()
            .map(|a| (a.query_id.as_str(), a))
            .collect();

        self.transition(RunState::Retrieving);

        // Per-query fan-out, bounded by a semaphore; the corpus-level checks
        // run concurrently with the query tasks.
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(queries.len());

        for query in queries {
            let query = query.clone();
            let answer_text = answer_by_query
                .get(query.query_id.as_str())
                .map(|a| a.text.clone());
            let corpus = Arc::clone(&self.corpus);
            let retriever = Arc::clone(&self.retriever);
            let precision = Arc::clone(&self.precision);
            let completeness = Arc::clone(&self.completeness);
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let query_id = query.query_id.clone();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return skipped_evaluation(&query_id);
                };
                if cancel.is_cancelled() {
                    return skipped_evaluation(&query_id);
                }
                tokio::select! {
                    _ = cancel.cancelled() => skipped_evaluation(&query_id),
                    outcome = evaluate_query(
                        query, answer_text, corpus, retriever, precision, completeness, config,
                    ) => outcome,
                }
            }));
        }

        let corpus_checks = async {
            let position_batch = position::verify_corpus(&self.corpus);
            let boundary = self
                .boundary
                .analyze_corpus(&self.corpus, self.embedder.as_deref())
                .await;
            (position_batch, boundary)
        };

        let (query_results, (position_batch, boundary)) =
            tokio::join!(futures::future::join_all(handles), corpus_checks);

        self.transition(RunState::Scoring);

        let mut query_evaluations = Vec::with_capacity(queries.len());
        let mut defects = Vec::new();
        let mut run_errors = Vec::new();

        for result in query_results {
            match result {
                Ok((evaluation, query_defects)) => {
                    query_evaluations.push(evaluation);
                    defects.extend(query_defects);
                }
                Err(e) => {
                    warn!(error = %e, "query evaluation task panicked");
                    run_errors.push(format!("query task failed: {e}"));
                }
            }
        }
        query_evaluations.sort_by(|a, b| a.query_id.cmp(&b.query_id));

        defects.extend(position_batch.defects);
        for issue in &boundary.issues {
            defects.push(Defect::for_chunk(
                issue.kind,
                &issue.doc_id,
                &issue.left_chunk_id,
                issue.detail.clone(),
            ));
        }

        let citations = self.citation.verify_answers(answers, &self.corpus);
        for record in &citations {
            let kind = match record.verdict {
                CitationVerdict::Broken => Some(DefectKind::BrokenCitation),
                CitationVerdict::PartialSupport => Some(DefectKind::PartialSupport),
                _ => None,
            };
            if let Some(kind) = kind {
                defects.push(
                    Defect::for_chunk(kind, &record.doc_id, &record.chunk_id, record.detail.clone())
                        .with_query(&record.query_id),
                );
            }
        }

        self.transition(RunState::Aggregating);
        let aggregates = Aggregates::compute(&query_evaluations, &boundary, &citations);

        let status = if run_errors.is_empty() {
            self.transition(RunState::Complete);
            RunStatus::Complete {
                skipped: aggregates.queries_skipped + aggregates.queries_failed,
            }
        } else {
            self.transition(RunState::Failed);
            RunStatus::Failed { errors: run_errors }
        };

        let report = EvaluationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            queries: query_evaluations,
            boundary,
            citations,
            aggregates,
            defects,
        };
        info!(%run_id, "{}", report.summary());
        Ok(report)
    }
}

fn skipped_evaluation(query_id: &str) -> (QueryEvaluation, Vec<Defect>) {
    (
        QueryEvaluation {
            query_id: query_id.to_string(),
            retrieved_count: 0,
            retrieval_failed: false,
            precision: None,
            completeness: None,
        },
        Vec::new(),
    )
}

/// Evaluate one query end to end: retrieve with bounded retry, then score
/// precision and completeness. Every failure is recorded as a defect on the
/// returned evaluation, never propagated.
async fn evaluate_query(
    query: Query,
    answer_text: Option<String>,
    corpus: Arc<Corpus>,
    retriever: Arc<dyn Retriever>,
    precision: Arc<PrecisionScorer>,
    completeness: Arc<CompletenessScorer>,
    config: RunConfig,
) -> (QueryEvaluation, Vec<Defect>) {
    let mut defects = Vec::new();

    let hits = match retrieve_with_retry(&query, retriever.as_ref(), &config).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(query_id = %query.query_id, error = %e, "retrieval failed after retries");
            defects.push(Defect::for_query(
                DefectKind::RetrievalFailed,
                &query.query_id,
                format!("retrieval failed after {} retries: {e}", config.max_retries),
            ));
            return (
                QueryEvaluation {
                    query_id: query.query_id.clone(),
                    retrieved_count: 0,
                    retrieval_failed: true,
                    precision: None,
                    completeness: None,
                },
                defects,
            );
        }
    };

    let retrieval = RetrievalResult::new(&query.query_id, hits);

    let precision_result = match precision.score(&query, &retrieval, &corpus).await {
        Ok(outcome) => {
            defects.extend(outcome.defects);
            outcome.result
        }
        Err(e) => {
            defects.push(metric_skip_defect(&query.query_id, "precision", &e));
            None
        }
    };

    // Candidate material: the generated answer if supplied, else the union
    // of the retrieved chunk texts.
    let retrieved_ids: HashSet<String> = retrieval.chunk_ids().map(String::from).collect();
    let candidate_text = answer_text.unwrap_or_else(|| {
        retrieval
            .chunk_ids()
            .filter_map(|id| corpus.resolve_chunk(id))
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    });
    let candidate = Candidate {
        text: &candidate_text,
        chunk_ids: &retrieved_ids,
    };

    let completeness_result = match completeness.score(&query, &candidate).await {
        Ok(result) => Some(result),
        Err(e) => {
            defects.push(metric_skip_defect(&query.query_id, "completeness", &e));
            None
        }
    };

    (
        QueryEvaluation {
            query_id: query.query_id.clone(),
            retrieved_count: retrieval.hits.len(),
            retrieval_failed: false,
            precision: precision_result,
            completeness: completeness_result,
        },
        defects,
    )
}

fn metric_skip_defect(query_id: &str, metric: &str, error: &EvalError) -> Defect {
    let kind = match error {
        EvalError::InsufficientGroundTruth(_) => DefectKind::InsufficientGroundTruth,
        EvalError::Embedding(_) => DefectKind::EmbedderUnavailable,
        _ => DefectKind::JudgeUnavailable,
    };
    Defect::for_query(kind, query_id, format!("{metric} skipped: {error}"))
}

/// Retrieval with a per-call timeout under the shared retry policy.
async fn retrieve_with_retry(
    query: &Query,
    retriever: &dyn Retriever,
    config: &RunConfig,
) -> Result<Vec<ragcheck_core::ScoredChunk>, RetrieverError> {
    let timeout = Duration::from_secs(config.retrieval_timeout_secs);
    RetryPolicy::from_config(config)
        .run("retrieve", || async {
            match tokio::time::timeout(
                timeout,
                retriever.retrieve(&query.text, config.retrieval_k),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RetrieverError::Timeout),
            }
        })
        .await
}
