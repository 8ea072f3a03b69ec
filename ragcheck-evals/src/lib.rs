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

//! Retrieval-quality evaluation engine for chunked RAG corpora.
//!
//! Measures whether a chunking-and-retrieval pipeline preserves document
//! integrity and returns the right material:
//!
//! - **Position verification**: every chunk's recorded offset reproduces its
//!   text from the source document, byte for byte.
//! - **Boundary analysis**: adjacent chunk pairs checked for mid-sentence
//!   splits, dangling enumeration markers, and (with an embedder) low
//!   semantic coherence.
//! - **Completeness**: does the answer or retrieved set cover the expected
//!   entities or ground-truth chunks for each query?
//! - **Precision**: fraction of retrieved chunks that are relevant, under a
//!   pluggable relevance strategy (ground truth, embedding similarity, or
//!   an external judge).
//! - **Citation accuracy**: each citation structurally resolves and its
//!   citing sentence is actually supported by the cited chunk.
//!
//! The [`Orchestrator`] fans these out over a query set with bounded
//! concurrency, retrying transient retrieval failures and degrading
//! per-query rather than failing the run.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragcheck_core::{Corpus, Query, RunConfig};
//! use ragcheck_evals::{Orchestrator, RelevanceStrategy};
//! # use ragcheck_core::ScoredChunk;
//! # use ragcheck_evals::{Retriever, RetrieverError};
//! # struct MyRetriever;
//! # #[async_trait::async_trait]
//! # impl Retriever for MyRetriever {
//! #     async fn retrieve(&self, _q: &str, _k: usize) -> Result<Vec<ScoredChunk>, RetrieverError> {
//! #         Ok(vec![])
//! #     }
//! # }
//!
//! # async fn run(corpus: Corpus, queries: Vec<Query>) -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::builder(Arc::new(corpus), Arc::new(MyRetriever))
//!     .relevance_strategy(RelevanceStrategy::GroundTruth)
//!     .config(RunConfig::default())
//!     .build()?;
//!
//! let report = orchestrator.run(&queries, &[]).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod embedding_cache;
pub mod orchestrator;
pub mod retry;
pub mod scorers;

pub use collaborators::{
    cosine_similarity, EmbedError, Embedder, Judge, JudgeError, OpenAiEmbedder, OpenAiJudge,
    Retriever, RetrieverError,
};
pub use embedding_cache::{CachedEmbedder, EmbeddingCacheStats};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunState};
pub use retry::{RetryPolicy, RetryingEmbedder, RetryingJudge};
pub use scorers::{
    BoundaryAnalyzer, Candidate, CitationChecker, CompletenessScorer, EntityCheck,
    PrecisionOutcome, PrecisionScorer, RelevanceStrategy,
};

use thiserror::Error;

/// Evaluation errors.
///
/// Only run-level failures abort a run; collaborator failures and
/// ground-truth gaps are handled per query and surface in the report
/// instead.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The run was given no queries to evaluate.
    #[error("query set is empty")]
    EmptyQuerySet,

    /// The corpus cannot be evaluated at all.
    #[error("corpus unavailable: {0}")]
    CorpusUnavailable(String),

    /// A query lacks the ground truth the configured scoring needs. The
    /// orchestrator records these as skips, never as scores.
    #[error("query {0} has insufficient ground truth")]
    InsufficientGroundTruth(String),

    #[error("retriever error: {0}")]
    Retriever(#[from] RetrieverError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("judge error: {0}")]
    Judge(#[from] JudgeError),
}
