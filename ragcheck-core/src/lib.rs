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

//! # Ragcheck Core
//!
//! Shared data model and report contracts for the ragcheck retrieval-quality
//! evaluation engine:
//!
//! - **Corpus**: documents partitioned into position-annotated chunks,
//!   read-only for the duration of an evaluation run
//! - **Queries**: labeled test queries with optional ground truth
//!   (expected entities, relevant chunk ids)
//! - **Answers**: generated answers with embedded citations back into the
//!   corpus
//! - **Report**: the single externally persisted artifact of a run, with
//!   per-query scores, corpus-level boundary analysis, defect records, and
//!   aggregate statistics
//!
//! The evaluation machinery itself lives in `ragcheck-evals`.

pub mod answer;
pub mod config;
pub mod corpus;
pub mod query;
pub mod report;

pub use answer::{Answer, Citation};
pub use config::RunConfig;
pub use corpus::{Chunk, Corpus, CorpusError, Document};
pub use query::{Query, RetrievalResult, ScoredChunk};
pub use report::{
    mean, median, Aggregates, BoundaryIssue, BoundaryReport, CitationRecord, CitationVerdict,
    CompletenessResult, Defect, DefectKind, EvaluationReport, PrecisionResult, QueryEvaluation,
    RunStatus,
};
