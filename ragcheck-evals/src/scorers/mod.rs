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

//! The individual quality checks composed by the orchestrator.

pub mod boundary;
pub mod citation;
pub mod completeness;
pub mod position;
pub mod precision;

pub use boundary::BoundaryAnalyzer;
pub use citation::CitationChecker;
pub use completeness::{Candidate, CompletenessScorer, EntityCheck};
pub use position::{PositionBatch, PositionResult};
pub use precision::{PrecisionOutcome, PrecisionScorer, RelevanceStrategy};
