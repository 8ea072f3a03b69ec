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

//! Test queries and retrieval results.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A labeled test query. Ground-truth fields are optional; an empty
/// collection means the signal is absent for this query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub query_id: String,
    pub text: String,
    /// Strings that must appear (case-insensitive) in a correct answer.
    #[serde(default)]
    pub expected_entities: Vec<String>,
    /// Ground-truth relevant chunk ids, when available.
    #[serde(default)]
    pub relevant_chunk_ids: HashSet<String>,
}

impl Query {
    pub fn new(query_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            text: text.into(),
            expected_entities: Vec::new(),
            relevant_chunk_ids: HashSet::new(),
        }
    }

    pub fn with_expected_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relevant_chunks<I, S>(mut self, chunk_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevant_chunk_ids = chunk_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Whether any ground-truth signal exists for completeness scoring.
    pub fn has_ground_truth(&self) -> bool {
        !self.expected_entities.is_empty() || !self.relevant_chunk_ids.is_empty()
    }
}

/// One ranked hit from the external retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f64,
}

impl ScoredChunk {
    pub fn new(chunk_id: impl Into<String>, score: f64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            score,
        }
    }
}

/// Ranked chunks returned for a query. Rank order is significant:
/// index 0 is the most relevant hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query_id: String,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(query_id: impl Into<String>, hits: Vec<ScoredChunk>) -> Self {
        Self {
            query_id: query_id.into(),
            hits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.chunk_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_truth_detection() {
        let bare = Query::new("q1", "what is oauth?");
        assert!(!bare.has_ground_truth());

        let with_entities = Query::new("q2", "auth methods")
            .with_expected_entities(["OAuth2", "JWT", "API Key"]);
        assert!(with_entities.has_ground_truth());

        let with_chunks = Query::new("q3", "auth methods").with_relevant_chunks(["c1", "c2"]);
        assert!(with_chunks.has_ground_truth());
    }

    #[test]
    fn test_retrieval_result_ordering_preserved() {
        let result = RetrievalResult::new(
            "q1",
            vec![ScoredChunk::new("c3", 0.9), ScoredChunk::new("c1", 0.5)],
        );
        let ids: Vec<_> = result.chunk_ids().collect();
        assert_eq!(ids, vec!["c3", "c1"]);
    }
}
