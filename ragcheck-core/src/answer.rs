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

//! Generated answers and their citations back into the corpus.
//!
//! Answers are produced per-run by an external generation collaborator and
//! are not persisted by the engine.

use serde::{Deserialize, Serialize};

/// A pointer from a generated answer back to the chunk/offset that is
/// claimed to support it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    pub chunk_id: String,
    /// Offset of the cited chunk within the document, as claimed by the
    /// generator. Verified against the corpus by the citation checker.
    pub start_index: usize,
    /// Byte offset of the citation marker within `Answer.text`, when the
    /// generator records one. Used to locate the sentence the citation is
    /// attached to; without it the whole answer text is checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_offset: Option<usize>,
}

impl Citation {
    pub fn new(doc_id: impl Into<String>, chunk_id: impl Into<String>, start_index: usize) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id: chunk_id.into(),
            start_index,
            marker_offset: None,
        }
    }

    pub fn with_marker_offset(mut self, offset: usize) -> Self {
        self.marker_offset = Some(offset);
        self
    }
}

/// A generated answer for a query, with its ordered citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub query_id: String,
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl Answer {
    pub fn new(query_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_builder() {
        let citation = Citation::new("D1", "c1", 0).with_marker_offset(42);
        assert_eq!(citation.marker_offset, Some(42));

        let answer = Answer::new("q1", "OAuth2 is an authorization framework.")
            .with_citations(vec![citation]);
        assert_eq!(answer.citations.len(), 1);
    }
}
