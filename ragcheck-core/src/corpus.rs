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

//! Document corpus: the read-only chunked input of an evaluation run.
//!
//! Documents and chunks are produced once by an external ingestion
//! collaborator. The corpus is never mutated during a run, so it can be
//! shared as `Arc<Corpus>` across concurrent per-query workers without
//! locking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A contiguous substring of a source document, the unit of retrieval.
///
/// Position invariant: `full_text[start_index..start_index + text.len()]`
/// must equal `text` byte-for-byte. Violations are position-integrity
/// defects surfaced by the position verifier, not panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique within the owning document.
    pub chunk_id: String,
    /// Back-reference to the owning document.
    pub doc_id: String,
    /// The chunk text as recorded by ingestion.
    pub text: String,
    /// Byte offset into the document's `full_text`.
    pub start_index: usize,
}

impl Chunk {
    pub fn new(
        chunk_id: impl Into<String>,
        doc_id: impl Into<String>,
        text: impl Into<String>,
        start_index: usize,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            text: text.into(),
            start_index,
        }
    }

    /// Derived end offset (exclusive), in bytes.
    pub fn end_index(&self) -> usize {
        self.start_index + self.text.len()
    }
}

/// A source document with its ordered chunk sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub full_text: String,
    /// Chunks in document order. Adjacency here defines the boundary pairs
    /// examined by the boundary analyzer.
    pub chunks: Vec<Chunk>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, full_text: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self {
            doc_id: doc_id.into(),
            full_text: full_text.into(),
            chunks,
        }
    }

    /// Look up a chunk by id within this document.
    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.chunk_id == chunk_id)
    }

    /// Adjacent chunk pairs in document order.
    pub fn adjacent_pairs(&self) -> impl Iterator<Item = (&Chunk, &Chunk)> {
        self.chunks.windows(2).map(|w| (&w[0], &w[1]))
    }
}

/// Errors raised while assembling a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("duplicate document id: {0}")]
    DuplicateDocument(String),

    #[error("duplicate chunk id {chunk_id} (documents {first} and {second})")]
    DuplicateChunkId {
        chunk_id: String,
        first: String,
        second: String,
    },

    #[error("chunk {chunk_id} references document {referenced}, ingested under {actual}")]
    DocIdMismatch {
        chunk_id: String,
        referenced: String,
        actual: String,
    },
}

/// The full document set under evaluation.
///
/// Maintains a global `chunk_id -> doc_id` index so retrieval results,
/// which carry only chunk ids, can be resolved back to their documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    documents: HashMap<String, Document>,
    chunk_index: HashMap<String, String>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from a document set, validating id uniqueness.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self, CorpusError> {
        let mut corpus = Self::new();
        for doc in documents {
            corpus.ingest(doc)?;
        }
        Ok(corpus)
    }

    /// Add one document, indexing its chunks.
    pub fn ingest(&mut self, document: Document) -> Result<(), CorpusError> {
        if self.documents.contains_key(&document.doc_id) {
            return Err(CorpusError::DuplicateDocument(document.doc_id));
        }
        for chunk in &document.chunks {
            if chunk.doc_id != document.doc_id {
                return Err(CorpusError::DocIdMismatch {
                    chunk_id: chunk.chunk_id.clone(),
                    referenced: chunk.doc_id.clone(),
                    actual: document.doc_id.clone(),
                });
            }
            if let Some(existing) = self.chunk_index.get(&chunk.chunk_id) {
                return Err(CorpusError::DuplicateChunkId {
                    chunk_id: chunk.chunk_id.clone(),
                    first: existing.clone(),
                    second: document.doc_id.clone(),
                });
            }
            self.chunk_index
                .insert(chunk.chunk_id.clone(), document.doc_id.clone());
        }
        self.documents.insert(document.doc_id.clone(), document);
        Ok(())
    }

    pub fn get_document(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }

    /// Look up a chunk under a specific document, as cited.
    pub fn get_chunk(&self, doc_id: &str, chunk_id: &str) -> Option<&Chunk> {
        self.documents.get(doc_id)?.chunk(chunk_id)
    }

    /// Resolve a bare chunk id (as returned by the retriever) to its chunk.
    pub fn resolve_chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        let doc_id = self.chunk_index.get(chunk_id)?;
        self.get_chunk(doc_id, chunk_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
