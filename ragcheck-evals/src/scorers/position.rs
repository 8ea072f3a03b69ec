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

//! Chunk position verification.
//!
//! Pure functions checking the position invariant:
//! `full_text[start_index..start_index + text.len()] == text`, byte for
//! byte. Violations indicate upstream ingestion bugs and are always
//! reported, never silently dropped.

use ragcheck_core::{Chunk, Corpus, Defect, DefectKind, Document};

/// Outcome of verifying one chunk against its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionResult {
    Match,
    Mismatch(String),
}

impl PositionResult {
    pub fn is_match(&self) -> bool {
        matches!(self, PositionResult::Match)
    }
}

/// Position accuracy over a batch of chunks.
#[derive(Debug, Clone, Default)]
pub struct PositionBatch {
    pub matched: usize,
    pub total: usize,
    pub defects: Vec<Defect>,
}

impl PositionBatch {
    /// `matched / total`; 1.0 for an empty batch (no violations observed).
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }

    fn merge(&mut self, other: PositionBatch) {
        self.matched += other.matched;
        self.total += other.total;
        self.defects.extend(other.defects);
    }
}

/// Verify that `text` occupies `[start_index, start_index + text.len())` in
/// the document, byte for byte. Comparison on bytes so an offset inside a
/// multi-byte UTF-8 character fails the match rather than panicking.
pub fn verify_span(document: &Document, text: &str, start_index: usize) -> PositionResult {
    let full = document.full_text.as_bytes();
    if start_index > full.len() {
        return PositionResult::Mismatch(format!(
            "start_index {} beyond document length {}",
            start_index,
            full.len()
        ));
    }

    let end_index = start_index + text.len();
    if end_index > full.len() {
        return PositionResult::Mismatch(format!(
            "end_index {} beyond document length {}",
            end_index,
            full.len()
        ));
    }

    if &full[start_index..end_index] != text.as_bytes() {
        return PositionResult::Mismatch(format!(
            "substring at [{start_index}, {end_index}) does not match chunk text"
        ));
    }

    PositionResult::Match
}

/// Verify one chunk's recorded position against its document.
pub fn verify(document: &Document, chunk: &Chunk) -> PositionResult {
    if chunk.doc_id != document.doc_id {
        return PositionResult::Mismatch(format!(
            "chunk references document {}, verified against {}",
            chunk.doc_id, document.doc_id
        ));
    }
    verify_span(document, &chunk.text, chunk.start_index)
}

/// Verify every chunk of a document.
pub fn verify_document(document: &Document) -> PositionBatch {
    let mut batch = PositionBatch::default();
    for chunk in &document.chunks {
        batch.total += 1;
        match verify(document, chunk) {
            PositionResult::Match => batch.matched += 1,
            PositionResult::Mismatch(detail) => {
                batch.defects.push(Defect::for_chunk(
                    DefectKind::PositionMismatch,
                    &chunk.doc_id,
                    &chunk.chunk_id,
                    detail,
                ));
            }
        }
    }
    batch
}

/// Verify every chunk of every document in the corpus.
pub fn verify_corpus(corpus: &Corpus) -> PositionBatch {
    let mut batch = PositionBatch::default();
    for document in corpus.documents() {
        batch.merge(verify_document(document));
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_doc() -> Document {
        Document::new(
            "D1",
            "Step 1. Do X. Step 2. Do Y.",
            vec![
                Chunk::new("c1", "D1", "Step 1. Do X.", 0),
                Chunk::new("c2", "D1", "Step 2. Do Y.", 14),
            ],
        )
    }

    #[test]
    fn test_correct_positions_all_match() {
        let doc = two_step_doc();
        let batch = verify_document(&doc);
        assert_eq!(batch.matched, 2);
        assert_eq!(batch.total, 2);
        assert_eq!(batch.accuracy(), 1.0);
        assert!(batch.defects.is_empty());
    }

    #[test]
    fn test_flags_exactly_the_violating_chunks() {
        let doc = Document::new(
            "D1",
            "Step 1. Do X. Step 2. Do Y.",
            vec![
                Chunk::new("c1", "D1", "Step 1. Do X.", 0),
                // Off by one: starts at the separating space.
                Chunk::new("c2", "D1", "Step 2. Do Y.", 13),
            ],
        );
        let batch = verify_document(&doc);
        assert_eq!(batch.matched, 1);
        assert_eq!(batch.total, 2);
        assert_eq!(batch.defects.len(), 1);
        assert_eq!(batch.defects[0].chunk_id.as_deref(), Some("c2"));
        assert_eq!(batch.defects[0].kind, DefectKind::PositionMismatch);
    }

    #[test]
    fn test_end_beyond_document_is_mismatch() {
        let doc = Document::new("D1", "short", vec![]);
        let result = verify_span(&doc, "short but too long", 0);
        assert!(!result.is_match());

        let result = verify_span(&doc, "x", 99);
        assert!(!result.is_match());
    }

    #[test]
    fn test_start_at_document_end_with_empty_text_matches() {
        let doc = Document::new("D1", "abc", vec![]);
        assert!(verify_span(&doc, "", 3).is_match());
    }

    #[test]
    fn test_multibyte_offset_fails_without_panic() {
        // 'é' is two bytes; offset 1 lands inside it.
        let doc = Document::new("D1", "état", vec![]);
        let result = verify_span(&doc, "tat", 1);
        assert!(!result.is_match());
    }

    #[test]
    fn test_doc_id_mismatch_is_flagged() {
        let doc = two_step_doc();
        let foreign = Chunk::new("c9", "D2", "Step 1. Do X.", 0);
        assert!(!verify(&doc, &foreign).is_match());
    }

    #[test]
    fn test_corpus_accuracy() {
        let good = two_step_doc();
        let bad = Document::new("D2", "abcdef", vec![Chunk::new("c3", "D2", "zzz", 0)]);
        let corpus = Corpus::from_documents(vec![good, bad]).unwrap();
        let batch = verify_corpus(&corpus);
        assert_eq!(batch.total, 3);
        assert_eq!(batch.matched, 2);
        assert!((batch.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    }
}
