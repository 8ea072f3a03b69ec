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

//! Citation accuracy checking.
//!
//! Two steps per citation: a structural check (the referenced chunk exists
//! and passes position verification) and a content-support check (salient
//! phrases of the citing sentence appear in the chunk text). A broken
//! citation never reaches the content check and is never reported as mere
//! partial support.

use crate::scorers::position;
use ragcheck_core::{Answer, Citation, CitationRecord, CitationVerdict, Corpus};
use std::collections::HashSet;

/// Common English words excluded from salient-phrase extraction. Only words
/// of length >= 3 matter here; shorter tokens are dropped by the length
/// filter anyway.
const STOPWORDS: &[&str] = &[
    "the", "and", "are", "was", "were", "has", "have", "had", "not", "but", "its", "his", "her",
    "their", "they", "them", "then", "than", "that", "this", "these", "those", "with", "for",
    "from", "into", "onto", "over", "under", "about", "after", "before", "between", "each",
    "few", "more", "most", "other", "some", "such", "only", "own", "same", "very", "too", "can",
    "could", "should", "would", "will", "shall", "may", "might", "must", "been", "being", "all",
    "any", "what", "when", "where", "which", "who", "whom", "why", "how", "also", "does", "did",
];

/// Citation accuracy checker.
pub struct CitationChecker {
    support_threshold: f64,
    stopwords: HashSet<&'static str>,
}

impl CitationChecker {
    pub fn new(support_threshold: f64) -> Self {
        Self {
            support_threshold,
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    /// Verify one citation against the corpus and the answer that carries it.
    pub fn verify(&self, citation: &Citation, answer: &Answer, corpus: &Corpus) -> CitationRecord {
        // Step 1: structural check.
        let Some(chunk) = corpus.get_chunk(&citation.doc_id, &citation.chunk_id) else {
            return self.broken(citation, answer, "cited chunk does not exist in corpus");
        };
        let Some(document) = corpus.get_document(&citation.doc_id) else {
            return self.broken(citation, answer, "cited document does not exist in corpus");
        };

        if let position::PositionResult::Mismatch(detail) =
            position::verify_span(document, &chunk.text, citation.start_index)
        {
            return self.broken(
                citation,
                answer,
                format!("position verification failed: {detail}"),
            );
        }

        // Step 2: content support check.
        let sentence = citing_sentence(&answer.text, citation.marker_offset);
        let phrases = self.salient_phrases(sentence);

        if phrases.is_empty() {
            // Nothing checkable in the citing sentence: vacuously supported.
            return CitationRecord {
                query_id: answer.query_id.clone(),
                doc_id: citation.doc_id.clone(),
                chunk_id: citation.chunk_id.clone(),
                verdict: CitationVerdict::Supported,
                support_ratio: Some(1.0),
                detail: "no salient phrases in citing sentence".to_string(),
            };
        }

        let chunk_lowered = chunk.text.to_lowercase();
        let found = phrases
            .iter()
            .filter(|p| chunk_lowered.contains(p.as_str()))
            .count();
        let ratio = found as f64 / phrases.len() as f64;

        let verdict = if ratio >= self.support_threshold {
            CitationVerdict::Supported
        } else if ratio > 0.0 {
            CitationVerdict::PartialSupport
        } else {
            CitationVerdict::Unsupported
        };

        CitationRecord {
            query_id: answer.query_id.clone(),
            doc_id: citation.doc_id.clone(),
            chunk_id: citation.chunk_id.clone(),
            verdict,
            support_ratio: Some(ratio),
            detail: format!("{found}/{} salient phrases found in cited chunk", phrases.len()),
        }
    }

    /// Verify every citation of every answer.
    pub fn verify_answers(&self, answers: &[Answer], corpus: &Corpus) -> Vec<CitationRecord> {
        answers
            .iter()
            .flat_map(|answer| {
                answer
                    .citations
                    .iter()
                    .map(|citation| self.verify(citation, answer, corpus))
            })
            .collect()
    }

    fn broken(&self, citation: &Citation, answer: &Answer, detail: impl Into<String>) -> CitationRecord {
        CitationRecord {
            query_id: answer.query_id.clone(),
            doc_id: citation.doc_id.clone(),
            chunk_id: citation.chunk_id.clone(),
            verdict: CitationVerdict::Broken,
            support_ratio: None,
            detail: detail.into(),
        }
    }

    /// Unique lowercase non-stopword tokens of length >= 3.
    fn salient_phrases(&self, sentence: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut phrases = Vec::new();
        for token in sentence.split(|c: char| !c.is_alphanumeric()) {
            if token.len() < 3 {
                continue;
            }
            let lowered = token.to_lowercase();
            if self.stopwords.contains(lowered.as_str()) {
                continue;
            }
            if seen.insert(lowered.clone()) {
                phrases.push(lowered);
            }
        }
        phrases
    }
}

impl Default for CitationChecker {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// The sentence of `text` containing the citation marker. Without a marker
/// offset the whole text is used. The offset is generator-supplied and may
/// land inside a multi-byte character; it is walked back to the nearest
/// char boundary so a malformed marker degrades instead of panicking.
fn citing_sentence(text: &str, marker_offset: Option<usize>) -> &str {
    let Some(offset) = marker_offset else {
        return text;
    };
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }

    let start = text[..offset]
        .rfind(['.', '!', '?'])
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = text[offset..]
        .find(['.', '!', '?'])
        .map(|i| offset + i + 1)
        .unwrap_or(text.len());

    text[start..end].trim()
}
