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

//! Boundary analysis: detects chunk split points that fragment a semantic
//! unit across two adjacent chunks.
//!
//! Two syntactic rules are applied in order per adjacent pair, first match
//! wins; semantic coherence is an additional, separately reported signal
//! that requires an embedding collaborator and is skipped without one.
//! Deterministic given fixed embeddings.

use crate::collaborators::{cosine_similarity, Embedder};
use ragcheck_core::{BoundaryIssue, BoundaryReport, Chunk, Corpus, DefectKind};
use regex::Regex;
use tracing::warn;

const SENTENCE_TERMINALS: [char; 4] = ['.', '!', '?', ':'];

/// Corpus-level boundary analyzer.
pub struct BoundaryAnalyzer {
    enumeration_marker: Regex,
    coherence_threshold: f64,
}

impl BoundaryAnalyzer {
    pub fn new(coherence_threshold: f64) -> Self {
        Self {
            // Trailing digit followed by '.' and optional whitespace.
            enumeration_marker: Regex::new(r"\d+\.\s*$").expect("static pattern"),
            coherence_threshold,
        }
    }

    /// Apply the syntactic rule set to one adjacent pair. First match wins.
    pub fn detect_syntactic_break(&self, chunk_a: &Chunk, chunk_b: &Chunk) -> Option<BoundaryIssue> {
        let trimmed = chunk_a.text.trim_end();

        // Rule 1: non-empty chunk not ending in sentence-terminal punctuation.
        if !trimmed.is_empty() && !trimmed.ends_with(SENTENCE_TERMINALS) {
            return Some(BoundaryIssue {
                kind: DefectKind::MidSentenceSplit,
                doc_id: chunk_a.doc_id.clone(),
                left_chunk_id: chunk_a.chunk_id.clone(),
                right_chunk_id: chunk_b.chunk_id.clone(),
                detail: format!(
                    "chunk ends mid-sentence ({:?})",
                    tail_of(trimmed, 20)
                ),
            });
        }

        // Rule 2: enumerated-list marker not continued by a digit.
        if self.enumeration_marker.is_match(&chunk_a.text) {
            let continues_with_digit = chunk_b
                .text
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit());
            if !continues_with_digit {
                return Some(BoundaryIssue {
                    kind: DefectKind::SplitEnumeration,
                    doc_id: chunk_a.doc_id.clone(),
                    left_chunk_id: chunk_a.chunk_id.clone(),
                    right_chunk_id: chunk_b.chunk_id.clone(),
                    detail: format!(
                        "enumeration marker ({:?}) not continued by following chunk",
                        tail_of(trimmed, 20)
                    ),
                });
            }
        }

        None
    }

    /// Cosine similarity of the two chunk embeddings, clamped into [0, 1].
    pub async fn semantic_coherence(
        &self,
        chunk_a: &Chunk,
        chunk_b: &Chunk,
        embedder: &dyn Embedder,
    ) -> Result<f64, crate::collaborators::EmbedError> {
        let a = embedder.embed(&chunk_a.text).await?;
        let b = embedder.embed(&chunk_b.text).await?;
        Ok(cosine_similarity(&a, &b).max(0.0))
    }

    /// Analyze every adjacent chunk pair in the corpus.
    ///
    /// A pair flagged by a syntactic rule counts as one issue toward the
    /// rate; low coherence on the same pair is reported as an additional
    /// issue but does not count the pair twice. Embedding failures skip the
    /// coherence check for the affected pair; they never abort the analysis.
    pub async fn analyze_corpus(
        &self,
        corpus: &Corpus,
        embedder: Option<&dyn Embedder>,
    ) -> BoundaryReport {
        let mut pairs_examined = 0usize;
        let mut flagged_pairs = 0usize;
        let mut issues = Vec::new();

        for document in corpus.documents() {
            for (left, right) in document.adjacent_pairs() {
                pairs_examined += 1;
                let mut flagged = false;

                if let Some(issue) = self.detect_syntactic_break(left, right) {
                    issues.push(issue);
                    flagged = true;
                }

                if let Some(embedder) = embedder {
                    match self.semantic_coherence(left, right, embedder).await {
                        Ok(coherence) if coherence < self.coherence_threshold => {
                            issues.push(BoundaryIssue {
                                kind: DefectKind::LowCoherence,
                                doc_id: left.doc_id.clone(),
                                left_chunk_id: left.chunk_id.clone(),
                                right_chunk_id: right.chunk_id.clone(),
                                detail: format!(
                                    "semantic coherence {:.3} below threshold {:.3}",
                                    coherence, self.coherence_threshold
                                ),
                            });
                            flagged = true;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                doc_id = %left.doc_id,
                                left = %left.chunk_id,
                                right = %right.chunk_id,
                                error = %e,
                                "embedding failed, skipping coherence check for pair"
                            );
                        }
                    }
                }

                if flagged {
                    flagged_pairs += 1;
                }
            }
        }

        let issue_rate = if pairs_examined == 0 {
            0.0
        } else {
            flagged_pairs as f64 / pairs_examined as f64
        };

        BoundaryReport {
            pairs_examined,
            flagged_pairs,
            issue_rate,
            issues,
        }
    }
}

fn tail_of(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        text.to_string()
    } else {
        chars[chars.len() - max_chars..].iter().collect()
    }
}
