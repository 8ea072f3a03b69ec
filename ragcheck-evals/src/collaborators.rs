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

//! External collaborator interfaces: retriever, embedder, LLM judge.
//!
//! The retriever is the system under test and ships no implementation here.
//! The embedder and judge get OpenAI-compatible reference implementations so
//! the similarity and judge strategies work out of the box.

use async_trait::async_trait;
use ragcheck_core::ScoredChunk;
use thiserror::Error;

/// Errors from the external retrieval collaborator.
#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("retriever unavailable: {0}")]
    Unavailable(String),

    #[error("retriever timed out")]
    Timeout,
}

/// Errors from embedding collaborators.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the relevance judge collaborator.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),

    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The retrieval function under evaluation. Returns ranked chunks for a
/// query; rank 0 is the most relevant.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<ScoredChunk>, RetrieverError>;
}

/// Embedding collaborator. Must be deterministic for identical input within
/// a run; wrap with [`crate::embedding_cache::CachedEmbedder`] to enforce
/// that against non-deterministic backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError>;

    /// Embed a batch of texts. Default implementation embeds one at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// Binary relevance judge (e.g. an LLM call).
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge_relevance(&self, query_text: &str, chunk_text: &str) -> Result<bool, JudgeError>;
}

/// Cosine similarity of two equal-length vectors, clamped to [-1, 1].
/// Returns 0.0 for near-zero vectors.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < 1e-9 || norm_b < 1e-9 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// OpenAI-compatible embedding client.
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::ApiError("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        // Fall back to a default embedding model if handed a chat model name.
        let embedding_model = if self.model.contains("embedding") {
            &self.model
        } else {
            "text-embedding-3-small"
        };

        let request = serde_json::json!({
            "model": embedding_model,
            "input": texts
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(EmbedError::RateLimitExceeded);
            }
            return Err(EmbedError::ApiError(error_text));
        }

        let response_data: serde_json::Value = response.json().await?;

        let mut embeddings = Vec::new();
        if let Some(data) = response_data["data"].as_array() {
            for item in data {
                if let Some(embedding_vec) = item["embedding"].as_array() {
                    let vec: Vec<f64> = embedding_vec.iter().filter_map(|v| v.as_f64()).collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != texts.len() {
            return Err(EmbedError::ApiError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

/// OpenAI-compatible chat-completion judge. Asks for a strict JSON verdict
/// `{"relevant": bool}` at temperature 0.
pub struct OpenAiJudge {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiJudge {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn relevance_prompt(query_text: &str, chunk_text: &str) -> String {
        format!(
            r#"Judge whether the retrieved passage is relevant for answering the query.

QUERY:
{query_text}

PASSAGE:
{chunk_text}

Respond in JSON:
{{"relevant": true}} or {{"relevant": false}}"#
        )
    }

    /// Parse a `{"relevant": bool}` verdict out of model output.
    fn parse_verdict(content: &str) -> Result<bool, JudgeError> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| JudgeError::InvalidVerdict(format!("not JSON: {e}")))?;
        value["relevant"]
            .as_bool()
            .ok_or_else(|| JudgeError::InvalidVerdict(format!("missing relevant field: {content}")))
    }
}

#[async_trait]
impl Judge for OpenAiJudge {
    async fn judge_relevance(&self, query_text: &str, chunk_text: &str) -> Result<bool, JudgeError> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert relevance judge. Respond only with valid JSON."
                },
                {
                    "role": "user",
                    "content": Self::relevance_prompt(query_text, chunk_text)
                }
            ],
            "temperature": 0.0,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(JudgeError::Unavailable(error_text));
        }

        let response_data: serde_json::Value = response.json().await?;
        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| JudgeError::InvalidVerdict("missing content".to_string()))?;

        Self::parse_verdict(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        // Near-zero vectors yield 0 instead of NaN.
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_parse_verdict() {
        assert!(OpenAiJudge::parse_verdict(r#"{"relevant": true}"#).unwrap());
        assert!(!OpenAiJudge::parse_verdict(r#"{"relevant": false}"#).unwrap());
        assert!(matches!(
            OpenAiJudge::parse_verdict("not json"),
            Err(JudgeError::InvalidVerdict(_))
        ));
        assert!(matches!(
            OpenAiJudge::parse_verdict(r#"{"score": 0.9}"#),
            Err(JudgeError::InvalidVerdict(_))
        ));
    }
}
