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

//! Bounded, jittered retry for collaborator calls.
//!
//! Every external collaborator (retriever, embedder, judge) shares the same
//! retry budget from [`RunConfig`]. The decorators wrap a collaborator so
//! the scorers stay retry-agnostic; only after the budget is exhausted does
//! the error reach a scorer, which then records the skip.

use crate::collaborators::{EmbedError, Embedder, Judge, JudgeError};
use async_trait::async_trait;
use rand::Rng;
use ragcheck_core::RunConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Retry budget and backoff for one collaborator call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff_ms)
    }

    /// Run `op` up to `max_retries + 1` times, sleeping a jittered backoff
    /// between attempts. Returns the last error once the budget is spent.
    pub async fn run<T, E, F, Fut>(&self, what: &str, op: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt > self.max_retries {
                return Err(error);
            }

            let base = self.backoff_ms;
            let jitter = rand::thread_rng().gen_range(0..base.max(1));
            debug!(
                what,
                attempt,
                error = %error,
                backoff_ms = base + jitter,
                "retrying collaborator call"
            );
            tokio::time::sleep(Duration::from_millis(base + jitter)).await;
        }
    }
}

/// [`Embedder`] decorator applying the retry policy to every call.
pub struct RetryingEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        self.policy.run("embed", || self.inner.embed(text)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        self.policy
            .run("embed_batch", || self.inner.embed_batch(texts))
            .await
    }
}

/// [`Judge`] decorator applying the retry policy to every call.
pub struct RetryingJudge {
    inner: Arc<dyn Judge>,
    policy: RetryPolicy,
}

impl RetryingJudge {
    pub fn new(inner: Arc<dyn Judge>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Judge for RetryingJudge {
    async fn judge_relevance(&self, query_text: &str, chunk_text: &str) -> Result<bool, JudgeError> {
        self.policy
            .run("judge_relevance", || {
                self.inner.judge_relevance(query_text, chunk_text)
            })
            .await
    }
}
