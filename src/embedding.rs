//! Embedding service seam and query-embedding cache.
//!
//! The embedding model lives behind a remote, rate-limited API. The harness
//! only ever embeds query text; corpus passages arrive pre-embedded from the
//! ingestion pipeline.

use crate::config::EmbeddingConfig;
use crate::error::{RankfuseError, Result};
use crate::retry::{retryable_status, with_retry, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Text-to-vector embedding service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// OpenAI-style /v1/embeddings client with retry at this boundary.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    retry: RetryPolicy,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            retry: RetryPolicy::default(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if retryable_status(status) {
                return Err(RankfuseError::Http(format!(
                    "embedding API returned {}: {}",
                    status, body
                )));
            }
            return Err(RankfuseError::EmbeddingApi(format!(
                "embedding API returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RankfuseError::EmbeddingApi("empty embedding response".to_string()))
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_retry(&self.retry, "embedding", || self.embed_once(text)).await
    }
}

/// Caching wrapper around an embedding service.
///
/// Explicit capacity and TTL eviction; injected where needed rather than
/// living in ambient process state, so scope teardown is just dropping it.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingService>,
    cache: moka::sync::Cache<String, Vec<f32>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingService>, capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: moka::sync::Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Build from config settings.
    pub fn from_config(inner: Arc<dyn EmbeddingService>, config: &EmbeddingConfig) -> Self {
        Self::new(
            inner,
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }
}

#[async_trait]
impl EmbeddingService for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let vector = self.inner.embed(text).await?;
        self.cache.insert(text.to_string(), vector.clone());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingEmbedder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingService for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[tokio::test]
    async fn test_cache_hits_skip_inner_service() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicU32::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone(), 16, Duration::from_secs(60));

        let first = cached.embed("onboarding flow").await.unwrap();
        let second = cached.embed("onboarding flow").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_queries_both_embedded() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicU32::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone(), 16, Duration::from_secs(60));

        cached.embed("first").await.unwrap();
        cached.embed("second").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_endpoint_construction() {
        let embedder = HttpEmbedder::new(EmbeddingConfig {
            api_base: "https://api.example.com/".to_string(),
            ..Default::default()
        });
        assert_eq!(embedder.endpoint(), "https://api.example.com/v1/embeddings");
    }
}
