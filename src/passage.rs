//! Passage data model and corpus store interface.
//!
//! Passages are the immutable unit of retrievable text. They are created by an
//! external ingestion pipeline and are read-only to this crate: nothing here
//! ever mutates one.

use crate::error::{RankfuseError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Opaque identifier.
    pub id: String,

    /// Grouping key for the parent document/episode.
    pub parent_id: String,

    /// The passage text.
    pub text: String,

    /// Attributed source (speaker/author), when known. Used by the relevance
    /// estimator to match a query's expected entities.
    #[serde(default)]
    pub source: Option<String>,

    /// Structured annotations (e.g. "claims", "frameworks"). Opaque to the
    /// engine; passed through for downstream consumers.
    #[serde(default)]
    pub annotations: HashMap<String, Vec<serde_json::Value>>,

    /// Dense embedding, when the ingestion pipeline has produced one.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Total order within the parent (e.g. a timestamp offset).
    #[serde(default)]
    pub position: f64,
}

impl Passage {
    /// Create a passage with just the fields retrieval needs.
    pub fn new(id: impl Into<String>, parent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            text: text.into(),
            source: None,
            annotations: HashMap::new(),
            embedding: None,
            position: 0.0,
        }
    }

    /// Builder-style source attribution.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builder-style embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Builder-style position.
    pub fn with_position(mut self, position: f64) -> Self {
        self.position = position;
        self
    }
}

/// Read-only access to the text corpus, keyed by passage and parent ids.
///
/// The corpus itself is an external collaborator; this trait is the seam the
/// engine and harness consume.
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Fetch passages by id. Unknown ids are skipped, not errors.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Passage>>;

    /// Fetch all passages for a parent document, ordered by position.
    async fn fetch_by_parent(&self, parent_id: &str) -> Result<Vec<Passage>>;
}

/// In-memory corpus store backing the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPassageStore {
    passages: HashMap<String, Passage>,
}

impl InMemoryPassageStore {
    /// Build a store from a list of passages.
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages: passages.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Load a corpus from a JSON file containing an array of passages.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| RankfuseError::io(path, e))?;
        let passages: Vec<Passage> = serde_json::from_str(&content)
            .map_err(|e| RankfuseError::Serialization(format!("Failed to parse corpus: {}", e)))?;

        if passages.is_empty() {
            return Err(RankfuseError::InvalidCorpus(path.to_path_buf()));
        }

        Ok(Self::new(passages))
    }

    /// Number of passages in the store.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Iterate over all passages.
    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.values()
    }

    /// All passages, cloned into a vector.
    pub fn all(&self) -> Vec<Passage> {
        self.passages.values().cloned().collect()
    }
}

#[async_trait]
impl PassageStore for InMemoryPassageStore {
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Passage>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.passages.get(id).cloned())
            .collect())
    }

    async fn fetch_by_parent(&self, parent_id: &str) -> Result<Vec<Passage>> {
        let mut passages: Vec<Passage> = self
            .passages
            .values()
            .filter(|p| p.parent_id == parent_id)
            .cloned()
            .collect();
        passages.sort_by(|a, b| {
            a.position
                .partial_cmp(&b.position)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(passages)
    }
}

/// Shared handle to a passage store.
pub type SharedPassageStore = Arc<dyn PassageStore>;

/// Create a small hand-written corpus for offline runs and tests.
///
/// Toy 4-dimensional embeddings stand in for real vectors; they only need to
/// produce sensible cosine orderings.
pub fn create_sample_corpus() -> Vec<Passage> {
    vec![
        Passage::new(
            "ep1-p1",
            "ep1",
            "The onboarding flow should ask for the user's goal before anything else. \
             Most products bury that question three screens deep and lose half their signups.",
        )
        .with_source("Maya Chen")
        .with_embedding(vec![0.9, 0.1, 0.0, 0.1])
        .with_position(12.5),
        Passage::new(
            "ep1-p2",
            "ep1",
            "Pricing pages work best with three tiers. Anchor high, make the middle \
             tier the obvious choice, and keep the free tier genuinely useful.",
        )
        .with_source("Maya Chen")
        .with_embedding(vec![0.1, 0.9, 0.1, 0.0])
        .with_position(340.0),
        Passage::new(
            "ep2-p1",
            "ep2",
            "Churn is a lagging indicator. By the time someone cancels, the decision \
             was made weeks earlier when they stopped hitting their aha moment.",
        )
        .with_source("Derek Okafor")
        .with_embedding(vec![0.2, 0.3, 0.85, 0.1])
        .with_position(55.0),
        Passage::new(
            "ep2-p2",
            "ep2",
            "We rebuilt onboarding around a single activation metric: first report \
             shared within ten minutes. Everything else in the flow got cut.",
        )
        .with_source("Derek Okafor")
        .with_embedding(vec![0.85, 0.15, 0.2, 0.1])
        .with_position(410.0),
        Passage::new(
            "ep3-p1",
            "ep3",
            "Usage-based pricing aligns cost with value, but it terrifies finance \
             teams who need predictable spend. Offer a committed-use discount.",
        )
        .with_source("Priya Nair")
        .with_embedding(vec![0.05, 0.88, 0.15, 0.1])
        .with_position(98.0),
        Passage::new(
            "ep3-p2",
            "ep3",
            "Retention interviews beat surveys. Five calls with churned customers \
             taught us more than a thousand NPS responses.",
        )
        .with_source("Priya Nair")
        .with_embedding(vec![0.15, 0.2, 0.9, 0.05])
        .with_position(520.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_by_id_skips_unknown() {
        let store = InMemoryPassageStore::new(create_sample_corpus());
        let got = store
            .fetch(&["ep1-p1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "ep1-p1");
    }

    #[tokio::test]
    async fn test_fetch_by_parent_ordered_by_position() {
        let store = InMemoryPassageStore::new(create_sample_corpus());
        let got = store.fetch_by_parent("ep1").await.unwrap();
        assert_eq!(got.len(), 2);
        assert!(got[0].position < got[1].position);
    }

    #[test]
    fn test_sample_corpus_has_sources_and_embeddings() {
        for passage in create_sample_corpus() {
            assert!(passage.source.is_some());
            assert!(passage.embedding.is_some());
            assert!(!passage.text.is_empty());
        }
    }

    #[test]
    fn test_corpus_roundtrip_json() {
        let corpus = create_sample_corpus();
        let json = serde_json::to_string(&corpus).unwrap();
        let parsed: Vec<Passage> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), corpus.len());
    }
}
