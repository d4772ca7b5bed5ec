//! Passage index adapters: thin wrappers over the vector and lexical stores.
//!
//! The production stores live elsewhere; these traits are the seam the fusion
//! engine consumes. The in-memory implementations back the CLI's JSON-corpus
//! mode and the test suite.

use crate::error::Result;
use crate::passage::Passage;
use async_trait::async_trait;
use std::collections::HashMap;

/// A vector-path hit: passage plus raw cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub passage: Passage,
    pub similarity: f32,
}

/// A lexical-path hit: passage plus raw (un-normalized) relevance score.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub passage: Passage,
    pub score: f32,
}

/// Vector top-K by cosine similarity.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` passages most similar to `embedding`, best first.
    async fn top_k(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>>;
}

/// Lexical full-text search with OR semantics over query tokens.
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// Return every passage matching at least one token, with a raw relevance
    /// score per passage. Order is unspecified; the engine normalizes and
    /// ranks.
    async fn search(&self, tokens: &[String]) -> Result<Vec<LexicalHit>>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Brute-force in-memory vector index.
///
/// Passages without an embedding are skipped at build time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorIndex {
    entries: Vec<Passage>,
}

impl InMemoryVectorIndex {
    /// Build an index from passages that carry embeddings.
    pub fn build(passages: &[Passage]) -> Self {
        Self {
            entries: passages
                .iter()
                .filter(|p| p.embedding.is_some())
                .cloned()
                .collect(),
        }
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorIndex {
    async fn top_k(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|p| VectorHit {
                similarity: cosine_similarity(
                    embedding,
                    p.embedding.as_deref().unwrap_or_default(),
                ),
                passage: p.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.passage.id.cmp(&b.passage.id))
        });
        hits.truncate(k);

        Ok(hits)
    }
}

/// Inverted-index lexical search with term-frequency relevance.
///
/// A passage's raw score is the total occurrence count of the query tokens in
/// its text. OR semantics: a single matching token is enough to hit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLexicalIndex {
    /// token -> (passage index, occurrence count)
    postings: HashMap<String, Vec<(usize, u32)>>,
    passages: Vec<Passage>,
}

impl InMemoryLexicalIndex {
    /// Build an inverted index over passage text.
    pub fn build(passages: &[Passage]) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();

        for (idx, passage) in passages.iter().enumerate() {
            let mut counts: HashMap<String, u32> = HashMap::new();
            for token in super::engine::tokenize_query(&passage.text) {
                *counts.entry(token).or_insert(0) += 1;
            }
            for (token, count) in counts {
                postings.entry(token).or_default().push((idx, count));
            }
        }

        Self {
            postings,
            passages: passages.to_vec(),
        }
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl LexicalSearch for InMemoryLexicalIndex {
    async fn search(&self, tokens: &[String]) -> Result<Vec<LexicalHit>> {
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for token in tokens {
            if let Some(posting) = self.postings.get(token) {
                for (idx, count) in posting {
                    *scores.entry(*idx).or_insert(0.0) += *count as f32;
                }
            }
        }

        Ok(scores
            .into_iter()
            .map(|(idx, score)| LexicalHit {
                passage: self.passages[idx].clone(),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::create_sample_corpus;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_vector_top_k_sorted_and_truncated() {
        let index = InMemoryVectorIndex::build(&create_sample_corpus());
        let hits = index.top_k(&[1.0, 0.0, 0.0, 0.0], 3).await.unwrap();

        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_lexical_or_semantics() {
        let index = InMemoryLexicalIndex::build(&create_sample_corpus());

        // "onboarding" and "pricing" never co-occur in a sample passage, so
        // AND semantics would return nothing. OR must return both groups.
        let hits = index
            .search(&["onboarding".to_string(), "pricing".to_string()])
            .await
            .unwrap();

        let texts: Vec<&str> = hits.iter().map(|h| h.passage.text.as_str()).collect();
        assert!(texts.iter().any(|t| t.contains("onboarding")));
        assert!(texts.iter().any(|t| t.to_lowercase().contains("pricing")));
    }

    #[tokio::test]
    async fn test_lexical_unknown_token_no_hits() {
        let index = InMemoryLexicalIndex::build(&create_sample_corpus());
        let hits = index.search(&["zzzquux".to_string()]).await.unwrap();
        assert!(hits.is_empty());
    }
}
