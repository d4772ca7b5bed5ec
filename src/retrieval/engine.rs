//! Candidate fusion engine: retrieve from both paths, deduplicate, fuse.

use super::adapters::{LexicalSearch, VectorSearch};
use crate::error::Result;
use crate::passage::Passage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Over-fetch multiplier for the vector path. Fusion may promote
/// lexically-strong but semantically-middling passages that a tight
/// `match_count` limit on the vector path would exclude.
const VECTOR_OVERFETCH: usize = 5;

/// A candidate produced for one query.
///
/// Raw `None` scores are preserved so diagnostics can distinguish "path never
/// saw this passage" from "path scored it zero"; fusion treats both as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub passage: Passage,
    /// Cosine similarity from the vector path, if it returned this passage.
    pub semantic_score: Option<f32>,
    /// Normalized lexical relevance, if the lexical path matched this passage.
    pub lexical_score: Option<f32>,
    /// Weighted combination of the two, in [0, 1] when weights sum to 1.
    pub fused_score: f32,
}

/// Per-query retrieval parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub match_count: usize,
    pub match_threshold: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            match_count: 10,
            match_threshold: 0.2,
        }
    }
}

impl From<&crate::config::RetrievalConfig> for RetrievalOptions {
    fn from(config: &crate::config::RetrievalConfig) -> Self {
        Self {
            semantic_weight: config.semantic_weight,
            lexical_weight: config.lexical_weight,
            match_count: config.match_count,
            match_threshold: config.match_threshold,
        }
    }
}

impl RetrievalOptions {
    /// Semantic-only variant used by the `semantic` algorithm and by the
    /// lexical-down degradation path.
    pub fn semantic_only(mut self) -> Self {
        self.semantic_weight = 1.0;
        self.lexical_weight = 0.0;
        self
    }
}

/// Tokenize free text for lexical matching: case-folded, punctuation stripped,
/// words of length >= 3, first occurrence order, duplicates removed.
///
/// Tokens that reduce to nothing (pure punctuation) are rejected individually
/// rather than failing the whole query.
pub fn tokenize_query(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tokens = Vec::new();

    for word in text.split_whitespace() {
        let token: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect();

        if token.chars().count() < 3 {
            continue;
        }
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }

    tokens
}

/// Retrieves from both index adapters and fuses the results.
#[derive(Clone)]
pub struct HybridRetriever {
    vector: Arc<dyn VectorSearch>,
    lexical: Arc<dyn LexicalSearch>,
}

impl HybridRetriever {
    pub fn new(vector: Arc<dyn VectorSearch>, lexical: Arc<dyn LexicalSearch>) -> Self {
        Self { vector, lexical }
    }

    /// Produce the fused, ranked candidate list for one query.
    ///
    /// Degradation policy: if one adapter is unavailable, fall back to the
    /// other signal alone (its weight effectively 1.0) instead of failing the
    /// query. Only both adapters failing is an error.
    pub async fn retrieve(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        opts: RetrievalOptions,
    ) -> Result<Vec<ScoredCandidate>> {
        // Vector path: over-fetch, then drop weak matches.
        let (vector_hits, vector_down) = match self
            .vector
            .top_k(query_embedding, opts.match_count * VECTOR_OVERFETCH)
            .await
        {
            Ok(hits) => {
                let kept: Vec<_> = hits
                    .into_iter()
                    .filter(|h| h.similarity > opts.match_threshold)
                    .collect();
                (kept, false)
            }
            Err(e) => {
                warn!(error = %e, "vector adapter unavailable, falling back to lexical-only");
                (Vec::new(), true)
            }
        };

        // Lexical path: OR semantics over the query tokens.
        let tokens = tokenize_query(query_text);
        let (lexical_hits, lexical_down) = if opts.lexical_weight <= 0.0 || tokens.is_empty() {
            (Vec::new(), false)
        } else {
            match self.lexical.search(&tokens).await {
                Ok(hits) => (hits, false),
                Err(e) => {
                    warn!(error = %e, "lexical adapter unavailable, falling back to semantic-only");
                    (Vec::new(), true)
                }
            }
        };

        if vector_down && lexical_down {
            return Err(crate::error::RankfuseError::Http(
                "both retrieval adapters unavailable".to_string(),
            ));
        }

        // Normalize lexical scores against this query's own best match so the
        // two signals share a [0, 1] scale regardless of corpus size.
        let max_lexical = lexical_hits
            .iter()
            .map(|h| h.score)
            .fold(f32::NEG_INFINITY, f32::max);
        let max_lexical = if max_lexical > 0.0 { max_lexical } else { 1.0 };

        // Union by passage id, vector candidates first.
        let mut merged: HashMap<String, ScoredCandidate> = HashMap::new();

        for hit in vector_hits {
            merged.insert(
                hit.passage.id.clone(),
                ScoredCandidate {
                    passage: hit.passage,
                    semantic_score: Some(hit.similarity),
                    lexical_score: None,
                    fused_score: 0.0,
                },
            );
        }

        // Lexical scores merge into existing vector candidates; passages the
        // vector path missed become lexical-only candidates, capped at
        // match_count to recover keyword-exact matches the embedding model
        // under-weights.
        let mut lexical_only: Vec<(String, f32, Passage)> = Vec::new();
        for hit in lexical_hits {
            let normalized = hit.score / max_lexical;
            if let Some(candidate) = merged.get_mut(&hit.passage.id) {
                candidate.lexical_score = Some(normalized);
            } else {
                lexical_only.push((hit.passage.id.clone(), normalized, hit.passage));
            }
        }

        lexical_only.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        for (id, normalized, passage) in lexical_only.into_iter().take(opts.match_count) {
            merged.insert(
                id,
                ScoredCandidate {
                    passage,
                    semantic_score: None,
                    lexical_score: Some(normalized),
                    fused_score: 0.0,
                },
            );
        }

        // A dead path hands its weight to the surviving signal.
        let effective = if lexical_down {
            opts.semantic_only()
        } else if vector_down {
            RetrievalOptions {
                semantic_weight: 0.0,
                lexical_weight: 1.0,
                ..opts
            }
        } else {
            opts
        };

        Ok(fuse(
            merged.into_values().collect(),
            effective.semantic_weight,
            effective.lexical_weight,
            effective.match_count,
        ))
    }
}

/// Fuse candidate scores and rank.
///
/// `fused = clamp(semantic) * semantic_weight + clamp(lexical) * lexical_weight`,
/// missing scores treated as 0. Sorted descending by fused score, ties broken
/// by passage id for determinism, truncated to `match_count`.
pub fn fuse(
    mut candidates: Vec<ScoredCandidate>,
    semantic_weight: f32,
    lexical_weight: f32,
    match_count: usize,
) -> Vec<ScoredCandidate> {
    for candidate in &mut candidates {
        let semantic = candidate.semantic_score.unwrap_or(0.0).clamp(0.0, 1.0);
        let lexical = candidate.lexical_score.unwrap_or(0.0).clamp(0.0, 1.0);
        candidate.fused_score = semantic * semantic_weight + lexical * lexical_weight;
    }

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.passage.id.cmp(&b.passage.id))
    });
    candidates.truncate(match_count);

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankfuseError;
    use crate::passage::create_sample_corpus;
    use crate::retrieval::adapters::{
        InMemoryLexicalIndex, InMemoryVectorIndex, LexicalHit, VectorHit,
    };
    use async_trait::async_trait;

    struct FailingLexical;

    #[async_trait]
    impl LexicalSearch for FailingLexical {
        async fn search(&self, _tokens: &[String]) -> Result<Vec<LexicalHit>> {
            Err(RankfuseError::Http("lexical store down".to_string()))
        }
    }

    struct FailingVector;

    #[async_trait]
    impl VectorSearch for FailingVector {
        async fn top_k(&self, _embedding: &[f32], _k: usize) -> Result<Vec<VectorHit>> {
            Err(RankfuseError::Http("vector store down".to_string()))
        }
    }

    fn candidate(id: &str, semantic: Option<f32>, lexical: Option<f32>) -> ScoredCandidate {
        ScoredCandidate {
            passage: Passage::new(id, "parent", "text"),
            semantic_score: semantic,
            lexical_score: lexical,
            fused_score: 0.0,
        }
    }

    fn sample_retriever() -> HybridRetriever {
        let corpus = create_sample_corpus();
        HybridRetriever::new(
            Arc::new(InMemoryVectorIndex::build(&corpus)),
            Arc::new(InMemoryLexicalIndex::build(&corpus)),
        )
    }

    #[test]
    fn test_tokenize_query() {
        let tokens = tokenize_query("What's the best ONBOARDING flow, really?");
        assert!(tokens.contains(&"onboarding".to_string()));
        assert!(tokens.contains(&"flow".to_string()));
        assert!(tokens.contains(&"whats".to_string()));
        // short and punctuation-only words dropped
        assert!(!tokens.iter().any(|t| t.chars().count() < 3));
    }

    #[test]
    fn test_tokenize_rejects_pure_punctuation() {
        assert!(tokenize_query("?!? -- ... a of").is_empty());
    }

    #[test]
    fn test_tokenize_dedups_preserving_order() {
        let tokens = tokenize_query("pricing pricing tiers pricing");
        assert_eq!(tokens, vec!["pricing".to_string(), "tiers".to_string()]);
    }

    #[test]
    fn test_fuse_deterministic() {
        let candidates = vec![
            candidate("b", Some(0.5), Some(0.5)),
            candidate("a", Some(0.5), Some(0.5)),
            candidate("c", Some(0.9), None),
        ];

        let first = fuse(candidates.clone(), 0.7, 0.3, 10);
        let second = fuse(candidates, 0.7, 0.3, 10);

        let ids: Vec<&str> = first.iter().map(|c| c.passage.id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|c| c.passage.id.as_str()).collect();
        assert_eq!(ids, ids2);
        // equal fused scores tie-break by id
        assert_eq!(ids[1], "a");
        assert_eq!(ids[2], "b");
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.fused_score, y.fused_score);
        }
    }

    #[test]
    fn test_fused_score_in_unit_interval() {
        // weights sum to 1 and sub-scores clamp to [0,1], so fused must too
        let candidates = vec![
            candidate("a", Some(1.0), Some(1.0)),
            candidate("b", Some(1.3), Some(-0.2)),
            candidate("c", None, None),
        ];

        for c in fuse(candidates, 0.7, 0.3, 10) {
            assert!(c.fused_score >= 0.0 && c.fused_score <= 1.0);
        }
    }

    #[test]
    fn test_fuse_missing_scores_treated_as_zero() {
        let ranked = fuse(
            vec![
                candidate("lex-only", None, Some(1.0)),
                candidate("sem-only", Some(1.0), None),
            ],
            0.7,
            0.3,
            10,
        );
        assert_eq!(ranked[0].passage.id, "sem-only");
        assert!((ranked[0].fused_score - 0.7).abs() < 1e-6);
        assert!((ranked[1].fused_score - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dedup_keeps_both_scores() {
        let retriever = sample_retriever();

        // "onboarding" passages exist in both paths for this embedding
        let ranked = retriever
            .retrieve(
                "onboarding flow",
                &[0.9, 0.1, 0.0, 0.1],
                RetrievalOptions::default(),
            )
            .await
            .unwrap();

        let mut ids: Vec<&str> = ranked.iter().map(|c| c.passage.id.as_str()).collect();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len(), "a passage appeared twice after fusion");

        let both = ranked
            .iter()
            .find(|c| c.passage.id == "ep1-p1")
            .expect("onboarding passage retrieved");
        assert!(both.semantic_score.is_some());
        assert!(both.lexical_score.is_some());
    }

    #[tokio::test]
    async fn test_lexical_normalization_best_match_is_one() {
        let retriever = sample_retriever();
        let ranked = retriever
            .retrieve(
                "onboarding flow",
                &[0.9, 0.1, 0.0, 0.1],
                RetrievalOptions::default(),
            )
            .await
            .unwrap();

        let best_lexical = ranked
            .iter()
            .filter_map(|c| c.lexical_score)
            .fold(f32::NEG_INFINITY, f32::max);
        assert!((best_lexical - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_degradation_lexical_down() {
        let corpus = create_sample_corpus();
        let retriever = HybridRetriever::new(
            Arc::new(InMemoryVectorIndex::build(&corpus)),
            Arc::new(FailingLexical),
        );

        let ranked = retriever
            .retrieve(
                "onboarding flow",
                &[0.9, 0.1, 0.0, 0.1],
                RetrievalOptions::default(),
            )
            .await
            .expect("lexical failure must not fail retrieval");

        assert!(!ranked.is_empty());
        // semantic-only ranking: every candidate scored by the vector path,
        // fused with effective semantic weight 1.0
        for c in &ranked {
            assert!(c.lexical_score.is_none());
            let semantic = c.semantic_score.expect("semantic score present");
            assert!((c.fused_score - semantic.clamp(0.0, 1.0)).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_degradation_vector_down() {
        let corpus = create_sample_corpus();
        let retriever = HybridRetriever::new(
            Arc::new(FailingVector),
            Arc::new(InMemoryLexicalIndex::build(&corpus)),
        );

        let ranked = retriever
            .retrieve(
                "onboarding flow",
                &[0.9, 0.1, 0.0, 0.1],
                RetrievalOptions::default(),
            )
            .await
            .expect("vector failure must not fail retrieval");

        assert!(!ranked.is_empty());
        for c in &ranked {
            assert!(c.semantic_score.is_none());
        }
    }

    #[tokio::test]
    async fn test_both_adapters_down_is_error() {
        let retriever = HybridRetriever::new(Arc::new(FailingVector), Arc::new(FailingLexical));
        let result = retriever
            .retrieve("anything", &[1.0, 0.0], RetrievalOptions::default())
            .await;
        assert!(result.is_err());
    }

    /// Regression test for OR-tokenization over naive AND matching: every
    /// keyword-exact passage must survive into the fused top-5 even when the
    /// vector path ranks unrelated passages above it.
    #[tokio::test]
    async fn test_keyword_passages_survive_fusion() {
        let mut passages = Vec::new();

        // 3 passages with the literal keyword, semantically middling
        for i in 0..3 {
            passages.push(
                Passage::new(
                    format!("kw-{}", i),
                    "doc",
                    "Our onboarding flow starts with a goal question.",
                )
                .with_embedding(vec![0.4, 0.5, 0.3, 0.2]),
            );
        }
        // 7 distractors the vector path likes better
        for i in 0..7 {
            passages.push(
                Passage::new(
                    format!("other-{}", i),
                    "doc",
                    "General product strategy advice without the keyword.",
                )
                .with_embedding(vec![0.5, 0.5, 0.3, 0.2]),
            );
        }

        let retriever = HybridRetriever::new(
            Arc::new(InMemoryVectorIndex::build(&passages)),
            Arc::new(InMemoryLexicalIndex::build(&passages)),
        );

        let opts = RetrievalOptions {
            match_count: 5,
            match_threshold: 0.0,
            ..RetrievalOptions::default()
        };
        let ranked = retriever
            .retrieve("onboarding flow", &[0.5, 0.5, 0.3, 0.2], opts)
            .await
            .unwrap();

        let top5: Vec<&str> = ranked
            .iter()
            .take(5)
            .map(|c| c.passage.id.as_str())
            .collect();
        for i in 0..3 {
            let id = format!("kw-{}", i);
            assert!(top5.contains(&id.as_str()), "{} missing from top-5", id);
        }
    }
}
