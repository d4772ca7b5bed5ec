//! Classical IR metrics over fused rankings: Precision@K, Recall@K, MRR, NDCG.
//!
//! No hand-annotated ground truth exists for the corpus, so relevance is
//! *estimated* from the benchmark query's labels (keywords, expected sources,
//! semantic similarity). The estimator is deliberately isolated behind
//! [`estimate_relevance`] so it can be swapped for human judgments later
//! without touching the metric math. Recall in particular divides by a fixed
//! per-outcome constant and must be read as an approximation.

use crate::benchmark::BenchmarkQuery;
use crate::retrieval::ScoredCandidate;
use serde::{Deserialize, Serialize};

/// Relevance grade derived from an estimated score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceGrade {
    HighlyRelevant,
    Relevant,
    SomewhatRelevant,
    NotRelevant,
}

impl RelevanceGrade {
    /// Grade an estimated relevance score.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            RelevanceGrade::HighlyRelevant
        } else if score >= 0.5 {
            RelevanceGrade::Relevant
        } else if score >= 0.3 {
            RelevanceGrade::SomewhatRelevant
        } else {
            RelevanceGrade::NotRelevant
        }
    }

    /// Only the top two grades count as relevant for Precision/Recall/MRR.
    pub fn counts_as_relevant(&self) -> bool {
        matches!(
            self,
            RelevanceGrade::HighlyRelevant | RelevanceGrade::Relevant
        )
    }
}

/// Estimate a candidate's relevance to a benchmark query, in [0, 1].
///
/// Weighted combination of:
/// - fraction of `must_include_keywords` present in the passage (weight 0.4),
///   or a coarse topic-substring check (weight 0.3) when no keywords are
///   specified;
/// - whether the passage's attributed source is an expected entity (0.4);
/// - a tiered semantic-similarity bonus (>0.7 adds 0.3, >0.5 adds 0.2,
///   >0.3 adds 0.1).
pub fn estimate_relevance(query: &BenchmarkQuery, candidate: &ScoredCandidate) -> f64 {
    let text = candidate.passage.text.to_lowercase();
    let mut score = 0.0;

    if !query.must_include_keywords.is_empty() {
        let present = query
            .must_include_keywords
            .iter()
            .filter(|kw| text.contains(&kw.to_lowercase()))
            .count();
        score += 0.4 * present as f64 / query.must_include_keywords.len() as f64;
    } else if text.contains(&query.topic.to_lowercase()) {
        score += 0.3;
    }

    if let Some(source) = &candidate.passage.source {
        if query
            .expected_entities
            .iter()
            .any(|e| e.eq_ignore_ascii_case(source))
        {
            score += 0.4;
        }
    }

    let semantic = candidate.semantic_score.unwrap_or(0.0) as f64;
    if semantic > 0.7 {
        score += 0.3;
    } else if semantic > 0.5 {
        score += 0.2;
    } else if semantic > 0.3 {
        score += 0.1;
    }

    score.min(1.0)
}

/// IR metrics for a single query's ranked candidates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
    pub ndcg_at_k: f64,
    /// The K the @K metrics were computed at.
    pub k: usize,
}

impl QueryMetrics {
    /// Compute all metrics for one query at cutoff `k`.
    pub fn compute(query: &BenchmarkQuery, ranked: &[ScoredCandidate], k: usize) -> Self {
        let relevance: Vec<f64> = ranked
            .iter()
            .map(|c| estimate_relevance(query, c))
            .collect();

        Self {
            precision_at_k: precision_at_k(&relevance, k),
            recall_at_k: recall_at_k(
                &relevance,
                k,
                query.expected_outcome.estimated_relevant_total(),
            ),
            mrr: reciprocal_rank(&relevance),
            ndcg_at_k: ndcg_at_k(&relevance, k),
            k,
        }
    }
}

/// Fraction of the top K that is relevant. Defined as 0 when K is 0 or there
/// are no results.
pub fn precision_at_k(relevance: &[f64], k: usize) -> f64 {
    if k == 0 || relevance.is_empty() {
        return 0.0;
    }
    let relevant = relevance
        .iter()
        .take(k)
        .filter(|&&r| RelevanceGrade::from_score(r).counts_as_relevant())
        .count();
    relevant as f64 / k as f64
}

/// Estimated Recall@K: relevant found in the top K over a fixed per-outcome
/// estimate of the total relevant, capped at 1.0.
///
/// A heuristic stand-in for true recall, not a calibrated metric.
pub fn recall_at_k(relevance: &[f64], k: usize, estimated_total: usize) -> f64 {
    if estimated_total == 0 {
        return 0.0;
    }
    let found = relevance
        .iter()
        .take(k)
        .filter(|&&r| RelevanceGrade::from_score(r).counts_as_relevant())
        .count();
    (found as f64 / estimated_total as f64).min(1.0)
}

/// 1 / rank of the first relevant result (1-indexed); 0 when none is relevant.
pub fn reciprocal_rank(relevance: &[f64]) -> f64 {
    relevance
        .iter()
        .position(|&r| RelevanceGrade::from_score(r).counts_as_relevant())
        .map(|i| 1.0 / (i as f64 + 1.0))
        .unwrap_or(0.0)
}

/// NDCG@K with graded (continuous) relevance.
///
/// DCG = Σ rel(i) / log2(i + 2) for i in [0, K). IDCG applies the same
/// formula to the relevance scores sorted descending. Defined as 0 when IDCG
/// is 0 (all candidates irrelevant), never NaN.
pub fn ndcg_at_k(relevance: &[f64], k: usize) -> f64 {
    let dcg = dcg_at_k(relevance, k);

    let mut ideal = relevance.to_vec();
    ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let idcg = dcg_at_k(&ideal, k);

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

fn dcg_at_k(relevance: &[f64], k: usize) -> f64 {
    relevance
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &rel)| rel / ((i + 2) as f64).log2())
        .sum()
}

/// Arithmetic means over a set of per-query metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricAverages {
    pub count: usize,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
    pub ndcg_at_k: f64,
}

impl MetricAverages {
    /// Aggregate per-query metrics. An empty input yields all zeros with
    /// count 0, never a division by zero.
    pub fn aggregate<'a>(metrics: impl IntoIterator<Item = &'a QueryMetrics>) -> Self {
        let mut sum = MetricAverages::default();
        for m in metrics {
            sum.count += 1;
            sum.precision_at_k += m.precision_at_k;
            sum.recall_at_k += m.recall_at_k;
            sum.mrr += m.mrr;
            sum.ndcg_at_k += m.ndcg_at_k;
        }

        if sum.count > 0 {
            let n = sum.count as f64;
            sum.precision_at_k /= n;
            sum.recall_at_k /= n;
            sum.mrr /= n;
            sum.ndcg_at_k /= n;
        }

        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::{BenchmarkQuery, ExpectedOutcome};
    use crate::passage::Passage;

    fn query_with_keywords(keywords: &[&str]) -> BenchmarkQuery {
        BenchmarkQuery {
            id: "q1".to_string(),
            text: "test query".to_string(),
            category: "advice".to_string(),
            topic: "pricing".to_string(),
            difficulty: "easy".to_string(),
            expected_outcome: ExpectedOutcome::SingleSource,
            expected_entities: vec!["Maya Chen".to_string()],
            must_include_keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn candidate(text: &str, source: Option<&str>, semantic: Option<f32>) -> ScoredCandidate {
        let mut passage = Passage::new("p1", "doc", text);
        passage.source = source.map(|s| s.to_string());
        ScoredCandidate {
            passage,
            semantic_score: semantic,
            lexical_score: None,
            fused_score: 0.0,
        }
    }

    #[test]
    fn test_estimate_relevance_full_match() {
        let query = query_with_keywords(&["pricing"]);
        let c = candidate("pricing tiers explained", Some("Maya Chen"), Some(0.8));
        // keywords 0.4 + source 0.4 + semantic bonus 0.3, clamped to 1.0
        assert!((estimate_relevance(&query, &c) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_relevance_topic_fallback() {
        let query = query_with_keywords(&[]);
        let c = candidate("a note on pricing strategy", None, None);
        assert!((estimate_relevance(&query, &c) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_relevance_partial_keywords() {
        let query = query_with_keywords(&["pricing", "tiers"]);
        let c = candidate("only pricing mentioned", None, None);
        assert!((estimate_relevance(&query, &c) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(
            RelevanceGrade::from_score(0.7),
            RelevanceGrade::HighlyRelevant
        );
        assert_eq!(RelevanceGrade::from_score(0.5), RelevanceGrade::Relevant);
        assert_eq!(
            RelevanceGrade::from_score(0.3),
            RelevanceGrade::SomewhatRelevant
        );
        assert_eq!(RelevanceGrade::from_score(0.29), RelevanceGrade::NotRelevant);
        assert!(RelevanceGrade::Relevant.counts_as_relevant());
        assert!(!RelevanceGrade::SomewhatRelevant.counts_as_relevant());
    }

    #[test]
    fn test_precision_at_k() {
        let relevance = vec![0.9, 0.6, 0.1, 0.8, 0.0];
        assert!((precision_at_k(&relevance, 5) - 0.6).abs() < 1e-9);
        assert!((precision_at_k(&relevance, 2) - 1.0).abs() < 1e-9);
        assert_eq!(precision_at_k(&relevance, 0), 0.0);
        assert_eq!(precision_at_k(&[], 5), 0.0);
    }

    #[test]
    fn test_recall_capped_at_one() {
        let relevance = vec![0.9, 0.9, 0.9, 0.9, 0.9];
        assert!((recall_at_k(&relevance, 5, 3) - 1.0).abs() < 1e-9);
        assert!((recall_at_k(&relevance, 2, 10) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_mrr() {
        assert!((reciprocal_rank(&[0.1, 0.2, 0.8]) - 1.0 / 3.0).abs() < 1e-9);
        assert!((reciprocal_rank(&[0.9]) - 1.0).abs() < 1e-9);
        assert_eq!(reciprocal_rank(&[0.1, 0.2]), 0.0);
        assert_eq!(reciprocal_rank(&[]), 0.0);
    }

    #[test]
    fn test_ndcg_ceiling() {
        // already in ideal order: NDCG must be exactly 1.0
        let relevance = vec![1.0, 0.8, 0.5, 0.2, 0.0];
        assert_eq!(ndcg_at_k(&relevance, 5), 1.0);
    }

    #[test]
    fn test_ndcg_floor() {
        // all irrelevant: 0, not NaN, no division error
        let relevance = vec![0.0, 0.0, 0.0];
        let ndcg = ndcg_at_k(&relevance, 3);
        assert_eq!(ndcg, 0.0);
        assert!(!ndcg.is_nan());
    }

    #[test]
    fn test_ndcg_penalizes_bad_order() {
        let ideal = vec![1.0, 0.5, 0.0];
        let inverted = vec![0.0, 0.5, 1.0];
        assert!(ndcg_at_k(&inverted, 3) < ndcg_at_k(&ideal, 3));
        assert!(ndcg_at_k(&inverted, 3) > 0.0);
    }

    #[test]
    fn test_aggregate_empty_is_zeroed() {
        let averages = MetricAverages::aggregate(std::iter::empty());
        assert_eq!(averages.count, 0);
        assert_eq!(averages.precision_at_k, 0.0);
        assert_eq!(averages.recall_at_k, 0.0);
        assert_eq!(averages.mrr, 0.0);
        assert_eq!(averages.ndcg_at_k, 0.0);
    }

    #[test]
    fn test_aggregate_means() {
        let metrics = vec![
            QueryMetrics {
                precision_at_k: 1.0,
                recall_at_k: 0.5,
                mrr: 1.0,
                ndcg_at_k: 1.0,
                k: 5,
            },
            QueryMetrics {
                precision_at_k: 0.0,
                recall_at_k: 0.5,
                mrr: 0.5,
                ndcg_at_k: 0.0,
                k: 5,
            },
        ];
        let averages = MetricAverages::aggregate(metrics.iter());
        assert_eq!(averages.count, 2);
        assert!((averages.precision_at_k - 0.5).abs() < 1e-9);
        assert!((averages.recall_at_k - 0.5).abs() < 1e-9);
        assert!((averages.mrr - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_compute_end_to_end() {
        let query = query_with_keywords(&["pricing"]);
        let ranked = vec![
            candidate("pricing tiers explained", Some("Maya Chen"), Some(0.8)),
            candidate("unrelated text", None, Some(0.1)),
        ];
        let metrics = QueryMetrics::compute(&query, &ranked, 2);

        assert!((metrics.precision_at_k - 0.5).abs() < 1e-9);
        assert!((metrics.mrr - 1.0).abs() < 1e-9);
        assert!(metrics.ndcg_at_k > 0.99);
        // one relevant found, SingleSource estimates 3 total
        assert!((metrics.recall_at_k - 1.0 / 3.0).abs() < 1e-9);
    }
}
