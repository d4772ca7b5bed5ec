//! Benchmark model: a static, versioned collection of labeled queries.
//!
//! The benchmark is a contract: adding or removing queries changes what
//! "passing" means, so sets are hand-curated and carry a version for
//! regression comparison over time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Coarse expected-outcome category for a query.
///
/// Each variant carries the heuristic estimated count of relevant passages
/// that should exist in the corpus, used by the Recall@K estimator. These
/// constants are acknowledged placeholders, not calibrated ground truth;
/// every report labels recall as estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    /// The answer lives with one expert/source (~3 relevant passages).
    SingleSource,
    /// A focused topic covered by a handful of passages (~5).
    FocusedTopic,
    /// A broad synthesis question touching many passages (~10).
    BroadSynthesis,
}

impl ExpectedOutcome {
    /// Estimated total relevant passages for this outcome category.
    pub fn estimated_relevant_total(&self) -> usize {
        match self {
            ExpectedOutcome::SingleSource => 3,
            ExpectedOutcome::FocusedTopic => 5,
            ExpectedOutcome::BroadSynthesis => 10,
        }
    }
}

/// A single labeled benchmark query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkQuery {
    /// Unique identifier within the benchmark.
    pub id: String,
    /// The query text.
    pub text: String,
    /// Free-form type tag (e.g. "factual", "synthesis").
    pub category: String,
    /// Topic label (e.g. "pricing").
    pub topic: String,
    /// Difficulty label (e.g. "easy", "hard").
    pub difficulty: String,
    /// Expected-outcome category driving the recall estimator.
    pub expected_outcome: ExpectedOutcome,
    /// Expected source attributions (e.g. author names).
    #[serde(default)]
    pub expected_entities: Vec<String>,
    /// Keywords a relevant passage should contain.
    #[serde(default)]
    pub must_include_keywords: Vec<String>,
}

/// Composition stats for sanity-checking a benchmark before a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_topic: BTreeMap<String, usize>,
    pub by_difficulty: BTreeMap<String, usize>,
}

/// Filter criteria for selecting a benchmark subset.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkFilter {
    pub category: Option<String>,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub limit: Option<usize>,
}

/// A versioned set of benchmark queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    /// Benchmark name.
    pub name: String,
    /// Version tag; bump whenever the query set changes.
    pub version: String,
    /// The queries.
    pub queries: Vec<BenchmarkQuery>,
}

impl Benchmark {
    /// Create a new empty benchmark.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            queries: Vec::new(),
        }
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Check if the benchmark is empty.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Load from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read benchmark file: {:?}", path))?;
        let benchmark: Benchmark =
            serde_json::from_str(&content).with_context(|| "Failed to parse benchmark JSON")?;
        Ok(benchmark)
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Select the subset matching the filter, preserving benchmark order.
    pub fn filter(&self, filter: &BenchmarkFilter) -> Vec<BenchmarkQuery> {
        let matched = self.queries.iter().filter(|q| {
            filter.category.as_ref().map_or(true, |c| &q.category == c)
                && filter.topic.as_ref().map_or(true, |t| &q.topic == t)
                && filter
                    .difficulty
                    .as_ref()
                    .map_or(true, |d| &q.difficulty == d)
        });

        match filter.limit {
            Some(limit) => matched.take(limit).cloned().collect(),
            None => matched.cloned().collect(),
        }
    }

    /// Composition counts by category, topic, and difficulty.
    pub fn stats(&self) -> BenchmarkStats {
        let mut by_category = BTreeMap::new();
        let mut by_topic = BTreeMap::new();
        let mut by_difficulty = BTreeMap::new();

        for query in &self.queries {
            *by_category.entry(query.category.clone()).or_insert(0) += 1;
            *by_topic.entry(query.topic.clone()).or_insert(0) += 1;
            *by_difficulty.entry(query.difficulty.clone()).or_insert(0) += 1;
        }

        BenchmarkStats {
            total: self.queries.len(),
            by_category,
            by_topic,
            by_difficulty,
        }
    }
}

/// Create the hand-curated sample benchmark matching the sample corpus.
pub fn create_sample_benchmark() -> Benchmark {
    let mut benchmark = Benchmark::new("sample", "1");

    benchmark.queries.push(BenchmarkQuery {
        id: "q-onboarding".to_string(),
        text: "How should an onboarding flow be structured?".to_string(),
        category: "advice".to_string(),
        topic: "onboarding".to_string(),
        difficulty: "easy".to_string(),
        expected_outcome: ExpectedOutcome::SingleSource,
        expected_entities: vec!["Maya Chen".to_string(), "Derek Okafor".to_string()],
        must_include_keywords: vec!["onboarding".to_string()],
    });

    benchmark.queries.push(BenchmarkQuery {
        id: "q-pricing-tiers".to_string(),
        text: "What pricing structure works for SaaS products?".to_string(),
        category: "advice".to_string(),
        topic: "pricing".to_string(),
        difficulty: "medium".to_string(),
        expected_outcome: ExpectedOutcome::FocusedTopic,
        expected_entities: vec!["Maya Chen".to_string(), "Priya Nair".to_string()],
        must_include_keywords: vec!["pricing".to_string(), "tier".to_string()],
    });

    benchmark.queries.push(BenchmarkQuery {
        id: "q-churn".to_string(),
        text: "Why do customers churn and how do you catch it early?".to_string(),
        category: "synthesis".to_string(),
        topic: "retention".to_string(),
        difficulty: "hard".to_string(),
        expected_outcome: ExpectedOutcome::BroadSynthesis,
        expected_entities: vec!["Derek Okafor".to_string(), "Priya Nair".to_string()],
        must_include_keywords: vec!["churn".to_string()],
    });

    benchmark
}
