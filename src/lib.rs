//! Rankfuse - a hybrid retrieval engine with a quality-evaluation harness.
//!
//! Retrieval fuses two independent signals over a passage corpus: dense
//! semantic similarity (vector search over embeddings) and sparse lexical
//! matching (inverted-index keyword search). Candidates from both paths are
//! deduplicated by passage id and combined into a single weighted score.
//!
//! On top of the engine sits an evaluation harness that runs versioned
//! benchmark query sets through retrieval and measures quality two ways:
//! classical IR metrics (Precision@K, estimated Recall@K, MRR, NDCG@K)
//! computed from heuristic relevance estimates, and LLM-judged metrics
//! (faithfulness, answer relevancy, context precision) obtained by generating
//! an answer over the retrieved contexts and scoring it with a judge service.
//!
//! # Quick Start
//!
//! ```no_run
//! use rankfuse::{
//!     benchmark::create_sample_benchmark,
//!     config::Config,
//!     embedding::{CachedEmbedder, HttpEmbedder},
//!     harness::{EvalHarness, RunOptions},
//!     passage::create_sample_corpus,
//!     retrieval::{HybridRetriever, InMemoryLexicalIndex, InMemoryVectorIndex},
//!     sink::NoopSink,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let corpus = create_sample_corpus();
//!     let retriever = HybridRetriever::new(
//!         Arc::new(InMemoryVectorIndex::build(&corpus)),
//!         Arc::new(InMemoryLexicalIndex::build(&corpus)),
//!     );
//!     let embedder = Arc::new(CachedEmbedder::from_config(
//!         Arc::new(HttpEmbedder::new(config.embedding.clone())),
//!         &config.embedding,
//!     ));
//!
//!     let mut harness = EvalHarness::new(retriever, embedder, Arc::new(NoopSink), config);
//!     let report = harness
//!         .run(&create_sample_benchmark(), &RunOptions::default())
//!         .await?;
//!     report.print_summary();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **retrieval**: index adapters, candidate fusion, and ranking
//! - **benchmark**: versioned labeled query sets
//! - **metrics**: IR metrics over fused rankings
//! - **judge / llm / embedding**: external collaborators behind trait seams
//! - **harness**: batched concurrent orchestration of a benchmark run
//! - **report / sink**: run reports and score persistence

pub mod benchmark;
pub mod config;
pub mod embedding;
pub mod error;
pub mod harness;
pub mod judge;
pub mod llm;
pub mod metrics;
pub mod passage;
pub mod report;
pub mod retrieval;
pub mod retry;
pub mod sink;

// Re-export commonly used types
pub use benchmark::{Benchmark, BenchmarkFilter, BenchmarkQuery, ExpectedOutcome};
pub use config::Config;
pub use error::{RankfuseError, Result};
pub use harness::{Algorithm, EvalHarness, RunOptions, RunState};
pub use judge::{JudgeScores, JudgeService, QualityThresholds};
pub use metrics::{MetricAverages, QueryMetrics};
pub use passage::{Passage, PassageStore};
pub use report::{EvaluationRecord, RunReport};
pub use retrieval::{HybridRetriever, RetrievalOptions, ScoredCandidate};
