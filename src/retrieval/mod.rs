//! Hybrid retrieval: adapters, candidate fusion, and ranking.
//!
//! Two independent signals — dense semantic similarity and sparse lexical
//! matching — are retrieved separately, deduplicated by passage id, and fused
//! into a single weighted score. Either signal may be missing for a candidate
//! (or down entirely); retrieval never hard-fails because one path is
//! unavailable.

pub mod adapters;
pub mod engine;

pub use adapters::{
    InMemoryLexicalIndex, InMemoryVectorIndex, LexicalHit, LexicalSearch, VectorHit, VectorSearch,
};
pub use engine::{tokenize_query, HybridRetriever, RetrievalOptions, ScoredCandidate};
