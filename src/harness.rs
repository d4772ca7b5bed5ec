//! Evaluation orchestrator: runs a benchmark through the retrieval engine
//! and (optionally) the judged-quality pipeline.
//!
//! Queries are processed in fixed-size concurrent batches. Every result
//! travels with its query id and is re-associated explicitly when the batch
//! completes; nothing relies on array position across an await point. A
//! single query failing is logged and recorded, never fatal: the run verdict
//! depends only on aggregate alert thresholds.

use crate::benchmark::{Benchmark, BenchmarkFilter, BenchmarkQuery};
use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{RankfuseError, Result};
use crate::judge::{JudgeRequest, JudgeScores, JudgeService, JudgeSummary, QualityThresholds};
use crate::llm::AnswerGenerator;
use crate::metrics::{MetricAverages, QueryMetrics};
use crate::report::{EvaluationRecord, RunReport, RECALL_ESTIMATE_NOTE};
use crate::retrieval::{HybridRetriever, RetrievalOptions};
use crate::sink::ScoreSink;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Which retrieval algorithm a run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Hybrid,
    Semantic,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Hybrid => write!(f, "hybrid"),
            Algorithm::Semantic => write!(f, "semantic"),
        }
    }
}

/// Lifecycle of one evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Per-run options, resolved from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub filter: BenchmarkFilter,
    pub judged: bool,
    pub semantic_only: bool,
}

impl RunOptions {
    pub fn algorithm(&self) -> Algorithm {
        if self.semantic_only {
            Algorithm::Semantic
        } else {
            Algorithm::Hybrid
        }
    }
}

/// Everything one spawned query task needs, cheap to clone.
#[derive(Clone)]
struct QueryPipeline {
    retriever: HybridRetriever,
    embedder: Arc<dyn EmbeddingService>,
    answerer: Option<Arc<dyn AnswerGenerator>>,
    judge: Option<Arc<dyn JudgeService>>,
    retrieval: RetrievalOptions,
    thresholds: QualityThresholds,
    judged: bool,
}

impl QueryPipeline {
    /// Evaluate one query end to end. Failures become the record's `error`
    /// field; this function itself never fails.
    async fn evaluate(&self, query: BenchmarkQuery) -> EvaluationRecord {
        let started = Instant::now();

        let embedding = match self.embedder.embed(&query.text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(query_id = %query.id, error = %e, "query embedding failed");
                return Self::errored_record(&query, started, format!("embedding: {}", e));
            }
        };

        let ranked = match self
            .retriever
            .retrieve(&query.text, &embedding, self.retrieval)
            .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(query_id = %query.id, error = %e, "retrieval failed");
                return Self::errored_record(&query, started, format!("retrieval: {}", e));
            }
        };

        let metrics = QueryMetrics::compute(&query, &ranked, self.retrieval.match_count);

        let judged = if self.judged {
            Some(self.judge_query(&query, &ranked).await)
        } else {
            None
        };

        let passed = judged.as_ref().map_or(true, |j| self.thresholds.passed(j));

        EvaluationRecord {
            query_id: query.id,
            category: query.category,
            topic: query.topic,
            difficulty: query.difficulty,
            ranked,
            metrics: Some(metrics),
            judged,
            duration_ms: started.elapsed().as_millis() as u64,
            passed,
            error: None,
        }
    }

    /// Generate an answer over the retrieved contexts and submit the triple
    /// to the judge. Judge-side failures come back as errored scores rather
    /// than bubbling up, so the IR half of the record survives.
    async fn judge_query(
        &self,
        query: &BenchmarkQuery,
        ranked: &[crate::retrieval::ScoredCandidate],
    ) -> JudgeScores {
        let (Some(answerer), Some(judge)) = (&self.answerer, &self.judge) else {
            return JudgeScores::errored("judge pipeline not configured");
        };

        let contexts: Vec<String> = ranked.iter().map(|c| c.passage.text.clone()).collect();
        if contexts.is_empty() {
            return JudgeScores::errored("no contexts retrieved");
        }

        let answer = match answerer.answer(&query.text, &contexts).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(query_id = %query.id, error = %e, "answer generation failed");
                return JudgeScores::errored(format!("answer generation: {}", e));
            }
        };

        let request = JudgeRequest {
            question: query.text.clone(),
            answer,
            contexts,
            ground_truth: None,
        };

        match judge.judge(&request).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(query_id = %query.id, error = %e, "judge call failed");
                JudgeScores::errored(e.to_string())
            }
        }
    }

    fn errored_record(
        query: &BenchmarkQuery,
        started: Instant,
        message: String,
    ) -> EvaluationRecord {
        EvaluationRecord {
            query_id: query.id.clone(),
            category: query.category.clone(),
            topic: query.topic.clone(),
            difficulty: query.difficulty.clone(),
            ranked: Vec::new(),
            metrics: None,
            judged: None,
            duration_ms: started.elapsed().as_millis() as u64,
            passed: false,
            error: Some(message),
        }
    }
}

/// The evaluation harness.
pub struct EvalHarness {
    retriever: HybridRetriever,
    embedder: Arc<dyn EmbeddingService>,
    answerer: Option<Arc<dyn AnswerGenerator>>,
    judge: Option<Arc<dyn JudgeService>>,
    sink: Arc<dyn ScoreSink>,
    config: Config,
    state: RunState,
}

impl EvalHarness {
    pub fn new(
        retriever: HybridRetriever,
        embedder: Arc<dyn EmbeddingService>,
        sink: Arc<dyn ScoreSink>,
        config: Config,
    ) -> Self {
        Self {
            retriever,
            embedder,
            answerer: None,
            judge: None,
            sink,
            config,
            state: RunState::Idle,
        }
    }

    /// Attach the judged-quality pipeline (answer generator + judge).
    pub fn with_judge(
        mut self,
        answerer: Arc<dyn AnswerGenerator>,
        judge: Arc<dyn JudgeService>,
    ) -> Self {
        self.answerer = Some(answerer);
        self.judge = Some(judge);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the benchmark and build the report.
    ///
    /// Fatal errors (misconfiguration) fail the call; per-query failures are
    /// folded into the report. The run verdict is in `report.passed`.
    pub async fn run(&mut self, benchmark: &Benchmark, options: &RunOptions) -> Result<RunReport> {
        self.state = RunState::Running;

        if options.judged && (self.answerer.is_none() || self.judge.is_none()) {
            self.state = RunState::Failed;
            return Err(RankfuseError::Config(
                "judged evaluation requested but no judge pipeline is attached".to_string(),
            ));
        }

        let queries = sample_stride(
            benchmark.filter(&options.filter),
            self.config.eval.sample_rate,
        );
        let total = queries.len();
        let run_id = generate_run_id();
        let started = Instant::now();

        info!(
            run_id = %run_id,
            benchmark = %benchmark.name,
            algorithm = %options.algorithm(),
            queries = total,
            judged = options.judged,
            "starting evaluation run"
        );

        let retrieval = {
            let base = RetrievalOptions::from(&self.config.retrieval);
            match options.algorithm() {
                Algorithm::Hybrid => base,
                Algorithm::Semantic => base.semantic_only(),
            }
        };

        let pipeline = QueryPipeline {
            retriever: self.retriever.clone(),
            embedder: self.embedder.clone(),
            answerer: self.answerer.clone(),
            judge: self.judge.clone(),
            retrieval,
            thresholds: QualityThresholds::from(&self.config.thresholds),
            judged: options.judged,
        };

        let mut records: Vec<EvaluationRecord> = Vec::with_capacity(total);
        let concurrency = self.config.eval.concurrency.max(1);
        let batches = queries.chunks(concurrency).count();

        for (batch_index, batch) in queries.chunks(concurrency).enumerate() {
            let mut handles = Vec::with_capacity(batch.len());
            for query in batch {
                let pipeline = pipeline.clone();
                let task_query = query.clone();
                handles.push((
                    query.clone(),
                    tokio::spawn(async move { pipeline.evaluate(task_query).await }),
                ));
            }

            // Single-writer accumulation: results land here, in batch order,
            // after the whole batch resolves.
            for (query, handle) in handles {
                let record = match handle.await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(query_id = %query.id, error = %e, "query task panicked");
                        QueryPipeline::errored_record(
                            &query,
                            started,
                            format!("task failure: {}", e),
                        )
                    }
                };

                if let Err(e) = self.sink.record_query(&run_id, &record).await {
                    warn!(query_id = %record.query_id, error = %e, "score sink write failed");
                }
                records.push(record);
            }

            if self.config.eval.batch_pause_ms > 0 && batch_index + 1 < batches {
                tokio::time::sleep(Duration::from_millis(self.config.eval.batch_pause_ms)).await;
            }
        }

        let report = self.build_report(
            run_id,
            benchmark,
            options,
            records,
            started.elapsed().as_millis() as u64,
        );

        if let Err(e) = self.sink.record_run(&report).await {
            warn!(run_id = %report.run_id, error = %e, "score sink write failed");
        }

        info!(
            run_id = %report.run_id,
            evaluated = report.queries_evaluated,
            errored = report.queries_errored,
            passed = report.passed,
            "evaluation run finished"
        );

        self.state = RunState::Completed;
        Ok(report)
    }

    fn build_report(
        &self,
        run_id: String,
        benchmark: &Benchmark,
        options: &RunOptions,
        records: Vec<EvaluationRecord>,
        total_duration_ms: u64,
    ) -> RunReport {
        let valid: Vec<&EvaluationRecord> = records.iter().filter(|r| r.is_valid()).collect();
        let metrics: Vec<QueryMetrics> = valid.iter().filter_map(|r| r.metrics).collect();
        let ir = MetricAverages::aggregate(metrics.iter());

        let thresholds = QualityThresholds::from(&self.config.thresholds);
        let judged = options.judged.then(|| {
            JudgeSummary::aggregate(valid.iter().filter_map(|r| r.judged.as_ref()), &thresholds)
        });

        let mut alert_breaches = Vec::new();
        if let Some(summary) = &judged {
            alert_breaches.extend(summary.alert_breaches(&thresholds));
        }
        if ir.count > 0 {
            alert_breaches.extend(self.ir_alert_breaches(&ir));
        }

        RunReport {
            run_id,
            algorithm: options.algorithm().to_string(),
            benchmark_name: benchmark.name.clone(),
            benchmark_version: benchmark.version.clone(),
            queries_total: records.len(),
            queries_evaluated: valid.len(),
            queries_errored: records.len() - valid.len(),
            ir,
            judged,
            by_category: RunReport::group_by(&records, |r| &r.category),
            by_topic: RunReport::group_by(&records, |r| &r.topic),
            by_difficulty: RunReport::group_by(&records, |r| &r.difficulty),
            passed: alert_breaches.is_empty(),
            alert_breaches,
            total_duration_ms,
            recall_note: RECALL_ESTIMATE_NOTE.to_string(),
            records,
        }
    }

    /// Optional alert floors over the aggregate IR metrics.
    fn ir_alert_breaches(&self, ir: &MetricAverages) -> Vec<String> {
        let mut breaches = Vec::new();
        let checks = [
            ("MRR", ir.mrr, self.config.thresholds.mrr_alert),
            ("NDCG", ir.ndcg_at_k, self.config.thresholds.ndcg_alert),
            (
                "precision",
                ir.precision_at_k,
                self.config.thresholds.precision_alert,
            ),
        ];
        for (name, value, floor) in checks {
            if let Some(floor) = floor {
                if value < floor {
                    breaches.push(format!(
                        "mean {} {:.3} below alert threshold {:.2}",
                        name, value, floor
                    ));
                }
            }
        }
        breaches
    }
}

/// Deterministic down-sampling: keep every N-th query where N is derived
/// from the rate, so repeated runs over the same benchmark see the same
/// subset.
fn sample_stride(queries: Vec<BenchmarkQuery>, rate: f64) -> Vec<BenchmarkQuery> {
    if rate >= 1.0 {
        return queries;
    }
    if rate <= 0.0 {
        return Vec::new();
    }
    let stride = (1.0 / rate).ceil() as usize;
    queries
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % stride == 0)
        .map(|(_, q)| q)
        .collect()
}

fn generate_run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("run-{}", millis)
}
