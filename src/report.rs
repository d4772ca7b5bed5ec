//! Per-query records and the run-level report.
//!
//! A report is always produced, even for a run with partial failures, and
//! keeps "queries evaluated", "queries errored", and the aggregates over the
//! valid subset clearly separated. Nothing here is persisted by the crate
//! itself; the JSON payload is handed to callers and sinks.

use crate::judge::{JudgeScores, JudgeSummary};
use crate::metrics::{MetricAverages, QueryMetrics};
use crate::retrieval::ScoredCandidate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caveat attached to every report: the recall denominator is a fixed
/// per-outcome estimate, not annotated ground truth.
pub const RECALL_ESTIMATE_NOTE: &str =
    "Recall@K is estimated against a fixed expected-relevant total per outcome category; \
     it is a heuristic, not calibrated ground-truth recall.";

/// One record per (query, run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query_id: String,
    pub category: String,
    pub topic: String,
    pub difficulty: String,
    /// Fused ranking, best first. Empty when retrieval failed.
    pub ranked: Vec<ScoredCandidate>,
    /// IR metrics; absent when retrieval failed.
    pub metrics: Option<QueryMetrics>,
    /// Judged scores; absent for IR-only runs.
    pub judged: Option<JudgeScores>,
    pub duration_ms: u64,
    /// True only when the query evaluated cleanly and no judged score fell
    /// below its target threshold.
    pub passed: bool,
    /// Query-level failure, when the whole evaluation errored.
    pub error: Option<String>,
}

impl EvaluationRecord {
    /// Whether this record contributes to metric aggregates.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Metric averages grouped by a benchmark dimension.
pub type GroupedAverages = BTreeMap<String, MetricAverages>;

/// The run-level report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub algorithm: String,
    pub benchmark_name: String,
    pub benchmark_version: String,
    pub queries_total: usize,
    pub queries_evaluated: usize,
    pub queries_errored: usize,
    /// IR aggregates over valid records.
    pub ir: MetricAverages,
    /// Judged aggregates, when the run was judged.
    pub judged: Option<JudgeSummary>,
    pub by_category: GroupedAverages,
    pub by_topic: GroupedAverages,
    pub by_difficulty: GroupedAverages,
    /// Alert-threshold breaches. Empty means the run passes.
    pub alert_breaches: Vec<String>,
    /// Run verdict: false exactly when an aggregate crossed an alert
    /// threshold. Per-query failures alone never fail a run.
    pub passed: bool,
    pub total_duration_ms: u64,
    pub recall_note: String,
    pub records: Vec<EvaluationRecord>,
}

impl RunReport {
    /// Group valid records' metrics by a key selector and average each group.
    pub fn group_by<F>(records: &[EvaluationRecord], key: F) -> GroupedAverages
    where
        F: Fn(&EvaluationRecord) -> &str,
    {
        let mut groups: BTreeMap<String, Vec<QueryMetrics>> = BTreeMap::new();
        for record in records.iter().filter(|r| r.is_valid()) {
            if let Some(metrics) = record.metrics {
                groups.entry(key(record).to_string()).or_default().push(metrics);
            }
        }

        groups
            .into_iter()
            .map(|(k, ms)| (k, MetricAverages::aggregate(ms.iter())))
            .collect()
    }

    /// Print the report to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Report ==========");
        println!("Run:        {}", self.run_id);
        println!("Algorithm:  {}", self.algorithm);
        println!(
            "Benchmark:  {} (v{})",
            self.benchmark_name, self.benchmark_version
        );
        println!("---------------------------------------");
        println!("Queries evaluated: {}", self.queries_evaluated);
        println!("Queries errored:   {}", self.queries_errored);
        println!("---------------------------------------");
        println!("IR metrics (mean over {} queries):", self.ir.count);
        println!("  Precision@{}: {:.3}", self.k_label(), self.ir.precision_at_k);
        println!("  Recall@{}:    {:.3} (estimated)", self.k_label(), self.ir.recall_at_k);
        println!("  MRR:          {:.3}", self.ir.mrr);
        println!("  NDCG@{}:      {:.3}", self.k_label(), self.ir.ndcg_at_k);

        if let Some(judged) = &self.judged {
            println!("---------------------------------------");
            println!(
                "Judged quality ({} records, {} errored):",
                judged.count, judged.errored
            );
            println!("  Pass rate:          {:.1}%", judged.pass_rate * 100.0);
            println!("  Faithfulness:       {:.3}", judged.avg_faithfulness);
            println!("  Answer relevancy:   {:.3}", judged.avg_answer_relevancy);
            println!("  Context precision:  {:.3}", judged.avg_context_precision);
        }

        Self::print_breakdown("category", &self.by_category);
        Self::print_breakdown("topic", &self.by_topic);
        Self::print_breakdown("difficulty", &self.by_difficulty);

        println!("---------------------------------------");
        if self.alert_breaches.is_empty() {
            println!("Verdict: PASS (all aggregates within alert thresholds)");
        } else {
            println!("Verdict: FAIL");
            for breach in &self.alert_breaches {
                println!("  ALERT: {}", breach);
            }
        }
        println!("Note: {}", self.recall_note);
        println!(
            "Total time: {:.1}s",
            self.total_duration_ms as f64 / 1000.0
        );
        println!("=======================================\n");
    }

    fn print_breakdown(label: &str, groups: &GroupedAverages) {
        if groups.is_empty() {
            return;
        }
        println!("---------------------------------------");
        println!("By {}:", label);
        for (key, averages) in groups {
            println!(
                "  {:<16} n={:<3} P={:.3} R={:.3} MRR={:.3} NDCG={:.3}",
                key,
                averages.count,
                averages.precision_at_k,
                averages.recall_at_k,
                averages.mrr,
                averages.ndcg_at_k
            );
        }
    }

    fn k_label(&self) -> String {
        self.records
            .iter()
            .find_map(|r| r.metrics.map(|m| m.k.to_string()))
            .unwrap_or_else(|| "K".to_string())
    }
}

/// Print a side-by-side comparison of two runs (used by `--compare`).
pub fn print_comparison(a: &RunReport, b: &RunReport) {
    println!("\n========== Algorithm Comparison ==========");
    println!("{:<14} {:>10} {:>10} {:>10}", "metric", a.algorithm, b.algorithm, "delta");
    let rows = [
        ("precision", a.ir.precision_at_k, b.ir.precision_at_k),
        ("recall*", a.ir.recall_at_k, b.ir.recall_at_k),
        ("mrr", a.ir.mrr, b.ir.mrr),
        ("ndcg", a.ir.ndcg_at_k, b.ir.ndcg_at_k),
    ];
    for (name, left, right) in rows {
        println!(
            "{:<14} {:>10.3} {:>10.3} {:>+10.3}",
            name,
            left,
            right,
            left - right
        );
    }
    println!("(* recall is estimated)");
    println!("==========================================\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(topic: &str, mrr: f64, error: Option<&str>) -> EvaluationRecord {
        EvaluationRecord {
            query_id: format!("q-{}", topic),
            category: "advice".to_string(),
            topic: topic.to_string(),
            difficulty: "easy".to_string(),
            ranked: Vec::new(),
            metrics: error.is_none().then(|| QueryMetrics {
                mrr,
                k: 5,
                ..Default::default()
            }),
            judged: None,
            duration_ms: 10,
            passed: error.is_none(),
            error: error.map(|e| e.to_string()),
        }
    }

    #[test]
    fn test_group_by_topic() {
        let records = vec![
            record("pricing", 1.0, None),
            record("pricing", 0.5, None),
            record("onboarding", 0.8, None),
        ];
        let groups = RunReport::group_by(&records, |r| &r.topic);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["pricing"].count, 2);
        assert!((groups["pricing"].mrr - 0.75).abs() < 1e-9);
        assert_eq!(groups["onboarding"].count, 1);
    }

    #[test]
    fn test_group_by_excludes_errored_records() {
        let records = vec![
            record("pricing", 1.0, None),
            record("pricing", 0.0, Some("embed failed")),
        ];
        let groups = RunReport::group_by(&records, |r| &r.topic);
        assert_eq!(groups["pricing"].count, 1);
    }

    #[test]
    fn test_group_counts_sum_to_valid_records() {
        let records = vec![
            record("pricing", 1.0, None),
            record("pricing", 0.5, None),
            record("retention", 0.8, None),
            record("onboarding", 0.8, Some("down")),
        ];
        let groups = RunReport::group_by(&records, |r| &r.topic);
        let total: usize = groups.values().map(|g| g.count).sum();
        assert_eq!(total, 3);
    }
}
