//! Score sinks: where evaluation results go besides stdout.
//!
//! Sink failures are reported to the caller but are never allowed to fail an
//! evaluation run; the orchestrator logs them and moves on.

use crate::error::{RankfuseError, Result};
use crate::report::{EvaluationRecord, RunReport};
use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destination for per-query records and the run-level report.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    /// Record one query's result, keyed by run and query id.
    async fn record_query(&self, run_id: &str, record: &EvaluationRecord) -> Result<()>;

    /// Record the finished run.
    async fn record_run(&self, report: &RunReport) -> Result<()>;
}

/// Discards everything.
pub struct NoopSink;

#[async_trait]
impl ScoreSink for NoopSink {
    async fn record_query(&self, _run_id: &str, _record: &EvaluationRecord) -> Result<()> {
        Ok(())
    }

    async fn record_run(&self, _report: &RunReport) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct QueryLine<'a> {
    kind: &'static str,
    run_id: &'a str,
    #[serde(flatten)]
    record: &'a EvaluationRecord,
}

#[derive(Serialize)]
struct RunLine<'a> {
    kind: &'static str,
    #[serde(flatten)]
    report: &'a RunReport,
}

/// Appends one JSON object per line to a file.
///
/// Each line carries a `kind` tag ("query" or "run") plus the run id, so a
/// single file can hold multiple runs and still be filtered with standard
/// line tools.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| RankfuseError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, value: &impl Serialize) -> Result<()> {
        let line = serde_json::to_string(value)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| RankfuseError::Serialization("score sink lock poisoned".to_string()))?;
        writeln!(file, "{}", line).map_err(|e| RankfuseError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl ScoreSink for JsonlSink {
    async fn record_query(&self, run_id: &str, record: &EvaluationRecord) -> Result<()> {
        self.write_line(&QueryLine {
            kind: "query",
            run_id,
            record,
        })
    }

    async fn record_run(&self, report: &RunReport) -> Result<()> {
        self.write_line(&RunLine { kind: "run", report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::QueryMetrics;

    fn record(query_id: &str) -> EvaluationRecord {
        EvaluationRecord {
            query_id: query_id.to_string(),
            category: "advice".to_string(),
            topic: "pricing".to_string(),
            difficulty: "easy".to_string(),
            ranked: Vec::new(),
            metrics: Some(QueryMetrics::default()),
            judged: None,
            duration_ms: 5,
            passed: true,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.jsonl");
        let sink = JsonlSink::create(&path).unwrap();

        sink.record_query("run-1", &record("q1")).await.unwrap();
        sink.record_query("run-1", &record("q2")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "query");
        assert_eq!(first["run_id"], "run-1");
        assert_eq!(first["query_id"], "q1");
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.jsonl");

        {
            let sink = JsonlSink::create(&path).unwrap();
            sink.record_query("run-1", &record("q1")).await.unwrap();
        }
        {
            let sink = JsonlSink::create(&path).unwrap();
            sink.record_query("run-2", &record("q1")).await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
