//! Judged-quality evaluation: the LLM judge service contract and thresholds.
//!
//! The judge scores a (question, answer, contexts) triple on faithfulness,
//! answer relevancy, and context precision, each in [0, 1]. It is reached by
//! request/response messaging with a bounded deadline; the same evaluator
//! code works whether the judge runs in-process, as a subprocess, or
//! remotely, because everything hides behind [`JudgeService`].

use crate::config::{JudgeConfig, ThresholdConfig};
use crate::error::{RankfuseError, Result};
use crate::retry::{retryable_status, with_retry, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request payload for the judge service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,
}

/// Judge response: three nullable scores plus an optional error string.
///
/// Null and zero are distinct everywhere: a null score means the judge could
/// not produce one, a zero means it judged the answer worthless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeScores {
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JudgeScores {
    /// All-null scores carrying an error message.
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            faithfulness: None,
            answer_relevancy: None,
            context_precision: None,
            error: Some(message.into()),
        }
    }

    /// Whether this record carries an error (excluded from averages).
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Target and alert thresholds for the three judged metrics.
///
/// `passed` requires every score to meet its *target*; the lower *alert*
/// values exist purely for run-level reporting (a degraded-run warning when
/// an aggregate average drops below them).
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    pub faithfulness_target: f64,
    pub faithfulness_alert: f64,
    pub answer_relevancy_target: f64,
    pub answer_relevancy_alert: f64,
    pub context_precision_target: f64,
    pub context_precision_alert: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            faithfulness_target: 0.85,
            faithfulness_alert: 0.70,
            answer_relevancy_target: 0.80,
            answer_relevancy_alert: 0.65,
            context_precision_target: 0.75,
            context_precision_alert: 0.60,
        }
    }
}

impl From<&ThresholdConfig> for QualityThresholds {
    fn from(config: &ThresholdConfig) -> Self {
        Self {
            faithfulness_target: config.faithfulness_target,
            faithfulness_alert: config.faithfulness_alert,
            answer_relevancy_target: config.answer_relevancy_target,
            answer_relevancy_alert: config.answer_relevancy_alert,
            context_precision_target: config.context_precision_target,
            context_precision_alert: config.context_precision_alert,
        }
    }
}

impl QualityThresholds {
    /// A record passes only when every score is present and at or above its
    /// target threshold. A score exactly at target passes.
    pub fn passed(&self, scores: &JudgeScores) -> bool {
        if scores.is_error() {
            return false;
        }
        let meets = |score: Option<f64>, target: f64| score.map_or(false, |s| s >= target);
        meets(scores.faithfulness, self.faithfulness_target)
            && meets(scores.answer_relevancy, self.answer_relevancy_target)
            && meets(scores.context_precision, self.context_precision_target)
    }
}

/// Aggregate judged results across queries.
///
/// Averages are computed only over non-error records and are defined as 0
/// when there are no valid records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JudgeSummary {
    pub count: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub pass_rate: f64,
    pub avg_faithfulness: f64,
    pub avg_answer_relevancy: f64,
    pub avg_context_precision: f64,
}

impl JudgeSummary {
    pub fn aggregate<'a>(
        scores: impl IntoIterator<Item = &'a JudgeScores>,
        thresholds: &QualityThresholds,
    ) -> Self {
        let mut summary = JudgeSummary::default();
        let mut valid = 0usize;
        let mut sums = (0.0, 0.0, 0.0);

        for record in scores {
            summary.count += 1;
            if record.is_error() {
                summary.errored += 1;
                summary.failed += 1;
                continue;
            }

            valid += 1;
            sums.0 += record.faithfulness.unwrap_or(0.0);
            sums.1 += record.answer_relevancy.unwrap_or(0.0);
            sums.2 += record.context_precision.unwrap_or(0.0);

            if thresholds.passed(record) {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
        }

        if valid > 0 {
            summary.avg_faithfulness = sums.0 / valid as f64;
            summary.avg_answer_relevancy = sums.1 / valid as f64;
            summary.avg_context_precision = sums.2 / valid as f64;
        }
        if summary.count > 0 {
            summary.pass_rate = summary.passed as f64 / summary.count as f64;
        }

        summary
    }

    /// Alert-threshold breaches across the aggregate averages, as
    /// human-readable descriptions. Empty means the run is healthy.
    pub fn alert_breaches(&self, thresholds: &QualityThresholds) -> Vec<String> {
        let mut breaches = Vec::new();
        if self.count == self.errored {
            // no valid records to judge the averages by
            return breaches;
        }
        if self.avg_faithfulness < thresholds.faithfulness_alert {
            breaches.push(format!(
                "average faithfulness {:.3} below alert threshold {:.2}",
                self.avg_faithfulness, thresholds.faithfulness_alert
            ));
        }
        if self.avg_answer_relevancy < thresholds.answer_relevancy_alert {
            breaches.push(format!(
                "average answer relevancy {:.3} below alert threshold {:.2}",
                self.avg_answer_relevancy, thresholds.answer_relevancy_alert
            ));
        }
        if self.avg_context_precision < thresholds.context_precision_alert {
            breaches.push(format!(
                "average context precision {:.3} below alert threshold {:.2}",
                self.avg_context_precision, thresholds.context_precision_alert
            ));
        }
        breaches
    }
}

/// Message-passing seam to the judge.
#[async_trait]
pub trait JudgeService: Send + Sync {
    /// Judge one triple. Transport and timeout failures are errors; an
    /// application-level judge failure comes back as scores with `error` set.
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeScores>;
}

/// HTTP judge client with a bounded per-call deadline and retry at this
/// boundary only.
pub struct HttpJudge {
    client: reqwest::Client,
    config: JudgeConfig,
    retry: RetryPolicy,
}

impl HttpJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/evaluate", base)
    }

    async fn call_once(&self, request: &JudgeRequest) -> Result<JudgeScores> {
        let deadline = Duration::from_secs(self.config.timeout_secs);

        let send = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("x-judge-model", &self.config.model)
            .json(request)
            .send();

        let response = tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| RankfuseError::JudgeTimeout(self.config.timeout_secs))??;

        let status = response.status();
        let body = tokio::time::timeout(deadline, response.text())
            .await
            .map_err(|_| RankfuseError::JudgeTimeout(self.config.timeout_secs))??;

        if !status.is_success() {
            if retryable_status(status) {
                return Err(RankfuseError::Http(format!(
                    "judge returned {}: {}",
                    status, body
                )));
            }
            return Err(RankfuseError::Judge(format!(
                "judge returned {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            RankfuseError::Parse(format!("invalid judge response: {}. Body: {}", e, body))
        })
    }
}

#[async_trait]
impl JudgeService for HttpJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeScores> {
        with_retry(&self.retry, "judge", || self.call_once(request)).await
    }
}
