//! Sweep report types and terminal formatting.
//!
//! A [`SweepReport`] renders as an aligned text table (Display) or serializes
//! as JSON.

use serde::Serialize;
use std::fmt;

use super::Metrics;
use crate::error::LabelFuseError;

/// One row of a sweep: the combination that ran and how it went.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SweepRecord {
    /// Synthetic instances.
    pub instances: usize,
    /// Synthetic sources.
    pub sources: usize,
    /// Synthetic labels.
    pub labels: usize,
    /// Seed of the synthetic dataset.
    pub seed: u64,
    /// Strategy with its hyperparameters, e.g. `BI[4000:10:200:1.0:1.0:1.0:2.0]`.
    pub strategy: String,
    /// Transport name.
    pub transport: String,
    /// Scores, when the run succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    /// Wall-clock time of the transport call in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Failure message, when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All rows of a sweep, in grid order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub records: Vec<SweepRecord>,
}

impl SweepReport {
    pub fn new(records: Vec<SweepRecord>) -> Self {
        Self { records }
    }

    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }

    pub fn to_json(&self) -> Result<String, LabelFuseError> {
        serde_json::to_string_pretty(self).map_err(LabelFuseError::ReportJsonWrite)
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Sweep: {} run(s), {} succeeded, {} failed",
            self.records.len(),
            self.succeeded(),
            self.failed()
        )?;
        if self.records.is_empty() {
            return Ok(());
        }
        writeln!(f)?;

        let strategy_width = self
            .records
            .iter()
            .map(|r| r.strategy.len())
            .max()
            .unwrap_or(0)
            .max("strategy".len());
        writeln!(
            f,
            "{:<sw$}  {:<10}  {:>6}  {:>5}  {:>5}  {:>6}  {:>8}  {:>8}  {:>8}  {:>10}",
            "strategy",
            "transport",
            "inst",
            "src",
            "lbl",
            "seed",
            "err MAD",
            "soft MAD",
            "hard MAD",
            "time (ms)",
            sw = strategy_width
        )?;

        for r in &self.records {
            write!(
                f,
                "{:<sw$}  {:<10}  {:>6}  {:>5}  {:>5}  {:>6}",
                r.strategy,
                r.transport,
                r.instances,
                r.sources,
                r.labels,
                r.seed,
                sw = strategy_width
            )?;
            match (&r.metrics, &r.error) {
                (Some(m), _) => writeln!(
                    f,
                    "  {:>8.4}  {:>8.4}  {:>8.4}  {:>10.1}",
                    m.error_rates.mad,
                    m.soft_labels.mad,
                    m.hard_labels.mad,
                    r.duration_ms.unwrap_or(0.0)
                )?,
                (None, Some(error)) => writeln!(f, "  failed: {}", error)?,
                (None, None) => writeln!(f)?,
            }
        }
        Ok(())
    }
}
