//! Accuracy metrics against known truth.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::data::{hard_label, ErrorRate, IntegratedLabel, IntegrationResult, Label, ObservedInstance};
use crate::error::LabelFuseError;

/// Deviation of estimates from truth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Deviation {
    /// Mean absolute deviation.
    pub mad: f64,
    /// Mean squared error.
    pub mse: f64,
}

/// Error-rate and integrated-label deviations for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub error_rates: Deviation,
    pub soft_labels: Deviation,
    /// Soft labels thresholded with `> 0.5` against 0/1 truth.
    pub hard_labels: Deviation,
}

/// Scores a result. Integrated labels must be present and every key must
/// appear exactly once on each side.
pub fn compute_metrics(
    true_error_rates: &[ErrorRate],
    true_labels: &[ObservedInstance],
    result: &IntegrationResult,
) -> Result<Metrics, LabelFuseError> {
    let integrated = result.integrated_labels.as_deref().ok_or_else(|| {
        LabelFuseError::MetricAlignment("result carries no integrated labels".to_string())
    })?;

    let error_rates = deviation(
        "error rate",
        error_rate_map("truth", true_error_rates)?,
        error_rate_map("estimate", &result.error_rates)?,
    )?;

    let truth = keyed(
        "label",
        "truth",
        true_labels
            .iter()
            .map(|o| ((o.id, o.label.clone()), if o.value { 1.0 } else { 0.0 })),
    )?;
    let soft = soft_label_map(integrated, |l| l.soft)?;
    let hard = soft_label_map(integrated, |l| if hard_label(l.soft) { 1.0 } else { 0.0 })?;

    Ok(Metrics {
        error_rates,
        soft_labels: deviation("soft label", truth.clone(), soft)?,
        hard_labels: deviation("hard label", truth, hard)?,
    })
}

/// Collects values by key, rejecting a key seen twice.
fn keyed<K: Ord + fmt::Debug>(
    what: &str,
    side: &str,
    entries: impl IntoIterator<Item = (K, f64)>,
) -> Result<BTreeMap<K, f64>, LabelFuseError> {
    let mut map = BTreeMap::new();
    for (key, value) in entries {
        if map.contains_key(&key) {
            return Err(LabelFuseError::MetricAlignment(format!(
                "{} key {:?} appears more than once in {}",
                what, key, side
            )));
        }
        map.insert(key, value);
    }
    Ok(map)
}

fn error_rate_map(
    side: &str,
    rates: &[ErrorRate],
) -> Result<BTreeMap<(Label, i64), f64>, LabelFuseError> {
    keyed(
        "error rate",
        side,
        rates.iter().map(|r| ((r.label.clone(), r.source_id), r.value)),
    )
}

fn soft_label_map(
    labels: &[IntegratedLabel],
    value: impl Fn(&IntegratedLabel) -> f64,
) -> Result<BTreeMap<(i64, Label), f64>, LabelFuseError> {
    keyed(
        "integrated label",
        "estimate",
        labels
            .iter()
            .map(|l| ((l.instance_id, l.label.clone()), value(l))),
    )
}

/// MAD and MSE over identical key sets, walked in key order.
fn deviation<K: Ord + fmt::Debug>(
    what: &str,
    truth: BTreeMap<K, f64>,
    estimate: BTreeMap<K, f64>,
) -> Result<Deviation, LabelFuseError> {
    if let Some(key) = truth.keys().find(|k| !estimate.contains_key(*k)) {
        return Err(misaligned(what, "estimate", key));
    }
    if let Some(key) = estimate.keys().find(|k| !truth.contains_key(*k)) {
        return Err(misaligned(what, "truth", key));
    }
    if truth.is_empty() {
        return Err(LabelFuseError::MetricAlignment(format!(
            "no {} values to compare",
            what
        )));
    }

    let n = truth.len() as f64;
    let (abs, sq) = truth
        .values()
        .zip(estimate.values())
        .fold((0.0, 0.0), |(abs, sq), (t, e)| {
            let d = t - e;
            (abs + d.abs(), sq + d * d)
        });
    Ok(Deviation {
        mad: abs / n,
        mse: sq / n,
    })
}

fn misaligned(what: &str, side: &str, key: &impl fmt::Debug) -> LabelFuseError {
    LabelFuseError::MetricAlignment(format!("{} key {:?} missing from {}", what, key, side))
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MAD {:.4} / MSE {:.4}", self.mad, self.mse)
    }
}
