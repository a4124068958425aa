//! Core record types shared by every integrator and codec.

use serde::{Deserialize, Serialize};

use super::Label;

/// Source id used when integrated labels travel as predicted instances.
pub const INTEGRATED_SOURCE_ID: i64 = -1;

/// Soft labels strictly above this threshold become positive hard labels.
///
/// A soft label of exactly 0.5 is a negative hard label.
pub const HARD_LABEL_THRESHOLD: f64 = 0.5;

/// Thresholds a soft label into a hard decision.
#[inline]
pub fn hard_label(soft: f64) -> bool {
    soft > HARD_LABEL_THRESHOLD
}

/// One source's prediction for one instance/label pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictedInstance {
    pub id: i64,
    pub label: Label,
    pub source_id: i64,
    /// Prediction in `[0, 1]`.
    pub value: f64,
}

impl PredictedInstance {
    pub fn new(id: i64, label: impl Into<Label>, source_id: i64, value: f64) -> Self {
        Self {
            id,
            label: label.into(),
            source_id,
            value,
        }
    }

    /// Whether the source votes for the label (`value >= 0.5`).
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.value >= 0.5
    }
}

/// A ground-truth (or semi-supervised) label for an instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedInstance {
    pub id: i64,
    pub label: Label,
    pub value: bool,
}

impl ObservedInstance {
    pub fn new(id: i64, label: impl Into<Label>, value: bool) -> Self {
        Self {
            id,
            label: label.into(),
            value,
        }
    }
}

/// Probability that a source mislabels a label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRate {
    pub label: Label,
    pub source_id: i64,
    pub value: f64,
}

impl ErrorRate {
    pub fn new(label: impl Into<Label>, source_id: i64, value: f64) -> Self {
        Self {
            label: label.into(),
            source_id,
            value,
        }
    }
}

/// The integrated (posterior) label of an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegratedLabel {
    pub instance_id: i64,
    pub label: Label,
    /// Posterior probability that the label holds.
    pub soft: f64,
    /// `soft > 0.5`.
    pub hard: bool,
}

impl IntegratedLabel {
    /// Creates an integrated label, deriving the hard decision from `soft`.
    pub fn new(instance_id: i64, label: impl Into<Label>, soft: f64) -> Self {
        Self {
            instance_id,
            label: label.into(),
            soft,
            hard: hard_label(soft),
        }
    }

    /// Wire form: a predicted instance attributed to [`INTEGRATED_SOURCE_ID`].
    pub fn to_predicted(&self) -> PredictedInstance {
        PredictedInstance::new(
            self.instance_id,
            self.label.clone(),
            INTEGRATED_SOURCE_ID,
            self.soft,
        )
    }

    pub fn from_predicted(instance: &PredictedInstance) -> Self {
        Self::new(instance.id, instance.label.clone(), instance.value)
    }
}

/// Output of one integration run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub error_rates: Vec<ErrorRate>,
    /// Present only when label integration was requested.
    pub integrated_labels: Option<Vec<IntegratedLabel>>,
}

impl IntegrationResult {
    pub fn new(error_rates: Vec<ErrorRate>, integrated_labels: Option<Vec<IntegratedLabel>>) -> Self {
        Self {
            error_rates,
            integrated_labels,
        }
    }

    /// Sorts error rates by (label, source) and integrated labels by
    /// (label, instance) so results from different engines compare directly.
    pub fn into_canonical_order(mut self) -> Self {
        self.error_rates.sort_by(|a, b| {
            a.label
                .cmp(&b.label)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        if let Some(labels) = self.integrated_labels.as_mut() {
            labels.sort_by(|a, b| {
                a.label
                    .cmp(&b.label)
                    .then_with(|| a.instance_id.cmp(&b.instance_id))
            });
        }
        self
    }
}
