//! Synthetic datasets with known ground truth.

use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{ErrorRate, Label, ObservedInstance, PredictedInstance};
use crate::integrator::sampling;

/// Error rates are drawn from Beta(1, 2): sources are usually, not always,
/// better than chance.
const TRUE_ERROR_RATE_ALPHA: f64 = 1.0;
const TRUE_ERROR_RATE_BETA: f64 = 2.0;

/// Size of a synthetic dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub instances: usize,
    pub sources: usize,
    pub labels: usize,
}

impl SyntheticConfig {
    pub fn new(instances: usize, sources: usize, labels: usize) -> Self {
        Self {
            instances,
            sources,
            labels,
        }
    }
}

/// Predictions plus the truth they were generated from.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticDataset {
    pub config: SyntheticConfig,
    /// Labels `"0"`, `"1"`, ...
    pub labels: Vec<Label>,
    pub predicted: Vec<PredictedInstance>,
    pub true_error_rates: Vec<ErrorRate>,
    pub true_labels: Vec<ObservedInstance>,
}

/// Generates a dataset: per-(label, source) error rates from Beta(1, 2),
/// uniformly random true labels, and one prediction per
/// (instance, label, source) that flips the truth with the source's error rate.
pub fn generate_synthetic(config: SyntheticConfig, seed: Option<u64>) -> SyntheticDataset {
    let mut rng = sampling::seeded_rng(sampling::resolve_seed(seed));
    let labels: Vec<Label> = (0..config.labels).map(|l| Label::new(l.to_string())).collect();

    let mut true_error_rates = Vec::with_capacity(config.labels * config.sources);
    for label in &labels {
        for source in 0..config.sources {
            true_error_rates.push(ErrorRate::new(
                label.clone(),
                source as i64,
                sampling::beta(&mut rng, TRUE_ERROR_RATE_ALPHA, TRUE_ERROR_RATE_BETA),
            ));
        }
    }

    let mut true_labels = Vec::with_capacity(config.labels * config.instances);
    for label in &labels {
        for instance in 0..config.instances {
            true_labels.push(ObservedInstance::new(
                instance as i64,
                label.clone(),
                rng.random::<bool>(),
            ));
        }
    }

    let mut predicted = Vec::with_capacity(config.labels * config.instances * config.sources);
    for (l, label) in labels.iter().enumerate() {
        for instance in 0..config.instances {
            let truth = true_labels[l * config.instances + instance].value;
            for source in 0..config.sources {
                let error_rate = true_error_rates[l * config.sources + source].value;
                let flipped = rng.random::<f64>() < error_rate;
                let vote = truth != flipped;
                predicted.push(PredictedInstance::new(
                    instance as i64,
                    label.clone(),
                    source as i64,
                    if vote { 1.0 } else { 0.0 },
                ));
            }
        }
    }

    debug!(
        instances = config.instances,
        sources = config.sources,
        labels = config.labels,
        predictions = predicted.len(),
        "generated synthetic dataset"
    );

    SyntheticDataset {
        config,
        labels,
        predicted,
        true_error_rates,
        true_labels,
    }
}
