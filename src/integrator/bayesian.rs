//! Independent Bayesian integration.
//!
//! Every label is its own model:
//!
//! ```text
//! pi      ~ Beta(labels_prior_alpha, labels_prior_beta)
//! e_j     ~ Beta(error_rates_prior_alpha, error_rates_prior_beta)
//! z_i     ~ Bernoulli(pi)
//! v_ij    = z_i flipped with probability e_j
//! ```
//!
//! Labels share nothing, so their chains run in parallel; each chain gets a
//! seed derived from the request seed and the label's position.

use rand::{Rng, RngExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Dataset, Estimates, LabelDomain};
use super::sampling::{self, Chain};
use super::CancellationToken;
use crate::error::LabelFuseError;

pub const DEFAULT_BURN_IN_SAMPLES: usize = 4000;
pub const DEFAULT_THINNING_SAMPLES: usize = 10;
pub const DEFAULT_SAMPLES: usize = 200;

/// Gibbs schedule and priors shared by the Bayesian family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Sweeps discarded before recording.
    pub burn_in_samples: usize,
    /// Keep every n-th sweep after burn-in.
    pub thinning_samples: usize,
    /// Number of recorded sweeps.
    pub samples: usize,
    pub labels_prior_alpha: f64,
    pub labels_prior_beta: f64,
    pub error_rates_prior_alpha: f64,
    pub error_rates_prior_beta: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            burn_in_samples: DEFAULT_BURN_IN_SAMPLES,
            thinning_samples: DEFAULT_THINNING_SAMPLES,
            samples: DEFAULT_SAMPLES,
            labels_prior_alpha: 1.0,
            labels_prior_beta: 1.0,
            error_rates_prior_alpha: 1.0,
            error_rates_prior_beta: 2.0,
        }
    }
}

impl SamplerConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.samples == 0 {
            return Err("samples must be at least 1".to_string());
        }
        if self.thinning_samples == 0 {
            return Err("thinning must be at least 1".to_string());
        }
        for (name, value) in [
            ("labels prior alpha", self.labels_prior_alpha),
            ("labels prior beta", self.labels_prior_beta),
            ("error rates prior alpha", self.error_rates_prior_alpha),
            ("error rates prior beta", self.error_rates_prior_beta),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{} must be positive, got {}", name, value));
            }
        }
        Ok(())
    }
}

/// Chain state for one label.
struct LabelChain<'a> {
    domain: &'a LabelDomain,
    config: &'a SamplerConfig,
    source_count: usize,
    truth: Vec<bool>,
    positive_rate: f64,
    error_rates: Vec<f64>,
    conditional: Vec<f64>,
    error_sums: Vec<f64>,
    soft_sums: Vec<f64>,
}

impl<'a> LabelChain<'a> {
    fn new(domain: &'a LabelDomain, config: &'a SamplerConfig, source_count: usize) -> Self {
        let instances = domain.instances.len();
        Self {
            domain,
            config,
            source_count,
            truth: domain.majority(),
            positive_rate: 0.5,
            error_rates: vec![0.25; source_count],
            conditional: vec![0.5; instances],
            error_sums: vec![0.0; source_count],
            soft_sums: vec![0.0; instances],
        }
    }

    fn means(self, recorded: usize) -> (Vec<f64>, Vec<f64>) {
        let n = recorded.max(1) as f64;
        (
            self.error_sums.into_iter().map(|s| s / n).collect(),
            self.soft_sums.into_iter().map(|s| s / n).collect(),
        )
    }
}

impl Chain for LabelChain<'_> {
    fn sweep<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let positives = self.truth.iter().filter(|&&z| z).count() as f64;
        let negatives = self.truth.len() as f64 - positives;
        self.positive_rate = sampling::beta(
            rng,
            self.config.labels_prior_alpha + positives,
            self.config.labels_prior_beta + negatives,
        );

        let (wrong, total) = self.domain.disagreements(&self.truth, self.source_count);
        for &source in &self.domain.sources {
            self.error_rates[source] = sampling::beta(
                rng,
                self.config.error_rates_prior_alpha + f64::from(wrong[source]),
                self.config.error_rates_prior_beta + f64::from(total[source] - wrong[source]),
            );
        }

        let pi = sampling::clamp_probability(self.positive_rate);
        let prior_log_odds = (pi / (1.0 - pi)).ln();
        for instance in 0..self.truth.len() {
            let log_odds = prior_log_odds
                + self
                    .domain
                    .vote_log_odds(instance, |source| self.error_rates[source]);
            let p = sampling::sigmoid(log_odds);
            self.conditional[instance] = p;
            self.truth[instance] = rng.random::<f64>() < p;
        }
    }

    fn record(&mut self) {
        for &source in &self.domain.sources {
            self.error_sums[source] += self.error_rates[source];
        }
        for (sum, p) in self.soft_sums.iter_mut().zip(&self.conditional) {
            *sum += p;
        }
    }
}

pub(crate) fn integrate(
    dataset: &Dataset,
    config: &SamplerConfig,
    seed: u64,
    cancel: &CancellationToken,
) -> Result<Estimates, LabelFuseError> {
    let per_label: Vec<(Vec<f64>, Vec<f64>)> = dataset
        .labels
        .par_iter()
        .enumerate()
        .map(|(index, domain)| -> Result<(Vec<f64>, Vec<f64>), LabelFuseError> {
            let mut rng = sampling::seeded_rng(sampling::derive_seed(seed, index as u64));
            let mut chain = LabelChain::new(domain, config, dataset.source_count());
            let recorded = sampling::run_chain(&mut chain, config, &mut rng, cancel)?;
            debug!(label = %domain.label, recorded, "bayesian chain finished");
            Ok(chain.means(recorded))
        })
        .collect::<Result<_, _>>()?;

    let mut estimates = Estimates::default();
    for (error_rates, soft) in per_label {
        estimates.push(error_rates, soft);
    }
    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PredictedInstance;

    fn quick_config() -> SamplerConfig {
        SamplerConfig {
            burn_in_samples: 200,
            thinning_samples: 2,
            samples: 200,
            ..SamplerConfig::default()
        }
    }

    /// Sources 0 and 1 are reliable, source 2 is always wrong.
    fn skewed_predictions() -> Vec<PredictedInstance> {
        let mut predicted = Vec::new();
        for id in 0..40 {
            let truth = id % 2 == 0;
            for source in 0..3 {
                let vote = if source == 2 { !truth } else { truth };
                predicted.push(PredictedInstance::new(id, "l", source, if vote { 1.0 } else { 0.0 }));
            }
        }
        predicted
    }

    #[test]
    fn recovers_reliable_and_unreliable_sources() {
        let dataset = Dataset::from_predictions(&skewed_predictions());
        let estimates =
            integrate(&dataset, &quick_config(), 42, &CancellationToken::new()).unwrap();
        let rates = &estimates.error_rates[0];
        assert!(rates[0] < 0.2, "{rates:?}");
        assert!(rates[1] < 0.2, "{rates:?}");
        assert!(rates[2] > 0.8, "{rates:?}");
        assert!(estimates.soft_labels[0][0] > 0.9);
        assert!(estimates.soft_labels[0][1] < 0.1);
    }

    #[test]
    fn same_seed_same_chain() {
        let dataset = Dataset::from_predictions(&skewed_predictions());
        let config = quick_config();
        let a = integrate(&dataset, &config, 9, &CancellationToken::new()).unwrap();
        let b = integrate(&dataset, &config, 9, &CancellationToken::new()).unwrap();
        assert_eq!(a.error_rates, b.error_rates);
        assert_eq!(a.soft_labels, b.soft_labels);
    }

    #[test]
    fn cancelled_chain_stops() {
        let dataset = Dataset::from_predictions(&skewed_predictions());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = integrate(&dataset, &quick_config(), 1, &cancel).unwrap_err();
        assert!(matches!(err, LabelFuseError::Cancelled));
    }

    #[test]
    fn rejects_zero_samples() {
        let config = SamplerConfig {
            samples: 0,
            ..SamplerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
