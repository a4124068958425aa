//! Coupled Bayesian integration.
//!
//! Labels are partitioned into clusters by a Chinese restaurant process with
//! concentration `alpha`. All labels in a cluster share one error-rate vector
//! over sources, so a source with few predictions on one label borrows
//! strength from the labels it is clustered with. Small `alpha` favours few
//! shared clusters; large `alpha` approaches the independent model.

use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bayesian::SamplerConfig;
use super::domain::{Dataset, Estimates};
use super::sampling::{self, Chain};
use super::CancellationToken;
use crate::error::LabelFuseError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoupledConfig {
    #[serde(flatten)]
    pub sampler: SamplerConfig,
    /// Concentration of the label clustering process.
    pub alpha: f64,
}

impl Default for CoupledConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            alpha: 1.0,
        }
    }
}

impl CoupledConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        self.sampler.validate()?;
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(format!("alpha must be positive, got {}", self.alpha));
        }
        Ok(())
    }
}

struct Cluster {
    members: usize,
    error_rates: Vec<f64>,
}

struct CoupledChain<'a> {
    dataset: &'a Dataset,
    config: &'a CoupledConfig,
    truth: Vec<Vec<bool>>,
    positive_rates: Vec<f64>,
    conditional: Vec<Vec<f64>>,
    assignment: Vec<usize>,
    clusters: Vec<Cluster>,
    error_sums: Vec<Vec<f64>>,
    soft_sums: Vec<Vec<f64>>,
}

impl<'a> CoupledChain<'a> {
    fn new(dataset: &'a Dataset, config: &'a CoupledConfig) -> Self {
        let sources = dataset.source_count();
        let labels = dataset.labels.len();
        // Start from one shared cluster.
        let clusters = if labels == 0 {
            Vec::new()
        } else {
            vec![Cluster {
                members: labels,
                error_rates: vec![0.25; sources],
            }]
        };
        Self {
            dataset,
            config,
            truth: dataset.labels.iter().map(|d| d.majority()).collect(),
            positive_rates: vec![0.5; labels],
            conditional: dataset
                .labels
                .iter()
                .map(|d| vec![0.5; d.instances.len()])
                .collect(),
            assignment: vec![0; labels],
            clusters,
            error_sums: vec![vec![0.0; sources]; labels],
            soft_sums: dataset
                .labels
                .iter()
                .map(|d| vec![0.0; d.instances.len()])
                .collect(),
        }
    }

    fn reassign_label<R: Rng + ?Sized>(&mut self, label: usize, rng: &mut R) {
        let (dataset, config) = (self.dataset, self.config);
        let prior = &config.sampler;
        let domain = &dataset.labels[label];
        let (wrong, total) = domain.disagreements(&self.truth[label], dataset.source_count());

        let current = self.assignment[label];
        self.clusters[current].members -= 1;
        if self.clusters[current].members == 0 {
            self.clusters.swap_remove(current);
            // The cluster that moved into `current` keeps its members.
            let moved = self.clusters.len();
            for assigned in self.assignment.iter_mut() {
                if *assigned == moved {
                    *assigned = current;
                }
            }
        }

        let mut log_weights: Vec<f64> = self
            .clusters
            .iter()
            .map(|cluster| {
                (cluster.members as f64).ln()
                    + domain
                        .sources
                        .iter()
                        .map(|&s| {
                            sampling::vote_log_likelihood(cluster.error_rates[s], wrong[s], total[s])
                        })
                        .sum::<f64>()
            })
            .collect();
        log_weights.push(
            config.alpha.ln()
                + domain
                    .sources
                    .iter()
                    .map(|&s| {
                        sampling::vote_log_marginal(
                            prior.error_rates_prior_alpha,
                            prior.error_rates_prior_beta,
                            wrong[s],
                            total[s],
                        )
                    })
                    .sum::<f64>(),
        );

        let chosen = sampling::categorical_from_logs(rng, &log_weights);
        if chosen == self.clusters.len() {
            let error_rates = wrong
                .iter()
                .zip(&total)
                .map(|(&w, &n)| {
                    sampling::beta(
                        rng,
                        prior.error_rates_prior_alpha + f64::from(w),
                        prior.error_rates_prior_beta + f64::from(n - w),
                    )
                })
                .collect();
            self.clusters.push(Cluster {
                members: 1,
                error_rates,
            });
        } else {
            self.clusters[chosen].members += 1;
        }
        self.assignment[label] = chosen;
    }
}

impl Chain for CoupledChain<'_> {
    fn sweep<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let (dataset, config) = (self.dataset, self.config);
        let prior = &config.sampler;
        let sources = dataset.source_count();

        for (rate, truth) in self.positive_rates.iter_mut().zip(&self.truth) {
            let positives = truth.iter().filter(|&&z| z).count() as f64;
            *rate = sampling::beta(
                rng,
                prior.labels_prior_alpha + positives,
                prior.labels_prior_beta + truth.len() as f64 - positives,
            );
        }

        for label in 0..dataset.labels.len() {
            self.reassign_label(label, rng);
        }

        let mut wrong = vec![vec![0u32; sources]; self.clusters.len()];
        let mut total = vec![vec![0u32; sources]; self.clusters.len()];
        for (label, domain) in dataset.labels.iter().enumerate() {
            let (w, n) = domain.disagreements(&self.truth[label], sources);
            let cluster = self.assignment[label];
            for s in 0..sources {
                wrong[cluster][s] += w[s];
                total[cluster][s] += n[s];
            }
        }
        for (k, cluster) in self.clusters.iter_mut().enumerate() {
            for s in 0..sources {
                cluster.error_rates[s] = sampling::beta(
                    rng,
                    prior.error_rates_prior_alpha + f64::from(wrong[k][s]),
                    prior.error_rates_prior_beta + f64::from(total[k][s] - wrong[k][s]),
                );
            }
        }

        for (label, domain) in dataset.labels.iter().enumerate() {
            let error_rates = &self.clusters[self.assignment[label]].error_rates;
            let pi = sampling::clamp_probability(self.positive_rates[label]);
            let prior_log_odds = (pi / (1.0 - pi)).ln();
            for instance in 0..domain.instances.len() {
                let p = sampling::sigmoid(
                    prior_log_odds + domain.vote_log_odds(instance, |s| error_rates[s]),
                );
                self.conditional[label][instance] = p;
                self.truth[label][instance] = rng.random::<f64>() < p;
            }
        }
    }

    fn record(&mut self) {
        for (label, domain) in self.dataset.labels.iter().enumerate() {
            let error_rates = &self.clusters[self.assignment[label]].error_rates;
            for &s in &domain.sources {
                self.error_sums[label][s] += error_rates[s];
            }
            for (sum, p) in self.soft_sums[label].iter_mut().zip(&self.conditional[label]) {
                *sum += p;
            }
        }
    }
}

pub(crate) fn integrate(
    dataset: &Dataset,
    config: &CoupledConfig,
    seed: u64,
    cancel: &CancellationToken,
) -> Result<Estimates, LabelFuseError> {
    let mut rng = sampling::seeded_rng(seed);
    let mut chain = CoupledChain::new(dataset, config);
    let recorded = sampling::run_chain(&mut chain, &config.sampler, &mut rng, cancel)?;
    debug!(recorded, clusters = chain.clusters.len(), "coupled chain finished");

    let n = recorded.max(1) as f64;
    let mut estimates = Estimates::default();
    for (error_sums, soft_sums) in chain.error_sums.into_iter().zip(chain.soft_sums) {
        estimates.push(
            error_sums.into_iter().map(|s| s / n).collect(),
            soft_sums.into_iter().map(|s| s / n).collect(),
        );
    }
    Ok(estimates)
}
