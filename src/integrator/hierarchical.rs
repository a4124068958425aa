//! Hierarchical coupled Bayesian integration.
//!
//! Each (label, source) pair is an item with its own error rate. Items are
//! grouped by the root of their label's subsumption hierarchy (a label outside
//! any hierarchy is its own group), and error rates are shared through a
//! two-level Chinese restaurant franchise: items pick a shared error-rate
//! component with concentration `alpha` inside their group, and groups draw
//! components from a global pool with concentration `gamma`. Related labels
//! therefore share strength both across sources and across the hierarchy.
//!
//! Sampling uses the direct-assignment scheme with the number of groups
//! using a component standing in for its table count.

use std::collections::BTreeMap;

use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bayesian::SamplerConfig;
use super::domain::{Dataset, Estimates};
use super::sampling::{self, Chain};
use super::CancellationToken;
use crate::constraint::ConstraintSet;
use crate::error::LabelFuseError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalConfig {
    #[serde(flatten)]
    pub sampler: SamplerConfig,
    /// Concentration inside a label group.
    pub alpha: f64,
    /// Concentration of the global component pool.
    pub gamma: f64,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            alpha: 1.0,
            gamma: 1.0,
        }
    }
}

impl HierarchicalConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        self.sampler.validate()?;
        for (name, value) in [("alpha", self.alpha), ("gamma", self.gamma)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{} must be positive, got {}", name, value));
            }
        }
        Ok(())
    }
}

/// Group index per label, from the subsumption hierarchy roots.
pub(crate) fn label_groups(dataset: &Dataset, constraints: Option<&ConstraintSet>) -> Vec<usize> {
    let mut group_of_root = BTreeMap::new();
    dataset
        .labels
        .iter()
        .map(|domain| {
            let root = match constraints {
                Some(constraints) => constraints.hierarchy_root(&domain.label),
                None => domain.label.clone(),
            };
            let next = group_of_root.len();
            *group_of_root.entry(root).or_insert(next)
        })
        .collect()
}

struct Item {
    label: usize,
    source: usize,
    group: usize,
}

struct Component {
    error_rate: f64,
    /// Items per group.
    group_counts: Vec<usize>,
    items: usize,
}

impl Component {
    fn groups_using(&self) -> usize {
        self.group_counts.iter().filter(|&&c| c > 0).count()
    }
}

struct HierarchicalChain<'a> {
    dataset: &'a Dataset,
    config: &'a HierarchicalConfig,
    items: Vec<Item>,
    /// Item indices per label, parallel to `LabelDomain::sources`.
    label_items: Vec<Vec<usize>>,
    assignment: Vec<usize>,
    components: Vec<Component>,
    truth: Vec<Vec<bool>>,
    positive_rates: Vec<f64>,
    conditional: Vec<Vec<f64>>,
    error_sums: Vec<Vec<f64>>,
    soft_sums: Vec<Vec<f64>>,
}

impl<'a> HierarchicalChain<'a> {
    fn new(dataset: &'a Dataset, config: &'a HierarchicalConfig, groups: &[usize]) -> Self {
        let group_count = groups.iter().copied().max().map_or(0, |g| g + 1);
        let mut items = Vec::new();
        let mut label_items = Vec::with_capacity(dataset.labels.len());
        for (label, domain) in dataset.labels.iter().enumerate() {
            let mut indices = Vec::with_capacity(domain.sources.len());
            for &source in &domain.sources {
                indices.push(items.len());
                items.push(Item {
                    label,
                    source,
                    group: groups[label],
                });
            }
            label_items.push(indices);
        }

        // Start from one shared component.
        let mut components = Vec::new();
        if !items.is_empty() {
            let mut group_counts = vec![0; group_count];
            for item in &items {
                group_counts[item.group] += 1;
            }
            components.push(Component {
                error_rate: 0.25,
                group_counts,
                items: items.len(),
            });
        }

        let sources = dataset.source_count();
        Self {
            dataset,
            config,
            assignment: vec![0; items.len()],
            items,
            label_items,
            components,
            truth: dataset.labels.iter().map(|d| d.majority()).collect(),
            positive_rates: vec![0.5; dataset.labels.len()],
            conditional: dataset
                .labels
                .iter()
                .map(|d| vec![0.5; d.instances.len()])
                .collect(),
            error_sums: vec![vec![0.0; sources]; dataset.labels.len()],
            soft_sums: dataset
                .labels
                .iter()
                .map(|d| vec![0.0; d.instances.len()])
                .collect(),
        }
    }

    fn group_count(&self) -> usize {
        self.items.iter().map(|i| i.group + 1).max().unwrap_or(0)
    }

    /// Current error rate of every source on `label`, indexed globally.
    fn label_error_rates(&self, label: usize) -> Vec<f64> {
        let mut rates = vec![0.5; self.dataset.source_count()];
        for &item in &self.label_items[label] {
            rates[self.items[item].source] = self.components[self.assignment[item]].error_rate;
        }
        rates
    }

    fn reassign_item<R: Rng + ?Sized>(&mut self, item: usize, wrong: u32, total: u32, rng: &mut R) {
        let config = self.config;
        let prior = &config.sampler;
        let group = self.items[item].group;

        let current = self.assignment[item];
        self.components[current].items -= 1;
        self.components[current].group_counts[group] -= 1;
        if self.components[current].items == 0 {
            self.components.swap_remove(current);
            let moved = self.components.len();
            for assigned in self.assignment.iter_mut() {
                if *assigned == moved {
                    *assigned = current;
                }
            }
        }

        let tables: usize = self.components.iter().map(Component::groups_using).sum();
        let denominator = tables as f64 + config.gamma;
        let mut log_weights: Vec<f64> = self
            .components
            .iter()
            .map(|component| {
                let global = component.groups_using() as f64 / denominator;
                let local = component.group_counts[group] as f64 + config.alpha * global;
                local.ln() + sampling::vote_log_likelihood(component.error_rate, wrong, total)
            })
            .collect();
        log_weights.push(
            (config.alpha * config.gamma / denominator).ln()
                + sampling::vote_log_marginal(
                    prior.error_rates_prior_alpha,
                    prior.error_rates_prior_beta,
                    wrong,
                    total,
                ),
        );

        let chosen = sampling::categorical_from_logs(rng, &log_weights);
        if chosen == self.components.len() {
            let mut group_counts = vec![0; self.group_count()];
            group_counts[group] = 1;
            self.components.push(Component {
                error_rate: sampling::beta(
                    rng,
                    prior.error_rates_prior_alpha + f64::from(wrong),
                    prior.error_rates_prior_beta + f64::from(total - wrong),
                ),
                group_counts,
                items: 1,
            });
        } else {
            self.components[chosen].items += 1;
            self.components[chosen].group_counts[group] += 1;
        }
        self.assignment[item] = chosen;
    }
}

impl Chain for HierarchicalChain<'_> {
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

        let counts: Vec<(Vec<u32>, Vec<u32>)> = dataset
            .labels
            .iter()
            .zip(&self.truth)
            .map(|(domain, truth)| domain.disagreements(truth, sources))
            .collect();
        let item_counts: Vec<(u32, u32)> = self
            .items
            .iter()
            .map(|item| {
                let (wrong, total) = &counts[item.label];
                (wrong[item.source], total[item.source])
            })
            .collect();

        for (item, &(wrong, total)) in item_counts.iter().enumerate() {
            self.reassign_item(item, wrong, total, rng);
        }

        let mut wrong = vec![0u32; self.components.len()];
        let mut total = vec![0u32; self.components.len()];
        for (item, &(w, n)) in item_counts.iter().enumerate() {
            wrong[self.assignment[item]] += w;
            total[self.assignment[item]] += n;
        }
        for (k, component) in self.components.iter_mut().enumerate() {
            component.error_rate = sampling::beta(
                rng,
                prior.error_rates_prior_alpha + f64::from(wrong[k]),
                prior.error_rates_prior_beta + f64::from(total[k] - wrong[k]),
            );
        }

        for (label, domain) in dataset.labels.iter().enumerate() {
            let error_rates = self.label_error_rates(label);
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
        for label in 0..self.dataset.labels.len() {
            let error_rates = self.label_error_rates(label);
            for &item in &self.label_items[label] {
                let source = self.items[item].source;
                self.error_sums[label][source] += error_rates[source];
            }
            for (sum, p) in self.soft_sums[label].iter_mut().zip(&self.conditional[label]) {
                *sum += p;
            }
        }
    }
}

pub(crate) fn integrate(
    dataset: &Dataset,
    config: &HierarchicalConfig,
    constraints: Option<&ConstraintSet>,
    seed: u64,
    cancel: &CancellationToken,
) -> Result<Estimates, LabelFuseError> {
    let groups = label_groups(dataset, constraints);
    let mut rng = sampling::seeded_rng(seed);
    let mut chain = HierarchicalChain::new(dataset, config, &groups);
    let recorded = sampling::run_chain(&mut chain, &config.sampler, &mut rng, cancel)?;
    debug!(
        recorded,
        components = chain.components.len(),
        groups = chain.group_count(),
        "hierarchical chain finished"
    );

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::from_constraints_str;
    use crate::data::PredictedInstance;

    fn config() -> HierarchicalConfig {
        HierarchicalConfig {
            sampler: SamplerConfig {
                burn_in_samples: 100,
                thinning_samples: 2,
                samples: 100,
                ..SamplerConfig::default()
            },
            ..HierarchicalConfig::default()
        }
    }

    fn predictions() -> Vec<PredictedInstance> {
        let mut predicted = Vec::new();
        for (label, flip_every) in [("animal", 5), ("dog", 4), ("plant", 7)] {
            for id in 0..24 {
                let truth = id % 2 == 1;
                let noisy = if id % flip_every == 0 { !truth } else { truth };
                predicted.push(PredictedInstance::new(id, label, 0, f64::from(u8::from(truth))));
                predicted.push(PredictedInstance::new(id, label, 1, f64::from(u8::from(noisy))));
                predicted.push(PredictedInstance::new(id, label, 2, f64::from(u8::from(truth))));
            }
        }
        predicted
    }

    #[test]
    fn groups_follow_hierarchy_roots() {
        let dataset = Dataset::from_predictions(&predictions());
        let constraints = from_constraints_str("animal -> dog\n").unwrap();
        // labels sort as animal, dog, plant
        assert_eq!(label_groups(&dataset, Some(&constraints)), vec![0, 0, 1]);
        assert_eq!(label_groups(&dataset, None), vec![0, 1, 2]);
    }

    #[test]
    fn produces_valid_estimates_deterministically() {
        let dataset = Dataset::from_predictions(&predictions());
        let constraints = from_constraints_str("animal -> dog\n").unwrap();
        let run = || {
            integrate(&dataset, &config(), Some(&constraints), 3, &CancellationToken::new())
                .unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.error_rates, b.error_rates);
        for rates in &a.error_rates {
            assert!(rates.iter().all(|e| (0.0..=1.0).contains(e)));
        }
        assert!(a.soft_labels[2][1] > 0.5);
        assert!(a.soft_labels[2][2] < 0.5);
    }
}
