//! Indexed view of the predictions that every integrator works on.
//!
//! Labels are independent inference problems, so predictions are grouped by
//! label first. Inside a label, instances and sources are dense indices;
//! sources are indexed globally so coupled models can share them.

use std::collections::{BTreeMap, BTreeSet};

use crate::data::{ErrorRate, IntegratedLabel, IntegrationResult, Label, PredictedInstance};

/// One source's binarized vote on one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Vote {
    pub source: usize,
    pub positive: bool,
}

/// All predictions for one label.
#[derive(Clone, Debug)]
pub(crate) struct LabelDomain {
    pub label: Label,
    /// Sorted instance ids with at least one prediction.
    pub instances: Vec<i64>,
    /// Votes per instance, parallel to `instances`.
    pub votes: Vec<Vec<Vote>>,
    /// Sorted global source indices that predicted this label.
    pub sources: Vec<usize>,
}

impl LabelDomain {
    /// Per global source: (votes disagreeing with `truth`, total votes).
    pub fn disagreements(&self, truth: &[bool], source_count: usize) -> (Vec<u32>, Vec<u32>) {
        let mut wrong = vec![0u32; source_count];
        let mut total = vec![0u32; source_count];
        for (votes, &holds) in self.votes.iter().zip(truth) {
            for vote in votes {
                total[vote.source] += 1;
                if vote.positive != holds {
                    wrong[vote.source] += 1;
                }
            }
        }
        (wrong, total)
    }

    /// Hard majority per instance; ties are negative.
    pub fn majority(&self) -> Vec<bool> {
        self.votes
            .iter()
            .map(|votes| {
                let positive = votes.iter().filter(|v| v.positive).count();
                2 * positive > votes.len()
            })
            .collect()
    }

    /// Sum of log-likelihood ratios of the votes for "label holds".
    pub fn vote_log_odds(&self, instance: usize, error_rate: impl Fn(usize) -> f64) -> f64 {
        self.votes[instance]
            .iter()
            .map(|vote| {
                let e = super::sampling::clamp_probability(error_rate(vote.source));
                let ratio = ((1.0 - e) / e).ln();
                if vote.positive {
                    ratio
                } else {
                    -ratio
                }
            })
            .sum()
    }
}

/// Predictions of one request, grouped by label.
#[derive(Clone, Debug)]
pub(crate) struct Dataset {
    /// Sorted source ids; the global source index points here.
    pub sources: Vec<i64>,
    /// Labels in sorted order.
    pub labels: Vec<LabelDomain>,
}

impl Dataset {
    pub fn from_predictions(predicted: &[PredictedInstance]) -> Self {
        let sources: Vec<i64> = predicted
            .iter()
            .map(|p| p.source_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let source_index: BTreeMap<i64, usize> =
            sources.iter().enumerate().map(|(i, &s)| (s, i)).collect();

        let mut grouped: BTreeMap<&Label, BTreeMap<i64, Vec<Vote>>> = BTreeMap::new();
        for prediction in predicted {
            grouped
                .entry(&prediction.label)
                .or_default()
                .entry(prediction.id)
                .or_default()
                .push(Vote {
                    source: source_index[&prediction.source_id],
                    positive: prediction.is_positive(),
                });
        }

        let labels = grouped
            .into_iter()
            .map(|(label, by_instance)| {
                let mut instances = Vec::with_capacity(by_instance.len());
                let mut votes = Vec::with_capacity(by_instance.len());
                let mut label_sources = BTreeSet::new();
                for (id, mut instance_votes) in by_instance {
                    instance_votes.sort_by_key(|v| v.source);
                    label_sources.extend(instance_votes.iter().map(|v| v.source));
                    instances.push(id);
                    votes.push(instance_votes);
                }
                LabelDomain {
                    label: label.clone(),
                    instances,
                    votes,
                    sources: label_sources.into_iter().collect(),
                }
            })
            .collect();

        Self { sources, labels }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn label_index(&self, label: &Label) -> Option<usize> {
        self.labels
            .binary_search_by(|domain| domain.label.cmp(label))
            .ok()
    }

    /// Converts per-label estimates into the public result shape.
    ///
    /// `estimates.error_rates[l]` is indexed by global source and read only
    /// for sources that predicted label `l`.
    pub fn to_result(&self, estimates: &Estimates, integrate_labels: bool) -> IntegrationResult {
        let mut error_rates = Vec::new();
        for (domain, rates) in self.labels.iter().zip(&estimates.error_rates) {
            for &source in &domain.sources {
                error_rates.push(ErrorRate::new(
                    domain.label.clone(),
                    self.sources[source],
                    rates[source],
                ));
            }
        }

        let integrated_labels = integrate_labels.then(|| {
            self.labels
                .iter()
                .zip(&estimates.soft_labels)
                .flat_map(|(domain, soft)| {
                    domain
                        .instances
                        .iter()
                        .zip(soft)
                        .map(|(&id, &p)| IntegratedLabel::new(id, domain.label.clone(), p))
                })
                .collect()
        });

        IntegrationResult::new(error_rates, integrated_labels)
    }
}

/// Raw integrator output, aligned with a [`Dataset`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Estimates {
    /// Per label, per global source.
    pub error_rates: Vec<Vec<f64>>,
    /// Per label, per instance of that label.
    pub soft_labels: Vec<Vec<f64>>,
}

impl Estimates {
    pub fn push(&mut self, error_rates: Vec<f64>, soft_labels: Vec<f64>) {
        self.error_rates.push(error_rates);
        self.soft_labels.push(soft_labels);
    }
}
