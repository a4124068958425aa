//! Agreement-rate integration.
//!
//! Estimates error rates from how often subsets of sources agree, without
//! sampling. Assuming sources err independently, the probability that every
//! source in subset `S` gives the same answer is
//!
//! ```text
//! a(S) = prod_{j in S} (1 - e_j) + prod_{j in S} e_j
//! ```
//!
//! The error rates are fitted to the observed agreement rates by projected
//! gradient descent on the squared residuals, with every rate kept below 0.5.
//! Integrated labels are votes weighted by source accuracy.
//!
//! When every order is requested and the subsets would exceed
//! [`MAX_SUBSETS_PER_LABEL`], the largest subset sizes are dropped until they
//! fit. An explicit highest order is never lowered.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{Dataset, Estimates, LabelDomain};
use crate::data::Label;
use crate::error::LabelFuseError;

/// Subsets evaluated per label.
pub const MAX_SUBSETS_PER_LABEL: u64 = 1 << 16;

const MIN_ERROR_RATE: f64 = 1e-3;
const MAX_ERROR_RATE: f64 = 0.499;
const LEARNING_RATE: f64 = 0.5;
const MAX_ITERATIONS: usize = 5000;
const TOLERANCE: f64 = 1e-10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementConfig {
    /// Largest subset size considered; `-1` means all sources.
    pub highest_order: i32,
    /// Only use subsets with an even number of sources.
    pub only_even_cardinality_subsets: bool,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            highest_order: -1,
            only_even_cardinality_subsets: true,
        }
    }
}

impl AgreementConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.highest_order == -1 || self.highest_order >= 2 {
            Ok(())
        } else {
            Err(format!(
                "highest order must be -1 or at least 2, got {}",
                self.highest_order
            ))
        }
    }

    fn subset_sizes(&self, sources: usize) -> Vec<usize> {
        let highest = match usize::try_from(self.highest_order) {
            Ok(order) => order.min(sources),
            Err(_) => sources,
        };
        (2..=highest)
            .filter(|size| !self.only_even_cardinality_subsets || size % 2 == 0)
            .collect()
    }
}

fn binomial(n: usize, k: usize) -> u64 {
    let k = k.min(n - k);
    let mut result: u64 = 1;
    for i in 0..k {
        result = result.saturating_mul((n - i) as u64) / (i as u64 + 1);
    }
    result
}

fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn extend(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            if n - i < k - current.len() {
                break;
            }
            current.push(i);
            extend(i + 1, n, k, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    extend(0, n, k, &mut Vec::with_capacity(k), &mut out);
    out
}

/// Observed agreement rate of one subset of (label-local) sources.
struct SubsetAgreement {
    members: Vec<usize>,
    rate: f64,
}

/// Subset sizes evaluated for `label` with `local_count` sources.
fn planned_sizes(
    label: &Label,
    local_count: usize,
    config: &AgreementConfig,
) -> Result<Vec<usize>, LabelFuseError> {
    let count = |sizes: &[usize]| {
        sizes
            .iter()
            .map(|&k| binomial(local_count, k))
            .fold(0, u64::saturating_add)
    };
    let mut sizes = config.subset_sizes(local_count);
    let requested = count(&sizes);

    if config.highest_order == -1 && requested > MAX_SUBSETS_PER_LABEL {
        while sizes.len() > 1 && count(&sizes) > MAX_SUBSETS_PER_LABEL {
            sizes.pop();
        }
        warn!(
            label = %label,
            sources = local_count,
            highest_order = sizes.last().copied().unwrap_or(0),
            requested,
            limit = MAX_SUBSETS_PER_LABEL,
            "too many source subsets for all orders, lowering the highest order"
        );
    }

    let total = count(&sizes);
    if total > MAX_SUBSETS_PER_LABEL {
        return Err(LabelFuseError::ComputationLimitExceeded(format!(
            "label '{}' needs {} source subsets (limit {}); lower the highest order",
            label, total, MAX_SUBSETS_PER_LABEL
        )));
    }
    Ok(sizes)
}

fn agreement_rates(
    domain: &LabelDomain,
    config: &AgreementConfig,
) -> Result<Vec<SubsetAgreement>, LabelFuseError> {
    let local_count = domain.sources.len();
    let sizes = planned_sizes(&domain.label, local_count, config)?;

    // Dense vote table: instance x local source.
    let table: Vec<Vec<Option<bool>>> = domain
        .votes
        .iter()
        .map(|votes| {
            let mut row = vec![None; local_count];
            for vote in votes {
                if let Ok(local) = domain.sources.binary_search(&vote.source) {
                    row[local] = Some(vote.positive);
                }
            }
            row
        })
        .collect();

    let mut rates = Vec::new();
    for &size in &sizes {
        for members in combinations(local_count, size) {
            let mut covered = 0usize;
            let mut agreeing = 0usize;
            for row in &table {
                let answers: Option<Vec<bool>> = members.iter().map(|&m| row[m]).collect();
                if let Some(answers) = answers {
                    covered += 1;
                    if answers.iter().all(|&a| a == answers[0]) {
                        agreeing += 1;
                    }
                }
            }
            if covered > 0 {
                rates.push(SubsetAgreement {
                    members,
                    rate: agreeing as f64 / covered as f64,
                });
            }
        }
    }
    Ok(rates)
}

fn predicted_agreement(members: &[usize], error_rates: &[f64], skip: Option<usize>) -> (f64, f64) {
    let mut correct = 1.0;
    let mut wrong = 1.0;
    for &m in members {
        if Some(m) == skip {
            continue;
        }
        correct *= 1.0 - error_rates[m];
        wrong *= error_rates[m];
    }
    (correct, wrong)
}

/// Fits label-local error rates to the observed agreement rates.
fn fit_error_rates(subsets: &[SubsetAgreement], initial: Vec<f64>) -> Vec<f64> {
    let mut error_rates = initial;
    if subsets.is_empty() {
        return error_rates;
    }
    let scale = 1.0 / subsets.len() as f64;

    for iteration in 0..MAX_ITERATIONS {
        let mut gradient = vec![0.0; error_rates.len()];
        for subset in subsets {
            let (correct, wrong) = predicted_agreement(&subset.members, &error_rates, None);
            let residual = correct + wrong - subset.rate;
            for &j in &subset.members {
                let (others_correct, others_wrong) =
                    predicted_agreement(&subset.members, &error_rates, Some(j));
                gradient[j] += 2.0 * residual * (others_wrong - others_correct) * scale;
            }
        }

        let mut largest_step: f64 = 0.0;
        for (e, g) in error_rates.iter_mut().zip(&gradient) {
            let updated = (*e - LEARNING_RATE * g).clamp(MIN_ERROR_RATE, MAX_ERROR_RATE);
            largest_step = largest_step.max((updated - *e).abs());
            *e = updated;
        }
        if largest_step < TOLERANCE {
            debug!(iteration, "agreement fit converged");
            break;
        }
    }
    error_rates
}

pub(crate) fn integrate(dataset: &Dataset, config: &AgreementConfig) -> Result<Estimates, LabelFuseError> {
    let mut estimates = Estimates::default();
    for domain in &dataset.labels {
        let subsets = agreement_rates(domain, config)?;

        let (majority_errors, _) = super::majority::integrate_label(domain, dataset.source_count());
        let initial: Vec<f64> = domain
            .sources
            .iter()
            .map(|&s| majority_errors[s].clamp(0.01, 0.49))
            .collect();
        let local = fit_error_rates(&subsets, initial);

        let mut error_rates = vec![0.0; dataset.source_count()];
        for (&source, &e) in domain.sources.iter().zip(&local) {
            error_rates[source] = e;
        }

        let soft = domain
            .votes
            .iter()
            .map(|votes| {
                let (mut positive, mut total) = (0.0, 0.0);
                for vote in votes {
                    let accuracy = 1.0 - error_rates[vote.source];
                    total += accuracy;
                    if vote.positive {
                        positive += accuracy;
                    }
                }
                positive / total
            })
            .collect();

        debug!(label = %domain.label, subsets = subsets.len(), "agreement rates fitted");
        estimates.push(error_rates, soft);
    }
    Ok(estimates)
}
