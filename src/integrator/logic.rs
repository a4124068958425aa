//! Constraint-driven logic integration.
//!
//! Labels linked by constraints are inferred jointly. For every instance the
//! joint assignments of a constraint component are searched; observed labels
//! are clamped, and only the assignments with the fewest violated constraints
//! are kept (after validation that is always zero, so the kept set is exactly
//! the feasible set). Each kept assignment is weighted by the same vote
//! likelihood the Bayesian model uses, and soft labels are the resulting
//! marginals. Error rates and label priors are re-estimated from those
//! marginals by expectation-maximization until they settle.
//!
//! Components of up to [`MAX_COMPONENT_LABELS`] labels are enumerated. A
//! component spanned by one mutual exclusion has only `width + 1` feasible
//! assignments and is searched exactly at any width. Other wider components
//! are searched coordinate-wise: each free label in turn takes the value with
//! fewer violations, then the higher likelihood, until nothing changes.
//!
//! Thresholding exact marginals at 0.5 never yields an infeasible hard
//! assignment: two mutually exclusive labels cannot both exceed 0.5, and a
//! child's marginal never exceeds its parent's.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use super::domain::{Dataset, Estimates, Vote};
use super::majority;
use super::sampling::clamp_probability;
use super::CancellationToken;
use crate::constraint::{Constraint, ConstraintSet};
use crate::data::{Label, ObservedInstance};
use crate::error::LabelFuseError;

/// Largest number of labels enumerated exhaustively.
pub const MAX_COMPONENT_LABELS: usize = 20;

const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-6;
/// Error-rate prior Beta(1, 2), used for the MAP update.
const ERROR_PRIOR_ALPHA: f64 = 1.0;
const ERROR_PRIOR_BETA: f64 = 2.0;
/// Cap on coordinate-wise passes per instance.
const MAX_SWEEPS: usize = 100;

/// How the assignments of a component are searched.
#[derive(Debug)]
enum Search {
    /// Every assignment mask, with its violated-constraint count.
    Exhaustive { violations: Vec<u32> },
    /// One mutual exclusion spans the component: no label holds, or exactly one.
    AtMostOne,
    /// Coordinate-wise descent from the independent per-label decision.
    CoordinateWise,
}

/// Labels inferred jointly, with the instances that mention any of them.
struct Component<'a> {
    labels: Vec<Label>,
    position: BTreeMap<Label, usize>,
    /// Dataset label index per position, `None` for constraint-only labels.
    domains: Vec<Option<usize>>,
    instances: Vec<i64>,
    /// Votes per instance and position.
    votes: Vec<Vec<&'a [Vote]>>,
    /// Observed (position, value) pairs per instance.
    clamps: Vec<Vec<(usize, bool)>>,
    /// Constraints mentioning the component's labels.
    constraints: Vec<Constraint>,
    /// Indices into `constraints` per position.
    touching: Vec<Vec<usize>>,
    search: Search,
}

fn build_components<'a>(
    dataset: &'a Dataset,
    constraints: Option<&ConstraintSet>,
    observed: &[ObservedInstance],
) -> Vec<Component<'a>> {
    let mut groups: Vec<Vec<Label>> = constraints.map(|c| c.components()).unwrap_or_default();
    let constrained: BTreeSet<&Label> = groups.iter().flatten().collect();
    let singles: Vec<Vec<Label>> = dataset
        .labels
        .iter()
        .filter(|d| !constrained.contains(&d.label))
        .map(|d| vec![d.label.clone()])
        .collect();
    groups.extend(singles);

    let observed: HashMap<(i64, &Label), bool> = observed
        .iter()
        .map(|o| ((o.id, &o.label), o.value))
        .collect();

    groups
        .into_iter()
        .map(|labels| {
            let position: BTreeMap<Label, usize> =
                labels.iter().cloned().enumerate().map(|(i, l)| (l, i)).collect();
            let domains: Vec<Option<usize>> =
                labels.iter().map(|l| dataset.label_index(l)).collect();

            let mut by_instance: BTreeMap<i64, Vec<&'a [Vote]>> = BTreeMap::new();
            for (p, domain) in domains.iter().enumerate() {
                let Some(d) = domain else { continue };
                let domain = &dataset.labels[*d];
                for (id, votes) in domain.instances.iter().zip(&domain.votes) {
                    by_instance
                        .entry(*id)
                        .or_insert_with(|| vec![&[][..]; labels.len()])[p] = votes.as_slice();
                }
            }
            let (instances, votes): (Vec<i64>, Vec<Vec<&[Vote]>>) =
                by_instance.into_iter().unzip();

            let clamps = instances
                .iter()
                .map(|&id| {
                    labels
                        .iter()
                        .enumerate()
                        .filter_map(|(p, label)| observed.get(&(id, label)).map(|&v| (p, v)))
                        .collect()
                })
                .collect();

            let relevant: Vec<Constraint> = constraints
                .into_iter()
                .flat_map(|c| c.iter())
                .filter(|c| c.labels().any(|l| position.contains_key(l)))
                .cloned()
                .collect();
            let mut touching = vec![Vec::new(); labels.len()];
            for (c, constraint) in relevant.iter().enumerate() {
                for label in constraint.labels() {
                    if let Some(&p) = position.get(label) {
                        touching[p].push(c);
                    }
                }
            }

            let mut component = Component {
                labels,
                position,
                domains,
                instances,
                votes,
                clamps,
                constraints: relevant,
                touching,
                search: Search::CoordinateWise,
            };
            component.search = component.choose_search();
            component
        })
        .collect()
}

/// Current parameters: per dataset label, prior and per-source error rates.
struct Parameters {
    priors: Vec<f64>,
    error_rates: Vec<Vec<f64>>,
}

impl Component<'_> {
    fn choose_search(&self) -> Search {
        let width = self.labels.len();
        let spanned_by_exclusion = !self.constraints.is_empty()
            && self
                .constraints
                .iter()
                .all(|c| matches!(c, Constraint::MutualExclusion { .. }))
            && self.constraints.iter().any(|c| c.labels().count() == width);
        if spanned_by_exclusion {
            debug!(labels = width, first = %self.labels[0], "searching at-most-one assignments");
            Search::AtMostOne
        } else if width <= MAX_COMPONENT_LABELS {
            Search::Exhaustive {
                violations: self.violation_table(),
            }
        } else {
            warn!(
                labels = width,
                first = %self.labels[0],
                limit = MAX_COMPONENT_LABELS,
                "constraint component too wide to enumerate, searching coordinate-wise"
            );
            Search::CoordinateWise
        }
    }

    /// Violated-constraint count per assignment mask.
    fn violation_table(&self) -> Vec<u32> {
        (0..1u32 << self.labels.len())
            .map(|mask| {
                let holds = |label: &Label| {
                    self.position
                        .get(label)
                        .is_some_and(|&p| mask & (1 << p) != 0)
                };
                self.constraints.iter().filter(|c| c.is_violated_by(holds)).count() as u32
            })
            .collect()
    }

    /// Log-weight of each label being (true, false) for instance `i`.
    fn evidence(&self, i: usize, params: &Parameters, constraint_only_prior: f64) -> Vec<(f64, f64)> {
        (0..self.labels.len())
            .map(|p| {
                let (prior, rates) = match self.domains[p] {
                    Some(d) => (params.priors[d], Some(&params.error_rates[d])),
                    None => (constraint_only_prior, None),
                };
                let prior = clamp_probability(prior);
                let (mut t, mut f) = (prior.ln(), (1.0 - prior).ln());
                if let Some(rates) = rates {
                    for vote in self.votes[i][p] {
                        let e = clamp_probability(rates[vote.source]);
                        if vote.positive {
                            t += (1.0 - e).ln();
                            f += e.ln();
                        } else {
                            t += e.ln();
                            f += (1.0 - e).ln();
                        }
                    }
                }
                (t, f)
            })
            .collect()
    }

    /// Marginal probability of each label per instance.
    fn marginals(&self, params: &Parameters, constraint_only_prior: f64) -> Vec<Vec<f64>> {
        (0..self.instances.len())
            .map(|i| {
                let evidence = self.evidence(i, params, constraint_only_prior);
                match &self.search {
                    Search::Exhaustive { violations } => self.exhaustive(i, &evidence, violations),
                    Search::AtMostOne => self
                        .at_most_one(i, &evidence)
                        .unwrap_or_else(|| self.coordinate_wise(i, &evidence)),
                    Search::CoordinateWise => self.coordinate_wise(i, &evidence),
                }
            })
            .collect()
    }

    fn exhaustive(&self, i: usize, evidence: &[(f64, f64)], violations: &[u32]) -> Vec<f64> {
        let width = self.labels.len();
        let (clamp_mask, clamp_values) =
            self.clamps[i]
                .iter()
                .fold((0u32, 0u32), |(mask, values), &(p, value)| {
                    (mask | 1 << p, values | u32::from(value) << p)
                });
        let allowed = (0..1u32 << width).filter(|m| m & clamp_mask == clamp_values);
        let fewest = allowed
            .clone()
            .map(|m| violations[m as usize])
            .min()
            .unwrap_or(0);

        let scored: Vec<(u32, f64)> = allowed
            .filter(|&m| violations[m as usize] == fewest)
            .map(|m| {
                let score = evidence
                    .iter()
                    .enumerate()
                    .map(|(p, &(t, f))| if m & (1 << p) != 0 { t } else { f })
                    .sum::<f64>();
                (m, score)
            })
            .collect();
        let max = scored
            .iter()
            .map(|&(_, s)| s)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut marginal = vec![0.0; width];
        let mut total = 0.0;
        for &(m, s) in &scored {
            let w = (s - max).exp();
            total += w;
            for (p, value) in marginal.iter_mut().enumerate() {
                if m & (1 << p) != 0 {
                    *value += w;
                }
            }
        }
        if total > 0.0 {
            for value in marginal.iter_mut() {
                *value /= total;
            }
        }
        marginal
    }

    /// Exact marginals when at most one label may hold. `None` when the
    /// observations leave no such assignment.
    fn at_most_one(&self, i: usize, evidence: &[(f64, f64)]) -> Option<Vec<f64>> {
        let width = self.labels.len();
        let mut observed_true = None;
        let mut observed_false = vec![false; width];
        for &(p, value) in &self.clamps[i] {
            if !value {
                observed_false[p] = true;
            } else if observed_true.replace(p).is_some() {
                return None;
            }
        }
        if let Some(p) = observed_true {
            let mut marginal = vec![0.0; width];
            marginal[p] = 1.0;
            return Some(marginal);
        }

        // Score of "nothing holds", and of "only p holds" for each p.
        let none: f64 = evidence.iter().map(|&(_, f)| f).sum();
        let single: Vec<Option<f64>> = evidence
            .iter()
            .zip(&observed_false)
            .map(|(&(t, f), &excluded)| (!excluded).then_some(none - f + t))
            .collect();
        let max = single.iter().flatten().fold(none, |a, &b| a.max(b));
        let weights: Vec<f64> = single
            .iter()
            .map(|s| s.map_or(0.0, |s| (s - max).exp()))
            .collect();
        let total = (none - max).exp() + weights.iter().sum::<f64>();
        Some(weights.into_iter().map(|w| w / total).collect())
    }

    /// Local search for wide components. Free labels are visited least
    /// confident first; each takes the value that violates fewer constraints,
    /// breaking ties by likelihood. Soft labels are each label's conditional
    /// given the others at the final assignment.
    fn coordinate_wise(&self, i: usize, evidence: &[(f64, f64)]) -> Vec<f64> {
        let width = self.labels.len();
        let mut fixed = vec![None; width];
        for &(p, value) in &self.clamps[i] {
            fixed[p] = Some(value);
        }
        let mut assignment: Vec<bool> = (0..width)
            .map(|p| fixed[p].unwrap_or(evidence[p].0 > evidence[p].1))
            .collect();

        let mut order: Vec<usize> = (0..width).filter(|&p| fixed[p].is_none()).collect();
        order.sort_by(|&a, &b| {
            let margin = |p: usize| (evidence[p].0 - evidence[p].1).abs();
            margin(a).total_cmp(&margin(b)).then(a.cmp(&b))
        });

        for _ in 0..MAX_SWEEPS {
            let mut changed = false;
            for &p in &order {
                let preferred = self.conditional(p, &assignment, evidence[p]) > 0.5;
                if preferred != assignment[p] {
                    assignment[p] = preferred;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        (0..width)
            .map(|p| match fixed[p] {
                Some(value) => f64::from(u8::from(value)),
                None => self.conditional(p, &assignment, evidence[p]),
            })
            .collect()
    }

    /// Probability that label `p` holds with every other label as assigned.
    fn conditional(&self, p: usize, assignment: &[bool], (t, f): (f64, f64)) -> f64 {
        match self
            .violations_with(p, true, assignment)
            .cmp(&self.violations_with(p, false, assignment))
        {
            Ordering::Less => 1.0,
            Ordering::Greater => 0.0,
            Ordering::Equal => 1.0 / (1.0 + (f - t).exp()),
        }
    }

    fn violations_with(&self, p: usize, value: bool, assignment: &[bool]) -> usize {
        let holds = |label: &Label| {
            self.position
                .get(label)
                .is_some_and(|&q| if q == p { value } else { assignment[q] })
        };
        self.touching[p]
            .iter()
            .filter(|&&c| self.constraints[c].is_violated_by(holds))
            .count()
    }
}

pub(crate) fn integrate(
    dataset: &Dataset,
    constraints: Option<&ConstraintSet>,
    observed: &[ObservedInstance],
    cancel: &CancellationToken,
) -> Result<Estimates, LabelFuseError> {
    let components = build_components(dataset, constraints, observed);
    let sources = dataset.source_count();

    let mut params = Parameters {
        priors: vec![0.5; dataset.labels.len()],
        error_rates: dataset
            .labels
            .iter()
            .map(|domain| {
                majority::integrate_label(domain, sources)
                    .0
                    .into_iter()
                    .map(|e| e.clamp(0.01, 0.49))
                    .collect()
            })
            .collect(),
    };

    // Soft labels per dataset label, aligned with `LabelDomain::instances`.
    let mut soft: Vec<Vec<f64>> = dataset
        .labels
        .iter()
        .map(|d| vec![0.5; d.instances.len()])
        .collect();

    for iteration in 0..MAX_ITERATIONS {
        cancel.check()?;

        let mut wrong = vec![vec![0.0; sources]; dataset.labels.len()];
        let mut total = vec![vec![0.0; sources]; dataset.labels.len()];
        let mut positive_mass = vec![0.0; dataset.labels.len()];
        let mut instance_count = vec![0usize; dataset.labels.len()];

        for component in &components {
            let marginals = component.marginals(&params, 0.5);
            for (i, marginal) in marginals.iter().enumerate() {
                for (p, &q) in marginal.iter().enumerate() {
                    let Some(d) = component.domains[p] else { continue };
                    positive_mass[d] += q;
                    instance_count[d] += 1;
                    for vote in component.votes[i][p] {
                        total[d][vote.source] += 1.0;
                        wrong[d][vote.source] += if vote.positive { 1.0 - q } else { q };
                    }
                    if !component.votes[i][p].is_empty() {
                        let domain = &dataset.labels[d];
                        if let Ok(index) = domain.instances.binary_search(&component.instances[i]) {
                            soft[d][index] = q;
                        }
                    }
                }
            }
        }

        let mut largest_change: f64 = 0.0;
        for (d, domain) in dataset.labels.iter().enumerate() {
            for &s in &domain.sources {
                let updated = clamp_probability(
                    (wrong[d][s] + ERROR_PRIOR_ALPHA - 1.0)
                        / (total[d][s] + ERROR_PRIOR_ALPHA + ERROR_PRIOR_BETA - 2.0),
                );
                largest_change = largest_change.max((updated - params.error_rates[d][s]).abs());
                params.error_rates[d][s] = updated;
            }
            params.priors[d] = (positive_mass[d] + 1.0) / (instance_count[d] as f64 + 2.0);
        }

        if largest_change < TOLERANCE {
            debug!(iteration, "logic integration converged");
            break;
        }
    }

    let mut estimates = Estimates::default();
    for (error_rates, soft) in params.error_rates.into_iter().zip(soft) {
        estimates.push(error_rates, soft);
    }
    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::from_constraints_str;
    use crate::data::{hard_label, PredictedInstance};

    fn run(
        predicted: &[PredictedInstance],
        constraints: &str,
        observed: &[ObservedInstance],
    ) -> (Dataset, Estimates) {
        let dataset = Dataset::from_predictions(predicted);
        let constraints = from_constraints_str(constraints).unwrap();
        let estimates =
            integrate(&dataset, Some(&constraints), observed, &CancellationToken::new()).unwrap();
        (dataset, estimates)
    }

    #[test]
    fn child_true_parent_false_is_repaired() {
        // Every source says c1 holds and parent does not.
        let predicted = vec![
            PredictedInstance::new(0, "c1", 0, 1.0),
            PredictedInstance::new(0, "c1", 1, 1.0),
            PredictedInstance::new(0, "parent", 0, 0.0),
        ];
        let (dataset, estimates) = run(&predicted, "parent -> c1,c2\n", &[]);
        let c1 = dataset.label_index(&Label::new("c1")).unwrap();
        let parent = dataset.label_index(&Label::new("parent")).unwrap();
        let c1_hard = hard_label(estimates.soft_labels[c1][0]);
        let parent_hard = hard_label(estimates.soft_labels[parent][0]);
        assert!(!(c1_hard && !parent_hard));
        assert!(estimates.soft_labels[parent][0] >= estimates.soft_labels[c1][0] - 1e-12);
    }

    #[test]
    fn mutually_exclusive_labels_never_both_hold() {
        let mut predicted = Vec::new();
        for id in 0..10 {
            for source in 0..3 {
                predicted.push(PredictedInstance::new(id, "a", source, 1.0));
                predicted.push(PredictedInstance::new(id, "b", source, 1.0));
            }
        }
        let (_, estimates) = run(&predicted, "!a,b\n", &[]);
        for (a, b) in estimates.soft_labels[0].iter().zip(&estimates.soft_labels[1]) {
            assert!(a + b <= 1.0 + 1e-9);
            assert!(!(hard_label(*a) && hard_label(*b)));
        }
    }

    #[test]
    fn observations_are_clamped() {
        let predicted = vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "a", 1, 1.0),
            PredictedInstance::new(1, "a", 0, 1.0),
        ];
        let observed = vec![ObservedInstance::new(0, "a", false)];
        let (_, estimates) = run(&predicted, "", &observed);
        assert_eq!(estimates.soft_labels[0][0], 0.0);
    }

    #[test]
    fn deterministic_without_a_seed() {
        let predicted = vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "b", 1, 0.0),
            PredictedInstance::new(1, "a", 1, 0.0),
        ];
        let (_, first) = run(&predicted, "!a,b\n", &[]);
        let (_, second) = run(&predicted, "!a,b\n", &[]);
        assert_eq!(first.soft_labels, second.soft_labels);
        assert_eq!(first.error_rates, second.error_rates);
    }

    fn chain(width: usize) -> String {
        (1..width).map(|k| format!("l{} -> l{}\n", k - 1, k)).collect()
    }

    /// Instance `id` carries labels `l0..=l{id}`; source 2 also claims the
    /// next label down the chain.
    fn chain_predictions(width: usize, instances: i64) -> Vec<PredictedInstance> {
        let mut predicted = Vec::new();
        for id in 0..instances {
            for k in 0..width {
                for source in 0..3 {
                    let depth = if source == 2 { id + 1 } else { id };
                    let value = if k as i64 <= depth { 1.0 } else { 0.0 };
                    predicted.push(PredictedInstance::new(id, format!("l{k}"), source, value));
                }
            }
        }
        predicted
    }

    fn hard(dataset: &Dataset, estimates: &Estimates, label: &str, id: i64) -> bool {
        let d = dataset.label_index(&Label::new(label)).unwrap();
        let index = dataset.labels[d].instances.binary_search(&id).unwrap();
        hard_label(estimates.soft_labels[d][index])
    }

    #[test]
    fn component_at_the_enumeration_limit_is_exhaustive() {
        let predicted = chain_predictions(MAX_COMPONENT_LABELS, 1);
        let dataset = Dataset::from_predictions(&predicted);
        let constraints = from_constraints_str(&chain(MAX_COMPONENT_LABELS)).unwrap();
        let components = build_components(&dataset, Some(&constraints), &[]);
        assert_eq!(components.len(), 1);
        assert!(matches!(components[0].search, Search::Exhaustive { .. }));

        let wider = chain(MAX_COMPONENT_LABELS + 1);
        let constraints = from_constraints_str(&wider).unwrap();
        let components = build_components(&dataset, Some(&constraints), &[]);
        assert_eq!(components[0].labels.len(), MAX_COMPONENT_LABELS + 1);
        assert!(matches!(components[0].search, Search::CoordinateWise));
    }

    #[test]
    fn wide_mixed_component_keeps_hard_labels_feasible() {
        let width = MAX_COMPONENT_LABELS + 1;
        let predicted = chain_predictions(width, 6);
        let (dataset, estimates) = run(&predicted, &chain(width), &[]);
        for id in 0..6 {
            for k in 1..width {
                let child = hard(&dataset, &estimates, &format!("l{k}"), id);
                let parent = hard(&dataset, &estimates, &format!("l{}", k - 1), id);
                assert!(!child || parent, "instance {id}: l{k} holds without its parent");
            }
            assert!(hard(&dataset, &estimates, "l0", id));
        }
    }

    #[test]
    fn wide_exclusion_holds_at_most_one_label() {
        let width = MAX_COMPONENT_LABELS + 1;
        let labels: Vec<String> = (0..width).map(|k| format!("c{k}")).collect();
        let mut predicted = Vec::new();
        for id in 0..5i64 {
            for (k, label) in labels.iter().enumerate() {
                for source in 0..3i64 {
                    let claimed = k as i64 == id || k as i64 == (id + source) % width as i64;
                    let value = if claimed { 1.0 } else { 0.0 };
                    predicted.push(PredictedInstance::new(id, label.as_str(), source, value));
                }
            }
        }
        let (dataset, estimates) = run(&predicted, &format!("!{}\n", labels.join(",")), &[]);
        for id in 0..5 {
            let holding = labels
                .iter()
                .filter(|label| hard(&dataset, &estimates, label, id))
                .count();
            assert!(holding <= 1, "instance {id}: {holding} labels hold");
            let mass: f64 = labels
                .iter()
                .map(|label| {
                    let d = dataset.label_index(&Label::new(label.as_str())).unwrap();
                    estimates.soft_labels[d][id as usize]
                })
                .sum();
            assert!(mass <= 1.0 + 1e-9);
        }
        // Every source agrees on c{id}.
        assert!(hard(&dataset, &estimates, "c3", 3));
    }

    #[test]
    fn at_most_one_search_matches_enumeration() {
        let predicted = vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "b", 0, 1.0),
            PredictedInstance::new(0, "c", 1, 0.0),
            PredictedInstance::new(1, "a", 1, 1.0),
            PredictedInstance::new(1, "d", 0, 1.0),
        ];
        let observed = vec![ObservedInstance::new(1, "d", false)];
        let dataset = Dataset::from_predictions(&predicted);
        let constraints = from_constraints_str("!a,b,c,d\n").unwrap();
        let components = build_components(&dataset, Some(&constraints), &observed);
        let component = &components[0];
        assert!(matches!(component.search, Search::AtMostOne));

        let params = Parameters {
            priors: vec![0.3; dataset.labels.len()],
            error_rates: vec![vec![0.2; dataset.source_count()]; dataset.labels.len()],
        };
        let violations = component.violation_table();
        for i in 0..component.instances.len() {
            let evidence = component.evidence(i, &params, 0.5);
            let exact = component.exhaustive(i, &evidence, &violations);
            let linear = component.at_most_one(i, &evidence).unwrap();
            for (e, l) in exact.iter().zip(&linear) {
                assert!((e - l).abs() < 1e-12, "{exact:?} vs {linear:?}");
            }
        }
    }

    #[test]
    fn coordinate_search_agrees_with_enumeration_on_clear_evidence() {
        let predicted = chain_predictions(5, 4);
        let dataset = Dataset::from_predictions(&predicted);
        let constraints = from_constraints_str(&chain(5)).unwrap();
        let components = build_components(&dataset, Some(&constraints), &[]);
        let component = &components[0];
        let params = Parameters {
            priors: vec![0.5; dataset.labels.len()],
            error_rates: vec![vec![0.1, 0.1, 0.4]; dataset.labels.len()],
        };
        let violations = component.violation_table();
        for i in 0..component.instances.len() {
            let evidence = component.evidence(i, &params, 0.5);
            let exact: Vec<bool> = component
                .exhaustive(i, &evidence, &violations)
                .into_iter()
                .map(hard_label)
                .collect();
            let local: Vec<bool> = component
                .coordinate_wise(i, &evidence)
                .into_iter()
                .map(hard_label)
                .collect();
            assert_eq!(exact, local, "instance {i}");
        }
    }
}
