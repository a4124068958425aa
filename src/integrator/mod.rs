//! Integration strategies.
//!
//! [`Integrator`] is a closed set of strategies sharing one contract:
//!
//! - [`Integrator::identity`]: short, stable code (`MVI`, `AI`, `BI`, `CBI`,
//!   `HCBI`, `LI`) used for logging and for the external engine's `-m` flag;
//! - [`Integrator::hyperparameters`]: tunables as strings in a fixed order,
//!   joined with `:` for the external engine's `-o` flag and parsed back by
//!   [`Integrator::from_options`];
//! - [`Integrator::run`]: the embedded engine.
//!
//! Stochastic strategies are reproducible from [`IntegrationRequest::seed`];
//! majority vote, agreement and logic are deterministic.

mod agreement;
mod bayesian;
mod coupled;
mod domain;
mod hierarchical;
mod logic;
mod majority;
pub(crate) mod sampling;

pub use agreement::{AgreementConfig, MAX_SUBSETS_PER_LABEL};
pub use bayesian::{
    SamplerConfig, DEFAULT_BURN_IN_SAMPLES, DEFAULT_SAMPLES, DEFAULT_THINNING_SAMPLES,
};
pub use coupled::CoupledConfig;
pub use hierarchical::HierarchicalConfig;
pub use logic::MAX_COMPONENT_LABELS;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::constraint::ConstraintSet;
use crate::data::{IntegrationResult, Label, ObservedInstance, PredictedInstance};
use crate::error::LabelFuseError;
use crate::validation;

use domain::Dataset;

/// Separator of the option string accepted by [`Integrator::from_options`].
pub const OPTION_SEPARATOR: char = ':';

/// Placeholder keeping the default value of an option slot.
pub const DEFAULT_OPTION: &str = "-";

// ============================================================================
// Strategies
// ============================================================================

/// A label-integration strategy and its hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum Integrator {
    /// Plurality vote.
    MajorityVote,
    /// Error rates fitted to agreement rates of source subsets.
    Agreement(AgreementConfig),
    /// Independent per-label Gibbs sampling.
    Bayesian(SamplerConfig),
    /// Labels clustered so that they share source error rates.
    CoupledBayesian(CoupledConfig),
    /// Source and label-hierarchy coupling.
    HierarchicalCoupledBayesian(HierarchicalConfig),
    /// Constraints as hard evidence.
    Logic,
}

impl Integrator {
    /// Every strategy with default hyperparameters, in identity order.
    pub fn all() -> Vec<Integrator> {
        vec![
            Integrator::MajorityVote,
            Integrator::Agreement(AgreementConfig::default()),
            Integrator::Bayesian(SamplerConfig::default()),
            Integrator::CoupledBayesian(CoupledConfig::default()),
            Integrator::HierarchicalCoupledBayesian(HierarchicalConfig::default()),
            Integrator::Logic,
        ]
    }

    /// Stable short code.
    pub fn identity(&self) -> &'static str {
        match self {
            Integrator::MajorityVote => "MVI",
            Integrator::Agreement(_) => "AI",
            Integrator::Bayesian(_) => "BI",
            Integrator::CoupledBayesian(_) => "CBI",
            Integrator::HierarchicalCoupledBayesian(_) => "HCBI",
            Integrator::Logic => "LI",
        }
    }

    /// Human-readable name, also accepted by [`Integrator::from_identity`].
    pub fn name(&self) -> &'static str {
        match self {
            Integrator::MajorityVote => "majority-vote",
            Integrator::Agreement(_) => "agreement",
            Integrator::Bayesian(_) => "bayesian",
            Integrator::CoupledBayesian(_) => "coupled-bayesian",
            Integrator::HierarchicalCoupledBayesian(_) => "hierarchical-coupled-bayesian",
            Integrator::Logic => "logic",
        }
    }

    /// Default-configured strategy for a short code or long name.
    pub fn from_identity(identity: &str) -> Result<Self, LabelFuseError> {
        Integrator::all()
            .into_iter()
            .find(|i| i.identity() == identity || i.name() == identity)
            .ok_or_else(|| LabelFuseError::UnknownStrategy(identity.to_string()))
    }

    /// Hyperparameters as strings, in the order [`Integrator::from_options`] reads them.
    ///
    /// - agreement: highest order, even-cardinality flag (`1`/`0`)
    /// - bayesian: burn-in, thinning, samples, labels prior alpha/beta,
    ///   error rates prior alpha/beta
    /// - coupled: as bayesian, with alpha after samples
    /// - hierarchical: as bayesian, with alpha and gamma after samples
    pub fn hyperparameters(&self) -> Vec<String> {
        match self {
            Integrator::MajorityVote | Integrator::Logic => Vec::new(),
            Integrator::Agreement(config) => vec![
                config.highest_order.to_string(),
                if config.only_even_cardinality_subsets { "1" } else { "0" }.to_string(),
            ],
            Integrator::Bayesian(sampler) => sampler_options(sampler, &[]),
            Integrator::CoupledBayesian(config) => {
                sampler_options(&config.sampler, &[config.alpha])
            }
            Integrator::HierarchicalCoupledBayesian(config) => {
                sampler_options(&config.sampler, &[config.alpha, config.gamma])
            }
        }
    }

    /// Parses a strategy from its identity and a `:`-separated option string.
    ///
    /// Missing trailing slots and slots holding `-` keep their defaults.
    pub fn from_options(identity: &str, options: Option<&str>) -> Result<Self, LabelFuseError> {
        let mut integrator = Integrator::from_identity(identity)?;
        let slots: Vec<&str> = match options {
            Some(options) if !options.is_empty() => options.split(OPTION_SEPARATOR).collect(),
            _ => Vec::new(),
        };
        let expected = integrator.hyperparameters().len();
        if slots.len() > expected {
            return Err(integrator.invalid(format!(
                "expected at most {} option(s), got {}",
                expected,
                slots.len()
            )));
        }

        let mut reader = OptionReader {
            slots: &slots,
            next: 0,
            strategy: integrator.identity(),
        };
        match &mut integrator {
            Integrator::MajorityVote | Integrator::Logic => {}
            Integrator::Agreement(config) => {
                reader.read(&mut config.highest_order)?;
                if let Some(flag) = reader.take() {
                    config.only_even_cardinality_subsets = match flag {
                        "1" | "true" => true,
                        "0" | "false" => false,
                        other => {
                            return Err(LabelFuseError::InvalidHyperparameters {
                                strategy: "AI".to_string(),
                                message: format!("'{}' is not a boolean flag", other),
                            })
                        }
                    };
                }
            }
            Integrator::Bayesian(sampler) => reader.read_sampler(sampler, &mut [])?,
            Integrator::CoupledBayesian(config) => {
                reader.read_sampler(&mut config.sampler, &mut [&mut config.alpha])?
            }
            Integrator::HierarchicalCoupledBayesian(config) => reader.read_sampler(
                &mut config.sampler,
                &mut [&mut config.alpha, &mut config.gamma],
            )?,
        }

        integrator.validate()?;
        Ok(integrator)
    }

    /// Checks hyperparameter ranges.
    pub fn validate(&self) -> Result<(), LabelFuseError> {
        let checked = match self {
            Integrator::MajorityVote | Integrator::Logic => Ok(()),
            Integrator::Agreement(config) => config.validate(),
            Integrator::Bayesian(sampler) => sampler.validate(),
            Integrator::CoupledBayesian(config) => config.validate(),
            Integrator::HierarchicalCoupledBayesian(config) => config.validate(),
        };
        checked.map_err(|message| self.invalid(message))
    }

    /// Whether results depend on the seed.
    pub fn is_stochastic(&self) -> bool {
        matches!(
            self,
            Integrator::Bayesian(_)
                | Integrator::CoupledBayesian(_)
                | Integrator::HierarchicalCoupledBayesian(_)
        )
    }

    /// Runs the embedded engine.
    pub fn run(&self, request: &IntegrationRequest) -> Result<IntegrationResult, LabelFuseError> {
        self.run_with_cancellation(request, &CancellationToken::new())
    }

    /// Runs the embedded engine, stopping between sweeps once `cancel` is set.
    pub fn run_with_cancellation(
        &self,
        request: &IntegrationRequest,
        cancel: &CancellationToken,
    ) -> Result<IntegrationResult, LabelFuseError> {
        let span = info_span!("run", strategy = self.identity());
        let _guard = span.enter();

        self.validate()?;
        request.check()?;

        if request.observed.is_some() && !matches!(self, Integrator::Logic) {
            debug!("observed instances are only used by logic integration; ignoring them");
        }

        let dataset = Dataset::from_predictions(&request.predicted);
        let seed = sampling::resolve_seed(request.seed);
        let estimates = match self {
            Integrator::MajorityVote => majority::integrate(&dataset),
            Integrator::Agreement(config) => agreement::integrate(&dataset, config)?,
            Integrator::Bayesian(sampler) => bayesian::integrate(&dataset, sampler, seed, cancel)?,
            Integrator::CoupledBayesian(config) => {
                coupled::integrate(&dataset, config, seed, cancel)?
            }
            Integrator::HierarchicalCoupledBayesian(config) => hierarchical::integrate(
                &dataset,
                config,
                request.constraints.as_ref(),
                seed,
                cancel,
            )?,
            Integrator::Logic => logic::integrate(
                &dataset,
                request.constraints.as_ref(),
                request.observed.as_deref().unwrap_or(&[]),
                cancel,
            )?,
        };

        debug!(
            labels = dataset.labels.len(),
            sources = dataset.source_count(),
            "integration finished"
        );
        Ok(dataset.to_result(&estimates, request.integrate_labels))
    }

    fn invalid(&self, message: impl Into<String>) -> LabelFuseError {
        LabelFuseError::InvalidHyperparameters {
            strategy: self.identity().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Integrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options = self.hyperparameters();
        if options.is_empty() {
            write!(f, "{}", self.identity())
        } else {
            write!(f, "{}[{}]", self.identity(), options.join(":"))
        }
    }
}

impl FromStr for Integrator {
    type Err = LabelFuseError;

    /// Parses `IDENTITY` or `IDENTITY:opt1:opt2...`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(OPTION_SEPARATOR) {
            Some((identity, options)) => Integrator::from_options(identity, Some(options)),
            None => Integrator::from_options(s, None),
        }
    }
}

/// Formats a float the way the option string carries it (`1.0`, `0.25`).
fn format_option(value: f64) -> String {
    format!("{:?}", value)
}

fn sampler_options(sampler: &SamplerConfig, coupling: &[f64]) -> Vec<String> {
    let mut options = vec![
        sampler.burn_in_samples.to_string(),
        sampler.thinning_samples.to_string(),
        sampler.samples.to_string(),
    ];
    options.extend(coupling.iter().map(|&v| format_option(v)));
    options.extend(
        [
            sampler.labels_prior_alpha,
            sampler.labels_prior_beta,
            sampler.error_rates_prior_alpha,
            sampler.error_rates_prior_beta,
        ]
        .into_iter()
        .map(format_option),
    );
    options
}

struct OptionReader<'a> {
    slots: &'a [&'a str],
    next: usize,
    strategy: &'static str,
}

impl<'a> OptionReader<'a> {
    /// Next slot, or `None` when it is missing or `-`.
    fn take(&mut self) -> Option<&'a str> {
        let slot = self.slots.get(self.next).copied();
        self.next += 1;
        slot.filter(|s| *s != DEFAULT_OPTION)
    }

    fn read<T: FromStr>(&mut self, target: &mut T) -> Result<(), LabelFuseError> {
        if let Some(raw) = self.take() {
            *target = raw
                .parse()
                .map_err(|_| LabelFuseError::InvalidHyperparameters {
                    strategy: self.strategy.to_string(),
                    message: format!("option {} ('{}') is not a valid value", self.next, raw),
                })?;
        }
        Ok(())
    }

    fn read_sampler(
        &mut self,
        sampler: &mut SamplerConfig,
        coupling: &mut [&mut f64],
    ) -> Result<(), LabelFuseError> {
        self.read(&mut sampler.burn_in_samples)?;
        self.read(&mut sampler.thinning_samples)?;
        self.read(&mut sampler.samples)?;
        for value in coupling.iter_mut() {
            self.read(&mut **value)?;
        }
        self.read(&mut sampler.labels_prior_alpha)?;
        self.read(&mut sampler.labels_prior_beta)?;
        self.read(&mut sampler.error_rates_prior_alpha)?;
        self.read(&mut sampler.error_rates_prior_beta)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Everything one integration run reads. Never mutated by a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrationRequest {
    pub predicted: Vec<PredictedInstance>,
    pub observed: Option<Vec<ObservedInstance>>,
    pub constraints: Option<ConstraintSet>,
    /// Produce integrated labels in addition to error rates.
    pub integrate_labels: bool,
    /// Seed for stochastic strategies; `None` draws one from entropy.
    pub seed: Option<u64>,
    /// Labels that must be covered by predictions.
    pub labels: Vec<Label>,
}

impl IntegrationRequest {
    pub fn new(predicted: Vec<PredictedInstance>) -> Self {
        Self {
            predicted,
            ..Self::default()
        }
    }

    pub fn with_observed(mut self, observed: Vec<ObservedInstance>) -> Self {
        self.observed = Some(observed);
        self
    }

    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn with_integrated_labels(mut self, integrate_labels: bool) -> Self {
        self.integrate_labels = integrate_labels;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    /// Validates the request before any computation starts.
    ///
    /// Order: record-level validation, constraint satisfiability, observed
    /// consistency with the constraints, then evidence coverage.
    pub fn check(&self) -> Result<validation::ValidationReport, LabelFuseError> {
        let mut report = validation::validate_predictions(&self.predicted);
        if let Some(observed) = &self.observed {
            report.merge(validation::validate_observations(observed, &self.predicted));
        }
        let report = validation::ensure_valid(report)?;

        if let Some(constraints) = &self.constraints {
            constraints.validate()?;
            if let Some(observed) = &self.observed {
                constraints.validate_observations(observed)?;
            }
        }

        self.check_evidence()?;
        Ok(report)
    }

    fn check_evidence(&self) -> Result<(), LabelFuseError> {
        if self.predicted.is_empty() {
            return Err(LabelFuseError::InsufficientEvidence(
                "no predicted instances".to_string(),
            ));
        }

        let predicted_labels: BTreeSet<&Label> = self.predicted.iter().map(|p| &p.label).collect();
        if let Some(missing) = self.labels.iter().find(|l| !predicted_labels.contains(l)) {
            return Err(LabelFuseError::InsufficientEvidence(format!(
                "no source predicts label '{}'",
                missing
            )));
        }

        if let Some(observed) = &self.observed {
            let pairs: HashSet<(i64, &Label)> =
                self.predicted.iter().map(|p| (p.id, &p.label)).collect();
            if let Some(o) = observed.iter().find(|o| !pairs.contains(&(o.id, &o.label))) {
                return Err(LabelFuseError::InsufficientEvidence(format!(
                    "label '{}' of instance {} is observed but never predicted",
                    o.label, o.id
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag polled by the engine between sweeps.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), LabelFuseError> {
        if self.is_cancelled() {
            Err(LabelFuseError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::from_constraints_str;
    use crate::data::ErrorRate;

    fn quick_bayesian() -> Integrator {
        Integrator::Bayesian(SamplerConfig {
            burn_in_samples: 50,
            thinning_samples: 1,
            samples: 50,
            ..SamplerConfig::default()
        })
    }

    #[test]
    fn identities_are_stable() {
        let identities: Vec<_> = Integrator::all().iter().map(|i| i.identity()).collect();
        assert_eq!(identities, vec!["MVI", "AI", "BI", "CBI", "HCBI", "LI"]);
    }

    #[test]
    fn default_hyperparameters_in_declared_order() {
        assert_eq!(
            Integrator::from_identity("BI").unwrap().hyperparameters(),
            vec!["4000", "10", "200", "1.0", "1.0", "1.0", "2.0"]
        );
        assert_eq!(
            Integrator::from_identity("HCBI").unwrap().hyperparameters(),
            vec!["4000", "10", "200", "1.0", "1.0", "1.0", "1.0", "1.0", "2.0"]
        );
        assert_eq!(
            Integrator::from_identity("agreement").unwrap().hyperparameters(),
            vec!["-1", "1"]
        );
        assert!(Integrator::MajorityVote.hyperparameters().is_empty());
    }

    #[test]
    fn options_round_trip() {
        for integrator in Integrator::all() {
            let options = integrator.hyperparameters().join(":");
            let parsed = Integrator::from_options(integrator.identity(), Some(&options)).unwrap();
            assert_eq!(parsed, integrator);
        }
    }

    #[test]
    fn dash_keeps_default_slot() {
        let parsed = Integrator::from_options("CBI", Some("-:-:50:0.5")).unwrap();
        match parsed {
            Integrator::CoupledBayesian(config) => {
                assert_eq!(config.sampler.burn_in_samples, DEFAULT_BURN_IN_SAMPLES);
                assert_eq!(config.sampler.samples, 50);
                assert_eq!(config.alpha, 0.5);
                assert_eq!(config.sampler.error_rates_prior_beta, 2.0);
            }
            other => panic!("unexpected strategy {other}"),
        }
    }

    #[test]
    fn rejects_unknown_strategy_and_bad_options() {
        assert!(matches!(
            Integrator::from_identity("XYZ"),
            Err(LabelFuseError::UnknownStrategy(_))
        ));
        assert!(matches!(
            Integrator::from_options("BI", Some("1:2:3:4:5:6:7:8")),
            Err(LabelFuseError::InvalidHyperparameters { .. })
        ));
        assert!(matches!(
            Integrator::from_options("BI", Some("abc")),
            Err(LabelFuseError::InvalidHyperparameters { .. })
        ));
        assert!(matches!(
            Integrator::from_options("AI", Some("1")),
            Err(LabelFuseError::InvalidHyperparameters { .. })
        ));
    }

    #[test]
    fn parses_compact_form() {
        let parsed: Integrator = "AI:3:0".parse().unwrap();
        assert_eq!(
            parsed,
            Integrator::Agreement(AgreementConfig {
                highest_order: 3,
                only_even_cardinality_subsets: false,
            })
        );
        assert_eq!(parsed.to_string(), "AI[3:0]");
    }

    #[test]
    fn majority_vote_split_decision() {
        let request = IntegrationRequest::new(vec![
            PredictedInstance::new(0, "l", 0, 1.0),
            PredictedInstance::new(0, "l", 1, 0.0),
        ])
        .with_integrated_labels(true);
        let result = Integrator::MajorityVote.run(&request).unwrap();
        let integrated = result.integrated_labels.unwrap();
        assert_eq!(integrated[0].soft, 0.5);
        assert!(!integrated[0].hard);
        assert_eq!(
            result.error_rates,
            vec![ErrorRate::new("l", 0, 1.0), ErrorRate::new("l", 1, 0.0)]
        );
    }

    #[test]
    fn majority_vote_is_repeatable() {
        let request = IntegrationRequest::new(vec![
            PredictedInstance::new(0, "l", 0, 0.9),
            PredictedInstance::new(0, "l", 1, 0.7),
            PredictedInstance::new(1, "l", 0, 0.1),
        ])
        .with_integrated_labels(true);
        let first = Integrator::MajorityVote.run(&request).unwrap();
        assert_eq!(first, Integrator::MajorityVote.run(&request).unwrap());
    }

    #[test]
    fn integrated_labels_only_when_requested() {
        let request = IntegrationRequest::new(vec![PredictedInstance::new(0, "l", 0, 1.0)]);
        let result = Integrator::MajorityVote.run(&request).unwrap();
        assert!(result.integrated_labels.is_none());
    }

    #[test]
    fn label_without_sources_is_insufficient_evidence() {
        let request = IntegrationRequest::new(vec![PredictedInstance::new(0, "a", 0, 1.0)])
            .with_labels([Label::new("a"), Label::new("b")]);
        for integrator in Integrator::all() {
            let err = integrator.run(&request).unwrap_err();
            assert!(
                matches!(err, LabelFuseError::InsufficientEvidence(_)),
                "{} returned {err}",
                integrator.identity()
            );
        }
    }

    #[test]
    fn empty_predictions_are_insufficient_evidence() {
        let err = Integrator::MajorityVote
            .run(&IntegrationRequest::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, LabelFuseError::InsufficientEvidence(_)));
    }

    #[test]
    fn unsatisfiable_constraints_abort_before_inference() {
        let request = IntegrationRequest::new(vec![PredictedInstance::new(0, "a", 0, 1.0)])
            .with_constraints(from_constraints_str("a -> b\n!a,b\n").unwrap());
        let err = quick_bayesian().run(&request).unwrap_err();
        assert!(matches!(err, LabelFuseError::UnsatisfiableConstraintSet(_)));
    }

    #[test]
    fn invalid_records_fail_validation() {
        let request = IntegrationRequest::new(vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "a", 0, 1.0),
        ]);
        let err = Integrator::MajorityVote.run(&request).unwrap_err();
        assert!(matches!(err, LabelFuseError::ValidationFailed { error_count: 1, .. }));
    }

    #[test]
    fn seeded_stochastic_runs_repeat() {
        let predicted: Vec<_> = (0..10)
            .flat_map(|id| {
                (0..3).map(move |source| {
                    PredictedInstance::new(id, "l", source, f64::from(u8::from(id % 2 == 0)))
                })
            })
            .collect();
        let request = IntegrationRequest::new(predicted)
            .with_integrated_labels(true)
            .with_seed(11);
        let integrator = quick_bayesian();
        assert_eq!(integrator.run(&request).unwrap(), integrator.run(&request).unwrap());
    }

    #[test]
    fn cancelled_token_stops_stochastic_runs() {
        let request = IntegrationRequest::new(vec![PredictedInstance::new(0, "a", 0, 1.0)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = quick_bayesian()
            .run_with_cancellation(&request, &cancel)
            .unwrap_err();
        assert!(matches!(err, LabelFuseError::Cancelled));
    }

    #[test]
    fn serde_uses_strategy_tag() {
        let json = serde_json::to_string(&Integrator::MajorityVote).unwrap();
        assert_eq!(json, r#"{"strategy":"majority-vote"}"#);
        let parsed: Integrator =
            serde_json::from_str(r#"{"strategy":"coupled-bayesian","alpha":2.0}"#).unwrap();
        match parsed {
            Integrator::CoupledBayesian(config) => {
                assert_eq!(config.alpha, 2.0);
                assert_eq!(config.sampler.samples, DEFAULT_SAMPLES);
            }
            other => panic!("unexpected strategy {other}"),
        }
    }
}
