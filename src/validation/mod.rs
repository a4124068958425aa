//! Dataset validation.
//!
//! Checks the invariants every integrator relies on before any computation
//! starts:
//! - at most one prediction per (instance, label, source), values in `[0, 1]`
//! - observations refine predicted instances rather than introduce new ones
//! - error rates only mention sources that made predictions

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::{HashMap, HashSet};

use crate::data::{ErrorRate, Label, ObservedInstance, PredictedInstance};
use crate::error::LabelFuseError;

/// Validates predicted instances.
pub fn validate_predictions(predicted: &[PredictedInstance]) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mut seen: HashMap<(i64, &Label, i64), usize> = HashMap::new();

    for (index, instance) in predicted.iter().enumerate() {
        let context = IssueContext::Prediction { index };

        if let Some(first) = seen.insert((instance.id, &instance.label, instance.source_id), index) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicatePrediction,
                format!(
                    "Source {} predicts label '{}' for instance {} more than once (first at #{})",
                    instance.source_id, instance.label, instance.id, first
                ),
                context.clone(),
            ));
        }

        if !(0.0..=1.0).contains(&instance.value) {
            report.add(ValidationIssue::error(
                IssueCode::PredictionValueOutOfRange,
                format!("Prediction value {} is not in [0, 1]", instance.value),
                context.clone(),
            ));
        }

        if instance.label.name().is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyLabel,
                "Empty label name",
                context,
            ));
        }
    }

    report
}

/// Validates observed instances against the predictions they refine.
pub fn validate_observations(
    observed: &[ObservedInstance],
    predicted: &[PredictedInstance],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let predicted_ids: HashSet<i64> = predicted.iter().map(|p| p.id).collect();
    let mut seen: HashMap<(i64, &Label), (usize, bool)> = HashMap::new();

    for (index, instance) in observed.iter().enumerate() {
        let context = IssueContext::Observation { index };

        if !predicted_ids.contains(&instance.id) {
            report.add(ValidationIssue::error(
                IssueCode::UnknownObservedInstance,
                format!("Instance {} has no predictions", instance.id),
                context.clone(),
            ));
        }

        match seen.get(&(instance.id, &instance.label)) {
            Some((first, value)) if *value == instance.value => {
                report.add(ValidationIssue::warning(
                    IssueCode::DuplicateObservation,
                    format!(
                        "Label '{}' of instance {} is observed more than once (first at #{})",
                        instance.label, instance.id, first
                    ),
                    context.clone(),
                ));
            }
            Some((first, _)) => {
                report.add(ValidationIssue::error(
                    IssueCode::ConflictingObservation,
                    format!(
                        "Label '{}' of instance {} is observed with both values (first at #{})",
                        instance.label, instance.id, first
                    ),
                    context.clone(),
                ));
            }
            None => {
                seen.insert((instance.id, &instance.label), (index, instance.value));
            }
        }

        if instance.label.name().is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyLabel,
                "Empty label name",
                context,
            ));
        }
    }

    report
}

/// Validates error rates against the predictions of the same run.
pub fn validate_error_rates(
    error_rates: &[ErrorRate],
    predicted: &[PredictedInstance],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let sources: HashSet<i64> = predicted.iter().map(|p| p.source_id).collect();
    let mut seen: HashMap<(&Label, i64), usize> = HashMap::new();

    for (index, error_rate) in error_rates.iter().enumerate() {
        let context = IssueContext::ErrorRate { index };

        if let Some(first) = seen.insert((&error_rate.label, error_rate.source_id), index) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateErrorRate,
                format!(
                    "Error rate of source {} for label '{}' appears more than once (first at #{})",
                    error_rate.source_id, error_rate.label, first
                ),
                context.clone(),
            ));
        }

        if !(0.0..=1.0).contains(&error_rate.value) {
            report.add(ValidationIssue::error(
                IssueCode::ErrorRateOutOfRange,
                format!("Error rate {} is not in [0, 1]", error_rate.value),
                context.clone(),
            ));
        }

        if !sources.contains(&error_rate.source_id) {
            report.add(ValidationIssue::error(
                IssueCode::UnknownErrorRateSource,
                format!("Source {} made no predictions", error_rate.source_id),
                context,
            ));
        }
    }

    report
}

/// Turns a report with errors into [`LabelFuseError::ValidationFailed`].
pub fn ensure_valid(report: ValidationReport) -> Result<ValidationReport, LabelFuseError> {
    if report.is_ok() {
        Ok(report)
    } else {
        Err(LabelFuseError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_predictions_pass() {
        let predicted = vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "a", 1, 0.0),
            PredictedInstance::new(0, "b", 0, 0.5),
        ];
        assert!(validate_predictions(&predicted).is_clean());
    }

    #[test]
    fn duplicate_predictions_are_errors() {
        let predicted = vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "a", 0, 0.0),
        ];
        let report = validate_predictions(&predicted);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.issues[0].code, IssueCode::DuplicatePrediction);
    }

    #[test]
    fn out_of_range_and_nan_values_are_errors() {
        let predicted = vec![
            PredictedInstance::new(0, "a", 0, 1.5),
            PredictedInstance::new(1, "a", 0, f64::NAN),
        ];
        let report = validate_predictions(&predicted);
        assert_eq!(report.error_count(), 2);
        assert!(report
            .issues
            .iter()
            .all(|i| i.code == IssueCode::PredictionValueOutOfRange));
    }

    #[test]
    fn observations_must_refine_predictions() {
        let predicted = vec![PredictedInstance::new(0, "a", 0, 1.0)];
        let observed = vec![
            ObservedInstance::new(0, "a", true),
            ObservedInstance::new(9, "a", true),
            ObservedInstance::new(0, "a", false),
        ];
        let report = validate_observations(&observed, &predicted);
        let codes: Vec<_> = report.issues.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![IssueCode::UnknownObservedInstance, IssueCode::ConflictingObservation]
        );
    }

    #[test]
    fn error_rates_must_reference_known_sources() {
        let predicted = vec![PredictedInstance::new(0, "a", 3, 1.0)];
        let error_rates = vec![ErrorRate::new("a", 3, 0.1), ErrorRate::new("a", 4, 0.1)];
        let report = validate_error_rates(&error_rates, &predicted);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.issues[0].code, IssueCode::UnknownErrorRateSource);
    }

    #[test]
    fn ensure_valid_keeps_warnings() {
        let predicted = vec![PredictedInstance::new(0, "", 0, 1.0)];
        let report = ensure_valid(validate_predictions(&predicted)).expect("warnings only");
        assert_eq!(report.warning_count(), 1);
    }
}
