//! Plurality vote.

use super::domain::{Dataset, Estimates, LabelDomain};

/// Soft label = fraction of positive votes; error rate = disagreement with
/// the thresholded soft label.
pub(crate) fn integrate(dataset: &Dataset) -> Estimates {
    let mut estimates = Estimates::default();
    for domain in &dataset.labels {
        let (error_rates, soft) = integrate_label(domain, dataset.source_count());
        estimates.push(error_rates, soft);
    }
    estimates
}

pub(crate) fn integrate_label(domain: &LabelDomain, source_count: usize) -> (Vec<f64>, Vec<f64>) {
    let soft: Vec<f64> = domain
        .votes
        .iter()
        .map(|votes| {
            let positive = votes.iter().filter(|v| v.positive).count();
            positive as f64 / votes.len() as f64
        })
        .collect();
    let hard: Vec<bool> = soft.iter().map(|&p| crate::data::hard_label(p)).collect();

    let (wrong, total) = domain.disagreements(&hard, source_count);
    let error_rates = wrong
        .iter()
        .zip(&total)
        .map(|(&w, &n)| if n == 0 { 0.0 } else { f64::from(w) / f64::from(n) })
        .collect();

    (error_rates, soft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PredictedInstance;

    #[test]
    fn split_vote_is_a_negative_hard_label() {
        let dataset = Dataset::from_predictions(&[
            PredictedInstance::new(0, "l", 0, 1.0),
            PredictedInstance::new(0, "l", 1, 0.0),
        ]);
        let estimates = integrate(&dataset);
        assert_eq!(estimates.soft_labels[0], vec![0.5]);
        // hard label is false, so the positive voter is the one in error
        assert_eq!(estimates.error_rates[0], vec![1.0, 0.0]);
    }

    #[test]
    fn error_rate_is_disagreement_with_majority() {
        let dataset = Dataset::from_predictions(&[
            PredictedInstance::new(0, "l", 0, 1.0),
            PredictedInstance::new(0, "l", 1, 1.0),
            PredictedInstance::new(0, "l", 2, 0.0),
            PredictedInstance::new(1, "l", 0, 0.0),
            PredictedInstance::new(1, "l", 1, 0.0),
            PredictedInstance::new(1, "l", 2, 0.0),
        ]);
        let estimates = integrate(&dataset);
        assert_eq!(estimates.error_rates[0], vec![0.0, 0.0, 0.5]);
        assert_eq!(estimates.soft_labels[0][1], 0.0);
    }
}
