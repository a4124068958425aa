//! Strategies keep working past their exact-computation sizes.

use std::collections::BTreeMap;

use labelfuse::constraint::{Constraint, ConstraintSet};
use labelfuse::data::PredictedInstance;
use labelfuse::integrator::{IntegrationRequest, Integrator, MAX_COMPONENT_LABELS};

fn unanimous(instances: i64, sources: i64, label: &str) -> Vec<PredictedInstance> {
    let mut predicted = Vec::new();
    for id in 0..instances {
        for source in 0..sources {
            let value = if id % 2 == 0 { 1.0 } else { 0.0 };
            predicted.push(PredictedInstance::new(id, label, source, value));
        }
    }
    predicted
}

#[test]
fn agreement_defaults_handle_seventeen_and_eighteen_sources() {
    let integrator = Integrator::from_identity("AI").unwrap();
    for sources in [17, 18] {
        let request =
            IntegrationRequest::new(unanimous(10, sources, "a")).with_integrated_labels(true);
        let result = integrator.run(&request).unwrap();
        assert_eq!(result.error_rates.len(), sources as usize);
        let labels = result.integrated_labels.unwrap();
        assert!(labels.iter().all(|l| l.hard == (l.instance_id % 2 == 0)));
    }
}

#[test]
fn logic_handles_exclusions_at_and_past_the_enumeration_size() {
    for width in [MAX_COMPONENT_LABELS, MAX_COMPONENT_LABELS + 1] {
        let labels: Vec<String> = (0..width).map(|k| format!("c{k}")).collect();
        let mut predicted = Vec::new();
        for id in 0..5i64 {
            for (k, label) in labels.iter().enumerate() {
                for source in 0..3i64 {
                    let claimed = k as i64 == id || k as i64 == id + source + 5;
                    let value = if claimed { 1.0 } else { 0.0 };
                    predicted.push(PredictedInstance::new(id, label.as_str(), source, value));
                }
            }
        }
        let constraints: ConstraintSet =
            [Constraint::mutual_exclusion(labels.iter().map(String::as_str))]
                .into_iter()
                .collect();
        let request = IntegrationRequest::new(predicted)
            .with_constraints(constraints)
            .with_integrated_labels(true);
        let result = Integrator::Logic.run(&request).unwrap();

        let mut holding: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for label in result.integrated_labels.unwrap() {
            if label.hard {
                holding.entry(label.instance_id).or_default().push(label.label.to_string());
            }
        }
        for id in 0..5 {
            assert_eq!(
                holding.get(&id).cloned().unwrap_or_default(),
                vec![format!("c{id}")],
                "width {width}, instance {id}"
            );
        }
    }
}
