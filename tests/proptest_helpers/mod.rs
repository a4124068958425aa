#![allow(dead_code)]

use labelfuse::constraint::{Constraint, ConstraintSet};
use labelfuse::data::{ErrorRate, Label, ObservedInstance, PredictedInstance};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Tolerance for values that went through CSV text.
pub const EPS_CSV: f64 = 1e-12;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_label() -> BoxedStrategy<Label> {
    "[a-z][a-z0-9_]{0,7}".prop_map(Label::new).boxed()
}

/// Labels with characters CSV has to quote.
pub fn arb_awkward_label() -> BoxedStrategy<Label> {
    prop_oneof![
        arb_label(),
        "[a-z]{1,4}[,\"][a-z]{1,4}".prop_map(Label::new),
        "[a-z]{1,4} [a-z]{1,4}".prop_map(Label::new),
    ]
    .boxed()
}

pub fn arb_predicted(max_len: usize) -> BoxedStrategy<Vec<PredictedInstance>> {
    prop::collection::vec(
        (any::<i64>(), arb_awkward_label(), -1i64..1000, 0.0f64..=1.0)
            .prop_map(|(id, label, source, value)| PredictedInstance::new(id, label, source, value)),
        0..max_len,
    )
    .boxed()
}

pub fn arb_observed(max_len: usize) -> BoxedStrategy<Vec<ObservedInstance>> {
    prop::collection::vec(
        (any::<i64>(), arb_awkward_label(), any::<bool>())
            .prop_map(|(id, label, value)| ObservedInstance::new(id, label, value)),
        0..max_len,
    )
    .boxed()
}

pub fn arb_error_rates(max_len: usize) -> BoxedStrategy<Vec<ErrorRate>> {
    prop::collection::vec(
        (arb_awkward_label(), 0i64..1000, 0.0f64..=1.0)
            .prop_map(|(label, source, value)| ErrorRate::new(label, source, value)),
        0..max_len,
    )
    .boxed()
}

pub fn arb_constraint() -> BoxedStrategy<Constraint> {
    prop_oneof![
        prop::collection::btree_set(arb_label(), 2..5).prop_map(Constraint::mutual_exclusion),
        (arb_label(), prop::collection::btree_set(arb_label(), 1..4))
            .prop_map(|(parent, children)| Constraint::subsumption(parent, children)),
    ]
    .boxed()
}

pub fn arb_constraint_set(max_len: usize) -> BoxedStrategy<ConstraintSet> {
    prop::collection::vec(arb_constraint(), 0..max_len)
        .prop_map(|constraints| constraints.into_iter().collect::<ConstraintSet>())
        .boxed()
}

pub fn assert_predicted_close(
    left: &[PredictedInstance],
    right: &[PredictedInstance],
    eps: f64,
) -> Result<(), String> {
    if left.len() != right.len() {
        return Err(format!("length {} != {}", left.len(), right.len()));
    }
    for (i, (a, b)) in left.iter().zip(right).enumerate() {
        if a.id != b.id || a.label != b.label || a.source_id != b.source_id {
            return Err(format!("record {}: {:?} != {:?}", i, a, b));
        }
        if (a.value - b.value).abs() > eps {
            return Err(format!("record {}: value {} != {}", i, a.value, b.value));
        }
    }
    Ok(())
}
