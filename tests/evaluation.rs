use labelfuse::data::{ErrorRate, Label, ObservedInstance, PredictedInstance};
use labelfuse::evaluation::{
    evaluate, generate_synthetic, run_sweep, SweepConfig, SyntheticConfig, SyntheticDataset,
};
use labelfuse::integrator::{Integrator, SamplerConfig};
use labelfuse::transport::{InProcessBridge, InProcessConfig, TransportConfig};

fn split_vote() -> SyntheticDataset {
    SyntheticDataset {
        config: SyntheticConfig::new(1, 2, 1),
        labels: vec![Label::new("a")],
        predicted: vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "a", 1, 0.0),
        ],
        true_error_rates: vec![ErrorRate::new("a", 0, 0.0), ErrorRate::new("a", 1, 1.0)],
        true_labels: vec![ObservedInstance::new(0, "a", true)],
    }
}

#[test]
fn split_vote_thresholds_to_false() {
    let evaluation = evaluate(
        &Integrator::MajorityVote,
        &InProcessBridge::default(),
        &split_vote(),
        None,
    )
    .unwrap();
    let labels = evaluation.result.integrated_labels.unwrap();
    assert_eq!(labels[0].soft, 0.5);
    assert!(!labels[0].hard);
    assert_eq!(evaluation.metrics.hard_labels.mad, 1.0);
    assert_eq!(evaluation.metrics.soft_labels.mad, 0.5);
}

#[test]
fn strategies_beat_coin_flipping_on_easy_data() {
    let dataset = generate_synthetic(SyntheticConfig::new(200, 7, 2), Some(42));
    let quick = SamplerConfig {
        burn_in_samples: 200,
        thinning_samples: 2,
        samples: 50,
        ..SamplerConfig::default()
    };
    for integrator in [Integrator::MajorityVote, Integrator::Bayesian(quick)] {
        let evaluation =
            evaluate(&integrator, &InProcessBridge::default(), &dataset, Some(3)).unwrap();
        assert!(
            evaluation.metrics.hard_labels.mad < 0.45,
            "{} hard MAD {}",
            integrator,
            evaluation.metrics.hard_labels.mad
        );
    }
}

#[test]
fn seeded_evaluation_is_repeatable() {
    let dataset = generate_synthetic(SyntheticConfig::new(30, 4, 2), Some(9));
    let integrator: Integrator = "CBI:40:1:20".parse().unwrap();
    let first = evaluate(&integrator, &InProcessBridge::default(), &dataset, Some(1)).unwrap();
    let second = evaluate(&integrator, &InProcessBridge::default(), &dataset, Some(1)).unwrap();
    assert_eq!(first.result, second.result);
    assert_eq!(first.metrics, second.metrics);
}

#[test]
fn sweep_runs_every_strategy() {
    let config = SweepConfig {
        instances: vec![15],
        sources: vec![3],
        labels: vec![2],
        seeds: vec![1, 2],
        strategies: vec![
            "MVI".parse().unwrap(),
            "AI".parse().unwrap(),
            "BI:20:1:10".parse().unwrap(),
            "CBI:20:1:10".parse().unwrap(),
            "HCBI:20:1:10".parse().unwrap(),
            "LI".parse().unwrap(),
        ],
        transports: vec![TransportConfig::InProcess(InProcessConfig::new(["threads=2"]))],
    };
    let report = run_sweep(&config);
    assert_eq!(report.records.len(), 12);
    assert_eq!(report.failed(), 0, "{}", report);
    assert!(report
        .records
        .iter()
        .all(|r| r.duration_ms.is_some() && r.metrics.is_some()));
}
