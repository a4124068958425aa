//! Evaluation harness: synthetic data with known truth, metrics and sweeps.
//!
//! A sweep runs every combination of dataset size, seed, strategy and
//! transport independently (in parallel with `rayon`). A failing combination
//! is recorded in the report instead of aborting the sweep.
//!
//! # Example
//!
//! ```rust
//! use labelfuse::evaluation::{evaluate, generate_synthetic, SyntheticConfig};
//! use labelfuse::integrator::Integrator;
//! use labelfuse::transport::InProcessBridge;
//!
//! let dataset = generate_synthetic(SyntheticConfig::new(20, 3, 2), Some(7));
//! let evaluation = evaluate(&Integrator::MajorityVote, &InProcessBridge::default(), &dataset, None)
//!     .unwrap();
//! assert!(evaluation.metrics.hard_labels.mad <= 1.0);
//! ```

mod metrics;
mod report;
mod synthetic;

pub use metrics::{compute_metrics, Deviation, Metrics};
pub use report::{SweepRecord, SweepReport};
pub use synthetic::{generate_synthetic, SyntheticConfig, SyntheticDataset};

use std::path::Path;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::data::IntegrationResult;
use crate::error::LabelFuseError;
use crate::integrator::{sampling, IntegrationRequest, Integrator};
use crate::transport::{InProcessConfig, Transport, TransportConfig};

/// Stream of the strategy seed derived from a sweep seed; stream 0 is the
/// dataset itself.
const STRATEGY_SEED_STREAM: u64 = 1;

/// Outcome of one scored run.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub result: IntegrationResult,
    pub metrics: Metrics,
    /// Wall-clock time of the transport call.
    pub duration: Duration,
}

/// Runs `integrator` through `transport` on a synthetic dataset and scores it.
///
/// Every synthetic label is requested explicitly, so a label nobody predicted
/// fails with [`LabelFuseError::InsufficientEvidence`].
pub fn evaluate(
    integrator: &Integrator,
    transport: &dyn Transport,
    dataset: &SyntheticDataset,
    seed: Option<u64>,
) -> Result<Evaluation, LabelFuseError> {
    let mut request = IntegrationRequest::new(dataset.predicted.clone())
        .with_labels(dataset.labels.clone())
        .with_integrated_labels(true);
    if let Some(seed) = seed {
        request = request.with_seed(seed);
    }

    let started = Instant::now();
    let result = transport.execute(integrator, &request)?;
    let duration = started.elapsed();

    let metrics = compute_metrics(&dataset.true_error_rates, &dataset.true_labels, &result)?;
    debug!(
        strategy = integrator.identity(),
        transport = transport.name(),
        elapsed_ms = duration.as_secs_f64() * 1000.0,
        "evaluated"
    );
    Ok(Evaluation {
        result,
        metrics,
        duration,
    })
}

/// Parameter grid of a sweep; every field is a list and the sweep covers
/// their Cartesian product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub instances: Vec<usize>,
    pub sources: Vec<usize>,
    pub labels: Vec<usize>,
    pub seeds: Vec<u64>,
    pub strategies: Vec<Integrator>,
    pub transports: Vec<TransportConfig>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            instances: vec![100],
            sources: vec![5],
            labels: vec![2],
            seeds: vec![0],
            strategies: vec![Integrator::MajorityVote],
            transports: vec![TransportConfig::InProcess(InProcessConfig::default())],
        }
    }
}

impl SweepConfig {
    /// Reads a sweep from YAML; omitted fields keep their defaults.
    pub fn from_yaml_path(path: &Path) -> Result<Self, LabelFuseError> {
        let data = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&data).map_err(|source| LabelFuseError::SweepConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Number of combinations the sweep will run.
    pub fn len(&self) -> usize {
        self.instances.len()
            * self.sources.len()
            * self.labels.len()
            * self.seeds.len()
            * self.strategies.len()
            * self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn combinations(&self) -> Vec<Combination<'_>> {
        let mut out = Vec::with_capacity(self.len());
        for &instances in &self.instances {
            for &sources in &self.sources {
                for &labels in &self.labels {
                    for &seed in &self.seeds {
                        for strategy in &self.strategies {
                            for transport in &self.transports {
                                out.push(Combination {
                                    size: SyntheticConfig::new(instances, sources, labels),
                                    seed,
                                    strategy,
                                    transport,
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

struct Combination<'a> {
    size: SyntheticConfig,
    seed: u64,
    strategy: &'a Integrator,
    transport: &'a TransportConfig,
}

impl Combination<'_> {
    fn run(&self) -> SweepRecord {
        let mut record = SweepRecord {
            instances: self.size.instances,
            sources: self.size.sources,
            labels: self.size.labels,
            seed: self.seed,
            strategy: self.strategy.to_string(),
            transport: self.transport.name().to_string(),
            metrics: None,
            duration_ms: None,
            error: None,
        };

        let dataset = generate_synthetic(self.size, Some(self.seed));
        let transport = self.transport.build();
        let seed = sampling::derive_seed(self.seed, STRATEGY_SEED_STREAM);
        match evaluate(self.strategy, transport.as_ref(), &dataset, Some(seed)) {
            Ok(evaluation) => {
                record.metrics = Some(evaluation.metrics);
                record.duration_ms = Some(evaluation.duration.as_secs_f64() * 1000.0);
            }
            Err(err) => {
                warn!(
                    strategy = %record.strategy,
                    transport = %record.transport,
                    instances = record.instances,
                    sources = record.sources,
                    labels = record.labels,
                    error = %err,
                    "sweep combination failed"
                );
                record.error = Some(err.to_string());
            }
        }
        record
    }
}

/// Runs every combination of `config` in parallel. Records come back in
/// grid order regardless of scheduling.
pub fn run_sweep(config: &SweepConfig) -> SweepReport {
    let span = info_span!("sweep", combinations = config.len());
    let _guard = span.enter();

    let records: Vec<SweepRecord> = config
        .combinations()
        .par_iter()
        .map(Combination::run)
        .collect();
    let report = SweepReport::new(records);
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "sweep finished"
    );
    report
}
