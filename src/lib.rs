//! Labelfuse: truth discovery over noisy label predictions.
//!
//! Many sources (annotators, classifiers) each predict whether an instance
//! carries a label. Labelfuse estimates how often each source is wrong for
//! each label and integrates the predictions into soft and hard labels, using
//! one of several strategies from plain majority vote to coupled Bayesian
//! models and constraint-driven logic.
//!
//! # Modules
//!
//! - [`data`]: records (predictions, observations, error rates, integrated
//!   labels) and their binary/CSV codecs
//! - [`constraint`]: mutual-exclusion and subsumption constraints between labels
//! - [`validation`]: input checks and error reporting
//! - [`integrator`]: the integration strategies and the embedded engine
//! - [`transport`]: in-process and out-of-process execution
//! - [`evaluation`]: synthetic data, metrics and parameter sweeps
//! - [`error`]: error types for labelfuse operations
//!
//! The library never installs a `tracing` subscriber; the binary does.

pub mod constraint;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod integrator;
pub mod transport;
pub mod validation;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

pub use error::LabelFuseError;

use data::RecordFormat;
use evaluation::{SweepConfig, SyntheticConfig};
use integrator::{IntegrationRequest, Integrator};
use transport::{
    ExternalConfig, InProcessBridge, InProcessConfig, Transport, TransportConfig,
};

/// Environment variable naming the engine executable for the external transport.
pub const ENGINE_ENV: &str = "LABELFUSE_ENGINE";

/// The labelfuse CLI application.
#[derive(Parser)]
#[command(name = "labelfuse")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Opaque engine option, e.g. 'threads=4' (repeatable).
    #[arg(long = "engine-option", global = true, value_name = "OPTION")]
    engine_options: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Integrate predictions with one strategy (also the external engine contract).
    Integrate(IntegrateArgs),
    /// Validate prediction and observation files.
    Validate(ValidateArgs),
    /// Write a synthetic dataset with known truth.
    Generate(GenerateArgs),
    /// Score strategies on synthetic data.
    Evaluate(EvaluateArgs),
    /// List the integration strategies and their default options.
    Strategies,
}

/// Arguments for the integrate subcommand.
#[derive(clap::Args)]
struct IntegrateArgs {
    /// Predicted instances (.protobin or .csv).
    #[arg(short = 'd', long = "predicted")]
    predicted: PathBuf,

    /// Output file for the estimated error rates.
    #[arg(short = 'e', long = "error-rates")]
    error_rates: PathBuf,

    /// Strategy identity ('MVI', 'AI', 'BI', 'CBI', 'HCBI', 'LI') or long name.
    #[arg(short = 'm', long = "method")]
    method: String,

    /// Colon-separated hyperparameters; '-' keeps a slot's default.
    #[arg(short = 'o', long = "options")]
    options: Option<String>,

    /// Constraint file, one constraint per line.
    #[arg(short = 'c', long = "constraints")]
    constraints: Option<PathBuf>,

    /// Output file for integrated labels; omit to skip integration.
    #[arg(short = 'i', long = "integrated")]
    integrated: Option<PathBuf>,

    /// Seed for stochastic strategies.
    #[arg(short = 's', long = "seed")]
    seed: Option<u64>,

    /// Observed (true) instances.
    #[arg(short = 't', long = "observed")]
    observed: Option<PathBuf>,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Predicted instances to validate.
    predicted: PathBuf,

    /// Observed instances to check against the predictions.
    #[arg(long)]
    observed: Option<PathBuf>,

    /// Error rates to check against the predictions.
    #[arg(long)]
    error_rates: Option<PathBuf>,

    /// Constraint file to check for satisfiability.
    #[arg(long)]
    constraints: Option<PathBuf>,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the generate subcommand.
#[derive(clap::Args)]
struct GenerateArgs {
    /// Directory receiving predicted, true_error_rates and true_labels files.
    output_dir: PathBuf,

    #[arg(long, default_value_t = 100)]
    instances: usize,

    #[arg(long, default_value_t = 5)]
    sources: usize,

    #[arg(long, default_value_t = 2)]
    labels: usize,

    /// Seed; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Record format ('protobin' or 'csv').
    #[arg(long, default_value = "protobin")]
    format: String,
}

/// Arguments for the evaluate subcommand.
#[derive(clap::Args)]
struct EvaluateArgs {
    /// YAML sweep file; other grid flags are ignored when given.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instance counts (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "100")]
    instances: Vec<usize>,

    /// Source counts (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "5")]
    sources: Vec<usize>,

    /// Label counts (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "2")]
    labels: Vec<usize>,

    /// Dataset seeds (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "0")]
    seeds: Vec<u64>,

    /// Strategy as 'IDENTITY[:opt:opt...]' (repeatable).
    #[arg(long = "strategy", default_value = "MVI")]
    strategies: Vec<String>,

    /// Transports to compare ('in-process', 'external').
    #[arg(long = "transport", value_delimiter = ',', default_value = "in-process")]
    transports: Vec<String>,

    /// Engine executable for the external transport; defaults to this program.
    #[arg(long, env = ENGINE_ENV)]
    engine: Option<PathBuf>,

    /// Kill the external engine after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Run the labelfuse CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabelFuseError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Integrate(args)) => run_integrate(args, cli.engine_options),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Generate(args)) => run_generate(args),
        Some(Commands::Evaluate(args)) => run_evaluate(args, cli.engine_options),
        Some(Commands::Strategies) => {
            for integrator in Integrator::all() {
                println!("{:<5} {:<30} {}", integrator.identity(), integrator.name(), integrator);
            }
            Ok(())
        }
        None => {
            println!("labelfuse {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Truth discovery over noisy label predictions.");
            println!();
            println!("Run 'labelfuse --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the integrate subcommand on the embedded engine.
fn run_integrate(args: IntegrateArgs, engine_options: Vec<String>) -> Result<(), LabelFuseError> {
    let integrator = Integrator::from_options(&args.method, args.options.as_deref())?;

    let mut request = IntegrationRequest::new(data::load_predicted_instances(&args.predicted)?)
        .with_integrated_labels(args.integrated.is_some());
    if let Some(path) = &args.constraints {
        request = request.with_constraints(constraint::load_constraints(path)?);
    }
    if let Some(path) = &args.observed {
        request = request.with_observed(data::load_observed_instances(path)?);
    }
    if let Some(seed) = args.seed {
        request = request.with_seed(seed);
    }

    let bridge = InProcessBridge::new(InProcessConfig::new(engine_options));
    let result = bridge.execute(&integrator, &request)?;

    data::save_error_rates(&args.error_rates, &result.error_rates)?;
    if let (Some(path), Some(labels)) = (&args.integrated, &result.integrated_labels) {
        data::save_integrated_labels(path, labels)?;
    }
    info!(
        strategy = %integrator,
        error_rates = result.error_rates.len(),
        "integration finished"
    );
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), LabelFuseError> {
    let predicted = data::load_predicted_instances(&args.predicted)?;
    let mut report = validation::validate_predictions(&predicted);
    if let Some(path) = &args.observed {
        let observed = data::load_observed_instances(path)?;
        report.merge(validation::validate_observations(&observed, &predicted));
    }
    if let Some(path) = &args.error_rates {
        let error_rates = data::load_error_rates(path)?;
        report.merge(validation::validate_error_rates(&error_rates, &predicted));
    }
    if let Some(path) = &args.constraints {
        constraint::load_constraints(path)?.validate()?;
    }

    match args.output.as_str() {
        "json" => {
            let json = serde_json::json!({
                "error_count": report.error_count(),
                "warning_count": report.warning_count(),
                "issues": &report.issues,
            });
            let text =
                serde_json::to_string_pretty(&json).map_err(LabelFuseError::ReportJsonWrite)?;
            println!("{}", text);
        }
        _ => print!("{}", report),
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;
    if has_errors || (args.strict && has_warnings) {
        Err(LabelFuseError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

/// Execute the generate subcommand.
fn run_generate(args: GenerateArgs) -> Result<(), LabelFuseError> {
    let format = parse_format(&args.format)?;
    let config = SyntheticConfig::new(args.instances, args.sources, args.labels);
    let dataset = evaluation::generate_synthetic(config, args.seed);

    std::fs::create_dir_all(&args.output_dir)?;
    let path = |stem: &str| args.output_dir.join(format!("{}.{}", stem, format.extension()));
    data::save_predicted_instances(&path("predicted"), &dataset.predicted)?;
    data::save_error_rates(&path("true_error_rates"), &dataset.true_error_rates)?;
    data::save_observed_instances(&path("true_labels"), &dataset.true_labels)?;

    println!(
        "Wrote {} predictions for {} instance(s), {} source(s), {} label(s) to {}",
        dataset.predicted.len(),
        config.instances,
        config.sources,
        config.labels,
        args.output_dir.display()
    );
    Ok(())
}

/// Execute the evaluate subcommand.
fn run_evaluate(args: EvaluateArgs, engine_options: Vec<String>) -> Result<(), LabelFuseError> {
    let config = match &args.config {
        Some(path) => SweepConfig::from_yaml_path(path)?,
        None => SweepConfig {
            instances: args.instances.clone(),
            sources: args.sources.clone(),
            labels: args.labels.clone(),
            seeds: args.seeds.clone(),
            strategies: args
                .strategies
                .iter()
                .map(|s| s.parse())
                .collect::<Result<_, _>>()?,
            transports: args
                .transports
                .iter()
                .map(|name| transport_config(name, &args, &engine_options))
                .collect::<Result<_, _>>()?,
        },
    };
    for strategy in &config.strategies {
        strategy.validate()?;
    }

    let report = evaluation::run_sweep(&config);
    match args.output.as_str() {
        "json" => println!("{}", report.to_json()?),
        _ => print!("{}", report),
    }
    Ok(())
}

fn transport_config(
    name: &str,
    args: &EvaluateArgs,
    engine_options: &[String],
) -> Result<TransportConfig, LabelFuseError> {
    match name {
        "in-process" => Ok(TransportConfig::InProcess(InProcessConfig::new(
            engine_options.iter().cloned(),
        ))),
        "external" => {
            let program = match &args.engine {
                Some(path) => path.clone(),
                None => std::env::current_exe()?,
            };
            let mut config = ExternalConfig::new(program);
            config.engine_options = engine_options
                .iter()
                .map(|option| format!("--engine-option={}", option))
                .collect();
            config.timeout_ms = args.timeout_ms;
            Ok(TransportConfig::External(config))
        }
        other => Err(LabelFuseError::InvalidTransportOption(format!(
            "unknown transport '{}' (supported: in-process, external)",
            other
        ))),
    }
}

fn parse_format(name: &str) -> Result<RecordFormat, LabelFuseError> {
    RecordFormat::from_path(Path::new(&format!("records.{}", name)))
}
