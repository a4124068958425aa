//! Out-of-process engine invocation.
//!
//! The request is written to a private scratch directory, the engine is run
//! once as
//!
//! ```text
//! <program> [launch args] [engine options] integrate
//!     -d <predicted> -e <error rates> -m <identity>
//!     [-o <options>] [-c <constraints>] [-i <integrated>] [-s <seed>] [-t <observed>]
//! ```
//!
//! and its output files are read back. The scratch directory is removed
//! afterwards whatever the outcome.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info_span, warn};

use super::cleanup::remove_scratch;
use super::Transport;
use crate::constraint::save_constraints;
use crate::data::{
    load_error_rates, load_integrated_labels, save_observed_instances, save_predicted_instances,
    IntegrationResult, RecordFormat,
};
use crate::error::LabelFuseError;
use crate::integrator::{IntegrationRequest, Integrator, OPTION_SEPARATOR};
use crate::validation;

pub(super) const NAME: &str = "external";

/// Subcommand of the engine executable that implements the contract.
pub const ENGINE_SUBCOMMAND: &str = "integrate";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to launch the engine executable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub program: PathBuf,
    /// Arguments placed right after the program, e.g. an interpreter's script.
    pub launch_args: Vec<String>,
    /// Opaque tuning flags appended to the launch command.
    pub engine_options: Vec<String>,
    /// Parent of the per-request scratch directories; the system temporary
    /// directory when unset.
    pub working_directory: Option<PathBuf>,
    /// Format of the exchanged record files.
    pub format: RecordFormat,
    /// Remove scratch files afterwards.
    pub clean_up: bool,
    /// Kill the engine after this many milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("labelfuse"),
            launch_args: Vec::new(),
            engine_options: Vec::new(),
            working_directory: None,
            format: RecordFormat::Protobin,
            clean_up: true,
            timeout_ms: None,
        }
    }
}

impl ExternalConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Runs requests through an engine executable.
#[derive(Clone, Debug)]
pub struct ExternalProcess {
    config: ExternalConfig,
}

/// Scratch files of one request.
struct Scratch {
    directory: PathBuf,
    files: Vec<PathBuf>,
}

impl Scratch {
    fn file(&mut self, name: &str) -> PathBuf {
        let path = self.directory.join(name);
        self.files.push(path.clone());
        path
    }
}

impl ExternalProcess {
    pub fn new(config: ExternalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExternalConfig {
        &self.config
    }

    fn create_scratch(&self) -> Result<Scratch, LabelFuseError> {
        let parent = self
            .config
            .working_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let directory = tempfile::Builder::new()
            .prefix("labelfuse-")
            .tempdir_in(&parent)?
            .keep();
        Ok(Scratch {
            directory,
            files: Vec::new(),
        })
    }

    /// Writes the inputs and assembles the command line.
    fn prepare(
        &self,
        integrator: &Integrator,
        request: &IntegrationRequest,
        scratch: &mut Scratch,
    ) -> Result<(Vec<String>, PathBuf, Option<PathBuf>), LabelFuseError> {
        let extension = self.config.format.extension();
        let mut argv: Vec<String> = vec![self.config.program.display().to_string()];
        argv.extend(self.config.launch_args.iter().cloned());
        argv.extend(self.config.engine_options.iter().cloned());
        argv.push(ENGINE_SUBCOMMAND.to_string());

        let predicted = scratch.file(&format!("predicted.{}", extension));
        save_predicted_instances(&predicted, &request.predicted)?;
        let error_rates = scratch.file(&format!("error_rates.{}", extension));
        push_flag(&mut argv, "-d", &predicted);
        push_flag(&mut argv, "-e", &error_rates);
        argv.push("-m".to_string());
        argv.push(integrator.identity().to_string());

        let options = integrator.hyperparameters();
        if !options.is_empty() {
            argv.push("-o".to_string());
            argv.push(options.join(&OPTION_SEPARATOR.to_string()));
        }

        if let Some(constraints) = &request.constraints {
            let path = scratch.file("constraints.txt");
            save_constraints(&path, constraints)?;
            push_flag(&mut argv, "-c", &path);
        }

        let integrated = if request.integrate_labels {
            let path = scratch.file(&format!("integrated.{}", extension));
            push_flag(&mut argv, "-i", &path);
            Some(path)
        } else {
            None
        };

        if let Some(seed) = request.seed {
            argv.push("-s".to_string());
            argv.push(seed.to_string());
        }

        if let Some(observed) = &request.observed {
            let path = scratch.file(&format!("observed.{}", extension));
            save_observed_instances(&path, observed)?;
            push_flag(&mut argv, "-t", &path);
        }

        Ok((argv, error_rates, integrated))
    }

    fn run_engine(&self, argv: &[String], scratch: &mut Scratch) -> Result<(), LabelFuseError> {
        let command_line = argv.join(" ");
        let stderr_path = scratch.file("engine.stderr");
        let stderr = File::create(&stderr_path)?;

        debug!(command = %command_line, "launching engine");
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|err| LabelFuseError::ExternalComputationFailed {
                command: command_line.clone(),
                status: format!("failed to start: {}", err),
            })?;

        let status = match self.config.timeout() {
            Some(timeout) => wait_with_timeout(&mut child, timeout, &command_line)?,
            None => child.wait()?,
        };

        if status.success() {
            Ok(())
        } else {
            let captured = std::fs::read_to_string(&stderr_path).unwrap_or_default();
            warn!(command = %command_line, %status, stderr = %captured.trim(), "engine failed");
            Err(LabelFuseError::ExternalComputationFailed {
                command: command_line,
                status: status.to_string(),
            })
        }
    }

    fn read_outputs(
        &self,
        request: &IntegrationRequest,
        error_rates: &Path,
        integrated: Option<&Path>,
    ) -> Result<IntegrationResult, LabelFuseError> {
        let error_rates = load_error_rates(error_rates)?;
        validation::ensure_valid(validation::validate_error_rates(
            &error_rates,
            &request.predicted,
        ))?;
        let integrated_labels = integrated.map(load_integrated_labels).transpose()?;
        Ok(IntegrationResult::new(error_rates, integrated_labels))
    }
}

fn push_flag(argv: &mut Vec<String>, flag: &str, path: &Path) {
    argv.push(flag.to_string());
    argv.push(path.display().to_string());
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    command_line: &str,
) -> Result<ExitStatus, LabelFuseError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            // The process may exit between the poll and the kill.
            if let Err(err) = child.kill() {
                debug!(error = %err, "engine exited before it could be killed");
            }
            child.wait()?;
            return Err(LabelFuseError::ExternalComputationTimeout {
                command: command_line.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl Transport for ExternalProcess {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(
        &self,
        integrator: &Integrator,
        request: &IntegrationRequest,
    ) -> Result<IntegrationResult, LabelFuseError> {
        let span = info_span!("execute", transport = NAME, strategy = integrator.identity());
        let _guard = span.enter();

        integrator.validate()?;
        request.check()?;

        let mut scratch = self.create_scratch()?;
        let outcome = self
            .prepare(integrator, request, &mut scratch)
            .and_then(|(argv, error_rates, integrated)| {
                self.run_engine(&argv, &mut scratch)?;
                self.read_outputs(request, &error_rates, integrated.as_deref())
            });

        if !self.config.clean_up {
            debug!(directory = %scratch.directory.display(), "keeping scratch files");
            return outcome;
        }
        let cleaned = remove_scratch(&scratch.directory, &scratch.files);
        match (outcome, cleaned) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                error!(error = %cleanup, "cleanup failed after engine error");
                Err(err)
            }
        }
    }
}
