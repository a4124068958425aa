//! In-process bridge to the embedded engine.

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use super::Transport;
use crate::data::IntegrationResult;
use crate::error::LabelFuseError;
use crate::integrator::{CancellationToken, IntegrationRequest, Integrator};

pub(super) const NAME: &str = "in-process";

const THREADS_OPTION: &str = "threads=";

/// Opaque engine options; `threads=<n>` selects a dedicated pool size and
/// anything else is accepted and ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InProcessConfig {
    pub options: Vec<String>,
}

impl InProcessConfig {
    pub fn new(options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Worker threads requested through `threads=<n>`; the last one wins.
    pub fn threads(&self) -> Result<Option<usize>, LabelFuseError> {
        let mut threads = None;
        for option in &self.options {
            if let Some(value) = option.strip_prefix(THREADS_OPTION) {
                let parsed: usize = value.parse().map_err(|_| {
                    LabelFuseError::InvalidTransportOption(format!(
                        "'{}' needs a positive thread count",
                        option
                    ))
                })?;
                if parsed == 0 {
                    return Err(LabelFuseError::InvalidTransportOption(format!(
                        "'{}' needs a positive thread count",
                        option
                    )));
                }
                threads = Some(parsed);
            } else {
                debug!(option = %option, "passing through unrecognised engine option");
            }
        }
        Ok(threads)
    }
}

/// Runs requests on the embedded engine.
#[derive(Clone, Debug, Default)]
pub struct InProcessBridge {
    config: InProcessConfig,
    cancel: CancellationToken,
}

impl InProcessBridge {
    pub fn new(config: InProcessConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Shares a cancellation token with the caller.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Transport for InProcessBridge {
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

        match self.config.threads()? {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|err| LabelFuseError::InvalidTransportOption(err.to_string()))?;
                pool.install(|| integrator.run_with_cancellation(request, &self.cancel))
            }
            None => integrator.run_with_cancellation(request, &self.cancel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PredictedInstance;

    #[test]
    fn reads_thread_option_and_ignores_others() {
        let config = InProcessConfig::new(["-Xmx4g", "threads=2"]);
        assert_eq!(config.threads().unwrap(), Some(2));
        assert_eq!(InProcessConfig::default().threads().unwrap(), None);
        assert!(InProcessConfig::new(["threads=0"]).threads().is_err());
        assert!(InProcessConfig::new(["threads=many"]).threads().is_err());
    }

    #[test]
    fn dedicated_pool_gives_same_result() {
        let request = IntegrationRequest::new(vec![
            PredictedInstance::new(0, "a", 0, 1.0),
            PredictedInstance::new(0, "a", 1, 1.0),
            PredictedInstance::new(0, "b", 0, 0.0),
        ])
        .with_integrated_labels(true);
        let pooled = InProcessBridge::new(InProcessConfig::new(["threads=1"]))
            .execute(&Integrator::MajorityVote, &request)
            .unwrap();
        let plain = InProcessBridge::default()
            .execute(&Integrator::MajorityVote, &request)
            .unwrap();
        assert_eq!(pooled, plain);
    }
}
