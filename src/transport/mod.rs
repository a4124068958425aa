//! Delivery of integration requests to an inference engine.
//!
//! Both transports satisfy the same [`Transport`] contract and are expected to
//! return equal results (up to floating-point tolerance) for the same
//! strategy, seed and input:
//!
//! - [`InProcessBridge`] runs the embedded engine on the caller's thread (or a
//!   dedicated thread pool);
//! - [`ExternalProcess`] writes the request to scratch files, runs an engine
//!   executable once and reads its output files back.
//!
//! Neither transport retries: one `execute` call is at most one computation.

mod cleanup;
mod external;
mod in_process;

pub use cleanup::remove_scratch;
pub use external::{ExternalConfig, ExternalProcess, ENGINE_SUBCOMMAND};
pub use in_process::{InProcessBridge, InProcessConfig};

use serde::{Deserialize, Serialize};

use crate::data::IntegrationResult;
use crate::error::LabelFuseError;
use crate::integrator::{IntegrationRequest, Integrator};

/// Executes one integration request.
pub trait Transport: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        integrator: &Integrator,
        request: &IntegrationRequest,
    ) -> Result<IntegrationResult, LabelFuseError>;
}

/// Selects and configures a transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum TransportConfig {
    InProcess(InProcessConfig),
    External(ExternalConfig),
}

impl TransportConfig {
    pub fn name(&self) -> &'static str {
        match self {
            TransportConfig::InProcess(_) => in_process::NAME,
            TransportConfig::External(_) => external::NAME,
        }
    }

    pub fn build(&self) -> Box<dyn Transport> {
        match self {
            TransportConfig::InProcess(config) => Box::new(InProcessBridge::new(config.clone())),
            TransportConfig::External(config) => Box::new(ExternalProcess::new(config.clone())),
        }
    }
}
