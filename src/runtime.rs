//! The live edge state built from one configuration.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::validation::validate_config;
use crate::config::EdgeConfig;
use crate::error::{EdgeError, Result};
use crate::pipeline::EdgeRequestPipeline;
use crate::shield::AdmissionGate;

/// Gate and pipeline for the current configuration.
///
/// A config reload builds a fresh runtime and swaps it in whole, so shield
/// and cache state start empty after every reload.
#[derive(Debug)]
pub struct EdgeRuntime {
    pub config: EdgeConfig,
    pub gate: AdmissionGate,
    pub pipeline: EdgeRequestPipeline,
}

impl EdgeRuntime {
    /// Validates `config` before building anything from it.
    pub fn from_config(config: EdgeConfig) -> Result<Self> {
        validate_config(&config).map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EdgeError::Config(joined.join("; "))
        })?;
        let gate = AdmissionGate::new(&config.shield);
        let pipeline = EdgeRequestPipeline::from_config(&config)?;
        Ok(Self { config, gate, pipeline })
    }
}

/// Runtime handle shared by handlers and background tasks.
pub type SharedRuntime = Arc<ArcSwap<EdgeRuntime>>;

pub fn shared(runtime: EdgeRuntime) -> SharedRuntime {
    Arc::new(ArcSwap::from_pointee(runtime))
}
