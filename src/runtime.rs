//! Explicit process initialization, run once by the hosting application
//! before any network is built.

use crate::config::{ArchitectureConfig, EngineConfig, ExperimentConfig};
use crate::error::Result;
use crate::models::{build_conv_network, build_dense_network, Network};
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the logger described by `config`. Later calls are no-ops.
pub fn init(config: &EngineConfig) {
    INIT.call_once(|| {
        let env = env_logger::Env::default()
            .default_filter_or(config.log_level.as_str())
            .default_write_style_or(config.log_style.as_str());
        // a host may already have installed its own logger
        let _ = env_logger::Builder::from_env(env).try_init();
        log::debug!("masknet runtime initialized with {config:?}");
    });
}

/// Initialize the runtime from an experiment and build its network.
pub fn build_experiment(config: &ExperimentConfig) -> Result<Network> {
    init(&config.engine);
    match &config.architecture {
        ArchitectureConfig::Dense { widths } => build_dense_network(widths, &config.network),
        ArchitectureConfig::Conv {
            input_shape,
            conv,
            dense,
        } => build_conv_network(input_shape, conv, dense, &config.network),
    }
}
