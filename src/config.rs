use crate::error::{MaskError, Result};
use crate::loss::RegularizationCoefficients;
use crate::models::{ConvSpec, MaskedLayerOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;

/// Process-level settings applied once by [`crate::runtime::init`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// `env_logger` filter directive, e.g. `info` or `masknet=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Colour output: `auto`, `always` or `never`.
    #[serde(default = "default_log_style")]
    pub log_style: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_style() -> String {
    "auto".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_style: default_log_style(),
        }
    }
}

/// Architecture of the network an experiment builds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchitectureConfig {
    Dense {
        widths: Vec<usize>,
    },
    Conv {
        input_shape: Vec<usize>,
        conv: Vec<ConvSpec>,
        dense: Vec<usize>,
    },
}

/// Experiment description loaded from a TOML or JSON file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub engine: EngineConfig,
    pub architecture: ArchitectureConfig,
    pub network: MaskedLayerOptions,
}

/// On-disk layout. Tags stay strings until [`NetworkTags::resolve`] so an
/// unknown one surfaces as [`MaskError::UnknownTag`].
#[derive(Deserialize)]
struct ExperimentFile {
    #[serde(default)]
    engine: EngineConfig,
    architecture: ArchitectureConfig,
    network: NetworkTags,
}

#[derive(Deserialize)]
struct NetworkTags {
    activation: String,
    seed: u64,
    initializer: String,
    mask_function: String,
    #[serde(default = "default_true")]
    train_weight: bool,
    #[serde(default = "default_true")]
    train_score: bool,
    #[serde(default)]
    p1: f32,
    #[serde(default)]
    regularization: RegularizationCoefficients,
}

fn default_true() -> bool {
    true
}

impl NetworkTags {
    fn resolve(self) -> Result<MaskedLayerOptions> {
        Ok(MaskedLayerOptions::from_tags(
            &self.activation,
            self.seed,
            &self.initializer,
            &self.mask_function,
        )?
        .trainable(self.train_weight, self.train_score)
        .with_p1(self.p1)
        .with_regularization(self.regularization))
    }
}

impl ExperimentFile {
    fn resolve(self) -> Result<ExperimentConfig> {
        Ok(ExperimentConfig {
            engine: self.engine,
            architecture: self.architecture,
            network: self.network.resolve()?,
        })
    }
}

impl ExperimentConfig {
    /// Load from `path`; JSON when the extension is `.json`, TOML otherwise.
    pub fn from_path(path: &str) -> Result<Self> {
        load::<ExperimentFile>(path)?.resolve()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ExperimentFile = toml::from_str(content).map_err(|e| MaskError::Config {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        file.resolve()
    }
}

impl EngineConfig {
    pub fn from_path(path: &str) -> Result<Self> {
        load(path)
    }
}

fn load<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| MaskError::Config {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let parsed = if path.ends_with(".json") {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        toml::from_str(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| MaskError::Config {
        path: path.to_string(),
        reason,
    })
}
