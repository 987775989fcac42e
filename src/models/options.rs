use crate::activation::Activation;
use crate::error::{MaskError, Result};
use crate::init::Initializer;
use crate::layers::MaskedLayerConfig;
use crate::loss::{RegularizationCoefficients, Regularizer};
use crate::masks::MaskFunction;
use serde::{Deserialize, Serialize};

/// Settings shared by every masked layer of one network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskedLayerOptions {
    /// Activation of every layer except the softmax head.
    pub activation: Activation,
    pub seed: u64,
    pub initializer: Initializer,
    pub mask_function: MaskFunction,
    #[serde(default = "default_true")]
    pub train_weight: bool,
    #[serde(default = "default_true")]
    pub train_score: bool,
    /// Parameter of the `heconstant` and `binary` initializers.
    #[serde(default)]
    pub p1: f32,
    #[serde(default)]
    pub regularization: RegularizationCoefficients,
}

fn default_true() -> bool {
    true
}

impl MaskedLayerOptions {
    pub fn new(
        activation: Activation,
        seed: u64,
        initializer: Initializer,
        mask_function: MaskFunction,
    ) -> Self {
        Self {
            activation,
            seed,
            initializer,
            mask_function,
            train_weight: true,
            train_score: true,
            p1: 0.0,
            regularization: RegularizationCoefficients::default(),
        }
    }

    /// Parse the string tags a caller hands in, failing on any unknown one.
    pub fn from_tags(
        activation: &str,
        seed: u64,
        initializer: &str,
        mask_function: &str,
    ) -> Result<Self> {
        Ok(Self::new(
            activation.parse()?,
            seed,
            initializer.parse()?,
            mask_function.parse()?,
        ))
    }

    pub fn trainable(mut self, train_weight: bool, train_score: bool) -> Self {
        self.train_weight = train_weight;
        self.train_score = train_score;
        self
    }

    pub fn with_p1(mut self, p1: f32) -> Self {
        self.p1 = p1;
        self
    }

    pub fn with_regularization(mut self, regularization: RegularizationCoefficients) -> Self {
        self.regularization = regularization;
        self
    }

    pub(crate) fn layer_config(
        &self,
        activation: Activation,
        seed: u64,
        regularizer: Option<Regularizer>,
    ) -> MaskedLayerConfig {
        MaskedLayerConfig {
            activation,
            seed,
            initializer: self.initializer,
            mask_function: self.mask_function,
            train_weight: self.train_weight,
            train_score: self.train_score,
            p1: self.p1,
            regularizer,
        }
    }
}

/// One entry of a convolutional architecture descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvSpec {
    /// Masked convolution with a `(height, width)` kernel.
    Conv { kernel: (usize, usize), filters: usize },
    /// Fixed 2x2 max pooling with stride 2.
    Pool,
}

impl ConvSpec {
    pub fn conv(kernel_h: usize, kernel_w: usize, filters: usize) -> Self {
        ConvSpec::Conv {
            kernel: (kernel_h, kernel_w),
            filters,
        }
    }

    /// Read the tuple form: `(kernel_h, kernel_w, filters)` or `()` for pooling.
    pub fn from_entry(entry: &[usize]) -> Result<Self> {
        match entry {
            [] => Ok(ConvSpec::Pool),
            [kh, kw, filters] => Ok(ConvSpec::conv(*kh, *kw, *filters)),
            other => Err(MaskError::InvalidArchitecture {
                reason: format!(
                    "conv entry {other:?} must be (kernel_h, kernel_w, filters) or empty"
                ),
            }),
        }
    }

    fn token(&self) -> String {
        match self {
            ConvSpec::Conv { kernel, filters } => format!("{}x{}x{}", kernel.0, kernel.1, filters),
            ConvSpec::Pool => "P".to_string(),
        }
    }
}

/// Serialize a conv descriptor, e.g. `3x3x8_P_3x3x16`.
pub fn conv_arch_to_string(arch: &[ConvSpec]) -> String {
    arch.iter().map(ConvSpec::token).collect::<Vec<_>>().join("_")
}

/// Serialize a width sequence, e.g. `10_20_2`.
pub fn widths_to_string(widths: &[usize]) -> String {
    widths
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join("_")
}
