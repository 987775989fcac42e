pub mod activation;
pub mod config;
pub mod error;
pub mod init;
pub mod layers;
pub mod loss;
pub mod masks;
pub mod math;
pub mod models;
pub mod optim;
pub mod rng;
pub mod runtime;
pub mod tensor;

pub use activation::Activation;
pub use error::{MaskError, Result};
pub use init::Initializer;
pub use layers::{Layer, MaskedLayer, PruneStats};
pub use loss::RegularizationCoefficients;
pub use masks::MaskFunction;
pub use models::{build_conv_network, build_dense_network, ConvSpec, MaskedLayerOptions, Network};
pub use tensor::Tensor;
