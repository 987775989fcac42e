pub mod network;
pub mod options;

pub use network::{build_conv_network, build_dense_network, Network, StepReport};
pub use options::{conv_arch_to_string, widths_to_string, ConvSpec, MaskedLayerOptions};
