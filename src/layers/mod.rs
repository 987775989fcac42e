pub mod flatten;
pub mod layer;
pub mod masked;
pub mod masked_conv;
pub mod masked_dense;
pub mod param;
pub mod pooling;

pub use flatten::Flatten;
pub use layer::Layer;
pub use masked::{LayerState, MaskedCore, MaskedLayer, MaskedLayerConfig};
pub use masked_conv::MaskedConv2d;
pub use masked_dense::MaskedDense;
pub use param::{MaskedParams, Parameter, PruneStats};
pub use pooling::MaxPool2d;
