pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

use crate::layers::MaskedParams;

/// Common interface for optimizers operating on masked parameter pairs.
///
/// Implementations update only the tensors whose `trainable` flag is set
/// and clear all gradients afterwards.
pub trait Optimizer {
    /// Update the provided parameters in-place.
    fn step(&mut self, params: &mut [&mut MaskedParams]);
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut MaskedParams]) {
        Adam::step(self, params);
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [&mut MaskedParams]) {
        SGD::step(self, params);
    }
}
