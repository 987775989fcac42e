use super::masked::MaskedLayer;
use super::param::MaskedParams;
use crate::error::Result;
use crate::loss::RegularizationLedger;
use crate::tensor::Tensor;

/// Common interface for network layers.
///
/// Shapes passed to [`Layer::build`] exclude the batch dimension; tensors
/// passed to the forward and backward passes include it.
pub trait Layer {
    fn name(&self) -> &str;

    /// Create shape-dependent state for `input_shape` and return the output
    /// shape. `index` is the layer's position in its network, used to key
    /// regularization terms in `ledger`.
    fn build(
        &mut self,
        input_shape: &[usize],
        index: usize,
        ledger: &mut RegularizationLedger,
    ) -> Result<Vec<usize>>;

    /// Forward pass used during inference.
    fn forward(&self, x: &Tensor) -> Result<Tensor>;

    /// Forward pass used during training, caching what backward needs.
    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor>;

    /// Backward pass returning the gradient with respect to the layer input.
    fn backward(&mut self, grad_out: &Tensor) -> Result<Tensor>;

    /// Drop cached state of the current training pass.
    fn end_pass(&mut self) {}

    /// Zero any accumulated gradients.
    fn zero_grad(&mut self) {}

    /// Mutable access to trainable parameters for the optimizer.
    fn parameters(&mut self) -> Vec<&mut MaskedParams> {
        Vec::new()
    }

    fn as_masked(&self) -> Option<&dyn MaskedLayer> {
        None
    }

    fn as_masked_mut(&mut self) -> Option<&mut dyn MaskedLayer> {
        None
    }

    /// One-line human readable summary.
    fn describe(&self) -> String;
}
