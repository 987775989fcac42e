use super::layer::Layer;
use crate::error::{MaskError, Result};
use crate::loss::RegularizationLedger;
use crate::tensor::Tensor;

/// Collapse every non-batch dimension into one.
pub struct Flatten {
    name: String,
    input_shape: Vec<usize>,
}

impl Flatten {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_shape: Vec::new(),
        }
    }

    fn flatten(&self, x: &Tensor) -> Result<Tensor> {
        if x.rank() < 2 {
            return Err(MaskError::InvalidInputRank {
                layer: self.name.clone(),
                expected: 2,
                got: x.shape.clone(),
            });
        }
        let batch = x.batch();
        let features = x.shape[1..].iter().product();
        Ok(x.clone().reshaped(vec![batch, features]))
    }
}

impl Layer for Flatten {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(
        &mut self,
        input_shape: &[usize],
        _index: usize,
        _ledger: &mut RegularizationLedger,
    ) -> Result<Vec<usize>> {
        Ok(vec![input_shape.iter().product()])
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.flatten(x)
    }

    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor> {
        self.input_shape = x.shape.clone();
        self.flatten(x)
    }

    fn backward(&mut self, grad_out: &Tensor) -> Result<Tensor> {
        if self.input_shape.is_empty() {
            return Err(MaskError::NoForwardPass {
                layer: self.name.clone(),
            });
        }
        Ok(grad_out.clone().reshaped(self.input_shape.clone()))
    }

    fn end_pass(&mut self) {
        self.input_shape.clear();
    }

    fn describe(&self) -> String {
        format!("{}: flatten", self.name)
    }
}
