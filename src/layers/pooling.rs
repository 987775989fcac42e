use super::layer::Layer;
use crate::error::{MaskError, Result};
use crate::loss::RegularizationLedger;
use crate::tensor::Tensor;

/// 2D max pooling over an NHWC tensor with "valid" padding.
///
/// Returns the pooled tensor and, for every output element, the flat index
/// of the input element that won its window. The indices drive backprop.
pub fn max_pool2d(input: &Tensor, kernel: usize, stride: usize) -> (Tensor, Vec<usize>) {
    let (batch, in_h, in_w, chans) = (
        input.shape[0],
        input.shape[1],
        input.shape[2],
        input.shape[3],
    );
    let out_h = pooled_extent(in_h, kernel, stride);
    let out_w = pooled_extent(in_w, kernel, stride);
    let mut out = Tensor::zeros(vec![batch, out_h, out_w, chans]);
    let mut indices = vec![0usize; out.len()];
    let mut idx = 0;
    for b in 0..batch {
        for r in 0..out_h {
            for c in 0..out_w {
                for ch in 0..chans {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = 0usize;
                    for kr in 0..kernel {
                        for kc in 0..kernel {
                            let ir = r * stride + kr;
                            let ic = c * stride + kc;
                            let flat = ((b * in_h + ir) * in_w + ic) * chans + ch;
                            let val = input.data[flat];
                            if val > best {
                                best = val;
                                best_idx = flat;
                            }
                        }
                    }
                    out.data[idx] = best;
                    indices[idx] = best_idx;
                    idx += 1;
                }
            }
        }
    }
    (out, indices)
}

/// Backward pass for [`max_pool2d`]: route each output gradient to the
/// input element that produced the maximum.
pub fn max_pool2d_backward(grad: &Tensor, indices: &[usize], input_shape: &[usize]) -> Tensor {
    let mut grad_input = Tensor::zeros(input_shape.to_vec());
    for (i, &idx) in indices.iter().enumerate() {
        grad_input.data[idx] += grad.data[i];
    }
    grad_input
}

fn pooled_extent(input: usize, kernel: usize, stride: usize) -> usize {
    if input < kernel {
        0
    } else {
        (input - kernel) / stride + 1
    }
}

/// Max pooling layer without parameters.
pub struct MaxPool2d {
    name: String,
    kernel: usize,
    stride: usize,
    indices: Vec<usize>,
    input_shape: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(name: impl Into<String>, kernel: usize, stride: usize) -> Self {
        Self {
            name: name.into(),
            kernel,
            stride,
            indices: Vec::new(),
            input_shape: Vec::new(),
        }
    }

    pub fn kernel(&self) -> usize {
        self.kernel
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn check(&self, x: &Tensor) -> Result<()> {
        if x.rank() != 4 {
            return Err(MaskError::InvalidInputRank {
                layer: self.name.clone(),
                expected: 4,
                got: x.shape.clone(),
            });
        }
        Ok(())
    }
}

impl Layer for MaxPool2d {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(
        &mut self,
        input_shape: &[usize],
        _index: usize,
        _ledger: &mut RegularizationLedger,
    ) -> Result<Vec<usize>> {
        if input_shape.len() != 3 {
            return Err(MaskError::InvalidInputRank {
                layer: self.name.clone(),
                expected: 3,
                got: input_shape.to_vec(),
            });
        }
        let out_h = pooled_extent(input_shape[0], self.kernel, self.stride);
        let out_w = pooled_extent(input_shape[1], self.kernel, self.stride);
        if out_h == 0 || out_w == 0 {
            return Err(MaskError::InvalidArchitecture {
                reason: format!(
                    "{}: input {:?} is smaller than the {}x{} pooling window",
                    self.name, input_shape, self.kernel, self.kernel
                ),
            });
        }
        Ok(vec![out_h, out_w, input_shape[2]])
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.check(x)?;
        Ok(max_pool2d(x, self.kernel, self.stride).0)
    }

    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor> {
        self.check(x)?;
        let (out, idx) = max_pool2d(x, self.kernel, self.stride);
        self.indices = idx;
        self.input_shape = x.shape.clone();
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> Result<Tensor> {
        if self.input_shape.is_empty() {
            return Err(MaskError::NoForwardPass {
                layer: self.name.clone(),
            });
        }
        Ok(max_pool2d_backward(grad_out, &self.indices, &self.input_shape))
    }

    fn end_pass(&mut self) {
        self.indices.clear();
        self.input_shape.clear();
    }

    fn describe(&self) -> String {
        format!(
            "{}: max pool {}x{} stride {}",
            self.name, self.kernel, self.kernel, self.stride
        )
    }
}
