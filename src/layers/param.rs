use crate::error::{MaskError, Result};
use crate::masks::MaskFunction;
use crate::tensor::Tensor;

/// One trainable tensor together with its gradient and Adam statistics.
///
/// The optimizer state lives next to the value so that it persists across
/// iterations without a separate registry.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub value: Tensor,
    pub grad: Tensor,
    pub trainable: bool,
    m: Tensor,
    v: Tensor,
    t: usize,
}

impl Parameter {
    pub fn new(value: Tensor, trainable: bool) -> Self {
        let grad = Tensor::zeros_like(&value);
        let m = Tensor::zeros_like(&value);
        let v = Tensor::zeros_like(&value);
        Self {
            value,
            grad,
            trainable,
            m,
            v,
            t: 0,
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad.data.iter_mut().for_each(|g| *g = 0.0);
    }

    pub fn accumulate(&mut self, grad: &Tensor) {
        self.grad.add_assign(grad);
    }

    /// Plain gradient descent. Frozen parameters are left untouched.
    pub fn sgd_step(&mut self, lr: f32, weight_decay: f32) {
        if !self.trainable {
            return;
        }
        for (w, &g) in self.value.data.iter_mut().zip(&self.grad.data) {
            let g = g + weight_decay * *w;
            *w -= lr * g;
        }
    }

    /// Bias-corrected Adam step. Frozen parameters are left untouched.
    pub fn adam_step(&mut self, lr: f32, beta1: f32, beta2: f32, eps: f32, weight_decay: f32) {
        if !self.trainable {
            return;
        }
        self.t += 1;
        let bc1 = 1.0 - beta1.powi(self.t as i32);
        let bc2 = 1.0 - beta2.powi(self.t as i32);
        for i in 0..self.value.data.len() {
            let g = self.grad.data[i] + weight_decay * self.value.data[i];
            self.m.data[i] = beta1 * self.m.data[i] + (1.0 - beta1) * g;
            self.v.data[i] = beta2 * self.v.data[i] + (1.0 - beta2) * g * g;
            let m_hat = self.m.data[i] / bc1;
            let v_hat = self.v.data[i] / bc2;
            self.value.data[i] -= lr * m_hat / (v_hat.sqrt() + eps);
        }
    }
}

/// `(nonzero, total, nonzero / total)` over a realized mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PruneStats {
    pub nonzero: usize,
    pub total: usize,
    pub fraction: f32,
}

impl PruneStats {
    pub fn of(mask: &Tensor) -> Self {
        let nonzero = mask.count_nonzero();
        let total = mask.len();
        Self::from_counts(nonzero, total)
    }

    pub fn from_counts(nonzero: usize, total: usize) -> Self {
        let fraction = if total == 0 {
            0.0
        } else {
            nonzero as f32 / total as f32
        };
        Self {
            nonzero,
            total,
            fraction,
        }
    }

    pub fn zeros(&self) -> usize {
        self.total - self.nonzero
    }
}

/// A weight tensor and its score tensor. Both share one shape, fixed at
/// creation, and each carries its own trainability flag.
#[derive(Clone, Debug)]
pub struct MaskedParams {
    pub weight: Parameter,
    pub score: Parameter,
}

impl MaskedParams {
    pub fn new(
        weight: Tensor,
        score: Tensor,
        train_weight: bool,
        train_score: bool,
    ) -> Result<Self> {
        if weight.shape != score.shape {
            return Err(MaskError::ShapeMismatch {
                expected: weight.shape,
                got: score.shape,
            });
        }
        Ok(Self {
            weight: Parameter::new(weight, train_weight),
            score: Parameter::new(score, train_score),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.weight.value.shape
    }

    /// `mask(score)` for the current score.
    pub fn realized_mask(&self, mask_fn: MaskFunction) -> Tensor {
        mask_fn.apply(&self.score.value)
    }

    /// `weight ⊙ mask`.
    pub fn effective_weight(&self, mask: &Tensor) -> Tensor {
        Tensor::hadamard(&self.weight.value, mask)
    }

    /// Overwrite the weight in place. The score and optimizer state are kept.
    pub fn replace_weight(&mut self, weight: Tensor) -> Result<()> {
        if weight.shape != self.weight.value.shape {
            return Err(MaskError::ShapeMismatch {
                expected: self.weight.value.shape.clone(),
                got: weight.shape,
            });
        }
        self.weight.value = weight;
        Ok(())
    }

    /// Route the gradient of the effective weight to weight and score.
    ///
    /// `dW = dE ⊙ M`, `dM = dE ⊙ W`, and `dS` follows from `dM` through the
    /// mask function's surrogate gradient.
    pub fn accumulate_effective_grad(
        &mut self,
        grad_eff: &Tensor,
        mask: &Tensor,
        mask_fn: MaskFunction,
    ) {
        if self.weight.trainable {
            let gw = Tensor::hadamard(grad_eff, mask);
            self.weight.accumulate(&gw);
        }
        if self.score.trainable {
            let gm = Tensor::hadamard(grad_eff, &self.weight.value);
            let gs = mask_fn.backward(&self.score.value, &gm);
            self.score.accumulate(&gs);
        }
    }

    /// Route a gradient taken directly with respect to the mask to the score.
    pub fn accumulate_mask_grad(&mut self, grad_mask: &Tensor, mask_fn: MaskFunction) {
        if self.score.trainable {
            let gs = mask_fn.backward(&self.score.value, grad_mask);
            self.score.accumulate(&gs);
        }
    }

    pub fn zero_grad(&mut self) {
        self.weight.zero_grad();
        self.score.zero_grad();
    }
}
