//! Training objective pieces: the sparsity regularizers each masked layer
//! registers at build time, and the classification loss of the softmax head.

use crate::error::{MaskError, Result};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

const LOG_EPS: f32 = 1e-9;

/// Shared `(alpha, beta, gamma)` coefficients handed to every layer of a
/// network. The dense variant only reads `alpha`.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct RegularizationCoefficients {
    #[serde(default)]
    pub alpha: f32,
    #[serde(default)]
    pub beta: f32,
    #[serde(default)]
    pub gamma: f32,
}

impl RegularizationCoefficients {
    pub fn new(alpha: f32, beta: f32, gamma: f32) -> Self {
        Self { alpha, beta, gamma }
    }

    /// Coefficients for a dense-only network.
    pub fn alpha_only(alpha: f32) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }

    /// Regularizer used by the convolutional variant, if any.
    pub fn conv_regularizer(&self) -> Option<Regularizer> {
        (self.alpha != 0.0).then_some(Regularizer::Affine {
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
        })
    }

    /// Regularizer used by the dense variant, if any.
    pub fn dense_regularizer(&self) -> Option<Regularizer> {
        (self.alpha != 0.0).then_some(Regularizer::ScaledMean { alpha: self.alpha })
    }
}

/// Sparsity penalty computed from a realized mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Regularizer {
    /// `alpha * (beta + gamma * mean(mask))`
    Affine { alpha: f32, beta: f32, gamma: f32 },
    /// `alpha * mean(mask)`
    ScaledMean { alpha: f32 },
}

impl Regularizer {
    pub fn evaluate(&self, mask: &Tensor) -> f32 {
        match *self {
            Regularizer::Affine { alpha, beta, gamma } => alpha * (beta + gamma * mask.mean()),
            Regularizer::ScaledMean { alpha } => alpha * mask.mean(),
        }
    }

    /// d(penalty)/d(mask), constant across elements.
    pub fn mask_gradient(&self, mask: &Tensor) -> Tensor {
        let n = mask.len().max(1) as f32;
        let slope = match *self {
            Regularizer::Affine { alpha, gamma, .. } => alpha * gamma,
            Regularizer::ScaledMean { alpha } => alpha,
        };
        Tensor::full(mask.shape.clone(), slope / n)
    }
}

/// A regularizer registered by the layer at `layer` (index into the
/// owning network's layer list).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossTerm {
    pub layer: usize,
    pub regularizer: Regularizer,
}

/// Append-only list of the regularization terms of one network.
///
/// Layers push their term once, when they are built. Terms are never
/// replaced or removed.
#[derive(Clone, Debug, Default)]
pub struct RegularizationLedger {
    terms: Vec<LossTerm>,
}

impl RegularizationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, layer: usize, regularizer: Regularizer) {
        log::debug!("layer {layer} registered regularizer {regularizer:?}");
        self.terms.push(LossTerm { layer, regularizer });
    }

    pub fn terms(&self) -> &[LossTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Sum every term, looking up each layer's realized mask through `mask_of`.
    pub fn total<F>(&self, mut mask_of: F) -> Result<f32>
    where
        F: FnMut(usize) -> Result<Tensor>,
    {
        self.terms
            .iter()
            .map(|t| mask_of(t.layer).map(|m| t.regularizer.evaluate(&m)))
            .sum()
    }
}

/// Mean categorical cross-entropy of softmax outputs `probs` (`[batch,
/// classes]`) against integer `targets`, one per row.
///
/// Returns the loss and its gradient with respect to `probs`.
pub fn categorical_cross_entropy(probs: &Tensor, targets: &[usize]) -> Result<(f32, Tensor)> {
    let classes = probs.shape.last().copied().unwrap_or(1).max(1);
    let rows = probs.len() / classes;
    if targets.len() != rows {
        return Err(MaskError::ShapeMismatch {
            expected: vec![rows],
            got: vec![targets.len()],
        });
    }
    let mut grad = Tensor::zeros_like(probs);
    if rows == 0 {
        return Ok((0.0, grad));
    }
    let mut loss = 0.0f32;
    for (row, &target) in targets.iter().enumerate() {
        if target >= classes {
            return Err(MaskError::InvalidTarget {
                row,
                target,
                classes,
            });
        }
        let idx = row * classes + target;
        let p = probs.data[idx] + LOG_EPS;
        loss -= p.ln();
        grad.data[idx] = -1.0 / (p * rows as f32);
    }
    Ok((loss / rows as f32, grad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_alpha_registers_nothing() {
        let c = RegularizationCoefficients::new(0.0, 1.0, 2.0);
        assert!(c.conv_regularizer().is_none());
        assert!(c.dense_regularizer().is_none());
    }

    #[test]
    fn affine_and_scaled_mean_differ() {
        let mask = Tensor::new(vec![1.0, 0.0, 1.0, 1.0], vec![2, 2]);
        let affine = Regularizer::Affine {
            alpha: 0.5,
            beta: 1.0,
            gamma: 2.0,
        };
        let scaled = Regularizer::ScaledMean { alpha: 0.5 };
        assert!((affine.evaluate(&mask) - 0.5 * (1.0 + 2.0 * 0.75)).abs() < 1e-6);
        assert!((scaled.evaluate(&mask) - 0.375).abs() < 1e-6);
    }

    #[test]
    fn cross_entropy_of_confident_prediction_is_small() {
        let probs = Tensor::new(vec![0.99, 0.01], vec![1, 2]);
        let (loss, grad) = categorical_cross_entropy(&probs, &[0]).unwrap();
        assert!(loss < 0.02);
        assert!(grad.data[0] < 0.0);
        assert_eq!(grad.data[1], 0.0);
    }

    #[test]
    fn ledger_sums_terms_over_their_masks() {
        let mut ledger = RegularizationLedger::new();
        ledger.register(0, Regularizer::ScaledMean { alpha: 1.0 });
        ledger.register(
            2,
            Regularizer::Affine {
                alpha: 0.5,
                beta: 1.0,
                gamma: 1.0,
            },
        );
        let masks = [
            Tensor::new(vec![1.0, 0.0], vec![2]),
            Tensor::zeros(vec![2]),
            Tensor::new(vec![1.0, 1.0], vec![2]),
        ];
        let total = ledger.total(|i| Ok(masks[i].clone())).unwrap();
        assert!((total - (0.5 + 1.0)).abs() < 1e-6);

        let missing = ledger.total(|i| {
            Err(MaskError::NotBuilt {
                layer: i.to_string(),
            })
        });
        assert!(matches!(missing, Err(MaskError::NotBuilt { .. })));
    }

    #[test]
    fn cross_entropy_needs_one_target_per_row() {
        let probs = Tensor::new(vec![0.5, 0.5, 0.9, 0.1], vec![2, 2]);
        assert_eq!(
            categorical_cross_entropy(&probs, &[0]).unwrap_err(),
            MaskError::ShapeMismatch {
                expected: vec![2],
                got: vec![1]
            }
        );
    }

    #[test]
    fn cross_entropy_rejects_out_of_range_target() {
        // index 2 would land on the next row's first probability
        let probs = Tensor::new(vec![0.5, 0.5, 0.9, 0.1], vec![2, 2]);
        assert_eq!(
            categorical_cross_entropy(&probs, &[2, 0]).unwrap_err(),
            MaskError::InvalidTarget {
                row: 0,
                target: 2,
                classes: 2
            }
        );
    }
}
