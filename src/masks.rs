//! Score-to-mask functions.
//!
//! A mask function turns a continuous score tensor into a multiplicative
//! mask of identical shape. The forward passes are hard thresholds, so
//! gradients flow back to the score through straight-through estimators.

use crate::activation::sigmoid;
use crate::error::MaskError;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fraction of the mean absolute score below which `ternary` zeroes an entry.
const TERNARY_THRESHOLD: f32 = 0.7;

/// Closed set of mask functions a layer can be configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskFunction {
    /// Polarity only: `+1` for non-negative scores, `-1` otherwise.
    Flip,
    /// Hard gate: `1` for positive scores, `0` otherwise.
    Mask,
    /// Row-scoped gate: keeps positive scores at or above the mean of their
    /// row (last axis).
    MaskRs,
    /// Gate and polarity combined: the sign of the score.
    MaskFlip,
    /// Hard gate with a sigmoid-shaped surrogate gradient.
    Binary,
    /// `{-1, 0, 1}` with a dead zone scaled to the mean absolute score.
    Ternary,
    /// Four levels `{-1, -0.5, 0.5, 1}`.
    Quaternary,
}

impl MaskFunction {
    pub const ALL: [MaskFunction; 7] = [
        MaskFunction::Flip,
        MaskFunction::Mask,
        MaskFunction::MaskRs,
        MaskFunction::MaskFlip,
        MaskFunction::Binary,
        MaskFunction::Ternary,
        MaskFunction::Quaternary,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            MaskFunction::Flip => "flip",
            MaskFunction::Mask => "mask",
            MaskFunction::MaskRs => "mask_rs",
            MaskFunction::MaskFlip => "mask_flip",
            MaskFunction::Binary => "binary",
            MaskFunction::Ternary => "ternary",
            MaskFunction::Quaternary => "quaternary",
        }
    }

    /// Values this function may emit.
    pub fn levels(&self) -> &'static [f32] {
        match self {
            MaskFunction::Mask | MaskFunction::MaskRs | MaskFunction::Binary => &[0.0, 1.0],
            MaskFunction::Flip => &[-1.0, 1.0],
            MaskFunction::MaskFlip | MaskFunction::Ternary => &[-1.0, 0.0, 1.0],
            MaskFunction::Quaternary => &[-1.0, -0.5, 0.5, 1.0],
        }
    }

    /// Whether `v` lies in this function's output range.
    pub fn admissible(&self, v: f32) -> bool {
        self.levels().contains(&v)
    }

    /// Realize the mask for `score`.
    pub fn apply(&self, score: &Tensor) -> Tensor {
        match self {
            MaskFunction::Mask | MaskFunction::Binary => {
                score.map(|s| if s > 0.0 { 1.0 } else { 0.0 })
            }
            MaskFunction::Flip => score.map(|s| if s >= 0.0 { 1.0 } else { -1.0 }),
            MaskFunction::MaskFlip => score.map(|s| {
                if s > 0.0 {
                    1.0
                } else if s < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }),
            MaskFunction::MaskRs => {
                let cols = score.shape.last().copied().unwrap_or(1).max(1);
                let mut out = Tensor::zeros_like(score);
                for (o_row, s_row) in out.data.chunks_mut(cols).zip(score.data.chunks(cols)) {
                    let mean = s_row.iter().sum::<f32>() / s_row.len() as f32;
                    for (o, &s) in o_row.iter_mut().zip(s_row) {
                        if s > 0.0 && s >= mean {
                            *o = 1.0;
                        }
                    }
                }
                out
            }
            MaskFunction::Ternary => {
                let delta = TERNARY_THRESHOLD * mean_abs(score);
                score.map(|s| {
                    if s.abs() > delta {
                        s.signum()
                    } else {
                        0.0
                    }
                })
            }
            MaskFunction::Quaternary => {
                let pivot = mean_abs(score);
                score.map(|s| {
                    let sign = if s >= 0.0 { 1.0 } else { -1.0 };
                    let magnitude = if s.abs() > pivot { 1.0 } else { 0.5 };
                    sign * magnitude
                })
            }
        }
    }

    /// Surrogate gradient: map `grad_mask` (dL/dmask) to dL/dscore.
    pub fn backward(&self, score: &Tensor, grad_mask: &Tensor) -> Tensor {
        assert_eq!(score.shape, grad_mask.shape);
        match self {
            MaskFunction::Flip
            | MaskFunction::Mask
            | MaskFunction::MaskRs
            | MaskFunction::MaskFlip => grad_mask.clone(),
            MaskFunction::Binary => {
                let mut out = grad_mask.clone();
                for (g, &s) in out.data.iter_mut().zip(&score.data) {
                    let p = sigmoid(s);
                    *g *= 4.0 * p * (1.0 - p);
                }
                out
            }
            MaskFunction::Ternary | MaskFunction::Quaternary => {
                let mut out = grad_mask.clone();
                for (g, &s) in out.data.iter_mut().zip(&score.data) {
                    if s.abs() > 1.0 {
                        *g = 0.0;
                    }
                }
                out
            }
        }
    }
}

fn mean_abs(t: &Tensor) -> f32 {
    if t.is_empty() {
        return 0.0;
    }
    t.data.iter().map(|v| v.abs()).sum::<f32>() / t.len() as f32
}

impl FromStr for MaskFunction {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MaskFunction::ALL
            .iter()
            .copied()
            .find(|m| m.tag() == s)
            .ok_or_else(|| MaskError::UnknownTag {
                kind: "mask function",
                tag: s.to_string(),
            })
    }
}

impl fmt::Display for MaskFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
