use crate::error::MaskError;
use crate::math::Matrix;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const LEAKY_SLOPE: f32 = 0.01;

/// Post-computation nonlinearity applied by a masked layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    pub fn tag(&self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::Relu => "relu",
            Activation::LeakyRelu => "leaky_relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
        }
    }

    /// Apply the activation. Softmax normalises over the last axis.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        match self {
            Activation::Linear => x.clone(),
            Activation::Relu => x.map(|v| v.max(0.0)),
            Activation::LeakyRelu => x.map(|v| if v < 0.0 { LEAKY_SLOPE * v } else { v }),
            Activation::Sigmoid => x.map(sigmoid),
            Activation::Tanh => x.map(f32::tanh),
            Activation::Softmax => {
                let cols = x.shape.last().copied().unwrap_or(1).max(1);
                let rows = x.len() / cols;
                let m = Matrix::from_vec(rows, cols, x.data.clone());
                Tensor::new(m.softmax_rows().data, x.shape.clone())
            }
        }
    }

    /// Gradient with respect to the pre-activation, given the cached
    /// pre-activation `z`, the cached output `y` and the upstream `grad`.
    pub fn backward(&self, z: &Tensor, y: &Tensor, grad: &Tensor) -> Tensor {
        let mut out = grad.clone();
        match self {
            Activation::Linear => {}
            Activation::Relu => {
                for (g, &v) in out.data.iter_mut().zip(&z.data) {
                    if v <= 0.0 {
                        *g = 0.0;
                    }
                }
            }
            Activation::LeakyRelu => {
                for (g, &v) in out.data.iter_mut().zip(&z.data) {
                    if v < 0.0 {
                        *g *= LEAKY_SLOPE;
                    }
                }
            }
            Activation::Sigmoid => {
                for (g, &s) in out.data.iter_mut().zip(&y.data) {
                    *g *= s * (1.0 - s);
                }
            }
            Activation::Tanh => {
                for (g, &t) in out.data.iter_mut().zip(&y.data) {
                    *g *= 1.0 - t * t;
                }
            }
            Activation::Softmax => {
                let cols = y.shape.last().copied().unwrap_or(1).max(1);
                for (g_row, s_row) in out.data.chunks_mut(cols).zip(y.data.chunks(cols)) {
                    let dot: f32 = g_row.iter().zip(s_row).map(|(g, s)| g * s).sum();
                    for (g, &s) in g_row.iter_mut().zip(s_row) {
                        *g = s * (*g - dot);
                    }
                }
            }
        }
        out
    }
}

pub(crate) fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

impl FromStr for Activation {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" | "identity" => Ok(Activation::Linear),
            "relu" => Ok(Activation::Relu),
            "leaky_relu" => Ok(Activation::LeakyRelu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "softmax" => Ok(Activation::Softmax),
            other => Err(MaskError::UnknownTag {
                kind: "activation",
                tag: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = Tensor::new(vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0], vec![2, 3]);
        let y = Activation::Softmax.forward(&x);
        for row in y.data.chunks(3) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn relu_backward_gates_on_preactivation() {
        let z = Tensor::new(vec![-1.0, 2.0], vec![1, 2]);
        let y = Activation::Relu.forward(&z);
        let g = Activation::Relu.backward(&z, &y, &Tensor::new(vec![1.0, 1.0], vec![1, 2]));
        assert_eq!(g.data, vec![0.0, 1.0]);
    }

    #[test]
    fn identity_is_an_alias_for_linear() {
        assert_eq!("identity".parse::<Activation>().unwrap(), Activation::Linear);
        assert!("swish".parse::<Activation>().is_err());
    }
}
