//! Seeded parameter initializers.
//!
//! Every initializer is a pure function of `(shape, seed, p1)`: the same
//! triple always produces the same tensor.

use crate::error::MaskError;
use crate::rng::rng_from_seed;
use crate::tensor::Tensor;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Normal, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound of the score initializer.
pub const SCORE_MIN: f32 = 0.01;
/// Upper bound of the score initializer.
pub const SCORE_MAX: f32 = 0.1;

const NORMAL_STDDEV: f32 = 0.05;
/// The dense variant centres its `normal` weights away from zero.
pub const DENSE_NORMAL_MEAN: f32 = 0.1;
const UNIFORM_LIMIT: f32 = 0.05;
/// Stddev of a standard normal truncated at two standard deviations.
const TRUNCATION_CORRECTION: f32 = 0.879_625_66;

/// Closed set of weight initializers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    Normal,
    Glorot,
    He,
    /// Signed constant `±p1 * sqrt(2 / fan_in)`.
    Heconstant,
    Mynormal,
    Myuniform,
    /// Signed constant `±p1`.
    Binary,
    Ternary,
    Quaternary,
    Ones,
    Uniform,
}

impl Initializer {
    pub const ALL: [Initializer; 11] = [
        Initializer::Normal,
        Initializer::Glorot,
        Initializer::He,
        Initializer::Heconstant,
        Initializer::Mynormal,
        Initializer::Myuniform,
        Initializer::Binary,
        Initializer::Ternary,
        Initializer::Quaternary,
        Initializer::Ones,
        Initializer::Uniform,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Initializer::Normal => "normal",
            Initializer::Glorot => "glorot",
            Initializer::He => "he",
            Initializer::Heconstant => "heconstant",
            Initializer::Mynormal => "mynormal",
            Initializer::Myuniform => "myuniform",
            Initializer::Binary => "binary",
            Initializer::Ternary => "ternary",
            Initializer::Quaternary => "quaternary",
            Initializer::Ones => "ones",
            Initializer::Uniform => "uniform",
        }
    }

    /// Whether `p1` influences the generated tensor.
    pub fn uses_p1(&self) -> bool {
        matches!(self, Initializer::Heconstant | Initializer::Binary)
    }

    /// Produce a tensor of `shape`, deterministic in `seed`.
    pub fn generate(&self, shape: &[usize], seed: u64, p1: f32) -> Tensor {
        let (fan_in, fan_out) = fans(shape);
        let he_std = (2.0 / fan_in as f32).sqrt();
        let mut rng = rng_from_seed(seed);
        match self {
            Initializer::Normal => random_normal(shape, 0.0, NORMAL_STDDEV, seed),
            Initializer::Glorot => {
                truncated_normal(shape, (2.0 / (fan_in + fan_out) as f32).sqrt(), &mut rng)
            }
            Initializer::He => truncated_normal(shape, he_std, &mut rng),
            Initializer::Heconstant => signed_levels(shape, &[-p1 * he_std, p1 * he_std], &mut rng),
            Initializer::Mynormal => random_normal(shape, 0.0, (1.0 / fan_in as f32).sqrt(), seed),
            Initializer::Myuniform => {
                let limit = 1.0 / (fan_in as f32).sqrt();
                random_uniform(shape, -limit, limit, seed)
            }
            Initializer::Binary => signed_levels(shape, &[-p1, p1], &mut rng),
            Initializer::Ternary => signed_levels(shape, &[-he_std, 0.0, he_std], &mut rng),
            Initializer::Quaternary => signed_levels(
                shape,
                &[-he_std, -0.5 * he_std, 0.5 * he_std, he_std],
                &mut rng,
            ),
            Initializer::Ones => Tensor::full(shape.to_vec(), 1.0),
            Initializer::Uniform => random_uniform(shape, -UNIFORM_LIMIT, UNIFORM_LIMIT, seed),
        }
    }
}

/// Kernel initialization for the dense variant, which shifts the `normal`
/// initializer to [`DENSE_NORMAL_MEAN`].
pub fn dense_kernel(init: Initializer, shape: &[usize], seed: u64, p1: f32) -> Tensor {
    match init {
        Initializer::Normal => random_normal(shape, DENSE_NORMAL_MEAN, NORMAL_STDDEV, seed),
        other => other.generate(shape, seed, p1),
    }
}

/// Score initialization shared by every masked layer.
pub fn score(shape: &[usize], seed: u64) -> Tensor {
    random_uniform(shape, SCORE_MIN, SCORE_MAX, seed)
}

/// `(fan_in, fan_out)` for dense `(in, out)` and conv `(kh, kw, cin, f)`
/// shapes. Never returns zero.
pub fn fans(shape: &[usize]) -> (usize, usize) {
    let (fan_in, fan_out) = match shape {
        [] => (1, 1),
        [n] => (*n, *n),
        [fan_in, fan_out] => (*fan_in, *fan_out),
        _ => {
            let receptive: usize = shape[..shape.len() - 2].iter().product();
            (
                shape[shape.len() - 2] * receptive,
                shape[shape.len() - 1] * receptive,
            )
        }
    };
    (fan_in.max(1), fan_out.max(1))
}

pub fn random_normal(shape: &[usize], mean: f32, stddev: f32, seed: u64) -> Tensor {
    let mut rng = rng_from_seed(seed);
    let len: usize = shape.iter().product();
    let data = match Normal::new(mean, stddev) {
        Ok(dist) => (0..len).map(|_| dist.sample(&mut rng)).collect(),
        Err(_) => vec![mean; len],
    };
    Tensor::new(data, shape.to_vec())
}

pub fn random_uniform(shape: &[usize], low: f32, high: f32, seed: u64) -> Tensor {
    let mut rng = rng_from_seed(seed);
    let len: usize = shape.iter().product();
    let data = if low < high {
        let dist = Uniform::new(low, high);
        (0..len).map(|_| dist.sample(&mut rng)).collect()
    } else {
        vec![low; len]
    };
    Tensor::new(data, shape.to_vec())
}

/// Normal samples redrawn until they fall within two standard deviations,
/// rescaled so the truncated distribution has stddev `stddev`.
fn truncated_normal(shape: &[usize], stddev: f32, rng: &mut StdRng) -> Tensor {
    let len: usize = shape.iter().product();
    let scale = stddev / TRUNCATION_CORRECTION;
    let data = (0..len)
        .map(|_| loop {
            let z: f32 = rng.sample(StandardNormal);
            if z.abs() <= 2.0 {
                break z * scale;
            }
        })
        .collect();
    Tensor::new(data, shape.to_vec())
}

/// Each element drawn uniformly from `levels`.
fn signed_levels(shape: &[usize], levels: &[f32], rng: &mut StdRng) -> Tensor {
    let len: usize = shape.iter().product();
    let data = (0..len)
        .map(|_| levels[rng.gen_range(0..levels.len())])
        .collect();
    Tensor::new(data, shape.to_vec())
}

impl FromStr for Initializer {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Initializer::ALL
            .iter()
            .copied()
            .find(|i| i.tag() == s)
            .ok_or_else(|| MaskError::UnknownTag {
                kind: "initializer",
                tag: s.to_string(),
            })
    }
}

impl fmt::Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
