use std::fmt;

/// Errors raised while configuring, building or driving masked layers.
///
/// Every variant is a configuration or programming error; nothing in this
/// crate retries or suppresses them.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskError {
    /// A string tag did not name a known mask function, initializer or
    /// activation.
    UnknownTag { kind: &'static str, tag: String },
    /// A replacement tensor disagrees with the established parameter shape.
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    /// The input handed to a layer at build or forward time has the wrong rank.
    InvalidInputRank {
        layer: String,
        expected: usize,
        got: Vec<usize>,
    },
    /// A parameter-dependent operation was called on a layer that has not
    /// been built yet.
    NotBuilt { layer: String },
    /// `backward` was called without a preceding `forward_train`.
    NoForwardPass { layer: String },
    /// A class target does not index into the network's output.
    InvalidTarget { row: usize, target: usize, classes: usize },
    /// The architecture descriptor cannot produce a network.
    InvalidArchitecture { reason: String },
    /// A configuration file could not be read or parsed.
    Config { path: String, reason: String },
}

impl fmt::Display for MaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskError::UnknownTag { kind, tag } => {
                write!(f, "unknown {kind} '{tag}'")
            }
            MaskError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected:?}, got {got:?}")
            }
            MaskError::InvalidInputRank {
                layer,
                expected,
                got,
            } => write!(
                f,
                "layer '{layer}' expects an input of rank {expected}, got shape {got:?}"
            ),
            MaskError::NotBuilt { layer } => {
                write!(f, "layer '{layer}' has not been built")
            }
            MaskError::NoForwardPass { layer } => {
                write!(f, "layer '{layer}' has no cached forward pass to differentiate")
            }
            MaskError::InvalidTarget {
                row,
                target,
                classes,
            } => write!(
                f,
                "target {target} in row {row} is out of range for {classes} classes"
            ),
            MaskError::InvalidArchitecture { reason } => {
                write!(f, "invalid architecture: {reason}")
            }
            MaskError::Config { path, reason } => {
                write!(f, "failed to load config '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for MaskError {}

pub type Result<T> = std::result::Result<T, MaskError>;
