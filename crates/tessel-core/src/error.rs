use thiserror::Error;

use crate::dtype::DType;

/// Errors raised by tensor construction and the transfer kernels.
///
/// Shape, axis and dtype problems are always detected before any output
/// element is written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TesselError {
    #[error("{what} is out of range: {value} (rank {ndim})")]
    AxisOutOfRange {
        what: &'static str,
        value: isize,
        ndim: usize,
    },

    #[error("{context}: shape mismatch, expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("{context}: rank {ndim} exceeds limit {limit}")]
    Rank {
        context: &'static str,
        ndim: usize,
        limit: usize,
    },

    #[error("index {index} is out of range for axis {axis} with size {size}")]
    IndexOutOfRange { index: i64, size: usize, axis: usize },

    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("{context}: unsupported dtype {dtype}")]
    UnsupportedDType { context: &'static str, dtype: DType },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot reshape {numel} elements into {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<isize> },

    #[error("storage error: {0}")]
    Storage(String),
}

impl TesselError {
    /// Build a [`TesselError::ShapeMismatch`] from two shape slices.
    pub fn shape(context: &'static str, expected: &[usize], got: &[usize]) -> Self {
        TesselError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}
