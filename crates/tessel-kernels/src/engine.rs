//! The transfer engine: a [`TransferConfig`] plus the public entry points.
//!
//! The operations themselves are implemented next to their kernels
//! (`gather`, `scatter`, `im2col`); this module holds the engine type and
//! the checks they share.

use tessel_core::{DType, Element, Result, Tensor, TesselError};

use crate::config::TransferConfig;
use crate::window::WindowParams;

/// Runs gather/scatter and im2col/col2im under one configuration.
///
/// ```
/// use tessel_core::Tensor;
/// use tessel_kernels::{IndexPolicy, TransferConfig, TransferEngine};
///
/// let engine = TransferEngine::new(TransferConfig::default().with_index_policy(IndexPolicy::Clip));
/// let params = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
/// let idx = Tensor::from_i64(&[5, 0], &[2]);
/// let out = engine.gather(&params, &idx, None, 0).unwrap();
/// assert_eq!(out.as_f32_slice().unwrap(), &[3.0, 1.0]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransferEngine {
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Engine configured from `TESSEL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(TransferConfig::from_env()?))
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Free functions (default configuration)
// ---------------------------------------------------------------------------

/// [`TransferEngine::gather`] with the default configuration.
pub fn gather(params: &Tensor, indices: &Tensor, axis: Option<isize>, batch_dims: isize) -> Result<Tensor> {
    TransferEngine::default().gather(params, indices, axis, batch_dims)
}

/// [`TransferEngine::gather_nd`] with the default configuration.
pub fn gather_nd(params: &Tensor, indices: &Tensor, batch_dims: isize) -> Result<Tensor> {
    TransferEngine::default().gather_nd(params, indices, batch_dims)
}

/// [`TransferEngine::scatter`] with the default configuration.
pub fn scatter(
    indices: &Tensor,
    updates: &Tensor,
    num_class: usize,
    axis: Option<isize>,
    batch_dims: isize,
) -> Result<Tensor> {
    TransferEngine::default().scatter(indices, updates, num_class, axis, batch_dims)
}

/// [`TransferEngine::scatter_into`] with the default configuration.
pub fn scatter_into(
    indices: &Tensor,
    updates: &Tensor,
    output: &mut Tensor,
    axis: Option<isize>,
    batch_dims: isize,
) -> Result<()> {
    TransferEngine::default().scatter_into(indices, updates, output, axis, batch_dims)
}

/// [`TransferEngine::scatter_add`] with the default configuration.
pub fn scatter_add(indices: &Tensor, updates: &Tensor, output: &mut Tensor, axis: isize) -> Result<()> {
    TransferEngine::default().scatter_add(indices, updates, output, axis)
}

/// [`TransferEngine::scatter_nd`] with the default configuration.
pub fn scatter_nd(indices: &Tensor, updates: &Tensor, shape: &[usize], batch_dims: isize) -> Result<Tensor> {
    TransferEngine::default().scatter_nd(indices, updates, shape, batch_dims)
}

/// [`TransferEngine::scatter_nd_add`] with the default configuration.
pub fn scatter_nd_add(
    indices: &Tensor,
    updates: &Tensor,
    shape: &[usize],
    batch_dims: isize,
) -> Result<Tensor> {
    TransferEngine::default().scatter_nd_add(indices, updates, shape, batch_dims)
}

/// [`TransferEngine::scatter_nd_add_into`] with the default configuration.
pub fn scatter_nd_add_into(
    indices: &Tensor,
    updates: &Tensor,
    output: &mut Tensor,
    batch_dims: isize,
) -> Result<()> {
    TransferEngine::default().scatter_nd_add_into(indices, updates, output, batch_dims)
}

/// [`TransferEngine::im2col`] with the default configuration.
pub fn im2col(image: &Tensor, params: &WindowParams) -> Result<Tensor> {
    TransferEngine::default().im2col(image, params)
}

/// [`TransferEngine::col2im`] with the default configuration.
pub fn col2im(cols: &Tensor, image_out: &mut Tensor, params: &WindowParams) -> Result<()> {
    TransferEngine::default().col2im(cols, image_out, params)
}

/// Both data tensors of a transfer must hold the same element type.
pub(crate) fn check_same_dtype(expected: DType, got: DType) -> Result<()> {
    if expected != got {
        return Err(TesselError::DTypeMismatch { expected, got });
    }
    Ok(())
}

/// A destination tensor must be writable in place.
pub(crate) fn check_writable(output: &Tensor) -> Result<()> {
    if !output.is_contiguous() {
        return Err(TesselError::Storage(
            "output must be contiguous (call .contiguous() first)".into(),
        ));
    }
    Ok(())
}

/// Contiguous element slice of a tensor whose dtype was already checked.
pub(crate) fn slice_of<T: Element>(t: &Tensor) -> Result<&[T]> {
    t.as_slice::<T>().ok_or(TesselError::DTypeMismatch {
        expected: t.dtype(),
        got: T::DTYPE,
    })
}

pub(crate) fn slice_of_mut<T: Element>(t: &mut Tensor) -> Result<&mut [T]> {
    let dtype = t.dtype();
    t.as_slice_mut::<T>().ok_or(TesselError::DTypeMismatch {
        expected: dtype,
        got: T::DTYPE,
    })
}
