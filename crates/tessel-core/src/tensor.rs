use std::fmt;

use smallvec::SmallVec;

use crate::dispatch_dtype;
use crate::dtype::DType;
use crate::element::{Bool8, Element};
use crate::error::TesselError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A multi-dimensional array over a flat, row-major buffer.
///
/// Tensors support:
/// - Every [`DType`] including booleans and complex numbers
/// - Zero-copy views (reshape and transpose share storage)
/// - Copy-on-write mutation of shared buffers
///
/// Strides are computed once at construction and carried with the tensor.
///
/// # Examples
///
/// ```
/// use tessel_core::Tensor;
///
/// let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// assert_eq!(t.shape().dims(), &[2, 2]);
/// assert_eq!(t.numel(), 4);
///
/// let flat = t.reshape(&[4]).unwrap();
/// assert_eq!(flat.shape().dims(), &[4]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: SmallVec<[usize; 4]>,
    offset: usize,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a tensor holding a copy of `data` with the given shape.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let s = Shape::new(shape);
        if s.numel() != data.len() {
            return Err(TesselError::ShapeMismatch {
                context: "from_slice",
                expected: vec![s.numel()],
                got: vec![data.len()],
            });
        }
        Ok(Self::from_storage(Storage::from_slice(data), shape))
    }

    /// Create a tensor from an owned vector.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_slice(&data, shape)
    }

    /// Create a tensor from f32 data with the given shape.
    ///
    /// # Panics
    /// Panics if `shape` does not describe `data.len()` elements.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        Self::from_slice_checked(data, shape)
    }

    /// Create a tensor from f64 data with the given shape.
    pub fn from_f64(data: &[f64], shape: &[usize]) -> Self {
        Self::from_slice_checked(data, shape)
    }

    /// Create a tensor from i64 data with the given shape.
    pub fn from_i64(data: &[i64], shape: &[usize]) -> Self {
        Self::from_slice_checked(data, shape)
    }

    /// Create a boolean tensor.
    pub fn from_bool(data: &[bool], shape: &[usize]) -> Self {
        let flags: Vec<Bool8> = data.iter().map(|&b| Bool8::new(b)).collect();
        Self::from_slice_checked(&flags, shape)
    }

    fn from_slice_checked<T: Element>(data: &[T], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "Shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        Self::from_storage(Storage::from_slice(data), shape)
    }

    /// Create a tensor of zeros with the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        Self::from_storage(Storage::zeros(dtype, s.numel()), shape)
    }

    /// Create a 0-rank tensor holding one value.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::from_storage(Storage::from_slice(&[value]), &[])
    }

    /// Create a 1-D f32 tensor with values from `start` to `end` (exclusive).
    ///
    /// # Panics
    /// Panics if `step` is zero.
    pub fn arange_f32(start: f32, end: f32, step: f32) -> Self {
        assert!(step != 0.0, "arange: step must be non-zero");
        let mut data = Vec::new();
        let mut v = start;
        while (step > 0.0 && v < end) || (step < 0.0 && v > end) {
            data.push(v);
            v += step;
        }
        let len = data.len();
        Self::from_f32(&data, &[len])
    }

    /// Create a tensor from pre-built storage and a shape.
    ///
    /// # Panics
    /// Panics if the storage holds a different number of elements.
    pub fn from_storage(storage: Storage, shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(s.numel(), storage.numel(), "storage/shape element count mismatch");
        let strides = s.contiguous_strides();
        Self {
            storage,
            shape: s,
            strides,
            offset: 0,
        }
    }

    /// Underlying storage.
    pub fn storage_ref(&self) -> &Storage {
        &self.storage
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Shape of the tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Strides (in elements, not bytes).
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Whether this tensor is contiguous in memory (row-major).
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0
            && self.storage.numel() == self.numel()
            && self.strides == self.shape.contiguous_strides()
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Element slice of a contiguous tensor. None for views or a dtype mismatch.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_slice::<T>()
    }

    /// Mutable element slice of a contiguous tensor (copy-on-write).
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_slice_mut::<T>()
    }

    /// Get the underlying f32 data as a slice (contiguous tensors only).
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        self.as_slice::<f32>()
    }

    /// Get a single element by logical (row-major) flat index.
    pub fn get<T: Element>(&self, flat_index: usize) -> Option<T> {
        let slice = self.storage.as_slice::<T>()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    /// Copy all elements out in logical row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let slice = self.storage.as_slice::<T>().ok_or(TesselError::DTypeMismatch {
            expected: self.dtype(),
            got: T::DTYPE,
        })?;
        if self.is_contiguous() {
            return Ok(slice.to_vec());
        }
        Ok((0..self.numel())
            .filter_map(|i| self.flat_to_physical(i).map(|p| slice[p]))
            .collect())
    }

    /// Convert a logical flat index to a physical storage index.
    fn flat_to_physical(&self, flat_index: usize) -> Option<usize> {
        if flat_index >= self.numel() {
            return None;
        }

        let mut remaining = flat_index;
        let mut physical = self.offset;
        for (&dim, &stride) in self.shape.dims().iter().zip(self.strides.iter()).rev() {
            physical += (remaining % dim) * stride;
            remaining /= dim;
        }
        Some(physical)
    }

    // =========================================================================
    // Shape operations (zero-copy views)
    // =========================================================================

    /// Reshape the tensor (zero-copy, contiguous tensors only).
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let resolved = self.shape.resolve_reshape(new_shape).ok_or_else(|| {
            TesselError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.to_vec(),
            }
        })?;

        if !self.is_contiguous() {
            return Err(TesselError::Storage(
                "cannot reshape non-contiguous tensor (call .contiguous() first)".into(),
            ));
        }

        let strides = resolved.contiguous_strides();
        Ok(Tensor {
            storage: self.storage.clone(), // Arc clone, shared data
            shape: resolved,
            strides,
            offset: self.offset,
        })
    }

    /// Transpose the last two dimensions (zero-copy view).
    pub fn transpose(&self) -> Result<Tensor> {
        let new_shape = self.shape.transpose().ok_or(TesselError::Rank {
            context: "transpose requires at least 2 dimensions",
            ndim: self.ndim(),
            limit: 2,
        })?;

        let ndim = self.ndim();
        let mut new_strides = self.strides.clone();
        new_strides.swap(ndim - 2, ndim - 1);

        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
            strides: new_strides,
            offset: self.offset,
        })
    }

    /// Return a contiguous copy of this tensor if it isn't already contiguous.
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            return self.clone();
        }
        dispatch_dtype!(self.dtype(), T => {
            let data: Vec<T> = self.to_vec::<T>().unwrap_or_default();
            Tensor::from_storage(Storage::from_slice(&data), self.shape.dims())
        })
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, contiguous={})",
            self.shape,
            self.dtype(),
            self.is_contiguous(),
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.numel() > 20 {
            return write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype());
        }
        dispatch_dtype!(self.dtype(), T => match self.to_vec::<T>() {
            Ok(data) => write!(f, "tensor({:?}, shape={})", data, self.shape),
            Err(_) => write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype()),
        })
    }
}
