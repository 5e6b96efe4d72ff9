use std::sync::Arc;

use crate::element::Element;
use crate::{DType, Result, TesselError};

/// Backing words for a CPU buffer.
///
/// The buffer is kept as `u64` words so every element type (alignment ≤ 8)
/// can be viewed through `bytemuck` without a misalignment panic.
#[derive(Debug, Clone)]
struct Buffer {
    words: Vec<u64>,
    nbytes: usize,
}

impl Buffer {
    fn zeroed(nbytes: usize) -> Self {
        Self {
            words: vec![0u64; nbytes.div_ceil(8)],
            nbytes,
        }
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.nbytes]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.nbytes]
    }
}

/// Shared, reference-counted, flat tensor storage.
///
/// Clones share one buffer; the first mutable access through a shared handle
/// copies it (copy-on-write).
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<Buffer>,
    dtype: DType,
    /// Number of logical elements (not bytes).
    numel: usize,
}

impl Storage {
    /// Allocate zeroed storage for `numel` elements of the given dtype.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        Self {
            data: Arc::new(Buffer::zeroed(dtype.storage_bytes(numel))),
            dtype,
            numel,
        }
    }

    /// Create storage holding a copy of `data`.
    pub fn from_slice<T: Element>(data: &[T]) -> Self {
        let mut storage = Self::zeros(T::DTYPE, data.len());
        Arc::make_mut(&mut storage.data)
            .bytes_mut()
            .copy_from_slice(bytemuck::cast_slice(data));
        storage
    }

    /// Create storage from raw bytes.
    pub fn from_bytes(dtype: DType, numel: usize, bytes: &[u8]) -> Result<Self> {
        let expected = dtype.storage_bytes(numel);
        if bytes.len() != expected {
            return Err(TesselError::Storage(format!(
                "expected {} bytes for {} elements of {}, got {}",
                expected,
                numel,
                dtype,
                bytes.len()
            )));
        }
        let mut storage = Self::zeros(dtype, numel);
        Arc::make_mut(&mut storage.data).bytes_mut().copy_from_slice(bytes);
        Ok(storage)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        self.data.nbytes
    }

    /// Read-only view of the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    /// Mutable view of the raw bytes (copy-on-write).
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).bytes_mut()
    }

    /// Interpret storage as a slice of `T`.
    /// Returns None if `T` does not match the storage dtype.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        if self.dtype != T::DTYPE {
            return None;
        }
        Some(bytemuck::cast_slice(self.as_bytes()))
    }

    /// Interpret storage as a mutable slice of `T` (copy-on-write).
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        if self.dtype != T::DTYPE {
            return None;
        }
        Some(bytemuck::cast_slice_mut(self.as_bytes_mut()))
    }

    /// Whether this storage is uniquely owned (no other Arc references).
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }
}
