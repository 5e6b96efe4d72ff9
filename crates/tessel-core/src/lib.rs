//! # tessel-core
//!
//! Tensor value type for the tessel transfer engine.
//!
//! Provides the foundational `Tensor` type with:
//! - Every element type the kernels move (bool, 8-64 bit integers, f32/f64, complex)
//! - A flat, row-major, copy-on-write buffer with strides cached at construction
//! - Zero-copy views (reshape, transpose)
//! - Axis normalization and the error taxonomy shared by every kernel

pub mod dtype;
pub mod element;
pub mod storage;
pub mod shape;
pub mod tensor;
pub mod error;
pub mod prelude;

pub use dtype::DType;
pub use element::{Bool8, Element};
pub use storage::Storage;
pub use shape::{normalize_axis, normalize_batch_dims, Shape};
pub use tensor::Tensor;
pub use error::TesselError;
pub use num_complex::Complex;

pub type Result<T> = std::result::Result<T, TesselError>;
