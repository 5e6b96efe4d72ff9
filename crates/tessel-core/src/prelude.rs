//! Convenience re-exports for common tessel-core types.
//!
//! ```rust
//! use tessel_core::prelude::*;
//! ```

pub use crate::Tensor;
pub use crate::DType;
pub use crate::Element;
pub use crate::Shape;
pub use crate::TesselError;
pub use crate::Result;
