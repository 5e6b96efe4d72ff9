//! # tessel
//!
//! Indexed memory transfers over N-dimensional tensors.
//!
//! Re-exports the tensor type from `tessel-core` and the transfer engine from
//! `tessel-kernels`:
//! - `gather` / `gather_nd` read rows addressed by an index table
//! - `scatter`, `scatter_add`, `scatter_nd`, `scatter_nd_add` write them back
//! - `im2col` / `col2im` unfold and fold sliding windows
//!
//! ```
//! use tessel::prelude::*;
//!
//! let params = Tensor::from_i64(&[10, 11, 12, 13], &[4]);
//! let idx = Tensor::from_i64(&[3, 0], &[2]);
//! let out = gather(&params, &idx, None, 0).unwrap();
//! assert_eq!(out.to_vec::<i64>().unwrap(), vec![13, 10]);
//! ```

pub use tessel_core;
pub use tessel_kernels;

pub use tessel_core::{DType, Element, Result, Shape, Tensor, TesselError};
pub use tessel_kernels::{
    col2im, gather, gather_nd, im2col, scatter, scatter_add, scatter_into, scatter_nd,
    scatter_nd_add, scatter_nd_add_into, IndexPolicy, ScatterMode, TransferConfig,
    TransferEngine, WindowParams,
};

pub mod prelude {
    pub use tessel_core::prelude::*;
    pub use tessel_kernels::{
        col2im, gather, gather_nd, im2col, scatter, scatter_add, scatter_nd, scatter_nd_add,
        IndexPolicy, TransferConfig, TransferEngine, WindowParams,
    };
}
