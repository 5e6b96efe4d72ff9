//! # tessel-kernels
//!
//! Indexed memory transfer between tensors.
//!
//! Provides:
//! - Index-table transfers: gather, gatherND, scatter, scatterAdd,
//!   scatterND, scatterNDAdd
//! - Window-addressed transfers: im2col and col2im for 1-3 spatial dims
//! - Segment decomposition and the flat offset calculator they share
//! - Rayon scheduling with per-partition reduction for accumulating ops
//!
//! Every entry point is available as a free function (default
//! [`TransferConfig`]) and as a method on [`TransferEngine`].
//!
//! ```
//! use tessel_core::Tensor;
//!
//! let params = Tensor::from_i64(&[10, 11, 12, 13, 14, 15, 16, 17, 18, 19], &[10]);
//! let idx = Tensor::from_i64(&[3, 2, 1, 1], &[4]);
//! let out = tessel_kernels::gather(&params, &idx, None, 0).unwrap();
//! assert_eq!(out.as_slice::<i64>().unwrap(), &[13, 12, 11, 11]);
//! ```

pub mod config;
pub mod engine;
pub mod gather;
pub mod im2col;
pub mod index;
pub mod offset;
pub mod scatter;
pub mod segments;
pub mod window;

mod schedule;

pub use config::{IndexPolicy, TransferConfig};
pub use engine::{
    col2im, gather, gather_nd, im2col, scatter, scatter_add, scatter_into, scatter_nd,
    scatter_nd_add, scatter_nd_add_into, TransferEngine,
};
pub use offset::offset;
pub use scatter::ScatterMode;
pub use segments::{Layout, Segments};
pub use window::{WindowGeometry, WindowParams};
