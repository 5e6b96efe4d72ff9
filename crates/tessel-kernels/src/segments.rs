//! Segment decomposition of params/indices shapes.
//!
//! Every index-table transfer views its tensors as
//!
//! ```text
//! params / scatter output     [B.., P.., C, D.., R..]
//! indices                     [B.., X.., R..]
//! gather output / updates     [B.., P.., X.., D.., R..]
//! ```
//!
//! `B` are the batch dims shared with the index tensor, `P` the dims between
//! the batch dims and the class axis, `C` the class axis, `D` the detail dims
//! and `R` the trailing repeat dims, also shared with the index tensor.
//! Expansion mode has an empty `R`; reduction mode has empty `X` and `D`.

use smallvec::SmallVec;
use tessel_core::{Result, TesselError};

/// Where the class axis sits and how the remaining dims are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Class axis in the params/output tensor.
    pub axis: usize,
    /// Leading dims shared with the index tensor.
    pub batch_dims: usize,
    /// End of the detail dims; everything after is a repeat dim.
    pub detail_depth: usize,
}

impl Layout {
    /// Index dims are broadcast into the output in place of `axis`.
    pub fn expansion(axis: usize, batch_dims: usize, rank: usize) -> Self {
        Self { axis, batch_dims, detail_depth: rank }
    }

    /// One index per output element: `out[o, r] = params[o, idx[o, r], r]`.
    pub fn reduction(axis: usize) -> Self {
        Self { axis, batch_dims: axis, detail_depth: axis + 1 }
    }

    pub fn is_reduction(&self) -> bool {
        self.batch_dims == self.axis && self.detail_depth == self.axis + 1
    }

    /// Shape of the broadcast side (gather output, scatter updates).
    pub fn broadcast_shape(&self, params: &[usize], indices: &[usize]) -> Vec<usize> {
        let repeat = params.len().saturating_sub(self.detail_depth);
        let x_end = indices.len().saturating_sub(repeat).max(self.batch_dims);
        let mut shape = Vec::with_capacity(params.len() + indices.len());
        shape.extend_from_slice(&params[..self.axis]);
        shape.extend_from_slice(&indices[self.batch_dims..x_end]);
        shape.extend_from_slice(&params[self.axis + 1..]);
        shape
    }
}

/// Flattened segment sizes of one transfer.
///
/// `outer_size * num_class * detail_size` is the params element count and
/// `outer_size * broadcast_size * detail_size` the broadcast element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segments {
    /// Product of the batch dims.
    pub batch_size: usize,
    /// Product of the batch and prefix dims (`B * P`).
    pub outer_size: usize,
    /// Size of the class axis (or product of the tuple dims in ND mode).
    pub num_class: usize,
    /// Number of index entries per batch, excluding repeat dims.
    pub broadcast_size: usize,
    /// Product of the detail and repeat dims (`D * R`).
    pub detail_size: usize,
    /// Product of the repeat dims.
    pub repeat_size: usize,
}

impl Segments {
    /// Decompose a params shape and an index shape under `layout`.
    pub fn for_gather(params: &[usize], indices: &[usize], layout: &Layout) -> Result<Self> {
        let rank = params.len();
        let Layout { axis, batch_dims, detail_depth } = *layout;

        if axis >= rank {
            return Err(TesselError::AxisOutOfRange {
                what: "axis",
                value: axis as isize,
                ndim: rank,
            });
        }
        if batch_dims > axis {
            return Err(TesselError::InvalidArgument(format!(
                "batch_dims ({batch_dims}) must not exceed axis ({axis})"
            )));
        }
        if detail_depth <= axis || detail_depth > rank {
            return Err(TesselError::InvalidArgument(format!(
                "detail depth {detail_depth} must lie in ({axis}, {rank}]"
            )));
        }

        let repeat = rank - detail_depth;
        if indices.len() < batch_dims + repeat {
            let mut expected = params[..batch_dims].to_vec();
            expected.extend_from_slice(&params[detail_depth..]);
            return Err(TesselError::shape("indices shared dims", &expected, indices));
        }
        if indices[..batch_dims] != params[..batch_dims] {
            return Err(TesselError::shape(
                "batch dims",
                &params[..batch_dims],
                &indices[..batch_dims],
            ));
        }
        let x_end = indices.len() - repeat;
        if indices[x_end..] != params[detail_depth..] {
            return Err(TesselError::shape(
                "repeat dims",
                &params[detail_depth..],
                &indices[x_end..],
            ));
        }

        let batch_size = product(&params[..batch_dims]);
        let repeat_size = product(&params[detail_depth..]);
        Ok(Self {
            batch_size,
            outer_size: product(&params[..axis]),
            num_class: params[axis],
            broadcast_size: product(&indices[batch_dims..x_end]),
            detail_size: product(&params[axis + 1..]),
            repeat_size,
        })
    }

    /// Decompose an ND transfer: the last index dim holds tuples addressing
    /// the `depth` dims of params that follow the batch dims.
    ///
    /// Returns the segments and the addressed class dims.
    pub fn for_nd(
        params: &[usize],
        indices: &[usize],
        batch_dims: usize,
    ) -> Result<(Self, SmallVec<[usize; 4]>)> {
        let Some((&depth, rows)) = indices.split_last() else {
            return Err(TesselError::Rank {
                context: "nd indices need a trailing tuple dim",
                ndim: 0,
                limit: 1,
            });
        };
        if batch_dims > rows.len() {
            return Err(TesselError::AxisOutOfRange {
                what: "batch_dims",
                value: batch_dims as isize,
                ndim: rows.len(),
            });
        }
        if batch_dims + depth > params.len() {
            return Err(TesselError::Rank {
                context: "index tuple depth exceeds params rank",
                ndim: batch_dims + depth,
                limit: params.len(),
            });
        }
        if rows[..batch_dims] != params[..batch_dims] {
            return Err(TesselError::shape(
                "batch dims",
                &params[..batch_dims],
                &rows[..batch_dims],
            ));
        }

        let class_dims = SmallVec::from_slice(&params[batch_dims..batch_dims + depth]);
        let batch_size = product(&params[..batch_dims]);
        let segments = Self {
            batch_size,
            outer_size: batch_size,
            num_class: product(&class_dims),
            broadcast_size: product(&rows[batch_dims..]),
            detail_size: product(&params[batch_dims + depth..]),
            repeat_size: 1,
        };
        Ok((segments, class_dims))
    }

    /// Shape of the broadcast side of an ND transfer.
    pub fn nd_broadcast_shape(params: &[usize], indices: &[usize], batch_dims: usize) -> Vec<usize> {
        let (depth, rows) = match indices.split_last() {
            Some((&depth, rows)) => (depth, rows),
            None => (0, indices),
        };
        let mut shape = rows.to_vec();
        shape.extend_from_slice(&params[(batch_dims + depth).min(params.len())..]);
        shape
    }

    /// `P`, the number of outer blocks per batch.
    pub fn prefix_size(&self) -> usize {
        self.outer_size.checked_div(self.batch_size).unwrap_or(0)
    }

    /// `D`, the number of detail rows per class slice.
    pub fn detail_rows(&self) -> usize {
        self.detail_size.checked_div(self.repeat_size).unwrap_or(0)
    }

    /// Element count of the params (or scatter output) tensor.
    pub fn params_len(&self) -> usize {
        self.outer_size * self.num_class * self.detail_size
    }

    /// Element count of the index tensor, excluding an ND tuple dim.
    pub fn indices_len(&self) -> usize {
        self.batch_size * self.broadcast_size * self.repeat_size
    }

    /// Element count of the gather output (or scatter updates).
    pub fn broadcast_len(&self) -> usize {
        self.outer_size * self.broadcast_size * self.detail_size
    }
}

pub(crate) fn product(dims: &[usize]) -> usize {
    dims.iter().product()
}
