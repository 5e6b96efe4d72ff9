//! Gather and gatherND.
//!
//! Both read whole detail rows out of params at resolved class positions:
//! `out[o, x, d] = params[o, idx[b(o), x], d]`, with the repeat dims of a
//! reduction-mode gather selecting a class per element.

use tessel_core::{
    dispatch_dtype, normalize_axis, normalize_batch_dims, Element, Result, Shape, Tensor,
};
use tracing::debug;

use crate::engine::{slice_of, slice_of_mut, TransferEngine};
use crate::index::{resolve_classes, resolve_tuples};
use crate::schedule::for_each_block;
use crate::segments::{Layout, Segments};

impl TransferEngine {
    /// Gather slices of `params` along an axis.
    ///
    /// - `axis = None`: expansion at `axis = batch_dims`; output shape
    ///   `params[..axis] ++ indices[batch_dims..] ++ params[axis + 1..]`.
    /// - `axis = Some(a)` and `indices.shape == params.shape` without `a`:
    ///   reduction, `out[o, r] = params[o, idx[o, r], r]`.
    /// - otherwise expansion at `a`.
    ///
    /// Negative `axis` / `batch_dims` count from the end.
    pub fn gather(
        &self,
        params: &Tensor,
        indices: &Tensor,
        axis: Option<isize>,
        batch_dims: isize,
    ) -> Result<Tensor> {
        let batch_dims = normalize_batch_dims(batch_dims, indices.ndim())?;
        let layout = select_layout(params.shape(), indices.shape(), axis, batch_dims)?;
        let params_dims = params.shape().dims();
        let index_dims = indices.shape().dims();
        let segments = Segments::for_gather(params_dims, index_dims, &layout)?;
        let out_shape = layout.broadcast_shape(params_dims, index_dims);

        let policy = self.config().index_policy;
        let resolved = resolve_classes(indices, segments.num_class, layout.axis, policy)?;
        resolved.trace_adjusted("gather", policy);

        let parallel = self.config().run_parallel(segments.broadcast_len());
        debug!(
            op = "gather",
            ?segments,
            reduction = layout.is_reduction(),
            parallel,
            "index-table transfer"
        );

        let params = params.contiguous();
        let mut out = Tensor::zeros(&out_shape, params.dtype());
        dispatch_dtype!(params.dtype(), T => gather_kernel::<T>(
            slice_of(&params)?,
            &resolved.positions,
            &segments,
            slice_of_mut(&mut out)?,
            parallel,
        ));
        Ok(out)
    }

    /// Gather slices of `params` addressed by index tuples.
    ///
    /// The last dim of `indices` holds tuples over the params dims that
    /// follow the first `batch_dims`; output shape
    /// `indices[..-1] ++ params[batch_dims + depth..]`.
    pub fn gather_nd(&self, params: &Tensor, indices: &Tensor, batch_dims: isize) -> Result<Tensor> {
        let batch_dims = normalize_batch_dims(batch_dims, indices.ndim().saturating_sub(1))?;
        let params_dims = params.shape().dims();
        let index_dims = indices.shape().dims();
        let (segments, class_dims) = Segments::for_nd(params_dims, index_dims, batch_dims)?;
        let out_shape = Segments::nd_broadcast_shape(params_dims, index_dims, batch_dims);

        let policy = self.config().index_policy;
        let resolved = resolve_tuples(indices, &class_dims, batch_dims, policy)?;
        resolved.trace_adjusted("gather_nd", policy);

        let parallel = self.config().run_parallel(segments.broadcast_len());
        debug!(op = "gather_nd", ?segments, depth = class_dims.len(), parallel, "index-table transfer");

        let params = params.contiguous();
        let mut out = Tensor::zeros(&out_shape, params.dtype());
        dispatch_dtype!(params.dtype(), T => gather_kernel::<T>(
            slice_of(&params)?,
            &resolved.positions,
            &segments,
            slice_of_mut(&mut out)?,
            parallel,
        ));
        Ok(out)
    }
}

/// Pick expansion or reduction mode for a class axis.
///
/// `index_shape` is compared against `data_shape` without the axis; a match
/// means one index per output element.
pub(crate) fn select_layout(
    data_shape: &Shape,
    index_shape: &Shape,
    axis: Option<isize>,
    batch_dims: usize,
) -> Result<Layout> {
    let rank = data_shape.ndim();
    match axis {
        None => Ok(Layout::expansion(batch_dims, batch_dims, rank)),
        Some(axis) => {
            let axis = normalize_axis(axis, rank)?;
            if batch_dims <= axis && *index_shape == data_shape.without_axis(axis) {
                Ok(Layout::reduction(axis))
            } else {
                Ok(Layout::expansion(axis, batch_dims, rank))
            }
        }
    }
}

/// Copy detail rows from `params` into `out`, one output block per outer index.
///
/// Skipped entries are left untouched (`out` starts zeroed).
pub(crate) fn gather_kernel<T: Element>(
    params: &[T],
    classes: &[Option<usize>],
    seg: &Segments,
    out: &mut [T],
    parallel: bool,
) {
    let detail = seg.detail_size;
    let repeat = seg.repeat_size;

    for_each_block(out, seg.broadcast_size * detail, parallel, |outer, block| {
        let batch = seg.batch_of(outer);
        for (entry, row) in block.chunks_exact_mut(detail).enumerate() {
            let base = seg.indices_offset(batch, entry, 0);
            if repeat == 1 {
                if let Some(class) = classes[base] {
                    let src = seg.params_offset(outer, class, 0);
                    row.copy_from_slice(&params[src..src + detail]);
                }
                continue;
            }

            let table = &classes[base..base + repeat];
            for (d, chunk) in row.chunks_exact_mut(repeat).enumerate() {
                for (r, (slot, class)) in chunk.iter_mut().zip(table).enumerate() {
                    if let Some(class) = *class {
                        *slot = params[seg.params_offset(outer, class, d * repeat + r)];
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexPolicy, TransferConfig};
    use tessel_core::TesselError;

    fn engine() -> TransferEngine {
        TransferEngine::new(TransferConfig::sequential())
    }

    #[test]
    fn test_gather_1d() {
        let params = Tensor::from_i64(&(10..20).collect::<Vec<_>>(), &[10]);
        let idx = Tensor::from_i64(&[3, 2, 1, 1], &[4]);
        let out = engine().gather(&params, &idx, None, 0).unwrap();
        assert_eq!(out.shape().dims(), &[4]);
        assert_eq!(out.as_slice::<i64>().unwrap(), &[13, 12, 11, 11]);
    }

    #[test]
    fn test_gather_rows() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        let idx = Tensor::from_i64(&[2, 0, 2, 1], &[2, 2]);
        let out = engine().gather(&params, &idx, Some(0), 0).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2, 2]);
        assert_eq!(
            out.as_f32_slice().unwrap(),
            &[5.0, 6.0, 1.0, 2.0, 5.0, 6.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_gather_inner_axis_expansion() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let idx = Tensor::from_i64(&[2, 0, 2], &[3]);
        let out = engine().gather(&params, &idx, Some(-1), 0).unwrap();
        assert_eq!(out.shape().dims(), &[2, 3]);
        assert_eq!(out.as_f32_slice().unwrap(), &[3.0, 1.0, 3.0, 6.0, 4.0, 6.0]);
    }

    #[test]
    fn test_gather_reduction() {
        // indices shape == params shape without axis 1
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let idx = Tensor::from_i64(&[2, 0], &[2]);
        let out = engine().gather(&params, &idx, Some(1), 0).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        assert_eq!(out.as_f32_slice().unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_gather_reduction_with_repeat_dims() {
        // params[o, c, r] = o * 6 + c * 2 + r
        let params = Tensor::from_i64(&(0..12).collect::<Vec<_>>(), &[2, 3, 2]);
        let idx = Tensor::from_i64(&[2, 0, 1, 2], &[2, 2]);
        let out = engine().gather(&params, &idx, Some(1), 0).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.as_slice::<i64>().unwrap(), &[4, 1, 8, 11]);
    }

    #[test]
    fn test_gather_batch_dims() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let idx = Tensor::from_i64(&[0, 2, 1, 1], &[2, 2]);
        let out = engine().gather(&params, &idx, None, 1).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.as_f32_slice().unwrap(), &[1.0, 3.0, 5.0, 5.0]);
    }

    #[test]
    fn test_gather_scalar_index() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let idx = Tensor::scalar(1i32);
        let out = engine().gather(&params, &idx, None, 0).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        assert_eq!(out.as_f32_slice().unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_gather_every_dtype() {
        for dtype in tessel_core::DType::ALL {
            let params = Tensor::zeros(&[4, 2], dtype);
            let idx = Tensor::from_i64(&[3, 0], &[2]);
            let out = engine().gather(&params, &idx, None, 0).unwrap();
            assert_eq!(out.dtype(), dtype);
            assert_eq!(out.shape().dims(), &[2, 2]);
        }
    }

    #[test]
    fn test_gather_axis_out_of_range() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let idx = Tensor::from_i64(&[0], &[1]);
        let err = engine().gather(&params, &idx, Some(-4), 0).unwrap_err();
        assert!(err.to_string().contains("axis is out of range: -4"), "{err}");
    }

    #[test]
    fn test_gather_scalar_params() {
        let params = Tensor::scalar(1.0f32);
        let idx = Tensor::from_i64(&[0], &[1]);
        let err = engine().gather(&params, &idx, None, 0).unwrap_err();
        assert!(matches!(err, TesselError::AxisOutOfRange { .. }));
    }

    #[test]
    fn test_gather_index_policies() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let idx = Tensor::from_i64(&[0, 7], &[2]);

        let err = engine().gather(&params, &idx, None, 0).unwrap_err();
        assert_eq!(err, TesselError::IndexOutOfRange { index: 7, size: 3, axis: 0 });

        let skip = TransferEngine::new(TransferConfig::sequential().with_index_policy(IndexPolicy::Skip));
        let out = skip.gather(&params, &idx, None, 0).unwrap();
        assert_eq!(out.as_f32_slice().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_gather_parallel_matches_sequential() {
        let data: Vec<f32> = (0..64 * 16).map(|i| i as f32).collect();
        let params = Tensor::from_f32(&data, &[64, 16]);
        let ids: Vec<i64> = (0..64 * 40).map(|i| (i * 7 % 16) as i64).collect();
        let idx = Tensor::from_i64(&ids, &[64, 40]);

        let par = TransferEngine::new(TransferConfig::default().with_parallel_threshold(0));
        let a = engine().gather(&params, &idx, None, 1).unwrap();
        let b = par.gather(&params, &idx, None, 1).unwrap();
        assert_eq!(a.as_f32_slice(), b.as_f32_slice());
    }

    #[test]
    fn test_gather_nd() {
        let params = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);

        let idx = Tensor::from_i64(&[2, 1, 0, 0], &[2, 2]);
        let out = engine().gather_nd(&params, &idx, 0).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        assert_eq!(out.as_f32_slice().unwrap(), &[6.0, 1.0]);

        let idx = Tensor::from_i64(&[1], &[1, 1]);
        let out = engine().gather_nd(&params, &idx, 0).unwrap();
        assert_eq!(out.shape().dims(), &[1, 2]);
        assert_eq!(out.as_f32_slice().unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_gather_nd_batched() {
        // params [2, 3]: each batch row picks its own column
        let params = Tensor::from_i64(&[1, 2, 3, 4, 5, 6], &[2, 3]);
        let idx = Tensor::from_i64(&[2, 0], &[2, 1]);
        let out = engine().gather_nd(&params, &idx, 1).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        assert_eq!(out.as_slice::<i64>().unwrap(), &[3, 4]);
    }

    #[test]
    fn test_gather_nd_depth_error() {
        let params = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let idx = Tensor::from_i64(&[0, 0], &[1, 2]);
        let err = engine().gather_nd(&params, &idx, 0).unwrap_err();
        assert!(matches!(err, TesselError::Rank { .. }));
    }
}
