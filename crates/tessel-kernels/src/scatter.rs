//! Scatter, scatterAdd, scatterND and scatterNDAdd.
//!
//! The mirror image of gather: detail rows of `updates`
//! are written (or accumulated) into the output at resolved class positions.

use tessel_core::{
    dispatch_dtype, normalize_axis, normalize_batch_dims, Element, Result, Shape, Tensor,
    TesselError,
};
use tracing::debug;

use crate::engine::{check_same_dtype, check_writable, slice_of, slice_of_mut, TransferEngine};
use crate::gather::select_layout;
use crate::index::{resolve_classes, resolve_tuples, ResolvedIndices};
use crate::schedule::{accumulate_items, for_each_block};
use crate::segments::{Layout, Segments};

/// How an update combines with the element already in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterMode {
    /// Overwrite; within one call the last write in index order wins.
    Assign,
    /// Accumulate with [`Element::accumulate`].
    Add,
}

impl ScatterMode {
    #[inline(always)]
    fn combine<T: Element>(self, dst: &mut T, src: T) {
        match self {
            Self::Assign => *dst = src,
            Self::Add => dst.accumulate(src),
        }
    }
}

impl TransferEngine {
    /// Scatter `updates` into a fresh zeroed output with `num_class` entries
    /// along the class axis.
    ///
    /// With `axis = None` the class axis is `batch_dims` and the output shape
    /// is `updates[..axis] ++ [num_class] ++ updates[axis + rank(X)..]`.
    /// With `axis = Some(a)`, an index tensor shaped exactly like `updates`
    /// and `a > batch_dims` selects reduction mode: the output is `updates`
    /// with `num_class` inserted at `a`.
    pub fn scatter(
        &self,
        indices: &Tensor,
        updates: &Tensor,
        num_class: usize,
        axis: Option<isize>,
        batch_dims: isize,
    ) -> Result<Tensor> {
        let batch_dims = normalize_batch_dims(batch_dims, indices.ndim())?;
        let (layout, out_shape) =
            scatter_output(indices.shape(), updates.shape(), num_class, axis, batch_dims)?;
        let mut output = Tensor::zeros(&out_shape, updates.dtype());
        self.scatter_with_layout("scatter", indices, updates, &mut output, &layout, ScatterMode::Assign)?;
        Ok(output)
    }

    /// Scatter `updates` into an existing output, overwriting the addressed
    /// elements and leaving every other element unchanged.
    ///
    /// Mode selection follows [`TransferEngine::gather`] with `output` in
    /// the role of params.
    pub fn scatter_into(
        &self,
        indices: &Tensor,
        updates: &Tensor,
        output: &mut Tensor,
        axis: Option<isize>,
        batch_dims: isize,
    ) -> Result<()> {
        let batch_dims = normalize_batch_dims(batch_dims, indices.ndim())?;
        let layout = select_layout(output.shape(), indices.shape(), axis, batch_dims)?;
        self.scatter_with_layout("scatter_into", indices, updates, output, &layout, ScatterMode::Assign)
    }

    /// Accumulate `updates` into `output` along `axis`.
    ///
    /// Repeated indices sum; nothing is written if any check fails.
    pub fn scatter_add(
        &self,
        indices: &Tensor,
        updates: &Tensor,
        output: &mut Tensor,
        axis: isize,
    ) -> Result<()> {
        let layout = select_layout(output.shape(), indices.shape(), Some(axis), 0)?;
        self.scatter_with_layout("scatter_add", indices, updates, output, &layout, ScatterMode::Add)
    }

    /// Scatter index tuples into a fresh zeroed tensor of `shape`.
    pub fn scatter_nd(
        &self,
        indices: &Tensor,
        updates: &Tensor,
        shape: &[usize],
        batch_dims: isize,
    ) -> Result<Tensor> {
        let mut output = Tensor::zeros(shape, updates.dtype());
        self.scatter_nd_with_mode("scatter_nd", indices, updates, &mut output, batch_dims, ScatterMode::Assign)?;
        Ok(output)
    }

    /// Accumulate index tuples into a fresh zeroed tensor of `shape`.
    pub fn scatter_nd_add(
        &self,
        indices: &Tensor,
        updates: &Tensor,
        shape: &[usize],
        batch_dims: isize,
    ) -> Result<Tensor> {
        let mut output = Tensor::zeros(shape, updates.dtype());
        self.scatter_nd_with_mode("scatter_nd_add", indices, updates, &mut output, batch_dims, ScatterMode::Add)?;
        Ok(output)
    }

    /// Accumulate index tuples into an existing output.
    pub fn scatter_nd_add_into(
        &self,
        indices: &Tensor,
        updates: &Tensor,
        output: &mut Tensor,
        batch_dims: isize,
    ) -> Result<()> {
        self.scatter_nd_with_mode("scatter_nd_add_into", indices, updates, output, batch_dims, ScatterMode::Add)
    }

    fn scatter_with_layout(
        &self,
        op: &'static str,
        indices: &Tensor,
        updates: &Tensor,
        output: &mut Tensor,
        layout: &Layout,
        mode: ScatterMode,
    ) -> Result<()> {
        check_same_dtype(output.dtype(), updates.dtype())?;
        check_writable(output)?;

        let out_dims = output.shape().dims();
        let index_dims = indices.shape().dims();
        let segments = Segments::for_gather(out_dims, index_dims, layout)?;
        let expected = layout.broadcast_shape(out_dims, index_dims);
        if updates.shape().dims() != expected.as_slice() {
            return Err(TesselError::shape("scatter updates", &expected, updates.shape().dims()));
        }

        let policy = self.config().index_policy;
        let resolved = resolve_classes(indices, segments.num_class, layout.axis, policy)?;
        resolved.trace_adjusted(op, policy);
        debug!(op, ?segments, reduction = layout.is_reduction(), ?mode, "index-table transfer");

        self.run_scatter(updates, &resolved, &segments, output, mode)
    }

    fn scatter_nd_with_mode(
        &self,
        op: &'static str,
        indices: &Tensor,
        updates: &Tensor,
        output: &mut Tensor,
        batch_dims: isize,
        mode: ScatterMode,
    ) -> Result<()> {
        check_same_dtype(output.dtype(), updates.dtype())?;
        check_writable(output)?;

        let batch_dims = normalize_batch_dims(batch_dims, indices.ndim().saturating_sub(1))?;
        let out_dims = output.shape().dims();
        let index_dims = indices.shape().dims();
        let (segments, class_dims) = Segments::for_nd(out_dims, index_dims, batch_dims)?;
        let expected = Segments::nd_broadcast_shape(out_dims, index_dims, batch_dims);
        if updates.shape().dims() != expected.as_slice() {
            return Err(TesselError::shape("scatter_nd updates", &expected, updates.shape().dims()));
        }

        let policy = self.config().index_policy;
        let resolved = resolve_tuples(indices, &class_dims, batch_dims, policy)?;
        resolved.trace_adjusted(op, policy);
        debug!(op, ?segments, depth = class_dims.len(), ?mode, "index-table transfer");

        self.run_scatter(updates, &resolved, &segments, output, mode)
    }

    fn run_scatter(
        &self,
        updates: &Tensor,
        resolved: &ResolvedIndices,
        segments: &Segments,
        output: &mut Tensor,
        mode: ScatterMode,
    ) -> Result<()> {
        let parallel = self.config().run_parallel(segments.broadcast_len());
        let updates = updates.contiguous();
        dispatch_dtype!(output.dtype(), T => {
            let source = ScatterSource {
                updates: slice_of::<T>(&updates)?,
                classes: &resolved.positions,
                seg: segments,
                mode,
            };
            source.write_into(slice_of_mut(output)?, parallel);
        });
        Ok(())
    }
}

/// Output layout and shape of a scatter into a fresh tensor.
fn scatter_output(
    indices: &Shape,
    updates: &Shape,
    num_class: usize,
    axis: Option<isize>,
    batch_dims: usize,
) -> Result<(Layout, Vec<usize>)> {
    if let Some(a) = axis {
        if indices == updates {
            let axis = normalize_axis(a, updates.ndim() + 1)?;
            if axis > batch_dims {
                let layout = Layout::reduction(axis);
                return Ok((layout, updates.with_axis(axis, num_class).dims().to_vec()));
            }
        }
    }

    let index_rank = indices.ndim() - batch_dims;
    if updates.ndim() < index_rank + batch_dims {
        return Err(TesselError::shape("scatter updates", indices.dims(), updates.dims()));
    }
    let rank = updates.ndim() + 1 - index_rank;
    let axis = match axis {
        None => batch_dims,
        Some(a) => normalize_axis(a, rank)?,
    };
    if axis < batch_dims || axis + index_rank > updates.ndim() {
        return Err(TesselError::InvalidArgument(format!(
            "scatter axis {axis} must lie in [{batch_dims}, {}]",
            updates.ndim() - index_rank
        )));
    }

    let dims = updates.dims();
    let mut shape = dims[..axis].to_vec();
    shape.push(num_class);
    shape.extend_from_slice(&dims[axis + index_rank..]);
    Ok((Layout::expansion(axis, batch_dims, rank), shape))
}

/// Updates plus their resolved destinations.
struct ScatterSource<'a, T> {
    updates: &'a [T],
    classes: &'a [Option<usize>],
    seg: &'a Segments,
    mode: ScatterMode,
}

impl<T: Element> ScatterSource<'_, T> {
    fn write_into(&self, out: &mut [T], parallel: bool) {
        let seg = self.seg;
        let block_len = seg.num_class * seg.detail_size;

        // Accumulation with too few disjoint blocks to occupy the pool:
        // reduce each block's contributions per partition, then merge.
        let shared = self.mode == ScatterMode::Add
            && parallel
            && seg.outer_size < rayon::current_num_threads();
        if !shared {
            for_each_block(out, block_len, parallel, |outer, block| {
                for entry in 0..seg.broadcast_size {
                    self.apply(outer, entry, block);
                }
            });
            return;
        }

        if block_len == 0 {
            return;
        }
        for (outer, block) in out.chunks_mut(block_len).enumerate() {
            accumulate_items(block, seg.broadcast_size, true, |entry, acc| {
                self.apply(outer, entry, acc)
            });
        }
    }

    /// Write one index entry's detail row into its outer block.
    #[inline]
    fn apply(&self, outer: usize, entry: usize, block: &mut [T]) {
        let seg = self.seg;
        let detail = seg.detail_size;
        let repeat = seg.repeat_size;
        let base = seg.indices_offset(seg.batch_of(outer), entry, 0);
        let src = seg.broadcast_offset(outer, entry, 0);
        let row = &self.updates[src..src + detail];

        if repeat == 1 {
            if let Some(class) = self.classes[base] {
                // block-relative: outer 0
                let dst = seg.params_offset(0, class, 0);
                for (slot, &value) in block[dst..dst + detail].iter_mut().zip(row) {
                    self.mode.combine(slot, value);
                }
            }
            return;
        }

        let table = &self.classes[base..base + repeat];
        for (d, chunk) in row.chunks_exact(repeat).enumerate() {
            for (r, (&value, class)) in chunk.iter().zip(table).enumerate() {
                if let Some(class) = *class {
                    self.mode.combine(&mut block[seg.params_offset(0, class, d * repeat + r)], value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexPolicy, TransferConfig};
    use tessel_core::DType;

    fn engine() -> TransferEngine {
        TransferEngine::new(TransferConfig::sequential())
    }

    #[test]
    fn test_scatter_last_write_wins() {
        let idx = Tensor::from_i64(&[3, 2, 1, 1], &[4]);
        let upd = Tensor::from_i64(&[13, 12, 11, 11], &[4]);
        let out = engine().scatter(&idx, &upd, 10, None, 0).unwrap();
        assert_eq!(out.shape().dims(), &[10]);
        assert_eq!(out.as_slice::<i64>().unwrap(), &[0, 11, 12, 13, 0, 0, 0, 0, 0, 0]);

        let idx = Tensor::from_i64(&[1, 1], &[2]);
        let upd = Tensor::from_i64(&[5, 6], &[2]);
        let out = engine().scatter(&idx, &upd, 3, None, 0).unwrap();
        assert_eq!(out.as_slice::<i64>().unwrap(), &[0, 6, 0]);
    }

    #[test]
    fn test_scatter_rows() {
        let idx = Tensor::from_i64(&[2, 0], &[2]);
        let upd = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let out = engine().scatter(&idx, &upd, 3, None, 0).unwrap();
        assert_eq!(out.shape().dims(), &[3, 2]);
        assert_eq!(out.as_f32_slice().unwrap(), &[3.0, 4.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_scatter_reduction() {
        let idx = Tensor::from_i64(&[2, 0, 1, 2], &[2, 2]);
        let upd = Tensor::from_i64(&[4, 1, 8, 11], &[2, 2]);
        let out = engine().scatter(&idx, &upd, 3, Some(1), 0).unwrap();
        assert_eq!(out.shape().dims(), &[2, 3, 2]);
        assert_eq!(
            out.as_slice::<i64>().unwrap(),
            &[0, 1, 0, 0, 4, 0, 0, 0, 8, 0, 0, 11]
        );
    }

    #[test]
    fn test_scatter_batched() {
        let idx = Tensor::from_i64(&[0, 2, 1, 1], &[2, 2]);
        let upd = Tensor::from_f32(&[1.0, 3.0, 5.0, 6.0], &[2, 2]);
        let out = engine().scatter(&idx, &upd, 3, None, 1).unwrap();
        assert_eq!(out.shape().dims(), &[2, 3]);
        assert_eq!(out.as_f32_slice().unwrap(), &[1.0, 0.0, 3.0, 0.0, 6.0, 0.0]);
    }

    #[test]
    fn test_scatter_into_keeps_other_elements() {
        let idx = Tensor::from_i64(&[1], &[1]);
        let upd = Tensor::from_f32(&[9.0], &[1]);
        let mut out = Tensor::from_f32(&[5.0; 4], &[4]);
        engine().scatter_into(&idx, &upd, &mut out, None, 0).unwrap();
        assert_eq!(out.as_f32_slice().unwrap(), &[5.0, 9.0, 5.0, 5.0]);
    }

    #[test]
    fn test_scatter_add_accumulates() {
        let idx = Tensor::from_i64(&[2, 2, 1], &[3]);
        let upd = Tensor::from_f32(&[2.0, 2.0, 1.0], &[3]);
        let mut out = Tensor::zeros(&[4], DType::F32);
        engine().scatter_add(&idx, &upd, &mut out, 0).unwrap();
        assert_eq!(out.as_f32_slice().unwrap(), &[0.0, 1.0, 4.0, 0.0]);

        engine().scatter_add(&idx, &upd, &mut out, 0).unwrap();
        assert_eq!(out.as_f32_slice().unwrap(), &[0.0, 2.0, 8.0, 0.0]);
    }

    #[test]
    fn test_scatter_add_inner_axis() {
        // output [2, 3], add along axis 1
        let idx = Tensor::from_i64(&[0, 0, 2], &[3]);
        let upd = Tensor::from_i64(&[1, 2, 3, 4, 5, 6], &[2, 3]);
        let mut out = Tensor::zeros(&[2, 3], DType::I64);
        engine().scatter_add(&idx, &upd, &mut out, -1).unwrap();
        assert_eq!(out.as_slice::<i64>().unwrap(), &[3, 0, 3, 9, 0, 6]);
    }

    #[test]
    fn test_scatter_add_dtype_mismatch() {
        let idx = Tensor::from_i64(&[0], &[1]);
        let upd = Tensor::from_f64(&[1.0], &[1]);
        let mut out = Tensor::zeros(&[2], DType::F32);
        let err = engine().scatter_add(&idx, &upd, &mut out, 0).unwrap_err();
        assert_eq!(err, TesselError::DTypeMismatch { expected: DType::F32, got: DType::F64 });
    }

    #[test]
    fn test_scatter_add_no_partial_write() {
        let idx = Tensor::from_i64(&[0, 9], &[2]);
        let upd = Tensor::from_slice(&[1i32, 1], &[2]).unwrap();
        let mut out = Tensor::from_slice(&[1i32, 1, 1], &[3]).unwrap();
        let err = engine().scatter_add(&idx, &upd, &mut out, 0).unwrap_err();
        assert!(matches!(err, TesselError::IndexOutOfRange { index: 9, .. }));
        assert_eq!(out.as_slice::<i32>().unwrap(), &[1, 1, 1]);
    }

    #[test]
    fn test_scatter_updates_shape_mismatch() {
        let idx = Tensor::from_i64(&[0, 1], &[2]);
        let upd = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let mut out = Tensor::zeros(&[4], DType::F32);
        let err = engine().scatter_add(&idx, &upd, &mut out, 0).unwrap_err();
        assert!(matches!(err, TesselError::ShapeMismatch { context: "scatter updates", .. }));
    }

    #[test]
    fn test_scatter_skip_policy() {
        let skip = TransferEngine::new(TransferConfig::sequential().with_index_policy(IndexPolicy::Skip));
        let idx = Tensor::from_i64(&[-1, 1], &[2]);
        let upd = Tensor::from_f32(&[7.0, 8.0], &[2]);
        let out = skip.scatter(&idx, &upd, 2, None, 0).unwrap();
        assert_eq!(out.as_f32_slice().unwrap(), &[0.0, 8.0]);
    }

    #[test]
    fn test_scatter_nd() {
        let idx = Tensor::from_i64(&[1, 3], &[2, 1]);
        let upd = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let out = engine().scatter_nd(&idx, &upd, &[4, 2], 0).unwrap();
        assert_eq!(
            out.as_f32_slice().unwrap(),
            &[0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_scatter_nd_add_duplicates() {
        let idx = Tensor::from_i64(&[0, 1, 0, 1, 2, 0], &[3, 2]);
        let upd = Tensor::from_i64(&[1, 2, 3], &[3]);
        let out = engine().scatter_nd_add(&idx, &upd, &[3, 2], 0).unwrap();
        assert_eq!(out.as_slice::<i64>().unwrap(), &[0, 3, 0, 0, 3, 0]);
    }

    #[test]
    fn test_scatter_nd_add_into_batched() {
        let idx = Tensor::from_i64(&[2, 2, 0, 1], &[2, 2, 1]);
        let upd = Tensor::from_i64(&[1, 1, 5, 7], &[2, 2]);
        let mut out = Tensor::from_i64(&[1; 6], &[2, 3]);
        engine().scatter_nd_add_into(&idx, &upd, &mut out, 1).unwrap();
        assert_eq!(out.as_slice::<i64>().unwrap(), &[1, 1, 3, 6, 8, 1]);
    }

    #[test]
    fn test_scatter_nd_updates_shape_mismatch() {
        let idx = Tensor::from_i64(&[1, 3], &[2, 1]);
        let upd = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let err = engine().scatter_nd(&idx, &upd, &[4, 2], 0).unwrap_err();
        assert!(matches!(err, TesselError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_scatter_add_parallel_matches_sequential() {
        let n = 20_000;
        let ids: Vec<i64> = (0..n).map(|i| (i * 31 % 17) as i64).collect();
        let vals: Vec<i64> = (0..n).map(|i| i as i64).collect();
        let idx = Tensor::from_i64(&ids, &[n]);
        let upd = Tensor::from_i64(&vals, &[n]);

        let par = TransferEngine::new(TransferConfig::default().with_parallel_threshold(0));
        let mut a = Tensor::zeros(&[17], DType::I64);
        let mut b = Tensor::zeros(&[17], DType::I64);
        engine().scatter_add(&idx, &upd, &mut a, 0).unwrap();
        par.scatter_add(&idx, &upd, &mut b, 0).unwrap();
        assert_eq!(a.as_slice::<i64>(), b.as_slice::<i64>());
        assert_eq!(a.to_vec::<i64>().unwrap().iter().sum::<i64>(), vals.iter().sum::<i64>());
    }
}
