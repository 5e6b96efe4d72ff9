//! im2col and col2im: window-addressed gather and its accumulating dual.

use tessel_core::{dispatch_dtype, Element, Result, Tensor, TesselError};
use tracing::debug;

use crate::engine::{check_same_dtype, check_writable, slice_of, slice_of_mut, TransferEngine};
use crate::schedule::{accumulate_items, for_each_block};
use crate::window::{WindowGeometry, WindowParams};

impl TransferEngine {
    /// Unfold every sliding window of `image` into a row of the returned cols
    /// tensor. Taps that land in padding stay zero.
    pub fn im2col(&self, image: &Tensor, params: &WindowParams) -> Result<Tensor> {
        let geometry = WindowGeometry::new(image.shape().dims(), params)?;
        let parallel = self.config().run_parallel(geometry.cols_shape().iter().product());
        debug!(
            op = "im2col",
            out = ?geometry.out_dims(),
            pad = ?geometry.padding(),
            cols = ?geometry.cols_shape(),
            parallel,
            "window transfer"
        );

        let image = image.contiguous();
        let mut cols = Tensor::zeros(geometry.cols_shape(), image.dtype());
        dispatch_dtype!(image.dtype(), T => im2col_kernel::<T>(
            slice_of(&image)?,
            &geometry,
            slice_of_mut(&mut cols)?,
            parallel,
        ));
        Ok(cols)
    }

    /// Add every window row of `cols` back into `image_out` at the positions
    /// it was read from.
    ///
    /// Overlapping windows sum; `image_out` is never cleared, so pass zeros
    /// for a plain fold.
    pub fn col2im(&self, cols: &Tensor, image_out: &mut Tensor, params: &WindowParams) -> Result<()> {
        check_same_dtype(image_out.dtype(), cols.dtype())?;
        check_writable(image_out)?;
        let geometry = WindowGeometry::new(image_out.shape().dims(), params)?;
        if cols.shape().dims() != geometry.cols_shape() {
            return Err(TesselError::shape("col2im cols", geometry.cols_shape(), cols.shape().dims()));
        }

        let parallel = self.config().run_parallel(cols.numel());
        debug!(
            op = "col2im",
            out = ?geometry.out_dims(),
            pad = ?geometry.padding(),
            image = ?geometry.image_shape(),
            parallel,
            "window transfer"
        );

        let cols = cols.contiguous();
        dispatch_dtype!(image_out.dtype(), T => col2im_kernel::<T>(
            slice_of(&cols)?,
            &geometry,
            slice_of_mut(image_out)?,
            parallel,
        ));
        Ok(())
    }
}

/// One cols window per block: windows never share a destination.
fn im2col_kernel<T: Element>(image: &[T], geo: &WindowGeometry, cols: &mut [T], parallel: bool) {
    let image_batch = geo.image_batch_len();
    let out_count = geo.out_count();
    let channels = geo.channels();

    for_each_block(cols, geo.window_len(), parallel, |window, row| {
        let batch = window / out_count;
        let image = &image[batch * image_batch..(batch + 1) * image_batch];
        let origin = geo.window_origin(window % out_count);
        for tap in 0..geo.kernel_count() {
            if let Some(base) = geo.tap_offset(&origin, tap) {
                for channel in 0..channels {
                    row[geo.cols_index(tap, channel)] = image[base + geo.channel_offset(channel)];
                }
            }
        }
    });
}

/// Windows overlap inside a batch item, so contributions are accumulated:
/// batch items in parallel when there are enough of them, otherwise the
/// windows of each item are reduced per partition and merged.
fn col2im_kernel<T: Element>(cols: &[T], geo: &WindowGeometry, image: &mut [T], parallel: bool) {
    let image_batch = geo.image_batch_len();
    let out_count = geo.out_count();
    let window_len = geo.window_len();
    let channels = geo.channels();

    let fold_window = |batch: usize, window: usize, dst: &mut [T]| {
        let start = (batch * out_count + window) * window_len;
        let row = &cols[start..start + window_len];
        let origin = geo.window_origin(window);
        for tap in 0..geo.kernel_count() {
            if let Some(base) = geo.tap_offset(&origin, tap) {
                for channel in 0..channels {
                    dst[base + geo.channel_offset(channel)].accumulate(row[geo.cols_index(tap, channel)]);
                }
            }
        }
    };

    if parallel && geo.batch() >= rayon::current_num_threads() {
        for_each_block(image, image_batch, true, |batch, dst| {
            for window in 0..out_count {
                fold_window(batch, window, dst);
            }
        });
        return;
    }

    if image_batch == 0 {
        return;
    }
    for (batch, dst) in image.chunks_mut(image_batch).enumerate() {
        accumulate_items(dst, out_count, parallel, |window, acc| fold_window(batch, window, acc));
    }
}
