//! Sliding-window geometry for im2col/col2im.
//!
//! Image layout is `[batch, spatial.., channels]` (or `[batch, channels,
//! spatial..]` when `channels_first`); cols layout is
//! `[batch, out.., kernel.., channels]` (or `[batch, out.., channels, kernel..]`
//! when `cols_channels_first`).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tessel_core::{Result, TesselError};

/// Maximum number of spatial dims.
pub const MAX_SPATIAL_RANK: usize = 3;

type Dims = SmallVec<[usize; MAX_SPATIAL_RANK]>;

/// Filter, stride, dilation and layout flags of a sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowParams {
    pub filter_size: Vec<usize>,
    pub strides: Vec<usize>,
    /// Pad so that every spatial dim keeps its input size.
    #[serde(default)]
    pub padding: bool,
    /// Image is `[batch, channels, spatial..]`.
    #[serde(default)]
    pub channels_first: bool,
    /// Per-dim dilation; empty means 1 everywhere.
    #[serde(default)]
    pub dilation: Vec<usize>,
    /// Cols are `[batch, out.., channels, kernel..]`.
    #[serde(default)]
    pub cols_channels_first: bool,
}

impl WindowParams {
    pub fn new(filter_size: &[usize], strides: &[usize]) -> Self {
        Self {
            filter_size: filter_size.to_vec(),
            strides: strides.to_vec(),
            padding: false,
            channels_first: false,
            dilation: Vec::new(),
            cols_channels_first: false,
        }
    }

    pub fn with_padding(mut self, padding: bool) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_channels_first(mut self, channels_first: bool) -> Self {
        self.channels_first = channels_first;
        self
    }

    pub fn with_dilation(mut self, dilation: &[usize]) -> Self {
        self.dilation = dilation.to_vec();
        self
    }

    pub fn with_cols_channels_first(mut self, cols_channels_first: bool) -> Self {
        self.cols_channels_first = cols_channels_first;
        self
    }

    fn validate(&self) -> Result<Dims> {
        let rank = self.filter_size.len();
        if rank == 0 {
            return Err(TesselError::InvalidArgument(
                "window needs at least one spatial dim".into(),
            ));
        }
        if rank > MAX_SPATIAL_RANK {
            return Err(TesselError::Rank {
                context: "window spatial rank",
                ndim: rank,
                limit: MAX_SPATIAL_RANK,
            });
        }
        if self.strides.len() != rank {
            return Err(TesselError::InvalidArgument(format!(
                "expected {rank} strides, got {}",
                self.strides.len()
            )));
        }
        let dilation: Dims = match self.dilation.len() {
            0 => SmallVec::from_elem(1, rank),
            n if n == rank => SmallVec::from_slice(&self.dilation),
            n => {
                return Err(TesselError::InvalidArgument(format!(
                    "expected {rank} dilation values, got {n}"
                )))
            }
        };
        for (name, values) in [
            ("filter size", self.filter_size.as_slice()),
            ("stride", self.strides.as_slice()),
            ("dilation", dilation.as_slice()),
        ] {
            if values.contains(&0) {
                return Err(TesselError::InvalidArgument(format!("{name} must be positive, got {values:?}")));
            }
        }
        Ok(dilation)
    }
}

/// Resolved window geometry for one image shape.
///
/// Output sizes, padding and every stride the kernels need are computed once
/// here and reused for every window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGeometry {
    batch: usize,
    channels: usize,
    image_dims: Dims,
    out_dims: Dims,
    strides: Dims,
    pad: Dims,
    /// Element stride of each spatial dim inside one batch item.
    spatial_strides: Dims,
    channel_stride: usize,
    /// Per kernel tap: `kernel_pos_d * dilation_d`, flattened `[tap][dim]`.
    taps: Vec<usize>,
    kernel_count: usize,
    out_count: usize,
    cols_channels_first: bool,
    image_shape: Vec<usize>,
    cols_shape: Vec<usize>,
}

impl WindowGeometry {
    pub fn new(image_shape: &[usize], params: &WindowParams) -> Result<Self> {
        let dilation = params.validate()?;
        let rank = params.filter_size.len();
        if image_shape.len() != rank + 2 {
            return Err(TesselError::Rank {
                context: "image must be [batch, spatial.., channels]",
                ndim: image_shape.len(),
                limit: rank + 2,
            });
        }

        let batch = image_shape[0];
        let (channels, image_dims): (usize, Dims) = if params.channels_first {
            (image_shape[1], SmallVec::from_slice(&image_shape[2..]))
        } else {
            (image_shape[rank + 1], SmallVec::from_slice(&image_shape[1..=rank]))
        };

        let filter: Dims = SmallVec::from_slice(&params.filter_size);
        let strides: Dims = SmallVec::from_slice(&params.strides);
        let extents: Dims = filter
            .iter()
            .zip(&dilation)
            .map(|(&f, &d)| (f - 1) * d + 1)
            .collect();

        let mut out_dims = Dims::new();
        let mut pad = Dims::new();
        for d in 0..rank {
            let (im, extent, stride) = (image_dims[d], extents[d], strides[d]);
            if params.padding {
                let total = (im as isize - 1) * stride as isize - im as isize + extent as isize;
                out_dims.push(im);
                pad.push((total.max(0) / 2) as usize);
            } else {
                if extent > im {
                    return Err(TesselError::shape(
                        "window larger than image",
                        &extents,
                        &image_dims,
                    ));
                }
                out_dims.push((im - extent) / stride + 1);
                pad.push(0);
            }
        }

        // strides inside one batch item
        let mut spatial_strides: Dims = SmallVec::from_elem(0, rank);
        let channel_stride;
        if params.channels_first {
            let mut acc = 1;
            for d in (0..rank).rev() {
                spatial_strides[d] = acc;
                acc *= image_dims[d];
            }
            channel_stride = acc;
        } else {
            let mut acc = channels;
            for d in (0..rank).rev() {
                spatial_strides[d] = acc;
                acc *= image_dims[d];
            }
            channel_stride = 1;
        }

        let kernel_count: usize = filter.iter().product();
        let mut taps = Vec::with_capacity(kernel_count * rank);
        for k in 0..kernel_count {
            let mut rest = k;
            let mut tap: Dims = SmallVec::from_elem(0, rank);
            for d in (0..rank).rev() {
                tap[d] = (rest % filter[d]) * dilation[d];
                rest /= filter[d];
            }
            taps.extend_from_slice(&tap);
        }

        let mut cols_shape = Vec::with_capacity(2 * rank + 2);
        cols_shape.push(batch);
        cols_shape.extend_from_slice(&out_dims);
        if params.cols_channels_first {
            cols_shape.push(channels);
            cols_shape.extend_from_slice(&filter);
        } else {
            cols_shape.extend_from_slice(&filter);
            cols_shape.push(channels);
        }

        Ok(Self {
            batch,
            channels,
            out_count: out_dims.iter().product(),
            image_dims,
            out_dims,
            strides,
            pad,
            spatial_strides,
            channel_stride,
            taps,
            kernel_count,
            cols_channels_first: params.cols_channels_first,
            image_shape: image_shape.to_vec(),
            cols_shape,
        })
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of windows per spatial dim.
    pub fn out_dims(&self) -> &[usize] {
        &self.out_dims
    }

    /// Leading padding per spatial dim.
    pub fn padding(&self) -> &[usize] {
        &self.pad
    }

    pub fn image_shape(&self) -> &[usize] {
        &self.image_shape
    }

    pub fn cols_shape(&self) -> &[usize] {
        &self.cols_shape
    }

    /// Windows per batch item.
    pub fn out_count(&self) -> usize {
        self.out_count
    }

    /// Kernel taps per window.
    pub fn kernel_count(&self) -> usize {
        self.kernel_count
    }

    /// Elements of one batch item of the image.
    pub fn image_batch_len(&self) -> usize {
        self.channels * self.image_dims.iter().product::<usize>()
    }

    /// Elements of one window in cols.
    pub fn window_len(&self) -> usize {
        self.kernel_count * self.channels
    }

    /// Top-left input position of window `out_index`:
    /// `out_pos * stride - pad` per spatial dim.
    pub fn window_origin(&self, out_index: usize) -> SmallVec<[isize; MAX_SPATIAL_RANK]> {
        let rank = self.out_dims.len();
        let mut origin = SmallVec::from_elem(0isize, rank);
        let mut rest = out_index;
        for d in (0..rank).rev() {
            let pos = rest % self.out_dims[d];
            rest /= self.out_dims[d];
            origin[d] = (pos * self.strides[d]) as isize - self.pad[d] as isize;
        }
        origin
    }

    /// Offset of channel 0 of kernel tap `tap` inside one batch item, or
    /// `None` when the tap falls into padding.
    #[inline]
    pub fn tap_offset(&self, origin: &[isize], tap: usize) -> Option<usize> {
        let rank = origin.len();
        let taps = &self.taps[tap * rank..(tap + 1) * rank];
        let mut offset = 0;
        for d in 0..rank {
            let pos = origin[d] + taps[d] as isize;
            if pos < 0 || pos as usize >= self.image_dims[d] {
                return None;
            }
            offset += pos as usize * self.spatial_strides[d];
        }
        Some(offset)
    }

    /// Offset of `channel` relative to a [`tap_offset`](Self::tap_offset).
    #[inline]
    pub fn channel_offset(&self, channel: usize) -> usize {
        channel * self.channel_stride
    }

    /// Position of `(tap, channel)` inside one window of cols.
    #[inline]
    pub fn cols_index(&self, tap: usize, channel: usize) -> usize {
        if self.cols_channels_first {
            channel * self.kernel_count + tap
        } else {
            tap * self.channels + channel
        }
    }
}
