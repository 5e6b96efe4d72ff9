//! Index resolution: turn an index tensor into class positions.
//!
//! Runs once per call, before any output element is written, so a fail-fast
//! range error never leaves a half-written destination behind.

use tessel_core::{dispatch_dtype, Element, Result, Tensor, TesselError};
use tracing::trace;

use crate::config::IndexPolicy;

/// Class positions resolved from an index tensor.
///
/// `None` marks an element dropped under [`IndexPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIndices {
    pub positions: Vec<Option<usize>>,
    /// Entries clipped or skipped by the policy.
    pub adjusted: usize,
}

impl ResolvedIndices {
    pub(crate) fn trace_adjusted(&self, op: &'static str, policy: IndexPolicy) {
        if self.adjusted > 0 {
            trace!(op, ?policy, adjusted = self.adjusted, "out-of-range indices handled by policy");
        }
    }
}

/// Resolve every element of `indices` against `[0, num_class)`.
///
/// `axis` is only used to label range errors.
pub fn resolve_classes(
    indices: &Tensor,
    num_class: usize,
    axis: usize,
    policy: IndexPolicy,
) -> Result<ResolvedIndices> {
    let raw = index_values(indices)?;
    let mut adjusted = 0;
    let mut positions = Vec::with_capacity(raw.len());
    for value in raw {
        let resolved = check(value, num_class, axis, policy)?;
        if resolved.adjusted {
            adjusted += 1;
        }
        positions.push(resolved.position);
    }
    Ok(ResolvedIndices { positions, adjusted })
}

/// Resolve the rows of an ND index tensor (last dim = tuple) into flat
/// row-major positions over `class_dims`.
///
/// `first_axis` labels the params axis addressed by the first tuple component.
pub fn resolve_tuples(
    indices: &Tensor,
    class_dims: &[usize],
    first_axis: usize,
    policy: IndexPolicy,
) -> Result<ResolvedIndices> {
    let raw = index_values(indices)?;
    let depth = class_dims.len();
    if depth == 0 {
        // Empty tuples address the single whole-slice class.
        let dims = indices.shape().dims();
        let rows: usize = dims[..dims.len().saturating_sub(1)].iter().product();
        return Ok(ResolvedIndices { positions: vec![Some(0); rows], adjusted: 0 });
    }

    let mut adjusted = 0;
    let mut positions = Vec::with_capacity(raw.len() / depth);
    for row in raw.chunks_exact(depth) {
        let mut flat = 0usize;
        let mut dropped = false;
        let mut touched = false;
        for (component, (&value, &dim)) in row.iter().zip(class_dims).enumerate() {
            let resolved = check(value, dim, first_axis + component, policy)?;
            touched |= resolved.adjusted;
            match resolved.position {
                Some(p) => flat = flat * dim + p,
                None => dropped = true,
            }
        }
        if touched {
            adjusted += 1;
        }
        positions.push(if dropped { None } else { Some(flat) });
    }
    Ok(ResolvedIndices { positions, adjusted })
}

struct Checked {
    position: Option<usize>,
    adjusted: bool,
}

#[inline]
fn check(value: Option<i64>, size: usize, axis: usize, policy: IndexPolicy) -> Result<Checked> {
    let Some(index) = value else {
        return match policy {
            IndexPolicy::FailFast => Err(TesselError::InvalidArgument(format!(
                "non-finite index value for axis {axis}"
            ))),
            IndexPolicy::Clip | IndexPolicy::Skip => Ok(Checked { position: None, adjusted: true }),
        };
    };

    if index >= 0 && (index as u64) < size as u64 {
        return Ok(Checked { position: Some(index as usize), adjusted: false });
    }

    match policy {
        IndexPolicy::FailFast => Err(TesselError::IndexOutOfRange { index, size, axis }),
        IndexPolicy::Clip if size > 0 => {
            let clipped = if index < 0 { 0 } else { size - 1 };
            Ok(Checked { position: Some(clipped), adjusted: true })
        }
        IndexPolicy::Clip | IndexPolicy::Skip => Ok(Checked { position: None, adjusted: true }),
    }
}

/// Read every index element as `Option<i64>` in logical order.
fn index_values(indices: &Tensor) -> Result<Vec<Option<i64>>> {
    let dtype = indices.dtype();
    if !dtype.is_index_type() {
        return Err(TesselError::UnsupportedDType { context: "index tensor", dtype });
    }
    dispatch_dtype!(dtype, T => {
        let values = indices.to_vec::<T>()?;
        Ok(values.into_iter().map(T::to_index).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> Tensor {
        Tensor::from_i64(values, &[values.len()])
    }

    #[test]
    fn test_in_range() {
        let r = resolve_classes(&ids(&[3, 2, 1, 1]), 10, 0, IndexPolicy::FailFast).unwrap();
        assert_eq!(r.positions, vec![Some(3), Some(2), Some(1), Some(1)]);
        assert_eq!(r.adjusted, 0);
    }

    #[test]
    fn test_fail_fast_reports_value() {
        let err = resolve_classes(&ids(&[0, 4]), 4, 1, IndexPolicy::FailFast).unwrap_err();
        assert_eq!(err, TesselError::IndexOutOfRange { index: 4, size: 4, axis: 1 });

        let err = resolve_classes(&ids(&[-1]), 4, 0, IndexPolicy::FailFast).unwrap_err();
        assert!(matches!(err, TesselError::IndexOutOfRange { index: -1, .. }));
    }

    #[test]
    fn test_clip_and_skip() {
        let r = resolve_classes(&ids(&[-3, 1, 9]), 4, 0, IndexPolicy::Clip).unwrap();
        assert_eq!(r.positions, vec![Some(0), Some(1), Some(3)]);
        assert_eq!(r.adjusted, 2);

        let r = resolve_classes(&ids(&[-3, 1, 9]), 4, 0, IndexPolicy::Skip).unwrap();
        assert_eq!(r.positions, vec![None, Some(1), None]);
    }

    #[test]
    fn test_float_indices_truncate() {
        let t = Tensor::from_f32(&[2.9, 0.2, f32::NAN], &[3]);
        let r = resolve_classes(&t, 3, 0, IndexPolicy::Skip).unwrap();
        assert_eq!(r.positions, vec![Some(2), Some(0), None]);
        assert!(resolve_classes(&t, 3, 0, IndexPolicy::FailFast).is_err());
    }

    #[test]
    fn test_rejects_bool_indices() {
        let t = Tensor::from_bool(&[true], &[1]);
        let err = resolve_classes(&t, 2, 0, IndexPolicy::FailFast).unwrap_err();
        assert!(matches!(err, TesselError::UnsupportedDType { .. }));
    }

    #[test]
    fn test_tuples_row_major() {
        // class dims [4, 5]
        let t = tuples(&[[1, 2], [3, 4], [0, 0]]);
        let r = resolve_tuples(&t, &[4, 5], 0, IndexPolicy::FailFast).unwrap();
        assert_eq!(r.positions, vec![Some(7), Some(19), Some(0)]);
    }

    #[test]
    fn test_tuples_component_axis() {
        let t = tuples(&[[1, 5]]);
        let err = resolve_tuples(&t, &[4, 5], 2, IndexPolicy::FailFast).unwrap_err();
        assert_eq!(err, TesselError::IndexOutOfRange { index: 5, size: 5, axis: 3 });

        let r = resolve_tuples(&t, &[4, 5], 2, IndexPolicy::Skip).unwrap();
        assert_eq!(r.positions, vec![None]);
        let r = resolve_tuples(&t, &[4, 5], 2, IndexPolicy::Clip).unwrap();
        assert_eq!(r.positions, vec![Some(9)]);
    }

    fn tuples<const N: usize>(rows: &[[i32; N]]) -> Tensor {
        let flat: Vec<i32> = rows.iter().flatten().copied().collect();
        Tensor::from_slice(&flat, &[rows.len(), N]).unwrap()
    }
}
