//! Flat offset calculator shared by every index-table kernel.

use crate::segments::Segments;

/// Flat position of `(outer, class, detail)` in a row-major
/// `[outer, num_class, detail_size]` buffer.
#[inline(always)]
pub fn offset(outer: usize, class: usize, detail: usize, num_class: usize, detail_size: usize) -> usize {
    (outer * num_class + class) * detail_size + detail
}

impl Segments {
    /// Offset into params (or the scatter output).
    #[inline(always)]
    pub fn params_offset(&self, outer: usize, class: usize, detail: usize) -> usize {
        offset(outer, class, detail, self.num_class, self.detail_size)
    }

    /// Offset into the gather output (or the scatter updates).
    #[inline(always)]
    pub fn broadcast_offset(&self, outer: usize, entry: usize, detail: usize) -> usize {
        offset(outer, entry, detail, self.broadcast_size, self.detail_size)
    }

    /// Offset into the resolved index table; `batch` comes from [`Segments::batch_of`].
    #[inline(always)]
    pub fn indices_offset(&self, batch: usize, entry: usize, repeat: usize) -> usize {
        offset(batch, entry, repeat, self.broadcast_size, self.repeat_size)
    }

    /// Batch that an outer block belongs to.
    #[inline]
    pub fn batch_of(&self, outer: usize) -> usize {
        outer.checked_div(self.prefix_size()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::Layout;

    #[test]
    fn test_offset_formula() {
        assert_eq!(offset(0, 0, 0, 5, 4), 0);
        assert_eq!(offset(1, 2, 3, 5, 4), (5 + 2) * 4 + 3);
    }

    #[test]
    fn test_offsets_match_row_major() {
        // params [2, 3, 5, 4]: axis 2, one batch dim
        let s = Segments::for_gather(&[2, 3, 5, 4], &[2, 7], &Layout::expansion(2, 1, 4)).unwrap();
        let strides = [60, 20, 4, 1];
        // element [1, 2, 3, 1] lives in outer block 1 * 3 + 2
        let outer = 5;
        assert_eq!(s.params_offset(outer, 3, 1), strides[0] + 2 * strides[1] + 3 * strides[2] + 1);
        assert_eq!(s.batch_of(outer), 1);
        assert_eq!(s.indices_offset(1, 6, 0), 13);
        // output [2, 3, 7, 4]
        assert_eq!(s.broadcast_offset(outer, 6, 2), 5 * 28 + 6 * 4 + 2);
    }
}
