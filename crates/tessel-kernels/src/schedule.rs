//! Work splitting over the rayon pool.
//!
//! Two shapes of parallel work show up in the transfer kernels:
//! - disjoint destination blocks (one per outer index), written with
//!   `par_chunks_mut`;
//! - many contributions into one shared block, handled by accumulating into
//!   private per-partition buffers and merging them at the end.

use rayon::prelude::*;
use tessel_core::Element;

/// Run `body(block_index, block)` over consecutive `block_len` chunks of `dst`.
pub(crate) fn for_each_block<T, F>(dst: &mut [T], block_len: usize, parallel: bool, body: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if block_len == 0 || dst.is_empty() {
        return;
    }
    if parallel {
        dst.par_chunks_mut(block_len)
            .enumerate()
            .for_each(|(i, block)| body(i, block));
    } else {
        for (i, block) in dst.chunks_mut(block_len).enumerate() {
            body(i, block);
        }
    }
}

/// Apply `contribute(item, acc)` for every item in `0..items`, accumulating
/// into `dst`.
///
/// In parallel mode each rayon partition accumulates into its own zeroed copy
/// of `dst`; partitions are combined pairwise and the result merged into
/// `dst` once. `contribute` must only ever `accumulate` into `acc`.
pub(crate) fn accumulate_items<T, F>(dst: &mut [T], items: usize, parallel: bool, contribute: F)
where
    T: Element,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if !parallel || items < 2 {
        for item in 0..items {
            contribute(item, dst);
        }
        return;
    }

    let len = dst.len();
    let per_partition = items.div_ceil(rayon::current_num_threads()).max(1);
    let partial = (0..items)
        .into_par_iter()
        .with_min_len(per_partition)
        .fold(
            || vec![T::zero(); len],
            |mut acc, item| {
                contribute(item, &mut acc);
                acc
            },
        )
        .reduce_with(|mut left, right| {
            merge(&mut left, &right);
            left
        });

    if let Some(partial) = partial {
        merge(dst, &partial);
    }
}

#[inline]
fn merge<T: Element>(dst: &mut [T], src: &[T]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        d.accumulate(s);
    }
}
