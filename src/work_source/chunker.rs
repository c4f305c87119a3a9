//! Fixed-size, order-preserving partitioning of a work list

use log::debug;

use crate::harvest_engine::errors::{HarvestError, HarvestResult};

/// Split `items` into consecutive chunks of `chunk_size`
///
/// Returns `ceil(len / chunk_size)` chunks; every chunk holds exactly
/// `chunk_size` items except possibly the last. Concatenating the chunks
/// yields the input in its original order.
///
/// # Errors
/// `InvalidConfiguration` when `chunk_size` is zero.
pub fn chunk_items<T: Clone>(items: &[T], chunk_size: usize) -> HarvestResult<Vec<Vec<T>>> {
    if chunk_size == 0 {
        return Err(HarvestError::config("chunk_size must be > 0"));
    }

    let chunks: Vec<Vec<T>> = items.chunks(chunk_size).map(<[T]>::to_vec).collect();

    debug!(
        "Split {} items into {} chunks of size {}",
        items.len(),
        chunks.len(),
        chunk_size
    );

    Ok(chunks)
}

/// Signed entry point for callers holding an untrusted size
///
/// # Errors
/// `InvalidConfiguration` when `chunk_size` is not positive.
pub fn chunk_items_checked<T: Clone>(items: &[T], chunk_size: i64) -> HarvestResult<Vec<Vec<T>>> {
    let size = usize::try_from(chunk_size)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| HarvestError::config(format!("chunk_size must be > 0, got {chunk_size}")))?;
    chunk_items(items, size)
}
