//! Concurrency helper: run per-item work on a bounded pool.

use anyhow::{Context, Result};
use rayon::prelude::*;

/// Map `f` over `items` with at most `limit` in flight, preserving order.
/// Stops at the first error.
pub fn map_limited<T, R, F>(items: &[T], limit: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Sync + Fn(&T) -> Result<R>,
{
    if limit <= 1 {
        return items.iter().map(&f).collect();
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit)
        .build()
        .context("build worker pool")?;
    pool.install(|| items.par_iter().map(&f).collect())
}
