//! Top-K Ranker
//!
//! Candidates are items with a positive score that are not excluded. Seen
//! items are removed before selection, so they never take a slot. Ties are
//! broken by ascending item index.

use crate::error::{Result, SarError};
use ndarray::ArrayView1;
use std::cmp::Ordering;

pub fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(SarError::invalid_parameter("top_k", "must be greater than 0"));
    }
    Ok(())
}

/// Score descending, then item index ascending.
fn rank_order(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Select up to `k` best `(item, score)` pairs from a score row.
///
/// `exclude` must be sorted ascending.
pub fn top_k(scores: ArrayView1<'_, f64>, k: usize, exclude: &[usize]) -> Vec<(usize, f64)> {
    let mut candidates: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .filter(|&(item, &score)| score > 0.0 && exclude.binary_search(&item).is_err())
        .map(|(item, &score)| (item, score))
        .collect();

    select(&mut candidates, k);
    candidates
}

/// Keep the `k` best entries of `candidates`, sorted by rank.
pub fn select(candidates: &mut Vec<(usize, f64)>, k: usize) {
    if k == 0 {
        candidates.clear();
        return;
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, rank_order);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(rank_order);
}
