//! Co-occurrence & Similarity Engine
//!
//! `C = Bᵗ·B` is computed row by row (Gustavson): for item `i`, walk the
//! users who touched `i` through the item-major copy of `B`, then every
//! item those users touched. Rows are independent, so they run on rayon
//! when `parallel` is set and are assembled in item order either way.

use crate::config::SimilarityMetric;
use crate::error::Result;
use crate::matrix::{self, RowAccumulator, SparseMatrix};
use rayon::prelude::*;

impl SimilarityMetric {
    /// Similarity of items `i` and `j` from `C[i,j]`, `C[i,i]`, `C[j,j]`.
    ///
    /// A zero denominator yields 0.
    pub fn score(self, cij: f64, cii: f64, cjj: f64) -> f64 {
        match self {
            SimilarityMetric::Jaccard => safe_div(cij, cii + cjj - cij),
            SimilarityMetric::Lift => safe_div(cij, cii * cjj),
            SimilarityMetric::Cosine => safe_div(cij, (cii * cjj).sqrt()),
            SimilarityMetric::Count => cij,
            SimilarityMetric::InclusionIndex => safe_div(cij, cii.min(cjj)),
        }
    }
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn collect_rows<F>(n_rows: usize, width: usize, parallel: bool, row_for: F) -> Vec<Vec<(usize, f64)>>
where
    F: Fn(&mut RowAccumulator, usize) -> Vec<(usize, f64)> + Sync,
{
    if parallel {
        (0..n_rows)
            .into_par_iter()
            .map_init(|| RowAccumulator::new(width), |acc, row| row_for(acc, row))
            .collect()
    } else {
        let mut acc = RowAccumulator::new(width);
        (0..n_rows).map(|row| row_for(&mut acc, row)).collect()
    }
}

/// Item-item co-occurrence counts from the binary affinity matrix.
pub fn cooccurrence(binary: &SparseMatrix, parallel: bool) -> Result<SparseMatrix> {
    let n_items = binary.cols();
    let by_item = binary.to_csc();

    let rows = collect_rows(n_items, n_items, parallel, |acc, item| {
        if let Some(users) = by_item.outer_view(item) {
            for (user, _) in users.iter() {
                if let Some(items) = binary.outer_view(user) {
                    for (other, _) in items.iter() {
                        acc.add(other, 1.0);
                    }
                }
            }
        }
        acc.drain_sorted()
    });

    matrix::from_rows((n_items, n_items), rows)
}

/// Drop co-occurrence counts below `threshold`.
pub fn apply_threshold(cooccurrence: &SparseMatrix, threshold: u32) -> Result<SparseMatrix> {
    if threshold <= 1 {
        return Ok(cooccurrence.clone());
    }
    let threshold = f64::from(threshold);

    let rows = cooccurrence
        .outer_iterator()
        .map(|view| {
            view.iter()
                .filter(|(_, count)| **count >= threshold)
                .map(|(col, &count)| (col, count))
                .collect()
        })
        .collect();

    matrix::from_rows(cooccurrence.shape(), rows)
}

/// `C[i,i]` for every item.
pub fn item_popularity(cooccurrence: &SparseMatrix) -> Vec<f64> {
    (0..cooccurrence.rows())
        .map(|item| matrix::value_at(cooccurrence, item, item))
        .collect()
}

/// Convert co-occurrence counts into similarity under `metric`.
///
/// Normalized metrics get a unit diagonal; raw counts keep popularity
/// on the diagonal.
pub fn similarity(
    cooccurrence: &SparseMatrix,
    metric: SimilarityMetric,
    parallel: bool,
) -> Result<SparseMatrix> {
    let n_items = cooccurrence.rows();
    let popularity = item_popularity(cooccurrence);

    let row_for = |item: usize| {
        let mut row: Vec<(usize, f64)> = Vec::new();
        let mut has_diagonal = false;

        if let Some(view) = cooccurrence.outer_view(item) {
            for (other, &count) in view.iter() {
                let value = if other == item {
                    has_diagonal = true;
                    if metric.is_normalized() {
                        1.0
                    } else {
                        count
                    }
                } else {
                    metric.score(count, popularity[item], popularity[other])
                };
                row.push((other, value));
            }
        }

        if metric.is_normalized() && !has_diagonal {
            let at = row.partition_point(|&(col, _)| col < item);
            row.insert(at, (item, 1.0));
        }
        row
    };

    let rows: Vec<Vec<(usize, f64)>> = if parallel {
        (0..n_items).into_par_iter().map(row_for).collect()
    } else {
        (0..n_items).map(row_for).collect()
    };

    matrix::from_rows((n_items, n_items), rows)
}
