//! Sparse matrix helpers on top of `sprs`
//!
//! All SAR matrices (affinity, co-occurrence, similarity) are CSR with
//! sorted column indices and no explicit zeros.

use crate::error::{Result, SarError};
use sprs::CsMat;

pub type SparseMatrix = CsMat<f64>;

/// Build a CSR matrix from per-row `(column, value)` lists.
///
/// Each row must be sorted by column and free of duplicates. Zero values
/// are skipped.
pub fn from_rows(shape: (usize, usize), rows: Vec<Vec<(usize, f64)>>) -> Result<SparseMatrix> {
    let (n_rows, n_cols) = shape;
    if rows.len() != n_rows {
        return Err(SarError::Matrix {
            message: format!("expected {} rows, got {}", n_rows, rows.len()),
        });
    }

    let nnz = rows.iter().map(Vec::len).sum();
    let mut indptr = Vec::with_capacity(n_rows + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut data = Vec::with_capacity(nnz);
    indptr.push(0);

    for row in rows {
        for (col, value) in row {
            if value != 0.0 {
                indices.push(col);
                data.push(value);
            }
        }
        indptr.push(indices.len());
    }

    CsMat::try_new((n_rows, n_cols), indptr, indices, data).map_err(|(_, _, _, err)| {
        SarError::Matrix {
            message: err.to_string(),
        }
    })
}

/// Rebuild a matrix from `(row, col, value)` triplets, summing duplicates.
pub fn from_triplets(shape: (usize, usize), triplets: &[(usize, usize, f64)]) -> Result<SparseMatrix> {
    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); shape.0];

    for &(row, col, value) in triplets {
        if row >= shape.0 || col >= shape.1 {
            return Err(SarError::Matrix {
                message: format!(
                    "entry ({}, {}) out of bounds for shape {:?}",
                    row, col, shape
                ),
            });
        }
        rows[row].push((col, value));
    }

    let rows = rows
        .into_iter()
        .map(|mut row| {
            row.sort_by_key(|&(col, _)| col);
            let mut merged: Vec<(usize, f64)> = Vec::with_capacity(row.len());
            for (col, value) in row {
                match merged.last_mut() {
                    Some((last, acc)) if *last == col => *acc += value,
                    _ => merged.push((col, value)),
                }
            }
            merged
        })
        .collect();

    from_rows(shape, rows)
}

/// Flatten to `(row, col, value)` triplets in row-major order.
pub fn to_triplets(matrix: &SparseMatrix) -> Vec<(usize, usize, f64)> {
    let mut triplets = Vec::with_capacity(matrix.nnz());
    for (row, view) in matrix.outer_iterator().enumerate() {
        for (col, &value) in view.iter() {
            triplets.push((row, col, value));
        }
    }
    triplets
}

/// Value at `(row, col)`, zero when not stored.
pub fn value_at(matrix: &SparseMatrix, row: usize, col: usize) -> f64 {
    matrix.get(row, col).copied().unwrap_or(0.0)
}

/// Column indices of the strictly positive entries of `row`.
pub fn positive_columns(matrix: &SparseMatrix, row: usize) -> Vec<usize> {
    match matrix.outer_view(row) {
        Some(view) => view
            .iter()
            .filter(|(_, value)| **value > 0.0)
            .map(|(col, _)| col)
            .collect(),
        None => Vec::new(),
    }
}

/// `B[u,i] = 1` where `A[u,i] > 0`.
pub fn binarize(matrix: &SparseMatrix) -> Result<SparseMatrix> {
    let rows = matrix
        .outer_iterator()
        .map(|view| {
            view.iter()
                .filter(|(_, value)| **value > 0.0)
                .map(|(col, _)| (col, 1.0))
                .collect()
        })
        .collect();

    from_rows(matrix.shape(), rows)
}

/// Dense scratch row for Gustavson-style sparse products.
pub(crate) struct RowAccumulator {
    values: Vec<f64>,
    occupied: Vec<bool>,
    touched: Vec<usize>,
}

impl RowAccumulator {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            values: vec![0.0; width],
            occupied: vec![false; width],
            touched: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, col: usize, value: f64) {
        if !self.occupied[col] {
            self.occupied[col] = true;
            self.touched.push(col);
        }
        self.values[col] += value;
    }

    /// Sorted non-zero entries; leaves the accumulator empty.
    pub(crate) fn drain_sorted(&mut self) -> Vec<(usize, f64)> {
        self.touched.sort_unstable();
        let mut row = Vec::with_capacity(self.touched.len());
        for &col in &self.touched {
            let value = self.values[col];
            if value != 0.0 {
                row.push((col, value));
            }
            self.values[col] = 0.0;
            self.occupied[col] = false;
        }
        self.touched.clear();
        row
    }
}
