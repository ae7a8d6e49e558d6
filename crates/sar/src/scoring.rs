//! Scorer: `R = A · S`
//!
//! Scores are produced one user row at a time so callers can score any
//! subset of users without materializing the full `U × I` product.

use crate::matrix::SparseMatrix;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayViewMut1, Axis};

/// Accumulate `Σ_i a_i · S[i, ·]` into `out`.
fn accumulate(
    affinity: impl IntoIterator<Item = (usize, f64)>,
    similarity: &SparseMatrix,
    mut out: ArrayViewMut1<f64>,
) {
    for (item, weight) in affinity {
        if weight == 0.0 {
            continue;
        }
        if let Some(neighbors) = similarity.outer_view(item) {
            for (other, &sim) in neighbors.iter() {
                out[other] += weight * sim;
            }
        }
    }
}

/// Score one synthesized affinity row (on-demand queries).
pub fn score_entries(entries: &[(usize, f64)], similarity: &SparseMatrix) -> Array1<f64> {
    let mut scores = Array1::<f64>::zeros(similarity.cols());
    accumulate(entries.iter().copied(), similarity, scores.view_mut());
    scores
}

/// Score one stored user row of `affinity`.
pub fn score_user(affinity: &SparseMatrix, user: usize, similarity: &SparseMatrix) -> Array1<f64> {
    let mut scores = Array1::<f64>::zeros(similarity.cols());
    if let Some(row) = affinity.outer_view(user) {
        accumulate(row.iter().map(|(item, &w)| (item, w)), similarity, scores.view_mut());
    }
    scores
}

/// Dense score rows for `users`; `None` entries (cold users) stay zero.
pub fn score_users(
    affinity: &SparseMatrix,
    users: &[Option<usize>],
    similarity: &SparseMatrix,
    parallel: bool,
) -> Array2<f64> {
    let mut scores = Array2::<f64>::zeros((users.len(), similarity.cols()));

    let fill = |(row, out): (usize, ArrayViewMut1<f64>)| {
        if let Some(user) = users[row] {
            if let Some(affinity_row) = affinity.outer_view(user) {
                accumulate(affinity_row.iter().map(|(item, &w)| (item, w)), similarity, out);
            }
        }
    };

    if parallel {
        scores
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(fill);
    } else {
        scores.axis_iter_mut(Axis(0)).enumerate().for_each(fill);
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::from_rows;

    fn similarity() -> SparseMatrix {
        // i0-i1 = 0.5, i1-i2 = 0.25
        from_rows(
            (3, 3),
            vec![
                vec![(0, 1.0), (1, 0.5)],
                vec![(0, 0.5), (1, 1.0), (2, 0.25)],
                vec![(1, 0.25), (2, 1.0)],
            ],
        )
        .unwrap()
    }

    fn affinity() -> SparseMatrix {
        from_rows((2, 3), vec![vec![(0, 1.0), (1, 1.0)], vec![(2, 2.0)]]).unwrap()
    }

    #[test]
    fn test_score_user() {
        let scores = score_user(&affinity(), 0, &similarity());
        assert_eq!(scores.to_vec(), vec![1.5, 1.5, 0.25]);

        let scores = score_user(&affinity(), 1, &similarity());
        assert_eq!(scores.to_vec(), vec![0.0, 0.5, 2.0]);
    }

    #[test]
    fn test_score_entries_matches_stored_row() {
        let adhoc = score_entries(&[(0, 1.0), (1, 1.0)], &similarity());
        assert_eq!(adhoc, score_user(&affinity(), 0, &similarity()));
    }

    #[test]
    fn test_score_users_subset_and_cold() {
        let scores = score_users(&affinity(), &[Some(1), None, Some(0)], &similarity(), false);

        assert_eq!(scores.shape(), &[3, 3]);
        assert_eq!(scores.row(0).to_vec(), vec![0.0, 0.5, 2.0]);
        assert!(scores.row(1).iter().all(|&v| v == 0.0));
        assert_eq!(scores.row(2).to_vec(), vec![1.5, 1.5, 0.25]);
    }

    #[test]
    fn test_parallel_scoring_is_identical() {
        let users = [Some(0), Some(1), None];
        let sequential = score_users(&affinity(), &users, &similarity(), false);
        let parallel = score_users(&affinity(), &users, &similarity(), true);
        assert_eq!(sequential, parallel);
    }
}
