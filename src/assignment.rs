use ndarray::ArrayView2;

use crate::error::{DecError, Result};

/// Solves the linear sum assignment problem: picks one column per row (or one row per
/// column when there are more rows) so that the summed cost is minimal.
///
/// Returns `(row, col)` pairs sorted by row. Shortest augmenting paths with dual
/// potentials, `O(n² m)` for an `n × m` matrix with `n <= m`.
pub fn linear_sum_assignment(cost: ArrayView2<f64>) -> Result<Vec<(usize, usize)>> {
    if cost.iter().any(|c| !c.is_finite()) {
        return Err(DecError::invalid("cost", "assignment costs must be finite"));
    }
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return Ok(Vec::new());
    }

    if rows > cols {
        let mut pairs: Vec<(usize, usize)> = solve(cost.t()).into_iter().map(|(c, r)| (r, c)).collect();
        pairs.sort_unstable();
        return Ok(pairs);
    }
    Ok(solve(cost))
}

/// Requires `rows <= cols`. Indices below are 1-based; slot 0 is the virtual root.
fn solve(cost: ArrayView2<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.dim();
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    // row matched to each column, 0 = free
    let mut matched_row = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for row in 1..=n {
        matched_row[0] = row;
        let mut col0 = 0usize;
        let mut min_reduced = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[col0] = true;
            let row0 = matched_row[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0usize;
            for col in 1..=m {
                if used[col] {
                    continue;
                }
                let reduced = cost[[row0 - 1, col - 1]] - u[row0] - v[col];
                if reduced < min_reduced[col] {
                    min_reduced[col] = reduced;
                    way[col] = col0;
                }
                if min_reduced[col] < delta {
                    delta = min_reduced[col];
                    col1 = col;
                }
            }
            for col in 0..=m {
                if used[col] {
                    u[matched_row[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_reduced[col] -= delta;
                }
            }
            col0 = col1;
            if matched_row[col0] == 0 {
                break;
            }
        }

        // Flip the augmenting path back to the root.
        loop {
            let col1 = way[col0];
            matched_row[col0] = matched_row[col1];
            col0 = col1;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&col| matched_row[col] != 0)
        .map(|col| (matched_row[col] - 1, col - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use ndarray::{array, Array2};
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    use rand::{rngs::StdRng, SeedableRng};

    fn total(cost: &Array2<f64>, pairs: &[(usize, usize)]) -> f64 {
        pairs.iter().map(|&(r, c)| cost[[r, c]]).sum()
    }

    #[test]
    fn small_square_problem() {
        let cost = array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        let pairs = linear_sum_assignment(cost.view()).unwrap();
        assert_eq!(pairs, vec![(0, 1), (1, 0), (2, 2)]);
        assert_eq!(total(&cost, &pairs), 5.0);
    }

    #[test]
    fn wide_and_tall_matrices() {
        let wide = array![[10.0, 1.0, 7.0, 3.0], [2.0, 9.0, 8.0, 4.0]];
        let pairs = linear_sum_assignment(wide.view()).unwrap();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);

        let tall = wide.t().to_owned();
        let pairs = linear_sum_assignment(tall.view()).unwrap();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn agrees_with_brute_force() {
        let mut rng = StdRng::seed_from_u64(21);
        for n in 1..=6 {
            let cost = Array2::random_using((n, n), Uniform::new(0.0, 100.0), &mut rng);
            let pairs = linear_sum_assignment(cost.view()).unwrap();
            assert_eq!(pairs.len(), n);
            assert!(pairs.iter().map(|&(_, c)| c).all_unique());

            let best = (0..n)
                .permutations(n)
                .map(|perm| perm.iter().enumerate().map(|(r, &c)| cost[[r, c]]).sum::<f64>())
                .fold(f64::INFINITY, f64::min);
            assert!((total(&cost, &pairs) - best).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_non_finite_costs() {
        let cost = array![[1.0, f64::NAN], [0.0, 1.0]];
        assert!(linear_sum_assignment(cost.view()).is_err());
    }

    #[test]
    fn empty_matrix_has_no_pairs() {
        let cost = Array2::<f64>::zeros((0, 3));
        assert!(linear_sum_assignment(cost.view()).unwrap().is_empty());
    }
}
