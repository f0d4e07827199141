use ndarray::{Array2, ArrayView2, Axis};

/// Sharpens soft assignments into the self-training target.
///
/// `w_ij = q_ij² / f_j` with `f_j = Σ_i q_ij` the soft size of cluster `j`, then every row
/// of `w` is normalized to sum to 1. Squaring pushes mass toward each sample's most likely
/// cluster; dividing by `f_j` keeps large clusters from dominating the loss.
///
/// A cluster with no mass in `q` gets a zero column instead of a division fault, and is
/// reported as degenerate.
pub fn target_distribution(q: ArrayView2<f32>) -> Array2<f32> {
    let frequency = q.sum_axis(Axis(0));

    let degenerate = frequency.iter().filter(|&&f| f <= 0.0).count();
    if degenerate > 0 {
        log::warn!(
            "{} of {} clusters received no soft assignment mass; their target weight is zero",
            degenerate,
            frequency.len()
        );
    }

    let mut weight = q.to_owned();
    for mut row in weight.axis_iter_mut(Axis(0)) {
        for (w, &f) in row.iter_mut().zip(frequency.iter()) {
            *w = if f > 0.0 { *w * *w / f } else { 0.0 };
        }
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
    weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    use rand::{rngs::StdRng, SeedableRng};

    fn random_soft_assignments(n: usize, k: usize, rng: &mut StdRng) -> Array2<f32> {
        let mut q = Array2::random_using((n, k), Uniform::new(0.0f32, 1.0), rng);
        for mut row in q.axis_iter_mut(Axis(0)) {
            let total = row.sum();
            row /= total;
        }
        q
    }

    #[test]
    fn rows_stay_distributions() {
        let mut rng = StdRng::seed_from_u64(5);
        for &(n, k) in &[(1, 2), (7, 3), (64, 10)] {
            let q = random_soft_assignments(n, k, &mut rng);
            let p = target_distribution(q.view());
            assert_eq!(p.dim(), (n, k));
            for row in p.axis_iter(Axis(0)) {
                assert!(row.iter().all(|&v| v >= 0.0));
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn one_hot_is_a_fixed_point() {
        let q = array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert_eq!(target_distribution(q.view()), q);
    }

    #[test]
    fn sharpens_toward_the_dominant_cluster() {
        let q = array![[0.6, 0.4], [0.4, 0.6]];
        let p = target_distribution(q.view());
        assert!(p[[0, 0]] > q[[0, 0]]);
        assert!(p[[1, 1]] > q[[1, 1]]);
    }

    #[test]
    fn empty_cluster_gets_zero_weight() {
        let q = array![[0.7, 0.3, 0.0], [0.2, 0.8, 0.0]];
        let p = target_distribution(q.view());
        assert!(p.iter().all(|v| v.is_finite()));
        assert_eq!(p.column(2).sum(), 0.0);
        assert_abs_diff_eq!(p.row(0).sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn frequency_division_favors_small_clusters() {
        // Sample 2 is split evenly, but cluster 1 has less total mass.
        let q = array![[0.9, 0.1], [0.9, 0.1], [0.5, 0.5]];
        let p = target_distribution(q.view());
        assert!(p[[2, 1]] > p[[2, 0]]);
    }
}
