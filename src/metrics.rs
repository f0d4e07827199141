//! Clustering quality measures against ground-truth labels.

use std::collections::BTreeMap;

use itertools::Itertools;
use ndarray::Array2;

use crate::assignment::linear_sum_assignment;
use crate::error::{DecError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMetrics {
    pub accuracy: f64,
    pub nmi: f64,
    pub ari: f64,
}

impl ClusterMetrics {
    pub fn compute(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        Ok(Self {
            accuracy: cluster_accuracy(y_true, y_pred)?,
            nmi: normalized_mutual_info(y_true, y_pred)?,
            ari: adjusted_rand_index(y_true, y_pred)?,
        })
    }
}

fn check_labels(y_true: &[usize], y_pred: &[usize]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(DecError::shape("label arrays", &[y_true.len()], &[y_pred.len()]));
    }
    if y_true.is_empty() {
        return Err(DecError::EmptyInput("label arrays"));
    }
    Ok(())
}

/// Accuracy under the best one-to-one mapping of cluster ids onto labels.
///
/// Cluster ids and labels share one `D × D` contingency matrix, `D = max id + 1`, so
/// differing cardinalities are tolerated. The mapping is found with an exact assignment
/// solver on `max(w) - w`.
pub fn cluster_accuracy(y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
    check_labels(y_true, y_pred)?;
    let size = y_true.iter().chain(y_pred.iter()).copied().max().unwrap_or(0) + 1;

    let mut w = Array2::<usize>::zeros((size, size));
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        w[[p, t]] += 1;
    }
    let max = w.iter().copied().max().unwrap_or(0);
    let cost = w.mapv(|count| (max - count) as f64);

    let matched: usize = linear_sum_assignment(cost.view())?
        .into_iter()
        .map(|(p, t)| w[[p, t]])
        .sum();
    Ok(matched as f64 / y_pred.len() as f64)
}

/// Compact contingency table over the distinct values of both labelings.
fn contingency(y_true: &[usize], y_pred: &[usize]) -> Array2<f64> {
    let index = |labels: &[usize]| -> BTreeMap<usize, usize> {
        labels.iter().copied().unique().sorted().enumerate().map(|(i, l)| (l, i)).collect()
    };
    let classes = index(y_true);
    let clusters = index(y_pred);

    let mut table = Array2::<f64>::zeros((classes.len(), clusters.len()));
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        table[[classes[t], clusters[p]]] += 1.0;
    }
    table
}

fn entropy(counts: impl Iterator<Item = f64>, n: f64) -> f64 {
    counts
        .filter(|&c| c > 0.0)
        .map(|c| {
            let p = c / n;
            -p * p.ln()
        })
        .sum()
}

/// Normalized mutual information with arithmetic-mean normalization.
pub fn normalized_mutual_info(y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
    check_labels(y_true, y_pred)?;
    let table = contingency(y_true, y_pred);
    let (n_classes, n_clusters) = table.dim();
    // Two single-cluster labelings agree perfectly.
    if n_classes == 1 && n_clusters == 1 {
        return Ok(1.0);
    }

    let n = y_true.len() as f64;
    let row_sums = table.sum_axis(ndarray::Axis(1));
    let col_sums = table.sum_axis(ndarray::Axis(0));

    let mut mutual_info = 0.0;
    for ((i, j), &count) in table.indexed_iter() {
        if count > 0.0 {
            mutual_info += count / n * (n * count / (row_sums[i] * col_sums[j])).ln();
        }
    }
    if mutual_info <= 0.0 {
        return Ok(0.0);
    }

    let h_true = entropy(row_sums.iter().copied(), n);
    let h_pred = entropy(col_sums.iter().copied(), n);
    let normalizer = (h_true + h_pred) / 2.0;
    Ok((mutual_info / normalizer).min(1.0))
}

fn pairs(count: f64) -> f64 {
    count * (count - 1.0) / 2.0
}

/// Rand index adjusted for chance.
pub fn adjusted_rand_index(y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
    check_labels(y_true, y_pred)?;
    let table = contingency(y_true, y_pred);

    let index: f64 = table.iter().map(|&c| pairs(c)).sum();
    let sum_rows: f64 = table.sum_axis(ndarray::Axis(1)).iter().map(|&c| pairs(c)).sum();
    let sum_cols: f64 = table.sum_axis(ndarray::Axis(0)).iter().map(|&c| pairs(c)).sum();
    let total_pairs = pairs(y_true.len() as f64);
    if total_pairs == 0.0 {
        return Ok(1.0);
    }

    let expected = sum_rows * sum_cols / total_pairs;
    let max_index = (sum_rows + sum_cols) / 2.0;
    if (max_index - expected).abs() < f64::EPSILON {
        // Both labelings are trivial (one cluster, or all singletons) and identical in shape.
        return Ok(1.0);
    }
    Ok((index - expected) / (max_index - expected))
}

/// Counts with true labels along rows and predicted clusters along columns.
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize]) -> Result<Array2<usize>> {
    check_labels(y_true, y_pred)?;
    let size = y_true.iter().chain(y_pred.iter()).copied().max().unwrap_or(0) + 1;
    let mut matrix = Array2::<usize>::zeros((size, size));
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        matrix[[t, p]] += 1;
    }
    Ok(matrix)
}

/// Plain-text rendering of a confusion matrix for the run log.
pub fn format_confusion_matrix(matrix: &Array2<usize>) -> String {
    let width = matrix
        .iter()
        .map(|v| v.to_string().len())
        .chain(std::iter::once(matrix.ncols().to_string().len()))
        .max()
        .unwrap_or(1)
        .max(4);

    let header = (0..matrix.ncols()).map(|c| format!("{:>width$}", c, width = width)).join(" ");
    let mut lines = vec![format!("{:>6} | {}", "true", header)];
    for (label, row) in matrix.outer_iter().enumerate() {
        let cells = row.iter().map(|v| format!("{:>width$}", v, width = width)).join(" ");
        lines.push(format!("{:>6} | {}", label, cells));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use itertools::Itertools;
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    fn synthetic_labels(rng: &mut StdRng) -> Vec<usize> {
        (0..50).map(|_| rng.gen_range(0..5)).collect()
    }

    #[test]
    fn bijective_relabeling_is_perfect() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..10 {
            let y_true = synthetic_labels(&mut rng);
            let mut mapping: Vec<usize> = (0..5).collect();
            mapping.shuffle(&mut rng);
            let y_pred = y_true.iter().map(|&l| mapping[l]).collect_vec();
            assert_eq!(cluster_accuracy(&y_true, &y_pred).unwrap(), 1.0);
        }
    }

    #[test]
    fn accuracy_ignores_cluster_permutations() {
        let mut rng = StdRng::seed_from_u64(17);
        let y_true = synthetic_labels(&mut rng);
        let y_pred = synthetic_labels(&mut rng);
        let reference = cluster_accuracy(&y_true, &y_pred).unwrap();
        for perm in (0..5).permutations(5) {
            let permuted = y_pred.iter().map(|&c| perm[c]).collect_vec();
            assert_eq!(cluster_accuracy(&y_true, &permuted).unwrap(), reference);
        }
    }

    #[test]
    fn accuracy_uses_optimal_matching() {
        // Taking the largest cell first (cluster 0 -> label 0, 3 hits) leaves cluster 1 with
        // nothing; the optimal matching is 0 -> 1 and 1 -> 0 for 4 hits.
        let y_true = vec![0, 0, 0, 1, 1, 0, 0];
        let y_pred = vec![0, 0, 0, 0, 0, 1, 1];
        assert_abs_diff_eq!(cluster_accuracy(&y_true, &y_pred).unwrap(), 4.0 / 7.0);
    }

    #[test]
    fn accuracy_tolerates_more_clusters_than_labels() {
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 2, 1, 1];
        assert_abs_diff_eq!(cluster_accuracy(&y_true, &y_pred).unwrap(), 0.75);
    }

    #[test]
    fn ragged_labels_are_a_shape_error() {
        let err = cluster_accuracy(&[0, 1, 2], &[0, 1]).unwrap_err();
        assert!(matches!(err, DecError::ShapeMismatch { .. }));
        assert!(matches!(normalized_mutual_info(&[], &[]), Err(DecError::EmptyInput(_))));
    }

    #[test]
    fn nmi_and_ari_of_identical_partitions() {
        let y = vec![0, 0, 1, 1, 2, 2];
        let relabeled = vec![2, 2, 0, 0, 1, 1];
        assert_abs_diff_eq!(normalized_mutual_info(&y, &relabeled).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(adjusted_rand_index(&y, &relabeled).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn independent_partitions_score_zero() {
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 1, 0, 1];
        assert_abs_diff_eq!(normalized_mutual_info(&y_true, &y_pred).unwrap(), 0.0, epsilon = 1e-12);
        assert!(adjusted_rand_index(&y_true, &y_pred).unwrap() < 0.0);
    }

    #[test]
    fn ari_known_value() {
        // sklearn: adjusted_rand_score([0, 0, 1, 1], [0, 0, 1, 2]) == 0.5714285714285715
        let ari = adjusted_rand_index(&[0, 0, 1, 1], &[0, 0, 1, 2]).unwrap();
        assert_abs_diff_eq!(ari, 4.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn nmi_known_value() {
        // sklearn: normalized_mutual_info_score([0, 0, 1, 1], [0, 0, 1, 2]) == 0.8
        let nmi = normalized_mutual_info(&[0, 0, 1, 1], &[0, 0, 1, 2]).unwrap();
        assert_abs_diff_eq!(nmi, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn confusion_matrix_rows_are_true_labels() {
        let matrix = confusion_matrix(&[0, 0, 1, 2], &[1, 1, 0, 2]).unwrap();
        assert_eq!(matrix[[0, 1]], 2);
        assert_eq!(matrix[[1, 0]], 1);
        assert_eq!(matrix[[2, 2]], 1);
        assert_eq!(matrix.sum(), 4);
        let text = format_confusion_matrix(&matrix);
        assert_eq!(text.lines().count(), 4);
    }
}
