//! Selection of the penalty strength for edges without prior support.
//!
//! For every lambda the observed edge counts are compared against a binomial null in
//! which each of the `Q` sub-samples selects an edge with the average edge probability
//! `π_j` of that lambda. θ is the null probability of each observed count and every
//! lambda is scored with `Σ (1 − 2θ)²`, accumulated towards the larger lambdas and
//! discounted by position. The lowest score wins.

use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};
use statrs::function::factorial::ln_binomial;
use thiserror::Error;

/// Shape and count problems shared by both selectors.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("The number of sub-samples must be at least 1.")]
    NoSubsamples,

    #[error("The lambda range is empty.")]
    EmptyLambdaRange,

    #[error("The edge counts cover {counts} lambdas but {lambdas} were given.")]
    LambdaCountMismatch { counts: usize, lambdas: usize },

    #[error("Edge counts must be p x p x J, got {rows} x {cols}.")]
    NonSquareCounts { rows: usize, cols: usize },

    #[error("The {what} is {rows} x {cols} but the edge counts are over {expected} variables.")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Edge count {count} exceeds the number of sub-samples ({q}).")]
    CountExceedsSubsamples { count: u32, q: usize },

    #[error("Sub-sample size {b} must be smaller than the number of rows ({n}).")]
    SubsampleTooLarge { b: usize, n: usize },
}

/// The outcome of [`estimate_lambda_np`].
#[derive(Debug, Clone)]
pub struct NonPriorSelection {
    pub lambda_np: f64,
    /// Position of `lambda_np` in the lambda range.
    pub index: usize,
    /// Discounted score per lambda; the selected index is its first minimum.
    pub scores: Vec<f64>,
    /// Selection frequency of every entry, pooled over all lambdas: `Σ_j counts / (Q·J)`.
    pub p_k_matrix: Array2<f64>,
    /// Binomial probability of each observed count, shape `(p, p, J)`.
    pub theta: Array3<f64>,
}

/// Checks the edge-count tensor against `q` and the lambda range. Returns `p`.
pub(crate) fn validate_counts(
    edge_counts: &ArrayView3<u32>,
    q: usize,
    lambdas: &[f64],
) -> Result<usize, SelectionError> {
    if q == 0 {
        return Err(SelectionError::NoSubsamples);
    }
    if lambdas.is_empty() {
        return Err(SelectionError::EmptyLambdaRange);
    }
    let (rows, cols, num_lambdas) = edge_counts.dim();
    if rows != cols {
        return Err(SelectionError::NonSquareCounts { rows, cols });
    }
    if num_lambdas != lambdas.len() {
        return Err(SelectionError::LambdaCountMismatch {
            counts: num_lambdas,
            lambdas: lambdas.len(),
        });
    }
    if let Some(&count) = edge_counts.iter().find(|&&c| c as usize > q) {
        return Err(SelectionError::CountExceedsSubsamples { count, q });
    }
    Ok(rows)
}

/// `C(q, z)·π^z·(1 − π)^(q − z)`, exact at `π ∈ {0, 1}`.
pub(crate) fn binomial_pmf(q: u64, z: u64, pi: f64) -> f64 {
    if pi <= 0.0 {
        return if z == 0 { 1.0 } else { 0.0 };
    }
    if pi >= 1.0 {
        return if z == q { 1.0 } else { 0.0 };
    }
    let log_pmf = ln_binomial(q, z) + z as f64 * pi.ln() + (q - z) as f64 * (1.0 - pi).ln();
    log_pmf.exp()
}

/// Index of the first minimum, ignoring NaN scores. Zero when every score is NaN.
pub(crate) fn first_argmin(scores: &[f64]) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score >= current => {}
            _ => best = Some((index, score)),
        }
    }
    best.map_or(0, |(index, _)| index)
}

/// Picks λ_np from the `(p, p, J)` edge-count tensor of `q` sub-samples.
pub fn estimate_lambda_np(
    edge_counts: ArrayView3<u32>,
    q: usize,
    lambdas: &[f64],
) -> Result<NonPriorSelection, SelectionError> {
    let p = validate_counts(&edge_counts, q, lambdas)?;
    let num_lambdas = lambdas.len();
    let q_f = q as f64;

    let p_k_matrix = edge_counts
        .mapv(f64::from)
        .sum_axis(Axis(2))
        .mapv(|total| total / (q_f * num_lambdas as f64));

    let off_diagonal_pairs = (p * p.saturating_sub(1)) as f64;
    let mut theta = Array3::<f64>::zeros((p, p, num_lambdas));
    let mut raw_scores = Vec::with_capacity(num_lambdas);

    for j in 0..num_lambdas {
        let counts = edge_counts.index_axis(Axis(2), j);
        let off_diagonal_total: u64 = counts
            .indexed_iter()
            .filter(|((i, k), _)| i != k)
            .map(|(_, &c)| u64::from(c))
            .sum();
        let pi = if off_diagonal_pairs > 0.0 {
            off_diagonal_total as f64 / (q_f * off_diagonal_pairs)
        } else {
            0.0
        };

        let mut theta_j = theta.index_axis_mut(Axis(2), j);
        Zip::from(&mut theta_j)
            .and(&counts)
            .for_each(|t, &c| *t = binomial_pmf(q as u64, u64::from(c), pi));

        let score: f64 = theta_j.iter().map(|&t| (1.0 - 2.0 * t).powi(2)).sum();
        log::debug!(
            "lambda {:.4}: average edge probability {:.4}, raw score {:.4}",
            lambdas[j],
            pi,
            score
        );
        raw_scores.push(score);
    }

    // Sum over this and all larger lambdas, discounted by the position.
    let mut scores = vec![0.0; num_lambdas];
    let mut tail = 0.0;
    for j in (0..num_lambdas).rev() {
        tail += raw_scores[j];
        scores[j] = tail / (j + 1) as f64;
    }

    let index = first_argmin(&scores);
    log::info!(
        "Selected non-prior lambda {:.4} (index {} of {})",
        lambdas[index],
        index,
        num_lambdas
    );

    Ok(NonPriorSelection {
        lambda_np: lambdas[index],
        index,
        scores,
        p_k_matrix,
        theta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn binomial_pmf_matches_closed_form_and_edges() {
        assert_abs_diff_eq!(binomial_pmf(4, 2, 0.5), 6.0 / 16.0, epsilon = 1e-12);
        assert_abs_diff_eq!(binomial_pmf(3, 0, 0.2), 0.512, epsilon = 1e-12);
        assert_eq!(binomial_pmf(5, 0, 0.0), 1.0);
        assert_eq!(binomial_pmf(5, 1, 0.0), 0.0);
        assert_eq!(binomial_pmf(5, 5, 1.0), 1.0);
        assert_eq!(binomial_pmf(5, 4, 1.0), 0.0);
        let total: f64 = (0..=20).map(|z| binomial_pmf(20, z, 0.3)).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn argmin_takes_first_minimum_and_skips_nan() {
        assert_eq!(first_argmin(&[3.0, 1.0, 1.0, 2.0]), 1);
        assert_eq!(first_argmin(&[f64::NAN, 2.0, 5.0]), 1);
        assert_eq!(first_argmin(&[f64::NAN]), 0);
    }

    #[test]
    fn all_zero_counts_favour_the_last_lambda() {
        // Every θ is 1 at π = 0, so each raw score is p² and the discount decides.
        let counts = Array3::<u32>::zeros((3, 3, 4));
        let lambdas = [0.1, 0.2, 0.3, 0.4];
        let selection = estimate_lambda_np(counts.view(), 10, &lambdas).unwrap();

        let expected: Vec<f64> = (0..4).map(|j| 9.0 * (4 - j) as f64 / (j + 1) as f64).collect();
        for (score, want) in selection.scores.iter().zip(&expected) {
            assert_abs_diff_eq!(*score, *want, epsilon = 1e-12);
        }
        assert_eq!(selection.index, 3);
        assert_eq!(selection.lambda_np, 0.4);
        assert!(selection.p_k_matrix.iter().all(|&pk| pk == 0.0));
        assert_eq!(selection.theta.dim(), (3, 3, 4));
    }

    #[test]
    fn probability_matrix_pools_all_lambdas() {
        let mut counts = Array3::<u32>::zeros((2, 2, 2));
        counts[[0, 1, 0]] = 4;
        counts[[1, 0, 0]] = 4;
        counts[[0, 1, 1]] = 2;
        counts[[1, 0, 1]] = 2;
        let selection = estimate_lambda_np(counts.view(), 4, &[0.1, 0.2]).unwrap();
        assert_abs_diff_eq!(selection.p_k_matrix[[0, 1]], 6.0 / 8.0, epsilon = 1e-15);
        assert_abs_diff_eq!(selection.p_k_matrix[[1, 0]], 6.0 / 8.0, epsilon = 1e-15);

        // Lambda 0: π = 1, every off-diagonal count equals Q and θ = 1 there.
        assert_eq!(selection.theta[[0, 1, 0]], 1.0);
        // Lambda 1: π = 1/2, θ = C(4, 2)/16.
        assert_abs_diff_eq!(selection.theta[[0, 1, 1]], 0.375, epsilon = 1e-12);
        assert!([0.1, 0.2].contains(&selection.lambda_np));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let counts = Array3::<u32>::zeros((3, 3, 2));
        assert!(matches!(
            estimate_lambda_np(counts.view(), 0, &[0.1, 0.2]),
            Err(SelectionError::NoSubsamples)
        ));
        assert!(matches!(
            estimate_lambda_np(counts.view(), 5, &[0.1]),
            Err(SelectionError::LambdaCountMismatch { counts: 2, lambdas: 1 })
        ));
        let mut too_many = counts.clone();
        too_many[[0, 1, 0]] = 9;
        assert!(matches!(
            estimate_lambda_np(too_many.view(), 5, &[0.1, 0.2]),
            Err(SelectionError::CountExceedsSubsamples { count: 9, q: 5 })
        ));
    }
}
