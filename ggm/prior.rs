//! Selection of the penalty strength for prior-supported edges.
//!
//! Each prior-supported edge gets a Gaussian posterior over its selection count,
//! combining the count implied by the pooled selection frequency (likelihood) with the
//! count implied by the prior weight (prior). `θ̃` is the posterior mass of the
//! one-count window around the observed count, and each lambda is scored with
//! `Σ (1 − 2θ̃)²` over the prior-supported edges. The lowest score wins.

use crate::non_prior::{SelectionError, first_argmin, validate_counts};
use ndarray::{Array2, ArrayView2, ArrayView3};
use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

/// Added to the posterior variance before taking its square root.
const VARIANCE_STABILIZER: f64 = 1e-5;

/// The outcome of [`estimate_lambda_wp`].
#[derive(Debug, Clone)]
pub struct PriorSelection {
    pub lambda_wp: f64,
    /// Position of `lambda_wp` in the lambda range.
    pub index: usize,
    /// Mean absolute distance between data-implied and prior-implied counts.
    pub tau: f64,
    /// Posterior mean count at prior-supported edges, zero elsewhere. Symmetric.
    pub posterior_mean: Array2<f64>,
    pub scores: Vec<f64>,
}

fn check_square(
    what: &'static str,
    matrix: &ArrayView2<f64>,
    p: usize,
) -> Result<(), SelectionError> {
    let (rows, cols) = matrix.dim();
    if rows != p || cols != p {
        return Err(SelectionError::ShapeMismatch {
            what,
            expected: p,
            rows,
            cols,
        });
    }
    Ok(())
}

/// Picks λ_wp for the edges marked in `prior_matrix`.
///
/// `p_k_matrix` is the pooled selection frequency from
/// [`estimate_lambda_np`](crate::non_prior::estimate_lambda_np); `edge_counts` is the
/// same `(p, p, J)` tensor it was computed from.
pub fn estimate_lambda_wp(
    data: ArrayView2<f64>,
    b: usize,
    q: usize,
    p_k_matrix: ArrayView2<f64>,
    edge_counts: ArrayView3<u32>,
    lambdas: &[f64],
    prior_matrix: ArrayView2<f64>,
) -> Result<PriorSelection, SelectionError> {
    let p = validate_counts(&edge_counts, q, lambdas)?;
    let (n, data_columns) = data.dim();
    if data_columns != p {
        return Err(SelectionError::ShapeMismatch {
            what: "data matrix",
            expected: p,
            rows: n,
            cols: data_columns,
        });
    }
    if b >= n {
        return Err(SelectionError::SubsampleTooLarge { b, n });
    }
    check_square("probability matrix", &p_k_matrix, p)?;
    check_square("prior matrix", &prior_matrix, p)?;

    let prior_edges: Vec<(usize, usize)> = (0..p)
        .flat_map(|i| ((i + 1)..p).map(move |j| (i, j)))
        .filter(|&(i, j)| prior_matrix[[i, j]] != 0.0)
        .collect();

    if prior_edges.is_empty() {
        log::warn!(
            "The prior matrix marks no edges; defaulting the prior lambda to {}",
            lambdas[0]
        );
        return Ok(PriorSelection {
            lambda_wp: lambdas[0],
            index: 0,
            tau: 0.0,
            posterior_mean: Array2::zeros((p, p)),
            scores: vec![0.0; lambdas.len()],
        });
    }

    let q_f = q as f64;
    let num_edges = prior_edges.len() as f64;

    // Likelihood mean and variance from the pooled frequency, prior mean from the weight.
    let mus: Vec<f64> = prior_edges.iter().map(|&(i, j)| p_k_matrix[[i, j]] * q_f).collect();
    let variances: Vec<f64> = prior_edges
        .iter()
        .map(|&(i, j)| {
            let pk = p_k_matrix[[i, j]];
            pk * (1.0 - pk) * q_f
        })
        .collect();
    let psis: Vec<f64> = prior_edges.iter().map(|&(i, j)| prior_matrix[[i, j]] * q_f).collect();

    let tau = mus
        .iter()
        .zip(&psis)
        .map(|(mu, psi)| (mu - psi).abs())
        .sum::<f64>()
        / num_edges;
    let tau_sq = tau * tau;

    let mut posterior_mean = Array2::<f64>::zeros((p, p));
    let mut posterior_sd = Vec::with_capacity(prior_edges.len());
    for (e, &(i, j)) in prior_edges.iter().enumerate() {
        let total = variances[e] + tau_sq;
        let (mean, variance) = if total > 0.0 {
            (
                (mus[e] * tau_sq + psis[e] * variances[e]) / total,
                variances[e] * tau_sq / total,
            )
        } else {
            (mus[e], 0.0)
        };
        posterior_mean[[i, j]] = mean;
        posterior_mean[[j, i]] = mean;
        posterior_sd.push((variance + VARIANCE_STABILIZER).sqrt());
    }

    let scores: Vec<f64> = (0..lambdas.len())
        .map(|l| {
            prior_edges
                .iter()
                .zip(&posterior_sd)
                .map(|(&(i, j), &sd)| {
                    let count = f64::from(edge_counts[[i, j, l]]);
                    let mean = posterior_mean[[i, j]];
                    let z_plus = (count + 1.0 - mean) / sd;
                    let z_minus = (count - 1.0 - mean) / sd;
                    let theta = 0.5 * (erf(z_plus / SQRT_2) - erf(z_minus / SQRT_2));
                    (1.0 - 2.0 * theta).powi(2)
                })
                .sum()
        })
        .collect();

    let index = first_argmin(&scores);
    log::info!(
        "Selected prior lambda {:.4} (index {} of {}) over {} prior edges, tau = {:.4}",
        lambdas[index],
        index,
        lambdas.len(),
        prior_edges.len(),
        tau
    );

    Ok(PriorSelection {
        lambda_wp: lambdas[index],
        index,
        tau,
        posterior_mean,
        scores,
    })
}
