//! # Penalized Gaussian Log-Likelihood
//!
//! The optimizer never sees a matrix. It moves through the `p(p+1)/2` entries of a
//! lower triangle (diagonal included, row-major), and every evaluation rebuilds the
//! candidate precision matrix as `P = L + Lᵗ`. The diagonal of `P` is therefore twice
//! the diagonal stored in the half vector; the regression tests in this module pin
//! that arithmetic.
//!
//! For a valid candidate the objective is
//!
//! ```text
//! -ln det(P) + tr(S P) + λ_wp Σ_{i≠j, prior≠0} |P_ij| + λ_np Σ_{i≠j, prior=0} |P_ij|
//! ```
//!
//! Candidates with a non-positive or numerically vanishing determinant evaluate to
//! `+∞`, which the line search treats as a step that went too far.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use ndarray_linalg::{Determinant, Inverse};

/// Determinants at or below this value are treated as singular.
pub const SINGULAR_DETERMINANT: f64 = 1e-8;

/// Number of free parameters for a `p × p` symmetric matrix.
pub fn half_vector_len(p: usize) -> usize {
    p * (p + 1) / 2
}

/// Packs the lower triangle (diagonal included) of a square matrix, row by row.
pub fn pack_lower(matrix: ArrayView2<f64>) -> Array1<f64> {
    let p = matrix.nrows();
    let mut packed = Vec::with_capacity(half_vector_len(p));
    for i in 0..p {
        for j in 0..=i {
            packed.push(matrix[[i, j]]);
        }
    }
    Array1::from_vec(packed)
}

/// Rebuilds `L + Lᵗ` from a packed lower triangle.
pub fn symmetric_from_half(half: ArrayView1<f64>, p: usize) -> Array2<f64> {
    debug_assert_eq!(half.len(), half_vector_len(p));
    let mut lower = Array2::<f64>::zeros((p, p));
    let mut k = 0;
    for i in 0..p {
        for j in 0..=i {
            lower[[i, j]] = half[k];
            k += 1;
        }
    }
    &lower + &lower.t()
}

/// The penalized negative log-likelihood for one empirical covariance and one pair of
/// penalty strengths.
#[derive(Debug, Clone)]
pub struct PenalizedObjective {
    covariance: Array2<f64>,
    /// Per-entry L1 weight: `λ_wp` on prior edges, `λ_np` elsewhere, zero on the diagonal.
    penalty_weights: Array2<f64>,
    p: usize,
}

impl PenalizedObjective {
    pub fn new(
        covariance: ArrayView2<f64>,
        prior_matrix: ArrayView2<f64>,
        lambda_np: f64,
        lambda_wp: f64,
    ) -> Self {
        let p = covariance.nrows();
        let penalty_weights = Array2::from_shape_fn((p, p), |(i, j)| {
            if i == j {
                0.0
            } else if prior_matrix[[i, j]] != 0.0 {
                lambda_wp
            } else {
                lambda_np
            }
        });
        Self {
            covariance: covariance.to_owned(),
            penalty_weights,
            p,
        }
    }

    pub fn dimension(&self) -> usize {
        self.p
    }

    /// Objective value at a packed lower triangle. `+∞` outside the valid region.
    pub fn value(&self, half: ArrayView1<f64>) -> f64 {
        let precision = symmetric_from_half(half, self.p);
        match log_determinant(&precision) {
            Some(log_det) => self.evaluate(&precision, log_det),
            None => f64::INFINITY,
        }
    }

    /// Objective value and its gradient with respect to the packed lower triangle.
    ///
    /// With `G = -P⁻¹ + S + W ∘ sign(P)`, every packed entry `(i, j)` feeds both `P_ij`
    /// and `P_ji` (or `P_ii` twice), so its derivative is `2 G_ij`. The L1 term uses the
    /// subgradient `sign(0) = 0`. Outside the valid region the gradient is zero.
    pub fn value_and_gradient(&self, half: &Array1<f64>) -> (f64, Array1<f64>) {
        let precision = symmetric_from_half(half.view(), self.p);
        let invalid = || (f64::INFINITY, Array1::zeros(half.len()));

        let Some(log_det) = log_determinant(&precision) else {
            return invalid();
        };
        let Ok(inverse) = precision.inv() else {
            return invalid();
        };

        let value = self.evaluate(&precision, log_det);

        let mut gradient_matrix = &self.covariance - &inverse;
        Zip::from(&mut gradient_matrix)
            .and(&precision)
            .and(&self.penalty_weights)
            .for_each(|g, &x, &w| *g += w * sign_or_zero(x));

        let gradient = pack_lower(gradient_matrix.view()).mapv(|g| 2.0 * g);
        if gradient.iter().any(|g| !g.is_finite()) {
            return invalid();
        }
        (value, gradient)
    }

    fn evaluate(&self, precision: &Array2<f64>, log_det: f64) -> f64 {
        // tr(S P) = Σ_ik S_ik P_ki
        let mut trace = 0.0;
        Zip::from(&self.covariance)
            .and(&precision.t())
            .for_each(|&s, &x| trace += s * x);

        let mut penalty = 0.0;
        Zip::from(&self.penalty_weights)
            .and(precision)
            .for_each(|&w, &x| penalty += w * x.abs());

        -log_det + trace + penalty
    }
}

/// `ln det(P)` when `det(P)` is positive and above the singularity tolerance.
fn log_determinant(precision: &Array2<f64>) -> Option<f64> {
    if precision.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let (sign, ln_abs) = precision.sln_det().ok()?;
    if sign <= 0.0 || !ln_abs.is_finite() || ln_abs <= SINGULAR_DETERMINANT.ln() {
        return None;
    }
    Some(ln_abs)
}

fn sign_or_zero(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn objective_2x2(prior: Array2<f64>) -> PenalizedObjective {
        let covariance = Array2::<f64>::eye(2);
        PenalizedObjective::new(covariance.view(), prior.view(), 0.1, 0.3)
    }

    #[test]
    fn pack_and_rebuild_double_the_diagonal() {
        let half = array![1.0, 0.5, 2.0];
        let rebuilt = symmetric_from_half(half.view(), 2);
        assert_eq!(rebuilt, array![[2.0, 0.5], [0.5, 4.0]]);

        let packed = pack_lower(array![[1.0, 9.0], [0.5, 2.0]].view());
        assert_eq!(packed, half);
    }

    #[test]
    fn half_vector_length_is_triangular() {
        assert_eq!(half_vector_len(1), 1);
        assert_eq!(half_vector_len(4), 10);
        assert_eq!(half_vector_len(10), 55);
    }

    #[test]
    fn regression_value_without_prior_edges() {
        // P = [[2, 0.5], [0.5, 4]], det = 7.75, tr(P) = 6, both off-diagonals at λ_np.
        let objective = objective_2x2(Array2::zeros((2, 2)));
        let value = objective.value(array![1.0, 0.5, 2.0].view());
        assert_abs_diff_eq!(value, 6.1 - 7.75_f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(value, 4.052_307_156_634_744_5, epsilon = 1e-12);
    }

    #[test]
    fn regression_value_with_prior_edges() {
        let prior = array![[0.0, 1.0], [1.0, 0.0]];
        let objective = objective_2x2(prior);
        let value = objective.value(array![1.0, 0.5, 2.0].view());
        assert_abs_diff_eq!(value, 6.3 - 7.75_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn identity_half_vector_evaluates_twice_the_identity() {
        // The packed identity rebuilds to 2I: -ln 4 + tr(2I) = 4 - ln 4.
        let objective = objective_2x2(Array2::zeros((2, 2)));
        let value = objective.value(array![1.0, 0.0, 1.0].view());
        assert_abs_diff_eq!(value, 4.0 - 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn diagonal_of_the_prior_is_never_penalized() {
        let with_diagonal = array![[5.0, 0.0], [0.0, 5.0]];
        let a = objective_2x2(with_diagonal).value(array![1.0, 0.5, 2.0].view());
        let b = objective_2x2(Array2::zeros((2, 2))).value(array![1.0, 0.5, 2.0].view());
        assert_abs_diff_eq!(a, b, epsilon = 1e-15);
    }

    #[test]
    fn non_positive_determinant_is_infinite() {
        let objective = objective_2x2(Array2::zeros((2, 2)));
        // [[2, 5], [5, 2]] has det -21.
        assert_eq!(objective.value(array![1.0, 5.0, 1.0].view()), f64::INFINITY);
        // The zero matrix is singular.
        assert_eq!(objective.value(array![0.0, 0.0, 0.0].view()), f64::INFINITY);
        // Two negative eigenvalues give a positive determinant but still a finite value.
        assert!(objective.value(array![-1.0, 0.0, -1.0].view()).is_finite());
    }

    #[test]
    fn invalid_region_has_zero_gradient() {
        let objective = objective_2x2(Array2::zeros((2, 2)));
        let (value, gradient) = objective.value_and_gradient(&array![1.0, 5.0, 1.0]);
        assert_eq!(value, f64::INFINITY);
        assert!(gradient.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn gradient_matches_central_differences() {
        let covariance = array![[1.0, 0.3, 0.1], [0.3, 1.5, -0.2], [0.1, -0.2, 0.8]];
        let prior = array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        let objective = PenalizedObjective::new(covariance.view(), prior.view(), 0.2, 0.05);
        let half = array![1.1, -0.3, 0.9, 0.2, 0.15, 1.3];

        let (value, gradient) = objective.value_and_gradient(&half);
        assert_abs_diff_eq!(value, objective.value(half.view()), epsilon = 1e-12);

        let step = 1e-6;
        for k in 0..half.len() {
            let mut forward = half.clone();
            let mut backward = half.clone();
            forward[k] += step;
            backward[k] -= step;
            let numeric =
                (objective.value(forward.view()) - objective.value(backward.view())) / (2.0 * step);
            assert_abs_diff_eq!(gradient[k], numeric, epsilon = 1e-5);
        }
    }
}
