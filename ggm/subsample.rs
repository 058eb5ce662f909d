//! Stability sub-sampling: draws `Q` distinct row subsets, fits the penalized objective
//! on every (sub-sample, lambda) pair in a worker pool and counts, per lambda, how often
//! each entry of the precision matrix survived.

use crate::model::OptimizerOptions;
use crate::objective::{PenalizedObjective, pack_lower, symmetric_from_half};
use ahash::AHashSet;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, s};
use ndarray_linalg::{Cholesky, Inverse, UPLO};
use rand::Rng;
use rand::seq::index;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::IsTerminal;
use thiserror::Error;
use wolfe_bfgs::Bfgs;

/// Above this many combinations the sub-samples are always drawn by rejection.
const MAX_ENUMERATED_COMBINATIONS: u128 = 100_000;

/// Problems with the requested run that are detected before any task is built.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Sub-sample size {b} must be smaller than the number of rows ({n}).")]
    SubsampleTooLarge { b: usize, n: usize },

    #[error("Sub-sample size {0} is too small; at least 2 rows are needed for a covariance.")]
    SubsampleTooSmall(usize),

    #[error(
        "Requested {requested} distinct sub-samples, but only {available} subsets of size {b} exist among {n} rows."
    )]
    TooManySubsamples {
        requested: usize,
        available: u128,
        n: usize,
        b: usize,
    },

    #[error("The number of sub-samples must be at least 1.")]
    NoSubsamples,

    #[error("The lambda range is empty.")]
    EmptyLambdaRange,

    #[error("Lambda {0} at position {1} is not a finite positive value.")]
    InvalidLambda(f64, usize),

    #[error(
        "The data has {data_columns} columns but the prior matrix is {prior_rows}x{prior_cols}."
    )]
    DimensionMismatch {
        data_columns: usize,
        prior_rows: usize,
        prior_cols: usize,
    },

    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a single (sub-sample, lambda) fit produced no edges.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskFailure {
    /// No valid starting point could be built.
    Initialization(String),
    /// The optimizer stopped without a stable minimum.
    NonConvergence(String),
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeEstimate {
    Converged {
        /// 1 where `|P_ik|` exceeds the edge threshold.
        edges: Array2<u32>,
        objective: f64,
        iterations: usize,
    },
    Failed(TaskFailure),
}

/// One task's result, tagged with the sub-sample and lambda it was computed for.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub indices: Vec<usize>,
    pub lambda: f64,
    pub estimate: EdgeEstimate,
}

/// Aggregate task outcomes of one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub total_tasks: usize,
    pub converged: usize,
    pub initialization_failures: usize,
    pub non_convergence_failures: usize,
    /// Failed tasks per lambda index.
    pub failures_per_lambda: Vec<usize>,
}

impl RunDiagnostics {
    pub fn new(num_lambdas: usize) -> Self {
        Self {
            failures_per_lambda: vec![0; num_lambdas],
            ..Self::default()
        }
    }

    fn record(&mut self, lambda_index: usize, estimate: &EdgeEstimate) {
        self.total_tasks += 1;
        match estimate {
            EdgeEstimate::Converged { .. } => self.converged += 1,
            EdgeEstimate::Failed(failure) => {
                match failure {
                    TaskFailure::Initialization(_) => self.initialization_failures += 1,
                    TaskFailure::NonConvergence(_) => self.non_convergence_failures += 1,
                }
                self.failures_per_lambda[lambda_index] += 1;
            }
        }
    }

    pub fn failures(&self) -> usize {
        self.initialization_failures + self.non_convergence_failures
    }

    /// Fraction of tasks that failed; zero for an empty run.
    pub fn failure_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            self.failures() as f64 / self.total_tasks as f64
        }
    }
}

/// The aggregated result of [`SubsampleOptimizer::subsample_optimiser`].
#[derive(Debug, Clone)]
pub struct SubsampleRun {
    /// Shape `(p, p, J)`; entry `(i, k, j)` counts the sub-samples with an edge at lambda `j`.
    pub edge_counts: Array3<u32>,
    pub num_subsamples: usize,
    pub lambdas: Vec<f64>,
    pub diagnostics: RunDiagnostics,
}

/// A minimizer of the penalized objective.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub half: Array1<f64>,
    pub value: f64,
    pub iterations: usize,
}

/// Maximum-likelihood covariance (divisor `n`) of the columns, means removed.
pub fn empirical_covariance(data: ArrayView2<f64>) -> Array2<f64> {
    let (n, p) = data.dim();
    let Some(means) = data.mean_axis(Axis(0)) else {
        return Array2::zeros((p, p));
    };
    let centered = &data - &means;
    centered.t().dot(&centered) / n as f64
}

/// Starting point for the optimizer: the packed lower Cholesky factor of
/// `inv(S + ridge·I)`.
pub fn initial_half_vector(
    covariance: ArrayView2<f64>,
    ridge: f64,
) -> Result<Array1<f64>, TaskFailure> {
    let p = covariance.nrows();
    let ridged = &covariance + &(Array2::<f64>::eye(p) * ridge);
    let inverse = ridged.inv().map_err(|e| {
        TaskFailure::Initialization(format!("ridged covariance is not invertible: {e}"))
    })?;
    let symmetric = (&inverse + &inverse.t()) * 0.5;
    let factor = symmetric.cholesky(UPLO::Lower).map_err(|e| {
        TaskFailure::Initialization(format!("Cholesky factorization failed: {e}"))
    })?;
    if factor.iter().any(|x| !x.is_finite()) {
        return Err(TaskFailure::Initialization(
            "Cholesky factor has non-finite entries".to_string(),
        ));
    }
    Ok(pack_lower(factor.view()))
}

/// Tracks the lowest finite objective value seen during a BFGS run.
struct BestTrace {
    value: f64,
    point: Array1<f64>,
    improvements: Vec<f64>,
}

impl BestTrace {
    fn new(value: f64, point: Array1<f64>) -> Self {
        Self {
            value,
            point,
            improvements: Vec::new(),
        }
    }

    fn observe(&mut self, value: f64, point: &Array1<f64>) {
        if value.is_finite() && value < self.value {
            let scale = self.value.abs().max(value.abs()).max(1.0);
            self.improvements.push((self.value - value) / scale);
            self.value = value;
            self.point.assign(point);
        }
    }

    fn stalled(&self, tolerance: f64, window: usize) -> bool {
        let recent = &self.improvements[self.improvements.len().saturating_sub(window)..];
        !recent.is_empty() && recent.iter().all(|&delta| delta <= tolerance)
    }
}

/// Minimizes `objective` from `initial` with BFGS.
///
/// A run that ends in a line-search or iteration error is still accepted when the best
/// value it reached had stopped improving; the best point is returned in that case.
pub fn minimize_objective(
    objective: &PenalizedObjective,
    initial: Array1<f64>,
    options: &OptimizerOptions,
) -> Result<Minimum, TaskFailure> {
    let initial_value = objective.value(initial.view());
    if !initial_value.is_finite() {
        return Err(TaskFailure::Initialization(format!(
            "objective is not finite at the starting point: {initial_value}"
        )));
    }

    let trace = RefCell::new(BestTrace::new(initial_value, initial.clone()));
    let cost_and_grad = |half: &Array1<f64>| -> (f64, Array1<f64>) {
        let (value, gradient) = objective.value_and_gradient(half);
        trace.borrow_mut().observe(value, half);
        (value, gradient)
    };

    let result = Bfgs::new(initial, cost_and_grad)
        .with_tolerance(options.gradient_tolerance)
        .with_max_iterations(options.max_iterations)
        .run();

    match result {
        Ok(solution) if solution.final_value.is_finite() => Ok(Minimum {
            half: solution.final_point,
            value: solution.final_value,
            iterations: solution.iterations,
        }),
        Ok(solution) => Err(TaskFailure::NonConvergence(format!(
            "BFGS ended at a non-finite value: {}",
            solution.final_value
        ))),
        Err(e) => {
            let trace = trace.into_inner();
            if trace.stalled(options.stall_tolerance, options.stall_window) {
                log::debug!(
                    "BFGS stopped with {:?}; accepting stalled minimum {:.6}",
                    e,
                    trace.value
                );
                Ok(Minimum {
                    half: trace.point,
                    value: trace.value,
                    iterations: trace.improvements.len(),
                })
            } else {
                Err(TaskFailure::NonConvergence(format!("BFGS failed: {e:?}")))
            }
        }
    }
}

/// Number of `k`-subsets of `n` items, saturating at `u128::MAX`.
pub fn combination_count(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut count: u128 = 1;
    for i in 0..k {
        // count is C(n, i) here, so the division is exact.
        count = match count.checked_mul((n - i) as u128) {
            Some(product) => product / (i as u128 + 1),
            None => return u128::MAX,
        };
    }
    count
}

/// Draws `q` pairwise-distinct sorted subsets of size `b` from `0..n`.
/// The caller guarantees `q <= C(n, b)`.
fn draw_subsamples<R: Rng + ?Sized>(n: usize, b: usize, q: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let available = combination_count(n, b);
    if available <= MAX_ENUMERATED_COMBINATIONS && 2 * q as u128 > available {
        let all: Vec<Vec<usize>> = (0..n).combinations(b).collect();
        return index::sample(rng, all.len(), q)
            .into_iter()
            .map(|i| all[i].clone())
            .collect();
    }

    let mut seen = AHashSet::with_capacity(q);
    let mut subsamples = Vec::with_capacity(q);
    while subsamples.len() < q {
        let mut candidate = index::sample(rng, n, b).into_vec();
        candidate.sort_unstable();
        if seen.insert(candidate.clone()) {
            subsamples.push(candidate);
        }
    }
    subsamples
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Fits the penalized objective over many sub-samples and lambdas.
pub struct SubsampleOptimizer {
    data: Array2<f64>,
    prior_matrix: Array2<f64>,
    p: usize,
    options: OptimizerOptions,
    workers: Option<usize>,
    show_progress: bool,
    selected_subsamples: Option<Vec<Vec<usize>>>,
}

impl SubsampleOptimizer {
    pub fn new(
        data: ArrayView2<f64>,
        prior_matrix: ArrayView2<f64>,
    ) -> Result<Self, ConfigurationError> {
        let p = data.ncols();
        if prior_matrix.dim() != (p, p) {
            return Err(ConfigurationError::DimensionMismatch {
                data_columns: p,
                prior_rows: prior_matrix.nrows(),
                prior_cols: prior_matrix.ncols(),
            });
        }
        Ok(Self {
            data: data.to_owned(),
            prior_matrix: prior_matrix.to_owned(),
            p,
            options: OptimizerOptions::default(),
            workers: None,
            show_progress: false,
            selected_subsamples: None,
        })
    }

    pub fn with_options(mut self, options: OptimizerOptions) -> Self {
        self.options = options;
        self
    }

    /// Fixes the worker count; all logical cores when `None`.
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// The sub-samples drawn by the most recent run.
    pub fn selected_subsamples(&self) -> Option<&[Vec<usize>]> {
        self.selected_subsamples.as_deref()
    }

    fn subsample_covariance(&self, indices: &[usize]) -> Array2<f64> {
        let rows = self.data.select(Axis(0), indices);
        empirical_covariance(rows.view())
    }

    /// Fits one sub-sample at one lambda and thresholds the result into an edge matrix.
    pub fn optimize_for_q_and_j(&self, indices: &[usize], lambda: f64) -> TaskResult {
        let covariance = self.subsample_covariance(indices);
        let objective = PenalizedObjective::new(
            covariance.view(),
            self.prior_matrix.view(),
            lambda,
            lambda,
        );

        let estimate = initial_half_vector(covariance.view(), self.options.initial_ridge)
            .and_then(|initial| minimize_objective(&objective, initial, &self.options))
            .map(|minimum| {
                let precision = symmetric_from_half(minimum.half.view(), self.p);
                let threshold = self.options.edge_threshold;
                EdgeEstimate::Converged {
                    edges: precision.mapv(|x| u32::from(x.abs() > threshold)),
                    objective: minimum.value,
                    iterations: minimum.iterations,
                }
            })
            .unwrap_or_else(EdgeEstimate::Failed);

        TaskResult {
            indices: indices.to_vec(),
            lambda,
            estimate,
        }
    }

    fn validate(&self, b: usize, q: usize, lambdas: &[f64]) -> Result<(), ConfigurationError> {
        let n = self.data.nrows();
        if b >= n {
            return Err(ConfigurationError::SubsampleTooLarge { b, n });
        }
        if b < 2 {
            return Err(ConfigurationError::SubsampleTooSmall(b));
        }
        if q == 0 {
            return Err(ConfigurationError::NoSubsamples);
        }
        let available = combination_count(n, b);
        if q as u128 > available {
            return Err(ConfigurationError::TooManySubsamples {
                requested: q,
                available,
                n,
                b,
            });
        }
        if lambdas.is_empty() {
            return Err(ConfigurationError::EmptyLambdaRange);
        }
        if let Some((position, &lambda)) = lambdas
            .iter()
            .enumerate()
            .find(|(_, l)| !(l.is_finite() && **l > 0.0))
        {
            return Err(ConfigurationError::InvalidLambda(lambda, position));
        }
        Ok(())
    }

    /// Draws `q` distinct sub-samples of `b` rows, fits every (sub-sample, lambda) pair
    /// and returns the `(p, p, J)` edge-count tensor.
    pub fn subsample_optimiser<R: Rng + ?Sized>(
        &mut self,
        b: usize,
        q: usize,
        lambdas: &[f64],
        rng: &mut R,
    ) -> Result<SubsampleRun, ConfigurationError> {
        self.validate(b, q, lambdas)?;

        let subsamples = draw_subsamples(self.data.nrows(), b, q, rng);
        let num_lambdas = lambdas.len();
        let total_tasks = q * num_lambdas;
        let workers = self.workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;

        log::info!(
            "Dispatching {} tasks ({} sub-samples of {} rows x {} lambdas) on {} threads",
            total_tasks,
            q,
            b,
            num_lambdas,
            workers
        );

        let pb = if self.show_progress {
            create_progress_bar(total_tasks as u64, "Fitting sub-samples")
        } else {
            ProgressBar::hidden()
        };

        let tasks: Vec<(usize, usize)> = (0..q).cartesian_product(0..num_lambdas).collect();
        let this = &*self;
        let results: Vec<(usize, TaskResult)> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(sub, j)| {
                    let result = this.optimize_for_q_and_j(&subsamples[sub], lambdas[j]);
                    if let EdgeEstimate::Failed(failure) = &result.estimate {
                        log::debug!(
                            "Sub-sample {} at lambda {:.4} failed: {:?}",
                            sub,
                            lambdas[j],
                            failure
                        );
                    }
                    pb.inc(1);
                    (j, result)
                })
                .collect()
        });
        pb.finish_and_clear();

        let mut edge_counts = Array3::<u32>::zeros((self.p, self.p, num_lambdas));
        let mut diagnostics = RunDiagnostics::new(num_lambdas);
        for (j, result) in &results {
            diagnostics.record(*j, &result.estimate);
            if let EdgeEstimate::Converged { edges, .. } = &result.estimate {
                let mut slice = edge_counts.slice_mut(s![.., .., *j]);
                slice += edges;
            }
        }

        if diagnostics.failures() == diagnostics.total_tasks {
            log::error!(
                "All {} sub-sample fits failed; the edge counts are all zero",
                diagnostics.total_tasks
            );
        } else if diagnostics.failures() > 0 {
            log::warn!(
                "{} of {} sub-sample fits failed ({:.1}%: {} at initialization, {} without convergence)",
                diagnostics.failures(),
                diagnostics.total_tasks,
                100.0 * diagnostics.failure_rate(),
                diagnostics.initialization_failures,
                diagnostics.non_convergence_failures
            );
        }

        self.selected_subsamples = Some(subsamples);
        Ok(SubsampleRun {
            edge_counts,
            num_subsamples: q,
            lambdas: lambdas.to_vec(),
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::StandardNormal;

    fn assert_all_close<'a>(
        actual: impl IntoIterator<Item = &'a f64>,
        expected: impl IntoIterator<Item = &'a f64>,
        epsilon: f64,
    ) {
        for (a, e) in actual.into_iter().zip(expected) {
            assert_abs_diff_eq!(*a, *e, epsilon = epsilon);
        }
    }

    fn gaussian_data(n: usize, p: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_simple_fn((n, p), || rng.sample::<f64, _>(StandardNormal))
    }

    #[test]
    fn covariance_uses_divisor_n_and_centers() {
        let data = array![[1.0, 2.0], [3.0, 6.0]];
        let covariance = empirical_covariance(data.view());
        assert_all_close(&covariance, &array![[1.0, 2.0], [2.0, 4.0]], 1e-12);
    }

    #[test]
    fn combination_counts() {
        assert_eq!(combination_count(6, 3), 20);
        assert_eq!(combination_count(50, 25), 126_410_606_437_752);
        assert_eq!(combination_count(3, 5), 0);
        assert_eq!(combination_count(10, 0), 1);
        assert_eq!(combination_count(1000, 500), u128::MAX);
    }

    #[test]
    fn drawn_subsamples_are_sorted_and_distinct() {
        let mut rng = StdRng::seed_from_u64(3);
        for &(n, b, q) in &[(30, 10, 50), (6, 3, 20), (6, 3, 11)] {
            let drawn = draw_subsamples(n, b, q, &mut rng);
            assert_eq!(drawn.len(), q);
            let distinct: AHashSet<Vec<usize>> = drawn.iter().cloned().collect();
            assert_eq!(distinct.len(), q);
            for subsample in &drawn {
                assert_eq!(subsample.len(), b);
                assert!(subsample.windows(2).all(|w| w[0] < w[1]));
                assert!(subsample.iter().all(|&i| i < n));
            }
        }
    }

    #[test]
    fn initial_guess_is_cholesky_of_ridged_inverse() {
        let covariance = array![[2.0, 0.5], [0.5, 1.0]];
        let half = initial_half_vector(covariance.view(), 1e-3).unwrap();
        let ridged = &covariance + &(Array2::<f64>::eye(2) * 1e-3);
        let factor = ridged.inv().unwrap().cholesky(UPLO::Lower).unwrap();
        assert_all_close(&half, &pack_lower(factor.view()), 1e-12);
    }

    #[test]
    fn unpenalized_minimum_recovers_the_inverse_covariance() {
        let covariance = array![[1.0, 0.3, 0.1], [0.3, 1.5, -0.2], [0.1, -0.2, 0.8]];
        let objective =
            PenalizedObjective::new(covariance.view(), Array2::zeros((3, 3)).view(), 0.0, 0.0);
        let initial = initial_half_vector(covariance.view(), 1e-3).unwrap();
        let minimum = minimize_objective(&objective, initial, &OptimizerOptions::default())
            .expect("unpenalized problem should converge");
        let precision = symmetric_from_half(minimum.half.view(), 3);
        assert_all_close(&precision, &covariance.inv().unwrap(), 1e-3);
    }

    #[test]
    fn stalled_trace_detection() {
        let mut trace = BestTrace::new(10.0, array![0.0]);
        assert!(!trace.stalled(1e-7, 3));
        trace.observe(5.0, &array![1.0]);
        assert!(!trace.stalled(1e-7, 3));
        trace.observe(f64::INFINITY, &array![2.0]);
        trace.observe(5.0 - 1e-9, &array![3.0]);
        trace.observe(5.0 - 2e-9, &array![4.0]);
        trace.observe(5.0 - 3e-9, &array![5.0]);
        assert!(trace.stalled(1e-7, 3));
        assert_eq!(trace.point, array![5.0]);
    }

    #[test]
    fn singular_initial_point_fails_at_initialization() {
        let covariance = Array2::<f64>::eye(2);
        let objective =
            PenalizedObjective::new(covariance.view(), Array2::zeros((2, 2)).view(), 0.1, 0.1);
        let result = minimize_objective(
            &objective,
            array![0.0, 0.0, 0.0],
            &OptimizerOptions::default(),
        );
        assert!(matches!(result, Err(TaskFailure::Initialization(_))));
    }

    #[test]
    fn single_task_produces_symmetric_binary_edges() {
        let data = gaussian_data(40, 4, 11);
        let optimizer = SubsampleOptimizer::new(data.view(), Array2::zeros((4, 4)).view()).unwrap();
        let indices: Vec<usize> = (0..20).collect();
        let result = optimizer.optimize_for_q_and_j(&indices, 0.001);
        assert_eq!(result.indices, indices);
        match result.estimate {
            EdgeEstimate::Converged { edges, objective, .. } => {
                assert!(objective.is_finite());
                assert_eq!(edges, edges.t());
                assert!(edges.iter().all(|&e| e <= 1));
                assert!(edges.diag().iter().all(|&e| e == 1));
            }
            EdgeEstimate::Failed(failure) => panic!("task failed: {failure:?}"),
        }
    }

    #[test]
    fn configuration_errors_are_raised_before_dispatch() {
        let data = gaussian_data(6, 3, 1);
        let prior = Array2::zeros((3, 3));
        let mut optimizer = SubsampleOptimizer::new(data.view(), prior.view()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            optimizer.subsample_optimiser(6, 1, &[0.1], &mut rng),
            Err(ConfigurationError::SubsampleTooLarge { b: 6, n: 6 })
        ));
        assert!(matches!(
            optimizer.subsample_optimiser(3, 21, &[0.1], &mut rng),
            Err(ConfigurationError::TooManySubsamples { available: 20, .. })
        ));
        assert!(matches!(
            optimizer.subsample_optimiser(3, 0, &[0.1], &mut rng),
            Err(ConfigurationError::NoSubsamples)
        ));
        assert!(matches!(
            optimizer.subsample_optimiser(3, 2, &[], &mut rng),
            Err(ConfigurationError::EmptyLambdaRange)
        ));
        assert!(matches!(
            optimizer.subsample_optimiser(3, 2, &[0.1, -0.2], &mut rng),
            Err(ConfigurationError::InvalidLambda(_, 1))
        ));
        assert!(optimizer.selected_subsamples().is_none());

        let wrong_prior = Array2::zeros((2, 2));
        assert!(matches!(
            SubsampleOptimizer::new(data.view(), wrong_prior.view()),
            Err(ConfigurationError::DimensionMismatch { data_columns: 3, .. })
        ));
    }

    #[test]
    fn diagnostics_track_failure_kinds() {
        let mut diagnostics = RunDiagnostics::new(2);
        diagnostics.record(
            0,
            &EdgeEstimate::Converged {
                edges: Array2::zeros((2, 2)),
                objective: 1.0,
                iterations: 3,
            },
        );
        diagnostics.record(1, &EdgeEstimate::Failed(TaskFailure::Initialization("x".into())));
        diagnostics.record(1, &EdgeEstimate::Failed(TaskFailure::NonConvergence("y".into())));
        diagnostics.record(0, &EdgeEstimate::Failed(TaskFailure::NonConvergence("z".into())));

        assert_eq!(diagnostics.total_tasks, 4);
        assert_eq!(diagnostics.converged, 1);
        assert_eq!(diagnostics.failures_per_lambda, vec![1, 2]);
        assert_abs_diff_eq!(diagnostics.failure_rate(), 0.75, epsilon = 1e-15);
        assert_eq!(RunDiagnostics::new(3).failure_rate(), 0.0);
    }
}
