//! The end-to-end estimation: sub-sample fits, non-prior selection, prior selection
//! and the final refit, in that order.

use crate::model::{ModelError, NetworkEstimate, PipelineConfig};
use crate::non_prior::{NonPriorSelection, SelectionError, estimate_lambda_np};
use crate::prior::{PriorSelection, estimate_lambda_wp};
use crate::refit::PrecisionRefit;
use crate::subsample::{ConfigurationError, SubsampleOptimizer, SubsampleRun};
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid run configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Lambda selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run: SubsampleRun,
    /// The sub-samples the run was computed on.
    pub subsamples: Vec<Vec<usize>>,
    pub non_prior: NonPriorSelection,
    pub prior: PriorSelection,
    /// The refit precision matrix at `non_prior.lambda_np`.
    pub precision: Array2<f64>,
}

impl PipelineResult {
    /// The persistable summary of this run.
    pub fn into_estimate(self, config: &PipelineConfig, variable_names: Vec<String>) -> NetworkEstimate {
        NetworkEstimate {
            lambda_np: self.non_prior.lambda_np,
            lambda_wp: self.prior.lambda_wp,
            tau: self.prior.tau,
            variable_names,
            non_prior_scores: self.non_prior.scores,
            prior_scores: self.prior.scores,
            config: config.clone(),
            diagnostics: self.run.diagnostics,
            precision: self.precision,
        }
    }
}

/// Runs the whole estimation with sub-samples drawn from a generator seeded by
/// `config.seed`.
pub fn run_pipeline(
    data: ArrayView2<f64>,
    prior: ArrayView2<f64>,
    config: &PipelineConfig,
    refit: &dyn PrecisionRefit,
) -> Result<PipelineResult, PipelineError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    run_pipeline_with_rng(data, prior, config, refit, &mut rng)
}

/// [`run_pipeline`] with a caller-supplied generator.
pub fn run_pipeline_with_rng<R: Rng + ?Sized>(
    data: ArrayView2<f64>,
    prior: ArrayView2<f64>,
    config: &PipelineConfig,
    refit: &dyn PrecisionRefit,
    rng: &mut R,
) -> Result<PipelineResult, PipelineError> {
    config.validate()?;
    let (n, p) = data.dim();
    log::info!(
        "Estimating a {p}-variable network from {n} rows: {} sub-samples of {} rows, {} lambdas",
        config.num_subsamples,
        config.subsample_size,
        config.lambdas.len()
    );

    let mut optimizer = SubsampleOptimizer::new(data, prior)?
        .with_options(config.optimizer.clone())
        .with_workers(config.workers)
        .with_progress(config.show_progress);
    let run = optimizer.subsample_optimiser(
        config.subsample_size,
        config.num_subsamples,
        &config.lambdas,
        rng,
    )?;
    let subsamples = optimizer.selected_subsamples().map(<[_]>::to_vec).unwrap_or_default();

    let non_prior = estimate_lambda_np(run.edge_counts.view(), run.num_subsamples, &run.lambdas)?;
    let prior_selection = estimate_lambda_wp(
        data,
        config.subsample_size,
        run.num_subsamples,
        non_prior.p_k_matrix.view(),
        run.edge_counts.view(),
        &run.lambdas,
        prior,
    )?;

    log::info!("Refitting on all {n} rows at lambda {:.4}", non_prior.lambda_np);
    let precision = refit.refit(data, prior, non_prior.lambda_np);

    Ok(PipelineResult {
        run,
        subsamples,
        non_prior,
        prior: prior_selection,
        precision,
    })
}
