//! Reconstruction scoring against a known adjacency, and a seeded synthetic sweep
//! that scores fixed penalty pairs over many generated data sets.

use crate::model::OptimizerOptions;
use crate::refit::PenalizedRefit;
use crate::synthetic::{SyntheticError, SyntheticNetwork, SyntheticNetworkBuilder};
use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Threshold below which a precision entry counts as absent.
pub const DEFAULT_EDGE_THRESHOLD: f64 = 1e-5;

/// Agreement between a reconstructed network and the true adjacency, over off-diagonal
/// entries. Ratios with a zero denominator are reported as 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconstructionMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub jaccard_similarity: f64,
    pub accuracy: f64,
}

impl ReconstructionMetrics {
    /// Metric name to value.
    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
            ("jaccard_similarity", self.jaccard_similarity),
            ("accuracy", self.accuracy),
        ])
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Compares `|precision| > threshold` against `adjacency != 0`, ignoring the diagonal.
pub fn evaluate_reconstruction(
    adjacency: ArrayView2<f64>,
    precision: ArrayView2<f64>,
    threshold: f64,
) -> ReconstructionMetrics {
    let (mut tp, mut fp, mut missed, mut tn) = (0usize, 0usize, 0usize, 0usize);
    for ((i, j), &value) in precision.indexed_iter() {
        if i == j {
            continue;
        }
        let predicted = value.abs() > threshold;
        let actual = adjacency[[i, j]] != 0.0;
        match (predicted, actual) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => missed += 1,
            (false, false) => tn += 1,
        }
    }

    let precision_score = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + missed);
    let f1_score = if precision_score + recall > 0.0 {
        2.0 * precision_score * recall / (precision_score + recall)
    } else {
        0.0
    };

    ReconstructionMetrics {
        precision: precision_score,
        recall,
        f1_score,
        jaccard_similarity: ratio(tp, tp + fp + missed),
        accuracy: ratio(tp + tn, tp + tn + fp + missed),
    }
}

/// How each synthetic data set of a sweep is generated and fitted.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub variables: usize,
    pub samples: usize,
    /// Data sets per grid point.
    pub runs: usize,
    /// Run `r` uses seed `seed + r`.
    pub seed: u64,
    pub edge_recall: f64,
    pub false_edge_rate: f64,
    pub prior_weight: f64,
    pub threshold: f64,
    pub optimizer: OptimizerOptions,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            variables: 10,
            samples: 500,
            runs: 30,
            seed: 42,
            edge_recall: 1.0,
            false_edge_rate: 0.0,
            prior_weight: 0.8,
            threshold: DEFAULT_EDGE_THRESHOLD,
            optimizer: OptimizerOptions::default(),
        }
    }
}

/// Mean metrics of one `(λ_np, λ_wp)` grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPointSummary {
    pub lambda_np: f64,
    pub lambda_wp: f64,
    /// Averaged over the successful runs only; all zero when none succeeded.
    pub mean: ReconstructionMetrics,
    /// Runs whose refit was not the all-zero failure matrix.
    pub successful_runs: usize,
}

fn mean_metrics(metrics: &[ReconstructionMetrics]) -> ReconstructionMetrics {
    let count = metrics.len().max(1) as f64;
    let total = |field: fn(&ReconstructionMetrics) -> f64| {
        metrics.iter().map(field).sum::<f64>() / count
    };
    ReconstructionMetrics {
        precision: total(|m| m.precision),
        recall: total(|m| m.recall),
        f1_score: total(|m| m.f1_score),
        jaccard_similarity: total(|m| m.jaccard_similarity),
        accuracy: total(|m| m.accuracy),
    }
}

/// Fits every grid point on `settings.runs` seeded synthetic networks and averages the
/// reconstruction metrics. Refits that fail (the zero matrix) are left out of the means
/// and of `successful_runs`.
pub fn evaluate_lambda_grid(
    grid: &[(f64, f64)],
    settings: &SweepSettings,
) -> Result<Vec<GridPointSummary>, SyntheticError> {
    let networks: Vec<SyntheticNetwork> = (0..settings.runs as u64)
        .map(|run| {
            SyntheticNetworkBuilder::new(settings.variables)
                .samples(settings.samples)
                .seed(settings.seed.wrapping_add(run))
                .edge_recall(settings.edge_recall)
                .false_edge_rate(settings.false_edge_rate)
                .prior_weight(settings.prior_weight)
                .build()
        })
        .collect::<Result<_, _>>()?;

    let refit = PenalizedRefit::new(settings.optimizer.clone());
    let summaries = grid
        .iter()
        .map(|&(lambda_np, lambda_wp)| {
            let scored: Vec<ReconstructionMetrics> = networks
                .par_iter()
                .filter_map(|network| {
                    let precision = refit.fit(
                        network.data.view(),
                        network.prior.view(),
                        lambda_np,
                        lambda_wp,
                    );
                    precision.iter().any(|&x| x != 0.0).then(|| {
                        evaluate_reconstruction(
                            network.adjacency.view(),
                            precision.view(),
                            settings.threshold,
                        )
                    })
                })
                .collect();

            let summary = GridPointSummary {
                lambda_np,
                lambda_wp,
                mean: mean_metrics(&scored),
                successful_runs: scored.len(),
            };
            log::info!(
                "lambda {:.4} / {:.4}: F1 {:.4} over {} of {} runs",
                lambda_np,
                lambda_wp,
                summary.mean.f1_score,
                summary.successful_runs,
                settings.runs
            );
            summary
        })
        .collect();
    Ok(summaries)
}
