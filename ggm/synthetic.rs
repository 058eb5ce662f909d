//! Synthetic networks with known structure.
//!
//! The ground truth is a Barabási–Albert tree (one edge per new node). Its precision
//! matrix puts `-0.5` on every edge and twice the absolute row sum on the diagonal, and
//! is then rescaled to a unit diagonal. Observations are drawn from the zero-mean
//! Gaussian with the inverse of that matrix as covariance, and the prior is a noisy copy
//! of the true adjacency.

use ndarray::{Array2, Axis};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Cholesky, Inverse, UPLO};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyntheticError {
    #[error("A synthetic network needs at least 2 variables, got {0}.")]
    TooFewVariables(usize),
    #[error("A synthetic data set needs at least 1 sample.")]
    NoSamples,
    #[error("{name} must be a probability in [0, 1], got {value}.")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Linear algebra failure while building the covariance: {0}")]
    Linalg(#[from] LinalgError),
}

/// A generated network with everything needed to run and score an estimation.
#[derive(Debug, Clone)]
pub struct SyntheticNetwork {
    /// 0/1 adjacency of the true graph, zero diagonal.
    pub adjacency: Array2<f64>,
    /// Unit-diagonal true precision matrix.
    pub precision: Array2<f64>,
    pub covariance: Array2<f64>,
    /// `n × p` samples.
    pub data: Array2<f64>,
    /// Noisy prior: symmetric, zero diagonal, `prior_weight` at marked pairs.
    pub prior: Array2<f64>,
}

impl SyntheticNetwork {
    /// `v1`, `v2`, ... in column order.
    pub fn variable_names(&self) -> Vec<String> {
        (1..=self.adjacency.nrows()).map(|i| format!("v{i}")).collect()
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.iter().filter(|&&a| a != 0.0).count() / 2
    }
}

/// Builder for a seeded [`SyntheticNetwork`].
pub struct SyntheticNetworkBuilder {
    variables: usize,
    samples: usize,
    seed: u64,
    edge_recall: f64,
    false_edge_rate: f64,
    prior_weight: f64,
}

impl SyntheticNetworkBuilder {
    pub fn new(variables: usize) -> Self {
        Self {
            variables,
            samples: 500,
            seed: 42,
            edge_recall: 0.95,
            false_edge_rate: 0.05,
            prior_weight: 1.0,
        }
    }

    pub fn samples(mut self, n: usize) -> Self {
        self.samples = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = s;
        self
    }

    /// Probability that a true edge is marked in the prior.
    pub fn edge_recall(mut self, probability: f64) -> Self {
        self.edge_recall = probability;
        self
    }

    /// Probability that a non-edge is marked in the prior.
    pub fn false_edge_rate(mut self, probability: f64) -> Self {
        self.false_edge_rate = probability;
        self
    }

    /// Value written at every marked prior entry.
    pub fn prior_weight(mut self, weight: f64) -> Self {
        self.prior_weight = weight;
        self
    }

    pub fn build(self) -> Result<SyntheticNetwork, SyntheticError> {
        let p = self.variables;
        if p < 2 {
            return Err(SyntheticError::TooFewVariables(p));
        }
        if self.samples == 0 {
            return Err(SyntheticError::NoSamples);
        }
        for (name, value) in [
            ("edge_recall", self.edge_recall),
            ("false_edge_rate", self.false_edge_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SyntheticError::InvalidProbability { name, value });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let adjacency = barabasi_albert_tree(p, &mut rng);
        let precision = scaled_precision(&adjacency);
        let covariance = precision.inv()?;
        // Symmetrize before factoring; the inverse is symmetric only up to rounding.
        let covariance = (&covariance + &covariance.t()) * 0.5;
        let factor = covariance.cholesky(UPLO::Lower)?;

        let noise = Array2::from_shape_simple_fn((self.samples, p), || {
            rng.sample::<f64, _>(StandardNormal)
        });
        let data = noise.dot(&factor.t());

        let mut prior = Array2::<f64>::zeros((p, p));
        for i in 0..p {
            for j in (i + 1)..p {
                let marked = if adjacency[[i, j]] != 0.0 {
                    rng.gen_bool(self.edge_recall)
                } else {
                    rng.gen_bool(self.false_edge_rate)
                };
                if marked {
                    prior[[i, j]] = self.prior_weight;
                    prior[[j, i]] = self.prior_weight;
                }
            }
        }

        log::debug!(
            "Generated a {p}-variable network with {} edges and {} samples",
            p - 1,
            self.samples
        );

        Ok(SyntheticNetwork {
            adjacency,
            precision,
            covariance,
            data,
            prior,
        })
    }
}

/// Preferential attachment with one edge per new node, starting from the edge (0, 1).
/// Each new node links to an existing node chosen with probability proportional to its
/// degree.
fn barabasi_albert_tree<R: Rng + ?Sized>(p: usize, rng: &mut R) -> Array2<f64> {
    let mut adjacency = Array2::<f64>::zeros((p, p));
    adjacency[[0, 1]] = 1.0;
    adjacency[[1, 0]] = 1.0;
    // Every node appears once per incident edge.
    let mut endpoints: Vec<usize> = vec![0, 1];
    for node in 2..p {
        let target = endpoints[rng.gen_range(0..endpoints.len())];
        adjacency[[node, target]] = 1.0;
        adjacency[[target, node]] = 1.0;
        endpoints.push(target);
        endpoints.push(node);
    }
    adjacency
}

/// `-0.5·A` off the diagonal, `2·Σ_j |P_ij|` on it, then scaled to a unit diagonal.
fn scaled_precision(adjacency: &Array2<f64>) -> Array2<f64> {
    let mut precision = adjacency.mapv(|a| -0.5 * a);
    let diagonal = precision.mapv(f64::abs).sum_axis(Axis(1)) * 2.0;
    precision.diag_mut().assign(&diagonal);
    let scale = diagonal.mapv(|d| 1.0 / d.sqrt());
    Array2::from_shape_fn(precision.dim(), |(i, j)| {
        scale[i] * precision[[i, j]] * scale[j]
    })
}
