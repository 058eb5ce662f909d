use crate::subsample::RunDiagnostics;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the human-readable TOML formats: the run configuration
// read by the CLI and the estimate artifact it writes.

/// Settings of the per-task quasi-Newton minimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    /// Gradient-norm tolerance handed to BFGS.
    pub gradient_tolerance: f64,
    /// Iteration cap handed to BFGS.
    pub max_iterations: usize,
    /// Largest relative decrease of the best objective value that still counts as a stall.
    pub stall_tolerance: f64,
    /// Number of trailing improvements that must all be below `stall_tolerance`.
    pub stall_window: usize,
    /// Entries of the optimized precision matrix above this magnitude are edges.
    pub edge_threshold: f64,
    /// Ridge added to the covariance before inverting it for the starting point.
    pub initial_ridge: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            gradient_tolerance: 1e-5,
            max_iterations: 500,
            stall_tolerance: 1e-7,
            stall_window: 3,
            edge_threshold: 1e-5,
            initial_ridge: 1e-3,
        }
    }
}

/// The complete configuration of one stability-selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rows per sub-sample (`b`).
    pub subsample_size: usize,
    /// Number of distinct sub-samples (`Q`).
    pub num_subsamples: usize,
    /// Candidate penalty strengths, in the order they are scored.
    pub lambdas: Vec<f64>,
    /// Seed of the generator that draws the sub-samples.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Worker threads; all logical cores when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Draw a progress bar on stderr while the sub-sample tasks run.
    #[serde(default, skip_serializing)]
    pub show_progress: bool,
    #[serde(default)]
    pub optimizer: OptimizerOptions,
}

fn default_seed() -> u64 {
    42
}

impl PipelineConfig {
    pub fn new(subsample_size: usize, num_subsamples: usize, lambdas: Vec<f64>) -> Self {
        Self {
            subsample_size,
            num_subsamples,
            lambdas,
            seed: default_seed(),
            workers: None,
            show_progress: false,
            optimizer: OptimizerOptions::default(),
        }
    }

    /// Checks the optimizer settings. Sample-size and lambda constraints depend on the
    /// data and are checked when the sub-sampling starts.
    pub fn validate(&self) -> Result<(), ModelError> {
        let options = &self.optimizer;
        let positive = [
            ("gradient_tolerance", options.gradient_tolerance),
            ("stall_tolerance", options.stall_tolerance),
            ("edge_threshold", options.edge_threshold),
            ("initial_ridge", options.initial_ridge),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidOption(format!(
                    "optimizer.{name} must be finite and positive, got {value}"
                )));
            }
        }
        if options.max_iterations == 0 {
            return Err(ModelError::InvalidOption(
                "optimizer.max_iterations must be at least 1".to_string(),
            ));
        }
        if options.stall_window == 0 {
            return Err(ModelError::InvalidOption(
                "optimizer.stall_window must be at least 1".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ModelError::InvalidOption(
                "workers must be at least 1 when given".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to a TOML file.
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        write_toml(path, &toml::to_string_pretty(self)?)
    }
}

/// `count` evenly spaced values from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// The persisted outcome of a run: the selected strengths, their scores, the refit
/// precision matrix and how many sub-sample fits failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEstimate {
    pub lambda_np: f64,
    pub lambda_wp: f64,
    /// Spread of the prior around the data-driven edge frequencies.
    pub tau: f64,
    pub variable_names: Vec<String>,
    pub non_prior_scores: Vec<f64>,
    pub prior_scores: Vec<f64>,
    pub config: PipelineConfig,
    pub diagnostics: RunDiagnostics,
    pub precision: Array2<f64>,
}

/// Custom error type for configuration and artifact files.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    InvalidOption(String),
}

impl NetworkEstimate {
    /// Saves the estimate to a file in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        write_toml(path, &toml::to_string_pretty(self)?)
    }

    /// Loads an estimate from a TOML file.
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }

    /// Edges whose refit magnitude exceeds `threshold`, as `(i, j)` with `i < j`.
    pub fn edges(&self, threshold: f64) -> Vec<(usize, usize)> {
        let p = self.precision.nrows();
        (0..p)
            .flat_map(|i| ((i + 1)..p).map(move |j| (i, j)))
            .filter(|&(i, j)| self.precision[[i, j]].abs() > threshold)
            .collect()
    }
}

fn write_toml(path: &str, contents: &str) -> Result<(), ModelError> {
    let mut file = BufWriter::new(fs::File::create(path)?);
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tempfile::NamedTempFile;

    #[test]
    fn linspace_includes_both_ends() {
        let grid = linspace(0.01, 0.4, 10);
        assert_eq!(grid.len(), 10);
        assert_abs_diff_eq!(grid[0], 0.01, epsilon = 1e-15);
        assert_abs_diff_eq!(grid[9], 0.4, epsilon = 1e-12);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(linspace(0.2, 0.9, 1), vec![0.2]);
        assert!(linspace(0.2, 0.9, 0).is_empty());
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: PipelineConfig = toml::from_str(
            "subsample_size = 25\nnum_subsamples = 20\nlambdas = [0.05, 0.1]\n",
        )
        .unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.workers, None);
        assert_eq!(config.optimizer, OptimizerOptions::default());
        config.validate().unwrap();
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = PipelineConfig::new(25, 20, linspace(0.01, 0.4, 10));
        config.seed = 7;
        config.workers = Some(2);
        config.optimizer.max_iterations = 250;

        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        config.save(path).unwrap();
        let loaded = PipelineConfig::load(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_optimizer_options_are_rejected() {
        let mut config = PipelineConfig::new(25, 20, vec![0.1]);
        config.optimizer.edge_threshold = 0.0;
        assert!(matches!(config.validate(), Err(ModelError::InvalidOption(_))));

        let mut config = PipelineConfig::new(25, 20, vec![0.1]);
        config.workers = Some(0);
        assert!(matches!(config.validate(), Err(ModelError::InvalidOption(_))));
    }

    #[test]
    fn estimate_round_trips_and_lists_edges() {
        let estimate = NetworkEstimate {
            lambda_np: 0.1,
            lambda_wp: 0.05,
            tau: 1.5,
            variable_names: vec!["a".into(), "b".into(), "c".into()],
            non_prior_scores: vec![3.0, 2.0],
            prior_scores: vec![1.0, 0.5],
            config: PipelineConfig::new(10, 5, vec![0.05, 0.1]),
            diagnostics: RunDiagnostics::new(2),
            precision: array![[2.0, -0.4, 0.0], [-0.4, 2.0, 1e-7], [0.0, 1e-7, 2.0]],
        };

        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        estimate.save(path).unwrap();
        let loaded = NetworkEstimate::load(path).unwrap();

        assert_eq!(loaded.variable_names, estimate.variable_names);
        assert_eq!(loaded.precision, estimate.precision);
        assert_eq!(loaded.diagnostics, estimate.diagnostics);
        assert_eq!(loaded.edges(1e-5), vec![(0, 1)]);
    }
}
