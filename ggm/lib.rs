#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod data;
pub mod metrics;
pub mod model;
pub mod non_prior;
pub mod objective;
pub mod pipeline;
pub mod prior;
pub mod refit;
pub mod subsample;
pub mod synthetic;

pub use model::{NetworkEstimate, OptimizerOptions, PipelineConfig};
pub use non_prior::{NonPriorSelection, estimate_lambda_np};
pub use objective::PenalizedObjective;
pub use pipeline::{PipelineError, PipelineResult, run_pipeline};
pub use prior::{PriorSelection, estimate_lambda_wp};
pub use refit::{PenalizedRefit, PrecisionRefit};
pub use subsample::{ConfigurationError, SubsampleOptimizer, SubsampleRun};
