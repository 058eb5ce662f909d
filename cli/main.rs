#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process;

use piggm::data::{load_data_matrix, load_prior_matrix, write_matrix};
use piggm::metrics::{
    DEFAULT_EDGE_THRESHOLD, GridPointSummary, SweepSettings, evaluate_lambda_grid,
    evaluate_reconstruction,
};
use piggm::model::linspace;
use piggm::synthetic::SyntheticNetworkBuilder;
use piggm::{PenalizedRefit, PipelineConfig, run_pipeline};

#[derive(Args)]
pub struct FitArgs {
    /// Path to the data file (CSV, or TSV with a .tsv extension): one column per variable
    pub data: String,

    /// Path to the prior matrix file; its header must repeat the data columns
    pub prior: String,

    /// TOML run configuration. Flags below override its values.
    #[arg(long)]
    pub config: Option<String>,

    /// Rows per sub-sample (b). Defaults to half the rows when no config is given.
    #[arg(long, value_name = "B")]
    pub subsample_size: Option<usize>,

    /// Number of distinct sub-samples (Q)
    #[arg(long, value_name = "Q")]
    pub num_subsamples: Option<usize>,

    /// Smallest candidate lambda
    #[arg(long)]
    pub lambda_min: Option<f64>,

    /// Largest candidate lambda
    #[arg(long)]
    pub lambda_max: Option<f64>,

    /// Number of evenly spaced candidate lambdas
    #[arg(long)]
    pub lambda_count: Option<usize>,

    /// Seed for drawing the sub-samples
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (default: all logical cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Optional true adjacency matrix; reconstruction metrics are printed when given
    #[arg(long)]
    pub truth: Option<String>,

    /// Where to write the estimate (.toml)
    #[arg(long)]
    pub output: String,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of variables in the generated network
    #[arg(long, default_value = "10")]
    pub variables: usize,

    /// Number of observations
    #[arg(long, default_value = "500")]
    pub samples: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Probability that a true edge appears in the prior
    #[arg(long, default_value = "0.95")]
    pub edge_recall: f64,

    /// Probability that a non-edge appears in the prior
    #[arg(long, default_value = "0.05")]
    pub false_edge_rate: f64,

    /// Directory receiving data.csv, prior.csv and adjacency.csv
    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// First non-prior lambda of the grid
    #[arg(long, default_value = "0.1")]
    pub lambda_np_min: f64,

    /// Last non-prior lambda of the grid
    #[arg(long, default_value = "0.3")]
    pub lambda_np_max: f64,

    /// First prior lambda of the grid
    #[arg(long, default_value = "0.08")]
    pub lambda_wp_min: f64,

    /// Last prior lambda of the grid
    #[arg(long, default_value = "0.2")]
    pub lambda_wp_max: f64,

    /// Number of grid points; the two ranges are walked in step
    #[arg(long, default_value = "25")]
    pub grid_size: usize,

    /// Synthetic data sets per grid point
    #[arg(long, default_value = "30")]
    pub runs: usize,

    /// Number of variables in each generated network
    #[arg(long, default_value = "10")]
    pub variables: usize,

    /// Observations per data set
    #[arg(long, default_value = "500")]
    pub samples: usize,

    /// Seed of the first data set; run r uses seed + r
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Value written at marked prior entries
    #[arg(long, default_value = "0.8")]
    pub prior_weight: f64,

    /// Optional TOML file receiving the per-grid-point summaries
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "piggm",
    version,
    about = "Prior-incorporated sparse Gaussian graphical model estimation",
    long_about = "Estimates a sparse precision matrix by stability selection over sub-samples, \
                 with a separate penalty for variable pairs that a prior matrix marks as edges."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the penalties by sub-sampling and refit the network
    #[command(about = "Estimate a network (outputs: estimate.toml)")]
    Fit(FitArgs),
    /// Generate a synthetic network with data and a noisy prior
    #[command(about = "Generate synthetic data (outputs: data.csv, prior.csv, adjacency.csv)")]
    Simulate(SimulateArgs),
    /// Score fixed penalty pairs on many synthetic data sets
    #[command(about = "Sweep a lambda grid over synthetic networks and average the metrics")]
    Evaluate(EvaluateArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Fit(args)) => fit(args),
        Some(Commands::Simulate(args)) => simulate(args),
        Some(Commands::Evaluate(args)) => evaluate(args),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Merges the optional config file with the command-line overrides.
fn build_config(args: &FitArgs, num_rows: usize) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::new(num_rows / 2, 50, linspace(0.01, 0.05, 20)),
    };

    if let Some(b) = args.subsample_size {
        config.subsample_size = b;
    }
    if let Some(q) = args.num_subsamples {
        config.num_subsamples = q;
    }
    if args.lambda_min.is_some() || args.lambda_max.is_some() || args.lambda_count.is_some() {
        let current_min = config.lambdas.first().copied().unwrap_or(0.01);
        let current_max = config.lambdas.last().copied().unwrap_or(0.05);
        config.lambdas = linspace(
            args.lambda_min.unwrap_or(current_min),
            args.lambda_max.unwrap_or(current_max),
            args.lambda_count.unwrap_or(config.lambdas.len()),
        );
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    config.show_progress = true;
    config.validate()?;
    Ok(config)
}

fn fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let data = load_data_matrix(&args.data)?;
    let prior = load_prior_matrix(&args.prior, &data.names)?;
    let config = build_config(&args, data.values.nrows())?;

    let refit = PenalizedRefit::new(config.optimizer.clone());
    let result = run_pipeline(data.values.view(), prior.view(), &config, &refit)?;

    println!(
        "Selected lambda_np = {:.4}, lambda_wp = {:.4} (tau = {:.4})",
        result.non_prior.lambda_np, result.prior.lambda_wp, result.prior.tau
    );
    let diagnostics = &result.run.diagnostics;
    println!(
        "{} of {} sub-sample fits converged",
        diagnostics.converged, diagnostics.total_tasks
    );

    if let Some(truth_path) = &args.truth {
        let truth = load_prior_matrix(truth_path, &data.names)?;
        let metrics =
            evaluate_reconstruction(truth.view(), result.precision.view(), DEFAULT_EDGE_THRESHOLD);
        for (name, value) in metrics.as_map() {
            println!("{name:>20}: {value:.4}");
        }
    }

    let estimate = result.into_estimate(&config, data.names);
    println!(
        "Refit network has {} edges",
        estimate.edges(DEFAULT_EDGE_THRESHOLD).len()
    );
    estimate.save(&args.output)?;
    println!("Estimate written to '{}'", args.output);
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let network = SyntheticNetworkBuilder::new(args.variables)
        .samples(args.samples)
        .seed(args.seed)
        .edge_recall(args.edge_recall)
        .false_edge_rate(args.false_edge_rate)
        .build()?;

    fs::create_dir_all(&args.output_dir)?;
    let names = network.variable_names();
    for (file_name, matrix) in [
        ("data.csv", &network.data),
        ("prior.csv", &network.prior),
        ("adjacency.csv", &network.adjacency),
    ] {
        let path = args.output_dir.join(file_name);
        let path = path.to_str().ok_or("output directory is not valid UTF-8")?;
        write_matrix(path, &names, matrix.view())?;
    }

    println!(
        "Wrote a {}-variable network with {} edges and {} samples to '{}'",
        args.variables,
        network.num_edges(),
        args.samples,
        args.output_dir.display()
    );
    Ok(())
}

#[derive(Serialize)]
struct SweepReport {
    grid: Vec<GridPointSummary>,
}

fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let grid: Vec<(f64, f64)> = linspace(args.lambda_np_min, args.lambda_np_max, args.grid_size)
        .into_iter()
        .zip(linspace(args.lambda_wp_min, args.lambda_wp_max, args.grid_size))
        .collect();
    let settings = SweepSettings {
        variables: args.variables,
        samples: args.samples,
        runs: args.runs,
        seed: args.seed,
        prior_weight: args.prior_weight,
        ..SweepSettings::default()
    };

    let summaries = evaluate_lambda_grid(&grid, &settings)?;
    for summary in &summaries {
        println!("{:.4} / {:.4}", summary.lambda_np, summary.lambda_wp);
        for (name, value) in summary.mean.as_map() {
            println!("{name:>20}: {value:.4}");
        }
        println!(
            "{:>20}: {} of {}\n",
            "successful runs", summary.successful_runs, args.runs
        );
    }

    if let Some(path) = &args.output {
        let report = SweepReport { grid: summaries };
        fs::write(path, toml::to_string_pretty(&report)?)?;
        println!("Sweep summary written to '{path}'");
    }
    Ok(())
}
