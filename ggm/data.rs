//! # Data Loading and Validation Module
//!
//! Reads the observation matrix and the prior matrix from delimited text files with a
//! header row and turns them into validated `ndarray` matrices. Files ending in `.tsv`
//! or `.tab` are tab-separated; anything else is read as comma-separated.
//!
//! - Data file: one column per variable, one row per observation, numeric and finite.
//! - Prior file: a square matrix whose header repeats the data file's variable names in
//!   the same order. Row `i` holds the prior weights of variable `i`. The matrix must be
//!   symmetric; zero means no prior edge.

use ndarray::{Array2, ArrayView2, ShapeBuilder};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Fewest observation rows a data file may have: a sub-sample needs at least two rows
/// and must be smaller than the data.
const MINIMUM_ROWS: usize = 3;

/// Largest absolute difference tolerated between `prior[i][j]` and `prior[j][i]`.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// A numeric matrix together with its column names.
#[derive(Debug, Clone)]
pub struct LabeledMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to assemble the matrix: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("The file '{0}' has no columns.")]
    NoColumns(String),
    #[error("The column '{0}' was not found in the input file. Please check spelling and case.")]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error("Input file contains only {found} data rows, but at least {required} are required.")]
    InsufficientRows { found: usize, required: usize },
    #[error(
        "Non-finite values (NaN or Infinity) were found in column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The prior matrix has {rows} rows and {cols} columns; it must be square.")]
    NotSquare { rows: usize, cols: usize },
    #[error("The prior matrix is not symmetric: entry ({row}, {col}) is {value} but ({col}, {row}) is {mirror}.")]
    NotSymmetric {
        row: usize,
        col: usize,
        value: f64,
        mirror: f64,
    },
    #[error("The prior columns {found:?} do not match the data columns {expected:?}.")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

fn separator_for(path: &str) -> u8 {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

fn read_frame(path: &str) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(
                    CsvParseOptions::default().with_separator(separator_for(path)),
                ),
        )
        .finish()?;
    if df.width() == 0 {
        return Err(DataError::NoColumns(path.to_string()));
    }
    Ok(df)
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df
        .column(column_name)
        .map_err(|_| DataError::ColumnNotFound(column_name.to_string()))?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn frame_to_matrix(df: &DataFrame) -> Result<LabeledMatrix, DataError> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let n = df.height();
    let mut buffer = Vec::with_capacity(n * names.len());
    for name in &names {
        buffer.extend(extract_numeric_column(df, name)?);
    }
    let values = Array2::from_shape_vec((n, names.len()).f(), buffer)?;
    Ok(LabeledMatrix { names, values })
}

/// Loads the `n × p` observation matrix.
pub fn load_data_matrix(path: &str) -> Result<LabeledMatrix, DataError> {
    log::info!("Loading data from '{path}'");
    let df = read_frame(path)?;
    if df.height() < MINIMUM_ROWS {
        return Err(DataError::InsufficientRows {
            found: df.height(),
            required: MINIMUM_ROWS,
        });
    }
    let matrix = frame_to_matrix(&df)?;
    log::info!(
        "Loaded {} observations of {} variables",
        matrix.values.nrows(),
        matrix.values.ncols()
    );
    Ok(matrix)
}

/// Loads the `p × p` prior matrix and checks it against the data's variable names.
pub fn load_prior_matrix(path: &str, expected_names: &[String]) -> Result<Array2<f64>, DataError> {
    log::info!("Loading prior matrix from '{path}'");
    let matrix = frame_to_matrix(&read_frame(path)?)?;
    if matrix.names != expected_names {
        return Err(DataError::ColumnMismatch {
            expected: expected_names.to_vec(),
            found: matrix.names,
        });
    }
    let (rows, cols) = matrix.values.dim();
    if rows != cols {
        return Err(DataError::NotSquare { rows, cols });
    }
    validate_symmetric(matrix.values.view())?;

    let prior_edges = (0..rows)
        .flat_map(|i| ((i + 1)..cols).map(move |j| (i, j)))
        .filter(|&(i, j)| matrix.values[[i, j]] != 0.0)
        .count();
    log::info!("Prior marks {prior_edges} of {} possible edges", rows * rows.saturating_sub(1) / 2);
    Ok(matrix.values)
}

fn validate_symmetric(matrix: ArrayView2<f64>) -> Result<(), DataError> {
    let p = matrix.nrows();
    for i in 0..p {
        for j in (i + 1)..p {
            let (value, mirror) = (matrix[[i, j]], matrix[[j, i]]);
            if (value - mirror).abs() > SYMMETRY_TOLERANCE {
                return Err(DataError::NotSymmetric {
                    row: i,
                    col: j,
                    value,
                    mirror,
                });
            }
        }
    }
    Ok(())
}

/// Writes a matrix with a header row of `names`, one column per name.
pub fn write_matrix(path: &str, names: &[String], values: ArrayView2<f64>) -> Result<(), DataError> {
    if names.len() != values.ncols() {
        return Err(DataError::ColumnMismatch {
            expected: names.to_vec(),
            found: (0..values.ncols()).map(|j| format!("column {j}")).collect(),
        });
    }
    let columns: Vec<Column> = names
        .iter()
        .zip(values.columns())
        .map(|(name, column)| Series::new(name.as_str().into(), column.to_vec()).into())
        .collect();
    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(Path::new(path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(separator_for(path))
        .finish(&mut df)?;
    Ok(())
}
