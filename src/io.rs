use std::path::{Path, PathBuf};

use polars::{
    frame::DataFrame,
    prelude::{LazyCsvReader, LazyFileListReader, PlPath, StringChunked},
};

use crate::{
    config::PipelineConfig,
    data::{
        record::Record,
        registry::{FeatureDescriptor, FeatureRegistry, PlotHints},
    },
    error::{ChurnError, ChurnResult, DataError, IoError, SchemaError},
};

// ================================================================================================
// Dataset Paths
// ================================================================================================

pub const FEATURES_FILE: &str = "features.csv";
pub const TRAINING_DATA_FILE: &str = "ml_case_train_data.csv";
pub const TRAINING_LABELS_FILE: &str = "ml_case_train_output.csv";
pub const TRAINING_HISTORY_FILE: &str = "ml_case_train_hist_data.csv";
pub const TEST_DATA_FILE: &str = "ml_case_test_data.csv";
pub const TEST_HISTORY_FILE: &str = "ml_case_test_hist_data.csv";

/// Locations of the input datasets.
///
/// File names default to the ones above, resolved against a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    features: PathBuf,
    training_data: PathBuf,
    training_labels: PathBuf,
    training_history: PathBuf,
    test_data: PathBuf,
    test_history: PathBuf,
}

impl DatasetPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            features: dir.join(FEATURES_FILE),
            training_data: dir.join(TRAINING_DATA_FILE),
            training_labels: dir.join(TRAINING_LABELS_FILE),
            training_history: dir.join(TRAINING_HISTORY_FILE),
            test_data: dir.join(TEST_DATA_FILE),
            test_history: dir.join(TEST_HISTORY_FILE),
        }
    }

    pub fn with_features(self, features: impl Into<PathBuf>) -> Self {
        Self {
            features: features.into(),
            ..self
        }
    }

    pub fn with_training_data(self, training_data: impl Into<PathBuf>) -> Self {
        Self {
            training_data: training_data.into(),
            ..self
        }
    }

    pub fn with_training_labels(self, training_labels: impl Into<PathBuf>) -> Self {
        Self {
            training_labels: training_labels.into(),
            ..self
        }
    }

    pub fn with_training_history(self, training_history: impl Into<PathBuf>) -> Self {
        Self {
            training_history: training_history.into(),
            ..self
        }
    }

    pub fn with_test_data(self, test_data: impl Into<PathBuf>) -> Self {
        Self {
            test_data: test_data.into(),
            ..self
        }
    }

    pub fn with_test_history(self, test_history: impl Into<PathBuf>) -> Self {
        Self {
            test_history: test_history.into(),
            ..self
        }
    }

    pub fn features(&self) -> &Path {
        &self.features
    }

    pub fn training_data(&self) -> &Path {
        &self.training_data
    }

    pub fn training_labels(&self) -> &Path {
        &self.training_labels
    }

    pub fn training_history(&self) -> &Path {
        &self.training_history
    }

    pub fn test_data(&self) -> &Path {
        &self.test_data
    }

    pub fn test_history(&self) -> &Path {
        &self.test_history
    }

    /// Reads the feature table, the training rows, their positional labels and history.
    #[tracing::instrument(skip_all, fields(data = %self.training_data.display()))]
    pub fn load_training(&self, config: &PipelineConfig) -> ChurnResult<TrainingInputs> {
        let registry = read_registry(&self.features)?;
        let data = read_records(&self.training_data, config.id_field())?;
        let labels = read_positional_labels(&data, &self.training_labels, config.label_field())?;
        let history = read_records(&self.training_history, config.id_field())?;
        tracing::info!(
            features = registry.len(),
            rows = data.len(),
            history = history.len(),
            "Training inputs loaded"
        );
        Ok(TrainingInputs {
            registry,
            data,
            labels,
            history,
        })
    }

    /// Reads the test rows and, when the file exists, their history.
    #[tracing::instrument(skip_all, fields(data = %self.test_data.display()))]
    pub fn load_test(&self, config: &PipelineConfig) -> ChurnResult<TestInputs> {
        let data = read_records(&self.test_data, config.id_field())?;
        let history = if self.test_history.exists() {
            read_records(&self.test_history, config.id_field())?
        } else {
            tracing::warn!(
                path = %self.test_history.display(),
                "No test history file, series features will be absent"
            );
            Vec::new()
        };
        Ok(TestInputs { data, history })
    }
}

impl Default for DatasetPaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

#[derive(Debug, Clone)]
pub struct TrainingInputs {
    pub registry: FeatureRegistry,
    pub data: Vec<Record>,
    pub labels: Vec<Record>,
    pub history: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct TestInputs {
    pub data: Vec<Record>,
    pub history: Vec<Record>,
}

// ================================================================================================
// Readers
// ================================================================================================

/// Reads a CSV file with a header row into records.
///
/// Every column is read as a string; empty cells become empty strings.
pub fn read_records(path: impl AsRef<Path>, id_field: &str) -> ChurnResult<Vec<Record>> {
    let df = read_string_frame(path.as_ref(), true)?;
    let names = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect::<Vec<_>>();
    let columns = string_columns(&df)?;

    (0..df.height())
        .map(|i| {
            let pairs = names
                .iter()
                .zip(&columns)
                .map(|(name, col)| (name.as_str(), col.get(i).unwrap_or("")));
            Record::from_raw(pairs, id_field)
        })
        .collect()
}

/// Reads the feature metadata table into a registry.
///
/// Required columns are `name`, `is_categorical` and `is_date`; `log_x`, `bandwidth`
/// and `display_name` are optional. Flags accept `1`/`0`/`true`/`false`, blank meaning false.
pub fn read_registry(path: impl AsRef<Path>) -> ChurnResult<FeatureRegistry> {
    let df = read_string_frame(path.as_ref(), true)?;
    let names = required_column(&df, "name")?;
    let is_categorical = required_column(&df, "is_categorical")?;
    let is_date = required_column(&df, "is_date")?;
    let log_x = optional_column(&df, "log_x")?;
    let bandwidth = optional_column(&df, "bandwidth")?;
    let display_name = optional_column(&df, "display_name")?;

    let mut registry = FeatureRegistry::new();
    for i in 0..df.height() {
        let name = cell(Some(names), i);
        if name.is_empty() {
            continue;
        }

        let descriptor = FeatureDescriptor {
            is_categorical: parse_flag(name, "is_categorical", cell(Some(is_categorical), i))?,
            is_date: parse_flag(name, "is_date", cell(Some(is_date), i))?,
            is_derived: false,
            hints: PlotHints {
                log_x: parse_flag(name, "log_x", cell(log_x, i))?,
                bandwidth: parse_bandwidth(name, cell(bandwidth, i))?,
                display_name: Some(cell(display_name, i))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            },
        };
        registry = registry.with_feature(name, descriptor);
    }

    tracing::debug!(features = registry.len(), "Feature registry loaded");
    Ok(registry)
}

/// Reads a side file of bare labels, one per line, aligned by position with `data_rows`.
///
/// Produces label rows carrying the matching data row's id and `label_field`.
pub fn read_positional_labels(
    data_rows: &[Record],
    path: impl AsRef<Path>,
    label_field: &str,
) -> ChurnResult<Vec<Record>> {
    let path = path.as_ref();
    let df = read_string_frame(path, false)?;
    let values = df
        .get_columns()
        .first()
        .ok_or_else(|| IoError::ReadFailed(format!("{} has no columns", path.display())))?
        .str()
        .map_err(polars_err)?;

    if values.len() != data_rows.len() {
        return Err(IoError::LabelCountMismatch {
            path: path.display().to_string(),
            labels: values.len(),
            rows: data_rows.len(),
        }
        .into());
    }

    Ok(data_rows
        .iter()
        .zip(values.iter())
        .map(|(row, label)| {
            Record::new(row.id().clone()).with(label_field, label.unwrap_or("").trim())
        })
        .collect())
}

fn read_string_frame(path: &Path, has_header: bool) -> ChurnResult<DataFrame> {
    if !path.exists() {
        return Err(IoError::FileSystem(format!("File not found: {}", path.display())).into());
    }
    let uri = path.to_str().ok_or_else(|| {
        IoError::FileSystem(format!(
            "Path contains invalid UTF-8 characters: {}",
            path.display()
        ))
    })?;

    LazyCsvReader::new(PlPath::new(uri))
        .with_has_header(has_header)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())).into())
}

fn string_columns(df: &DataFrame) -> ChurnResult<Vec<&StringChunked>> {
    df.get_columns()
        .iter()
        .map(|c| c.str().map_err(polars_err))
        .collect()
}

fn optional_column<'a>(df: &'a DataFrame, name: &str) -> ChurnResult<Option<&'a StringChunked>> {
    match df.column(name) {
        Ok(c) => Ok(Some(c.str().map_err(polars_err)?)),
        Err(_) => Ok(None),
    }
}

fn required_column<'a>(df: &'a DataFrame, name: &str) -> ChurnResult<&'a StringChunked> {
    optional_column(df, name)?.ok_or_else(|| {
        IoError::ReadFailed(format!("feature table lacks column '{name}'")).into()
    })
}

/// Trimmed cell `i` of `column`; empty when the column or the value is absent.
fn cell(column: Option<&StringChunked>, i: usize) -> &str {
    column.and_then(|c| c.get(i)).unwrap_or("").trim()
}

fn polars_err(e: polars::error::PolarsError) -> ChurnError {
    DataError::DataFrame(e.to_string()).into()
}

fn parse_flag(feature: &str, column: &str, raw: &str) -> ChurnResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(SchemaError::InvalidDescriptor {
            feature: feature.to_string(),
            msg: format!("'{other}' is not a valid {column} flag"),
        }
        .into()),
    }
}

/// Blank and zero bandwidths leave the choice to the consumer.
fn parse_bandwidth(feature: &str, raw: &str) -> ChurnResult<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|e| SchemaError::InvalidDescriptor {
            feature: feature.to_string(),
            msg: format!("bandwidth '{raw}': {e}"),
        })?;
    Ok(Some(value).filter(|v| *v != 0.0))
}
