
use thiserror::Error;

pub type ChurnResult<T> = Result<T, ChurnError>;

#[derive(Debug, Error)]
pub enum ChurnError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while interpreting record values.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Unparseable date '{value}' for feature '{feature}' (format '{format}'): {msg}")]
    UnparseableDate {
        feature: String,
        value: String,
        format: String,
        msg: String,
    },

    #[error("Date '{value}' does not exist in timezone {timezone}")]
    NonexistentLocalTime { value: String, timezone: String },

    #[error("Timestamp {0} is outside the representable date range")]
    TimestampOutOfRange(f64),

    #[error("Unknown timezone: '{0}'")]
    InvalidTimezone(String),

    #[error("Non-numeric value '{value}' for feature '{feature}'")]
    NonNumeric { feature: String, value: String },

    #[error("Record is missing its id field '{0}'")]
    MissingId(String),

    #[error("Record '{id}' is missing field '{field}'")]
    MissingField { id: String, field: String },

    #[error("Label row for id '{id}' is missing label field '{field}'")]
    MissingLabel { id: String, field: String },

    #[error("Data and label rows share no ids")]
    NoSharedIds,

    #[error("Empty row population: {0}")]
    EmptyPopulation(String),

    #[error("Matrix shape error: {0}")]
    Shape(String),

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors signalling a mismatch between rows and feature descriptors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unknown feature: '{0}'")]
    UnknownFeature(String),

    #[error(
        "Row {row} carries registered feature '{feature}' which is not among the selected columns"
    )]
    HeterogeneousRows { row: usize, feature: String },

    #[error("Invalid feature metadata for '{feature}': {msg}")]
    InvalidDescriptor { feature: String, msg: String },

    #[error("Feature layout mismatch: {0}")]
    LayoutMismatch(String),
}

/// Errors related to reading datasets and writing reports.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    #[error("Label file '{path}' has {labels} labels but the data file has {rows} rows")]
    LabelCountMismatch {
        path: String,
        labels: usize,
        rows: usize,
    },
}

/// Errors related to internal invariants.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Failed to encode feature layout")]
    Encoding(#[from] postcard::Error),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
