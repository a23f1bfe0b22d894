use std::path::PathBuf;

use churnprep::prelude::*;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn dataset() -> DatasetPaths {
    DatasetPaths::in_dir(fixtures_dir())
}

/// The fixture histories only carry the first price period.
pub fn setup_config() -> PipelineConfig {
    PipelineConfig::default().with_series_features(["price_p1_fix", "price_p1_var"])
}

pub fn value(matrix: &FeatureMatrix, row: usize, column: &str) -> f64 {
    matrix
        .column(column)
        .unwrap_or_else(|| panic!("no column {column}"))[row]
}
