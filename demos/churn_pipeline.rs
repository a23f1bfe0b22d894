use std::{env, fs, path::Path, time::Instant};

use anyhow::{Context, Result};
use churnprep::prelude::*;
use ndarray::Array1;
use time::macros::format_description;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let dir = env::args()
        .nth(1)
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures").to_string());
    let paths = DatasetPaths::in_dir(&dir);
    let pipeline = Pipeline::new(
        PipelineConfig::default().with_series_features(["price_p1_fix", "price_p1_var"]),
    );

    println!("Preparing churn matrices from {dir}...");

    let train_start = Instant::now();
    let inputs = paths
        .load_training(pipeline.config())
        .context("Failed to load training inputs")?;
    let prepared = pipeline.prepare(&inputs.data, &inputs.history, &inputs.registry)?;
    for (id, reason) in prepared.report.failures() {
        info!(%id, %reason, "Series summary failed");
    }
    let training =
        pipeline.labelled_training_matrix(&prepared.rows, &inputs.labels, &prepared.registry)?;
    let train_time = train_start.elapsed();

    let mut model = BaseRate::default();
    model.fit(&training.features, &training.labels)?;

    let infer_start = Instant::now();
    let test = paths
        .load_test(pipeline.config())
        .context("Failed to load test inputs")?;
    let prepared_test = pipeline.prepare(&test.data, &test.history, &inputs.registry)?;
    let inference =
        pipeline.inference_matrix(&prepared_test.rows, &prepared_test.registry, &training.layout)?;
    let infer_time = infer_start.elapsed();

    let out = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/churn_reports");
    PredictionReport::predict(&model, &inference)?.to_csv(&out, None, None)?;
    for feature in inputs.registry.categorical_names() {
        CategoryChurnReport::compute(
            feature,
            &inputs.data,
            &inputs.labels,
            pipeline.config().label_field(),
            1,
            churnprep::report::churn_ratio::DEFAULT_MAX_CATEGORIES,
        )?
        .to_csv(&out, None, None)?;
    }
    info!(
        fingerprint = %training.layout.fingerprint()?,
        width = training.layout.width(),
        "Feature layout"
    );

    println!("\n--- Pipeline Summary ---");
    println!(
        "Training matrix:   {} x {}",
        training.features.nrows(),
        training.features.ncols()
    );
    println!(
        "Inference matrix:  {} x {}",
        inference.features.nrows(),
        inference.features.ncols()
    );
    println!(
        "Series attached:   {} (skipped {})",
        prepared.report.attached_count(),
        prepared.report.skipped_count()
    );
    println!("1. Training build time:   {train_time:?}");
    println!("2. Inference build time:  {infer_time:?}");
    println!("Reports written to {}", out.display());

    drop(_guard);

    Ok(())
}

// ================================================================================================
// Model
// ================================================================================================

/// Predicts the training churn rate for every customer.
#[derive(Debug, Default)]
struct BaseRate {
    rate: f64,
}

impl Classifier for BaseRate {
    fn fit(&mut self, _features: &FeatureMatrix, labels: &LabelVector) -> ChurnResult<()> {
        self.rate = labels.as_array().mean().unwrap_or(0.0);
        Ok(())
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> ChurnResult<Array1<f64>> {
        Ok(Array1::from_elem(features.nrows(), self.rate))
    }
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let app_name = "churnprep";

    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!("Logging to stdout (container mode)");
        Ok(None)
    } else {
        let log_dir = dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
            .context("Failed to find a state or home directory")?
            .join(app_name)
            .join("logs");
        fs::create_dir_all(&log_dir)?;

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .context("Failed to format timestamp")?;
        let file_name = format!("{app_name}-{timestamp}.log");
        let file_path = log_dir.join(&file_name);

        let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!(log_file = %file_path.display(), "Logging to file (local mode)");
        Ok(Some(guard))
    }
}
