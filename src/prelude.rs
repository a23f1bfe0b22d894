// 1. Traits
pub use crate::report::classifier::Classifier;
pub use crate::report::io::{AsFormattedLazyFrame, Report, ReportName, ToCsv, ToJson, ToSchema};

// 2. The Core Pipeline Types
pub use crate::pipeline::{
    InferenceSet, Pipeline, PreparedRows, TrainingSet,
    labels::{LabelVector, is_truthy, label_value},
    layout::FeatureLayout,
};

// 3. Rows & Feature Metadata
pub use crate::data::domain::{Code, CustomerId, EpochSeconds};
pub use crate::data::record::{Datum, Record};
pub use crate::data::registry::{FeatureDescriptor, FeatureRegistry, PlotHints};

// 4. Transformation Stages
pub use crate::math::series::SeriesSummary;
pub use crate::transform::categorical::{ValueMap, ValueMaps, encode, encode_with};
pub use crate::transform::date::{DateNormalizer, format_timestamp, parse_date};
pub use crate::transform::one_hot::{OneHotLayout, expand};
pub use crate::transform::timeseries::{
    CustomerSeries, SeriesOutcome, SeriesReport, SkipReason, TimeSeriesSummarizer,
};
pub use crate::transform::vectorize::{FeatureColumns, FeatureMatrix, Vectorizer};

// 5. Errors
pub use crate::error::{ChurnError, ChurnResult, DataError, IoError, SchemaError, SystemError};

// 6. Configs & Ingestion
pub use crate::config::{ColumnSelection, PipelineConfig};
pub use crate::io::{DatasetPaths, read_positional_labels, read_records, read_registry};

// 7. Reports
pub use crate::report::churn_ratio::CategoryChurnReport;
pub use crate::report::predictions::PredictionReport;
