use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoEnumIterator};

use crate::{
    error::{ChurnResult, DataError},
    math::series::SeriesSummary,
};

/// Default `strftime`-style format of every date field.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Price series summarised by default, one derived feature per series and summary.
pub const DEFAULT_SERIES_FEATURES: [&str; 6] = [
    "price_p1_fix",
    "price_p1_var",
    "price_p2_fix",
    "price_p2_var",
    "price_p3_fix",
    "price_p3_var",
];

/// How the vectorizer chooses its columns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ColumnSelection {
    /// Registered features present on the first row, plus derived features present
    /// on any row, sorted.
    ///
    /// Requires every later row to carry no other registered feature outside that set;
    /// rows lacking one of the columns are filled with the empty-datum sentinel.
    #[default]
    FirstRow,

    /// Sorted union of the registered features present on any row.
    Union,
}

/// Explicit configuration threaded through every pipeline entry point.
///
/// # Defaults
/// * date format `%Y-%m-%d`, interpreted as local midnight in `Europe/London`
/// * empty date and empty numeric cells both become `0.0`
/// * `id` identifies rows, `churned` is the label, `price_date` dates history rows
/// * all four series summaries over [`DEFAULT_SERIES_FEATURES`]
/// * [`ColumnSelection::FirstRow`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    date_format: String,

    /// Timezone dates are interpreted in. Pinned so epoch values do not depend on the host.
    timezone: Tz,

    /// Sentinel for an empty date cell.
    empty_date: f64,

    /// Sentinel for an empty numeric cell at vectorization.
    empty_datum: f64,

    id_field: String,
    label_field: String,
    history_date_field: String,

    series_features: Vec<String>,
    summaries: Vec<SeriesSummary>,

    /// Density bandwidth hint attached to derived features.
    derived_bandwidth: f64,

    column_selection: ColumnSelection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            timezone: chrono_tz::Europe::London,
            empty_date: 0.0,
            empty_datum: 0.0,
            id_field: "id".to_string(),
            label_field: "churned".to_string(),
            history_date_field: "price_date".to_string(),
            series_features: DEFAULT_SERIES_FEATURES.map(String::from).to_vec(),
            summaries: SeriesSummary::iter().collect(),
            derived_bandwidth: 0.2,
            column_selection: ColumnSelection::default(),
        }
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl PipelineConfig {
    pub fn with_date_format(self, date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
            ..self
        }
    }

    pub fn with_timezone(self, timezone: Tz) -> Self {
        Self { timezone, ..self }
    }

    /// Sets the timezone from its IANA name, e.g. `"UTC"` or `"Europe/Berlin"`.
    pub fn with_timezone_name(self, name: &str) -> ChurnResult<Self> {
        let timezone =
            Tz::from_str(name).map_err(|_| DataError::InvalidTimezone(name.to_string()))?;
        Ok(self.with_timezone(timezone))
    }

    pub fn with_empty_date(self, empty_date: f64) -> Self {
        Self { empty_date, ..self }
    }

    pub fn with_empty_datum(self, empty_datum: f64) -> Self {
        Self {
            empty_datum,
            ..self
        }
    }

    pub fn with_id_field(self, id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            ..self
        }
    }

    pub fn with_label_field(self, label_field: impl Into<String>) -> Self {
        Self {
            label_field: label_field.into(),
            ..self
        }
    }

    pub fn with_history_date_field(self, field: impl Into<String>) -> Self {
        Self {
            history_date_field: field.into(),
            ..self
        }
    }

    pub fn with_series_features<S: Into<String>>(
        self,
        features: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            series_features: features.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_summaries(self, summaries: impl IntoIterator<Item = SeriesSummary>) -> Self {
        let mut summaries: Vec<_> = summaries.into_iter().collect();
        summaries.sort_unstable();
        summaries.dedup();
        Self { summaries, ..self }
    }

    /// Selects summaries by name. Names that are not a known summary are ignored.
    pub fn with_summary_names<'a>(self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let summaries = names
            .into_iter()
            .filter_map(|name| match SeriesSummary::from_str(name) {
                Ok(s) => Some(s),
                Err(_) => {
                    tracing::debug!(name, "Ignoring unknown series summary");
                    None
                }
            })
            .collect::<Vec<_>>();
        self.with_summaries(summaries)
    }

    pub fn with_derived_bandwidth(self, derived_bandwidth: f64) -> Self {
        Self {
            derived_bandwidth,
            ..self
        }
    }

    pub fn with_column_selection(self, column_selection: ColumnSelection) -> Self {
        Self {
            column_selection,
            ..self
        }
    }
}

// ================================================================================================
// Accessor Methods
// ================================================================================================

impl PipelineConfig {
    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn empty_date(&self) -> f64 {
        self.empty_date
    }

    pub fn empty_datum(&self) -> f64 {
        self.empty_datum
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn label_field(&self) -> &str {
        &self.label_field
    }

    pub fn history_date_field(&self) -> &str {
        &self.history_date_field
    }

    pub fn series_features(&self) -> &[String] {
        &self.series_features
    }

    pub fn summaries(&self) -> &[SeriesSummary] {
        &self.summaries
    }

    pub fn derived_bandwidth(&self) -> f64 {
        self.derived_bandwidth
    }

    pub fn column_selection(&self) -> ColumnSelection {
        self.column_selection
    }
}
