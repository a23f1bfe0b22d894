use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono_tz::Tz;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::PipelineConfig,
    data::{
        domain::CustomerId,
        record::{Datum, Record},
        registry::{FeatureDescriptor, FeatureRegistry},
    },
    error::{ChurnResult, DataError},
    math::series::SeriesSummary,
    transform::date::parse_date,
};

// ================================================================================================
// Series Types
// ================================================================================================

/// Raw observations of one series, keyed by epoch seconds.
pub type Series = BTreeMap<i64, String>;

/// Every named series observed for one customer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomerSeries {
    pub id: CustomerId,
    pub series: BTreeMap<String, Series>,
}

impl CustomerSeries {
    pub fn get(&self, feature: &str) -> Option<&Series> {
        self.series.get(feature)
    }
}

/// Timestamp-sorted values of a series that are parseable and strictly positive.
pub fn qualifying_points(series: &Series) -> (Vec<i64>, Vec<f64>) {
    series
        .iter()
        .filter_map(|(ts, raw)| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| *v > 0.0)
                .map(|v| (*ts, v))
        })
        .unzip()
}

// ================================================================================================
// Diagnostics
// ================================================================================================

/// Why a customer received no derived features.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("no price history for this customer")]
    NoHistory,

    #[error("series '{0}' missing from the customer's history")]
    MissingSeries(String),

    #[error("summary '{0}' is not a finite number")]
    NonFinite(String),
}

/// Result of deriving features for a single customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeriesOutcome {
    Attached { features: usize },
    Skipped(SkipReason),
}

/// Per-customer outcomes of one summarize call, in row order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesReport {
    outcomes: Vec<(CustomerId, SeriesOutcome)>,
}

impl SeriesReport {
    pub fn outcomes(&self) -> &[(CustomerId, SeriesOutcome)] {
        &self.outcomes
    }

    pub fn attached_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SeriesOutcome::Attached { .. }))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&CustomerId, &SkipReason)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            SeriesOutcome::Skipped(reason) => Some((id, reason)),
            SeriesOutcome::Attached { .. } => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    /// Skipped customers whose history existed but could not be summarised.
    pub fn failures(&self) -> impl Iterator<Item = (&CustomerId, &SkipReason)> {
        self.skipped()
            .filter(|(_, reason)| !matches!(reason, SkipReason::NoHistory))
    }
}

/// Rows with derived features attached, the grown registry, and the diagnostics.
#[derive(Debug, Clone)]
pub struct Summarized {
    pub rows: Vec<Record>,
    pub registry: FeatureRegistry,
    pub report: SeriesReport,
}

// ================================================================================================
// Summarizer
// ================================================================================================

/// Derives scalar features from per-customer price histories.
#[derive(Debug, Clone)]
pub struct TimeSeriesSummarizer {
    series_features: Vec<String>,
    summaries: Vec<SeriesSummary>,
    date_field: String,
    date_format: String,
    timezone: Tz,
    bandwidth: f64,
}

impl TimeSeriesSummarizer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            series_features: config.series_features().to_vec(),
            summaries: config.summaries().to_vec(),
            date_field: config.history_date_field().to_string(),
            date_format: config.date_format().to_string(),
            timezone: config.timezone(),
            bandwidth: config.derived_bandwidth(),
        }
    }

    pub fn series_features(&self) -> &[String] {
        &self.series_features
    }

    /// Groups history rows into one [`CustomerSeries`] per contiguous run of equal ids.
    ///
    /// Grouping is by *consecutive* rows only: an id whose rows are interleaved with
    /// another id's yields several entries. Sort `historical` by id first when that matters.
    /// Within a run a repeated date overwrites the earlier observation.
    ///
    /// # Errors
    /// A row lacking the date field, or with a date that does not parse, aborts extraction.
    #[tracing::instrument(skip_all, fields(rows = historical.len()))]
    pub fn extract_series(&self, historical: &[Record]) -> ChurnResult<Vec<CustomerSeries>> {
        let runs = historical.iter().chunk_by(|row| row.id());

        let mut out = Vec::new();
        for (id, run) in &runs {
            let mut series: BTreeMap<String, Series> = BTreeMap::new();
            for row in run {
                let ts = self.timestamp_of(row)?;
                for feature in &self.series_features {
                    if let Some(value) = row.get(feature) {
                        series
                            .entry(feature.clone())
                            .or_default()
                            .insert(ts, value.as_key().into_owned());
                    }
                }
            }
            out.push(CustomerSeries {
                id: id.clone(),
                series,
            });
        }

        tracing::debug!(customers = out.len(), "Series extracted");
        Ok(out)
    }

    fn timestamp_of(&self, row: &Record) -> ChurnResult<i64> {
        let raw = row.get(&self.date_field).ok_or_else(|| DataError::MissingField {
            id: row.id().to_string(),
            field: self.date_field.clone(),
        })?;
        match raw {
            Datum::Number(ts) => Ok(*ts as i64),
            Datum::Text(s) => parse_date(&self.date_field, s, &self.date_format, self.timezone)
                .map(|ts| ts.0 as i64),
        }
    }

    /// Attaches `<series>_<summary>` features to every row with a matching history.
    ///
    /// When `series` holds several entries for one id, the last one is used. A customer
    /// that cannot be summarised keeps its row unchanged and is recorded in the report;
    /// the batch always completes. Derived features attached to at least one row are
    /// added to the returned registry as continuous, non-date features.
    #[tracing::instrument(skip_all, fields(rows = rows.len(), customers = series.len()))]
    pub fn summarize(
        &self,
        rows: &[Record],
        series: &[CustomerSeries],
        registry: &FeatureRegistry,
    ) -> Summarized {
        let index: HashMap<&CustomerId, &CustomerSeries> =
            series.iter().map(|cs| (&cs.id, cs)).collect();

        let mut produced = BTreeSet::new();
        let mut report = SeriesReport::default();
        let mut out = Vec::with_capacity(rows.len());

        for row in rows {
            let derived = match index.get(row.id()) {
                Some(cs) => self.derive(cs),
                None => Err(SkipReason::NoHistory),
            };
            match derived {
                Ok(fields) => {
                    produced.extend(fields.iter().map(|(name, _)| name.clone()));
                    report.outcomes.push((
                        row.id().clone(),
                        SeriesOutcome::Attached {
                            features: fields.len(),
                        },
                    ));
                    out.push(row.with_fields(fields));
                }
                Err(reason) => {
                    match reason {
                        SkipReason::NoHistory => {
                            tracing::debug!(id = %row.id(), "No history, derived features omitted")
                        }
                        _ => tracing::warn!(id = %row.id(), %reason, "Derived features omitted"),
                    }
                    report
                        .outcomes
                        .push((row.id().clone(), SeriesOutcome::Skipped(reason)));
                    out.push(row.clone());
                }
            }
        }

        let registry = registry.extended(
            produced
                .into_iter()
                .map(|name| (name, FeatureDescriptor::derived(self.bandwidth))),
        );

        tracing::info!(
            attached = report.attached_count(),
            skipped = report.skipped_count(),
            "Time-series features added"
        );
        Summarized {
            rows: out,
            registry,
            report,
        }
    }

    /// All derived fields of one customer, or the reason none can be attached.
    fn derive(&self, cs: &CustomerSeries) -> Result<Vec<(String, Datum)>, SkipReason> {
        let mut fields = Vec::with_capacity(self.series_features.len() * self.summaries.len());
        for feature in &self.series_features {
            let series = cs
                .get(feature)
                .ok_or_else(|| SkipReason::MissingSeries(feature.clone()))?;
            let (_, values) = qualifying_points(series);
            for summary in &self.summaries {
                let name = summary.feature_name(feature);
                let value = summary.evaluate(&values);
                if !value.is_finite() {
                    return Err(SkipReason::NonFinite(name));
                }
                fields.push((name, Datum::Number(value)));
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn summarizer() -> TimeSeriesSummarizer {
        TimeSeriesSummarizer::from_config(
            &PipelineConfig::default().with_series_features(["price_1", "price_2"]),
        )
    }

    fn history(rows: &[(&str, &str, &str, &str)]) -> Vec<Record> {
        rows.iter()
            .map(|(id, date, p1, p2)| {
                Record::new(*id)
                    .with("price_date", *date)
                    .with("price_1", *p1)
                    .with("price_2", *p2)
            })
            .collect()
    }

    fn sample_history() -> Vec<Record> {
        history(&[
            ("1", "2015-01-01", "10", "1"),
            ("1", "2015-02-01", "20", "2"),
            ("2", "2015-01-01", "30", "3"),
            ("2", "2015-02-01", "20", "2"),
            ("2", "2015-03-01", "10", "1"),
        ])
    }

    fn number(row: &Record, name: &str) -> f64 {
        match row.get(name) {
            Some(Datum::Number(n)) => *n,
            other => panic!("expected number for {name}, got {other:?}"),
        }
    }

    #[test]
    fn extract_groups_by_customer_and_date() {
        let series = summarizer().extract_series(&sample_history()).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].id.as_str(), "1");
        let p1: Vec<_> = series[0].get("price_1").unwrap().iter().collect();
        assert_eq!(
            p1,
            vec![
                (&1_420_070_400, &"10".to_string()),
                (&1_422_748_800, &"20".to_string())
            ]
        );
        assert_eq!(series[1].get("price_2").unwrap().len(), 3);
        assert_eq!(
            series[1].get("price_1").unwrap().keys().last(),
            Some(&1_425_168_000)
        );
    }

    #[test]
    fn extract_uses_contiguous_runs_only() {
        let rows = history(&[
            ("1", "2015-01-01", "10", "1"),
            ("2", "2015-01-01", "30", "3"),
            ("1", "2015-02-01", "20", "2"),
        ]);
        let series = summarizer().extract_series(&rows).unwrap();
        let ids: Vec<_> = series.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "1"]);
    }

    #[test]
    fn duplicate_dates_keep_the_last_observation() {
        let rows = history(&[
            ("1", "2015-01-01", "10", "1"),
            ("1", "2015-01-01", "15", "1"),
        ]);
        let series = summarizer().extract_series(&rows).unwrap();
        let p1 = series[0].get("price_1").unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1.values().next().map(String::as_str), Some("15"));
    }

    #[test]
    fn malformed_history_date_aborts_extraction() {
        let rows = history(&[("1", "01/01/2015", "10", "1")]);
        assert!(summarizer().extract_series(&rows).is_err());
    }

    #[test]
    fn summarize_attaches_named_summaries() {
        let s = summarizer();
        let series = s.extract_series(&sample_history()).unwrap();
        let rows = vec![Record::new("1").with("weight", "3")];
        let out = s.summarize(&rows, &series, &FeatureRegistry::new());

        let row = &out.rows[0];
        assert_eq!(number(row, "price_1_max"), 20.0);
        assert_eq!(number(row, "price_1_min"), 10.0);
        assert_eq!(number(row, "price_1_range"), 10.0);
        assert_eq!(number(row, "price_1_sum_returns"), 10.0);
        assert_eq!(number(row, "price_2_max"), 2.0);
        assert_eq!(row.get("weight"), Some(&Datum::text("3")));

        let descriptor = out.registry.get("price_1_max").unwrap();
        assert!(!descriptor.is_categorical && !descriptor.is_date);
        assert_eq!(out.registry.len(), 8);
        assert_eq!(out.report.attached_count(), 1);
    }

    #[test]
    fn non_positive_and_unparseable_points_are_dropped() {
        let rows = history(&[
            ("1", "2015-01-01", "0", "1"),
            ("1", "2015-02-01", "n/a", "1"),
            ("1", "2015-03-01", "12", "1"),
            ("1", "2015-04-01", "-4", "1"),
            ("1", "2015-05-01", "", "1"),
            ("1", "2015-06-01", "18", "1"),
        ]);
        let s = summarizer();
        let series = s.extract_series(&rows).unwrap();
        let (xs, ys) = qualifying_points(series[0].get("price_1").unwrap());
        assert_eq!(ys, vec![12.0, 18.0]);
        assert!(xs.windows(2).all(|w| w[0] < w[1]));

        let out = s.summarize(&[Record::new("1")], &series, &FeatureRegistry::new());
        assert_eq!(number(&out.rows[0], "price_1_sum_returns"), 6.0);
    }

    #[test]
    fn series_without_qualifying_points_summarises_to_zero() {
        let rows = history(&[("1", "2015-01-01", "0", "")]);
        let s = summarizer();
        let series = s.extract_series(&rows).unwrap();
        let out = s.summarize(&[Record::new("1")], &series, &FeatureRegistry::new());
        for summary in ["max", "min", "range", "sum_returns"] {
            assert_eq!(number(&out.rows[0], &format!("price_2_{summary}")), 0.0);
        }
    }

    #[test]
    fn customers_without_history_are_left_alone() {
        let s = summarizer();
        let series = s.extract_series(&sample_history()).unwrap();
        let rows = vec![Record::new("1"), Record::new("9").with("weight", "1")];
        let out = s.summarize(&rows, &series, &FeatureRegistry::new());

        assert_eq!(out.rows[1], rows[1]);
        assert_eq!(out.report.skipped_count(), 1);
        assert_eq!(out.report.failures().count(), 0);
    }

    #[test]
    fn a_broken_customer_does_not_abort_the_batch() {
        let s = summarizer();
        let mut series = s.extract_series(&sample_history()).unwrap();
        series[1].series.remove("price_2");
        series.push(CustomerSeries {
            id: CustomerId::from("3"),
            series: BTreeMap::from([
                (
                    "price_1".to_string(),
                    BTreeMap::from([(0, "12".to_string()), (1, "1e400".to_string())]),
                ),
                ("price_2".to_string(), BTreeMap::new()),
            ]),
        });

        let rows = vec![Record::new("1"), Record::new("2"), Record::new("3")];
        let out = s.summarize(&rows, &series, &FeatureRegistry::new());

        assert!(out.rows[0].contains("price_1_max"));
        assert_eq!(out.rows[1], rows[1]);
        assert_eq!(out.rows[2], rows[2]);
        let failures: Vec<_> = out.report.failures().map(|(id, r)| (id.as_str(), r)).collect();
        assert_eq!(
            failures,
            vec![
                ("2", &SkipReason::MissingSeries("price_2".to_string())),
                ("3", &SkipReason::NonFinite("price_1_max".to_string())),
            ]
        );
    }

    #[test]
    fn summary_selection_limits_derived_features() {
        let cfg = PipelineConfig::default()
            .with_series_features(["price_1"])
            .with_summary_names(["max", "bogus"]);
        let s = TimeSeriesSummarizer::from_config(&cfg);
        let series = s.extract_series(&sample_history()).unwrap();
        let out = s.summarize(&[Record::new("2")], &series, &FeatureRegistry::new());

        assert_eq!(out.rows[0].feature_names().collect::<Vec<_>>(), vec!["price_1_max"]);
        assert_eq!(number(&out.rows[0], "price_1_max"), 30.0);
    }
}
