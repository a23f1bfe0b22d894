use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::{
    config::PipelineConfig,
    data::{
        domain::EpochSeconds,
        record::{Datum, Record},
        registry::FeatureRegistry,
    },
    error::{ChurnResult, DataError, SchemaError},
};

/// Parses `value` with `format` as a local time in `tz` and returns epoch seconds.
///
/// Formats without a time component resolve to local midnight. When a local time is
/// ambiguous (clocks going back) the earlier instant wins.
pub fn parse_date(feature: &str, value: &str, format: &str, tz: Tz) -> ChurnResult<EpochSeconds> {
    let naive = NaiveDateTime::parse_from_str(value, format)
        .or_else(|_| {
            NaiveDate::parse_from_str(value, format).map(|d| d.and_time(NaiveTime::MIN))
        })
        .map_err(|e| DataError::UnparseableDate {
            feature: feature.to_string(),
            value: value.to_string(),
            format: format.to_string(),
            msg: e.to_string(),
        })?;

    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| DataError::NonexistentLocalTime {
            value: value.to_string(),
            timezone: tz.name().to_string(),
        })?;

    Ok(EpochSeconds(local.timestamp() as f64))
}

/// Renders an epoch timestamp as the ISO calendar date it falls on in `tz`.
///
/// ```
/// # use churnprep::transform::date::format_timestamp;
/// let day = format_timestamp(1_475_276_400.0, chrono_tz::Europe::London).unwrap();
/// assert_eq!(day, "2016-10-01");
/// ```
pub fn format_timestamp(timestamp: f64, tz: Tz) -> ChurnResult<String> {
    let secs = timestamp.floor();
    DateTime::from_timestamp(secs as i64, 0)
        .filter(|_| secs.is_finite())
        .map(|utc| utc.with_timezone(&tz).date_naive().format("%Y-%m-%d").to_string())
        .ok_or_else(|| DataError::TimestampOutOfRange(timestamp).into())
}

/// Replaces every date feature of a row population with epoch seconds.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    format: String,
    timezone: Tz,
    empty: f64,
}

impl DateNormalizer {
    pub fn new(format: impl Into<String>, timezone: Tz, empty: f64) -> Self {
        Self {
            format: format.into(),
            timezone,
            empty,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.date_format(), config.timezone(), config.empty_date())
    }

    /// Returns new rows with date features converted.
    ///
    /// # Errors
    /// * [`SchemaError::UnknownFeature`] for a row feature missing from `registry`.
    /// * [`DataError::UnparseableDate`] for a non-empty date that does not match the format.
    ///
    /// Either aborts the whole call; no partial output is returned.
    #[tracing::instrument(skip_all, fields(rows = rows.len(), format = %self.format))]
    pub fn normalize(&self, rows: &[Record], registry: &FeatureRegistry) -> ChurnResult<Vec<Record>> {
        let out = rows
            .iter()
            .map(|row| row.try_map_values(|name, datum| self.transform(registry, name, datum)))
            .collect::<ChurnResult<Vec<_>>>()?;
        tracing::debug!("Dates normalized");
        Ok(out)
    }

    fn transform(&self, registry: &FeatureRegistry, name: &str, datum: &Datum) -> ChurnResult<Datum> {
        let descriptor = registry
            .get(name)
            .ok_or_else(|| SchemaError::UnknownFeature(name.to_string()))?;

        match datum {
            _ if !descriptor.is_date => Ok(datum.clone()),
            // Already normalized by an earlier pass.
            Datum::Number(_) => Ok(datum.clone()),
            Datum::Text(s) if s.is_empty() => Ok(Datum::Number(self.empty)),
            Datum::Text(s) => {
                parse_date(name, s, &self.format, self.timezone).map(|ts| Datum::Number(ts.0))
            }
        }
    }
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::registry::FeatureDescriptor;

    const LONDON: Tz = chrono_tz::Europe::London;

    fn registry() -> FeatureRegistry {
        FeatureRegistry::new()
            .with_feature("date", FeatureDescriptor::date())
            .with_feature("type", FeatureDescriptor::continuous())
    }

    #[test]
    fn parses_local_midnight_in_reference_timezone() {
        let summer = parse_date("date", "2016-10-02", "%Y-%m-%d", LONDON).unwrap();
        let winter = parse_date("date", "2015-01-02", "%Y-%m-%d", LONDON).unwrap();
        assert_eq!(summer.0, 1_475_362_800.0);
        assert_eq!(winter.0, 1_420_156_800.0);
    }

    #[test]
    fn formats_round_trip_to_the_calendar_date() {
        for day in ["2016-10-02", "2015-01-01", "2016-03-27", "2000-02-29"] {
            let ts = parse_date("date", day, "%Y-%m-%d", LONDON).unwrap();
            assert_eq!(format_timestamp(ts.0, LONDON).unwrap(), day);
        }
    }

    #[test]
    fn formats_with_a_time_component() {
        let ts = parse_date("date", "2016-10-02 06:30:00", "%Y-%m-%d %H:%M:%S", chrono_tz::UTC)
            .unwrap();
        assert_eq!(ts.0, 1_475_389_800.0);
    }

    #[test]
    fn normalize_converts_dates_and_keeps_other_features() {
        let rows = vec![
            Record::new("1").with("type", "big").with("date", "2016-10-02"),
            Record::new("2").with("type", "big").with("date", "2016-10-01"),
        ];
        let out = DateNormalizer::default().normalize(&rows, &registry()).unwrap();

        assert_eq!(out[0].get("date"), Some(&Datum::Number(1_475_362_800.0)));
        assert_eq!(out[1].get("date"), Some(&Datum::Number(1_475_276_400.0)));
        assert_eq!(out[0].get("type"), Some(&Datum::text("big")));
    }

    #[test]
    fn empty_date_uses_sentinel() {
        let rows = vec![Record::new("1").with("date", "")];
        let default = DateNormalizer::default().normalize(&rows, &registry()).unwrap();
        assert_eq!(default[0].get("date"), Some(&Datum::Number(0.0)));

        let custom = DateNormalizer::new("%Y-%m-%d", LONDON, -1.0)
            .normalize(&rows, &registry())
            .unwrap();
        assert_eq!(custom[0].get("date"), Some(&Datum::Number(-1.0)));
    }

    #[test]
    fn malformed_date_is_fatal() {
        let rows = vec![Record::new("1").with("date", "02/10/2016")];
        let err = DateNormalizer::default()
            .normalize(&rows, &registry())
            .unwrap_err();
        assert!(err.to_string().contains("02/10/2016"));
    }

    #[test]
    fn unknown_feature_is_fatal() {
        let rows = vec![Record::new("1").with("colour", "red")];
        let err = DateNormalizer::default()
            .normalize(&rows, &registry())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown feature"));
    }

    #[test]
    fn normalization_is_deterministic_and_idempotent() {
        let rows = vec![Record::new("1").with("date", "2016-10-02")];
        let norm = DateNormalizer::default();
        let once = norm.normalize(&rows, &registry()).unwrap();
        let again = norm.normalize(&rows, &registry()).unwrap();
        let twice = norm.normalize(&once, &registry()).unwrap();
        assert_eq!(once, again);
        assert_eq!(once, twice);
    }
}
