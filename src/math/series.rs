use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// A scalar statistic extracted from one price series.
///
/// The string form (`max`, `min`, `range`, `sum_returns`) is used as the suffix of
/// the derived feature name, e.g. `price_p1_var_max`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum SeriesSummary {
    Max,
    Min,
    Range,
    SumReturns,
}

impl SeriesSummary {
    /// Evaluates the summary over the values of a timestamp-sorted series.
    ///
    /// Every summary of an empty series is `0.0`.
    pub fn evaluate(self, values: &[f64]) -> f64 {
        match self {
            Self::Max => max(values),
            Self::Min => min(values),
            Self::Range => range(values),
            Self::SumReturns => sum_returns(values),
        }
    }

    /// Name of the feature derived from `series` by this summary.
    pub fn feature_name(self, series: &str) -> String {
        format!("{series}_{self}")
    }
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

pub fn range(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        max(values) - min(values)
    }
}

/// Sum of consecutive differences: a crude measure of the net direction of the series.
pub fn sum_returns(values: &[f64]) -> f64 {
    values.windows(2).map(|w| w[1] - w[0]).sum()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn two_point_series() {
        let ys = [10.0, 20.0];
        assert_eq!(SeriesSummary::Max.evaluate(&ys), 20.0);
        assert_eq!(SeriesSummary::Min.evaluate(&ys), 10.0);
        assert_eq!(SeriesSummary::Range.evaluate(&ys), 10.0);
        assert_eq!(SeriesSummary::SumReturns.evaluate(&ys), 10.0);
    }

    #[test]
    fn empty_series_is_all_zero() {
        for summary in SeriesSummary::iter() {
            assert_eq!(summary.evaluate(&[]), 0.0, "{summary}");
        }
    }

    #[test]
    fn sum_returns_tracks_net_drift() {
        assert_eq!(sum_returns(&[30.0, 20.0, 10.0]), -20.0);
        assert_eq!(sum_returns(&[5.0]), 0.0);
    }

    #[test]
    fn names_round_trip_through_strings() {
        assert_eq!(SeriesSummary::SumReturns.to_string(), "sum_returns");
        assert_eq!(
            SeriesSummary::from_str("range").unwrap(),
            SeriesSummary::Range
        );
        assert_eq!(
            SeriesSummary::Max.feature_name("price_p1_var"),
            "price_p1_var_max"
        );
    }
}
