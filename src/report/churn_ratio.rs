use std::{collections::HashMap, sync::Arc};

use polars::{
    df,
    frame::DataFrame,
    prelude::{
        DataType, Field, IdxSize, IntoLazy, PlSmallStr, Schema, SchemaRef, SortMultipleOptions,
        col, len, lit,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    data::{domain::CustomerId, record::Record},
    error::{ChurnError, ChurnResult, DataError},
    pipeline::labels::is_truthy,
    report::{
        io::{Report, ReportName, ToSchema},
        polars_ext::polars_to_churn_error,
    },
};

/// Categories need at least this many customers to be reported.
pub const DEFAULT_MIN_ITEMS: usize = 10;

/// At most this many categories are reported.
pub const DEFAULT_MAX_CATEGORIES: usize = 30;

/// Churn ratio per value of one categorical feature.
///
/// Sorted by ratio descending, ties broken by category name.
#[derive(Debug, Clone)]
pub struct CategoryChurnReport {
    feature: String,
    df: DataFrame,
}

impl CategoryChurnReport {
    /// Computes `churned / total` for every value of `feature` among `rows`.
    ///
    /// Labels are looked up by id in `label_rows`; rows without a label are ignored.
    /// Categories with fewer than `min_items` rows and the empty category are dropped,
    /// then the `max_categories` highest ratios are kept.
    #[tracing::instrument(skip(rows, label_rows), fields(rows = rows.len()))]
    pub fn compute(
        feature: &str,
        rows: &[Record],
        label_rows: &[Record],
        label_field: &str,
        min_items: usize,
        max_categories: usize,
    ) -> ChurnResult<Self> {
        let churned_by_id: HashMap<&CustomerId, bool> = label_rows
            .iter()
            .filter_map(|r| r.get(label_field).map(|l| (r.id(), is_truthy(l))))
            .collect();

        let mut soa = CategorySoA::default();
        let mut unlabelled = 0usize;
        for row in rows {
            let Some(churned) = churned_by_id.get(row.id()) else {
                unlabelled += 1;
                continue;
            };
            soa.category.push(
                row.get(feature)
                    .map(|d| d.as_key().into_owned())
                    .unwrap_or_default(),
            );
            soa.churned.push(u32::from(*churned));
        }
        if unlabelled > 0 {
            tracing::debug!(unlabelled, "Rows without a label ignored");
        }

        let df = DataFrame::try_from(soa)?
            .lazy()
            .group_by([col(CategoryChurnCol::Category)])
            .agg([
                len().alias(CategoryChurnCol::Total),
                col(CategoryChurnCol::Churned).sum(),
            ])
            .filter(
                col(CategoryChurnCol::Total)
                    .gt_eq(lit(min_items as IdxSize))
                    .and(col(CategoryChurnCol::Category).neq(lit(""))),
            )
            .with_column(
                (col(CategoryChurnCol::Churned).cast(DataType::Float64)
                    / col(CategoryChurnCol::Total).cast(DataType::Float64))
                .alias(CategoryChurnCol::ChurnRatio),
            )
            .sort_by_exprs(
                [
                    col(CategoryChurnCol::ChurnRatio),
                    col(CategoryChurnCol::Category),
                ],
                SortMultipleOptions::default().with_order_descending_multi([true, false]),
            )
            .limit(max_categories as IdxSize)
            .select([
                col(CategoryChurnCol::Category),
                col(CategoryChurnCol::Total).cast(DataType::UInt32),
                col(CategoryChurnCol::Churned).cast(DataType::UInt32),
                col(CategoryChurnCol::ChurnRatio),
            ])
            .collect()
            .map_err(|e| polars_to_churn_error("category churn report", e))?;

        Ok(Self {
            feature: feature.to_string(),
            df,
        })
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// `(category, churn ratio)` pairs in report order.
    pub fn ratios(&self) -> ChurnResult<Vec<(String, f64)>> {
        let categories = self
            .df
            .column(CategoryChurnCol::Category.as_str())
            .and_then(|c| c.str().cloned())
            .map_err(|e| polars_to_churn_error("category churn report", e))?;
        let ratios = self
            .df
            .column(CategoryChurnCol::ChurnRatio.as_str())
            .and_then(|c| c.f64().cloned())
            .map_err(|e| polars_to_churn_error("category churn report", e))?;

        Ok(categories
            .iter()
            .zip(ratios.iter())
            .filter_map(|(c, r)| Some((c?.to_string(), r?)))
            .collect())
    }
}

impl ReportName for CategoryChurnReport {
    fn base_name(&self) -> String {
        format!("{}_churn_ratio", self.feature)
    }
}

impl Report for CategoryChurnReport {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for CategoryChurnReport {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = CategoryChurnCol::iter()
            .map(|col| {
                let dtype = match col {
                    CategoryChurnCol::Category => DataType::String,
                    CategoryChurnCol::Total | CategoryChurnCol::Churned => DataType::UInt32,
                    CategoryChurnCol::ChurnRatio => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

#[derive(Default)]
struct CategorySoA {
    category: Vec<String>,
    churned: Vec<u32>,
}

impl TryFrom<CategorySoA> for DataFrame {
    type Error = ChurnError;

    fn try_from(value: CategorySoA) -> Result<Self, Self::Error> {
        df!(
            CategoryChurnCol::Category.as_str() => value.category,
            CategoryChurnCol::Churned.as_str() => value.churned,
        )
        .map_err(|e| DataError::DataFrame(e.to_string()).into())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum CategoryChurnCol {
    Category,
    /// Customers with this category.
    Total,
    /// Churned customers with this category.
    Churned,
    /// `churned / total`.
    ChurnRatio,
}

impl From<CategoryChurnCol> for PlSmallStr {
    fn from(value: CategoryChurnCol) -> Self {
        value.as_str().into()
    }
}

impl CategoryChurnCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn population(groups: &[(&str, usize, usize)]) -> (Vec<Record>, Vec<Record>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (category, churned, stayed) in groups {
            for i in 0..churned + stayed {
                let id = format!("{category}-{i}");
                rows.push(Record::new(id.as_str()).with("channel", *category));
                let label = if i < *churned { "1" } else { "0" };
                labels.push(Record::new(id.as_str()).with("churned", label));
            }
        }
        (rows, labels)
    }

    #[test]
    fn ratios_are_sorted_descending_and_filtered() {
        let (rows, labels) = population(&[("web", 2, 8), ("phone", 5, 5), ("shop", 1, 1), ("", 9, 1)]);

        let report = CategoryChurnReport::compute("channel", &rows, &labels, "churned", 10, 30)
            .unwrap();

        assert_eq!(
            report.ratios().unwrap(),
            vec![("phone".to_string(), 0.5), ("web".to_string(), 0.2)]
        );
        assert_eq!(report.base_name(), "channel_churn_ratio");
    }

    #[test]
    fn keeps_at_most_max_categories() {
        let (rows, labels) = population(&[("a", 1, 1), ("b", 2, 0), ("c", 0, 2)]);
        let report = CategoryChurnReport::compute("channel", &rows, &labels, "churned", 1, 2)
            .unwrap();
        assert_eq!(
            report.ratios().unwrap(),
            vec![("b".to_string(), 1.0), ("a".to_string(), 0.5)]
        );
    }

    #[test]
    fn unlabelled_rows_are_ignored() {
        let (rows, mut labels) = population(&[("a", 1, 1)]);
        labels.pop();
        let report = CategoryChurnReport::compute("channel", &rows, &labels, "churned", 1, 30)
            .unwrap();
        assert_eq!(report.ratios().unwrap(), vec![("a".to_string(), 1.0)]);
    }
}
