use std::collections::BTreeSet;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{
    config::{ColumnSelection, PipelineConfig},
    data::{domain::Code, record::Record, registry::FeatureRegistry},
    error::{ChurnResult, DataError, SchemaError},
};

// ================================================================================================
// Column Selection
// ================================================================================================

/// Canonical, lexicographically sorted list of the features materialized as columns.
///
/// Training and inference must build their matrices from the same `FeatureColumns`,
/// otherwise encoded column semantics silently shift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FeatureColumns {
    names: Vec<String>,
}

impl FeatureColumns {
    /// Builds a column list from explicit names; they are sorted and deduplicated.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Registered features present on the first row, plus every derived feature present
    /// on any row.
    ///
    /// Derived features only reach the customers that have a history, so their presence
    /// on the first row says nothing about the population. For the other features the
    /// first row is trusted to be representative; see [`FeatureColumns::ensure_covers`]
    /// for the check that backs this up.
    pub fn from_first_row(rows: &[Record], registry: &FeatureRegistry) -> ChurnResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| DataError::EmptyPopulation("cannot select columns".to_string()))?;
        let derived = rows
            .iter()
            .flat_map(Record::feature_names)
            .filter(|name| registry.is_derived(name));
        Ok(Self::new(
            first
                .feature_names()
                .filter(|name| registry.contains(name))
                .chain(derived),
        ))
    }

    /// Registered features present on any row.
    pub fn from_union(rows: &[Record], registry: &FeatureRegistry) -> ChurnResult<Self> {
        if rows.is_empty() {
            return Err(DataError::EmptyPopulation("cannot select columns".to_string()).into());
        }
        Ok(Self::new(
            rows.iter()
                .flat_map(Record::feature_names)
                .filter(|name| registry.contains(name)),
        ))
    }

    /// Selects columns according to `selection`, enforcing its precondition.
    pub fn select(
        rows: &[Record],
        registry: &FeatureRegistry,
        selection: ColumnSelection,
    ) -> ChurnResult<Self> {
        match selection {
            ColumnSelection::FirstRow => {
                let columns = Self::from_first_row(rows, registry)?;
                columns.ensure_covers(rows, registry)?;
                Ok(columns)
            }
            ColumnSelection::Union => Self::from_union(rows, registry),
        }
    }

    /// Fails when a row carries a registered feature that is not a column.
    ///
    /// Such a feature would be dropped without notice. Rows that merely lack a
    /// column are fine: the cell is filled with the empty-datum sentinel.
    pub fn ensure_covers(&self, rows: &[Record], registry: &FeatureRegistry) -> ChurnResult<()> {
        for (row, record) in rows.iter().enumerate() {
            if let Some(feature) = record
                .feature_names()
                .find(|name| registry.contains(name) && !self.contains(name))
            {
                return Err(SchemaError::HeterogeneousRows {
                    row,
                    feature: feature.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .binary_search_by(|probe| probe.as_str().cmp(name))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ================================================================================================
// Feature Matrix
// ================================================================================================

/// Dense row-major matrix of feature values with one name per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> ChurnResult<Self> {
        if columns.len() != data.ncols() {
            return Err(DataError::Shape(format!(
                "{} column names for {} columns",
                columns.len(),
                data.ncols()
            ))
            .into());
        }
        Ok(Self { columns, data })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.data.column(j))
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.row(i)
    }
}

// ================================================================================================
// Vectorizer
// ================================================================================================

/// Turns encoded rows into a [`FeatureMatrix`].
#[derive(Debug, Clone, Copy)]
pub struct Vectorizer {
    selection: ColumnSelection,
    empty_datum: f64,
}

impl Vectorizer {
    pub fn new(selection: ColumnSelection, empty_datum: f64) -> Self {
        Self {
            selection,
            empty_datum,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.column_selection(), config.empty_datum())
    }

    /// Selects the columns from `rows` and `registry`, then vectorizes.
    pub fn vectorize(
        &self,
        rows: &[Record],
        registry: &FeatureRegistry,
    ) -> ChurnResult<(FeatureColumns, FeatureMatrix)> {
        let columns = FeatureColumns::select(rows, registry, self.selection)?;
        let matrix = self.vectorize_with(rows, &columns, registry)?;
        Ok((columns, matrix))
    }

    /// Vectorizes against an explicit column list.
    ///
    /// Absent and blank cells become the empty-datum sentinel, except in categorical
    /// columns where they become [`Code::UNSEEN`]. A non-blank value that is not a
    /// number is an error.
    #[tracing::instrument(skip_all, fields(rows = rows.len(), cols = columns.len()))]
    pub fn vectorize_with(
        &self,
        rows: &[Record],
        columns: &FeatureColumns,
        registry: &FeatureRegistry,
    ) -> ChurnResult<FeatureMatrix> {
        let empty: Vec<f64> = columns
            .names()
            .iter()
            .map(|name| {
                if registry.is_categorical(name) {
                    Code::UNSEEN.as_f64()
                } else {
                    self.empty_datum
                }
            })
            .collect();

        let mut filled = 0usize;
        let mut data = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            for (name, &empty) in columns.names().iter().zip(&empty) {
                let value = match row.get(name) {
                    Some(datum) => datum.to_f64(name, empty)?,
                    None => {
                        filled += 1;
                        empty
                    }
                };
                data.push(value);
            }
        }
        if filled > 0 {
            tracing::debug!(filled, "Absent cells filled with the empty-datum sentinel");
        }

        let data = Array2::from_shape_vec((rows.len(), columns.len()), data)
            .map_err(|e| DataError::Shape(e.to_string()))?;
        FeatureMatrix::new(columns.names().to_vec(), data)
    }
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::registry::FeatureDescriptor;

    fn registry() -> FeatureRegistry {
        FeatureRegistry::new()
            .with_feature("type", FeatureDescriptor::categorical())
            .with_feature("weight", FeatureDescriptor::continuous())
    }

    fn rows() -> Vec<Record> {
        [(1.0, 100.0), (2.0, 120.0), (3.0, 150.0), (3.0, 190.0)]
            .into_iter()
            .enumerate()
            .map(|(i, (t, w))| Record::new(i.to_string()).with("weight", w).with("type", t))
            .collect()
    }

    #[test]
    fn vectorizes_in_sorted_column_order() {
        let (columns, matrix) = Vectorizer::default()
            .vectorize(&rows(), &registry())
            .unwrap();

        assert_eq!(columns.names(), &["type", "weight"]);
        assert_eq!(
            matrix.data(),
            &array![[1.0, 100.0], [2.0, 120.0], [3.0, 150.0], [3.0, 190.0]]
        );
    }

    #[test]
    fn unregistered_features_are_not_columns() {
        let rows = vec![Record::new("1").with("weight", "5").with("note", "x")];
        let (columns, _) = Vectorizer::default().vectorize(&rows, &registry()).unwrap();
        assert_eq!(columns.names(), &["weight"]);
    }

    #[test]
    fn blank_and_absent_cells_use_the_sentinel() {
        let rows = vec![
            Record::new("1").with("type", "1").with("weight", ""),
            Record::new("2").with("type", "2"),
        ];
        let matrix = Vectorizer::new(ColumnSelection::FirstRow, -1.0)
            .vectorize(&rows, &registry())
            .unwrap()
            .1;
        assert_eq!(matrix.data(), &array![[1.0, -1.0], [2.0, -1.0]]);
    }

    #[test]
    fn first_row_selection_rejects_unrepresentative_first_row() {
        let rows = vec![
            Record::new("1").with("weight", "1"),
            Record::new("2").with("weight", "2").with("type", "1"),
        ];
        let err = Vectorizer::default().vectorize(&rows, &registry()).unwrap_err();
        assert!(err.to_string().contains("'type'"));

        let (columns, matrix) = Vectorizer::new(ColumnSelection::Union, 0.0)
            .vectorize(&rows, &registry())
            .unwrap();
        assert_eq!(columns.names(), &["type", "weight"]);
        assert_eq!(matrix.data(), &array![[0.0, 1.0], [1.0, 2.0]]);
    }

    #[test]
    fn absent_categorical_cells_are_unseen_whatever_the_sentinel() {
        let rows = vec![
            Record::new("1").with("type", "2").with("weight", "5"),
            Record::new("2").with("weight", "6"),
            Record::new("3").with("type", "").with("weight", ""),
        ];
        let matrix = Vectorizer::new(ColumnSelection::FirstRow, -1.0)
            .vectorize(&rows, &registry())
            .unwrap()
            .1;
        assert_eq!(
            matrix.data(),
            &array![[2.0, 5.0], [0.0, 6.0], [0.0, -1.0]]
        );
    }

    #[test]
    fn first_row_selection_keeps_sparse_derived_features() {
        let registry = registry().with_feature("p_max", FeatureDescriptor::derived(0.2));
        let rows = vec![
            Record::new("a").with("type", "1").with("weight", "1"),
            Record::new("b").with("type", "2").with("weight", "2").with("p_max", "7"),
        ];

        let (columns, matrix) = Vectorizer::default().vectorize(&rows, &registry).unwrap();

        assert_eq!(columns.names(), &["p_max", "type", "weight"]);
        assert_eq!(matrix.data(), &array![[0.0, 1.0, 1.0], [7.0, 2.0, 2.0]]);
    }

    #[test]
    fn non_numeric_cell_is_an_error() {
        let rows = vec![Record::new("1").with("weight", "heavy")];
        assert!(Vectorizer::default().vectorize(&rows, &registry()).is_err());
    }

    #[test]
    fn empty_population_is_an_error() {
        assert!(Vectorizer::default().vectorize(&[], &registry()).is_err());
    }

    #[test]
    fn explicit_columns_are_sorted_and_deduplicated() {
        let columns = FeatureColumns::new(["weight", "type", "weight"]);
        assert_eq!(columns.names(), &["type", "weight"]);
        assert!(columns.contains("type"));
        assert!(!columns.contains("date"));
    }
}
