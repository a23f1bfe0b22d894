use std::collections::HashMap;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        domain::CustomerId,
        record::{Datum, Record},
    },
    error::{ChurnResult, DataError},
};

/// Binary churn outcomes, one per row of the accompanying feature matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelVector(Array1<f64>);

impl LabelVector {
    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of positive (churned) labels.
    pub fn positives(&self) -> usize {
        self.0.iter().filter(|v| **v > 0.0).count()
    }
}

impl From<Vec<f64>> for LabelVector {
    fn from(values: Vec<f64>) -> Self {
        Self(Array1::from(values))
    }
}

impl FromIterator<f64> for LabelVector {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Interprets a raw label as a churn flag.
///
/// Blank, numeric zero and `false`/`no`/`f`/`n` (any case) are negative; every other
/// value is positive.
pub fn is_truthy(label: &Datum) -> bool {
    match label {
        Datum::Number(n) => *n != 0.0,
        Datum::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return false;
            }
            if let Ok(n) = s.parse::<f64>() {
                return n != 0.0;
            }
            !matches!(
                s.to_ascii_lowercase().as_str(),
                "false" | "no" | "f" | "n"
            )
        }
    }
}

/// `1.0` for a truthy label, `0.0` otherwise.
pub fn label_value(label: &Datum) -> f64 {
    if is_truthy(label) { 1.0 } else { 0.0 }
}

/// Indexes label rows by id. A repeated id keeps its last label.
pub(crate) fn index_labels<'a>(
    label_rows: &'a [Record],
    label_field: &str,
) -> ChurnResult<HashMap<&'a CustomerId, &'a Datum>> {
    let mut index = HashMap::with_capacity(label_rows.len());
    for row in label_rows {
        let label = row.get(label_field).ok_or_else(|| DataError::MissingLabel {
            id: row.id().to_string(),
            field: label_field.to_string(),
        })?;
        if index.insert(row.id(), label).is_some() {
            tracing::debug!(id = %row.id(), "Duplicate label row, keeping the last");
        }
    }
    Ok(index)
}
