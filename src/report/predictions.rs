use std::sync::Arc;

use ndarray::Array1;
use polars::{
    df,
    frame::DataFrame,
    prelude::{DataType, Field, PlSmallStr, Schema, SchemaRef, SortMultipleOptions},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    data::domain::CustomerId,
    error::{ChurnError, ChurnResult, DataError},
    pipeline::InferenceSet,
    report::{
        classifier::Classifier,
        io::{Report, ReportName, ToSchema},
        polars_ext::polars_to_churn_error,
    },
};

/// Model output per customer: churn probability and predicted label.
///
/// Rows are ordered by predicted label; customers with the same label keep their
/// input order.
#[derive(Debug, Clone)]
pub struct PredictionReport {
    df: DataFrame,
}

impl PredictionReport {
    pub fn new(
        ids: &[CustomerId],
        probabilities: &Array1<f64>,
        labels: &Array1<f64>,
    ) -> ChurnResult<Self> {
        if ids.len() != probabilities.len() || ids.len() != labels.len() {
            return Err(DataError::Shape(format!(
                "{} ids, {} probabilities, {} labels",
                ids.len(),
                probabilities.len(),
                labels.len()
            ))
            .into());
        }

        let soa = PredictionSoA {
            id: ids.iter().map(|id| id.as_str().to_string()).collect(),
            probability: probabilities.to_vec(),
            label: labels.to_vec(),
        };
        let df = DataFrame::try_from(soa)?
            .sort(
                [PredictionCol::Label.as_str()],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .map_err(|e| polars_to_churn_error("prediction report", e))?;

        Ok(Self { df })
    }

    /// Runs `model` over an inference set and pairs its output with the row ids.
    pub fn predict(model: &impl Classifier, set: &InferenceSet) -> ChurnResult<Self> {
        let probabilities = model.predict_proba(&set.features)?;
        let labels = model.predict(&set.features)?;
        Self::new(&set.ids, &probabilities, &labels)
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.is_empty()
    }
}

impl Default for PredictionReport {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl ReportName for PredictionReport {
    fn base_name(&self) -> String {
        "output_scores".to_string()
    }
}

impl Report for PredictionReport {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for PredictionReport {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PredictionCol::iter()
            .map(|col| {
                let dtype = match col {
                    PredictionCol::Id => DataType::String,
                    PredictionCol::Probability | PredictionCol::Label => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

struct PredictionSoA {
    id: Vec<String>,
    probability: Vec<f64>,
    label: Vec<f64>,
}

impl TryFrom<PredictionSoA> for DataFrame {
    type Error = ChurnError;

    fn try_from(value: PredictionSoA) -> Result<Self, Self::Error> {
        df!(
            PredictionCol::Id.as_str() => value.id,
            PredictionCol::Probability.as_str() => value.probability,
            PredictionCol::Label.as_str() => value.label,
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
pub enum PredictionCol {
    /// Customer identifier.
    Id,
    /// Predicted probability of churn.
    Probability,
    /// Predicted label, `1.0` for churn.
    Label,
}

impl From<PredictionCol> for PlSmallStr {
    fn from(value: PredictionCol) -> Self {
        value.as_str().into()
    }
}

impl PredictionCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
