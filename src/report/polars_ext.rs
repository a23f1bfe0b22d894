use polars::prelude::{
    DataFrame, JsonFormat, JsonWriter, LazyFrame, SchemaRef, SerWriter, col,
};
use serde_json::Value;

use crate::error::{ChurnError, ChurnResult, DataError, IoError};

pub(super) fn polars_to_churn_error(report: &str, e: polars::error::PolarsError) -> ChurnError {
    ChurnError::Data(DataError::DataFrame(format!(
        "Error while building {report}: {e}"
    )))
}

pub trait DataFrameExt {
    fn to_json_rows(&self) -> ChurnResult<Vec<serde_json::Map<String, Value>>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> ChurnResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        // Heuristic: approx 2^6 bytes per cell
        let mut buf = Vec::with_capacity(height * self.width() * (1 << 6));

        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        let json_val: Value = serde_json::from_slice(&buf).map_err(IoError::Json)?;

        match json_val {
            Value::Array(rows) => Ok(rows
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }
}

pub trait LazyFrameExt {
    /// Selects exactly the columns of `schema`, in schema order.
    fn in_schema_order(self, schema: SchemaRef) -> Self;
}

impl LazyFrameExt for LazyFrame {
    fn in_schema_order(self, schema: SchemaRef) -> Self {
        let exprs = schema
            .iter_names()
            .map(|name| col(name.clone()))
            .collect::<Vec<_>>();
        self.select(exprs)
    }
}
