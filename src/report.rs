pub mod churn_ratio;
pub mod classifier;
pub mod io;
pub mod polars_ext;
pub mod predictions;
