use ndarray::Array1;

use crate::{
    error::ChurnResult, pipeline::labels::LabelVector, transform::vectorize::FeatureMatrix,
};

/// A binary churn model fitted on a training matrix and applied to inference matrices.
///
/// Implementations live outside this crate; the pipeline only produces their inputs.
pub trait Classifier {
    fn fit(&mut self, features: &FeatureMatrix, labels: &LabelVector) -> ChurnResult<()>;

    /// Probability of churn for every row of `features`.
    fn predict_proba(&self, features: &FeatureMatrix) -> ChurnResult<Array1<f64>>;

    /// Predicted labels, `1.0` for churn. Defaults to thresholding the probability at 0.5.
    fn predict(&self, features: &FeatureMatrix) -> ChurnResult<Array1<f64>> {
        Ok(self
            .predict_proba(features)?
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}
