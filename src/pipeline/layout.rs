use serde::{Deserialize, Serialize};

use crate::{
    data::{domain::Code, registry::FeatureRegistry},
    error::{ChurnResult, IoError, SystemError},
    transform::{categorical::ValueMaps, one_hot::OneHotLayout, vectorize::FeatureColumns},
};

/// Column contract shared between training and inference.
///
/// Holds everything needed to build an inference matrix whose columns mean the same
/// thing as the training matrix: the registry restricted to the training columns, the
/// sorted column list, the one-hot blocks, and the categorical value maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLayout {
    registry: FeatureRegistry,
    columns: FeatureColumns,
    one_hot: OneHotLayout,
    value_maps: ValueMaps,
}

impl FeatureLayout {
    pub(crate) fn new(
        registry: FeatureRegistry,
        columns: FeatureColumns,
        one_hot: OneHotLayout,
        mut value_maps: ValueMaps,
    ) -> Self {
        value_maps.retain(|name, _| columns.contains(name));
        Self {
            registry,
            columns,
            one_hot,
            value_maps,
        }
    }

    /// Registry restricted to the training columns.
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn columns(&self) -> &FeatureColumns {
        &self.columns
    }

    pub fn one_hot(&self) -> &OneHotLayout {
        &self.one_hot
    }

    pub fn value_maps(&self) -> &ValueMaps {
        &self.value_maps
    }

    /// Width of the expanded matrix.
    pub fn width(&self) -> usize {
        self.one_hot.width()
    }

    /// Original value behind a categorical code, if it was seen in training.
    pub fn decode(&self, feature: &str, code: Code) -> Option<&str> {
        self.value_maps.get(feature)?.decode(code)
    }

    /// Computes a deterministic hash of this layout.
    ///
    /// Equal fingerprints on the training and inference side guarantee equal column semantics.
    pub fn fingerprint(&self) -> ChurnResult<String> {
        let mut hasher = blake3::Hasher::new();
        let bytes = postcard::to_stdvec(self).map_err(SystemError::Encoding)?;
        hasher.update(&bytes);
        Ok(format!("{}", hasher.finalize()))
    }

    pub fn to_json(&self) -> ChurnResult<serde_json::Value> {
        Ok(serde_json::to_value(self).map_err(IoError::Json)?)
    }
}
