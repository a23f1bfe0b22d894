use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    data::record::Record,
    error::{ChurnResult, SchemaError},
};

/// Presentation hints carried alongside a feature. The pipeline never reads them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotHints {
    /// Plot the feature on a logarithmic x axis.
    pub log_x: bool,

    /// Kernel density bandwidth; consumers fall back to their own default when `None`.
    pub bandwidth: Option<f64>,

    pub display_name: Option<String>,
}

/// Metadata describing how a single feature is encoded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub is_categorical: bool,
    pub is_date: bool,

    /// Computed by the pipeline rather than read from the input; may be absent from some rows.
    #[serde(default)]
    pub is_derived: bool,

    pub hints: PlotHints,
}

impl FeatureDescriptor {
    pub fn categorical() -> Self {
        Self {
            is_categorical: true,
            ..Self::default()
        }
    }

    pub fn date() -> Self {
        Self {
            is_date: true,
            ..Self::default()
        }
    }

    pub fn continuous() -> Self {
        Self::default()
    }

    /// Descriptor for a feature derived from a time series.
    pub fn derived(bandwidth: f64) -> Self {
        Self {
            hints: PlotHints {
                log_x: false,
                bandwidth: Some(bandwidth),
                display_name: None,
            },
            is_derived: true,
            ..Self::default()
        }
    }

    pub fn with_hints(self, hints: PlotHints) -> Self {
        Self { hints, ..self }
    }
}

/// Mapping from feature name to [`FeatureDescriptor`].
///
/// The registry is a value: every operation that changes it returns a new registry,
/// so a stage can never observe a registry another stage is still building.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRegistry {
    features: BTreeMap<String, FeatureDescriptor>,
}

impl FromIterator<(String, FeatureDescriptor)> for FeatureRegistry {
    fn from_iter<T: IntoIterator<Item = (String, FeatureDescriptor)>>(iter: T) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, descriptor: FeatureDescriptor) -> Self {
        self.features.insert(name.into(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureDescriptor> {
        self.features.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.is_categorical)
    }

    pub fn is_date(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.is_date)
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.is_derived)
    }

    /// Feature names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn categorical_names(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|(_, d)| d.is_categorical)
            .map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureDescriptor)> {
        self.features.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns a registry containing every current entry plus `additions`.
    ///
    /// An addition with an existing name replaces the old descriptor; entries are never removed.
    pub fn extended(&self, additions: impl IntoIterator<Item = (String, FeatureDescriptor)>) -> Self {
        let mut features = self.features.clone();
        features.extend(additions);
        Self { features }
    }

    /// Returns a registry holding only `names`, each of which must be registered.
    pub fn restricted_to<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> ChurnResult<Self> {
        names
            .into_iter()
            .map(|name| {
                self.features
                    .get(name)
                    .map(|d| (name.to_string(), d.clone()))
                    .ok_or_else(|| SchemaError::UnknownFeature(name.to_string()).into())
            })
            .collect::<ChurnResult<BTreeMap<_, _>>>()
            .map(|features| Self { features })
    }

    /// Checks that every feature carried by `rows` has a descriptor.
    pub fn validate(&self, rows: &[Record]) -> ChurnResult<()> {
        rows.iter()
            .flat_map(Record::feature_names)
            .find(|name| !self.contains(name))
            .map_or(Ok(()), |name| {
                Err(SchemaError::UnknownFeature(name.to_string()).into())
            })
    }
}
