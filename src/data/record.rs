use std::{borrow::Cow, collections::BTreeMap};

use serde::{Deserialize, Serialize};

use crate::{
    data::domain::CustomerId,
    error::{ChurnResult, DataError},
};

/// A single cell value.
///
/// Ingestion produces [`Datum::Text`]; the encoding stages replace text with
/// [`Datum::Number`] as they go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Text(String),
    Number(f64),
}

impl Datum {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns `true` for the empty string, the only representation of a missing value.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    /// Key used to look the value up in a categorical value map.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s.as_str()),
            Self::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    /// Converts the value to a float, substituting `empty` for a blank cell.
    pub fn to_f64(&self, feature: &str, empty: f64) -> ChurnResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) if s.is_empty() => Ok(empty),
            Self::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                DataError::NonNumeric {
                    feature: feature.to_string(),
                    value: s.clone(),
                }
                .into()
            }),
        }
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One customer row: a distinguished identity plus named feature values.
///
/// Transform stages never mutate a record they were handed; they build a new one
/// through [`Record::map_values`] or [`Record::with_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: CustomerId,
    fields: BTreeMap<String, Datum>,
}

impl Record {
    pub fn new(id: impl Into<CustomerId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builds a record from raw `field -> string` pairs, splitting out `id_field`.
    pub fn from_raw<K, V, I>(pairs: I, id_field: &str) -> ChurnResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut id = None;
        let mut fields = BTreeMap::new();
        for (k, v) in pairs {
            let k = k.into();
            if k == id_field {
                id = Some(CustomerId(v.into()));
            } else {
                fields.insert(k, Datum::Text(v.into()));
            }
        }
        let id = id.ok_or_else(|| DataError::MissingId(id_field.to_string()))?;
        Ok(Self { id, fields })
    }

    /// Builder-style setter, used mostly by tests and ingestion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &CustomerId {
        &self.id
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Feature names in lexicographic order.
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a new record whose values are produced by `f`; the id is carried over.
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&str, &Datum) -> Datum,
    {
        let fields = self
            .fields
            .iter()
            .map(|(name, datum)| (name.clone(), f(name, datum)))
            .collect();
        Self {
            id: self.id.clone(),
            fields,
        }
    }

    /// Fallible variant of [`Record::map_values`]; the first error aborts the mapping.
    pub fn try_map_values<F>(&self, mut f: F) -> ChurnResult<Self>
    where
        F: FnMut(&str, &Datum) -> ChurnResult<Datum>,
    {
        let fields = self
            .fields
            .iter()
            .map(|(name, datum)| Ok((name.clone(), f(name, datum)?)))
            .collect::<ChurnResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            id: self.id.clone(),
            fields,
        })
    }

    /// Returns a copy of this record extended with `extra` (existing names are overwritten).
    pub fn with_fields(&self, extra: impl IntoIterator<Item = (String, Datum)>) -> Self {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        Self {
            id: self.id.clone(),
            fields,
        }
    }
}
