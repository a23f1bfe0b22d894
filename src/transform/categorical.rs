use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{
    domain::Code,
    record::{Datum, Record},
    registry::FeatureRegistry,
};

/// Bidirectional table between the values of one categorical feature and their codes.
///
/// Codes are assigned in first-seen order starting at 1, so `values[i]` holds the
/// value of code `i + 1`. The empty string is an ordinary value and gets its own code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueMap {
    values: Vec<String>,
    index: BTreeMap<String, Code>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the code of `value`, assigning the next free code on first encounter.
    pub fn code_or_insert(&mut self, value: &str) -> Code {
        if let Some(code) = self.index.get(value) {
            return *code;
        }
        self.values.push(value.to_string());
        let code = Code(self.values.len() as u32);
        self.index.insert(value.to_string(), code);
        code
    }

    /// Looks a value up without assigning; `None` when it was never seen.
    pub fn code(&self, value: &str) -> Option<Code> {
        self.index.get(value).copied()
    }

    pub fn decode(&self, code: Code) -> Option<&str> {
        let idx = (code.0 as usize).checked_sub(1)?;
        self.values.get(idx).map(String::as_str)
    }

    /// `(code, value)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (Code, &str)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (Code(i as u32 + 1), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One [`ValueMap`] per categorical feature.
pub type ValueMaps = BTreeMap<String, ValueMap>;

/// Encodes every categorical feature of `rows` as integer codes.
///
/// A fresh value map is built for each categorical feature of `registry`, scoped to this
/// call: two calls over different populations assign their codes independently. Use
/// [`encode_with`] to reuse the maps of an earlier call.
///
/// Non-categorical and unregistered features pass through unchanged.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub fn encode(rows: &[Record], registry: &FeatureRegistry) -> (Vec<Record>, ValueMaps) {
    let mut maps: ValueMaps = registry
        .categorical_names()
        .map(|name| (name.to_string(), ValueMap::new()))
        .collect();

    let encoded = rows
        .iter()
        .map(|row| {
            row.map_values(|name, datum| match maps.get_mut(name) {
                Some(map) => Datum::Number(map.code_or_insert(&datum.as_key()).as_f64()),
                None => datum.clone(),
            })
        })
        .collect();

    tracing::debug!(
        features = maps.len(),
        codes = maps.values().map(ValueMap::len).sum::<usize>(),
        "Categorical value maps built"
    );
    (encoded, maps)
}

/// Encodes `rows` against value maps built earlier.
///
/// Values absent from the matching map become [`Code::UNSEEN`]. Categorical features
/// without a map are treated as having an empty one.
pub fn encode_with(rows: &[Record], registry: &FeatureRegistry, maps: &ValueMaps) -> Vec<Record> {
    let mut unseen = 0usize;
    let encoded = rows
        .iter()
        .map(|row| {
            row.map_values(|name, datum| {
                if !registry.is_categorical(name) {
                    return datum.clone();
                }
                let code = maps
                    .get(name)
                    .and_then(|m| m.code(&datum.as_key()))
                    .unwrap_or_else(|| {
                        unseen += 1;
                        Code::UNSEEN
                    });
                Datum::Number(code.as_f64())
            })
        })
        .collect();

    if unseen > 0 {
        tracing::debug!(unseen, "Categorical values missing from the reference maps");
    }
    encoded
}
