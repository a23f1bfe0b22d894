use serde::{Deserialize, Serialize};

use crate::{impl_display_inner, impl_from_primitive};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// Identity of a customer, shared across the data, label and history datasets.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CustomerId(pub String);
impl_from_primitive!(CustomerId, String);
impl_display_inner!(CustomerId);

impl From<&str> for CustomerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl CustomerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Integer code assigned to a categorical value.
///
/// Codes start at 1 in first-seen order. [`Code::UNSEEN`] (0) is never assigned by the
/// encoder and marks a value that was not part of the population the map was built from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Code(pub u32);
impl_from_primitive!(Code, u32);
impl_display_inner!(Code);

impl Code {
    pub const UNSEEN: Code = Code(0);

    pub fn is_unseen(self) -> bool {
        self == Self::UNSEEN
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

/// Seconds since the Unix epoch, as produced by date normalization.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct EpochSeconds(pub f64);
impl_from_primitive!(EpochSeconds, f64);
impl_display_inner!(EpochSeconds);
