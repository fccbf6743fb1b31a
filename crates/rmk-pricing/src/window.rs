use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PricingError;

/// `[valid_from, valid_to]`, both ends inclusive; open-ended when `valid_to`
/// is `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    pub fn new(
        valid_from: DateTime<Utc>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Result<Self, PricingError> {
        if matches!(valid_to, Some(to) if to < valid_from) {
            return Err(PricingError::InvalidWindow);
        }
        Ok(Self {
            valid_from,
            valid_to,
        })
    }

    pub fn open_from(valid_from: DateTime<Utc>) -> Self {
        Self {
            valid_from,
            valid_to: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |to| to >= at)
    }

    /// Windows share at least one instant.
    pub fn overlaps(&self, other: &ValidityWindow) -> bool {
        let starts_before_other_ends = other.valid_to.map_or(true, |to| self.valid_from <= to);
        let other_starts_before_self_ends = self.valid_to.map_or(true, |to| other.valid_from <= to);
        starts_before_other_ends && other_starts_before_self_ends
    }
}
