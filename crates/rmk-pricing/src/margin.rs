//! Margin rule resolution.
//!
//! A rule is scoped to a merchant and optionally narrowed by brand and/or
//! category. For a query the most specific applicable rule wins:
//!
//! | rank | brand  | category |
//! |------|--------|----------|
//! | 0    | match  | match    |
//! | 1    | match  | null     |
//! | 2    | null   | match    |
//! | 3    | null   | null     |
//!
//! Ties go to the latest `valid_from`, then the highest rule id.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Margin, PricingError, ValidityWindow};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginRule {
    pub id: i64,
    pub merchant_id: i64,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub margin: Margin,
    pub window: ValidityWindow,
    pub is_active: bool,
}

impl MarginRule {
    /// Build an active rule from a percentage literal.
    pub fn new(
        id: i64,
        merchant_id: i64,
        brand_id: Option<i64>,
        category_id: Option<i64>,
        percent: &str,
        window: ValidityWindow,
    ) -> Result<Self, PricingError> {
        Ok(Self {
            id,
            merchant_id,
            brand_id,
            category_id,
            margin: Margin::parse_percent(percent)?,
            window,
            is_active: true,
        })
    }

    pub fn same_scope(&self, other: &MarginRule) -> bool {
        self.merchant_id == other.merchant_id
            && self.brand_id == other.brand_id
            && self.category_id == other.category_id
    }
}

/// What is being priced. A product may sit in several categories; a
/// category-scoped rule applies if any of them matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginQuery {
    pub merchant_id: i64,
    pub brand_id: Option<i64>,
    pub category_ids: BTreeSet<i64>,
    pub as_of: DateTime<Utc>,
}

impl MarginQuery {
    pub fn new(
        merchant_id: i64,
        brand_id: Option<i64>,
        category_id: Option<i64>,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            merchant_id,
            brand_id,
            category_ids: category_id.into_iter().collect(),
            as_of,
        }
    }

    pub fn with_categories(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.category_ids.extend(ids);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginResolution {
    pub margin: Margin,
    /// `None` when no rule applied and the margin defaulted to 0 %.
    pub rule_id: Option<i64>,
}

impl MarginResolution {
    pub const NONE: MarginResolution = MarginResolution {
        margin: Margin::ZERO,
        rule_id: None,
    };
}

/// Specificity rank of `rule` for `query`, or `None` if the rule is not a
/// candidate (other merchant, inactive, outside its window, or a non-null
/// scope that does not match).
pub fn rank(rule: &MarginRule, query: &MarginQuery) -> Option<u8> {
    if rule.merchant_id != query.merchant_id
        || !rule.is_active
        || !rule.window.contains(query.as_of)
    {
        return None;
    }

    let brand_hit = match rule.brand_id {
        None => false,
        Some(b) if query.brand_id == Some(b) => true,
        Some(_) => return None,
    };
    let category_hit = match rule.category_id {
        None => false,
        Some(c) if query.category_ids.contains(&c) => true,
        Some(_) => return None,
    };

    Some(match (brand_hit, category_hit) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    })
}

/// Most specific applicable margin, or 0 % with `rule_id: None`.
pub fn resolve_margin(rules: &[MarginRule], query: &MarginQuery) -> MarginResolution {
    rules
        .iter()
        .filter_map(|r| rank(r, query).map(|k| (k, r)))
        .min_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then_with(|| b.window.valid_from.cmp(&a.window.valid_from))
                .then_with(|| b.id.cmp(&a.id))
        })
        .map_or(MarginResolution::NONE, |(_, r)| MarginResolution {
            margin: r.margin,
            rule_id: Some(r.id),
        })
}

/// Reject a new active rule whose exact scope already has an active rule.
/// Windows are not compared: disjoint windows on one scope still conflict.
pub fn check_scope_conflict(
    existing: &[MarginRule],
    candidate: &MarginRule,
) -> Result<(), PricingError> {
    if !candidate.is_active {
        return Ok(());
    }
    match existing
        .iter()
        .find(|r| r.is_active && r.id != candidate.id && r.same_scope(candidate))
    {
        Some(r) => Err(PricingError::ScopeConflict {
            existing_rule_id: r.id,
        }),
        None => Ok(()),
    }
}
