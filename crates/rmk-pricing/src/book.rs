use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    check_scope_conflict, quote_offer, resolve_conversion_rate, resolve_margin, supersede_active,
    Currency, MarginQuery, MarginResolution, MarginRule, OfferQuote, PointConversionRule,
    PricingError, QuoteRequest, RateResolution,
};

/// In-memory set of margin and conversion rules.
///
/// Mirrors what the Postgres store does on insert: margin rules are checked
/// for an active scope conflict, new rates supersede older active ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBook {
    pub margin_rules: Vec<MarginRule>,
    pub conversion_rules: Vec<PointConversionRule>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_margin_rule(&mut self, rule: MarginRule) -> Result<(), PricingError> {
        check_scope_conflict(&self.margin_rules, &rule)?;
        self.margin_rules.push(rule);
        Ok(())
    }

    /// Insert `rule` and close the partner's other active rules for the
    /// same currency. Returns the closed rule ids.
    pub fn post_conversion_rate(
        &mut self,
        rule: PointConversionRule,
        now: DateTime<Utc>,
    ) -> Vec<i64> {
        let closed = supersede_active(&mut self.conversion_rules, &rule, now);
        self.conversion_rules.push(rule);
        closed
    }

    pub fn next_margin_rule_id(&self) -> i64 {
        self.margin_rules.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    pub fn next_conversion_rule_id(&self) -> i64 {
        self.conversion_rules.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    pub fn resolve_margin(&self, query: &MarginQuery) -> MarginResolution {
        resolve_margin(&self.margin_rules, query)
    }

    pub fn resolve_rate(
        &self,
        partner_id: i64,
        currency: Currency,
        as_of: DateTime<Utc>,
    ) -> Option<RateResolution> {
        resolve_conversion_rate(&self.conversion_rules, partner_id, currency, as_of)
    }

    pub fn quote(&self, req: &QuoteRequest) -> Result<OfferQuote, PricingError> {
        quote_offer(&self.margin_rules, &self.conversion_rules, req)
    }
}
