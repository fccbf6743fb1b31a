use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversionRate, Currency, Margin, PricingError, ValidityWindow, RATE_SCALE};

const BPS_SCALE: i128 = 10_000;

/// A partner's points-to-currency rate for one currency over a window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointConversionRule {
    pub id: i64,
    pub partner_id: i64,
    pub currency: Currency,
    pub rate: ConversionRate,
    pub window: ValidityWindow,
    pub is_active: bool,
}

impl PointConversionRule {
    pub fn applies(&self, partner_id: i64, currency: Currency, at: DateTime<Utc>) -> bool {
        self.is_active
            && self.partner_id == partner_id
            && self.currency == currency
            && self.window.contains(at)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResolution {
    pub rate: ConversionRate,
    pub rule_id: i64,
}

fn pow10(exp: u32) -> Result<i128, PricingError> {
    10i128.checked_pow(exp).ok_or(PricingError::Overflow)
}

fn to_i64(v: i128) -> Result<i64, PricingError> {
    i64::try_from(v).map_err(|_| PricingError::Overflow)
}

/// Points needed to pay `amount_minor` in a 2-decimal currency.
///
/// `ceil((amount_minor / 100) / rate)`; a fractional point always rounds up.
pub fn to_points(amount_minor: i64, rate: ConversionRate) -> Result<i64, PricingError> {
    to_points_in(amount_minor, 2, rate)
}

/// [`to_points`] for a currency with `minor_units` decimals.
pub fn to_points_in(
    amount_minor: i64,
    minor_units: u32,
    rate: ConversionRate,
) -> Result<i64, PricingError> {
    if amount_minor < 0 {
        return Err(PricingError::NegativeAmount {
            amount: amount_minor,
        });
    }
    // amount / 10^exp / (micros / 1e6) = amount * 1e6 / (10^exp * micros)
    let num = i128::from(amount_minor) * i128::from(RATE_SCALE);
    let den = pow10(minor_units)? * i128::from(rate.micros());
    to_i64((num + den - 1) / den)
}

/// Currency value of `points`, rounded half-up to the minor unit.
pub fn points_to_minor(points: i64, rate: ConversionRate) -> Result<i64, PricingError> {
    if points < 0 {
        return Err(PricingError::NegativeAmount { amount: points });
    }
    let scale = i128::from(RATE_SCALE);
    let num = i128::from(points) * i128::from(rate.micros()) * pow10(2)?;
    to_i64((num + scale / 2) / scale)
}

/// `list × (1 + margin)`, half-up to the minor unit.
pub fn settlement_price(list_minor: i64, margin: Margin) -> Result<i64, PricingError> {
    if list_minor < 0 {
        return Err(PricingError::NegativeAmount { amount: list_minor });
    }
    let bps = i128::from(Margin::clamped(margin.bps()).bps());
    let num = i128::from(list_minor) * (BPS_SCALE + bps);
    to_i64((num + BPS_SCALE / 2) / BPS_SCALE)
}

/// Applicable rate for a partner and currency at `as_of`.
///
/// Several matching rules is a data problem, not an error: the latest
/// `valid_from` wins (then the highest id) and a warning lists the overlap.
pub fn resolve_conversion_rate(
    rules: &[PointConversionRule],
    partner_id: i64,
    currency: Currency,
    as_of: DateTime<Utc>,
) -> Option<RateResolution> {
    let mut matching: Vec<&PointConversionRule> = rules
        .iter()
        .filter(|r| r.applies(partner_id, currency, as_of))
        .collect();
    matching.sort_by(|a, b| {
        b.window
            .valid_from
            .cmp(&a.window.valid_from)
            .then_with(|| b.id.cmp(&a.id))
    });

    if matching.len() > 1 {
        let ids: Vec<i64> = matching.iter().map(|r| r.id).collect();
        tracing::warn!(
            partner_id,
            currency = currency.as_str(),
            %as_of,
            rule_ids = ?ids,
            "overlapping point conversion rules; using latest valid_from"
        );
    }

    matching.first().map(|r| RateResolution {
        rate: r.rate,
        rule_id: r.id,
    })
}

/// Close every other active rule for the new rule's partner and currency:
/// `is_active = false`, `valid_to = now` (never before its own start).
/// Returns the ids that were closed.
pub fn supersede_active(
    rules: &mut [PointConversionRule],
    new_rule: &PointConversionRule,
    now: DateTime<Utc>,
) -> Vec<i64> {
    let mut closed = Vec::new();
    for r in rules.iter_mut().filter(|r| {
        r.is_active
            && r.id != new_rule.id
            && r.partner_id == new_rule.partner_id
            && r.currency == new_rule.currency
    }) {
        r.is_active = false;
        r.window.valid_to = Some(now.max(r.window.valid_from));
        closed.push(r.id);
    }
    closed
}
