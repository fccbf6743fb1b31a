//! Offer pricing: margin → settlement price → points, plus the price log
//! written whenever an offer's cached prices change.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    resolve_conversion_rate, resolve_margin, settlement_price, to_points_in, Currency, Margin,
    MarginQuery, MarginRule, PointConversionRule, PricingError, RateResolution, ValidityWindow,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub merchant_id: i64,
    #[serde(default)]
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub category_ids: BTreeSet<i64>,
    pub price_minor: i64,
    pub currency: Currency,
    /// Points are quoted only when a partner is given.
    #[serde(default)]
    pub partner_id: Option<i64>,
    pub as_of: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferQuote {
    pub price_minor: i64,
    pub currency: Currency,
    pub margin: Margin,
    pub margin_rule_id: Option<i64>,
    pub settlement_minor: i64,
    pub rate: Option<RateResolution>,
    pub points: Option<i64>,
}

pub fn quote_offer(
    margin_rules: &[MarginRule],
    conversion_rules: &[PointConversionRule],
    req: &QuoteRequest,
) -> Result<OfferQuote, PricingError> {
    let query = MarginQuery {
        merchant_id: req.merchant_id,
        brand_id: req.brand_id,
        category_ids: req.category_ids.clone(),
        as_of: req.as_of,
    };
    let margin = resolve_margin(margin_rules, &query);
    let settlement_minor = settlement_price(req.price_minor, margin.margin)?;

    let rate = req
        .partner_id
        .and_then(|p| resolve_conversion_rate(conversion_rules, p, req.currency, req.as_of));
    let points = rate
        .map(|r| to_points_in(settlement_minor, req.currency.minor_units(), r.rate))
        .transpose()?;

    Ok(OfferQuote {
        price_minor: req.price_minor,
        currency: req.currency,
        margin: margin.margin,
        margin_rule_id: margin.rule_id,
        settlement_minor,
        rate,
        points,
    })
}

/// One row of an offer's price history. The open row has `valid_to = None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLogEntry {
    pub offer_id: i64,
    pub currency: Currency,
    pub price_minor: i64,
    pub settlement_minor: i64,
    pub applied_margin: Margin,
    pub window: ValidityWindow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reprice {
    /// Cached prices already match the quote.
    Unchanged,
    Changed {
        /// Previously open entry, now closed at the reprice instant.
        closed: Option<PriceLogEntry>,
        opened: PriceLogEntry,
    },
}

/// Compare a fresh quote with the offer's open log entry.
pub fn reprice_offer(
    offer_id: i64,
    open: Option<&PriceLogEntry>,
    quote: &OfferQuote,
    now: DateTime<Utc>,
) -> Reprice {
    if let Some(prev) = open {
        if prev.price_minor == quote.price_minor
            && prev.settlement_minor == quote.settlement_minor
            && prev.applied_margin == quote.margin
            && prev.currency == quote.currency
        {
            return Reprice::Unchanged;
        }
    }

    let closed = open.map(|prev| {
        let mut c = prev.clone();
        c.window.valid_to = Some(now.max(prev.window.valid_from));
        c
    });
    Reprice::Changed {
        closed,
        opened: PriceLogEntry {
            offer_id,
            currency: quote.currency,
            price_minor: quote.price_minor,
            settlement_minor: quote.settlement_minor,
            applied_margin: quote.margin,
            window: ValidityWindow::open_from(now),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConversionRate;
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    fn request(partner: Option<i64>) -> QuoteRequest {
        QuoteRequest {
            merchant_id: 1,
            brand_id: None,
            category_ids: BTreeSet::new(),
            price_minor: 10_000,
            currency: Currency::Inr,
            partner_id: partner,
            as_of: t(10),
        }
    }

    fn rules() -> (Vec<MarginRule>, Vec<PointConversionRule>) {
        let margin = MarginRule::new(1, 1, None, None, "10", ValidityWindow::open_from(t(1)))
            .unwrap();
        let conv = PointConversionRule {
            id: 5,
            partner_id: 2,
            currency: Currency::Inr,
            rate: ConversionRate::parse("0.25").unwrap(),
            window: ValidityWindow::open_from(t(1)),
            is_active: true,
        };
        (vec![margin], vec![conv])
    }

    #[test]
    fn quote_applies_margin_then_points() {
        let (m, c) = rules();
        let q = quote_offer(&m, &c, &request(Some(2))).unwrap();
        assert_eq!(q.settlement_minor, 11_000);
        assert_eq!(q.margin_rule_id, Some(1));
        assert_eq!(q.rate.map(|r| r.rule_id), Some(5));
        assert_eq!(q.points, Some(440));
    }

    #[test]
    fn quote_without_partner_has_no_points() {
        let (m, c) = rules();
        let q = quote_offer(&m, &c, &request(None)).unwrap();
        assert_eq!(q.points, None);
        assert_eq!(q.rate, None);
    }

    #[test]
    fn reprice_closes_open_entry_only_on_change() {
        let (m, c) = rules();
        let q = quote_offer(&m, &c, &request(None)).unwrap();

        let Reprice::Changed { closed, opened } = reprice_offer(9, None, &q, t(10)) else {
            panic!("first price must open an entry");
        };
        assert!(closed.is_none());
        assert_eq!(opened.settlement_minor, 11_000);

        assert_eq!(reprice_offer(9, Some(&opened), &q, t(11)), Reprice::Unchanged);

        let mut cheaper = q.clone();
        cheaper.settlement_minor = 10_500;
        let Reprice::Changed { closed, .. } = reprice_offer(9, Some(&opened), &cheaper, t(12))
        else {
            panic!("changed settlement must reprice");
        };
        assert_eq!(closed.unwrap().window.valid_to, Some(t(12)));
    }
}
