//! `rmk margin`, `rmk rate`, `rmk points`, `rmk settle`, `rmk quote`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rmk_db::{NewConversionRate, NewMarginRule};
use rmk_pricing::{
    quote_offer, settlement_price, to_points_in, ConversionRate, Currency, Margin, MarginQuery,
    OfferQuote, QuoteRequest, ValidityWindow,
};
use sqlx::PgPool;

pub async fn margin_resolve(
    pool: &PgPool,
    merchant_id: i64,
    brand_id: Option<i64>,
    category_id: Option<i64>,
    as_of: DateTime<Utc>,
) -> Result<()> {
    let query = MarginQuery::new(merchant_id, brand_id, category_id, as_of);
    let r = rmk_db::resolve_margin_at(pool, &query).await?;
    if r.rule_id.is_none() {
        tracing::warn!(merchant_id, ?brand_id, ?category_id, "no margin rule applies; using 0%");
    }
    println!("margin_percentage={}", r.margin);
    println!("margin_bps={}", r.margin.bps());
    println!("rule_id={}", opt(r.rule_id));
    Ok(())
}

pub fn new_margin_rule(
    merchant_id: i64,
    brand_id: Option<i64>,
    category_id: Option<i64>,
    margin: &str,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
) -> Result<NewMarginRule> {
    Ok(NewMarginRule {
        merchant_id,
        brand_id,
        category_id,
        margin: Margin::parse_percent(margin)?,
        window: ValidityWindow::new(valid_from, valid_to)?,
    })
}

pub async fn rate_resolve(
    pool: &PgPool,
    partner_id: i64,
    currency: Currency,
    as_of: DateTime<Utc>,
) -> Result<()> {
    let r = rmk_db::resolve_conversion_rate_at(pool, partner_id, currency, as_of)
        .await?
        .with_context(|| {
            format!("no point conversion rate for partner {partner_id} in {currency}")
        })?;
    println!("partner_id={}", partner_id);
    println!("currency={}", currency);
    println!("rate={}", r.rate);
    println!("rule_id={}", r.rule_id);
    Ok(())
}

pub async fn rate_post(
    pool: &PgPool,
    partner_id: i64,
    currency: Currency,
    rate: &str,
    valid_from: Option<DateTime<Utc>>,
) -> Result<()> {
    let now = Utc::now();
    let new = NewConversionRate {
        partner_id,
        currency,
        rate: ConversionRate::parse(rate)?,
        valid_from: valid_from.unwrap_or(now),
    };
    let posted = rmk_db::post_conversion_rate(pool, &new, now).await?;
    println!("rule_id={}", posted.rule_id);
    println!("superseded={:?}", posted.superseded);
    Ok(())
}

pub fn points(amount_minor: i64, rate: &str, currency: Currency) -> Result<()> {
    let rate = ConversionRate::parse(rate)?;
    let points = to_points_in(amount_minor, currency.minor_units(), rate)?;
    println!("amount_minor={}", amount_minor);
    println!("currency={}", currency);
    println!("rate={}", rate);
    println!("points={}", points);
    Ok(())
}

pub fn settle(price_minor: i64, margin: &str) -> Result<()> {
    let margin = Margin::parse_percent(margin)?;
    let settlement = settlement_price(price_minor, margin)?;
    println!("price_minor={}", price_minor);
    println!("margin_percentage={}", margin);
    println!("settlement_minor={}", settlement);
    Ok(())
}

pub async fn quote(pool: &PgPool, req: &QuoteRequest) -> Result<()> {
    let margin_rules = rmk_db::load_margin_rules(pool, req.merchant_id).await?;
    let conversion_rules = match req.partner_id {
        Some(p) => rmk_db::load_conversion_rules(pool, p, req.currency).await?,
        None => Vec::new(),
    };
    let q = quote_offer(&margin_rules, &conversion_rules, req)?;
    if q.margin_rule_id.is_none() {
        tracing::warn!(
            merchant_id = req.merchant_id,
            "no margin rule applies; quoting at list price"
        );
    }
    print_quote(&q);
    Ok(())
}

pub fn print_quote(q: &OfferQuote) {
    println!("price_minor={}", q.price_minor);
    println!("currency={}", q.currency);
    println!("margin_percentage={}", q.margin);
    println!("margin_rule_id={}", opt(q.margin_rule_id));
    println!("settlement_minor={}", q.settlement_minor);
    if let Some(r) = q.rate {
        println!("rate={}", r.rate);
        println!("rate_rule_id={}", r.rule_id);
    }
    println!("points={}", opt(q.points));
}

fn opt(v: Option<i64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "NONE".to_string())
}
