//! Margin rules, point conversion rates and the offer price log.
//!
//! NUMERIC columns are scaled to integers in SQL (`* 100` for margin basis
//! points, `* 1000000` for rate micro-units) so no float ever crosses the
//! driver boundary.

use std::collections::BTreeSet;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};

use rmk_pricing::{
    check_scope_conflict, quote_offer, resolve_conversion_rate, resolve_margin, ConversionRate,
    Currency, Margin, MarginQuery, MarginResolution, MarginRule, OfferQuote, PointConversionRule,
    PriceLogEntry, QuoteRequest, RateResolution, Reprice, ValidityWindow,
};
use rmk_reconcile::OfferPricing;

/// NUMERIC(10,4) keeps four decimals; a rate with finer micro-units would be
/// silently rounded by Postgres.
const RATE_STORAGE_STEP: i64 = 100;

#[derive(Debug, Clone)]
pub struct NewMarginRule {
    pub merchant_id: i64,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub margin: Margin,
    pub window: ValidityWindow,
}

#[derive(Debug, Clone)]
pub struct NewConversionRate {
    pub partner_id: i64,
    pub currency: Currency,
    pub rate: ConversionRate,
    pub valid_from: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedRate {
    pub rule_id: i64,
    /// Previously active rules closed by this post.
    pub superseded: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepriceResult {
    pub offer_id: i64,
    pub quote: OfferQuote,
    /// False when the open price-log entry already matched the quote.
    pub changed: bool,
}

fn margin_from_row(r: &sqlx::postgres::PgRow) -> Result<MarginRule> {
    let bps: i64 = r.try_get("margin_bps")?;
    Ok(MarginRule {
        id: r.try_get("id")?,
        merchant_id: r.try_get("merchant_id")?,
        brand_id: r.try_get("brand_id")?,
        category_id: r.try_get("category_id")?,
        margin: Margin::from_bps(bps)?,
        window: ValidityWindow {
            valid_from: r.try_get("valid_from")?,
            valid_to: r.try_get("valid_to")?,
        },
        is_active: r.try_get("is_active")?,
    })
}

async fn fetch_margin_rules(conn: &mut PgConnection, merchant_id: i64) -> Result<Vec<MarginRule>> {
    let rows = sqlx::query(
        r#"
        select id, merchant_id, brand_id, category_id,
               round(margin_percentage * 100)::bigint as margin_bps,
               valid_from, valid_to, is_active
        from margin_rules
        where merchant_id = $1
        order by id
        "#,
    )
    .bind(merchant_id)
    .fetch_all(&mut *conn)
    .await
    .context("load margin_rules failed")?;

    rows.iter().map(margin_from_row).collect()
}

/// Every margin rule of a merchant, active or not. Resolution filters.
pub async fn load_margin_rules(pool: &PgPool, merchant_id: i64) -> Result<Vec<MarginRule>> {
    let mut conn = pool.acquire().await.context("acquire failed")?;
    fetch_margin_rules(&mut conn, merchant_id).await
}

/// Insert an active margin rule. Fails with `PricingError::ScopeConflict`
/// (reachable through `downcast_ref`) if the exact scope already has one.
pub async fn insert_margin_rule(pool: &PgPool, rule: &NewMarginRule) -> Result<i64> {
    let mut tx = pool.begin().await.context("begin failed")?;

    // Serializes rule writes per merchant so two inserts cannot both pass
    // the scope check.
    sqlx::query("select pg_advisory_xact_lock($1)")
        .bind(rule.merchant_id)
        .execute(&mut *tx)
        .await
        .context("margin rule lock failed")?;

    let existing = fetch_margin_rules(&mut tx, rule.merchant_id).await?;
    let candidate = MarginRule {
        id: 0,
        merchant_id: rule.merchant_id,
        brand_id: rule.brand_id,
        category_id: rule.category_id,
        margin: rule.margin,
        window: rule.window,
        is_active: true,
    };
    check_scope_conflict(&existing, &candidate)?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into margin_rules (
          merchant_id, brand_id, category_id, margin_percentage, valid_from, valid_to, is_active
        ) values (
          $1, $2, $3, ($4::bigint)::numeric / 100, $5, $6, true
        )
        returning id
        "#,
    )
    .bind(rule.merchant_id)
    .bind(rule.brand_id)
    .bind(rule.category_id)
    .bind(rule.margin.bps())
    .bind(rule.window.valid_from)
    .bind(rule.window.valid_to)
    .fetch_one(&mut *tx)
    .await
    .context("insert margin_rule failed")?;

    tx.commit().await.context("commit failed")?;
    tracing::info!(
        rule_id = id,
        merchant_id = rule.merchant_id,
        margin = %rule.margin,
        "margin rule added"
    );
    Ok(id)
}

/// Resolve the applicable margin from the merchant's stored rules.
pub async fn resolve_margin_at(pool: &PgPool, query: &MarginQuery) -> Result<MarginResolution> {
    let rules = load_margin_rules(pool, query.merchant_id).await?;
    Ok(resolve_margin(&rules, query))
}

async fn fetch_conversion_rules(
    conn: &mut PgConnection,
    partner_id: i64,
    currency: Currency,
) -> Result<Vec<PointConversionRule>> {
    let rows = sqlx::query(
        r#"
        select id, partner_id, currency_code,
               round(points_to_currency_rate * 1000000)::bigint as rate_micros,
               valid_from, valid_to, is_active
        from point_conversion_rules
        where partner_id = $1 and currency_code = $2
        order by id
        "#,
    )
    .bind(partner_id)
    .bind(currency.as_str())
    .fetch_all(&mut *conn)
    .await
    .context("load point_conversion_rules failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        let micros: i64 = r.try_get("rate_micros")?;
        let code: String = r.try_get("currency_code")?;
        out.push(PointConversionRule {
            id: r.try_get("id")?,
            partner_id: r.try_get("partner_id")?,
            currency: Currency::parse(&code)?,
            rate: ConversionRate::from_micros(micros)?,
            window: ValidityWindow {
                valid_from: r.try_get("valid_from")?,
                valid_to: r.try_get("valid_to")?,
            },
            is_active: r.try_get("is_active")?,
        });
    }
    Ok(out)
}

pub async fn load_conversion_rules(
    pool: &PgPool,
    partner_id: i64,
    currency: Currency,
) -> Result<Vec<PointConversionRule>> {
    let mut conn = pool.acquire().await.context("acquire failed")?;
    fetch_conversion_rules(&mut conn, partner_id, currency).await
}

pub async fn resolve_conversion_rate_at(
    pool: &PgPool,
    partner_id: i64,
    currency: Currency,
    as_of: DateTime<Utc>,
) -> Result<Option<RateResolution>> {
    let rules = load_conversion_rules(pool, partner_id, currency).await?;
    Ok(resolve_conversion_rate(&rules, partner_id, currency, as_of))
}

/// Insert a new rate and close the partner's other active rates for the
/// same currency (`valid_to = max(now, valid_from)`), in one transaction.
pub async fn post_conversion_rate(
    pool: &PgPool,
    rate: &NewConversionRate,
    now: DateTime<Utc>,
) -> Result<PostedRate> {
    if rate.rate.micros() % RATE_STORAGE_STEP != 0 {
        bail!("rate {} has more than 4 decimal places", rate.rate);
    }

    let mut tx = pool.begin().await.context("begin failed")?;

    let superseded: Vec<(i64,)> = sqlx::query_as(
        r#"
        update point_conversion_rules
        set is_active = false, valid_to = greatest($3, valid_from)
        where partner_id = $1 and currency_code = $2 and is_active
        returning id
        "#,
    )
    .bind(rate.partner_id)
    .bind(rate.currency.as_str())
    .bind(now)
    .fetch_all(&mut *tx)
    .await
    .context("supersede point_conversion_rules failed")?;

    let (rule_id,): (i64,) = sqlx::query_as(
        r#"
        insert into point_conversion_rules (
          partner_id, currency_code, points_to_currency_rate, valid_from, is_active
        ) values (
          $1, $2, ($3::bigint)::numeric / 1000000, $4, true
        )
        returning id
        "#,
    )
    .bind(rate.partner_id)
    .bind(rate.currency.as_str())
    .bind(rate.rate.micros())
    .bind(rate.valid_from)
    .fetch_one(&mut *tx)
    .await
    .context("insert point_conversion_rule failed")?;

    tx.commit().await.context("commit failed")?;

    let mut superseded: Vec<i64> = superseded.into_iter().map(|(id,)| id).collect();
    superseded.sort_unstable();
    tracing::info!(
        rule_id,
        partner_id = rate.partner_id,
        currency = rate.currency.as_str(),
        rate = %rate.rate,
        superseded = ?superseded,
        "point conversion rate posted"
    );
    Ok(PostedRate {
        rule_id,
        superseded,
    })
}

/// Offer pricing for a reconciliation commit, using the merchant's stored
/// margin rules.
pub async fn load_offer_pricing(
    pool: &PgPool,
    merchant_id: i64,
    currency: Currency,
    as_of: DateTime<Utc>,
) -> Result<OfferPricing> {
    Ok(OfferPricing {
        currency,
        margin_rules: load_margin_rules(pool, merchant_id).await?,
        as_of,
    })
}

/// Recompute an offer's settlement price from its cached list price.
///
/// When the result differs from the open `offer_price_log` entry, that entry
/// is closed at `now`, a new one is opened and the offer's cached settlement
/// price is updated, all in one transaction.
pub async fn reprice_offer(
    pool: &PgPool,
    offer_id: i64,
    partner_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<RepriceResult> {
    let mut tx = pool.begin().await.context("begin failed")?;

    let offer = sqlx::query(
        r#"
        select o.merchant_id, o.currency_code, o.cached_price_minor, p.id as product_id, p.brand_id
        from merchant_offers o
        join variants v on v.id = o.variant_id
        join products p on p.id = v.product_id
        where o.id = $1
        for update of o
        "#,
    )
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await
    .context("load offer failed")?
    .ok_or_else(|| anyhow!("offer {offer_id} not found"))?;

    let merchant_id: i64 = offer.try_get("merchant_id")?;
    let code: String = offer.try_get("currency_code")?;
    let currency = Currency::parse(&code)?;
    let product_id: i64 = offer.try_get("product_id")?;

    let categories: Vec<(i64,)> =
        sqlx::query_as("select category_id from product_categories where product_id = $1")
            .bind(product_id)
            .fetch_all(&mut *tx)
            .await
            .context("load product categories failed")?;

    let margin_rules = fetch_margin_rules(&mut tx, merchant_id).await?;
    let conversion_rules = match partner_id {
        Some(p) => fetch_conversion_rules(&mut tx, p, currency).await?,
        None => Vec::new(),
    };

    let req = QuoteRequest {
        merchant_id,
        brand_id: offer.try_get("brand_id")?,
        category_ids: categories.into_iter().map(|(c,)| c).collect::<BTreeSet<_>>(),
        price_minor: offer.try_get("cached_price_minor")?,
        currency,
        partner_id,
        as_of: now,
    };
    let quote = quote_offer(&margin_rules, &conversion_rules, &req)?;

    let open = fetch_open_price_log(&mut tx, offer_id).await?;
    let changed = match rmk_pricing::reprice_offer(offer_id, open.as_ref(), &quote, now) {
        Reprice::Unchanged => false,
        Reprice::Changed { closed, opened } => {
            if let Some(c) = closed {
                sqlx::query(
                    "update offer_price_log set valid_to = $2 where offer_id = $1 and valid_to is null",
                )
                .bind(offer_id)
                .bind(c.window.valid_to)
                .execute(&mut *tx)
                .await
                .context("close offer_price_log entry failed")?;
            }
            sqlx::query(
                r#"
                insert into offer_price_log (
                  offer_id, currency_code, price_minor, settlement_price_minor,
                  applied_margin_percentage, valid_from
                ) values (
                  $1, $2, $3, $4, ($5::bigint)::numeric / 100, $6
                )
                "#,
            )
            .bind(offer_id)
            .bind(opened.currency.as_str())
            .bind(opened.price_minor)
            .bind(opened.settlement_minor)
            .bind(opened.applied_margin.bps())
            .bind(opened.window.valid_from)
            .execute(&mut *tx)
            .await
            .context("insert offer_price_log failed")?;

            sqlx::query(
                r#"
                update merchant_offers
                set cached_settlement_price_minor = $2, updated_at = now()
                where id = $1
                "#,
            )
            .bind(offer_id)
            .bind(opened.settlement_minor)
            .execute(&mut *tx)
            .await
            .context("update merchant_offers failed")?;
            true
        }
    };

    tx.commit().await.context("commit failed")?;
    if changed {
        tracing::info!(
            offer_id,
            settlement_minor = quote.settlement_minor,
            margin = %quote.margin,
            "offer repriced"
        );
    }
    Ok(RepriceResult {
        offer_id,
        quote,
        changed,
    })
}

async fn fetch_open_price_log(
    conn: &mut PgConnection,
    offer_id: i64,
) -> Result<Option<PriceLogEntry>> {
    let row = sqlx::query(
        r#"
        select offer_id, currency_code, price_minor, settlement_price_minor,
               round(applied_margin_percentage * 100)::bigint as margin_bps,
               valid_from, valid_to
        from offer_price_log
        where offer_id = $1 and valid_to is null
        "#,
    )
    .bind(offer_id)
    .fetch_optional(&mut *conn)
    .await
    .context("load open offer_price_log failed")?;

    let Some(r) = row else {
        return Ok(None);
    };
    let code: String = r.try_get("currency_code")?;
    let bps: i64 = r.try_get("margin_bps")?;
    Ok(Some(PriceLogEntry {
        offer_id: r.try_get("offer_id")?,
        currency: Currency::parse(&code)?,
        price_minor: r.try_get("price_minor")?,
        settlement_minor: r.try_get("settlement_price_minor")?,
        applied_margin: Margin::from_bps(bps)?,
        window: ValidityWindow {
            valid_from: r.try_get("valid_from")?,
            valid_to: r.try_get("valid_to")?,
        },
    }))
}
