//! Axum router and all HTTP handlers for rmk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can drive the bare router.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use rmk_catalog::{CommitOutcome, ReconciliationDecision, VariantMatchResult};
use rmk_db::{NewConversionRate, NewMarginRule};
use rmk_pricing::{
    quote_offer, resolve_conversion_rate, resolve_margin, to_points_in, ConversionRate, Currency,
    Margin, MarginQuery, QuoteRequest, ValidityWindow,
};
use rmk_reconcile::OfferPricing;

use crate::{
    api_types::{
        DecisionQuery, HealthResponse, MarginResolveQuery, MarginResolveResponse,
        NewMarginRuleRequest, NewRateRequest, PointsQuery, PointsResponse, QuoteRequestBody,
        QuoteResponse, RateQuery, RateResponse, RuleCreatedResponse, VariantsQuery,
    },
    error::ApiError,
    state::AppState,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/review/:staging_id/variants", get(review_variants))
        .route("/v1/review/:staging_id/decision", post(review_decision))
        .route("/v1/margins", post(margin_add))
        .route("/v1/margins/resolve", get(margin_resolve))
        .route("/v1/partners/:partner_id/rate", get(rate_resolve).post(rate_post))
        .route("/v1/points", get(points))
        .route("/v1/offers/quote", post(offer_quote))
        .with_state(state)
}

fn currency_of(st: &AppState, code: Option<&str>) -> Result<Currency, ApiError> {
    st.currency(code)
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: st.build.service.to_string(),
        version: st.build.version.to_string(),
        backend: st.rules.backend_name().to_string(),
        config_hash: st.config_hash.clone(),
    })
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

pub(crate) async fn review_variants(
    State(st): State<Arc<AppState>>,
    Path(staging_id): Path<i64>,
    Query(q): Query<VariantsQuery>,
) -> ApiResult<VariantMatchResult> {
    let result =
        rmk_reconcile::match_variants(st.catalog.as_ref(), q.master_product_id, staging_id).await?;
    Ok(Json(result))
}

/// Body is the decision itself, tagged by `action`.
pub(crate) async fn review_decision(
    State(st): State<Arc<AppState>>,
    Path(staging_id): Path<i64>,
    Query(q): Query<DecisionQuery>,
    Json(decision): Json<ReconciliationDecision>,
) -> ApiResult<CommitOutcome> {
    let currency = currency_of(&st, q.currency.as_deref())?;
    let staging = st.catalog.load_staging(staging_id).await?;
    let pricing = OfferPricing {
        currency,
        margin_rules: st.rules.margin_rules(staging.product.merchant_id).await?,
        as_of: Utc::now(),
    };

    let outcome = rmk_reconcile::submit_reconciliation_decision(
        st.catalog.as_ref(),
        staging_id,
        &decision,
        &pricing,
    )
    .await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Margins
// ---------------------------------------------------------------------------

pub(crate) async fn margin_resolve(
    State(st): State<Arc<AppState>>,
    Query(q): Query<MarginResolveQuery>,
) -> ApiResult<MarginResolveResponse> {
    let query = MarginQuery::new(
        q.merchant_id,
        q.brand_id,
        q.category_id,
        q.as_of.unwrap_or_else(Utc::now),
    );
    let rules = st.rules.margin_rules(q.merchant_id).await?;
    let r = resolve_margin(&rules, &query);
    if r.rule_id.is_none() && st.pricing.warn_on_missing_margin {
        tracing::warn!(
            merchant_id = q.merchant_id,
            brand_id = ?q.brand_id,
            category_id = ?q.category_id,
            "no margin rule applies; using 0%"
        );
    }
    Ok(Json(MarginResolveResponse {
        margin_percentage: r.margin.to_string(),
        margin_bps: r.margin.bps(),
        rule_id: r.rule_id,
    }))
}

pub(crate) async fn margin_add(
    State(st): State<Arc<AppState>>,
    Json(req): Json<NewMarginRuleRequest>,
) -> Result<(StatusCode, Json<RuleCreatedResponse>), ApiError> {
    let margin = Margin::parse_percent(&req.margin_percentage)?;
    let window = ValidityWindow::new(req.valid_from.unwrap_or_else(Utc::now), req.valid_to)?;
    let rule_id = st
        .rules
        .add_margin_rule(NewMarginRule {
            merchant_id: req.merchant_id,
            brand_id: req.brand_id,
            category_id: req.category_id,
            margin,
            window,
        })
        .await?;
    tracing::info!(rule_id, merchant_id = req.merchant_id, %margin, "margin rule created");
    Ok((
        StatusCode::CREATED,
        Json(RuleCreatedResponse {
            rule_id,
            superseded: Vec::new(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

pub(crate) async fn rate_resolve(
    State(st): State<Arc<AppState>>,
    Path(partner_id): Path<i64>,
    Query(q): Query<RateQuery>,
) -> ApiResult<RateResponse> {
    let currency = currency_of(&st, q.currency.as_deref())?;
    let rules = st.rules.conversion_rules(partner_id, currency).await?;
    let r = resolve_conversion_rate(&rules, partner_id, currency, q.as_of.unwrap_or_else(Utc::now))
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "no point conversion rate for partner {partner_id} in {currency}"
            ))
        })?;
    Ok(Json(RateResponse {
        partner_id,
        currency,
        rate: r.rate.to_string(),
        rate_micros: r.rate.micros(),
        rule_id: r.rule_id,
    }))
}

pub(crate) async fn rate_post(
    State(st): State<Arc<AppState>>,
    Path(partner_id): Path<i64>,
    Json(req): Json<NewRateRequest>,
) -> Result<(StatusCode, Json<RuleCreatedResponse>), ApiError> {
    let currency = currency_of(&st, req.currency.as_deref())?;
    let rate = ConversionRate::parse(&req.rate)?;
    let now = Utc::now();
    let posted = st
        .rules
        .post_rate(
            NewConversionRate {
                partner_id,
                currency,
                rate,
                valid_from: req.valid_from.unwrap_or(now),
            },
            now,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RuleCreatedResponse {
            rule_id: posted.rule_id,
            superseded: posted.superseded,
        }),
    ))
}

pub(crate) async fn points(
    State(st): State<Arc<AppState>>,
    Query(q): Query<PointsQuery>,
) -> ApiResult<PointsResponse> {
    let currency = currency_of(&st, q.currency.as_deref())?;
    let rate = ConversionRate::parse(&q.rate)?;
    let points = to_points_in(q.amount_minor, currency.minor_units(), rate)?;
    Ok(Json(PointsResponse {
        amount_minor: q.amount_minor,
        rate: rate.to_string(),
        points,
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/offers/quote
// ---------------------------------------------------------------------------

pub(crate) async fn offer_quote(
    State(st): State<Arc<AppState>>,
    Json(body): Json<QuoteRequestBody>,
) -> ApiResult<QuoteResponse> {
    let currency = currency_of(&st, body.currency.as_deref())?;
    let margin_rules = st.rules.margin_rules(body.merchant_id).await?;
    let conversion_rules = match body.partner_id {
        Some(p) => st.rules.conversion_rules(p, currency).await?,
        None => Vec::new(),
    };
    let req = QuoteRequest {
        merchant_id: body.merchant_id,
        brand_id: body.brand_id,
        category_ids: body.category_ids.into_iter().collect(),
        price_minor: body.price_minor,
        currency,
        partner_id: body.partner_id,
        as_of: body.as_of.unwrap_or_else(Utc::now),
    };
    let quote = quote_offer(&margin_rules, &conversion_rules, &req)?;
    Ok(Json(quote.into()))
}
