//! Request and response types for all rmk-daemon HTTP endpoints.
//!
//! Margins and rates travel as decimal strings ("4.75", "0.25") so clients
//! never see floats; the integer forms are included alongside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rmk_pricing::{Currency, OfferQuote};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// "memory" | "postgres"
    pub backend: String,
    pub config_hash: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. "DUPLICATE_VARIANT_CONFLICT".
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// /v1/review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantsQuery {
    pub master_product_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionQuery {
    /// Offer currency; defaults to the configured default currency.
    pub currency: Option<String>,
}

// ---------------------------------------------------------------------------
// /v1/margins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginResolveQuery {
    pub merchant_id: i64,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginResolveResponse {
    pub margin_percentage: String,
    pub margin_bps: i64,
    /// None when no rule applies (0%).
    pub rule_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMarginRuleRequest {
    pub merchant_id: i64,
    pub brand_id: Option<i64>,
    pub category_id: Option<i64>,
    pub margin_percentage: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCreatedResponse {
    pub rule_id: i64,
    #[serde(default)]
    pub superseded: Vec<i64>,
}

// ---------------------------------------------------------------------------
// /v1/partners/{partner_id}/rate and /v1/points
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateQuery {
    pub currency: Option<String>,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateResponse {
    pub partner_id: i64,
    pub currency: Currency,
    pub rate: String,
    pub rate_micros: i64,
    pub rule_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRateRequest {
    pub currency: Option<String>,
    pub rate: String,
    pub valid_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsQuery {
    pub amount_minor: i64,
    pub rate: String,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsResponse {
    pub amount_minor: i64,
    pub rate: String,
    pub points: i64,
}

// ---------------------------------------------------------------------------
// /v1/offers/quote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequestBody {
    pub merchant_id: i64,
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    pub price_minor: i64,
    pub currency: Option<String>,
    pub partner_id: Option<i64>,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub price_minor: i64,
    pub currency: Currency,
    pub margin_percentage: String,
    pub margin_rule_id: Option<i64>,
    pub settlement_minor: i64,
    pub rate: Option<String>,
    pub rate_rule_id: Option<i64>,
    pub points: Option<i64>,
}

impl From<OfferQuote> for QuoteResponse {
    fn from(q: OfferQuote) -> Self {
        Self {
            price_minor: q.price_minor,
            currency: q.currency,
            margin_percentage: q.margin.to_string(),
            margin_rule_id: q.margin_rule_id,
            settlement_minor: q.settlement_minor,
            rate: q.rate.map(|r| r.rate.to_string()),
            rate_rule_id: q.rate.map(|r| r.rule_id),
            points: q.points,
        }
    }
}
