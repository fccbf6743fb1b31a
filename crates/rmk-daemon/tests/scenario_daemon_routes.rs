//! In-process scenario tests for rmk-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot` against the memory
//! backend; no socket is bound.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use rmk_catalog::{
    OptionAttributes, StagingMedia, StagingProduct, StagingSnapshot, StagingStatus, StagingVariant,
};
use rmk_config::PricingSettings;
use rmk_daemon::{routes, state::AppState};
use rmk_pricing::{
    ConversionRate, Currency, MarginRule, PointConversionRule, RuleBook, ValidityWindow,
};
use rmk_reconcile::MemoryCatalog;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Seeded {
    router: axum::Router,
    store: Arc<MemoryCatalog>,
    product_id: i64,
    red_variant_id: i64,
    staging_id: i64,
    red_sv: i64,
    blue_sv: i64,
}

fn attrs(pairs: &[(&str, &str)]) -> OptionAttributes {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

fn staging_variant(options: &[(&str, &str)], price_minor: i64) -> StagingVariant {
    StagingVariant {
        id: 0,
        staging_product_id: 0,
        external_variant_id: None,
        raw_sku: None,
        raw_barcode: None,
        raw_price_minor: price_minor,
        raw_options: attrs(options),
        matched_master_variant_id: None,
    }
}

/// Product "Runner" (brand 4, category 8) with a red variant; a pending
/// staging product from merchant 5 offering red and blue; a 4.75% brand
/// margin for merchant 5 and a 0.25 INR rate for partner 9.
fn seeded() -> Seeded {
    let store = Arc::new(MemoryCatalog::new());
    let product_id = store.insert_product("Runner", "runner", Some(4), &[8]).unwrap();
    let red_variant_id = store
        .insert_variant(product_id, "RUN-RED", attrs(&[("Color", "Red")]))
        .unwrap();
    let staging = store
        .insert_staging(StagingSnapshot {
            product: StagingProduct {
                id: 0,
                merchant_id: 5,
                external_product_id: Some("shop-runner".into()),
                raw_title: Some("Runner".into()),
                raw_vendor: None,
                raw_body_html: None,
                raw_product_type: None,
                status: StagingStatus::Pending,
                rejection_reason: None,
                admin_notes: None,
                suggested_product_id: None,
            },
            variants: vec![
                staging_variant(&[("Color", "Red")], 249_900),
                staging_variant(&[("Color", "Blue")], 10_000),
            ],
            media: vec![StagingMedia {
                id: 0,
                staging_product_id: 0,
                source_url: "https://cdn.example/runner.jpg".into(),
                position: 0,
            }],
        })
        .unwrap();

    let since = ValidityWindow::open_from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let mut book = RuleBook::new();
    book.add_margin_rule(MarginRule::new(1, 5, Some(4), None, "4.75", since).unwrap())
        .unwrap();
    book.post_conversion_rate(
        PointConversionRule {
            id: 1,
            partner_id: 9,
            currency: Currency::Inr,
            rate: ConversionRate::parse("0.25").unwrap(),
            window: since,
            is_active: true,
        },
        since.valid_from,
    );

    let state = AppState::in_memory(Arc::clone(&store), book, PricingSettings::default());
    Seeded {
        router: routes::build_router(Arc::new(state)),
        product_id,
        red_variant_id,
        staging_id: staging.product.id,
        red_sv: staging.variants[0].id,
        blue_sv: staging.variants[1].id,
        store,
    }
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, Value) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_memory_backend() {
    let s = seeded();
    let (status, json) = call(s.router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "rmk-daemon");
    assert_eq!(json["backend"], "memory");
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

#[tokio::test]
async fn review_variants_proposes_option_match() {
    let s = seeded();
    let uri = format!(
        "/v1/review/{}/variants?master_product_id={}",
        s.staging_id, s.product_id
    );
    let (status, json) = call(s.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"]["total"], 2);
    assert_eq!(json["summary"]["matched"], 1);
}

#[tokio::test]
async fn review_variants_unknown_staging_is_404() {
    let s = seeded();
    let uri = format!("/v1/review/9999/variants?master_product_id={}", s.product_id);
    let (status, json) = call(s.router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "NOT_FOUND");
}

#[tokio::test]
async fn link_existing_decision_commits_priced_offers_then_is_terminal() {
    let s = seeded();
    let uri = format!("/v1/review/{}/decision", s.staging_id);
    let body = json!({
        "action": "LINK_EXISTING",
        "master_product_id": s.product_id,
        "variant_mapping": [
            {"staging_variant_id": s.red_sv, "kind": "LINK", "master_variant_id": s.red_variant_id},
            {"staging_variant_id": s.blue_sv, "kind": "ADD_NEW", "attributes": {"Color": "Blue"}}
        ],
        "selected_media_ids": []
    });

    let (status, json) = call(s.router.clone(), post(&uri, body.clone())).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["master_product_id"], s.product_id);
    assert_eq!(json["created_variant_ids"].as_array().unwrap().len(), 1);
    assert_eq!(json["created_offer_ids"].as_array().unwrap().len(), 2);

    let st = s.store.snapshot().unwrap();
    let red = st
        .offers
        .values()
        .find(|o| o.variant_id == s.red_variant_id)
        .unwrap();
    assert_eq!(red.cached_settlement_price_minor, 261_770);
    assert_eq!(red.currency_code, "INR");

    let (status, json) = call(s.router, post(&uri, body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn add_new_duplicating_existing_variant_is_422() {
    let s = seeded();
    let uri = format!("/v1/review/{}/decision", s.staging_id);
    let body = json!({
        "action": "LINK_EXISTING",
        "master_product_id": s.product_id,
        "variant_mapping": [
            {"staging_variant_id": s.red_sv, "kind": "ADD_NEW", "attributes": {"color": "red "}}
        ]
    });
    let (status, json) = call(s.router, post(&uri, body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "DUPLICATE_VARIANT_CONFLICT");
    assert!(s.store.snapshot().unwrap().offers.is_empty());
}

#[tokio::test]
async fn reject_without_reason_is_400() {
    let s = seeded();
    let uri = format!("/v1/review/{}/decision", s.staging_id);
    let (status, json) = call(
        s.router,
        post(&uri, json!({"action": "REJECT", "rejection_reason": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unsupported_decision_currency_is_400() {
    let s = seeded();
    let uri = format!("/v1/review/{}/decision?currency=JPY", s.staging_id);
    let (status, _) = call(
        s.router,
        post(&uri, json!({"action": "REJECT", "rejection_reason": "dupe"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Margins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn margin_resolve_uses_brand_rule_or_zero() {
    let s = seeded();
    let (status, json) = call(
        s.router.clone(),
        get("/v1/margins/resolve?merchant_id=5&brand_id=4&category_id=8&as_of=2024-06-01T00:00:00Z"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["margin_percentage"], "4.75");
    assert_eq!(json["margin_bps"], 475);
    assert_eq!(json["rule_id"], 1);

    let (status, json) = call(s.router, get("/v1/margins/resolve?merchant_id=6")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["margin_bps"], 0);
    assert!(json["rule_id"].is_null());
}

#[tokio::test]
async fn adding_margin_rule_for_taken_scope_is_409() {
    let s = seeded();
    let (status, json) = call(
        s.router.clone(),
        post("/v1/margins", json!({"merchant_id": 5, "brand_id": 4, "margin_percentage": "6"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "SCOPE_CONFLICT");

    let (status, json) = call(
        s.router,
        post("/v1/margins", json!({"merchant_id": 5, "margin_percentage": "101"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partner_rate_resolves_and_is_superseded_by_post() {
    let s = seeded();
    let (status, json) = call(s.router.clone(), get("/v1/partners/9/rate?currency=INR")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rate"], "0.25");
    assert_eq!(json["rule_id"], 1);

    let (status, json) = call(
        s.router.clone(),
        post("/v1/partners/9/rate", json!({"rate": "0.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["superseded"], json!([1]));
    let new_id = json["rule_id"].clone();

    let (_, json) = call(s.router.clone(), get("/v1/partners/9/rate")).await;
    assert_eq!(json["rule_id"], new_id);
    assert_eq!(json["rate_micros"], 500_000);

    let (status, _) = call(s.router, get("/v1/partners/77/rate")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn points_round_up() {
    let s = seeded();
    let (status, json) =
        call(s.router.clone(), get("/v1/points?amount_minor=10000&rate=0.25")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["points"], 400);

    let (_, json) = call(s.router.clone(), get("/v1/points?amount_minor=10001&rate=0.25")).await;
    assert_eq!(json["points"], 401);

    let (status, _) = call(s.router, get("/v1/points?amount_minor=100&rate=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// POST /v1/offers/quote
// ---------------------------------------------------------------------------

#[tokio::test]
async fn quote_combines_margin_settlement_and_points() {
    let s = seeded();
    let (status, json) = call(
        s.router,
        post(
            "/v1/offers/quote",
            json!({
                "merchant_id": 5,
                "brand_id": 4,
                "category_ids": [8],
                "price_minor": 249900,
                "partner_id": 9,
                "as_of": "2024-06-01T00:00:00Z"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["currency"], "INR");
    assert_eq!(json["margin_percentage"], "4.75");
    assert_eq!(json["settlement_minor"], 261_770);
    assert_eq!(json["rate"], "0.25");
    assert_eq!(json["points"], 10_471);
}
