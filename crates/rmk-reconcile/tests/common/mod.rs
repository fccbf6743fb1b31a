#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rmk_catalog::*;
use rmk_pricing::Currency;
use rmk_reconcile::{MemoryCatalog, OfferPricing};

pub fn attrs(pairs: &[(&str, &str)]) -> OptionAttributes {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

pub fn pricing() -> OfferPricing {
    OfferPricing::pass_through(
        Currency::Inr,
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    )
}

pub fn staging_variant(options: &[(&str, &str)], price_minor: i64) -> StagingVariant {
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

/// Master product "Runner" (brand 4, category 8) with a {Color: Red} variant,
/// plus a pending staging product from merchant 5 with `variants`.
pub struct Fixture {
    pub store: MemoryCatalog,
    pub product_id: ProductId,
    pub red_variant_id: VariantId,
    pub staging: StagingSnapshot,
}

pub fn fixture(variants: Vec<StagingVariant>) -> Fixture {
    let store = MemoryCatalog::new();
    let product_id = store
        .insert_product("Runner", "runner", Some(4), &[8])
        .unwrap();
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
            variants,
            media: vec![StagingMedia {
                id: 0,
                staging_product_id: 0,
                source_url: "https://cdn.example/runner.jpg".into(),
                position: 0,
            }],
        })
        .unwrap();
    Fixture {
        store,
        product_id,
        red_variant_id,
        staging,
    }
}
