//! `rmk review` against the Postgres catalog.

use anyhow::Result;
use chrono::Utc;
use rmk_catalog::ReconciliationDecision;
use rmk_db::PgCatalog;
use rmk_reconcile::CatalogStore;

use super::{connect, connect_with, currency, load_config, print_json, read_json_file};

pub async fn match_cmd(
    config_paths: &[String],
    staging_id: i64,
    master_product_id: i64,
) -> Result<()> {
    let store = PgCatalog::new(connect(config_paths).await?);
    let result = rmk_reconcile::match_variants(&store, master_product_id, staging_id).await?;
    print_json(&result)
}

pub async fn decide_cmd(
    config_paths: &[String],
    staging_id: i64,
    decision_file: &str,
    currency_code: Option<&str>,
) -> Result<()> {
    let decision: ReconciliationDecision = read_json_file(decision_file)?;

    let cfg = load_config(config_paths)?;
    let settings = rmk_config::PricingSettings::from_config(&cfg.config_json)?;
    let currency = currency(&settings, currency_code)?;

    let store = PgCatalog::new(connect_with(&cfg).await?);
    let staging = store.load_staging(staging_id).await?;
    let pricing = rmk_db::load_offer_pricing(
        store.pool(),
        staging.product.merchant_id,
        currency,
        Utc::now(),
    )
    .await?;

    let outcome =
        rmk_reconcile::submit_reconciliation_decision(&store, staging_id, &decision, &pricing)
            .await?;

    if let Some(status) = outcome.status {
        println!("status={}", status.as_str());
    }
    if let Some(id) = outcome.master_product_id {
        println!("master_product_id={}", id);
    }
    println!("created_variant_ids={:?}", outcome.created_variant_ids);
    println!("created_offer_ids={:?}", outcome.created_offer_ids);
    Ok(())
}
