//! Reconciliation decision processor.
//!
//! load → plan (pure) → price offers → `store.apply` (atomic, re-validated).
//! An `OfferConflict` from the store means another writer created an offer
//! for the same (merchant, variant) in between; the whole cycle runs once
//! more against fresh state before the error is surfaced.

use chrono::{DateTime, Utc};

use rmk_catalog::{
    plan_decision, CatalogError, CommitOutcome, CommitPlan, ProductId, ReconciliationDecision,
    StagingProductId, VariantMatchResult,
};
use rmk_pricing::{settlement_price, Currency, MarginQuery, MarginRule, RuleBook};

use crate::CatalogStore;

const MAX_ATTEMPTS: usize = 2;

/// How new offers are priced at commit time.
#[derive(Clone, Debug)]
pub struct OfferPricing {
    pub currency: Currency,
    /// Empty → settlement price equals the merchant's price.
    pub margin_rules: Vec<MarginRule>,
    pub as_of: DateTime<Utc>,
}

impl OfferPricing {
    pub fn pass_through(currency: Currency, as_of: DateTime<Utc>) -> Self {
        Self {
            currency,
            margin_rules: Vec::new(),
            as_of,
        }
    }

    pub fn from_book(book: &RuleBook, currency: Currency, as_of: DateTime<Utc>) -> Self {
        Self {
            currency,
            margin_rules: book.margin_rules.clone(),
            as_of,
        }
    }

    fn price(&self, plan: &mut CommitPlan) -> Result<(), CatalogError> {
        let Some(a) = plan.approval() else {
            return Ok(());
        };
        let query = MarginQuery {
            merchant_id: plan.merchant_id,
            brand_id: a.brand_id,
            category_ids: a.category_ids.clone(),
            as_of: self.as_of,
        };
        let margin = rmk_pricing::resolve_margin(&self.margin_rules, &query);
        if margin.rule_id.is_none() && !self.margin_rules.is_empty() {
            tracing::debug!(
                merchant_id = plan.merchant_id,
                "no margin rule applies; offers settle at list price"
            );
        }
        plan.apply_settlement(|list| settlement_price(list, margin.margin))
            .map_err(|e| CatalogError::validation("settlement_price", e.to_string()))
    }
}

/// Load both snapshots and propose a mapping.
pub async fn match_variants<S>(
    store: &S,
    master_product_id: ProductId,
    staging_product_id: StagingProductId,
) -> Result<VariantMatchResult, CatalogError>
where
    S: CatalogStore + ?Sized,
{
    let master = store.load_master(master_product_id).await?;
    let staging = store.load_staging(staging_product_id).await?;
    Ok(rmk_catalog::match_variants(&master, &staging))
}

/// Validate, plan and atomically commit one decision.
pub async fn submit_reconciliation_decision<S>(
    store: &S,
    staging_product_id: StagingProductId,
    decision: &ReconciliationDecision,
    pricing: &OfferPricing,
) -> Result<CommitOutcome, CatalogError>
where
    S: CatalogStore + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let plan = prepare(store, staging_product_id, decision, pricing).await?;

        match store.apply(&plan).await {
            Ok(outcome) => {
                tracing::info!(
                    staging_product_id,
                    action = decision.kind().as_str(),
                    master_product_id = ?outcome.master_product_id,
                    variants = outcome.created_variant_ids.len(),
                    offers = outcome.created_offer_ids.len(),
                    "reconciliation decision committed"
                );
                return Ok(outcome);
            }
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    staging_product_id,
                    attempt,
                    error = %e,
                    "commit raced; re-planning"
                );
            }
            Err(e) => {
                tracing::warn!(
                    staging_product_id,
                    attempt,
                    code = e.code(),
                    error = %e,
                    "commit rejected"
                );
                return Err(e);
            }
        }
    }
}

async fn prepare<S>(
    store: &S,
    staging_product_id: StagingProductId,
    decision: &ReconciliationDecision,
    pricing: &OfferPricing,
) -> Result<CommitPlan, CatalogError>
where
    S: CatalogStore + ?Sized,
{
    let staging = store.load_staging(staging_product_id).await?;
    // Shape and status checks run before the target product is loaded.
    if staging.product.status.is_terminal() {
        return Err(CatalogError::InvalidTransition {
            staging_product_id,
            from: staging.product.status,
        });
    }
    decision.validate_shape()?;

    let target = match decision {
        ReconciliationDecision::LinkExisting(d) => {
            Some(store.load_master(d.master_product_id).await?)
        }
        _ => None,
    };
    let mut plan = plan_decision(
        &staging,
        target.as_ref(),
        decision,
        pricing.currency.as_str(),
    )?;
    pricing.price(&mut plan)?;
    Ok(plan)
}
