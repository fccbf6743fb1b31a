//! Shared runtime state for rmk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The catalog store and
//! the pricing rules come from the same backend: either everything lives in
//! process memory, or everything lives in Postgres.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use rmk_config::PricingSettings;
use rmk_db::{NewConversionRate, NewMarginRule, PgCatalog, PostedRate};
use rmk_pricing::{Currency, MarginRule, PointConversionRule, RuleBook, ValidityWindow};
use rmk_reconcile::{CatalogStore, MemoryCatalog};

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "rmk-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Margin and point-rate rules behind the daemon.
pub enum RuleStore {
    Memory(RwLock<RuleBook>),
    Postgres(PgPool),
}

impl RuleStore {
    pub fn backend_name(&self) -> &'static str {
        match self {
            RuleStore::Memory(_) => "memory",
            RuleStore::Postgres(_) => "postgres",
        }
    }

    pub async fn margin_rules(&self, merchant_id: i64) -> Result<Vec<MarginRule>> {
        match self {
            RuleStore::Memory(book) => Ok(book
                .read()
                .await
                .margin_rules
                .iter()
                .filter(|r| r.merchant_id == merchant_id)
                .cloned()
                .collect()),
            RuleStore::Postgres(pool) => rmk_db::load_margin_rules(pool, merchant_id).await,
        }
    }

    pub async fn conversion_rules(
        &self,
        partner_id: i64,
        currency: Currency,
    ) -> Result<Vec<PointConversionRule>> {
        match self {
            RuleStore::Memory(book) => Ok(book
                .read()
                .await
                .conversion_rules
                .iter()
                .filter(|r| r.partner_id == partner_id && r.currency == currency)
                .cloned()
                .collect()),
            RuleStore::Postgres(pool) => {
                rmk_db::load_conversion_rules(pool, partner_id, currency).await
            }
        }
    }

    pub async fn add_margin_rule(&self, new: NewMarginRule) -> Result<i64> {
        match self {
            RuleStore::Memory(book) => {
                let mut book = book.write().await;
                let id = book.next_margin_rule_id();
                book.add_margin_rule(MarginRule {
                    id,
                    merchant_id: new.merchant_id,
                    brand_id: new.brand_id,
                    category_id: new.category_id,
                    margin: new.margin,
                    window: new.window,
                    is_active: true,
                })?;
                Ok(id)
            }
            RuleStore::Postgres(pool) => rmk_db::insert_margin_rule(pool, &new).await,
        }
    }

    pub async fn post_rate(
        &self,
        new: NewConversionRate,
        now: DateTime<Utc>,
    ) -> Result<PostedRate> {
        match self {
            RuleStore::Memory(book) => {
                let mut book = book.write().await;
                let rule_id = book.next_conversion_rule_id();
                let superseded = book.post_conversion_rate(
                    PointConversionRule {
                        id: rule_id,
                        partner_id: new.partner_id,
                        currency: new.currency,
                        rate: new.rate,
                        window: ValidityWindow::open_from(new.valid_from),
                        is_active: true,
                    },
                    now,
                );
                Ok(PostedRate {
                    rule_id,
                    superseded,
                })
            }
            RuleStore::Postgres(pool) => rmk_db::post_conversion_rate(pool, &new, now).await,
        }
    }
}

pub struct AppState {
    pub build: BuildInfo,
    /// SHA-256 of the effective config, reported by /v1/health.
    pub config_hash: String,
    pub pricing: PricingSettings,
    pub catalog: Arc<dyn CatalogStore>,
    pub rules: RuleStore,
}

impl AppState {
    /// Everything in process memory. Used by tests and local demos.
    pub fn in_memory(
        catalog: Arc<MemoryCatalog>,
        book: RuleBook,
        pricing: PricingSettings,
    ) -> Self {
        Self {
            build: BuildInfo::default(),
            config_hash: String::new(),
            pricing,
            catalog,
            rules: RuleStore::Memory(RwLock::new(book)),
        }
    }

    pub fn postgres(pool: PgPool, pricing: PricingSettings) -> Self {
        Self {
            build: BuildInfo::default(),
            config_hash: String::new(),
            pricing,
            catalog: Arc::new(PgCatalog::new(pool.clone())),
            rules: RuleStore::Postgres(pool),
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Currency from a request, or the configured default.
    pub fn currency(&self, code: Option<&str>) -> Result<Currency> {
        match code {
            Some(c) => self.pricing.currency(c),
            None => Ok(self.pricing.default_currency),
        }
    }
}
