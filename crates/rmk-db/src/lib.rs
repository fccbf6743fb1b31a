//! rmk-db
//!
//! Postgres persistence: migrations, the [`PgCatalog`] reconciliation store,
//! and the margin / point-rate / price-log tables.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};

use rmk_catalog::OptionAttributes;

mod catalog;
mod pricing;

pub use catalog::PgCatalog;
pub use pricing::{
    insert_margin_rule, load_conversion_rules, load_margin_rules, load_offer_pricing,
    post_conversion_rate, reprice_offer, resolve_conversion_rate_at, resolve_margin_at,
    NewConversionRate, NewMarginRule, PostedRate, RepriceResult,
};

pub const ENV_DB_URL: &str = "RMK_DATABASE_URL";

/// Connect to Postgres using RMK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='staging_products'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_catalog_tables: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_catalog_tables: bool,
}

/// Count staging products still waiting for a decision.
pub async fn count_open_staging(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from staging_products
        where status in ('PENDING','AUTO_MATCHED','NEEDS_REVIEW')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_open_staging failed")?;
    Ok(n)
}

fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// Option attributes from a JSONB column.
///
/// Accepts an object (`{"Color": "Red"}`) or the feed's list form
/// (`[{"name": "Color", "value": "Red"}]`). Numbers and booleans are kept as
/// their text; nested values are dropped.
pub fn attributes_from_json(v: &Value) -> OptionAttributes {
    let mut out = OptionAttributes::new();
    match v {
        Value::Object(map) => {
            for (k, val) in map {
                if let Some(s) = scalar_text(val) {
                    out.insert(k.clone(), s);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let name = item.get("name").and_then(Value::as_str);
                let value = item.get("value").and_then(scalar_text);
                if let (Some(name), Some(value)) = (name, value) {
                    out.insert(name, value);
                }
            }
        }
        _ => {}
    }
    out
}

pub fn attributes_to_json(attrs: &OptionAttributes) -> Value {
    Value::Object(
        attrs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_read_object_form() {
        let a = attributes_from_json(&json!({"Color": "Red", "Size": 42, "Meta": {"x": 1}}));
        assert_eq!(a.get("Color"), Some("Red"));
        assert_eq!(a.get("Size"), Some("42"));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn attributes_read_list_form() {
        let a = attributes_from_json(&json!([
            {"name": "Color", "value": "Blue"},
            {"name": "Size"}
        ]));
        assert_eq!(a.get("Color"), Some("Blue"));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn attributes_json_is_a_flat_object() {
        let mut a = OptionAttributes::new();
        a.insert("Color", "Red");
        assert_eq!(attributes_to_json(&a), json!({"Color": "Red"}));
        assert!(attributes_from_json(&Value::Null).is_empty());
    }
}
