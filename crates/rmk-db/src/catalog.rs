//! Postgres [`CatalogStore`].
//!
//! `apply` runs in one transaction: the staging row is locked with
//! `FOR UPDATE`, and for LINK_EXISTING so is the target product, so the
//! variant set handed to [`CommitPlan::revalidate`] cannot change before
//! commit. Any error drops the transaction, which rolls it back.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};

use rmk_catalog::{
    CatalogError, CommitOutcome, CommitPlan, MasterProduct, MasterSnapshot, MasterVariant,
    NewMasterProduct, NewVariant, OfferId, OfferSeed, PlannedOutcome, ProductId, ProductStatus,
    ProductTarget, StagingMedia, StagingProduct, StagingProductId, StagingSnapshot,
    StagingStatus, StagingVariant, VariantId,
};
use rmk_reconcile::CatalogStore;

use crate::{attributes_from_json, attributes_to_json, is_unique_constraint_violation};

const UQ_PRODUCT_SLUG: &str = "uq_products_slug";
const UQ_VARIANT_SKU: &str = "uq_variants_internal_sku";
const UQ_OFFER: &str = "uq_merchant_offers_merchant_variant";

#[derive(Clone, Debug)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>, CatalogError> {
        self.pool.acquire().await.map_err(store_err("acquire"))
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalog {
    async fn load_staging(&self, id: StagingProductId) -> Result<StagingSnapshot, CatalogError> {
        let mut conn = self.conn().await?;
        fetch_staging(&mut *conn, id).await
    }

    async fn load_master(&self, id: ProductId) -> Result<MasterSnapshot, CatalogError> {
        let mut conn = self.conn().await?;
        fetch_master(&mut *conn, id).await
    }

    async fn apply(&self, plan: &CommitPlan) -> Result<CommitOutcome, CatalogError> {
        let mut tx = self.pool.begin().await.map_err(store_err("begin"))?;
        let outcome = apply_plan(&mut *tx, plan).await?;
        tx.commit().await.map_err(store_err("commit"))?;
        Ok(outcome)
    }
}

fn store_err(what: &'static str) -> impl FnOnce(sqlx::Error) -> CatalogError {
    move |e| CatalogError::Store(format!("{what}: {e}"))
}

fn col<'r, T>(row: &'r sqlx::postgres::PgRow, name: &str) -> Result<T, CatalogError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| CatalogError::Store(format!("decode {name}: {e}")))
}

fn string_map(v: &Value) -> BTreeMap<String, String> {
    attributes_from_json(v).into_map()
}

fn string_map_json(m: &BTreeMap<String, String>) -> Value {
    Value::Object(
        m.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn fetch_staging(
    conn: &mut PgConnection,
    id: StagingProductId,
) -> Result<StagingSnapshot, CatalogError> {
    let row = sqlx::query(
        r#"
        select id, merchant_id, external_product_id, raw_title, raw_vendor, raw_body_html,
               raw_product_type, status, rejection_reason, admin_notes, suggested_product_id
        from staging_products
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_err("fetch staging product"))?
    .ok_or(CatalogError::NotFound {
        entity: "staging_product",
        id,
    })?;

    let status: String = col(&row, "status")?;
    let product = StagingProduct {
        id: col(&row, "id")?,
        merchant_id: col(&row, "merchant_id")?,
        external_product_id: col(&row, "external_product_id")?,
        raw_title: col(&row, "raw_title")?,
        raw_vendor: col(&row, "raw_vendor")?,
        raw_body_html: col(&row, "raw_body_html")?,
        raw_product_type: col(&row, "raw_product_type")?,
        status: StagingStatus::parse(&status)?,
        rejection_reason: col(&row, "rejection_reason")?,
        admin_notes: col(&row, "admin_notes")?,
        suggested_product_id: col(&row, "suggested_product_id")?,
    };

    let rows = sqlx::query(
        r#"
        select id, staging_product_id, external_variant_id, raw_sku, raw_barcode,
               round(raw_price * 100)::bigint as raw_price_minor,
               raw_options, matched_master_variant_id
        from staging_variants
        where staging_product_id = $1
        order by id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_err("fetch staging variants"))?;

    let mut variants = Vec::with_capacity(rows.len());
    for r in &rows {
        let options: Value = col(r, "raw_options")?;
        variants.push(StagingVariant {
            id: col(r, "id")?,
            staging_product_id: col(r, "staging_product_id")?,
            external_variant_id: col(r, "external_variant_id")?,
            raw_sku: col(r, "raw_sku")?,
            raw_barcode: col(r, "raw_barcode")?,
            raw_price_minor: col(r, "raw_price_minor")?,
            raw_options: attributes_from_json(&options),
            matched_master_variant_id: col(r, "matched_master_variant_id")?,
        });
    }

    let rows = sqlx::query(
        r#"
        select id, staging_product_id, source_url, position
        from staging_media
        where staging_product_id = $1
        order by position, id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_err("fetch staging media"))?;

    let mut media = Vec::with_capacity(rows.len());
    for r in &rows {
        media.push(StagingMedia {
            id: col(r, "id")?,
            staging_product_id: col(r, "staging_product_id")?,
            source_url: col(r, "source_url")?,
            position: col(r, "position")?,
        });
    }

    Ok(StagingSnapshot {
        product,
        variants,
        media,
    })
}

async fn fetch_master(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<MasterSnapshot, CatalogError> {
    let row = sqlx::query(
        r#"
        select id, title, slug, description, brand_id, specifications, status
        from products
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_err("fetch product"))?
    .ok_or(CatalogError::NotFound {
        entity: "product",
        id,
    })?;

    let category_ids: Vec<(i64,)> =
        sqlx::query_as("select category_id from product_categories where product_id = $1")
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .map_err(store_err("fetch product categories"))?;

    let specs: Value = col(&row, "specifications")?;
    let status: String = col(&row, "status")?;
    let product = MasterProduct {
        id: col(&row, "id")?,
        title: col(&row, "title")?,
        slug: col(&row, "slug")?,
        description: col(&row, "description")?,
        brand_id: col(&row, "brand_id")?,
        category_ids: category_ids.into_iter().map(|(c,)| c).collect::<BTreeSet<_>>(),
        specifications: string_map(&specs),
        status: ProductStatus::parse(&status)?,
    };

    let variants = fetch_variants(conn, id).await?;

    let (media_count,): (i64,) =
        sqlx::query_as("select count(*)::bigint from media where product_id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .map_err(store_err("count media"))?;

    Ok(MasterSnapshot {
        product,
        variants,
        media_count: usize::try_from(media_count).unwrap_or(0),
    })
}

async fn fetch_variants(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<Vec<MasterVariant>, CatalogError> {
    let rows = sqlx::query(
        r#"
        select id, product_id, internal_sku, gtin, mpn, attributes, is_active
        from variants
        where product_id = $1
        order by id
        "#,
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_err("fetch variants"))?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        let attrs: Value = col(r, "attributes")?;
        out.push(MasterVariant {
            id: col(r, "id")?,
            product_id: col(r, "product_id")?,
            internal_sku: col(r, "internal_sku")?,
            gtin: col(r, "gtin")?,
            mpn: col(r, "mpn")?,
            attributes: attributes_from_json(&attrs),
            is_active: col(r, "is_active")?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

async fn apply_plan(
    conn: &mut PgConnection,
    plan: &CommitPlan,
) -> Result<CommitOutcome, CatalogError> {
    let status: Option<(String,)> =
        sqlx::query_as("select status from staging_products where id = $1 for update")
            .bind(plan.staging_product_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(store_err("lock staging product"))?;
    let status = match status {
        Some((s,)) => StagingStatus::parse(&s)?,
        None => {
            return Err(CatalogError::NotFound {
                entity: "staging_product",
                id: plan.staging_product_id,
            })
        }
    };

    let approval = match &plan.outcome {
        PlannedOutcome::Reject {
            rejection_reason,
            admin_notes,
        } => {
            plan.revalidate(status, &[])?;
            sqlx::query(
                r#"
                update staging_products
                set status = $2, rejection_reason = $3, admin_notes = $4, updated_at = now()
                where id = $1
                "#,
            )
            .bind(plan.staging_product_id)
            .bind(plan.target_status().as_str())
            .bind(rejection_reason)
            .bind(admin_notes)
            .execute(&mut *conn)
            .await
            .map_err(store_err("reject staging product"))?;
            return Ok(CommitOutcome {
                status: Some(plan.target_status()),
                ..Default::default()
            });
        }
        PlannedOutcome::Approve(a) => a,
    };

    let product_id = match &approval.product {
        ProductTarget::Existing(id) => {
            let found: Option<(i64,)> =
                sqlx::query_as("select id from products where id = $1 for update")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(store_err("lock product"))?;
            if found.is_none() {
                return Err(CatalogError::NotFound {
                    entity: "product",
                    id: *id,
                });
            }
            let current = fetch_variants(conn, *id).await?;
            plan.revalidate(status, &current)?;
            *id
        }
        ProductTarget::Create(p) => {
            plan.revalidate(status, &[])?;
            insert_product(conn, p).await?
        }
    };

    let mut outcome = CommitOutcome {
        master_product_id: Some(product_id),
        status: Some(plan.target_status()),
        ..Default::default()
    };

    for nv in &approval.new_variants {
        let variant_id = insert_variant(conn, product_id, nv).await?;
        outcome.created_variant_ids.push(variant_id);
        if let Some(seed) = &nv.offer {
            outcome
                .created_offer_ids
                .push(insert_offer(conn, plan, variant_id, seed).await?);
        }
    }
    for link in &approval.links {
        outcome
            .created_offer_ids
            .push(insert_offer(conn, plan, link.master_variant_id, &link.offer).await?);
    }

    let (start,): (i64,) =
        sqlx::query_as("select count(*)::bigint from media where product_id = $1")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(store_err("count media"))?;
    for (i, url) in approval.media_urls.iter().enumerate() {
        let position = i32::try_from(start + i as i64)
            .map_err(|_| CatalogError::validation("media", "too many media rows"))?;
        sqlx::query("insert into media (product_id, src_url, position) values ($1, $2, $3)")
            .bind(product_id)
            .bind(url)
            .bind(position)
            .execute(&mut *conn)
            .await
            .map_err(store_err("insert media"))?;
    }

    sqlx::query(
        r#"
        update staging_products
        set status = $2, admin_notes = $3, suggested_product_id = $4, updated_at = now()
        where id = $1
        "#,
    )
    .bind(plan.staging_product_id)
    .bind(plan.target_status().as_str())
    .bind(&approval.admin_notes)
    .bind(product_id)
    .execute(&mut *conn)
    .await
    .map_err(store_err("approve staging product"))?;

    Ok(outcome)
}

async fn insert_product(
    conn: &mut PgConnection,
    p: &NewMasterProduct,
) -> Result<ProductId, CatalogError> {
    let res: Result<(i64,), sqlx::Error> = sqlx::query_as(
        r#"
        insert into products (title, slug, description, brand_id, specifications, status)
        values ($1, $2, $3, $4, $5, $6)
        returning id
        "#,
    )
    .bind(&p.title)
    .bind(&p.slug)
    .bind(&p.description)
    .bind(p.brand_id)
    .bind(string_map_json(&p.specifications))
    .bind(p.status.as_str())
    .fetch_one(&mut *conn)
    .await;

    let (id,) = match res {
        Ok(r) => r,
        Err(e) if is_unique_constraint_violation(&e, UQ_PRODUCT_SLUG) => {
            return Err(CatalogError::validation(
                "slug",
                format!("slug {:?} is already taken", p.slug),
            ))
        }
        Err(e) => return Err(store_err("insert product")(e)),
    };

    for category_id in &p.category_ids {
        sqlx::query(
            "insert into product_categories (product_id, category_id) values ($1, $2) \
             on conflict do nothing",
        )
        .bind(id)
        .bind(category_id)
        .execute(&mut *conn)
        .await
        .map_err(store_err("insert product category"))?;
    }
    Ok(id)
}

async fn insert_variant(
    conn: &mut PgConnection,
    product_id: ProductId,
    nv: &NewVariant,
) -> Result<VariantId, CatalogError> {
    let res: Result<(i64,), sqlx::Error> = sqlx::query_as(
        r#"
        insert into variants (product_id, internal_sku, gtin, mpn, attributes, is_active)
        values ($1, $2, $3, $4, $5, true)
        returning id
        "#,
    )
    .bind(product_id)
    .bind(&nv.internal_sku)
    .bind(&nv.gtin)
    .bind(&nv.mpn)
    .bind(attributes_to_json(&nv.attributes))
    .fetch_one(&mut *conn)
    .await;

    match res {
        Ok((id,)) => Ok(id),
        Err(e) if is_unique_constraint_violation(&e, UQ_VARIANT_SKU) => {
            Err(CatalogError::validation(
                "internal_sku",
                format!("internal sku {} is already taken", nv.internal_sku),
            ))
        }
        Err(e) => Err(store_err("insert variant")(e)),
    }
}

async fn insert_offer(
    conn: &mut PgConnection,
    plan: &CommitPlan,
    variant_id: VariantId,
    seed: &OfferSeed,
) -> Result<OfferId, CatalogError> {
    let res: Result<(i64,), sqlx::Error> = sqlx::query_as(
        r#"
        insert into merchant_offers (
          merchant_id, variant_id, external_product_id, external_variant_id, merchant_sku,
          currency_code, cached_price_minor, cached_settlement_price_minor, offer_status
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        returning id
        "#,
    )
    .bind(plan.merchant_id)
    .bind(variant_id)
    .bind(&seed.external_product_id)
    .bind(&seed.external_variant_id)
    .bind(&seed.merchant_sku)
    .bind(&seed.currency_code)
    .bind(seed.price_minor)
    .bind(seed.settlement_minor)
    .bind(seed.offer_status.as_str())
    .fetch_one(&mut *conn)
    .await;

    let offer_id = match res {
        Ok((id,)) => id,
        Err(e) if is_unique_constraint_violation(&e, UQ_OFFER) => {
            return Err(CatalogError::OfferConflict {
                merchant_id: plan.merchant_id,
                variant_id,
            })
        }
        Err(e) => return Err(store_err("insert offer")(e)),
    };

    sqlx::query("update staging_variants set matched_master_variant_id = $2 where id = $1")
        .bind(seed.staging_variant_id)
        .bind(variant_id)
        .execute(&mut *conn)
        .await
        .map_err(store_err("mark staging variant"))?;

    Ok(offer_id)
}
