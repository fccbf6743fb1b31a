use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use rmk_catalog::{
    CatalogError, CommitOutcome, CommitPlan, MasterProduct, MasterSnapshot, MasterVariant,
    MerchantOffer, OfferId, OfferSeed, PlannedOutcome, ProductId, ProductTarget, StagingMedia,
    StagingProduct, StagingProductId, StagingSnapshot, StagingVariant, StagingVariantId,
    VariantId,
};

use crate::CatalogStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRow {
    pub product_id: ProductId,
    pub src_url: String,
    pub position: i32,
}

/// Everything the memory store holds. Cloned wholesale on every commit so a
/// failed apply leaves the previous state untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogState {
    pub products: BTreeMap<ProductId, MasterProduct>,
    pub variants: BTreeMap<VariantId, MasterVariant>,
    pub media: Vec<MediaRow>,
    pub staging_products: BTreeMap<StagingProductId, StagingProduct>,
    pub staging_variants: BTreeMap<StagingVariantId, StagingVariant>,
    pub staging_media: Vec<StagingMedia>,
    pub offers: BTreeMap<OfferId, MerchantOffer>,
    next_id: i64,
}

impl CatalogState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Active and inactive variants of a product, by id.
    pub fn variants_of(&self, product_id: ProductId) -> Vec<MasterVariant> {
        self.variants
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect()
    }

    pub fn media_of(&self, product_id: ProductId) -> Vec<&MediaRow> {
        let mut rows: Vec<&MediaRow> =
            self.media.iter().filter(|m| m.product_id == product_id).collect();
        rows.sort_by_key(|m| m.position);
        rows
    }

    pub fn staging_snapshot(&self, id: StagingProductId) -> Result<StagingSnapshot, CatalogError> {
        let product = self
            .staging_products
            .get(&id)
            .cloned()
            .ok_or(CatalogError::NotFound {
                entity: "staging_product",
                id,
            })?;
        let variants = self
            .staging_variants
            .values()
            .filter(|v| v.staging_product_id == id)
            .cloned()
            .collect();
        let mut media: Vec<StagingMedia> = self
            .staging_media
            .iter()
            .filter(|m| m.staging_product_id == id)
            .cloned()
            .collect();
        media.sort_by_key(|m| (m.position, m.id));
        Ok(StagingSnapshot {
            product,
            variants,
            media,
        })
    }

    pub fn master_snapshot(&self, id: ProductId) -> Result<MasterSnapshot, CatalogError> {
        let product = self
            .products
            .get(&id)
            .cloned()
            .ok_or(CatalogError::NotFound {
                entity: "product",
                id,
            })?;
        Ok(MasterSnapshot {
            product,
            variants: self.variants_of(id),
            media_count: self.media.iter().filter(|m| m.product_id == id).count(),
        })
    }

    fn apply(&mut self, plan: &CommitPlan) -> Result<CommitOutcome, CatalogError> {
        let status = self
            .staging_products
            .get(&plan.staging_product_id)
            .map(|s| s.status)
            .ok_or(CatalogError::NotFound {
                entity: "staging_product",
                id: plan.staging_product_id,
            })?;

        let approval = match &plan.outcome {
            PlannedOutcome::Reject {
                rejection_reason,
                admin_notes,
            } => {
                plan.revalidate(status, &[])?;
                let sp = self.staging_product_mut(plan.staging_product_id)?;
                sp.status = plan.target_status();
                sp.rejection_reason = Some(rejection_reason.clone());
                sp.admin_notes = admin_notes.clone();
                return Ok(CommitOutcome {
                    status: Some(plan.target_status()),
                    ..Default::default()
                });
            }
            PlannedOutcome::Approve(a) => a,
        };

        let product_id = match &approval.product {
            ProductTarget::Existing(id) => {
                if !self.products.contains_key(id) {
                    return Err(CatalogError::NotFound {
                        entity: "product",
                        id: *id,
                    });
                }
                plan.revalidate(status, &self.variants_of(*id))?;
                *id
            }
            ProductTarget::Create(p) => {
                plan.revalidate(status, &[])?;
                if self.products.values().any(|existing| existing.slug == p.slug) {
                    return Err(CatalogError::validation(
                        "slug",
                        format!("slug {:?} is already taken", p.slug),
                    ));
                }
                let id = self.next_id();
                self.products.insert(
                    id,
                    MasterProduct {
                        id,
                        title: p.title.clone(),
                        slug: p.slug.clone(),
                        description: p.description.clone(),
                        brand_id: p.brand_id,
                        category_ids: p.category_ids.clone(),
                        specifications: p.specifications.clone(),
                        status: p.status,
                    },
                );
                id
            }
        };

        let mut outcome = CommitOutcome {
            master_product_id: Some(product_id),
            status: Some(plan.target_status()),
            ..Default::default()
        };

        for nv in &approval.new_variants {
            if self.variants.values().any(|v| v.internal_sku == nv.internal_sku) {
                return Err(CatalogError::validation(
                    "internal_sku",
                    format!("internal sku {} is already taken", nv.internal_sku),
                ));
            }
            let id = self.next_id();
            self.variants.insert(
                id,
                MasterVariant {
                    id,
                    product_id,
                    internal_sku: nv.internal_sku.clone(),
                    gtin: nv.gtin.clone(),
                    mpn: nv.mpn.clone(),
                    attributes: nv.attributes.clone(),
                    is_active: true,
                },
            );
            outcome.created_variant_ids.push(id);
            if let Some(seed) = &nv.offer {
                let offer_id = self.insert_offer(plan, id, seed)?;
                outcome.created_offer_ids.push(offer_id);
            }
        }

        for link in &approval.links {
            let offer_id = self.insert_offer(plan, link.master_variant_id, &link.offer)?;
            outcome.created_offer_ids.push(offer_id);
        }

        let start = self.media.iter().filter(|m| m.product_id == product_id).count();
        for (i, url) in approval.media_urls.iter().enumerate() {
            self.media.push(MediaRow {
                product_id,
                src_url: url.clone(),
                position: (start + i) as i32,
            });
        }

        let sp = self.staging_product_mut(plan.staging_product_id)?;
        sp.status = plan.target_status();
        sp.admin_notes = approval.admin_notes.clone();
        sp.suggested_product_id = Some(product_id);

        Ok(outcome)
    }

    fn insert_offer(
        &mut self,
        plan: &CommitPlan,
        variant_id: VariantId,
        seed: &OfferSeed,
    ) -> Result<OfferId, CatalogError> {
        if self
            .offers
            .values()
            .any(|o| o.merchant_id == plan.merchant_id && o.variant_id == variant_id)
        {
            return Err(CatalogError::OfferConflict {
                merchant_id: plan.merchant_id,
                variant_id,
            });
        }
        let id = self.next_id();
        self.offers.insert(
            id,
            MerchantOffer {
                id,
                merchant_id: plan.merchant_id,
                variant_id,
                external_product_id: seed.external_product_id.clone(),
                external_variant_id: seed.external_variant_id.clone(),
                merchant_sku: seed.merchant_sku.clone(),
                currency_code: seed.currency_code.clone(),
                cached_price_minor: seed.price_minor,
                cached_settlement_price_minor: seed.settlement_minor,
                current_stock: 0,
                offer_status: seed.offer_status,
            },
        );
        if let Some(sv) = self.staging_variants.get_mut(&seed.staging_variant_id) {
            sv.matched_master_variant_id = Some(variant_id);
        }
        Ok(id)
    }

    fn staging_product_mut(
        &mut self,
        id: StagingProductId,
    ) -> Result<&mut StagingProduct, CatalogError> {
        self.staging_products
            .get_mut(&id)
            .ok_or(CatalogError::NotFound {
                entity: "staging_product",
                id,
            })
    }
}

/// In-process [`CatalogStore`].
///
/// Ids come from one shared counter. Seeding helpers assign ids the same
/// way, so tests can reference what they inserted.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>, CatalogError> {
        self.state
            .lock()
            .map_err(|_| CatalogError::Store("memory catalog lock poisoned".to_string()))
    }

    /// Copy of the whole state, for assertions and debugging endpoints.
    pub fn snapshot(&self) -> Result<CatalogState, CatalogError> {
        Ok(self.lock()?.clone())
    }

    pub fn insert_product(
        &self,
        title: &str,
        slug: &str,
        brand_id: Option<i64>,
        category_ids: &[i64],
    ) -> Result<ProductId, CatalogError> {
        let mut st = self.lock()?;
        let id = st.next_id();
        st.products.insert(
            id,
            MasterProduct {
                id,
                title: title.to_string(),
                slug: slug.to_string(),
                description: None,
                brand_id,
                category_ids: category_ids.iter().copied().collect(),
                specifications: BTreeMap::new(),
                status: rmk_catalog::ProductStatus::Active,
            },
        );
        Ok(id)
    }

    pub fn insert_variant(
        &self,
        product_id: ProductId,
        internal_sku: &str,
        attributes: rmk_catalog::OptionAttributes,
    ) -> Result<VariantId, CatalogError> {
        let mut st = self.lock()?;
        if !st.products.contains_key(&product_id) {
            return Err(CatalogError::NotFound {
                entity: "product",
                id: product_id,
            });
        }
        let id = st.next_id();
        st.variants.insert(
            id,
            MasterVariant {
                id,
                product_id,
                internal_sku: internal_sku.to_string(),
                gtin: None,
                mpn: None,
                attributes,
                is_active: true,
            },
        );
        Ok(id)
    }

    /// Insert a staging product with its variants and media. Ids in the
    /// input are ignored and reassigned; the returned snapshot carries the
    /// stored ids.
    pub fn insert_staging(
        &self,
        mut snap: StagingSnapshot,
    ) -> Result<StagingSnapshot, CatalogError> {
        let mut st = self.lock()?;
        let id = st.next_id();
        snap.product.id = id;
        st.staging_products.insert(id, snap.product.clone());
        for v in &mut snap.variants {
            v.id = st.next_id();
            v.staging_product_id = id;
            st.staging_variants.insert(v.id, v.clone());
        }
        for m in &mut snap.media {
            m.id = st.next_id();
            m.staging_product_id = id;
            st.staging_media.push(m.clone());
        }
        Ok(snap)
    }

    pub fn insert_offer(&self, offer: MerchantOffer) -> Result<OfferId, CatalogError> {
        let mut st = self.lock()?;
        let id = st.next_id();
        st.offers.insert(id, MerchantOffer { id, ..offer });
        Ok(id)
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalog {
    async fn load_staging(&self, id: StagingProductId) -> Result<StagingSnapshot, CatalogError> {
        self.lock()?.staging_snapshot(id)
    }

    async fn load_master(&self, id: ProductId) -> Result<MasterSnapshot, CatalogError> {
        self.lock()?.master_snapshot(id)
    }

    async fn apply(&self, plan: &CommitPlan) -> Result<CommitOutcome, CatalogError> {
        let mut st = self.lock()?;
        let mut next = st.clone();
        let outcome = next.apply(plan)?;
        *st = next;
        Ok(outcome)
    }
}
