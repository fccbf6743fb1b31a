//! Decision → commit plan.
//!
//! Planning is pure: it reads a staging snapshot and (for LINK_EXISTING) the
//! target master snapshot, and produces a [`CommitPlan`] listing every row a
//! store must write. Stores apply the plan atomically after calling
//! [`CommitPlan::revalidate`] against the state they hold under lock.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    cross_product, validate_mapping, BrandId, CatalogError, CategoryId, DecisionKind,
    MasterSnapshot, MasterVariant, MerchantId, OfferId, OfferStatus, OptionAttributes, ProductId,
    ProductStatus, ReconciliationDecision, StagingMediaId, StagingProductId, StagingSnapshot,
    StagingStatus, StagingVariant, StagingVariantId, VariantId,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub staging_product_id: StagingProductId,
    pub merchant_id: MerchantId,
    /// Staging status observed at planning time.
    pub expected_status: StagingStatus,
    pub kind: DecisionKind,
    pub outcome: PlannedOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedOutcome {
    Reject {
        rejection_reason: String,
        admin_notes: Option<String>,
    },
    Approve(ApprovalPlan),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPlan {
    pub product: ProductTarget,
    /// Brand and categories the offers are priced under.
    pub brand_id: Option<BrandId>,
    pub category_ids: BTreeSet<CategoryId>,
    pub new_variants: Vec<NewVariant>,
    pub links: Vec<OfferLink>,
    /// Appended after any media the product already has, in this order.
    pub media_urls: Vec<String>,
    pub admin_notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductTarget {
    Create(NewMasterProduct),
    Existing(ProductId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMasterProduct {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub brand_id: Option<BrandId>,
    pub category_ids: BTreeSet<CategoryId>,
    pub specifications: BTreeMap<String, String>,
    pub status: ProductStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub internal_sku: String,
    /// Merchant barcode, when the variant comes from a staging row.
    pub gtin: Option<String>,
    /// Merchant SKU kept as the manufacturer part number.
    pub mpn: Option<String>,
    pub attributes: OptionAttributes,
    pub canonical_key: String,
    /// Staging row that caused this variant, if any.
    pub staging_variant_id: Option<StagingVariantId>,
    pub offer: Option<OfferSeed>,
}

/// Offer against a variant that already exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferLink {
    pub master_variant_id: VariantId,
    pub offer: OfferSeed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSeed {
    pub staging_variant_id: StagingVariantId,
    pub external_product_id: Option<String>,
    pub external_variant_id: Option<String>,
    pub merchant_sku: Option<String>,
    pub currency_code: String,
    pub price_minor: i64,
    /// Pass-through until [`CommitPlan::apply_settlement`] runs.
    pub settlement_minor: i64,
    pub offer_status: OfferStatus,
}

/// Result of a committed decision.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub master_product_id: Option<ProductId>,
    pub created_variant_ids: Vec<VariantId>,
    pub created_offer_ids: Vec<OfferId>,
    pub status: Option<StagingStatus>,
}

impl CommitPlan {
    pub fn approval(&self) -> Option<&ApprovalPlan> {
        match &self.outcome {
            PlannedOutcome::Approve(a) => Some(a),
            PlannedOutcome::Reject { .. } => None,
        }
    }

    pub fn target_status(&self) -> StagingStatus {
        match self.outcome {
            PlannedOutcome::Reject { .. } => StagingStatus::Rejected,
            PlannedOutcome::Approve(_) => StagingStatus::Approved,
        }
    }

    pub fn offer_count(&self) -> usize {
        self.approval().map_or(0, |a| {
            a.links.len() + a.new_variants.iter().filter(|v| v.offer.is_some()).count()
        })
    }

    /// Replace every offer's settlement price with `f(list_price)`.
    pub fn apply_settlement<E, F>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(i64) -> Result<i64, E>,
    {
        let PlannedOutcome::Approve(a) = &mut self.outcome else {
            return Ok(());
        };
        for link in &mut a.links {
            link.offer.settlement_minor = f(link.offer.price_minor)?;
        }
        for seed in a.new_variants.iter_mut().filter_map(|v| v.offer.as_mut()) {
            seed.settlement_minor = f(seed.price_minor)?;
        }
        Ok(())
    }

    /// Re-check the plan against state read inside the committing
    /// transaction. `current_variants` is the target product's variant set
    /// (empty for a product that is about to be created).
    pub fn revalidate(
        &self,
        current_status: StagingStatus,
        current_variants: &[MasterVariant],
    ) -> Result<(), CatalogError> {
        if current_status.is_terminal() {
            return Err(CatalogError::InvalidTransition {
                staging_product_id: self.staging_product_id,
                from: current_status,
            });
        }
        let Some(a) = self.approval() else {
            return Ok(());
        };

        let by_key: BTreeMap<String, VariantId> = current_variants
            .iter()
            .map(|v| (v.canonical_key(), v.id))
            .collect();
        for nv in &a.new_variants {
            if let Some(existing) = by_key.get(&nv.canonical_key) {
                return Err(CatalogError::DuplicateVariant {
                    staging_variant_id: nv.staging_variant_id,
                    existing_variant_id: Some(*existing),
                    canonical_key: nv.canonical_key.clone(),
                });
            }
        }
        for link in &a.links {
            if !current_variants.iter().any(|v| v.id == link.master_variant_id) {
                return Err(CatalogError::NotFound {
                    entity: "variant",
                    id: link.master_variant_id,
                });
            }
        }
        Ok(())
    }
}

/// Turn a decision into a commit plan. Fails with the first violation found;
/// a failed plan never reaches a store.
pub fn plan_decision(
    staging: &StagingSnapshot,
    target: Option<&MasterSnapshot>,
    decision: &ReconciliationDecision,
    currency_code: &str,
) -> Result<CommitPlan, CatalogError> {
    let sp = &staging.product;
    if sp.status.is_terminal() {
        return Err(CatalogError::InvalidTransition {
            staging_product_id: sp.id,
            from: sp.status,
        });
    }
    decision.validate_shape()?;

    let seeds = SeedFactory {
        staging,
        currency_code,
    };

    let outcome = match decision {
        ReconciliationDecision::Reject(d) => PlannedOutcome::Reject {
            rejection_reason: d.rejection_reason.trim().to_string(),
            admin_notes: d.admin_notes.clone(),
        },
        ReconciliationDecision::CreateNew(d) => {
            let mut combos = cross_product(&d.options_definition);
            if combos.is_empty() {
                combos.push(OptionAttributes::new());
            }

            let mut offered: BTreeSet<StagingVariantId> = BTreeSet::new();
            let mut new_variants = Vec::with_capacity(combos.len());
            for attributes in combos {
                let key = attributes.canonical_key();
                let source = staging.variants.iter().find(|sv| {
                    !offered.contains(&sv.id) && sv.raw_options.canonical_key() == key
                });
                let nv = match source {
                    Some(sv) => {
                        offered.insert(sv.id);
                        NewVariant {
                            internal_sku: format!("STG-{}-{}", sp.id, sv.id),
                            gtin: trimmed(&sv.raw_barcode),
                            mpn: trimmed(&sv.raw_sku),
                            attributes,
                            canonical_key: key,
                            staging_variant_id: Some(sv.id),
                            offer: Some(seeds.seed(sv)?),
                        }
                    }
                    None => NewVariant {
                        internal_sku: option_sku(&format!("S{}", sp.id), &key),
                        gtin: None,
                        mpn: None,
                        attributes,
                        canonical_key: key,
                        staging_variant_id: None,
                        offer: None,
                    },
                };
                new_variants.push(nv);
            }

            PlannedOutcome::Approve(ApprovalPlan {
                product: ProductTarget::Create(NewMasterProduct {
                    title: d.title.trim().to_string(),
                    slug: d.slug.clone(),
                    description: d.description.clone(),
                    brand_id: d.brand_id,
                    category_ids: d.category_ids.clone(),
                    specifications: d.specifications.clone(),
                    status: ProductStatus::Active,
                }),
                brand_id: d.brand_id,
                category_ids: d.category_ids.clone(),
                new_variants,
                links: Vec::new(),
                media_urls: media_urls(staging, &d.selected_media_ids, &d.extra_media_urls)?,
                admin_notes: d.admin_notes.clone(),
            })
        }
        ReconciliationDecision::LinkExisting(d) => {
            let master = target
                .filter(|m| m.product.id == d.master_product_id)
                .ok_or(CatalogError::NotFound {
                    entity: "product",
                    id: d.master_product_id,
                })?;
            let mapping = validate_mapping(
                &master.variants,
                &staging.variants,
                &d.variant_mapping,
                d.options_definition.as_ref(),
            )?;

            let mut links = Vec::with_capacity(mapping.links.len());
            for (sv_id, mv_id) in &mapping.links {
                links.push(OfferLink {
                    master_variant_id: *mv_id,
                    offer: seeds.seed(seeds.variant(*sv_id)?)?,
                });
            }

            let mut new_variants = Vec::new();
            for (sv_id, attributes) in mapping.add_new {
                let sv = seeds.variant(sv_id)?;
                new_variants.push(NewVariant {
                    internal_sku: format!("LINK-{}-{}", sp.id, sv_id),
                    gtin: trimmed(&sv.raw_barcode),
                    mpn: trimmed(&sv.raw_sku),
                    canonical_key: attributes.canonical_key(),
                    attributes,
                    staging_variant_id: Some(sv_id),
                    offer: Some(seeds.seed(sv)?),
                });
            }
            for attributes in mapping.additional {
                let key = attributes.canonical_key();
                new_variants.push(NewVariant {
                    internal_sku: option_sku(&master.product.id.to_string(), &key),
                    gtin: None,
                    mpn: None,
                    attributes,
                    canonical_key: key,
                    staging_variant_id: None,
                    offer: None,
                });
            }

            PlannedOutcome::Approve(ApprovalPlan {
                product: ProductTarget::Existing(master.product.id),
                brand_id: master.product.brand_id,
                category_ids: master.product.category_ids.clone(),
                new_variants,
                links,
                media_urls: media_urls(staging, &d.selected_media_ids, &d.extra_media_urls)?,
                admin_notes: d.admin_notes.clone(),
            })
        }
    };

    Ok(CommitPlan {
        staging_product_id: sp.id,
        merchant_id: sp.merchant_id,
        expected_status: sp.status,
        kind: decision.kind(),
        outcome,
    })
}

struct SeedFactory<'a> {
    staging: &'a StagingSnapshot,
    currency_code: &'a str,
}

impl SeedFactory<'_> {
    fn variant(&self, id: StagingVariantId) -> Result<&StagingVariant, CatalogError> {
        self.staging.variant(id).ok_or(CatalogError::NotFound {
            entity: "staging_variant",
            id,
        })
    }

    fn seed(&self, sv: &StagingVariant) -> Result<OfferSeed, CatalogError> {
        if sv.raw_price_minor < 0 {
            return Err(CatalogError::validation(
                "raw_price",
                format!("staging variant {} has a negative price", sv.id),
            ));
        }
        Ok(OfferSeed {
            staging_variant_id: sv.id,
            external_product_id: self.staging.product.external_product_id.clone(),
            external_variant_id: sv.external_variant_id.clone(),
            merchant_sku: sv.raw_sku.clone(),
            currency_code: self.currency_code.to_string(),
            price_minor: sv.raw_price_minor,
            settlement_minor: sv.raw_price_minor,
            offer_status: OfferStatus::Live,
        })
    }
}

/// `OPT-{scope}-{16 hex}`; stable for a given scope and canonical key.
fn option_sku(scope: &str, canonical_key: &str) -> String {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical_key.as_bytes());
    let hex = id.simple().to_string();
    format!("OPT-{scope}-{}", &hex[..OPTION_SKU_HEX])
}

/// 64 bits of the UUIDv5.
const OPTION_SKU_HEX: usize = 16;

fn trimmed(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn media_urls(
    staging: &StagingSnapshot,
    selected: &[StagingMediaId],
    extra: &[String],
) -> Result<Vec<String>, CatalogError> {
    let mut out = Vec::with_capacity(selected.len() + extra.len());
    for id in selected {
        let m = staging
            .media
            .iter()
            .find(|m| m.id == *id)
            .ok_or_else(|| {
                CatalogError::validation(
                    "selected_media_ids",
                    format!("staging media {id} does not belong to this staging product"),
                )
            })?;
        out.push(m.source_url.clone());
    }
    out.extend(extra.iter().map(|u| u.trim().to_string()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CreateNewDecision, LinkExistingDecision, MasterProduct, OptionDefinition, StagingMedia,
        StagingProduct, VariantRowChoice,
    };

    fn attrs(pairs: &[(&str, &str)]) -> OptionAttributes {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn staging(status: StagingStatus) -> StagingSnapshot {
        let sv = |id, color: &str, price| StagingVariant {
            id,
            staging_product_id: 50,
            external_variant_id: Some(format!("ext-{id}")),
            raw_sku: Some(format!("M-{id}")),
            raw_barcode: None,
            raw_price_minor: price,
            raw_options: attrs(&[("Color", color)]),
            matched_master_variant_id: None,
        };
        StagingSnapshot {
            product: StagingProduct {
                id: 50,
                merchant_id: 9,
                external_product_id: Some("shop-50".into()),
                raw_title: Some("Tee".into()),
                raw_vendor: None,
                raw_body_html: None,
                raw_product_type: None,
                status,
                rejection_reason: None,
                admin_notes: None,
                suggested_product_id: None,
            },
            variants: vec![sv(501, "Red", 1999), sv(502, "Blue", 2099)],
            media: vec![
                StagingMedia {
                    id: 71,
                    staging_product_id: 50,
                    source_url: "https://cdn/a.jpg".into(),
                    position: 0,
                },
                StagingMedia {
                    id: 72,
                    staging_product_id: 50,
                    source_url: "https://cdn/b.jpg".into(),
                    position: 1,
                },
            ],
        }
    }

    fn master() -> MasterSnapshot {
        MasterSnapshot {
            product: MasterProduct {
                id: 3,
                title: "Tee".into(),
                slug: "tee".into(),
                description: None,
                brand_id: Some(4),
                category_ids: [8].into_iter().collect(),
                specifications: BTreeMap::new(),
                status: ProductStatus::Active,
            },
            variants: vec![MasterVariant {
                id: 30,
                product_id: 3,
                internal_sku: "TEE-RED".into(),
                gtin: None,
                mpn: None,
                attributes: attrs(&[("Color", "Red")]),
                is_active: true,
            }],
            media_count: 1,
        }
    }

    #[test]
    fn create_new_offers_matching_staging_variants() {
        let s = staging(StagingStatus::Pending);
        let decision = ReconciliationDecision::CreateNew(CreateNewDecision {
            title: "Classic Tee".into(),
            slug: "classic-tee".into(),
            options_definition: OptionDefinition::default()
                .with_option("Color", ["Red", "Blue", "Green"]),
            selected_media_ids: vec![72, 71],
            extra_media_urls: vec!["https://img/extra.png".into()],
            ..Default::default()
        });
        let plan = plan_decision(&s, None, &decision, "INR").unwrap();
        let a = plan.approval().unwrap();

        assert_eq!(a.new_variants.len(), 3);
        assert_eq!(a.new_variants[0].internal_sku, "STG-50-501");
        assert_eq!(a.new_variants[1].internal_sku, "STG-50-502");
        assert!(a.new_variants[2].internal_sku.starts_with("OPT-S50-"));
        assert!(a.new_variants[2].offer.is_none());
        assert_eq!(a.new_variants[0].mpn.as_deref(), Some("M-501"));
        assert_eq!(a.new_variants[2].mpn, None);
        assert_eq!(plan.offer_count(), 2);
        assert_eq!(
            a.media_urls,
            vec!["https://cdn/b.jpg", "https://cdn/a.jpg", "https://img/extra.png"]
        );
        assert_eq!(plan.target_status(), StagingStatus::Approved);
    }

    #[test]
    fn create_new_without_options_yields_default_variant() {
        let s = staging(StagingStatus::NeedsReview);
        let decision = ReconciliationDecision::CreateNew(CreateNewDecision {
            title: "Gift Card".into(),
            slug: "gift-card".into(),
            ..Default::default()
        });
        let plan = plan_decision(&s, None, &decision, "INR").unwrap();
        let a = plan.approval().unwrap();
        assert_eq!(a.new_variants.len(), 1);
        assert!(a.new_variants[0].attributes.is_empty());
        assert_eq!(a.new_variants[0].canonical_key, "");
    }

    #[test]
    fn option_sku_is_stable() {
        assert_eq!(option_sku("3", "color=green"), option_sku("3", "color=green"));
        assert_ne!(option_sku("3", "color=green"), option_sku("3", "color=pink"));
        assert_eq!(option_sku("3", "x").len(), "OPT-3-".len() + 16);
    }

    #[test]
    fn option_skus_stay_distinct_across_a_wide_cross_product() {
        let def = OptionDefinition::default()
            .with_option("Size", (0..40).map(|i| format!("S{i}")))
            .with_option("Color", (0..40).map(|i| format!("C{i}")))
            .with_option("Fit", (0..10).map(|i| format!("F{i}")));
        let skus: BTreeSet<String> = cross_product(&def)
            .iter()
            .map(|c| option_sku("3", &c.canonical_key()))
            .collect();
        assert_eq!(skus.len(), 16_000);
    }

    #[test]
    fn link_existing_builds_links_and_new_variants() {
        let s = staging(StagingStatus::Pending);
        let m = master();
        let decision = ReconciliationDecision::LinkExisting(LinkExistingDecision {
            master_product_id: 3,
            variant_mapping: vec![
                VariantRowChoice::link(501, 30),
                VariantRowChoice::add_new(502, attrs(&[("Color", "Blue")])),
            ],
            ..Default::default()
        });
        let plan = plan_decision(&s, Some(&m), &decision, "USD").unwrap();
        let a = plan.approval().unwrap();
        assert_eq!(a.product, ProductTarget::Existing(3));
        assert_eq!(a.brand_id, Some(4));
        assert_eq!(a.links.len(), 1);
        assert_eq!(a.links[0].offer.currency_code, "USD");
        assert_eq!(a.links[0].offer.merchant_sku.as_deref(), Some("M-501"));
        assert_eq!(a.new_variants[0].internal_sku, "LINK-50-502");
        assert_eq!(a.new_variants[0].offer.as_ref().unwrap().price_minor, 2099);
    }

    #[test]
    fn link_existing_needs_matching_target() {
        let s = staging(StagingStatus::Pending);
        let decision = ReconciliationDecision::LinkExisting(LinkExistingDecision {
            master_product_id: 99,
            variant_mapping: vec![VariantRowChoice::link(501, 30)],
            ..Default::default()
        });
        let err = plan_decision(&s, Some(&master()), &decision, "INR").unwrap_err();
        assert_eq!(
            err,
            CatalogError::NotFound {
                entity: "product",
                id: 99
            }
        );
    }

    #[test]
    fn terminal_staging_is_invalid_transition() {
        let s = staging(StagingStatus::Rejected);
        let err = plan_decision(&s, None, &ReconciliationDecision::reject("dup"), "INR")
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTransition { .. }));
    }

    #[test]
    fn unknown_media_selection_is_rejected() {
        let s = staging(StagingStatus::Pending);
        let decision = ReconciliationDecision::CreateNew(CreateNewDecision {
            title: "Tee".into(),
            slug: "tee".into(),
            selected_media_ids: vec![999],
            ..Default::default()
        });
        let err = plan_decision(&s, None, &decision, "INR").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn revalidate_catches_variant_inserted_after_planning() {
        let s = staging(StagingStatus::Pending);
        let mut m = master();
        let decision = ReconciliationDecision::LinkExisting(LinkExistingDecision {
            master_product_id: 3,
            variant_mapping: vec![VariantRowChoice::add_new(502, attrs(&[("Color", "Blue")]))],
            ..Default::default()
        });
        let plan = plan_decision(&s, Some(&m), &decision, "INR").unwrap();

        m.variants.push(MasterVariant {
            id: 31,
            product_id: 3,
            internal_sku: "TEE-BLUE".into(),
            gtin: None,
            mpn: None,
            attributes: attrs(&[("color", "blue")]),
            is_active: true,
        });
        let err = plan
            .revalidate(StagingStatus::Pending, &m.variants)
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateVariant {
                staging_variant_id: Some(502),
                existing_variant_id: Some(31),
                canonical_key: "color=blue".into(),
            }
        );
        assert!(matches!(
            plan.revalidate(StagingStatus::Approved, &[]),
            Err(CatalogError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn apply_settlement_touches_every_offer() {
        let s = staging(StagingStatus::Pending);
        let decision = ReconciliationDecision::CreateNew(CreateNewDecision {
            title: "Tee".into(),
            slug: "tee".into(),
            options_definition: OptionDefinition::default().with_option("Color", ["Red", "Blue"]),
            ..Default::default()
        });
        let mut plan = plan_decision(&s, None, &decision, "INR").unwrap();
        plan.apply_settlement(|p| Ok::<_, ()>(p + 1)).unwrap();
        let a = plan.approval().unwrap();
        let settled: Vec<i64> = a
            .new_variants
            .iter()
            .filter_map(|v| v.offer.as_ref().map(|o| o.settlement_minor))
            .collect();
        assert_eq!(settled, vec![2000, 2100]);
    }
}
