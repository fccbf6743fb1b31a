//! Staging → master variant matching.
//!
//! `propose` produces one recommendation per staging variant; the admin may
//! override any of them. `validate_mapping` is the pre-commit gate: it
//! rejects duplicate AddNew rows and computes the additional variants implied
//! by an edited option definition.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    cross_product, CatalogError, MasterSnapshot, MasterVariant, OptionAttributes,
    OptionDefinition, ProductId, StagingProductId, StagingSnapshot, StagingVariant,
    StagingVariantId, VariantId,
};

/// What to do with one staging variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantChoice {
    /// Offer the merchant's item against an existing master variant.
    Link { master_variant_id: VariantId },
    /// Create a new master variant with these attributes, then offer it.
    AddNew { attributes: OptionAttributes },
    Skip,
}

/// One admin-confirmed row of a variant mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRowChoice {
    pub staging_variant_id: StagingVariantId,
    #[serde(flatten)]
    pub choice: VariantChoice,
}

impl VariantRowChoice {
    pub fn link(staging_variant_id: StagingVariantId, master_variant_id: VariantId) -> Self {
        Self {
            staging_variant_id,
            choice: VariantChoice::Link { master_variant_id },
        }
    }

    pub fn add_new(staging_variant_id: StagingVariantId, attributes: OptionAttributes) -> Self {
        Self {
            staging_variant_id,
            choice: VariantChoice::AddNew { attributes },
        }
    }

    pub fn skip(staging_variant_id: StagingVariantId) -> Self {
        Self {
            staging_variant_id,
            choice: VariantChoice::Skip,
        }
    }
}

/// Why a link was proposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchReason {
    /// Upstream sync already annotated the staging variant.
    Suggested,
    BarcodeMatch,
    /// Merchant SKU equals the variant's manufacturer part number.
    MpnMatch,
    SkuMatch,
    OptionsMatch,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantProposal {
    pub staging_variant_id: StagingVariantId,
    pub staging_options: OptionAttributes,
    pub reason: MatchReason,
    pub choice: VariantChoice,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantMatchResult {
    pub master_product_id: ProductId,
    pub staging_product_id: StagingProductId,
    pub proposals: Vec<VariantProposal>,
    /// Existing master options merged with incoming staging options; the
    /// starting point for the admin's edited definition.
    pub merged_options: OptionDefinition,
    pub summary: MatchSummary,
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Link suggestion for a staging variant that carries no upstream hint.
///
/// Order: barcode = GTIN, raw SKU = MPN, raw SKU = internal SKU, canonical
/// option key. Only active variants are considered. Candidates all belong to
/// the target product, so an MPN hit is already scoped to that product's brand.
pub fn suggest_link(
    existing: &[MasterVariant],
    staging: &StagingVariant,
) -> Option<(VariantId, MatchReason)> {
    let active = || existing.iter().filter(|mv| mv.is_active);

    if let Some(barcode) = non_blank(&staging.raw_barcode) {
        if let Some(mv) = active().find(|mv| non_blank(&mv.gtin) == Some(barcode)) {
            return Some((mv.id, MatchReason::BarcodeMatch));
        }
    }

    if let Some(sku) = non_blank(&staging.raw_sku) {
        if let Some(mv) = active().find(|mv| non_blank(&mv.mpn) == Some(sku)) {
            return Some((mv.id, MatchReason::MpnMatch));
        }
        if let Some(mv) = active().find(|mv| mv.internal_sku.trim() == sku) {
            return Some((mv.id, MatchReason::SkuMatch));
        }
    }

    let key = staging.raw_options.canonical_key();
    active()
        .find(|mv| mv.canonical_key() == key)
        .map(|mv| (mv.id, MatchReason::OptionsMatch))
}

/// Initial recommendation per staging variant.
///
/// 1. upstream hint → Link
/// 2. barcode / MPN / SKU / option-key match → Link
/// 3. otherwise → AddNew with the raw options
pub fn propose(existing: &[MasterVariant], staging: &[StagingVariant]) -> Vec<VariantProposal> {
    staging
        .iter()
        .map(|sv| {
            let (choice, reason) = match sv.matched_master_variant_id {
                Some(id) => (
                    VariantChoice::Link {
                        master_variant_id: id,
                    },
                    MatchReason::Suggested,
                ),
                None => match suggest_link(existing, sv) {
                    Some((id, reason)) => (
                        VariantChoice::Link {
                            master_variant_id: id,
                        },
                        reason,
                    ),
                    None => (
                        VariantChoice::AddNew {
                            attributes: sv.raw_options.clone(),
                        },
                        MatchReason::None,
                    ),
                },
            };
            VariantProposal {
                staging_variant_id: sv.id,
                staging_options: sv.raw_options.clone(),
                reason,
                choice,
            }
        })
        .collect()
}

/// `match_variants(masterProductId, stagingProductId)` over loaded snapshots.
pub fn match_variants(master: &MasterSnapshot, staging: &StagingSnapshot) -> VariantMatchResult {
    let proposals = propose(&master.variants, &staging.variants);

    let existing_def =
        OptionDefinition::from_attributes(master.variants.iter().map(|v| &v.attributes));
    let incoming_def =
        OptionDefinition::from_attributes(staging.variants.iter().map(|v| &v.raw_options));

    let matched = proposals
        .iter()
        .filter(|p| p.reason != MatchReason::None)
        .count();

    VariantMatchResult {
        master_product_id: master.product.id,
        staging_product_id: staging.product.id,
        summary: MatchSummary {
            total: proposals.len(),
            matched,
            unmatched: proposals.len() - matched,
        },
        proposals,
        merged_options: existing_def.merge(&incoming_def),
    }
}

/// Combinations of `edited` that are neither an existing variant nor covered
/// by an AddNew row. These become variants without a merchant offer.
pub fn additional_variants(
    existing: &[MasterVariant],
    add_new: &[OptionAttributes],
    edited: &OptionDefinition,
) -> Vec<OptionAttributes> {
    let mut taken: BTreeSet<String> = existing.iter().map(|v| v.canonical_key()).collect();
    taken.extend(add_new.iter().map(|a| a.canonical_key()));

    cross_product(edited)
        .into_iter()
        .filter(|combo| taken.insert(combo.canonical_key()))
        .collect()
}

/// Outcome of a successful `validate_mapping`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedMapping {
    pub links: Vec<(StagingVariantId, VariantId)>,
    pub add_new: Vec<(StagingVariantId, OptionAttributes)>,
    pub additional: Vec<OptionAttributes>,
    /// Explicit Skip rows plus staging variants the mapping did not mention.
    pub skipped: Vec<StagingVariantId>,
}

impl ValidatedMapping {
    pub fn net_actions(&self) -> usize {
        self.links.len() + self.add_new.len() + self.additional.len()
    }
}

/// Pre-commit validation of an admin's variant mapping against the variant
/// set of the target product.
///
/// Fails fast with:
/// - `Validation` for unknown / repeated staging rows, links outside the
///   target product, or two rows linking the same master variant
/// - `DuplicateVariant` when an AddNew key equals an existing variant's key
///   or another AddNew row's key
/// - `EmptyDecision` when nothing would be committed
pub fn validate_mapping(
    existing: &[MasterVariant],
    staging: &[StagingVariant],
    rows: &[VariantRowChoice],
    edited: Option<&OptionDefinition>,
) -> Result<ValidatedMapping, CatalogError> {
    let staging_ids: BTreeSet<StagingVariantId> = staging.iter().map(|v| v.id).collect();
    let existing_by_key: BTreeMap<String, VariantId> = existing
        .iter()
        .map(|v| (v.canonical_key(), v.id))
        .collect();
    let existing_ids: BTreeSet<VariantId> = existing.iter().map(|v| v.id).collect();

    let mut out = ValidatedMapping::default();
    let mut seen_rows: BTreeSet<StagingVariantId> = BTreeSet::new();
    let mut linked: BTreeSet<VariantId> = BTreeSet::new();
    let mut new_keys: BTreeSet<String> = BTreeSet::new();

    for row in rows {
        if !staging_ids.contains(&row.staging_variant_id) {
            return Err(CatalogError::validation(
                "variant_mapping",
                format!(
                    "staging variant {} does not belong to this staging product",
                    row.staging_variant_id
                ),
            ));
        }
        if !seen_rows.insert(row.staging_variant_id) {
            return Err(CatalogError::validation(
                "variant_mapping",
                format!("staging variant {} is mapped more than once", row.staging_variant_id),
            ));
        }

        match &row.choice {
            VariantChoice::Link { master_variant_id } => {
                if !existing_ids.contains(master_variant_id) {
                    return Err(CatalogError::validation(
                        "variant_mapping",
                        format!(
                            "master variant {master_variant_id} does not belong to the target product"
                        ),
                    ));
                }
                if !linked.insert(*master_variant_id) {
                    return Err(CatalogError::validation(
                        "variant_mapping",
                        format!("master variant {master_variant_id} is linked more than once"),
                    ));
                }
                out.links.push((row.staging_variant_id, *master_variant_id));
            }
            VariantChoice::AddNew { attributes } => {
                let key = attributes.canonical_key();
                if let Some(existing_id) = existing_by_key.get(&key) {
                    return Err(CatalogError::DuplicateVariant {
                        staging_variant_id: Some(row.staging_variant_id),
                        existing_variant_id: Some(*existing_id),
                        canonical_key: key,
                    });
                }
                if !new_keys.insert(key.clone()) {
                    return Err(CatalogError::DuplicateVariant {
                        staging_variant_id: Some(row.staging_variant_id),
                        existing_variant_id: None,
                        canonical_key: key,
                    });
                }
                out.add_new
                    .push((row.staging_variant_id, attributes.clone()));
            }
            VariantChoice::Skip => out.skipped.push(row.staging_variant_id),
        }
    }

    for sv in staging {
        if !seen_rows.contains(&sv.id) {
            out.skipped.push(sv.id);
        }
    }

    if let Some(def) = edited {
        let add_attrs: Vec<OptionAttributes> =
            out.add_new.iter().map(|(_, a)| a.clone()).collect();
        out.additional = additional_variants(existing, &add_attrs, def);
    }

    if out.net_actions() == 0 {
        return Err(CatalogError::EmptyDecision);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
