use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{CatalogError, OptionAttributes};

pub type ProductId = i64;
pub type VariantId = i64;
pub type StagingProductId = i64;
pub type StagingVariantId = i64;
pub type StagingMediaId = i64;
pub type MerchantId = i64;
pub type BrandId = i64;
pub type CategoryId = i64;
pub type OfferId = i64;

// ---------------------------------------------------------------------------
// Status enums (persisted verbatim)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "DRAFT",
            ProductStatus::Active => "ACTIVE",
            ProductStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s {
            "DRAFT" => Ok(ProductStatus::Draft),
            "ACTIVE" => Ok(ProductStatus::Active),
            "ARCHIVED" => Ok(ProductStatus::Archived),
            other => Err(CatalogError::validation(
                "status",
                format!("invalid product status: {other}"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagingStatus {
    Pending,
    AutoMatched,
    NeedsReview,
    Approved,
    Rejected,
}

impl StagingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingStatus::Pending => "PENDING",
            StagingStatus::AutoMatched => "AUTO_MATCHED",
            StagingStatus::NeedsReview => "NEEDS_REVIEW",
            StagingStatus::Approved => "APPROVED",
            StagingStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s {
            "PENDING" => Ok(StagingStatus::Pending),
            "AUTO_MATCHED" => Ok(StagingStatus::AutoMatched),
            "NEEDS_REVIEW" => Ok(StagingStatus::NeedsReview),
            "APPROVED" => Ok(StagingStatus::Approved),
            "REJECTED" => Ok(StagingStatus::Rejected),
            other => Err(CatalogError::validation(
                "status",
                format!("invalid staging status: {other}"),
            )),
        }
    }

    /// APPROVED and REJECTED are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StagingStatus::Approved | StagingStatus::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Live,
    PendingReview,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Live => "LIVE",
            OfferStatus::PendingReview => "PENDING_REVIEW",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s {
            "LIVE" => Ok(OfferStatus::Live),
            "PENDING_REVIEW" => Ok(OfferStatus::PendingReview),
            other => Err(CatalogError::validation(
                "offer_status",
                format!("invalid offer status: {other}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Master catalog
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterProduct {
    pub id: ProductId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub brand_id: Option<BrandId>,
    pub category_ids: BTreeSet<CategoryId>,
    pub specifications: BTreeMap<String, String>,
    pub status: ProductStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub internal_sku: String,
    pub gtin: Option<String>,
    pub mpn: Option<String>,
    pub attributes: OptionAttributes,
    pub is_active: bool,
}

impl MasterVariant {
    pub fn canonical_key(&self) -> String {
        self.attributes.canonical_key()
    }
}

/// A master product together with its current variant set, as read from a
/// store at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSnapshot {
    pub product: MasterProduct,
    pub variants: Vec<MasterVariant>,
    /// Number of media rows already attached; new media are appended after.
    pub media_count: usize,
}

// ---------------------------------------------------------------------------
// Staging (raw merchant feed)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingProduct {
    pub id: StagingProductId,
    pub merchant_id: MerchantId,
    pub external_product_id: Option<String>,
    pub raw_title: Option<String>,
    pub raw_vendor: Option<String>,
    pub raw_body_html: Option<String>,
    pub raw_product_type: Option<String>,
    pub status: StagingStatus,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub suggested_product_id: Option<ProductId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingVariant {
    pub id: StagingVariantId,
    pub staging_product_id: StagingProductId,
    pub external_variant_id: Option<String>,
    pub raw_sku: Option<String>,
    pub raw_barcode: Option<String>,
    pub raw_price_minor: i64,
    pub raw_options: OptionAttributes,
    /// Opaque upstream hint; when present the matcher proposes a link to it.
    pub matched_master_variant_id: Option<VariantId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingMedia {
    pub id: StagingMediaId,
    pub staging_product_id: StagingProductId,
    pub source_url: String,
    pub position: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingSnapshot {
    pub product: StagingProduct,
    pub variants: Vec<StagingVariant>,
    pub media: Vec<StagingMedia>,
}

impl StagingSnapshot {
    pub fn variant(&self, id: StagingVariantId) -> Option<&StagingVariant> {
        self.variants.iter().find(|v| v.id == id)
    }
}

// ---------------------------------------------------------------------------
// Merchant offers
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantOffer {
    pub id: OfferId,
    pub merchant_id: MerchantId,
    pub variant_id: VariantId,
    pub external_product_id: Option<String>,
    pub external_variant_id: Option<String>,
    pub merchant_sku: Option<String>,
    pub currency_code: String,
    pub cached_price_minor: i64,
    pub cached_settlement_price_minor: i64,
    pub current_stock: i32,
    pub offer_status: OfferStatus,
}
