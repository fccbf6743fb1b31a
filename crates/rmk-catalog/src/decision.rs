use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    is_url_safe_slug, BrandId, CatalogError, CategoryId, OptionDefinition, ProductId,
    StagingMediaId, VariantChoice, VariantRowChoice,
};

/// Admin decision on one staging product. Consumed by a single commit path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationDecision {
    Reject(RejectDecision),
    CreateNew(CreateNewDecision),
    LinkExisting(LinkExistingDecision),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Reject,
    CreateNew,
    LinkExisting,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Reject => "REJECT",
            DecisionKind::CreateNew => "CREATE_NEW",
            DecisionKind::LinkExisting => "LINK_EXISTING",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectDecision {
    pub rejection_reason: String,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNewDecision {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand_id: Option<BrandId>,
    #[serde(default)]
    pub category_ids: BTreeSet<CategoryId>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
    /// Empty definition → a single default variant.
    #[serde(default)]
    pub options_definition: OptionDefinition,
    #[serde(default)]
    pub selected_media_ids: Vec<StagingMediaId>,
    #[serde(default)]
    pub extra_media_urls: Vec<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkExistingDecision {
    pub master_product_id: ProductId,
    #[serde(default)]
    pub variant_mapping: Vec<VariantRowChoice>,
    /// Admin-edited option space; its uncovered combinations become
    /// additional variants without offers.
    #[serde(default)]
    pub options_definition: Option<OptionDefinition>,
    #[serde(default)]
    pub selected_media_ids: Vec<StagingMediaId>,
    #[serde(default)]
    pub extra_media_urls: Vec<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

impl ReconciliationDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(RejectDecision {
            rejection_reason: reason.into(),
            admin_notes: None,
        })
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Reject(_) => DecisionKind::Reject,
            Self::CreateNew(_) => DecisionKind::CreateNew,
            Self::LinkExisting(_) => DecisionKind::LinkExisting,
        }
    }

    pub fn admin_notes(&self) -> Option<&str> {
        match self {
            Self::Reject(d) => d.admin_notes.as_deref(),
            Self::CreateNew(d) => d.admin_notes.as_deref(),
            Self::LinkExisting(d) => d.admin_notes.as_deref(),
        }
    }

    /// Checks that need nothing but the decision itself.
    pub fn validate_shape(&self) -> Result<(), CatalogError> {
        match self {
            Self::Reject(d) => {
                if d.rejection_reason.trim().is_empty() {
                    return Err(CatalogError::validation(
                        "rejection_reason",
                        "rejection reason is required",
                    ));
                }
            }
            Self::CreateNew(d) => {
                if d.title.trim().is_empty() {
                    return Err(CatalogError::validation("title", "title is required"));
                }
                if !is_url_safe_slug(&d.slug) {
                    return Err(CatalogError::validation(
                        "slug",
                        format!("slug {:?} is not URL-safe", d.slug),
                    ));
                }
                validate_urls(&d.extra_media_urls)?;
            }
            Self::LinkExisting(d) => {
                if d.master_product_id <= 0 {
                    return Err(CatalogError::validation(
                        "master_product_id",
                        "target master product is required",
                    ));
                }
                let no_options = d
                    .options_definition
                    .as_ref()
                    .map_or(true, OptionDefinition::is_empty);
                let all_skip = d
                    .variant_mapping
                    .iter()
                    .all(|r| r.choice == VariantChoice::Skip);
                if all_skip && no_options {
                    return Err(CatalogError::EmptyDecision);
                }
                validate_urls(&d.extra_media_urls)?;
            }
        }
        Ok(())
    }
}

fn validate_urls(urls: &[String]) -> Result<(), CatalogError> {
    for u in urls {
        if u.trim().is_empty() {
            return Err(CatalogError::validation(
                "extra_media_urls",
                "media URL must not be blank",
            ));
        }
    }
    Ok(())
}
