use crate::{MerchantId, StagingProductId, StagingStatus, StagingVariantId, VariantId};

/// Errors produced while matching, planning or committing a reconciliation.
///
/// Every variant aborts the whole decision; nothing is partially persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogError {
    /// A required field is missing or malformed. Never retried.
    Validation { field: String, message: String },

    /// An AddNew row or an additional option combination collides with a
    /// variant that already exists (or with another row in the same
    /// decision, in which case `existing_variant_id` is `None`).
    DuplicateVariant {
        staging_variant_id: Option<StagingVariantId>,
        existing_variant_id: Option<VariantId>,
        canonical_key: String,
    },

    /// LINK_EXISTING decision with nothing to commit.
    EmptyDecision,

    /// (merchant, variant) already has an offer. Retryable: re-fetch and
    /// re-plan once before surfacing.
    OfferConflict {
        merchant_id: MerchantId,
        variant_id: VariantId,
    },

    /// Staging product already reached a terminal status.
    InvalidTransition {
        staging_product_id: StagingProductId,
        from: StagingStatus,
    },

    NotFound { entity: &'static str, id: i64 },

    /// Adapter failure (connection, unexpected SQL error).
    Store(String),
}

impl CatalogError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Only offer races are worth a retry; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OfferConflict { .. })
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::DuplicateVariant { .. } => "DUPLICATE_VARIANT_CONFLICT",
            Self::EmptyDecision => "EMPTY_DECISION",
            Self::OfferConflict { .. } => "OFFER_CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { field, message } => write!(f, "invalid {field}: {message}"),
            Self::DuplicateVariant {
                staging_variant_id,
                existing_variant_id,
                canonical_key,
            } => {
                let key = if canonical_key.is_empty() {
                    "<no options>"
                } else {
                    canonical_key.as_str()
                };
                match (staging_variant_id, existing_variant_id) {
                    (Some(sv), Some(mv)) => write!(
                        f,
                        "staging variant {sv} duplicates existing variant {mv} (options: {key})"
                    ),
                    (Some(sv), None) => write!(
                        f,
                        "staging variant {sv} duplicates another new variant in this decision (options: {key})"
                    ),
                    (None, Some(mv)) => write!(
                        f,
                        "additional variant duplicates existing variant {mv} (options: {key})"
                    ),
                    (None, None) => write!(f, "duplicate variant (options: {key})"),
                }
            }
            Self::EmptyDecision => write!(
                f,
                "decision has nothing to commit: every variant is skipped and no additional variants were defined"
            ),
            Self::OfferConflict {
                merchant_id,
                variant_id,
            } => write!(
                f,
                "merchant {merchant_id} already has an offer for variant {variant_id}"
            ),
            Self::InvalidTransition {
                staging_product_id,
                from,
            } => write!(
                f,
                "staging product {staging_product_id} is already {} and cannot be decided again",
                from.as_str()
            ),
            Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            Self::Store(msg) => write!(f, "store failure: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}
