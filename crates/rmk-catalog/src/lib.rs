//! rmk-catalog
//!
//! Catalog reconciliation core.
//!
//! - Option attribute canonicalisation and cross-product expansion
//! - Staging → master variant matching with duplicate detection
//! - Reconciliation decisions (REJECT | CREATE_NEW | LINK_EXISTING)
//! - Commit planning: a decision is turned into a fully validated
//!   [`CommitPlan`] before any store is touched
//!
//! Deterministic, pure logic. No IO. Persistence lives behind the store
//! adapters (rmk-reconcile memory store, rmk-db Postgres store).

mod decision;
mod error;
mod matcher;
mod options;
mod plan;
mod slug;
mod types;

pub use decision::{
    CreateNewDecision, DecisionKind, LinkExistingDecision, ReconciliationDecision, RejectDecision,
};
pub use error::CatalogError;
pub use matcher::{
    additional_variants, match_variants, propose, suggest_link, validate_mapping, MatchReason,
    MatchSummary, ValidatedMapping, VariantChoice, VariantMatchResult, VariantProposal,
    VariantRowChoice,
};
pub use options::{
    canonical_key, cross_product, OptionAttributes, OptionDefinition, OptionDimension,
    KEY_DELIMITER, RESERVED_SKU_KEY,
};
pub use plan::{
    plan_decision, ApprovalPlan, CommitOutcome, CommitPlan, NewMasterProduct, NewVariant,
    OfferLink, OfferSeed, PlannedOutcome, ProductTarget,
};
pub use slug::{is_url_safe_slug, slugify};
pub use types::*;

/// Currency used for merchant offers when the caller does not configure one.
pub const DEFAULT_CURRENCY: &str = "INR";
