//! rmk-reconcile
//!
//! Commits admin reconciliation decisions.
//!
//! - [`CatalogStore`]: load snapshots, apply a [`rmk_catalog::CommitPlan`]
//!   atomically (re-validating under the store's lock)
//! - [`MemoryCatalog`]: in-process store used by tests and the daemon's
//!   memory backend
//! - [`processor`]: `match_variants` / `submit_reconciliation_decision`,
//!   including pricing of new offers and the single retry on offer races

mod memory;
pub mod processor;
mod store;

pub use memory::{CatalogState, MediaRow, MemoryCatalog};
pub use processor::{match_variants, submit_reconciliation_decision, OfferPricing};
pub use store::CatalogStore;
