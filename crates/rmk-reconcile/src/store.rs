use rmk_catalog::{
    CatalogError, CommitOutcome, CommitPlan, MasterSnapshot, ProductId, StagingProductId,
    StagingSnapshot,
};

/// Persistence seam for reconciliation.
///
/// `apply` must be all-or-nothing and must call
/// [`CommitPlan::revalidate`] against state read under its own lock or
/// transaction before writing anything.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_staging(&self, id: StagingProductId) -> Result<StagingSnapshot, CatalogError>;

    async fn load_master(&self, id: ProductId) -> Result<MasterSnapshot, CatalogError>;

    async fn apply(&self, plan: &CommitPlan) -> Result<CommitOutcome, CatalogError>;
}
