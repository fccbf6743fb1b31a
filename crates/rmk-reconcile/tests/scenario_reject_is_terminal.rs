mod common;

use common::*;
use rmk_catalog::*;
use rmk_reconcile::{submit_reconciliation_decision, CatalogStore};

#[tokio::test]
async fn second_reject_is_an_invalid_transition() {
    let f = fixture(vec![staging_variant(&[("Color", "Red")], 4500)]);
    let id = f.staging.product.id;

    let first = submit_reconciliation_decision(
        &f.store,
        id,
        &ReconciliationDecision::reject("counterfeit listing"),
        &pricing(),
    )
    .await
    .unwrap();
    assert_eq!(first.status, Some(StagingStatus::Rejected));
    assert!(first.created_offer_ids.is_empty());

    let err = submit_reconciliation_decision(
        &f.store,
        id,
        &ReconciliationDecision::reject("again"),
        &pricing(),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        CatalogError::InvalidTransition {
            staging_product_id: id,
            from: StagingStatus::Rejected,
        }
    );

    let st = f.store.load_staging(id).await.unwrap();
    assert_eq!(st.product.rejection_reason.as_deref(), Some("counterfeit listing"));
}

#[tokio::test]
async fn approved_product_cannot_be_rejected() {
    let f = fixture(vec![staging_variant(&[("Color", "Red")], 4500)]);
    let id = f.staging.product.id;
    let sv = f.staging.variants[0].id;

    let link = ReconciliationDecision::LinkExisting(LinkExistingDecision {
        master_product_id: f.product_id,
        variant_mapping: vec![VariantRowChoice::link(sv, f.red_variant_id)],
        ..Default::default()
    });
    submit_reconciliation_decision(&f.store, id, &link, &pricing())
        .await
        .unwrap();

    let err = submit_reconciliation_decision(
        &f.store,
        id,
        &ReconciliationDecision::reject("late"),
        &pricing(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
}
