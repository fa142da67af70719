//! Integration tests for the agreement and intervention lifecycles.
//!
//! These drive the engine end to end against a tempdir store: reference
//! allocation, activation guards, the eleven-state document lifecycle,
//! cascades, and the downstream outbox trigger.

mod common;

use common::*;

use pactwork::core::agreement::{AgreementStatus, AgreementType};
use pactwork::core::attachment::{codes, AttachmentRef};
use pactwork::core::intervention::{DocumentType, Intervention, InterventionStatus};
use pactwork::core::refnum;
use pactwork::engine::{
    agreement as agreement_ops, intervention as intervention_ops, AgreementEvent, EngineError,
    InterventionEvent,
};
use pactwork::sync::outbox;

#[test]
fn pca_activation_assigns_number_and_signs() {
    let world = world();
    let agreement = agreement_ops::create_agreement(
        &world.store,
        &world.ctx,
        world.partner.id,
        AgreementType::Pca,
    )
    .unwrap();
    assert_eq!(agreement.reference_number, "LEB/PCA202401");
    assert_eq!(agreement.status, AgreementStatus::Draft);

    let mut ready = agreement;
    make_agreement_ready(&mut ready, &world);
    let ready = agreement_ops::save_agreement(&world.store, &world.ctx, ready).unwrap();
    let signed = agreement_ops::transition_agreement(
        &world.store,
        &world.ctx,
        ready.id,
        AgreementEvent::Activate,
    )
    .unwrap();
    assert_eq!(signed.status, AgreementStatus::Signed);
    assert_eq!(signed.reference_number, "LEB/PCA202401");
}

#[test]
fn second_active_pca_for_same_programme_is_refused() {
    let world = world();
    signed_pca(&world);

    let mut second = agreement_ops::create_agreement(
        &world.store,
        &world.ctx,
        world.partner.id,
        AgreementType::Pca,
    )
    .unwrap();
    make_agreement_ready(&mut second, &world);
    let second = agreement_ops::save_agreement(&world.store, &world.ctx, second).unwrap();
    let result = agreement_ops::transition_agreement(
        &world.store,
        &world.ctx,
        second.id,
        AgreementEvent::Activate,
    );
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[test]
fn tempref_promotes_on_signed_commit() {
    let world = world();
    let agreement = signed_pca(&world);
    let draft = complete_draft(&world, &agreement);
    assert!(refnum::is_temp(&draft.number));

    // The placeholder survives review and signature.
    let reviewed = intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        draft.id,
        InterventionEvent::SendToReview,
    )
    .unwrap();
    assert!(refnum::is_temp(&reviewed.number));

    // Re-drive from scratch through the whole path.
    let draft2 = complete_draft(&world, &agreement);
    let signed = drive_to_signed(&world, draft2);
    assert_eq!(signed.number, "LEB/PCA202401/PD202401");
}

#[test]
fn signed_sequence_counts_only_signed_documents() {
    let world = world();
    let agreement = signed_pca(&world);

    // First document stalls in review; second signs first.
    let stalled = complete_draft(&world, &agreement);
    intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        stalled.id,
        InterventionEvent::SendToReview,
    )
    .unwrap();

    let signed = drive_to_signed(&world, complete_draft(&world, &agreement));
    assert_eq!(signed.number, "LEB/PCA202401/PD202401");

    let signed_second = drive_to_signed(&world, complete_draft(&world, &agreement));
    assert_eq!(signed_second.number, "LEB/PCA202401/PD202402");
}

#[test]
fn full_lifecycle_to_closed() {
    let world = world();
    let agreement = signed_pca(&world);
    let active = drive_to_active(&world, drive_to_signed(&world, complete_draft(&world, &agreement)));
    assert_eq!(active.status, InterventionStatus::Active);

    // Move past the end date and settle the funds.
    let late_ctx = world.ctx.clone().with_today(date(2025, 4, 1));
    let ended = intervention_ops::transition_intervention(
        &world.store,
        &late_ctx,
        active.id,
        InterventionEvent::End,
    )
    .unwrap();
    assert_eq!(ended.status, InterventionStatus::Ended);

    let mut closing: Intervention = world
        .store
        .get_required(&ended.id.to_string())
        .unwrap();
    closing.final_review_approved = true;
    closing.attachments.push(AttachmentRef::new(
        codes::FINAL_PARTNERSHIP_REVIEW,
        "final-review.pdf",
    ));
    let closing = intervention_ops::save_intervention(&world.store, &late_ctx, closing).unwrap();

    let closed = intervention_ops::transition_intervention(
        &world.store,
        &late_ctx,
        closing.id,
        InterventionEvent::Close,
    )
    .unwrap();
    assert_eq!(closed.status, InterventionStatus::Closed);
}

#[test]
fn budget_recomputes_on_save() {
    let world = world();
    let agreement = signed_pca(&world);
    let draft = complete_draft(&world, &agreement);

    // 1000 UNICEF + 500 CSO from the fixture activity.
    assert_eq!(
        draft.planned_budget.total_local,
        pactwork::core::types::Money::from_major(1500)
    );
    assert_eq!(
        draft.planned_budget.total_unicef_cash_local_wo_hq,
        pactwork::core::types::Money::from_major(1000)
    );
}

#[test]
fn cascade_suspend_hits_only_eligible_documents() {
    let world = world();
    let agreement = signed_pca(&world);

    let active = drive_to_active(&world, drive_to_signed(&world, complete_draft(&world, &agreement)));
    let draft = complete_draft(&world, &agreement);
    let mut closed = complete_draft(&world, &agreement);
    closed.status = InterventionStatus::Closed;
    let mut tx = world.store.begin("seed");
    tx.put(&closed).unwrap();
    tx.commit().unwrap();

    let suspended = agreement_ops::transition_agreement(
        &world.store,
        &world.ctx,
        agreement.id,
        AgreementEvent::Suspend,
    )
    .unwrap();
    assert_eq!(suspended.status, AgreementStatus::Suspended);

    let active: Intervention = world.store.get_required(&active.id.to_string()).unwrap();
    let draft: Intervention = world.store.get_required(&draft.id.to_string()).unwrap();
    let closed: Intervention = world.store.get_required(&closed.id.to_string()).unwrap();
    assert_eq!(active.status, InterventionStatus::Suspended);
    assert_eq!(draft.status, InterventionStatus::Draft);
    assert_eq!(closed.status, InterventionStatus::Closed);
}

#[test]
fn suspended_agreement_blocks_signing() {
    let world = world();
    let agreement = signed_pca(&world);
    let draft = complete_draft(&world, &agreement);

    agreement_ops::transition_agreement(
        &world.store,
        &world.ctx,
        agreement.id,
        AgreementEvent::Suspend,
    )
    .unwrap();

    // Drive to signature, then watch the sign guard refuse.
    let mut i = intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        draft.id,
        InterventionEvent::SendToReview,
    )
    .unwrap();
    let mut review = pactwork::core::intervention::InterventionReview::new(
        pactwork::core::intervention::ReviewType::Prc,
    );
    review.overall_approval = Some(true);
    i.reviews.push(review);
    let i = intervention_ops::save_intervention(&world.store, &world.ctx, i).unwrap();
    let mut i = intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        i.id,
        InterventionEvent::SendToSignature,
    )
    .unwrap();
    i.signed_by_unicef_date = Some(date(2024, 5, 1));
    i.unicef_signatory = Some(pactwork::core::types::UserId::new());
    i.signed_by_partner_date = Some(date(2024, 5, 2));
    i.partner_authorized_officer_signatory = Some(pactwork::core::types::StaffMemberId::new());
    i.attachments
        .push(AttachmentRef::new(codes::SIGNED_PD, "pd.pdf"));
    let i = intervention_ops::save_intervention(&world.store, &world.ctx, i).unwrap();

    let refused =
        intervention_ops::transition_intervention(&world.store, &world.ctx, i.id, InterventionEvent::Sign);
    assert!(matches!(refused, Err(EngineError::Validation(_))));
}

#[test]
fn signing_and_activating_enqueue_uploads() {
    let world = world();
    let agreement = signed_pca(&world);
    let signed = drive_to_signed(&world, complete_draft(&world, &agreement));
    assert_eq!(outbox::pending(&world.store).unwrap().len(), 1);

    // Activation while a pending record exists does not duplicate it.
    drive_to_active(&world, signed);
    assert_eq!(outbox::pending(&world.store).unwrap().len(), 1);
}

#[test]
fn ssfa_document_under_ssfa_agreement_only() {
    let world = world();
    let ssfa = agreement_ops::create_agreement(
        &world.store,
        &world.ctx,
        world.partner.id,
        AgreementType::Ssfa,
    )
    .unwrap();

    let ok = intervention_ops::create_intervention(
        &world.store,
        &world.ctx,
        ssfa.id,
        DocumentType::Ssfa,
        "Small-scale response",
    );
    assert!(ok.is_ok());

    let pca = signed_pca(&world);
    let wrong = intervention_ops::create_intervention(
        &world.store,
        &world.ctx,
        pca.id,
        DocumentType::Ssfa,
        "Misfiled",
    );
    assert!(matches!(wrong, Err(EngineError::Validation(_))));
}
