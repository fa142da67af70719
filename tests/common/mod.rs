//! Shared fixtures for the integration suites.
//!
//! Builds a tempdir-backed store seeded with a CSO partner, a country
//! programme, and helpers to drive agreements and interventions through
//! their lifecycles.
#![allow(dead_code)]

use chrono::NaiveDate;
use tempfile::TempDir;

use pactwork::core::agreement::{Agreement, AgreementType};
use pactwork::core::attachment::{codes, AttachmentRef};
use pactwork::core::country::CountryProgramme;
use pactwork::core::intervention::{
    DocumentType, FundsReservation, Intervention, InterventionReview, ReviewType,
};
use pactwork::core::partner::{CsoType, Partner, PartnerType};
use pactwork::core::permissions::Role;
use pactwork::core::results::{Activity, LowerResult, ResultLink};
use pactwork::core::types::{
    FrsId, Money, OfficeId, SectionId, StaffMemberId, TenantCode, UserId, VendorNumber,
};
use pactwork::engine::{
    agreement as agreement_ops, intervention as intervention_ops, Actor, AgreementEvent, Context,
    InterventionEvent,
};
use pactwork::store::Store;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub struct World {
    pub _dir: TempDir,
    pub store: Store,
    pub ctx: Context,
    pub partner: Partner,
    pub country_programme: CountryProgramme,
}

/// A store with one CSO partner and one 2024-2026 country programme.
pub fn world() -> World {
    let dir = TempDir::new().expect("create temp dir");
    let store = Store::open(dir.path()).expect("open store");
    let ctx = Context::new(
        Actor::new("pm@example.org", vec![Role::PartnershipManager]),
        TenantCode::new("LEB").expect("tenant code"),
        "USD",
    )
    .with_today(date(2024, 6, 1));

    let mut partner = Partner::new(
        VendorNumber::new("2500212391").expect("vendor number"),
        "Relief Works",
        PartnerType::CivilSocietyOrganization,
    );
    partner.cso_type = Some(CsoType::National);

    let country_programme = CountryProgramme::new(
        "Country Programme 2024-2026",
        "0060/A0/07",
        date(2024, 1, 1),
        date(2026, 12, 31),
    );

    let mut tx = store.begin("seed");
    tx.put(&partner).expect("seed partner");
    tx.put(&country_programme).expect("seed country programme");
    tx.commit().expect("commit seed");

    World {
        _dir: dir,
        store,
        ctx,
        partner,
        country_programme,
    }
}

/// Fill in everything the activation guard wants on a draft agreement.
pub fn make_agreement_ready(agreement: &mut Agreement, world: &World) {
    agreement.country_programme = Some(world.country_programme.id);
    agreement.start = Some(date(2024, 3, 1));
    agreement.end = Some(date(2026, 12, 31));
    agreement.signed_by_unicef_date = Some(date(2024, 2, 28));
    agreement.signed_by = Some(UserId::new());
    agreement.signed_by_partner_date = Some(date(2024, 2, 27));
    agreement.partner_manager = Some(StaffMemberId::new());
    agreement.authorized_officers.push(StaffMemberId::new());
    agreement.attached_agreement = Some(AttachmentRef::new(codes::SIGNED_AGREEMENT, "pca.pdf"));
}

/// A signed PCA for the world's partner.
pub fn signed_pca(world: &World) -> Agreement {
    let mut agreement = agreement_ops::create_agreement(
        &world.store,
        &world.ctx,
        world.partner.id,
        AgreementType::Pca,
    )
    .expect("create agreement");
    make_agreement_ready(&mut agreement, world);
    let agreement =
        agreement_ops::save_agreement(&world.store, &world.ctx, agreement).expect("save agreement");
    agreement_ops::transition_agreement(
        &world.store,
        &world.ctx,
        agreement.id,
        AgreementEvent::Activate,
    )
    .expect("activate agreement")
}

/// A draft PD with enough structure to pass the review guard.
pub fn complete_draft(world: &World, agreement: &Agreement) -> Intervention {
    let mut intervention = intervention_ops::create_intervention(
        &world.store,
        &world.ctx,
        agreement.id,
        DocumentType::Pd,
        "Emergency WASH",
    )
    .expect("create intervention");
    intervention.start = Some(date(2024, 3, 1));
    intervention.end = Some(date(2025, 3, 1));
    intervention.sections.push(SectionId::new());
    intervention.offices.push(OfficeId::new());

    let mut link = ResultLink::new(Some("CP-OUTPUT-1".to_string()));
    let mut lower = LowerResult::new("Improved access to safe water");
    let mut activity = Activity::new("Distribute kits");
    activity.unicef_cash = Money::from_major(1000);
    activity.cso_cash = Money::from_major(500);
    lower.activities.push(activity);
    link.lower_results.push(lower);
    intervention.result_links.push(link);

    intervention_ops::save_intervention(&world.store, &world.ctx, intervention)
        .expect("save intervention")
}

/// A settled funds reservation totalling `major` currency units.
pub fn settled_fr(major: i64) -> FundsReservation {
    FundsReservation {
        id: FrsId::new(),
        fr_number: "FR-0060-1".into(),
        currency: "USD".into(),
        total_amt: Money::from_major(major),
        intervention_amt: Money::from_major(major),
        outstanding_amt: Money::zero(),
        actual_amt: Money::from_major(major),
        start_date: Some(date(2024, 3, 1)),
        end_date: Some(date(2025, 3, 1)),
    }
}

/// Drive a complete draft through review and signature to signed.
pub fn drive_to_signed(world: &World, intervention: Intervention) -> Intervention {
    let mut i = intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        intervention.id,
        InterventionEvent::SendToReview,
    )
    .expect("send to review");

    let mut review = InterventionReview::new(ReviewType::Prc);
    review.overall_approval = Some(true);
    i.reviews.push(review);
    let mut i =
        intervention_ops::save_intervention(&world.store, &world.ctx, i).expect("save review");

    i = intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        i.id,
        InterventionEvent::SendToSignature,
    )
    .expect("send to signature");

    i.signed_by_unicef_date = Some(date(2024, 5, 1));
    i.unicef_signatory = Some(UserId::new());
    i.signed_by_partner_date = Some(date(2024, 5, 2));
    i.partner_authorized_officer_signatory = Some(StaffMemberId::new());
    i.attachments
        .push(AttachmentRef::new(codes::SIGNED_PD, "pd.pdf"));
    let i = intervention_ops::save_intervention(&world.store, &world.ctx, i).expect("save signed");

    intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        i.id,
        InterventionEvent::Sign,
    )
    .expect("sign")
}

/// Drive a signed document to active (adds a settled FR).
pub fn drive_to_active(world: &World, intervention: Intervention) -> Intervention {
    let mut i: Intervention = world
        .store
        .get_required(&intervention.id.to_string())
        .expect("reload");
    i.frs.push(settled_fr(1500));
    let i = intervention_ops::save_intervention(&world.store, &world.ctx, i).expect("save frs");
    intervention_ops::transition_intervention(
        &world.store,
        &world.ctx,
        i.id,
        InterventionEvent::Activate,
    )
    .expect("activate")
}
