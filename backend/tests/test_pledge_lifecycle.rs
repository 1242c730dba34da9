//! Pledge Lifecycle Tests - Create, Renew, Redeem, Forfeit, Auction, Cancel
//!
//! Critical invariants tested:
//! - A failed operation leaves the ledger exactly as it was
//! - Status transitions follow the lifecycle table
//! - Partial redemption keeps the loan running on the remaining items
//! - Redeemed items keep their slot until handed over
//! - Sink failures never undo a committed change

use chrono::NaiveDate;
use pawnshop_core_rs::events::{EventSink, MemorySink, SinkError};
use pawnshop_core_rs::lifecycle::{CreatePledgeRequest, LifecycleError, NewItem, RedemptionRequest, RenewalRequest};
use pawnshop_core_rs::models::{
    ActorContext, Event, GoldPriceSnapshot, InterestRate, ItemStatus, LocationAction, PaymentSplit, Pledge,
    PledgeStatus, PriceSource, RateType, StoneDeduction,
};
use pawnshop_core_rs::sequence::SequenceKind;
use pawnshop_core_rs::storage::StorageError;
use pawnshop_core_rs::valuation::ItemInput;
use pawnshop_core_rs::{EngineConfig, EngineError, ErrorKind, PawnEngine};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Fixture {
    engine: PawnEngine,
    ctx: ActorContext,
    box_id: String,
    /// Slot ids ordered by slot number
    slots: Vec<String>,
    sink: Arc<MemorySink>,
}

fn create_fixture(config: EngineConfig) -> Fixture {
    let ctx = ActorContext::new("teller-1", "BR1");
    let sink = Arc::new(MemorySink::new());
    let mut engine = PawnEngine::new(config).unwrap();
    engine.register_sink(sink.clone());

    engine.register_branch_code(&ctx, "BR1", "KL01").unwrap();
    engine
        .add_interest_rate(
            &ctx,
            InterestRate::new("Standard", RateType::Standard, 200, d(2023, 1, 1)).with_months(1, Some(6)),
        )
        .unwrap();
    engine
        .add_interest_rate(
            &ctx,
            InterestRate::new("Extended", RateType::Extended, 250, d(2023, 1, 1)).with_months(7, None),
        )
        .unwrap();
    engine
        .record_gold_price(
            &ctx,
            GoldPriceSnapshot::new(d(2024, 1, 1), PriceSource::Manual)
                .with_price("999", 30_000)
                .with_price("916", 25_000),
        )
        .unwrap();

    let vault = engine.add_vault(&ctx, "V1", "Main vault").unwrap();
    let storage_box = engine.add_box(&ctx, &vault.id, "B1", 4).unwrap();
    let mut slots = engine.slots_in_box(&storage_box.id).unwrap();
    slots.sort_by_key(|s| s.slot_number);

    Fixture {
        engine,
        ctx,
        box_id: storage_box.id,
        slots: slots.into_iter().map(|s| s.id).collect(),
        sink,
    }
}

/// Ring of 10 g 916 (value 250,000, loan 187,500) placed in `slot_id`
fn create_ring_pledge(f: &Fixture, date: NaiveDate, term_months: u32, slot_id: &str) -> Pledge {
    let mut request = CreatePledgeRequest::new(
        "C1",
        date,
        vec![NewItem::new(ItemInput::new("ring", "916", 10_000)).in_slot(slot_id)],
    );
    request.term_months = Some(term_months);
    f.engine.create_pledge(&f.ctx, request).unwrap()
}

fn redeem(f: &Fixture, pledge_id: &str, date: NaiveDate, item_ids: Option<Vec<String>>, release: bool) -> i64 {
    let quote = f
        .engine
        .quote_redemption(&f.ctx, pledge_id, date, item_ids.as_deref(), 0)
        .unwrap();
    f.engine
        .redeem_pledge(
            &f.ctx,
            RedemptionRequest {
                pledge_id: pledge_id.to_string(),
                redemption_date: date,
                item_ids,
                other_charges: 0,
                payment: PaymentSplit::cash(quote.total_payable),
                release_items: release,
            },
        )
        .unwrap();
    quote.total_payable
}

struct FailingSink;

impl EventSink for FailingSink {
    fn name(&self) -> &str {
        "printer"
    }

    fn publish(&self, _event: &Event, _ctx: &ActorContext) -> Result<(), SinkError> {
        Err(SinkError {
            sink: "printer".to_string(),
            reason: "out of paper".to_string(),
        })
    }
}

// ============================================================================
// Create
// ============================================================================

#[test]
fn test_create_pledge_values_numbers_and_places_items() {
    let f = create_fixture(EngineConfig {
        pledge_handling_fee: 2_500,
        ..Default::default()
    });

    let request = CreatePledgeRequest::new(
        "C1",
        d(2024, 1, 1),
        vec![
            NewItem::new(ItemInput::new("ring", "916", 10_000)).in_slot(&f.slots[0]),
            NewItem::new(
                ItemInput::new("chain", "999", 5_000)
                    .with_deduction(StoneDeduction::Amount { amount: 10_000 })
                    .with_description("chain with pendant"),
            ),
        ],
    );
    let pledge = f.engine.create_pledge(&f.ctx, request).unwrap();

    assert_eq!(pledge.pledge_no(), "PG-KL01-2024-0001");
    assert_eq!(pledge.receipt_no(), "RC-KL01-2024-0001");
    assert_eq!(pledge.status(), PledgeStatus::Active);
    assert_eq!(pledge.net_value(), 390_000);
    assert_eq!(pledge.loan_amount(), 292_500);
    assert_eq!(pledge.payout_amount(), 290_000);
    assert_eq!(pledge.outstanding_principal(), 292_500);
    assert_eq!(pledge.due_date(), d(2024, 7, 1));
    assert_eq!(pledge.grace_end_date(), d(2024, 7, 31));

    let ring = f.engine.item(&pledge.item_ids()[0]).unwrap().unwrap();
    let chain = f.engine.item(&pledge.item_ids()[1]).unwrap().unwrap();
    assert_eq!(ring.slot_id(), Some(f.slots[0].as_str()));
    assert_eq!(chain.slot_id(), None);
    assert_eq!(chain.description(), Some("chain with pendant"));
    assert_eq!(chain.line_no(), 2);

    assert_eq!(f.engine.storage_box(&f.box_id).unwrap().unwrap().occupied_slots, 1);
    let history = f.engine.location_history(ring.id()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, LocationAction::Stored);

    assert_eq!(f.sink.count_of("PledgeCreated"), 1);
    assert_eq!(f.sink.count_of("SlotAssigned"), 1);
}

#[test]
fn test_payout_split_must_match_payout() {
    let f = create_fixture(EngineConfig::default());
    let mut request = CreatePledgeRequest::new("C1", d(2024, 1, 1), vec![NewItem::new(ItemInput::new("ring", "916", 10_000))]);
    request.payout = Some(PaymentSplit::new(100_000, 100_000));

    let err = f.engine.create_pledge(&f.ctx, request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(
        err,
        EngineError::Lifecycle(LifecycleError::PaymentMismatch { expected: 187_500, .. })
    ));

    let mut request = CreatePledgeRequest::new("C1", d(2024, 1, 1), vec![NewItem::new(ItemInput::new("ring", "916", 10_000))]);
    request.payout = Some(PaymentSplit::new(100_000, 87_500));
    let pledge = f.engine.create_pledge(&f.ctx, request).unwrap();
    assert_eq!(pledge.payout().transfer, 87_500);
}

#[test]
fn test_failed_placement_rolls_back_numbers_and_items() {
    let f = create_fixture(EngineConfig::default());
    f.engine.set_slot_active(&f.ctx, &f.slots[0], false).unwrap();

    let request = CreatePledgeRequest::new(
        "C1",
        d(2024, 1, 1),
        vec![NewItem::new(ItemInput::new("ring", "916", 10_000)).in_slot(&f.slots[0])],
    );
    let err = f.engine.create_pledge(&f.ctx, request).unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::SlotInactive(_))));

    let ledger = f.engine.ledger().unwrap();
    assert_eq!(ledger.num_pledges(), 0);
    assert!(ledger.items().is_empty());
    assert_eq!(ledger.sequences().last_value("BR1", SequenceKind::Pledge, 2024), 0);
    assert_eq!(f.sink.count_of("PledgeCreated"), 0);
}

#[test]
fn test_loan_percentage_above_cap_rejected() {
    let f = create_fixture(EngineConfig::default());
    let mut request = CreatePledgeRequest::new("C1", d(2024, 1, 1), vec![NewItem::new(ItemInput::new("ring", "916", 10_000))]);
    request.loan_percentage_bps = Some(9_500);

    let err = f.engine.create_pledge(&f.ctx, request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_no_gold_price_before_pledge_date() {
    let f = create_fixture(EngineConfig::default());
    let request = CreatePledgeRequest::new("C1", d(2023, 12, 31), vec![NewItem::new(ItemInput::new("ring", "916", 10_000))]);

    let err = f.engine.create_pledge(&f.ctx, request).unwrap_err();
    assert!(matches!(err, EngineError::Lifecycle(LifecycleError::Validation(_))));
}

// ============================================================================
// Renewal
// ============================================================================

#[test]
fn test_renewal_pushes_due_date_and_blocks_cancel() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);

    let quote = f.engine.quote_renewal(&f.ctx, pledge.id(), d(2024, 3, 1), None).unwrap();
    assert_eq!(quote.interest_months, 2);
    assert_eq!(quote.total_payable, 7_500);

    let short = f.engine.renew_pledge(
        &f.ctx,
        RenewalRequest {
            pledge_id: pledge.id().to_string(),
            renewal_date: d(2024, 3, 1),
            renewal_months: None,
            payment: PaymentSplit::cash(7_000),
        },
    );
    assert!(matches!(
        short,
        Err(EngineError::Lifecycle(LifecycleError::PaymentMismatch { .. }))
    ));

    let renewal = f
        .engine
        .renew_pledge(
            &f.ctx,
            RenewalRequest {
                pledge_id: pledge.id().to_string(),
                renewal_date: d(2024, 3, 1),
                renewal_months: None,
                payment: PaymentSplit::new(5_000, 2_500),
            },
        )
        .unwrap();
    assert_eq!(renewal.renewal_no, "RN-KL01-2024-0001");
    assert_eq!(renewal.renewal_count, 1);
    assert_eq!(renewal.previous_due_date, d(2024, 7, 1));
    assert_eq!(renewal.new_due_date, d(2025, 1, 1));

    let renewed = f.engine.pledge(pledge.id()).unwrap().unwrap();
    assert_eq!(renewed.status(), PledgeStatus::Renewed);
    assert_eq!(renewed.renewal_count(), 1);
    assert_eq!(renewed.interest_months_paid(), 2);
    assert_eq!(renewed.due_date(), d(2025, 1, 1));
    assert_eq!(f.engine.renewals_of(pledge.id()).unwrap().len(), 1);

    let err = f
        .engine
        .cancel_pledge(&f.ctx, pledge.id(), d(2024, 3, 2), "entered twice")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

#[test]
fn test_overdue_pledge_renews_back_to_renewed() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 1, &f.slots[0]);

    assert_eq!(pledge.display_status(d(2024, 2, 10)), PledgeStatus::Overdue);
    assert_eq!(f.engine.mark_overdue(&f.ctx, d(2024, 2, 10)).unwrap(), 1);
    assert_eq!(
        f.engine.pledge(pledge.id()).unwrap().unwrap().status(),
        PledgeStatus::Overdue
    );

    let quote = f.engine.quote_renewal(&f.ctx, pledge.id(), d(2024, 2, 10), None).unwrap();
    assert_eq!(quote.interest_months, 1);
    assert_eq!(quote.interest_amount, 3_750);
    assert_eq!(quote.new_due_date, d(2024, 8, 1));

    f.engine
        .renew_pledge(
            &f.ctx,
            RenewalRequest {
                pledge_id: pledge.id().to_string(),
                renewal_date: d(2024, 2, 10),
                renewal_months: None,
                payment: PaymentSplit::cash(quote.total_payable),
            },
        )
        .unwrap();

    assert_eq!(
        f.engine.pledge(pledge.id()).unwrap().unwrap().status(),
        PledgeStatus::Renewed
    );
    assert_eq!(f.engine.mark_overdue(&f.ctx, d(2024, 2, 11)).unwrap(), 0);
}

#[test]
fn test_renewal_after_grace_rejected() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 1, &f.slots[0]);
    assert_eq!(pledge.grace_end_date(), d(2024, 3, 2));

    assert!(f.engine.quote_renewal(&f.ctx, pledge.id(), d(2024, 3, 2), None).is_ok());
    let err = f
        .engine
        .quote_renewal(&f.ctx, pledge.id(), d(2024, 3, 3), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

// ============================================================================
// Redemption
// ============================================================================

#[test]
fn test_partial_then_full_redemption() {
    let f = create_fixture(EngineConfig::default());
    let request = CreatePledgeRequest::new(
        "C1",
        d(2024, 1, 1),
        vec![
            NewItem::new(ItemInput::new("ring", "916", 10_000)).in_slot(&f.slots[0]),
            NewItem::new(ItemInput::new("bangle", "916", 30_000)).in_slot(&f.slots[1]),
        ],
    );
    let pledge = f.engine.create_pledge(&f.ctx, request).unwrap();
    assert_eq!(pledge.loan_amount(), 750_000);
    let ring_id = pledge.item_ids()[0].clone();
    let bangle_id = pledge.item_ids()[1].clone();

    // Ring carries a quarter of the net value
    let quote = f
        .engine
        .quote_redemption(&f.ctx, pledge.id(), d(2024, 3, 10), Some(std::slice::from_ref(&ring_id)), 0)
        .unwrap();
    assert!(quote.is_partial);
    assert_eq!(quote.principal_amount, 187_500);
    assert_eq!(quote.interest_months, 2);
    assert_eq!(quote.interest_amount, 7_500);
    assert_eq!(quote.total_payable, 195_000);

    redeem(&f, pledge.id(), d(2024, 3, 10), Some(vec![ring_id.clone()]), true);

    let ring = f.engine.item(&ring_id).unwrap().unwrap();
    assert_eq!(ring.status(), ItemStatus::Released);
    assert_eq!(ring.slot_id(), None);
    assert!(f.engine.slot(&f.slots[0]).unwrap().unwrap().is_free());

    let open = f.engine.pledge(pledge.id()).unwrap().unwrap();
    assert_eq!(open.status(), PledgeStatus::Active);
    assert_eq!(open.outstanding_principal(), 562_500);

    let paid = redeem(&f, pledge.id(), d(2024, 4, 1), None, false);
    assert_eq!(paid, 562_500 + 33_750);

    let closed = f.engine.pledge(pledge.id()).unwrap().unwrap();
    assert_eq!(closed.status(), PledgeStatus::Redeemed);
    assert_eq!(closed.outstanding_principal(), 0);

    // Paid for but still in the vault
    let bangle = f.engine.item(&bangle_id).unwrap().unwrap();
    assert_eq!(bangle.status(), ItemStatus::Redeemed);
    assert_eq!(bangle.slot_id(), Some(f.slots[1].as_str()));

    let redemptions = f.engine.redemptions_of(pledge.id()).unwrap();
    assert_eq!(redemptions.len(), 2);
    let full = redemptions.iter().find(|r| !r.is_partial).unwrap();
    assert_eq!(full.redemption_no, "RD-KL01-2024-0002");
    assert!(!full.items_released);

    let released = f
        .engine
        .release_redemption_items(&f.ctx, &full.id, d(2024, 4, 2))
        .unwrap();
    assert!(released.items_released);
    assert_eq!(released.released_on, Some(d(2024, 4, 2)));
    assert_eq!(
        f.engine.item(&bangle_id).unwrap().unwrap().status(),
        ItemStatus::Released
    );
    assert!(f.engine.slot(&f.slots[1]).unwrap().unwrap().is_free());
    assert_eq!(f.engine.storage_box(&f.box_id).unwrap().unwrap().occupied_slots, 0);

    let again = f
        .engine
        .release_redemption_items(&f.ctx, &full.id, d(2024, 4, 3))
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::IllegalTransition);
    assert_eq!(f.sink.count_of("ItemsReleased"), 2);
}

#[test]
fn test_redeemed_pledge_cannot_be_redeemed_again() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);
    redeem(&f, pledge.id(), d(2024, 1, 20), None, true);

    let err = f
        .engine
        .quote_redemption(&f.ctx, pledge.id(), d(2024, 1, 21), None, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

#[test]
fn test_redemption_selection_must_be_stored_items_of_pledge() {
    let f = create_fixture(EngineConfig::default());
    let first = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);
    let second = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[1]);

    let foreign = vec![second.item_ids()[0].clone()];
    let err = f
        .engine
        .quote_redemption(&f.ctx, first.id(), d(2024, 2, 1), Some(foreign.as_slice()), 0)
        .unwrap_err();
    assert!(matches!(err, EngineError::Lifecycle(LifecycleError::Validation(_))));

    let twice = vec![first.item_ids()[0].clone(), first.item_ids()[0].clone()];
    assert!(f
        .engine
        .quote_redemption(&f.ctx, first.id(), d(2024, 2, 1), Some(twice.as_slice()), 0)
        .is_err());
}

#[test]
fn test_other_branch_cannot_touch_pledge() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);
    let other = ActorContext::new("teller-9", "BR2");

    let err = f
        .engine
        .quote_redemption(&other, pledge.id(), d(2024, 2, 1), None, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(
        err,
        EngineError::Lifecycle(LifecycleError::BranchMismatch { .. })
    ));

    assert!(f
        .engine
        .cancel_pledge(&other, pledge.id(), d(2024, 1, 2), "wrong branch")
        .is_err());
    assert_eq!(
        f.engine.pledge(pledge.id()).unwrap().unwrap().status(),
        PledgeStatus::Active
    );
}

// ============================================================================
// Forfeiture and auction
// ============================================================================

#[test]
fn test_forfeit_list_and_sell() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 1, &f.slots[0]);
    let item_id = pledge.item_ids()[0].clone();

    let early = f
        .engine
        .forfeit_pledge(&f.ctx, pledge.id(), d(2024, 3, 2), "unclaimed")
        .unwrap_err();
    assert_eq!(early.kind(), ErrorKind::IllegalTransition);

    let forfeited = f
        .engine
        .forfeit_pledge(&f.ctx, pledge.id(), d(2024, 3, 3), "unclaimed")
        .unwrap();
    assert_eq!(forfeited.status(), PledgeStatus::Forfeited);
    assert_eq!(forfeited.forfeited_on(), Some(d(2024, 3, 3)));

    let renew = f.engine.quote_renewal(&f.ctx, pledge.id(), d(2024, 3, 3), None);
    assert!(renew.is_err());

    let listing = f
        .engine
        .list_for_auction(&f.ctx, &item_id, d(2024, 3, 10), 200_000)
        .unwrap();
    assert_eq!(listing.auction_no, "AU-KL01-0001");
    assert!(f
        .engine
        .list_for_auction(&f.ctx, &item_id, d(2024, 3, 10), 200_000)
        .is_err());

    let cancel = f
        .engine
        .cancel_pledge(&f.ctx, pledge.id(), d(2024, 3, 11), "mistake")
        .unwrap_err();
    assert_eq!(cancel.kind(), ErrorKind::IllegalTransition);

    let backdated = f
        .engine
        .record_auction_sale(&f.ctx, &listing.id, d(2024, 3, 9), 260_000, None)
        .unwrap_err();
    assert_eq!(backdated.kind(), ErrorKind::Validation);

    let sold = f
        .engine
        .record_auction_sale(&f.ctx, &listing.id, d(2024, 3, 20), 260_000, Some("buyer-7".to_string()))
        .unwrap();
    assert_eq!(sold.sale_price, Some(260_000));

    assert_eq!(
        f.engine.item(&item_id).unwrap().unwrap().status(),
        ItemStatus::Auctioned
    );
    assert!(f.engine.slot(&f.slots[0]).unwrap().unwrap().is_free());
    assert_eq!(
        f.engine.pledge(pledge.id()).unwrap().unwrap().status(),
        PledgeStatus::Auctioned
    );

    let resale = f
        .engine
        .record_auction_sale(&f.ctx, &listing.id, d(2024, 3, 21), 270_000, None)
        .unwrap_err();
    assert_eq!(resale.kind(), ErrorKind::IllegalTransition);
}

#[test]
fn test_open_pledge_cannot_be_listed() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);

    let err = f
        .engine
        .list_for_auction(&f.ctx, &pledge.item_ids()[0], d(2024, 2, 1), 100_000)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancel_frees_slots() {
    let f = create_fixture(EngineConfig::default());
    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);

    assert!(matches!(
        f.engine.cancel_pledge(&f.ctx, pledge.id(), d(2024, 1, 1), "  "),
        Err(EngineError::Lifecycle(LifecycleError::Validation(_)))
    ));

    let cancelled = f
        .engine
        .cancel_pledge(&f.ctx, pledge.id(), d(2024, 1, 1), "customer changed mind")
        .unwrap();
    assert_eq!(cancelled.status(), PledgeStatus::Cancelled);
    assert_eq!(cancelled.cancellation().unwrap().reason, "customer changed mind");

    let item = f.engine.item(&pledge.item_ids()[0]).unwrap().unwrap();
    assert_eq!(item.status(), ItemStatus::Cancelled);
    assert!(f.engine.slot(&f.slots[0]).unwrap().unwrap().is_free());

    let twice = f
        .engine
        .cancel_pledge(&f.ctx, pledge.id(), d(2024, 1, 1), "again")
        .unwrap_err();
    assert_eq!(twice.kind(), ErrorKind::IllegalTransition);
}

// ============================================================================
// Event sinks
// ============================================================================

#[test]
fn test_failing_sink_does_not_undo_commit() {
    let mut f = create_fixture(EngineConfig::default());
    f.engine.register_sink(Arc::new(FailingSink));
    let later = Arc::new(MemorySink::new());
    f.engine.register_sink(later.clone());

    let pledge = create_ring_pledge(&f, d(2024, 1, 1), 6, &f.slots[0]);

    assert_eq!(f.engine.ledger().unwrap().num_pledges(), 1);
    assert!(f.engine.pledge(pledge.id()).unwrap().is_some());
    assert_eq!(later.count_of("PledgeCreated"), 1);
    assert_eq!(later.audit_records().len(), later.events().len());
}
