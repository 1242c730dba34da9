//! Interest Tests - Tiers, Month Counting, Breakdowns
//!
//! Critical invariants tested:
//! - Each breakdown row carries the tier of its own pledge month
//! - Partial months follow the configured rounding rule
//! - Accrued interest only covers months not yet collected
//! - Branch rate rows win over global rows

use chrono::NaiveDate;
use pawnshop_core_rs::interest::{breakdown, tier_for_month, total_of, RateBook};
use pawnshop_core_rs::lifecycle::{CreatePledgeRequest, NewItem, RenewalRequest};
use pawnshop_core_rs::models::{
    ActorContext, GoldPriceSnapshot, InterestRate, PaymentSplit, Pledge, PledgeRates, PriceSource, RateType,
};
use pawnshop_core_rs::valuation::ItemInput;
use pawnshop_core_rs::{EngineConfig, ErrorKind, MonthRounding, PawnEngine};

// ============================================================================
// Test Helpers
// ============================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn rates(overdue_bps: Option<i64>) -> PledgeRates {
    PledgeRates {
        standard_bps: 200,
        extended_bps: 250,
        overdue_bps,
        extended_after_months: 6,
    }
}

/// Engine for branch BR1 (code KL01) with 2.00% standard / 2.50% extended
fn create_engine(config: EngineConfig) -> (PawnEngine, ActorContext) {
    let ctx = ActorContext::new("teller-1", "BR1");
    let engine = PawnEngine::new(config).unwrap();
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
            GoldPriceSnapshot::new(d(2024, 1, 1), PriceSource::Manual).with_price("916", 25_000),
        )
        .unwrap();
    (engine, ctx)
}

/// Pledge with a loan of exactly 100,000 (8 g of 916 at 50%)
fn pledge_100k(engine: &PawnEngine, ctx: &ActorContext, date: NaiveDate, term_months: u32) -> Pledge {
    let mut request = CreatePledgeRequest::new("C1", date, vec![NewItem::new(ItemInput::new("ring", "916", 8_000))]);
    request.loan_percentage_bps = Some(5_000);
    request.term_months = Some(term_months);
    let pledge = engine.create_pledge(ctx, request).unwrap();
    assert_eq!(pledge.loan_amount(), 100_000);
    pledge
}

// ============================================================================
// Breakdown
// ============================================================================

#[test]
fn test_seven_month_breakdown_with_extension() {
    let config = EngineConfig {
        grace_period_days: 240,
        ..Default::default()
    };
    let (engine, ctx) = create_engine(config);
    let pledge = pledge_100k(&engine, &ctx, d(2024, 1, 1), 1);

    let quote = engine.quote_renewal(&ctx, pledge.id(), d(2024, 8, 15), Some(1)).unwrap();

    assert_eq!(quote.interest_months, 7);
    let amounts: Vec<i64> = quote.breakdown.iter().map(|r| r.amount).collect();
    assert_eq!(amounts, vec![2_000, 2_000, 2_000, 2_000, 2_000, 2_000, 2_500]);
    assert_eq!(quote.breakdown[5].cumulative_amount, 12_000);
    assert_eq!(quote.breakdown[6].rate_type, RateType::Extended);
    assert_eq!(quote.breakdown[6].month_start, d(2024, 7, 1));
    assert_eq!(quote.interest_amount, 14_500);
    assert_eq!(quote.total_payable, 14_500);
    assert_eq!(quote.interest_rate_bps, 250);
    // Previous due date + 1 month is already past, so the term restarts from the renewal date
    assert_eq!(quote.new_due_date, d(2024, 9, 15));
}

#[test]
fn test_ceiling_counts_the_partial_month() {
    let config = EngineConfig {
        month_rounding: MonthRounding::Ceiling,
        grace_period_days: 240,
        ..Default::default()
    };
    let (engine, ctx) = create_engine(config);
    let pledge = pledge_100k(&engine, &ctx, d(2024, 1, 1), 1);

    let quote = engine.quote_renewal(&ctx, pledge.id(), d(2024, 8, 15), Some(1)).unwrap();
    assert_eq!(quote.interest_months, 8);
    assert_eq!(quote.interest_amount, 12_000 + 2 * 2_500);
}

#[test]
fn test_overdue_tier_applies_after_due_date() {
    // Due 2024-04-01: month 4 starts on the due date, month 5 after it
    let rows = breakdown(100_000, &rates(Some(300)), d(2024, 1, 1), d(2024, 4, 1), 1, 5);

    assert_eq!(rows[3].rate_type, RateType::Standard);
    assert_eq!(rows[4].rate_type, RateType::Overdue);
    assert_eq!(rows[4].amount, 3_000);
    assert_eq!(total_of(&rows), 4 * 2_000 + 3_000);
}

#[test]
fn test_no_overdue_rate_falls_back_to_month_tiers() {
    let tier = tier_for_month(&rates(None), d(2024, 1, 1), d(2024, 2, 1), 9);
    assert_eq!(tier.rate_type, RateType::Extended);

    let tier = tier_for_month(&rates(None), d(2024, 1, 1), d(2024, 2, 1), 3);
    assert_eq!(tier.rate_type, RateType::Standard);
}

#[test]
fn test_row_amounts_round_half_up() {
    // 2% of 12,345 = 246.9
    let rows = breakdown(12_345, &rates(None), d(2024, 1, 1), d(2024, 7, 1), 1, 1);
    assert_eq!(rows[0].amount, 247);
}

// ============================================================================
// Effective rate and accrual through the engine
// ============================================================================

#[test]
fn test_effective_rate_moves_to_overdue_day_after_due() {
    let (engine, ctx) = create_engine(EngineConfig::default());
    engine
        .add_interest_rate(&ctx, InterestRate::new("Overdue", RateType::Overdue, 300, d(2023, 1, 1)))
        .unwrap();
    let pledge = pledge_100k(&engine, &ctx, d(2024, 1, 1), 1);

    let on_due = engine.effective_rate(pledge.id(), d(2024, 2, 1)).unwrap();
    assert_eq!(on_due.rate_type, RateType::Standard);
    assert_eq!(on_due.rate_bps, 200);

    let after_due = engine.effective_rate(pledge.id(), d(2024, 2, 2)).unwrap();
    assert_eq!(after_due.rate_type, RateType::Overdue);
    assert_eq!(after_due.rate_bps, 300);
}

#[test]
fn test_rate_before_pledge_date_rejected() {
    let (engine, ctx) = create_engine(EngineConfig::default());
    let pledge = pledge_100k(&engine, &ctx, d(2024, 3, 1), 6);

    let err = engine.effective_rate(pledge.id(), d(2024, 2, 28)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_first_day_charges_one_month() {
    let (engine, ctx) = create_engine(EngineConfig::default());
    let pledge = pledge_100k(&engine, &ctx, d(2024, 1, 1), 6);

    assert_eq!(engine.accrued_interest(pledge.id(), d(2024, 1, 1)).unwrap(), 2_000);
}

#[test]
fn test_accrual_skips_months_paid_by_renewal() {
    let (engine, ctx) = create_engine(EngineConfig::default());
    let pledge = pledge_100k(&engine, &ctx, d(2024, 1, 1), 6);

    let quote = engine.quote_renewal(&ctx, pledge.id(), d(2024, 3, 1), None).unwrap();
    assert_eq!(quote.interest_months, 2);
    engine
        .renew_pledge(
            &ctx,
            RenewalRequest {
                pledge_id: pledge.id().to_string(),
                renewal_date: d(2024, 3, 1),
                renewal_months: None,
                payment: PaymentSplit::cash(quote.total_payable),
            },
        )
        .unwrap();

    assert_eq!(engine.accrued_interest(pledge.id(), d(2024, 3, 1)).unwrap(), 0);
    assert_eq!(engine.accrued_interest(pledge.id(), d(2024, 3, 31)).unwrap(), 0);
    assert_eq!(engine.accrued_interest(pledge.id(), d(2024, 4, 1)).unwrap(), 2_000);

    let rows = engine.interest_breakdown(pledge.id(), d(2024, 5, 15)).unwrap();
    assert_eq!(rows.iter().map(|r| r.month_no).collect::<Vec<_>>(), vec![3, 4]);
}

#[test]
fn test_pledge_keeps_rates_it_was_created_with() {
    let (engine, ctx) = create_engine(EngineConfig::default());
    let pledge = pledge_100k(&engine, &ctx, d(2024, 1, 1), 6);

    engine
        .add_interest_rate(
            &ctx,
            InterestRate::new("Standard 2024b", RateType::Standard, 150, d(2024, 2, 1)).with_months(1, Some(6)),
        )
        .unwrap();

    assert_eq!(engine.effective_rate(pledge.id(), d(2024, 3, 1)).unwrap().rate_bps, 200);
    let later = pledge_100k(&engine, &ctx, d(2024, 2, 1), 6);
    assert_eq!(engine.effective_rate(later.id(), d(2024, 3, 1)).unwrap().rate_bps, 150);
}

// ============================================================================
// Rate book
// ============================================================================

#[test]
fn test_branch_rate_beats_global_rate() {
    let mut book = RateBook::new();
    book.add(InterestRate::new("Global std", RateType::Standard, 200, d(2023, 1, 1)).with_months(1, Some(3)))
        .unwrap();
    book.add(InterestRate::new("Global ext", RateType::Extended, 250, d(2023, 1, 1)))
        .unwrap();
    book.add(InterestRate::new("BR2 std", RateType::Standard, 180, d(2023, 1, 1)).for_branch("BR2"))
        .unwrap();

    let br1 = book.resolve("BR1", d(2024, 1, 1)).unwrap();
    assert_eq!(br1.standard_bps, 200);
    assert_eq!(br1.extended_after_months, 3);
    assert_eq!(br1.overdue_bps, None);

    let br2 = book.resolve("BR2", d(2024, 1, 1)).unwrap();
    assert_eq!(br2.standard_bps, 180);
    assert_eq!(br2.extended_bps, 250);
}

#[test]
fn test_missing_extended_rate_blocks_pledge() {
    let ctx = ActorContext::new("teller-1", "BR1");
    let engine = PawnEngine::new(EngineConfig::default()).unwrap();
    engine.register_branch_code(&ctx, "BR1", "KL01").unwrap();
    engine
        .add_interest_rate(&ctx, InterestRate::new("Standard", RateType::Standard, 200, d(2023, 1, 1)))
        .unwrap();
    engine
        .record_gold_price(
            &ctx,
            GoldPriceSnapshot::new(d(2024, 1, 1), PriceSource::Manual).with_price("916", 25_000),
        )
        .unwrap();

    let request = CreatePledgeRequest::new("C1", d(2024, 1, 1), vec![NewItem::new(ItemInput::new("ring", "916", 8_000))]);
    let err = engine.create_pledge(&ctx, request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.ledger().unwrap().num_pledges(), 0);
}

#[test]
fn test_negative_rate_rejected() {
    let mut book = RateBook::new();
    assert!(book
        .add(InterestRate::new("Bad", RateType::Standard, -1, d(2023, 1, 1)))
        .is_err());
    assert!(book.is_empty());
}
