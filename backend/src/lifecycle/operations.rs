//! Lifecycle operations over the ledger
//!
//! Each function mutates the ledger it is given (the engine passes a
//! clone) and pushes the events to publish after commit. A returned error
//! means the caller must discard the ledger copy.
//!
//! CRITICAL: All money values are i64 (minor units)

use super::{ensure_transition, LifecycleAction, LifecycleError};
use crate::core::calendar::{add_days, add_months};
use crate::core::money::div_round_half_up;
use crate::error::EngineError;
use crate::interest::{total_of, InterestPolicy};
use crate::models::context::ActorContext;
use crate::models::event::Event;
use crate::models::gold_price::GoldPriceSnapshot;
use crate::models::item::{ItemStatus, PledgeItem};
use crate::models::payment::PaymentSplit;
use crate::models::pledge::{Cancellation, NewPledge, Pledge, PledgeStatus};
use crate::models::renewal::{
    AuctionItem, AuctionStatus, InterestBreakdownRow, RecordStatus, Redemption, Renewal,
};
use crate::models::state::LedgerState;
use crate::orchestrator::config::EngineConfig;
use crate::sequence::SequenceKind;
use crate::valuation::{loan_amount, value_items, ItemInput};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

// ============================================================================
// Requests and quotes
// ============================================================================

/// One item of a new pledge, optionally placed straight into a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub input: ItemInput,
    pub slot_id: Option<String>,
}

impl NewItem {
    pub fn new(input: ItemInput) -> Self {
        Self { input, slot_id: None }
    }

    pub fn in_slot(mut self, slot_id: &str) -> Self {
        self.slot_id = Some(slot_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePledgeRequest {
    pub customer_id: String,
    /// Owner of the collateral when different from the customer
    pub owner_id: Option<String>,
    pub pledge_date: NaiveDate,
    pub items: Vec<NewItem>,
    /// Defaults to the configured loan percentage
    pub loan_percentage_bps: Option<i64>,
    /// Defaults to the configured term
    pub term_months: Option<u32>,
    /// Defaults to the whole payout in cash
    pub payout: Option<PaymentSplit>,
    /// Defaults to the latest recorded snapshot on or before the pledge date
    pub gold_prices: Option<GoldPriceSnapshot>,
}

impl CreatePledgeRequest {
    pub fn new(customer_id: &str, pledge_date: NaiveDate, items: Vec<NewItem>) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            owner_id: None,
            pledge_date,
            items,
            loan_percentage_bps: None,
            term_months: None,
            payout: None,
            gold_prices: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalRequest {
    pub pledge_id: String,
    pub renewal_date: NaiveDate,
    /// Defaults to the configured term
    pub renewal_months: Option<u32>,
    pub payment: PaymentSplit,
}

/// What a renewal on a date would charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalQuote {
    pub pledge_id: String,
    pub renewal_date: NaiveDate,
    pub renewal_months: u32,
    pub previous_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
    pub new_grace_end_date: NaiveDate,
    pub interest_rate_bps: i64,
    pub interest_months: u32,
    pub breakdown: Vec<InterestBreakdownRow>,
    pub interest_amount: i64,
    pub handling_fee: i64,
    pub total_payable: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub pledge_id: String,
    pub redemption_date: NaiveDate,
    /// Items to redeem; `None` redeems every stored item
    pub item_ids: Option<Vec<String>>,
    pub other_charges: i64,
    pub payment: PaymentSplit,
    /// Hand items back now (slots freed) or keep them until collection
    pub release_items: bool,
}

/// What a redemption on a date would charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionQuote {
    pub pledge_id: String,
    pub redemption_date: NaiveDate,
    pub item_ids: Vec<String>,
    pub is_partial: bool,
    pub principal_amount: i64,
    pub interest_rate_bps: i64,
    pub interest_months: u32,
    pub breakdown: Vec<InterestBreakdownRow>,
    pub interest_amount: i64,
    pub handling_fee: i64,
    pub other_charges: i64,
    pub total_payable: i64,
}

// ============================================================================
// Guards
// ============================================================================

fn pledge_for<'a>(
    ledger: &'a LedgerState,
    pledge_id: &str,
    ctx: &ActorContext,
) -> Result<&'a Pledge, EngineError> {
    let pledge = ledger
        .pledges
        .get(pledge_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("pledge {}", pledge_id)))?;
    if pledge.branch_id() != ctx.branch_id {
        return Err(LifecycleError::BranchMismatch {
            pledge_id: pledge_id.to_string(),
            pledge_branch: pledge.branch_id().to_string(),
            actor_branch: ctx.branch_id.clone(),
        }
        .into());
    }
    Ok(pledge)
}

fn illegal(pledge: &Pledge, action: LifecycleAction, detail: String) -> EngineError {
    LifecycleError::IllegalTransition {
        pledge_id: pledge.id().to_string(),
        from: pledge.status(),
        action,
        detail: Some(detail),
    }
    .into()
}

fn check_payment(payment: PaymentSplit, expected: i64) -> Result<(), EngineError> {
    if payment.covers(expected) {
        Ok(())
    } else {
        Err(LifecycleError::PaymentMismatch {
            expected,
            cash: payment.cash,
            transfer: payment.transfer,
        }
        .into())
    }
}

fn next_number(
    ledger: &mut LedgerState,
    config: &EngineConfig,
    branch_id: &str,
    kind: SequenceKind,
    date: NaiveDate,
) -> Result<String, EngineError> {
    Ok(ledger
        .sequences
        .next(branch_id, kind, date.year(), config.sequence_max_retries)?)
}

/// Pledge status once items changed: redeemed when nothing is left stored
fn settle_status(ledger: &mut LedgerState, pledge_id: &str, closed_status: PledgeStatus) -> PledgeStatus {
    let any_stored = ledger
        .items
        .values()
        .any(|i| i.pledge_id() == pledge_id && i.is_stored());

    match ledger.pledges.get_mut(pledge_id) {
        Some(pledge) => {
            if !any_stored {
                pledge.set_status(closed_status);
            }
            pledge.status()
        }
        None => closed_status,
    }
}

// ============================================================================
// Create
// ============================================================================

/// Value the items, number the documents, open the pledge, place the items
pub fn create_pledge(
    ledger: &mut LedgerState,
    config: &EngineConfig,
    ctx: &ActorContext,
    request: CreatePledgeRequest,
    events: &mut Vec<Event>,
) -> Result<Pledge, EngineError> {
    let branch_id = ctx.branch_id.as_str();
    let date = request.pledge_date;
    ledger.day_ends.ensure_open(branch_id, date)?;

    if request.customer_id.trim().is_empty() {
        return Err(LifecycleError::Validation("customer is required".to_string()).into());
    }

    let prices = match request.gold_prices {
        Some(prices) => prices,
        None => ledger
            .gold_prices
            .latest_as_of(date)
            .cloned()
            .ok_or_else(|| LifecycleError::Validation(format!("no gold price recorded on or before {}", date)))?,
    };

    let inputs: Vec<ItemInput> = request.items.iter().map(|i| i.input.clone()).collect();
    let valuation = value_items(&inputs, &prices)?;

    let loan_percentage_bps = request
        .loan_percentage_bps
        .unwrap_or(config.default_loan_percentage_bps);
    let loan = loan_amount(valuation.net_value, loan_percentage_bps, config.max_loan_percentage_bps)?;
    if loan <= 0 {
        return Err(LifecycleError::Validation("loan amount must be positive".to_string()).into());
    }

    let handling_fee = config.pledge_handling_fee;
    let payout_amount = loan - handling_fee;
    if payout_amount < 0 {
        return Err(LifecycleError::Validation(format!(
            "handling fee {} exceeds loan amount {}",
            handling_fee, loan
        ))
        .into());
    }
    let payout = request.payout.unwrap_or(PaymentSplit::cash(payout_amount));
    check_payment(payout, payout_amount)?;

    let term_months = request.term_months.unwrap_or(config.default_term_months);
    if term_months == 0 {
        return Err(LifecycleError::Validation("term must be at least one month".to_string()).into());
    }
    let due_date = add_months(date, term_months);
    let grace_end_date = add_days(due_date, config.grace_period_days);

    let rates = ledger.rates.resolve(branch_id, date)?;

    let pledge_no = next_number(ledger, config, branch_id, SequenceKind::Pledge, date)?;
    let receipt_no = next_number(ledger, config, branch_id, SequenceKind::Receipt, date)?;

    debug!(
        branch_id,
        pledge_no = %pledge_no,
        net_value = valuation.net_value,
        loan_amount = loan,
        "Pledge valued"
    );

    let mut pledge = Pledge::open(NewPledge {
        branch_id: branch_id.to_string(),
        customer_id: request.customer_id,
        owner_id: request.owner_id,
        pledge_no,
        receipt_no,
        total_gross_weight_mg: valuation.total_gross_weight_mg,
        total_weight_mg: valuation.total_weight_mg,
        gross_value: valuation.gross_value,
        total_deduction: valuation.total_deduction,
        net_value: valuation.net_value,
        loan_percentage_bps,
        loan_amount: loan,
        handling_fee,
        payout,
        rates,
        pledge_date: date,
        term_months,
        due_date,
        grace_end_date,
        gold_prices: prices,
        created_by: ctx.user_id.clone(),
    });

    let mut placements = Vec::new();
    for (index, (request_item, item_valuation)) in request.items.iter().zip(&valuation.items).enumerate() {
        let item = PledgeItem::from_valuation(
            pledge.id(),
            index as u32 + 1,
            item_valuation,
            request_item.input.description.clone(),
        );
        pledge.attach_item(item.id());
        if let Some(slot_id) = &request_item.slot_id {
            placements.push((item.id().to_string(), slot_id.clone()));
        }
        ledger.items.insert(item.id().to_string(), item);
    }
    ledger.pledges.insert(pledge.id().to_string(), pledge.clone());

    for (item_id, slot_id) in placements {
        let item = ledger
            .items
            .get_mut(&item_id)
            .ok_or_else(|| LifecycleError::ConsistencyViolation(format!("item {} vanished", item_id)))?;
        ledger
            .storage
            .assign(item, &slot_id, branch_id, &ctx.user_id, date)?;
        events.push(Event::SlotAssigned {
            date,
            branch_id: branch_id.to_string(),
            item_id,
            slot_id,
        });
    }

    events.push(Event::PledgeCreated {
        date,
        branch_id: branch_id.to_string(),
        pledge_id: pledge.id().to_string(),
        pledge_no: pledge.pledge_no().to_string(),
        receipt_no: pledge.receipt_no().to_string(),
        loan_amount: pledge.loan_amount(),
        payout_amount: pledge.payout_amount(),
        item_count: pledge.item_ids().len(),
    });

    Ok(pledge)
}

// ============================================================================
// Renewal
// ============================================================================

/// Price a renewal without recording it
pub fn quote_renewal(
    ledger: &LedgerState,
    config: &EngineConfig,
    ctx: &ActorContext,
    pledge_id: &str,
    renewal_date: NaiveDate,
    renewal_months: Option<u32>,
) -> Result<RenewalQuote, EngineError> {
    let pledge = pledge_for(ledger, pledge_id, ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::Renew)?;
    if !pledge.is_within_grace(renewal_date) {
        return Err(illegal(
            pledge,
            LifecycleAction::Renew,
            format!("grace period ended {}", pledge.grace_end_date()),
        ));
    }

    let renewal_months = renewal_months.unwrap_or(config.default_term_months);
    if renewal_months == 0 {
        return Err(LifecycleError::Validation("renewal must cover at least one month".to_string()).into());
    }

    let policy = InterestPolicy::new(config.month_rounding);
    let breakdown = policy.renewal_breakdown(pledge, renewal_date)?;
    let rate = policy.effective_rate(pledge, renewal_date)?;
    let interest_amount = total_of(&breakdown);
    let handling_fee = config.renewal_handling_fee;

    let previous_due_date = pledge.due_date();
    let extended = add_months(previous_due_date, renewal_months);
    let new_due_date = if extended > renewal_date {
        extended
    } else {
        add_months(renewal_date, renewal_months)
    };

    Ok(RenewalQuote {
        pledge_id: pledge.id().to_string(),
        renewal_date,
        renewal_months,
        previous_due_date,
        new_due_date,
        new_grace_end_date: add_days(new_due_date, config.grace_period_days),
        interest_rate_bps: rate.rate_bps,
        interest_months: breakdown.len() as u32,
        breakdown,
        interest_amount,
        handling_fee,
        total_payable: interest_amount + handling_fee,
    })
}

/// Collect interest for the unpaid months and push the due date out
pub fn renew_pledge(
    ledger: &mut LedgerState,
    config: &EngineConfig,
    ctx: &ActorContext,
    request: RenewalRequest,
    events: &mut Vec<Event>,
) -> Result<Renewal, EngineError> {
    let quote = quote_renewal(
        ledger,
        config,
        ctx,
        &request.pledge_id,
        request.renewal_date,
        request.renewal_months,
    )?;
    ledger.day_ends.ensure_open(&ctx.branch_id, request.renewal_date)?;
    check_payment(request.payment, quote.total_payable)?;

    let renewal_no = next_number(ledger, config, &ctx.branch_id, SequenceKind::Renewal, request.renewal_date)?;

    let pledge = ledger
        .pledges
        .get_mut(&request.pledge_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("pledge {}", request.pledge_id)))?;
    let old_status = pledge.status();
    pledge.apply_renewal(quote.new_due_date, quote.new_grace_end_date, quote.interest_months);

    let renewal = Renewal {
        id: uuid::Uuid::new_v4().to_string(),
        pledge_id: pledge.id().to_string(),
        branch_id: pledge.branch_id().to_string(),
        renewal_no,
        renewal_count: pledge.renewal_count(),
        renewal_date: request.renewal_date,
        renewal_months: quote.renewal_months,
        previous_due_date: quote.previous_due_date,
        new_due_date: quote.new_due_date,
        new_grace_end_date: quote.new_grace_end_date,
        interest_rate_bps: quote.interest_rate_bps,
        interest_months: quote.interest_months,
        interest_amount: quote.interest_amount,
        handling_fee: quote.handling_fee,
        total_payable: quote.total_payable,
        payment: request.payment,
        status: RecordStatus::Completed,
        breakdown: quote.breakdown,
        processed_by: ctx.user_id.clone(),
    };
    ledger.renewals.insert(renewal.id.clone(), renewal.clone());

    events.push(Event::PledgeRenewed {
        date: renewal.renewal_date,
        branch_id: renewal.branch_id.clone(),
        pledge_id: renewal.pledge_id.clone(),
        renewal_id: renewal.id.clone(),
        renewal_no: renewal.renewal_no.clone(),
        previous_due_date: renewal.previous_due_date,
        new_due_date: renewal.new_due_date,
        interest_amount: renewal.interest_amount,
        total_payable: renewal.total_payable,
        old_status,
    });

    Ok(renewal)
}

// ============================================================================
// Redemption
// ============================================================================

/// Price a redemption without recording it
pub fn quote_redemption(
    ledger: &LedgerState,
    config: &EngineConfig,
    ctx: &ActorContext,
    pledge_id: &str,
    redemption_date: NaiveDate,
    item_ids: Option<&[String]>,
    other_charges: i64,
) -> Result<RedemptionQuote, EngineError> {
    let pledge = pledge_for(ledger, pledge_id, ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::Redeem)?;
    if other_charges < 0 {
        return Err(LifecycleError::Validation("other charges must not be negative".to_string()).into());
    }

    let stored: Vec<&PledgeItem> = ledger
        .items_of(pledge_id)
        .into_iter()
        .filter(|i| i.is_stored())
        .collect();

    let selected: Vec<&PledgeItem> = match item_ids {
        None => stored.clone(),
        Some(ids) => {
            if ids.is_empty() {
                return Err(LifecycleError::Validation("no items selected".to_string()).into());
            }
            let unique: BTreeSet<&String> = ids.iter().collect();
            if unique.len() != ids.len() {
                return Err(LifecycleError::Validation("item selected twice".to_string()).into());
            }
            ids.iter()
                .map(|id| {
                    stored.iter().copied().find(|i| i.id() == id).ok_or_else(|| {
                        LifecycleError::Validation(format!(
                            "item {} is not a stored item of pledge {}",
                            id, pledge_id
                        ))
                    })
                })
                .collect::<Result<_, _>>()?
        }
    };
    if selected.is_empty() {
        return Err(LifecycleError::ConsistencyViolation(format!(
            "open pledge {} has no stored items",
            pledge_id
        ))
        .into());
    }

    let is_partial = selected.len() < stored.len();
    let principal_amount = if is_partial {
        let remaining_net: i64 = stored.iter().map(|i| i.net_value()).sum();
        let redeemed_net: i64 = selected.iter().map(|i| i.net_value()).sum();
        if remaining_net > 0 {
            div_round_half_up(
                pledge.outstanding_principal() as i128 * redeemed_net as i128,
                remaining_net as i128,
            )
        } else {
            0
        }
    } else {
        pledge.outstanding_principal()
    };

    let policy = InterestPolicy::new(config.month_rounding);
    let breakdown = policy.unpaid_breakdown_on(pledge, principal_amount, redemption_date)?;
    let rate = policy.effective_rate(pledge, redemption_date)?;
    let interest_amount = total_of(&breakdown);
    let handling_fee = config.redemption_handling_fee;

    Ok(RedemptionQuote {
        pledge_id: pledge.id().to_string(),
        redemption_date,
        item_ids: selected.iter().map(|i| i.id().to_string()).collect(),
        is_partial,
        principal_amount,
        interest_rate_bps: rate.rate_bps,
        interest_months: breakdown.len() as u32,
        breakdown,
        interest_amount,
        handling_fee,
        other_charges,
        total_payable: principal_amount + interest_amount + handling_fee + other_charges,
    })
}

/// Repay principal and interest for some or all items
pub fn redeem_pledge(
    ledger: &mut LedgerState,
    config: &EngineConfig,
    ctx: &ActorContext,
    request: RedemptionRequest,
    events: &mut Vec<Event>,
) -> Result<Redemption, EngineError> {
    let quote = quote_redemption(
        ledger,
        config,
        ctx,
        &request.pledge_id,
        request.redemption_date,
        request.item_ids.as_deref(),
        request.other_charges,
    )?;
    let date = request.redemption_date;
    ledger.day_ends.ensure_open(&ctx.branch_id, date)?;
    check_payment(request.payment, quote.total_payable)?;

    let redemption_no = next_number(ledger, config, &ctx.branch_id, SequenceKind::Redemption, date)?;
    let redemption_id = uuid::Uuid::new_v4().to_string();

    let old_status = {
        let pledge = ledger
            .pledges
            .get_mut(&request.pledge_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("pledge {}", request.pledge_id)))?;
        pledge.reduce_principal(quote.principal_amount);
        pledge.status()
    };

    for item_id in &quote.item_ids {
        let item = ledger
            .items
            .get_mut(item_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("item {}", item_id)))?;
        item.link_redemption(&redemption_id);
        if request.release_items {
            if let Some(slot_id) = ledger.storage.release(item, Some("redeemed"), &ctx.user_id, date)? {
                events.push(Event::SlotReleased {
                    date,
                    branch_id: ctx.branch_id.clone(),
                    item_id: item_id.clone(),
                    slot_id,
                });
            }
            item.set_status(ItemStatus::Released);
        } else {
            item.set_status(ItemStatus::Redeemed);
        }
    }

    let new_status = settle_status(ledger, &request.pledge_id, PledgeStatus::Redeemed);

    let redemption = Redemption {
        id: redemption_id,
        pledge_id: quote.pledge_id.clone(),
        branch_id: ctx.branch_id.clone(),
        redemption_no,
        redemption_date: date,
        is_partial: quote.is_partial,
        redeemed_item_ids: quote.item_ids.clone(),
        principal_amount: quote.principal_amount,
        interest_months: quote.interest_months,
        interest_rate_bps: quote.interest_rate_bps,
        interest_amount: quote.interest_amount,
        handling_fee: quote.handling_fee,
        other_charges: quote.other_charges,
        total_payable: quote.total_payable,
        payment: request.payment,
        status: RecordStatus::Completed,
        breakdown: quote.breakdown,
        items_released: request.release_items,
        released_on: request.release_items.then_some(date),
        released_by: request.release_items.then(|| ctx.user_id.clone()),
        processed_by: ctx.user_id.clone(),
    };
    ledger.redemptions.insert(redemption.id.clone(), redemption.clone());

    events.push(Event::PledgeRedeemed {
        date,
        branch_id: ctx.branch_id.clone(),
        pledge_id: redemption.pledge_id.clone(),
        redemption_id: redemption.id.clone(),
        redemption_no: redemption.redemption_no.clone(),
        is_partial: redemption.is_partial,
        item_ids: redemption.redeemed_item_ids.clone(),
        total_payable: redemption.total_payable,
        old_status,
        new_status,
    });
    if request.release_items {
        events.push(Event::ItemsReleased {
            date,
            branch_id: ctx.branch_id.clone(),
            pledge_id: redemption.pledge_id.clone(),
            redemption_id: redemption.id.clone(),
            item_ids: redemption.redeemed_item_ids.clone(),
        });
    }

    Ok(redemption)
}

/// Hand over items of a redemption that kept them in storage
pub fn release_redemption_items(
    ledger: &mut LedgerState,
    ctx: &ActorContext,
    redemption_id: &str,
    release_date: NaiveDate,
    events: &mut Vec<Event>,
) -> Result<Redemption, EngineError> {
    let (pledge_id, item_ids, already_released) = {
        let redemption = ledger
            .redemptions
            .get(redemption_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("redemption {}", redemption_id)))?;
        (
            redemption.pledge_id.clone(),
            redemption.redeemed_item_ids.clone(),
            redemption.items_released,
        )
    };

    let pledge = pledge_for(ledger, &pledge_id, ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::ReleaseItems)?;
    if already_released {
        return Err(illegal(
            pledge,
            LifecycleAction::ReleaseItems,
            format!("items of {} already released", redemption_id),
        ));
    }
    ledger.day_ends.ensure_open(&ctx.branch_id, release_date)?;

    for item_id in &item_ids {
        let item = ledger
            .items
            .get_mut(item_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("item {}", item_id)))?;
        if item.status() != ItemStatus::Redeemed {
            return Err(LifecycleError::ConsistencyViolation(format!(
                "item {} of redemption {} is {}",
                item_id,
                redemption_id,
                item.status().as_str()
            ))
            .into());
        }
        if let Some(slot_id) = ledger.storage.release(item, Some("collected"), &ctx.user_id, release_date)? {
            events.push(Event::SlotReleased {
                date: release_date,
                branch_id: ctx.branch_id.clone(),
                item_id: item_id.clone(),
                slot_id,
            });
        }
        item.set_status(ItemStatus::Released);
    }

    let redemption = ledger
        .redemptions
        .get_mut(redemption_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("redemption {}", redemption_id)))?;
    redemption.items_released = true;
    redemption.released_on = Some(release_date);
    redemption.released_by = Some(ctx.user_id.clone());

    events.push(Event::ItemsReleased {
        date: release_date,
        branch_id: ctx.branch_id.clone(),
        pledge_id,
        redemption_id: redemption_id.to_string(),
        item_ids,
    });

    Ok(redemption.clone())
}

// ============================================================================
// Overdue, forfeiture, auction
// ============================================================================

/// Store `overdue` on every open pledge of the caller's branch past its due date
///
/// Returns the ids of the pledges changed.
pub fn mark_overdue(
    ledger: &mut LedgerState,
    ctx: &ActorContext,
    as_of: NaiveDate,
    events: &mut Vec<Event>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for pledge in ledger.pledges.values_mut().filter(|p| {
        p.branch_id() == ctx.branch_id
            && super::can_transition(p.status(), LifecycleAction::MarkOverdue)
            && p.is_overdue(as_of)
    }) {
        let old_status = pledge.status();
        pledge.set_status(PledgeStatus::Overdue);
        changed.push(pledge.id().to_string());
        events.push(Event::PledgeMarkedOverdue {
            date: as_of,
            branch_id: ctx.branch_id.clone(),
            pledge_id: pledge.id().to_string(),
            old_status,
        });
    }
    changed
}

/// Declare the collateral forfeit after grace expiry
pub fn forfeit_pledge(
    ledger: &mut LedgerState,
    ctx: &ActorContext,
    pledge_id: &str,
    as_of: NaiveDate,
    reason: &str,
    events: &mut Vec<Event>,
) -> Result<Pledge, EngineError> {
    let pledge = pledge_for(ledger, pledge_id, ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::Forfeit)?;
    if !pledge.is_forfeitable(as_of) {
        return Err(illegal(
            pledge,
            LifecycleAction::Forfeit,
            format!("grace period runs until {}", pledge.grace_end_date()),
        ));
    }
    ledger.day_ends.ensure_open(&ctx.branch_id, as_of)?;

    let pledge = ledger
        .pledges
        .get_mut(pledge_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("pledge {}", pledge_id)))?;
    let old_status = pledge.status();
    pledge.mark_forfeited(as_of);

    events.push(Event::PledgeForfeited {
        date: as_of,
        branch_id: ctx.branch_id.clone(),
        pledge_id: pledge_id.to_string(),
        old_status,
        reason: reason.to_string(),
    });
    Ok(pledge.clone())
}

/// Offer one stored item of a forfeited pledge at auction
pub fn list_for_auction(
    ledger: &mut LedgerState,
    config: &EngineConfig,
    ctx: &ActorContext,
    item_id: &str,
    listed_on: NaiveDate,
    reserve_price: i64,
    events: &mut Vec<Event>,
) -> Result<AuctionItem, EngineError> {
    let item = ledger
        .items
        .get(item_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("item {}", item_id)))?;
    let pledge = pledge_for(ledger, item.pledge_id(), ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::ListForAuction)?;

    if !item.is_stored() {
        return Err(LifecycleError::Validation(format!(
            "item {} is {}, only stored items can be auctioned",
            item_id,
            item.status().as_str()
        ))
        .into());
    }
    if reserve_price < 0 {
        return Err(LifecycleError::Validation("reserve price must not be negative".to_string()).into());
    }
    if ledger.auction_items.values().any(|a| a.item_id == item_id) {
        return Err(LifecycleError::Validation(format!("item {} is already listed", item_id)).into());
    }
    let pledge_id = pledge.id().to_string();
    ledger.day_ends.ensure_open(&ctx.branch_id, listed_on)?;

    let auction_no = next_number(ledger, config, &ctx.branch_id, SequenceKind::Auction, listed_on)?;
    let auction_item = AuctionItem {
        id: uuid::Uuid::new_v4().to_string(),
        pledge_id: pledge_id.clone(),
        item_id: item_id.to_string(),
        branch_id: ctx.branch_id.clone(),
        auction_no,
        listed_on,
        reserve_price,
        status: AuctionStatus::Listed,
        sale_price: None,
        sold_on: None,
        buyer_ref: None,
    };
    ledger
        .auction_items
        .insert(auction_item.id.clone(), auction_item.clone());

    events.push(Event::AuctionListed {
        date: listed_on,
        branch_id: ctx.branch_id.clone(),
        pledge_id,
        auction_item_id: auction_item.id.clone(),
        auction_no: auction_item.auction_no.clone(),
        item_id: item_id.to_string(),
        reserve_price,
    });
    Ok(auction_item)
}

/// Record the sale of a listed item; the pledge closes when no item is left stored
pub fn record_auction_sale(
    ledger: &mut LedgerState,
    ctx: &ActorContext,
    auction_item_id: &str,
    sold_on: NaiveDate,
    sale_price: i64,
    buyer_ref: Option<String>,
    events: &mut Vec<Event>,
) -> Result<AuctionItem, EngineError> {
    let listing = ledger
        .auction_items
        .get(auction_item_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("auction item {}", auction_item_id)))?
        .clone();
    let pledge = pledge_for(ledger, &listing.pledge_id, ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::RecordAuctionSale)?;

    if listing.status != AuctionStatus::Listed {
        return Err(illegal(
            pledge,
            LifecycleAction::RecordAuctionSale,
            format!("{} is already sold", listing.auction_no),
        ));
    }
    if sale_price <= 0 {
        return Err(LifecycleError::Validation("sale price must be positive".to_string()).into());
    }
    if sold_on < listing.listed_on {
        return Err(LifecycleError::Validation(format!(
            "sale date {} is before listing date {}",
            sold_on, listing.listed_on
        ))
        .into());
    }
    ledger.day_ends.ensure_open(&ctx.branch_id, sold_on)?;

    let item = ledger
        .items
        .get_mut(&listing.item_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("item {}", listing.item_id)))?;
    if !item.is_stored() {
        return Err(LifecycleError::ConsistencyViolation(format!(
            "listed item {} is {}",
            listing.item_id,
            item.status().as_str()
        ))
        .into());
    }
    if let Some(slot_id) = ledger.storage.release(item, Some("auctioned"), &ctx.user_id, sold_on)? {
        events.push(Event::SlotReleased {
            date: sold_on,
            branch_id: ctx.branch_id.clone(),
            item_id: listing.item_id.clone(),
            slot_id,
        });
    }
    item.set_status(ItemStatus::Auctioned);

    let new_status = settle_status(ledger, &listing.pledge_id, PledgeStatus::Auctioned);

    let sold = ledger
        .auction_items
        .get_mut(auction_item_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("auction item {}", auction_item_id)))?;
    sold.status = AuctionStatus::Sold;
    sold.sale_price = Some(sale_price);
    sold.sold_on = Some(sold_on);
    sold.buyer_ref = buyer_ref;

    events.push(Event::AuctionSold {
        date: sold_on,
        branch_id: ctx.branch_id.clone(),
        pledge_id: listing.pledge_id.clone(),
        auction_item_id: auction_item_id.to_string(),
        item_id: listing.item_id.clone(),
        sale_price,
        new_status,
    });
    Ok(sold.clone())
}

// ============================================================================
// Cancellation
// ============================================================================

/// Reverse a pledge that has no payments recorded against it
pub fn cancel_pledge(
    ledger: &mut LedgerState,
    ctx: &ActorContext,
    pledge_id: &str,
    cancelled_on: NaiveDate,
    reason: &str,
    events: &mut Vec<Event>,
) -> Result<Pledge, EngineError> {
    let pledge = pledge_for(ledger, pledge_id, ctx)?;
    ensure_transition(pledge.id(), pledge.status(), LifecycleAction::Cancel)?;

    if reason.trim().is_empty() {
        return Err(LifecycleError::Validation("cancellation reason is required".to_string()).into());
    }
    if pledge.renewal_count() > 0 {
        return Err(illegal(pledge, LifecycleAction::Cancel, "a renewal payment is recorded".to_string()));
    }
    if ledger.redemptions.values().any(|r| r.pledge_id == pledge_id) {
        return Err(illegal(pledge, LifecycleAction::Cancel, "a redemption payment is recorded".to_string()));
    }
    if ledger.auction_items.values().any(|a| a.pledge_id == pledge_id) {
        return Err(illegal(pledge, LifecycleAction::Cancel, "items are listed for auction".to_string()));
    }
    ledger.day_ends.ensure_open(&ctx.branch_id, cancelled_on)?;

    let item_ids = pledge.item_ids().to_vec();
    for item_id in &item_ids {
        let item = ledger
            .items
            .get_mut(item_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("item {}", item_id)))?;
        if let Some(slot_id) = ledger.storage.release(item, Some("cancelled"), &ctx.user_id, cancelled_on)? {
            events.push(Event::SlotReleased {
                date: cancelled_on,
                branch_id: ctx.branch_id.clone(),
                item_id: item_id.clone(),
                slot_id,
            });
        }
        item.set_status(ItemStatus::Cancelled);
    }

    let pledge = ledger
        .pledges
        .get_mut(pledge_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("pledge {}", pledge_id)))?;
    let old_status = pledge.status();
    pledge.mark_cancelled(Cancellation {
        cancelled_on,
        cancelled_by: ctx.user_id.clone(),
        reason: reason.to_string(),
    });

    events.push(Event::PledgeCancelled {
        date: cancelled_on,
        branch_id: ctx.branch_id.clone(),
        pledge_id: pledge_id.to_string(),
        old_status,
        reason: reason.to_string(),
    });
    Ok(pledge.clone())
}
