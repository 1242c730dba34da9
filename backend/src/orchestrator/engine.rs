//! Pawn Engine - transactional wrapper over the ledger
//!
//! Every mutating call runs as one transaction:
//!
//! ```text
//! 1. Lock the ledger
//! 2. Clone it and apply the operation to the clone
//! 3. Check cross-entity invariants on the clone
//! 4. Swap the clone in (commit) or drop it (rollback)
//! 5. Release the lock
//! 6. Publish the collected events to every sink
//! ```
//!
//! Sinks run after commit and outside the lock; their failures are logged
//! and never undo a committed change.
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use pawnshop_core_rs::models::{ActorContext, GoldPriceSnapshot, InterestRate, PriceSource, RateType};
//! use pawnshop_core_rs::lifecycle::{CreatePledgeRequest, NewItem};
//! use pawnshop_core_rs::orchestrator::{EngineConfig, PawnEngine};
//! use pawnshop_core_rs::valuation::ItemInput;
//!
//! let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let ctx = ActorContext::new("U1", "BR1");
//! let engine = PawnEngine::new(EngineConfig::default()).unwrap();
//!
//! engine.register_branch_code(&ctx, "BR1", "KL01").unwrap();
//! engine.add_interest_rate(&ctx, InterestRate::new("std", RateType::Standard, 200, day)).unwrap();
//! engine.add_interest_rate(&ctx, InterestRate::new("ext", RateType::Extended, 250, day)).unwrap();
//! engine
//!     .record_gold_price(&ctx, GoldPriceSnapshot::new(day, PriceSource::Manual).with_price("916", 25_000))
//!     .unwrap();
//!
//! let request = CreatePledgeRequest::new("C1", day, vec![NewItem::new(ItemInput::new("ring", "916", 10_000))]);
//! let pledge = engine.create_pledge(&ctx, request).unwrap();
//! assert_eq!(pledge.pledge_no(), "PG-KL01-2024-0001");
//! assert_eq!(pledge.loan_amount(), 187_500);
//! ```

use crate::day_end::{aggregate, DayEndError};
use crate::error::EngineError;
use crate::events::{EventDispatcher, EventSink};
use crate::interest::{EffectiveRate, InterestPolicy};
use crate::lifecycle::operations::{self, CreatePledgeRequest, RedemptionQuote, RedemptionRequest, RenewalQuote, RenewalRequest};
use crate::lifecycle::LifecycleError;
use crate::models::context::ActorContext;
use crate::models::day_end::{DailyTotals, DayEndReport};
use crate::models::event::Event;
use crate::models::gold_price::GoldPriceSnapshot;
use crate::models::item::PledgeItem;
use crate::models::pledge::Pledge;
use crate::models::rates::InterestRate;
use crate::models::renewal::{AuctionItem, InterestBreakdownRow, Redemption, Renewal};
use crate::models::state::LedgerState;
use crate::models::storage::{ItemLocationHistory, Slot, StorageBox, Vault};
use crate::orchestrator::checkpoint::LedgerSnapshot;
use crate::orchestrator::config::EngineConfig;
use crate::sequence::SequenceKind;
use crate::storage::AssignOutcome;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

// ============================================================================
// Engine
// ============================================================================

/// Transactional pledge engine for one or more branches
pub struct PawnEngine {
    config: EngineConfig,
    policy: InterestPolicy,
    ledger: Mutex<LedgerState>,
    dispatcher: EventDispatcher,
}

impl PawnEngine {
    /// Create an engine over an empty ledger
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_ledger(config, LedgerState::new())
    }

    fn with_ledger(config: EngineConfig, ledger: LedgerState) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            policy: InterestPolicy::new(config.month_rounding),
            config,
            ledger: Mutex::new(ledger),
            dispatcher: EventDispatcher::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> InterestPolicy {
        self.policy
    }

    /// Add a collaborator notified after every commit
    pub fn register_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.dispatcher.register(sink);
    }

    // ========================================================================
    // Transaction plumbing
    // ========================================================================

    fn transact<T, F>(&self, ctx: &ActorContext, operation: &'static str, apply: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut LedgerState, &mut Vec<Event>) -> Result<T, EngineError>,
    {
        let (value, events) = {
            let mut ledger = self.ledger.lock().map_err(|_| EngineError::LockPoisoned)?;
            let mut working = ledger.clone();
            let mut events = Vec::new();

            let value = match apply(&mut working, &mut events) {
                Ok(value) => value,
                Err(e) => {
                    warn!(operation, branch_id = %ctx.branch_id, user_id = %ctx.user_id, error = %e, "Transaction rolled back");
                    return Err(e);
                }
            };

            if let Err(violation) = working.check_consistency() {
                error!(operation, branch_id = %ctx.branch_id, violation = %violation, "Consistency check failed, transaction rolled back");
                return Err(LifecycleError::ConsistencyViolation(violation).into());
            }

            *ledger = working;
            (value, events)
        };

        debug!(operation, events = events.len(), "Transaction committed");
        self.dispatcher.dispatch(&events, ctx);
        Ok(value)
    }

    fn read<T>(&self, view: impl FnOnce(&LedgerState) -> T) -> Result<T, EngineError> {
        let ledger = self.ledger.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(view(&ledger))
    }

    /// Clone of the whole ledger
    pub fn ledger(&self) -> Result<LedgerState, EngineError> {
        self.read(LedgerState::clone)
    }

    // ========================================================================
    // Setup
    // ========================================================================

    pub fn register_branch_code(&self, ctx: &ActorContext, branch_id: &str, code: &str) -> Result<(), EngineError> {
        self.transact(ctx, "register_branch_code", |ledger, _| {
            Ok(ledger.sequences.register_branch(branch_id, code)?)
        })?;
        info!(branch_id, code, "Branch code registered");
        Ok(())
    }

    /// Add a vault to the caller's branch
    pub fn add_vault(&self, ctx: &ActorContext, code: &str, name: &str) -> Result<Vault, EngineError> {
        let vault = self.transact(ctx, "add_vault", |ledger, _| {
            Ok(ledger.storage.add_vault(&ctx.branch_id, code, name)?)
        })?;
        info!(branch_id = %ctx.branch_id, vault_id = %vault.id, code, "Vault added");
        Ok(vault)
    }

    /// Add a box with `total_slots` empty slots
    pub fn add_box(&self, ctx: &ActorContext, vault_id: &str, code: &str, total_slots: u32) -> Result<StorageBox, EngineError> {
        let storage_box = self.transact(ctx, "add_box", |ledger, _| {
            Ok(ledger.storage.add_box(vault_id, code, total_slots)?)
        })?;
        info!(vault_id, box_id = %storage_box.id, total_slots, "Box added");
        Ok(storage_box)
    }

    pub fn set_slot_active(&self, ctx: &ActorContext, slot_id: &str, active: bool) -> Result<(), EngineError> {
        self.transact(ctx, "set_slot_active", |ledger, _| {
            Ok(ledger.storage.set_slot_active(slot_id, active)?)
        })?;
        info!(slot_id, active, "Slot availability changed");
        Ok(())
    }

    pub fn add_interest_rate(&self, ctx: &ActorContext, rate: InterestRate) -> Result<(), EngineError> {
        let (rate_id, rate_type, rate_bps) = (rate.id.clone(), rate.rate_type, rate.rate_bps);
        self.transact(ctx, "add_interest_rate", |ledger, _| Ok(ledger.rates.add(rate)?))?;
        info!(rate_id = %rate_id, rate_type = rate_type.as_str(), rate_bps, "Interest rate added");
        Ok(())
    }

    /// Record the day's gold prices; returns the number of corrected purities
    pub fn record_gold_price(&self, ctx: &ActorContext, snapshot: GoldPriceSnapshot) -> Result<usize, EngineError> {
        let date = snapshot.price_date;
        let source = snapshot.source;
        let purity_count = snapshot.prices.len();

        let corrections = self.transact(ctx, "record_gold_price", |ledger, events| {
            let corrections = ledger.gold_prices.record(snapshot, &ctx.user_id);
            events.push(Event::GoldPriceRecorded {
                date,
                branch_id: ctx.branch_id.clone(),
                source: source.as_str().to_string(),
                purity_count,
                corrections,
            });
            Ok(corrections)
        })?;

        if corrections > 0 {
            warn!(%date, corrections, "Gold prices corrected");
        }
        info!(%date, source = source.as_str(), purity_count, "Gold prices recorded");
        Ok(corrections)
    }

    // ========================================================================
    // Pledge lifecycle
    // ========================================================================

    pub fn create_pledge(&self, ctx: &ActorContext, request: CreatePledgeRequest) -> Result<Pledge, EngineError> {
        let pledge = self.transact(ctx, "create_pledge", |ledger, events| {
            operations::create_pledge(ledger, &self.config, ctx, request, events)
        })?;
        info!(
            branch_id = %ctx.branch_id,
            pledge_id = pledge.id(),
            pledge_no = pledge.pledge_no(),
            items = pledge.item_ids().len(),
            loan_amount = pledge.loan_amount(),
            "Pledge created"
        );
        Ok(pledge)
    }

    pub fn quote_renewal(
        &self,
        ctx: &ActorContext,
        pledge_id: &str,
        renewal_date: NaiveDate,
        renewal_months: Option<u32>,
    ) -> Result<RenewalQuote, EngineError> {
        self.read(|ledger| operations::quote_renewal(ledger, &self.config, ctx, pledge_id, renewal_date, renewal_months))?
    }

    pub fn renew_pledge(&self, ctx: &ActorContext, request: RenewalRequest) -> Result<Renewal, EngineError> {
        let renewal = self.transact(ctx, "renew_pledge", |ledger, events| {
            operations::renew_pledge(ledger, &self.config, ctx, request, events)
        })?;
        info!(
            branch_id = %ctx.branch_id,
            pledge_id = %renewal.pledge_id,
            renewal_no = %renewal.renewal_no,
            interest_months = renewal.interest_months,
            interest_amount = renewal.interest_amount,
            new_due_date = %renewal.new_due_date,
            "Pledge renewed"
        );
        Ok(renewal)
    }

    pub fn quote_redemption(
        &self,
        ctx: &ActorContext,
        pledge_id: &str,
        redemption_date: NaiveDate,
        item_ids: Option<&[String]>,
        other_charges: i64,
    ) -> Result<RedemptionQuote, EngineError> {
        self.read(|ledger| {
            operations::quote_redemption(ledger, &self.config, ctx, pledge_id, redemption_date, item_ids, other_charges)
        })?
    }

    pub fn redeem_pledge(&self, ctx: &ActorContext, request: RedemptionRequest) -> Result<Redemption, EngineError> {
        let redemption = self.transact(ctx, "redeem_pledge", |ledger, events| {
            operations::redeem_pledge(ledger, &self.config, ctx, request, events)
        })?;
        info!(
            branch_id = %ctx.branch_id,
            pledge_id = %redemption.pledge_id,
            redemption_no = %redemption.redemption_no,
            is_partial = redemption.is_partial,
            total_payable = redemption.total_payable,
            "Pledge redeemed"
        );
        Ok(redemption)
    }

    pub fn release_redemption_items(
        &self,
        ctx: &ActorContext,
        redemption_id: &str,
        release_date: NaiveDate,
    ) -> Result<Redemption, EngineError> {
        let redemption = self.transact(ctx, "release_redemption_items", |ledger, events| {
            operations::release_redemption_items(ledger, ctx, redemption_id, release_date, events)
        })?;
        info!(redemption_id, items = redemption.redeemed_item_ids.len(), "Redeemed items handed over");
        Ok(redemption)
    }

    pub fn forfeit_pledge(&self, ctx: &ActorContext, pledge_id: &str, as_of: NaiveDate, reason: &str) -> Result<Pledge, EngineError> {
        let pledge = self.transact(ctx, "forfeit_pledge", |ledger, events| {
            operations::forfeit_pledge(ledger, ctx, pledge_id, as_of, reason, events)
        })?;
        info!(branch_id = %ctx.branch_id, pledge_id, pledge_no = pledge.pledge_no(), "Pledge forfeited");
        Ok(pledge)
    }

    pub fn list_for_auction(
        &self,
        ctx: &ActorContext,
        item_id: &str,
        listed_on: NaiveDate,
        reserve_price: i64,
    ) -> Result<AuctionItem, EngineError> {
        let listing = self.transact(ctx, "list_for_auction", |ledger, events| {
            operations::list_for_auction(ledger, &self.config, ctx, item_id, listed_on, reserve_price, events)
        })?;
        info!(item_id, auction_no = %listing.auction_no, reserve_price, "Item listed for auction");
        Ok(listing)
    }

    pub fn record_auction_sale(
        &self,
        ctx: &ActorContext,
        auction_item_id: &str,
        sold_on: NaiveDate,
        sale_price: i64,
        buyer_ref: Option<String>,
    ) -> Result<AuctionItem, EngineError> {
        let sold = self.transact(ctx, "record_auction_sale", |ledger, events| {
            operations::record_auction_sale(ledger, ctx, auction_item_id, sold_on, sale_price, buyer_ref, events)
        })?;
        info!(auction_no = %sold.auction_no, item_id = %sold.item_id, sale_price, "Auction sale recorded");
        Ok(sold)
    }

    pub fn cancel_pledge(&self, ctx: &ActorContext, pledge_id: &str, cancelled_on: NaiveDate, reason: &str) -> Result<Pledge, EngineError> {
        let pledge = self.transact(ctx, "cancel_pledge", |ledger, events| {
            operations::cancel_pledge(ledger, ctx, pledge_id, cancelled_on, reason, events)
        })?;
        info!(branch_id = %ctx.branch_id, pledge_id, pledge_no = pledge.pledge_no(), reason, "Pledge cancelled");
        Ok(pledge)
    }

    /// Overdue batch for the caller's branch; returns the number of pledges changed
    ///
    /// Runs regardless of day-end state: it only stores a status that is
    /// already derivable from the dates.
    pub fn mark_overdue(&self, ctx: &ActorContext, as_of: NaiveDate) -> Result<usize, EngineError> {
        let changed = self.transact(ctx, "mark_overdue", |ledger, events| {
            Ok(operations::mark_overdue(ledger, ctx, as_of, events))
        })?;
        info!(branch_id = %ctx.branch_id, %as_of, changed = changed.len(), "Overdue batch finished");
        Ok(changed.len())
    }

    // ========================================================================
    // Interest reads
    // ========================================================================

    fn with_pledge<T>(
        &self,
        pledge_id: &str,
        view: impl FnOnce(&Pledge) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.read(|ledger| match ledger.pledge(pledge_id) {
            Some(pledge) => view(pledge),
            None => Err(LifecycleError::NotFound(format!("pledge {}", pledge_id)).into()),
        })?
    }

    pub fn effective_rate(&self, pledge_id: &str, as_of: NaiveDate) -> Result<EffectiveRate, EngineError> {
        self.with_pledge(pledge_id, |pledge| Ok(self.policy.effective_rate(pledge, as_of)?))
    }

    /// Interest accrued and not yet collected on `as_of`
    pub fn accrued_interest(&self, pledge_id: &str, as_of: NaiveDate) -> Result<i64, EngineError> {
        self.with_pledge(pledge_id, |pledge| Ok(self.policy.accrued_interest(pledge, as_of)?))
    }

    /// Month-by-month rows behind [`PawnEngine::accrued_interest`]
    pub fn interest_breakdown(&self, pledge_id: &str, as_of: NaiveDate) -> Result<Vec<InterestBreakdownRow>, EngineError> {
        self.with_pledge(pledge_id, |pledge| Ok(self.policy.unpaid_breakdown(pledge, as_of)?))
    }

    // ========================================================================
    // Storage
    // ========================================================================

    pub fn assign_slot(
        &self,
        ctx: &ActorContext,
        item_id: &str,
        slot_id: &str,
        on: NaiveDate,
    ) -> Result<AssignOutcome, EngineError> {
        let outcome = self.transact(ctx, "assign_slot", |ledger, events| {
            ensure_item_branch(ledger, item_id, ctx)?;
            ledger.day_ends.ensure_open(&ctx.branch_id, on)?;
            let item = item_mut(&mut ledger.items, item_id)?;
            let outcome = ledger.storage.assign(item, slot_id, &ctx.branch_id, &ctx.user_id, on)?;
            if outcome == AssignOutcome::Assigned {
                events.push(Event::SlotAssigned {
                    date: on,
                    branch_id: ctx.branch_id.clone(),
                    item_id: item_id.to_string(),
                    slot_id: slot_id.to_string(),
                });
            }
            Ok(outcome)
        })?;
        info!(item_id, slot_id, ?outcome, "Slot assignment");
        Ok(outcome)
    }

    /// Free the item's slot; a no-op for an unplaced item
    pub fn release_item(
        &self,
        ctx: &ActorContext,
        item_id: &str,
        on: NaiveDate,
        reason: Option<&str>,
    ) -> Result<Option<String>, EngineError> {
        let freed = self.transact(ctx, "release_item", |ledger, events| {
            ensure_item_branch(ledger, item_id, ctx)?;
            ledger.day_ends.ensure_open(&ctx.branch_id, on)?;
            let item = item_mut(&mut ledger.items, item_id)?;
            let freed = ledger.storage.release(item, reason, &ctx.user_id, on)?;
            if let Some(slot_id) = &freed {
                events.push(Event::SlotReleased {
                    date: on,
                    branch_id: ctx.branch_id.clone(),
                    item_id: item_id.to_string(),
                    slot_id: slot_id.clone(),
                });
            }
            Ok(freed)
        })?;
        info!(item_id, slot_id = ?freed, "Item released from storage");
        Ok(freed)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn move_item(
        &self,
        ctx: &ActorContext,
        item_id: &str,
        from_slot_id: &str,
        to_slot_id: &str,
        reason: &str,
        on: NaiveDate,
    ) -> Result<(), EngineError> {
        self.transact(ctx, "move_item", |ledger, events| {
            ensure_item_branch(ledger, item_id, ctx)?;
            ledger.day_ends.ensure_open(&ctx.branch_id, on)?;
            let item = item_mut(&mut ledger.items, item_id)?;
            ledger
                .storage
                .move_item(item, from_slot_id, to_slot_id, &ctx.branch_id, reason, &ctx.user_id, on)?;
            if from_slot_id != to_slot_id {
                events.push(Event::ItemMoved {
                    date: on,
                    branch_id: ctx.branch_id.clone(),
                    item_id: item_id.to_string(),
                    from_slot_id: from_slot_id.to_string(),
                    to_slot_id: to_slot_id.to_string(),
                    reason: reason.to_string(),
                });
            }
            Ok(())
        })?;
        info!(item_id, from_slot_id, to_slot_id, reason, "Item moved");
        Ok(())
    }

    /// Recount a box from its slots, correcting and reporting any drift
    pub fn recompute_box(&self, ctx: &ActorContext, box_id: &str, on: NaiveDate) -> Result<u32, EngineError> {
        self.transact(ctx, "recompute_box", |ledger, events| {
            let actual = ledger.storage.recompute_box(box_id)?;
            for drift in ledger.storage.take_drift() {
                events.push(Event::OccupancyDrift {
                    date: on,
                    branch_id: ctx.branch_id.clone(),
                    box_id: drift.box_id,
                    recorded: drift.recorded,
                    actual: drift.actual,
                });
            }
            Ok(actual)
        })
    }

    // ========================================================================
    // Sequences
    // ========================================================================

    /// Draw a document number for the caller's branch
    pub fn next_number(&self, ctx: &ActorContext, kind: SequenceKind, year: i32) -> Result<String, EngineError> {
        self.transact(ctx, "next_number", |ledger, _| {
            Ok(ledger
                .sequences
                .next(&ctx.branch_id, kind, year, self.config.sequence_max_retries)?)
        })
    }

    /// Mark an externally issued number as taken
    pub fn reserve_existing_number(&self, ctx: &ActorContext, number: &str) -> Result<bool, EngineError> {
        let fresh = self.transact(ctx, "reserve_existing_number", |ledger, _| {
            Ok(ledger.sequences.reserve_existing(number)?)
        })?;
        info!(number, fresh, "Existing document number reserved");
        Ok(fresh)
    }

    // ========================================================================
    // Day end
    // ========================================================================

    pub fn open_day(&self, ctx: &ActorContext, date: NaiveDate, opening_balance: i64) -> Result<DayEndReport, EngineError> {
        let report = self.transact(ctx, "open_day", |ledger, events| {
            let report = ledger
                .day_ends
                .open(&ctx.branch_id, date, opening_balance, &ctx.user_id)?;
            events.push(Event::DayOpened {
                date,
                branch_id: ctx.branch_id.clone(),
                report_id: report.id.clone(),
                opening_balance,
            });
            Ok(report)
        })?;
        info!(branch_id = %ctx.branch_id, %date, opening_balance, "Day opened");
        Ok(report)
    }

    /// Current totals for a branch day; callable any number of times
    pub fn aggregate_day(&self, branch_id: &str, date: NaiveDate) -> Result<DailyTotals, EngineError> {
        self.read(|ledger| aggregate(ledger, branch_id, date))
    }

    /// Freeze the day's totals and record the counted cash
    pub fn close_day(
        &self,
        ctx: &ActorContext,
        date: NaiveDate,
        closing_balance: i64,
        notes: Option<String>,
    ) -> Result<DayEndReport, EngineError> {
        let report = self.transact(ctx, "close_day", |ledger, events| {
            let totals = aggregate(ledger, &ctx.branch_id, date);
            let report = ledger
                .day_ends
                .close(&ctx.branch_id, date, totals, closing_balance, notes, &ctx.user_id)?;
            events.push(Event::DayClosed {
                date,
                branch_id: ctx.branch_id.clone(),
                report_id: report.id.clone(),
                closing_balance,
                variance: report.variance.unwrap_or(0),
            });
            Ok(report)
        })?;

        let variance = report.variance.unwrap_or(0);
        if variance != 0 {
            warn!(branch_id = %ctx.branch_id, %date, variance, "Day closed with cash variance");
        }
        info!(branch_id = %ctx.branch_id, %date, closing_balance, "Day closed");
        Ok(report)
    }

    pub fn is_day_closed(&self, branch_id: &str, date: NaiveDate) -> Result<bool, EngineError> {
        self.read(|ledger| ledger.day_ends.is_closed(branch_id, date))
    }

    pub fn day_end_report(&self, branch_id: &str, date: NaiveDate) -> Result<DayEndReport, EngineError> {
        self.read(|ledger| ledger.day_ends.report(branch_id, date).cloned())?
            .ok_or_else(|| {
                DayEndError::NotOpened {
                    branch_id: branch_id.to_string(),
                    date,
                }
                .into()
            })
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serialize the ledger with this engine's config hash
    pub fn save_snapshot(&self) -> Result<String, EngineError> {
        let snapshot = LedgerSnapshot::new(self.config.config_hash()?, self.ledger()?);
        let json = snapshot.to_json()?;
        info!(pledges = snapshot.ledger.num_pledges(), bytes = json.len(), "Snapshot saved");
        Ok(json)
    }

    /// Rebuild an engine from a snapshot taken under the same config
    pub fn load_snapshot(config: EngineConfig, json: &str) -> Result<Self, EngineError> {
        let snapshot = LedgerSnapshot::from_json(json)?;
        let expected = config.config_hash()?;
        if snapshot.config_hash != expected {
            return Err(EngineError::SnapshotValidation(format!(
                "Config mismatch: snapshot was taken under {}, engine runs {}",
                snapshot.config_hash, expected
            )));
        }
        info!(pledges = snapshot.ledger.num_pledges(), "Snapshot loaded");
        Self::with_ledger(config, snapshot.ledger)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn pledge(&self, pledge_id: &str) -> Result<Option<Pledge>, EngineError> {
        self.read(|ledger| ledger.pledge(pledge_id).cloned())
    }

    pub fn item(&self, item_id: &str) -> Result<Option<PledgeItem>, EngineError> {
        self.read(|ledger| ledger.item(item_id).cloned())
    }

    pub fn items_of(&self, pledge_id: &str) -> Result<Vec<PledgeItem>, EngineError> {
        self.read(|ledger| ledger.items_of(pledge_id).into_iter().cloned().collect())
    }

    pub fn renewals_of(&self, pledge_id: &str) -> Result<Vec<Renewal>, EngineError> {
        self.read(|ledger| ledger.renewals_of(pledge_id).into_iter().cloned().collect())
    }

    pub fn redemptions_of(&self, pledge_id: &str) -> Result<Vec<Redemption>, EngineError> {
        self.read(|ledger| ledger.redemptions_of(pledge_id).into_iter().cloned().collect())
    }

    pub fn auction_item(&self, auction_item_id: &str) -> Result<Option<AuctionItem>, EngineError> {
        self.read(|ledger| ledger.auction_item(auction_item_id).cloned())
    }

    pub fn slot(&self, slot_id: &str) -> Result<Option<Slot>, EngineError> {
        self.read(|ledger| ledger.storage.slot(slot_id).cloned())
    }

    pub fn slots_in_box(&self, box_id: &str) -> Result<Vec<Slot>, EngineError> {
        self.read(|ledger| ledger.storage.slots_in_box(box_id).into_iter().cloned().collect())
    }

    pub fn storage_box(&self, box_id: &str) -> Result<Option<StorageBox>, EngineError> {
        self.read(|ledger| ledger.storage.storage_box(box_id).cloned())
    }

    pub fn location_history(&self, item_id: &str) -> Result<Vec<ItemLocationHistory>, EngineError> {
        self.read(|ledger| ledger.storage.history_for(item_id).into_iter().cloned().collect())
    }
}

impl std::fmt::Debug for PawnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PawnEngine")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

fn ensure_item_branch(ledger: &LedgerState, item_id: &str, ctx: &ActorContext) -> Result<(), EngineError> {
    let item = ledger
        .item(item_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("item {}", item_id)))?;
    let pledge = ledger
        .pledge(item.pledge_id())
        .ok_or_else(|| LifecycleError::NotFound(format!("pledge {}", item.pledge_id())))?;
    if pledge.branch_id() != ctx.branch_id {
        return Err(LifecycleError::BranchMismatch {
            pledge_id: pledge.id().to_string(),
            pledge_branch: pledge.branch_id().to_string(),
            actor_branch: ctx.branch_id.clone(),
        }
        .into());
    }
    Ok(())
}

fn item_mut<'a>(
    items: &'a mut BTreeMap<String, PledgeItem>,
    item_id: &str,
) -> Result<&'a mut PledgeItem, EngineError> {
    items
        .get_mut(item_id)
        .ok_or_else(|| LifecycleError::NotFound(format!("item {}", item_id)).into())
}
