//! Audit record shape handed to the audit collaborator

use crate::models::context::ActorContext;
use crate::models::event::Event;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One audit entry: who changed which entity, from what, to what
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub module: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_values: Value,
    pub new_values: Value,
    pub user_id: String,
    pub branch_id: String,
    pub ip_address: Option<String>,
    pub business_date: NaiveDate,
}

impl AuditRecord {
    /// Build the audit entry for a committed event
    pub fn from_event(event: &Event, ctx: &ActorContext) -> Self {
        let (entity_type, entity_id, old_values, new_values) = describe(event);
        Self {
            action: event.event_type().to_string(),
            module: event.module().to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            old_values,
            new_values,
            user_id: ctx.user_id.clone(),
            branch_id: event.branch_id().to_string(),
            ip_address: ctx.ip_address.clone(),
            business_date: event.date(),
        }
    }
}

fn describe(event: &Event) -> (&'static str, String, Value, Value) {
    match event {
        Event::PledgeCreated {
            pledge_id,
            pledge_no,
            receipt_no,
            loan_amount,
            payout_amount,
            item_count,
            ..
        } => (
            "pledge",
            pledge_id.clone(),
            Value::Null,
            json!({
                "status": "active",
                "pledge_no": pledge_no,
                "receipt_no": receipt_no,
                "loan_amount": loan_amount,
                "payout_amount": payout_amount,
                "item_count": item_count,
            }),
        ),
        Event::PledgeRenewed {
            pledge_id,
            renewal_no,
            previous_due_date,
            new_due_date,
            interest_amount,
            total_payable,
            old_status,
            ..
        } => (
            "pledge",
            pledge_id.clone(),
            json!({ "status": old_status, "due_date": previous_due_date }),
            json!({
                "status": "renewed",
                "due_date": new_due_date,
                "renewal_no": renewal_no,
                "interest_amount": interest_amount,
                "total_payable": total_payable,
            }),
        ),
        Event::PledgeRedeemed {
            pledge_id,
            redemption_no,
            is_partial,
            item_ids,
            total_payable,
            old_status,
            new_status,
            ..
        } => (
            "pledge",
            pledge_id.clone(),
            json!({ "status": old_status }),
            json!({
                "status": new_status,
                "redemption_no": redemption_no,
                "is_partial": is_partial,
                "item_ids": item_ids,
                "total_payable": total_payable,
            }),
        ),
        Event::ItemsReleased {
            redemption_id,
            item_ids,
            ..
        } => (
            "redemption",
            redemption_id.clone(),
            json!({ "items_released": false }),
            json!({ "items_released": true, "item_ids": item_ids }),
        ),
        Event::PledgeForfeited {
            pledge_id,
            old_status,
            reason,
            ..
        } => (
            "pledge",
            pledge_id.clone(),
            json!({ "status": old_status }),
            json!({ "status": "forfeited", "reason": reason }),
        ),
        Event::PledgeMarkedOverdue {
            pledge_id,
            old_status,
            ..
        } => (
            "pledge",
            pledge_id.clone(),
            json!({ "status": old_status }),
            json!({ "status": "overdue" }),
        ),
        Event::PledgeCancelled {
            pledge_id,
            old_status,
            reason,
            ..
        } => (
            "pledge",
            pledge_id.clone(),
            json!({ "status": old_status }),
            json!({ "status": "cancelled", "reason": reason }),
        ),
        Event::AuctionListed {
            auction_item_id,
            auction_no,
            item_id,
            reserve_price,
            ..
        } => (
            "auction_item",
            auction_item_id.clone(),
            Value::Null,
            json!({
                "status": "listed",
                "auction_no": auction_no,
                "item_id": item_id,
                "reserve_price": reserve_price,
            }),
        ),
        Event::AuctionSold {
            auction_item_id,
            sale_price,
            new_status,
            ..
        } => (
            "auction_item",
            auction_item_id.clone(),
            json!({ "status": "listed" }),
            json!({ "status": "sold", "sale_price": sale_price, "pledge_status": new_status }),
        ),
        Event::SlotAssigned { item_id, slot_id, .. } => (
            "pledge_item",
            item_id.clone(),
            json!({ "slot_id": null }),
            json!({ "slot_id": slot_id }),
        ),
        Event::ItemMoved {
            item_id,
            from_slot_id,
            to_slot_id,
            reason,
            ..
        } => (
            "pledge_item",
            item_id.clone(),
            json!({ "slot_id": from_slot_id }),
            json!({ "slot_id": to_slot_id, "reason": reason }),
        ),
        Event::SlotReleased { item_id, slot_id, .. } => (
            "pledge_item",
            item_id.clone(),
            json!({ "slot_id": slot_id }),
            json!({ "slot_id": null }),
        ),
        Event::OccupancyDrift {
            box_id,
            recorded,
            actual,
            ..
        } => (
            "storage_box",
            box_id.clone(),
            json!({ "occupied_slots": recorded }),
            json!({ "occupied_slots": actual }),
        ),
        Event::DayOpened {
            report_id,
            opening_balance,
            ..
        } => (
            "day_end_report",
            report_id.clone(),
            Value::Null,
            json!({ "status": "open", "opening_balance": opening_balance }),
        ),
        Event::DayClosed {
            report_id,
            closing_balance,
            variance,
            ..
        } => (
            "day_end_report",
            report_id.clone(),
            json!({ "status": "open" }),
            json!({ "status": "closed", "closing_balance": closing_balance, "variance": variance }),
        ),
        Event::GoldPriceRecorded {
            date,
            source,
            purity_count,
            corrections,
            ..
        } => (
            "gold_price",
            date.to_string(),
            Value::Null,
            json!({ "source": source, "purity_count": purity_count, "corrections": corrections }),
        ),
    }
}
