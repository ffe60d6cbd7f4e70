//! Request/response DTOs and JSON mapping helpers.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use repset_cashbook::{PaymentMethod, TransactionCategory, TransactionKind};
use repset_infra::projections::{
    attendance_feed::{AttendanceEntry, DayFeed, EntryOutcome},
    daily_cash::DailyCashView,
    member_directory::MemberView,
    membership_roster::AssignmentView,
};
use repset_members::ContactInfo;
use repset_memberships::PaymentStatus;

// --- requests ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterMemberRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateMemberRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccrueDebtRequest {
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SettleDebtRequest {
    pub amount: i64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct AssignMembershipRequest {
    pub member_id: Uuid,
    pub activity: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cost: i64,
    pub payment_status: PaymentStatus,
    pub max_attendances: u32,
}

#[derive(Debug, Deserialize)]
pub struct CancelMembershipRequest {
    #[serde(default)]
    pub refund: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenDayRequest {
    pub date: NaiveDate,
    pub opening_amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub kind: TransactionKind,
    pub category: TransactionCategory,
    pub amount: i64,
    pub description: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub member_id: Option<Uuid>,
    #[serde(default)]
    pub membership_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CloseDayRequest {
    pub closing_amount: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct MemberListQuery {
    #[serde(default)]
    pub q: Option<String>,
}

// --- responses -----------------------------------------------------------

pub fn member_to_json(view: MemberView) -> JsonValue {
    json!({
        "id": view.member_id.to_string(),
        "first_name": view.first_name,
        "last_name": view.last_name,
        "email": view.email,
        "phone": view.phone,
        "status": view.status,
        "total_debt": view.total_debt,
    })
}

pub fn assignment_to_json(view: AssignmentView) -> JsonValue {
    json!({
        "id": view.membership_id.to_string(),
        "member_id": view.member_id.to_string(),
        "activity": view.activity,
        "start_date": view.start_date,
        "end_date": view.end_date,
        "cost": view.cost,
        "payment_status": view.payment_status,
        "status": view.status,
        "max_attendances": view.max_attendances,
        "remaining_attendances": view.remaining_attendances,
    })
}

pub fn cash_day_to_json(view: DailyCashView) -> JsonValue {
    json!({
        "date": view.date,
        "status": view.status,
        "opening_amount": view.opening_amount,
        "total_income": view.total_income,
        "total_expense": view.total_expense,
        "current_balance": view.current_balance(),
        "transaction_count": view.transactions.len(),
        "closing_amount": view.closing_amount,
        "expected_amount": view.expected_amount,
        "discrepancy": view.discrepancy,
    })
}

pub fn feed_to_json(feed: DayFeed) -> JsonValue {
    json!({
        "date": feed.date,
        "accepted_count": feed.accepted_count,
        "denied_count": feed.denied_count,
        "entries": feed.entries.into_iter().map(feed_entry_to_json).collect::<Vec<_>>(),
    })
}

fn feed_entry_to_json(entry: AttendanceEntry) -> JsonValue {
    let member_id = entry.member_id.map(|id| id.to_string());
    match entry.outcome {
        EntryOutcome::Accepted {
            membership_id,
            activity,
            remaining,
        } => json!({
            "at": entry.occurred_at,
            "member_id": member_id,
            "outcome": "accepted",
            "membership_id": membership_id.to_string(),
            "activity": activity,
            "remaining": remaining,
        }),
        EntryOutcome::Denied { reason } => json!({
            "at": entry.occurred_at,
            "member_id": member_id,
            "outcome": "denied",
            "reason": reason,
        }),
    }
}
