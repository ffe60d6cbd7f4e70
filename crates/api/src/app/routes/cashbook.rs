use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::NaiveDate;

use repset_auth::Permission;
use repset_cashbook::{DailyCashEvent, TransactionEntry};
use repset_core::AggregateId;
use repset_members::MemberId;
use repset_memberships::MembershipId;

use crate::app::services::{AppServices, actor_for};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/days", post(open_day))
        .route("/days/:date", get(get_day))
        .route("/days/:date/transactions", post(record_transaction))
        .route("/days/:date/close", post(close_day))
        .route("/summary", get(summary))
}

/// Open the ledger for a day. Idempotent: opening an already-open day is a
/// success, so two scanners racing at shift start both proceed.
pub async fn open_day(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenDayRequest>,
) -> axum::response::Response {
    if let Err(e) =
        crate::authz::require_permission(&tenant, &principal, &Permission::new("cashbook.open"))
    {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.get_or_open_day(
        tenant.tenant_id(),
        body.date,
        body.opening_amount,
        actor_for(&principal),
    ) {
        Ok(ledger) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "date": ledger.date(),
                "status": ledger.status(),
                "opening_amount": ledger.opening_amount(),
                "total_income": ledger.total_income(),
                "total_expense": ledger.total_expense(),
                "current_balance": ledger.current_balance(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_day(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(date): Path<NaiveDate>,
) -> axum::response::Response {
    match services.cash_day(tenant.tenant_id(), date) {
        Some(view) => (StatusCode::OK, Json(dto::cash_day_to_json(view))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no ledger for that day"),
    }
}

pub async fn record_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(date): Path<NaiveDate>,
    Json(body): Json<dto::RecordTransactionRequest>,
) -> axum::response::Response {
    if let Err(e) =
        crate::authz::require_permission(&tenant, &principal, &Permission::new("cashbook.record"))
    {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let entry = TransactionEntry {
        kind: body.kind,
        category: body.category,
        amount: body.amount,
        description: body.description,
        recorded_by: actor_for(&principal),
        payment_method: body.payment_method,
        member_id: body
            .member_id
            .map(|id| MemberId::new(AggregateId::from_uuid(id))),
        membership_id: body
            .membership_id
            .map(|id| MembershipId::new(AggregateId::from_uuid(id))),
    };

    match services.record_entry(tenant.tenant_id(), date, entry) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "date": date,
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn close_day(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(date): Path<NaiveDate>,
    Json(body): Json<dto::CloseDayRequest>,
) -> axum::response::Response {
    if let Err(e) =
        crate::authz::require_permission(&tenant, &principal, &Permission::new("cashbook.close"))
    {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services.close_day(
        tenant.tenant_id(),
        date,
        body.closing_amount,
        actor_for(&principal),
        body.notes,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    // Report the reconciliation straight from the committed event, so the
    // caller does not have to wait for the projection.
    let closed = committed.iter().find_map(|stored| {
        match serde_json::from_value::<DailyCashEvent>(stored.payload.clone()) {
            Ok(DailyCashEvent::DailyCashClosed(e)) => Some(e),
            _ => None,
        }
    });

    match closed {
        Some(e) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "date": date,
                "closing_amount": e.closing_amount,
                "expected_amount": e.expected_amount,
                "discrepancy": e.discrepancy,
            })),
        )
            .into_response(),
        None => (
            StatusCode::OK,
            Json(serde_json::json!({ "date": date, "events_committed": committed.len() })),
        )
            .into_response(),
    }
}

pub async fn summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::RangeQuery>,
) -> axum::response::Response {
    if query.from > query.to {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_range", "from is after to");
    }
    let summary = services.cash_summary(tenant.tenant_id(), query.from, query.to);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "from": query.from,
            "to": query.to,
            "total_income": summary.total_income,
            "total_expense": summary.total_expense,
            "net": summary.net(),
            "income_by_category": summary.income_by_category,
            "expense_by_category": summary.expense_by_category,
        })),
    )
        .into_response()
}
