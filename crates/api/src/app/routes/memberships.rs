use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use repset_auth::Permission;
use repset_core::AggregateId;
use repset_members::MemberId;
use repset_memberships::{
    AssignMembership, CancelMembership, MembershipAssignment, MembershipCommand, MembershipId,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(assign_membership))
        .route("/:id", get(get_membership))
        .route("/:id/cancel", post(cancel_membership))
}

pub async fn assign_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::AssignMembershipRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("memberships.assign"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let member_id = MemberId::new(AggregateId::from_uuid(body.member_id));
    if services.member(tenant.tenant_id(), &member_id).is_none() {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "member not found");
    }

    let agg = AggregateId::new();
    let membership_id = MembershipId::new(agg);

    let result = services.assign_membership(
        tenant.tenant_id(),
        AssignMembership {
            tenant_id: tenant.tenant_id(),
            membership_id,
            member_id,
            activity: body.activity,
            start_date: body.start_date,
            end_date: body.end_date,
            cost: body.cost,
            payment_status: body.payment_status,
            max_attendances: body.max_attendances,
            occurred_at: Utc::now(),
        },
    );

    match result {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "member_id": member_id.to_string(),
                "events_committed": outcome.events_committed,
                "debt_accrued": outcome.debt_accrued,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let membership_id = match parse_membership_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.assignment(tenant.tenant_id(), &membership_id) {
        Some(view) => (StatusCode::OK, Json(dto::assignment_to_json(view))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "membership not found"),
    }
}

pub async fn cancel_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CancelMembershipRequest>,
) -> axum::response::Response {
    let membership_id = match parse_membership_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("memberships.cancel"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let result = services.dispatch::<MembershipAssignment>(
        tenant.tenant_id(),
        membership_id.0,
        "memberships.assignment",
        MembershipCommand::CancelMembership(CancelMembership {
            tenant_id: tenant.tenant_id(),
            membership_id,
            refund: body.refund,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| MembershipAssignment::empty(MembershipId::new(aggregate_id)),
    );

    match result {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": membership_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn parse_membership_id(raw: &str) -> Result<MembershipId, axum::response::Response> {
    raw.parse::<AggregateId>()
        .map(MembershipId::new)
        .map_err(|_| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid membership id")
        })
}
