use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use repset_auth::Permission;
use repset_core::AggregateId;
use repset_members::{
    AccrueDebt, DeactivateMember, Member, MemberCommand, MemberId, ReactivateMember,
    RegisterMember, UpdateDetails,
};

use crate::app::services::{AppServices, actor_for};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_member).get(list_members))
        .route("/:id", get(get_member).patch(update_member))
        .route("/:id/deactivate", post(deactivate_member))
        .route("/:id/reactivate", post(reactivate_member))
        .route("/:id/debt/accrue", post(accrue_debt))
        .route("/:id/debt/settle", post(settle_debt))
        .route("/:id/qr", get(member_qr))
        .route("/:id/memberships", get(member_memberships))
}

pub async fn register_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterMemberRequest>,
) -> axum::response::Response {
    if let Err(e) =
        crate::authz::require_permission(&tenant, &principal, &Permission::new("members.register"))
    {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let agg = AggregateId::new();
    let member_id = MemberId::new(agg);

    let result = services.dispatch::<Member>(
        tenant.tenant_id(),
        agg,
        "members.member",
        MemberCommand::RegisterMember(RegisterMember {
            tenant_id: tenant.tenant_id(),
            member_id,
            first_name: body.first_name,
            last_name: body.last_name,
            contact: body.contact,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    );

    match result {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_members(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::MemberListQuery>,
) -> axum::response::Response {
    let items = match query.q.as_deref() {
        Some(q) if !q.trim().is_empty() => services.search_members(tenant.tenant_id(), q),
        _ => services.members(tenant.tenant_id()),
    };
    let items = items.into_iter().map(dto::member_to_json).collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.member(tenant.tenant_id(), &member_id) {
        Some(view) => (StatusCode::OK, Json(dto::member_to_json(view))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "member not found"),
    }
}

pub async fn update_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateMemberRequest>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) =
        crate::authz::require_permission(&tenant, &principal, &Permission::new("members.update"))
    {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let result = services.dispatch::<Member>(
        tenant.tenant_id(),
        member_id.0,
        "members.member",
        MemberCommand::UpdateDetails(UpdateDetails {
            tenant_id: tenant.tenant_id(),
            member_id,
            first_name: body.first_name,
            last_name: body.last_name,
            contact: body.contact,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    );

    match result {
        Ok(committed) => ok_with_count(member_id.0, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn deactivate_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DeactivateMemberRequest>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("members.deactivate"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let result = services.dispatch::<Member>(
        tenant.tenant_id(),
        member_id.0,
        "members.member",
        MemberCommand::DeactivateMember(DeactivateMember {
            tenant_id: tenant.tenant_id(),
            member_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    );

    match result {
        Ok(committed) => ok_with_count(member_id.0, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn reactivate_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("members.reactivate"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let result = services.dispatch::<Member>(
        tenant.tenant_id(),
        member_id.0,
        "members.member",
        MemberCommand::ReactivateMember(ReactivateMember {
            tenant_id: tenant.tenant_id(),
            member_id,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    );

    match result {
        Ok(committed) => ok_with_count(member_id.0, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn accrue_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AccrueDebtRequest>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("members.debt.accrue"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let result = services.dispatch::<Member>(
        tenant.tenant_id(),
        member_id.0,
        "members.member",
        MemberCommand::AccrueDebt(AccrueDebt {
            tenant_id: tenant.tenant_id(),
            member_id,
            amount: body.amount,
            description: body.description,
            occurred_at: Utc::now(),
        }),
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    );

    match result {
        Ok(committed) => ok_with_count(member_id.0, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Settle debt: authoritative member write plus a best-effort income entry in
/// today's cash ledger.
pub async fn settle_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SettleDebtRequest>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("members.debt.settle"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.settle_debt(
        tenant.tenant_id(),
        member_id,
        body.amount,
        body.payment_method,
        actor_for(&principal),
    ) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": member_id.to_string(),
                "remaining_debt": outcome.remaining_debt,
                "cash_recorded": outcome.cash_recorded,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// The member's door credential (base64 QR payload).
pub async fn member_qr(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if services.member(tenant.tenant_id(), &member_id).is_none() {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "member not found");
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "member_id": member_id.to_string(),
            "credential": repset_attendance::encode_credential(member_id),
        })),
    )
        .into_response()
}

pub async fn member_memberships(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let member_id = match parse_member_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let items = services
        .assignments_for_member(tenant.tenant_id(), member_id)
        .into_iter()
        .map(dto::assignment_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

fn parse_member_id(raw: &str) -> Result<MemberId, axum::response::Response> {
    raw.parse::<AggregateId>().map(MemberId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid member id")
    })
}

fn ok_with_count(id: AggregateId, committed: usize) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "id": id.to_string(), "events_committed": committed })),
    )
        .into_response()
}
