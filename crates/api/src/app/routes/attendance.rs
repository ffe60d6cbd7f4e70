use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use repset_auth::Permission;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/check-in", post(check_in))
        .route("/feed", get(feed))
}

/// Door scan: decode the credential, admit or turn away, and log either way.
pub async fn check_in(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CheckInRequest>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require_permission(
        &tenant,
        &principal,
        &Permission::new("attendance.check_in"),
    ) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.check_in(tenant.tenant_id(), &body.credential, Utc::now()) {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "member_id": receipt.member_id.to_string(),
                "member_name": receipt.member_name,
                "membership_id": receipt.membership_id.to_string(),
                "activity": receipt.activity,
                "remaining": receipt.remaining,
                "at": receipt.at,
            })),
        )
            .into_response(),
        Err(e) => errors::check_in_error_to_response(e),
    }
}

/// The day's check-in feed (accepted and denied entries, newest last).
pub async fn feed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::DayQuery>,
) -> axum::response::Response {
    match services.attendance_day(tenant.tenant_id(), query.date) {
        Some(feed) => (StatusCode::OK, Json(dto::feed_to_json(feed))).into_response(),
        None => (
            StatusCode::OK,
            Json(serde_json::json!({
                "date": query.date,
                "accepted_count": 0,
                "denied_count": 0,
                "entries": [],
            })),
        )
            .into_response(),
    }
}
