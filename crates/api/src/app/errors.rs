use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use repset_attendance::CheckInError;
use repset_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "concurrency", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
    }
}

/// Denials are expected outcomes at the door; each gets a distinct code so
/// the scanner can render the right message.
pub fn check_in_error_to_response(err: CheckInError) -> axum::response::Response {
    match err {
        CheckInError::InvalidCredential => json_error(
            StatusCode::BAD_REQUEST,
            "invalid_credential",
            "credential could not be read",
        ),
        CheckInError::MemberNotFound => {
            json_error(StatusCode::NOT_FOUND, "member_not_found", "member not found")
        }
        CheckInError::NoActiveMembership => json_error(
            StatusCode::CONFLICT,
            "no_active_membership",
            "no active membership covers today",
        ),
        CheckInError::AttendanceQuotaExceeded => json_error(
            StatusCode::CONFLICT,
            "attendance_quota_exceeded",
            "attendance quota exceeded",
        ),
        CheckInError::BackendUnavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
