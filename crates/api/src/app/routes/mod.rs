pub mod attendance;
pub mod cashbook;
pub mod members;
pub mod memberships;
pub mod system;

use axum::{Router, routing::get};

/// Domain routes (all behind the auth middleware).
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/members", members::router())
        .nest("/memberships", memberships::router())
        .nest("/attendance", attendance::router())
        .nest("/cashbook", cashbook::router())
}
