use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, health_check, users};
use crate::state::AppState;

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(users::register))
        .route("/initialize-payment", post(users::initialize_payment))
        .route("/verify-payment/:reference", get(users::verify_payment))
        .route("/paystack-webhook", post(users::paystack_webhook))
        .route("/verify-ticket/:ticket_id", get(users::verify_ticket))
        .route("/status/:user_id", get(users::registration_status))
        .route("/upload-receipt", post(users::upload_receipt))
        .route("/ticket/:user_id", get(users::ticket))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(admin::register))
        .route("/login", post(admin::login))
        .route("/logout", post(admin::logout))
        .route("/me", get(admin::me))
        .route("/admins/:admin_id/deactivate", put(admin::deactivate_admin))
        .route("/pending-verifications", get(admin::pending_verifications))
        .route("/approve/:user_id", put(admin::approve))
        .route("/reject/:user_id", put(admin::reject))
        .route("/bulk-approve", post(admin::bulk_approve))
        .route("/bulk-reject", post(admin::bulk_reject))
        .route("/verify-payment/:reference", post(admin::verify_payment))
        .route("/users", get(admin::list_users))
        .route("/users/:user_id", get(admin::user_detail))
        .route("/export", get(admin::export))
        .route("/stats", get(admin::stats))
}

pub fn create_routes(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/health", get(health_check))
        .nest("/users", user_routes())
        .nest("/admin", admin_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(&config))
        .layer(create_cors_layer(&config))
}
