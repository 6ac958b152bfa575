//! Web server module for the Messenger webhook.
//!
//! Routes:
//! - `GET  /webhook`   subscription challenge
//! - `POST /webhook`   signed event delivery, dispatched to the pipeline
//! - `GET  /authorize` account linking page
//! - `GET  /health`    liveness

pub mod authorize;
pub mod handlers;
pub mod signature;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use authorize::{
    authorize, check_redirect, render_authorize_page, AuthorizeQuery, RedirectError, AUTH_CODE,
};
pub use handlers::{
    check_subscription, health, receive_webhook, verify_subscription, AppState, HealthResponse,
    VerifyQuery, WebhookResponse,
};
pub use signature::{verify_request_signature, verify_signature, SignatureError};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_subscription).post(receive_webhook))
        .route("/authorize", get(authorize))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
