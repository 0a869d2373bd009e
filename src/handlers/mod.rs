pub mod checkout;
pub mod tracking;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::services::CheckoutService;

pub fn router(service: Arc<CheckoutService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/checkout", post(checkout::create_checkout))
        .route(
            "/checkout/:id",
            get(checkout::get_checkout).delete(checkout::abandon_checkout),
        )
        .route("/checkout/:id/retry", post(checkout::retry_checkout))
        .route("/checkout/:id/regenerate", post(checkout::regenerate_checkout))
        .route("/api/track-purchase", post(tracking::track_purchase))
        .route("/api/track-custom", post(tracking::track_custom))
        .with_state(service)
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}
