use axum::{
    extract::{Path, RawQuery, State},
    http::{header::REFERER, HeaderMap, StatusCode},
    response::Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::error::CheckoutError;
use crate::models::attribution::AttributionContext;
use crate::models::order::OrderForm;
use crate::services::CheckoutService;

type ApiResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

pub async fn create_checkout(
    State(service): State<Arc<CheckoutService>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(form): Json<OrderForm>,
) -> ApiResult {
    let attribution = AttributionContext::new(query.unwrap_or_default());
    let page_url = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let (id, snapshot) = service
        .start_checkout(form, attribution, page_url)
        .map_err(error_response)?;
    info!(session_id = %id, "Checkout session created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "sessionId": id, "snapshot": snapshot })),
    ))
}

pub async fn get_checkout(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let handle = service.session(&id).map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!(handle.snapshot()))))
}

pub async fn retry_checkout(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let snapshot = service.retry(&id).await.map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!(snapshot))))
}

pub async fn regenerate_checkout(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let snapshot = service.regenerate(&id).await.map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!(snapshot))))
}

pub async fn abandon_checkout(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    service.abandon(&id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

fn error_response(e: CheckoutError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        CheckoutError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        CheckoutError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CheckoutError::SessionNotFound(_) | CheckoutError::SessionClosed => StatusCode::NOT_FOUND,
        CheckoutError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Checkout request failed: {}", e);
    (status, Json(json!({ "error": e.to_string() })))
}
