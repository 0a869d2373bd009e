use axum::{
    body::Bytes,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct TrackPurchaseBody {
    event: Option<String>,
    value: Option<f64>,
    currency: Option<String>,
    utm_params: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackCustomBody {
    event: Option<String>,
    data: Option<Value>,
    timestamp: Option<String>,
    url: Option<String>,
    utm_params: Option<String>,
}

pub async fn track_purchase(
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let body: TrackPurchaseBody = serde_json::from_slice(&body).map_err(internal_error)?;

    info!(
        event = ?body.event,
        value = ?body.value,
        currency = ?body.currency,
        utm_params = ?body.utm_params,
        timestamp = ?body.timestamp,
        user_agent = ?user_agent(&headers),
        "Purchase event via UTM"
    );

    Ok(Json(json!({ "success": true })))
}

pub async fn track_custom(
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let body: TrackCustomBody = serde_json::from_slice(&body).map_err(internal_error)?;

    info!(
        event = ?body.event,
        data = ?body.data,
        timestamp = ?body.timestamp,
        url = ?body.url,
        utm_params = ?body.utm_params,
        user_agent = ?user_agent(&headers),
        "Custom event received"
    );

    Ok(Json(json!({ "success": true })))
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
}

fn internal_error(e: serde_json::Error) -> (StatusCode, Json<Value>) {
    error!("Erro ao processar evento: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Erro interno" })),
    )
}
