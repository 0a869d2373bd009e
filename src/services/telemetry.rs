use crate::app::error::TelemetryError;
use crate::models::attribution::AttributionContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PURCHASE_PATH: &str = "/api/track-purchase";
pub const CUSTOM_PATH: &str = "/api/track-custom";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub event: String,
    pub value: f64,
    pub currency: String,
    pub utm_params: String,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseEvent {
    pub fn new(value: f64, currency: &str, attribution: &AttributionContext) -> Self {
        Self {
            event: "purchase".to_string(),
            value,
            currency: currency.to_string(),
            utm_params: attribution.as_str().to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub utm_params: String,
}

/// Marketing pixel events emitted along the funnel.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelEvent {
    InitiateCheckout { value: f64 },
    AddToCart { value: f64 },
}

impl PixelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PixelEvent::InitiateCheckout { .. } => "InitiateCheckout",
            PixelEvent::AddToCart { .. } => "AddToCart",
        }
    }

    pub fn parameters(&self, product_title: &str, currency: &str) -> Value {
        let (PixelEvent::InitiateCheckout { value } | PixelEvent::AddToCart { value }) = self;
        json!({
            "value": value,
            "currency": currency,
            "content_type": "product",
            "content_name": product_title,
        })
    }

    pub fn into_custom_event(
        self,
        product_title: &str,
        currency: &str,
        page_url: &str,
        attribution: &AttributionContext,
    ) -> CustomEvent {
        CustomEvent {
            event: self.name().to_string(),
            data: self.parameters(product_title, currency),
            timestamp: Utc::now(),
            url: page_url.to_string(),
            utm_params: attribution.as_str().to_string(),
        }
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn track_purchase(&self, event: &PurchaseEvent) -> Result<(), TelemetryError>;
    async fn track_custom(&self, event: &CustomEvent) -> Result<(), TelemetryError>;
}

pub struct HttpTelemetrySink {
    client: Client,
    base_url: String,
}

impl HttpTelemetrySink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Status(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn track_purchase(&self, event: &PurchaseEvent) -> Result<(), TelemetryError> {
        self.post(PURCHASE_PATH, event).await
    }

    async fn track_custom(&self, event: &CustomEvent) -> Result<(), TelemetryError> {
        self.post(CUSTOM_PATH, event).await
    }
}

/// Fire-and-forget front for a [`TelemetrySink`].
///
/// Every send runs on its own task; failures are logged and never reach the caller.
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
    product_title: String,
    currency: String,
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>, product_title: &str, currency: &str) -> Self {
        Self {
            sink,
            product_title: product_title.to_string(),
            currency: currency.to_string(),
        }
    }

    /// Settled payments go to the purchase sink only, never to the pixel stream.
    pub fn purchase(&self, value: f64, attribution: &AttributionContext) {
        let event = PurchaseEvent::new(value, &self.currency, attribution);
        info!(value, currency = %event.currency, utm_params = %event.utm_params, "UTM purchase event");

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.track_purchase(&event).await {
                warn!("Failed to send purchase event: {}", e);
            }
        });
    }

    pub fn pixel(&self, event: PixelEvent, page_url: &str, attribution: &AttributionContext) {
        let event =
            event.into_custom_event(&self.product_title, &self.currency, page_url, attribution);
        debug!(event = %event.event, "Pixel event");

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.track_custom(&event).await {
                warn!("Failed to send custom event {}: {}", event.event, e);
            }
        });
    }
}
