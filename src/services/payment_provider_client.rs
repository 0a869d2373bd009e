use crate::app::config::Config;
use crate::app::error::ProviderError;
use crate::models::pix::{ChargeRequest, ChargeResponse, PixCharge, ProviderStatus, StatusResponse, VerifyRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The two calls the checkout makes against the PIX provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<PixCharge, ProviderError>;
    async fn verify(&self, transaction_id: &str) -> Result<ProviderStatus, ProviderError>;
}

pub struct PaymentProviderClient {
    client: Client,
    charge_url: String,
    verify_url: String,
}

impl PaymentProviderClient {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            charge_url: config.provider_charge_url.clone(),
            verify_url: config.provider_verify_url.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for PaymentProviderClient {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<PixCharge, ProviderError> {
        debug!(amount = request.amount, utm = %request.utm, "Requesting PIX charge");

        let response = self
            .client
            .post(&self.charge_url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Charge creation returned status: {}", status);
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: ChargeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedBody(e.to_string()))?;
        let charge = PixCharge::try_from(body)?;

        info!(transaction_id = %charge.transaction_id, "PIX charge created");
        Ok(charge)
    }

    async fn verify(&self, transaction_id: &str) -> Result<ProviderStatus, ProviderError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest {
                payment_id: transaction_id,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedBody(e.to_string()))?;
        Ok(body.status)
    }
}
