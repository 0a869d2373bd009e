use serde::{Deserialize, Serialize};

use crate::app::error::ProviderError;
use crate::models::attribution::AttributionContext;
use crate::models::order::{LineItem, Order};

pub const PLACEHOLDER_NAME: &str = "Cliente";
pub const PLACEHOLDER_EMAIL: &str = "cliente@checkout.com";
pub const PLACEHOLDER_PHONE: &str = "11999999999";
/// No CPF is collected by the form, so every charge carries this one.
pub const PLACEHOLDER_DOCUMENT: &str = "11111111111";

// Payload enviado ao provedor PIX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: u64,
    pub description: String,
    pub customer: Customer,
    pub item: Item,
    pub utm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub document: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    pub price: u64,
    pub quantity: u32,
}

impl ChargeRequest {
    pub fn for_order(order: &Order, attribution: &AttributionContext, title: &str) -> Self {
        let cents = order.amount_cents();
        Self {
            amount: cents,
            description: title.to_string(),
            customer: Customer {
                name: or_placeholder(order.customer_name(), PLACEHOLDER_NAME),
                document: PLACEHOLDER_DOCUMENT.to_string(),
                phone: or_placeholder(&digits_only(order.customer_phone()), PLACEHOLDER_PHONE),
                email: or_placeholder(order.customer_email(), PLACEHOLDER_EMAIL),
            },
            item: Item {
                title: title.to_string(),
                price: cents,
                quantity: 1,
            },
            utm: attribution.provider_tag().to_string(),
        }
    }
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Raw charge-creation body. Both fields are optional on the wire so a
/// `{}` body can be told apart from a transport failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeResponse {
    pub pix_code: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixCharge {
    pub pix_code: String,
    pub transaction_id: String,
}

impl TryFrom<ChargeResponse> for PixCharge {
    type Error = ProviderError;

    fn try_from(response: ChargeResponse) -> Result<Self, Self::Error> {
        let pix_code = non_empty(response.pix_code)
            .ok_or_else(|| ProviderError::MalformedBody("missing pixCode".into()))?;
        let transaction_id = non_empty(response.transaction_id)
            .ok_or_else(|| ProviderError::MalformedBody("missing transactionId".into()))?;
        Ok(Self {
            pix_code,
            transaction_id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<'a> {
    pub payment_id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Pending,
    Completed,
    #[serde(other)]
    Unknown,
}

impl ProviderStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, ProviderStatus::Completed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: ProviderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Loading,
    Pending,
    Completed,
    Expired,
    Error,
}

impl PaymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Loading => "loading",
            PaymentState::Pending => "pending",
            PaymentState::Completed => "completed",
            PaymentState::Expired => "expired",
            PaymentState::Error => "error",
        }
    }
}

/// What the payment screen renders at a given instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: PaymentState,
    pub order_id: String,
    pub amount: f64,
    pub items: Vec<LineItem>,
    pub pix_code: Option<String>,
    pub transaction_id: Option<String>,
    pub seconds_left: u64,
    pub countdown: String,
    pub bonus_seconds_left: u64,
    pub progress_percent: f64,
    pub error_message: Option<String>,
    pub bonus_earned: Option<bool>,
    pub redirect_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(name: &str, email: &str, phone: &str, amount: f64) -> Order {
        Order::simple(name, email, phone, amount).unwrap()
    }

    #[test]
    fn charge_request_uses_cents_for_amount_and_item() {
        let request = ChargeRequest::for_order(
            &order("Ana", "ana@x.com", "(11) 98888-7777", 24.80),
            &AttributionContext::new("utm_source=fb"),
            "Produto",
        );

        assert_eq!(request.amount, 2480);
        assert_eq!(request.item.price, request.amount);
        assert_eq!(request.item.quantity, 1);
        assert_eq!(request.customer.phone, "11988887777");
        assert_eq!(request.customer.document, PLACEHOLDER_DOCUMENT);
        assert_eq!(request.utm, "utm_source=fb");
    }

    #[test]
    fn charge_request_fills_placeholders() {
        let request = ChargeRequest::for_order(
            &order(" ", "", "abc", 14.90),
            &AttributionContext::default(),
            "Produto",
        );

        assert_eq!(request.amount, 1490);
        assert_eq!(request.customer.name, PLACEHOLDER_NAME);
        assert_eq!(request.customer.email, PLACEHOLDER_EMAIL);
        assert_eq!(request.customer.phone, PLACEHOLDER_PHONE);
        assert_eq!(request.utm, "checkout-espiao");
    }

    #[test]
    fn charge_request_wire_shape() {
        let request = ChargeRequest::for_order(
            &order("Ana", "ana@x.com", "11", 14.90),
            &AttributionContext::default(),
            "Produto",
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["item"]["price"], 1490);
        assert_eq!(json["customer"]["document"], "11111111111");
    }

    #[test]
    fn empty_body_is_malformed() {
        let response: ChargeResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            PixCharge::try_from(response),
            Err(ProviderError::MalformedBody(_))
        ));

        let response: ChargeResponse =
            serde_json::from_str(r#"{"pixCode":"000201","transactionId":""}"#).unwrap();
        assert!(PixCharge::try_from(response).is_err());
    }

    #[test]
    fn complete_body_is_a_charge() {
        let response: ChargeResponse =
            serde_json::from_str(r#"{"pixCode":"000201","transactionId":"tx-1"}"#).unwrap();
        let charge = PixCharge::try_from(response).unwrap();
        assert_eq!(charge.transaction_id, "tx-1");
    }

    #[test]
    fn unknown_status_is_not_completed() {
        let status: StatusResponse = serde_json::from_str(r#"{"status":"refunded"}"#).unwrap();
        assert_eq!(status.status, ProviderStatus::Unknown);
        assert!(!status.status.is_completed());

        let status: StatusResponse = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert!(status.status.is_completed());
    }
}
