use thiserror::Error;

/// Failures talking to the PIX provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed provider response: {0}")]
    MalformedBody(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckoutError {
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("cannot {action} while session is {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("session already finished")]
    SessionClosed,
    #[error("configuration error: {0}")]
    Config(String),
}

/// Shown to the customer whenever a charge cannot be generated.
pub const CHARGE_FAILED_MESSAGE: &str = "Erro ao gerar PIX. Tente novamente.";

/// Failures delivering a telemetry event. Always logged and discarded.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sink returned HTTP {0}")]
    Status(u16),
}
