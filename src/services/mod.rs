pub mod checkout_service;
pub mod payment_provider_client;
pub mod payment_session;
pub mod telemetry;

pub use checkout_service::CheckoutService;
pub use payment_provider_client::{PaymentGateway, PaymentProviderClient};
pub use payment_session::{PaymentSession, SessionExit, SessionHandle};
pub use telemetry::{HttpTelemetrySink, Telemetry, TelemetrySink};
