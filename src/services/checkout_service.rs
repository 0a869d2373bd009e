use crate::app::config::Config;
use crate::app::error::CheckoutError;
use crate::models::attribution::AttributionContext;
use crate::models::order::{OrderForm, ORDER_BUMP_PRICE, SECOND_ORDER_BUMP_PRICE};
use crate::models::pix::SessionSnapshot;
use crate::services::payment_provider_client::PaymentGateway;
use crate::services::payment_session::{PaymentSession, SessionExit, SessionHandle};
use crate::services::telemetry::{PixelEvent, Telemetry};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub type SessionStorage = Arc<DashMap<Uuid, SessionHandle>>;

/// Starts payment sessions and keeps a handle to each live one.
///
/// Every session runs on its own task and is dropped from storage once it exits.
pub struct CheckoutService {
    config: Config,
    gateway: Arc<dyn PaymentGateway>,
    telemetry: Telemetry,
    sessions: SessionStorage,
}

impl CheckoutService {
    pub fn new(config: Config, gateway: Arc<dyn PaymentGateway>, telemetry: Telemetry) -> Self {
        Self {
            config,
            gateway,
            telemetry,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn start_checkout(
        &self,
        form: OrderForm,
        attribution: AttributionContext,
        page_url: &str,
    ) -> Result<(Uuid, SessionSnapshot), CheckoutError> {
        let order_bump = form.order_bump;
        let second_order_bump = form.second_order_bump;
        let order = form.into_order(&self.config.product_title)?;

        // Fired on submit with the order total rather than on page load with the base price.
        self.telemetry.pixel(
            PixelEvent::InitiateCheckout {
                value: order.amount(),
            },
            page_url,
            &attribution,
        );
        if order_bump {
            self.telemetry.pixel(
                PixelEvent::AddToCart {
                    value: ORDER_BUMP_PRICE,
                },
                page_url,
                &attribution,
            );
        }
        if second_order_bump {
            self.telemetry.pixel(
                PixelEvent::AddToCart {
                    value: SECOND_ORDER_BUMP_PRICE,
                },
                page_url,
                &attribution,
            );
        }

        info!(order_id = %order.order_id(), amount = order.amount(), "Starting checkout");

        let (session, handle) = PaymentSession::new(
            order,
            attribution,
            self.config.session_settings(),
            &self.config.product_title,
            self.gateway.clone(),
            self.telemetry.clone(),
        );

        let id = Uuid::new_v4();
        let snapshot = handle.snapshot();
        self.sessions.insert(id, handle);

        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let exit = session.run().await;
            match &exit {
                SessionExit::Delivered { redirect_url } => {
                    info!(session_id = %id, %redirect_url, "Session delivered")
                }
                SessionExit::ReturnToOrderEntry => {
                    info!(session_id = %id, "Session returned to order entry")
                }
                SessionExit::Abandoned => info!(session_id = %id, "Session abandoned"),
            }
            sessions.remove(&id);
        });

        Ok((id, snapshot))
    }

    pub fn session(&self, id: &Uuid) -> Result<SessionHandle, CheckoutError> {
        self.sessions
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| CheckoutError::SessionNotFound(id.to_string()))
    }

    pub async fn retry(&self, id: &Uuid) -> Result<SessionSnapshot, CheckoutError> {
        let handle = self.session(id)?;
        handle.retry().await?;
        Ok(handle.snapshot())
    }

    pub async fn regenerate(&self, id: &Uuid) -> Result<SessionSnapshot, CheckoutError> {
        let handle = self.session(id)?;
        handle.regenerate().await?;
        Ok(handle.snapshot())
    }

    pub async fn abandon(&self, id: &Uuid) -> Result<(), CheckoutError> {
        let (_, handle) = self
            .sessions
            .remove(id)
            .ok_or_else(|| CheckoutError::SessionNotFound(id.to_string()))?;
        handle.abandon().await;
        Ok(())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedGateway;
    use super::*;
    use crate::models::pix::{PaymentState, ProviderStatus};
    use crate::services::telemetry::testing::RecordingSink;
    use std::time::Duration;

    fn service(status: ProviderStatus) -> (CheckoutService, Arc<FixedGateway>, Arc<RecordingSink>) {
        let gateway = Arc::new(FixedGateway::new(status));
        let sink = Arc::new(RecordingSink::default());
        let telemetry = Telemetry::new(sink.clone(), "Produto", "BRL");
        let config = Config {
            product_title: "Produto".to_string(),
            ..Config::default()
        };
        (CheckoutService::new(config, gateway.clone(), telemetry), gateway, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn start_checkout_charges_order_total() {
        let (service, gateway, sink) = service(ProviderStatus::Pending);
        let form = OrderForm {
            name: "Ana".into(),
            order_bump: true,
            ..OrderForm::default()
        };

        let (id, snapshot) = service
            .start_checkout(form, AttributionContext::new("utm_source=fb"), "https://c.example/")
            .unwrap();
        assert_eq!(snapshot.state, PaymentState::Loading);
        assert_eq!(service.active_sessions(), 1);

        let mut rx = service.session(&id).unwrap().subscribe();
        rx.wait_for(|s| s.state == PaymentState::Pending).await.unwrap();

        let request = gateway.requests.lock().unwrap()[0].clone();
        assert_eq!(request.amount, 2480);
        assert_eq!(request.item.price, 2480);
        assert_eq!(request.item.title, "Produto");

        let mut events: Vec<_> = sink
            .customs
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect();
        events.sort();
        assert_eq!(events, vec!["AddToCart", "InitiateCheckout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_session_leaves_storage() {
        let (service, _gateway, sink) = service(ProviderStatus::Completed);
        let (id, _) = service
            .start_checkout(OrderForm::default(), AttributionContext::default(), "")
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.active_sessions(), 0);
        assert!(matches!(
            service.session(&id),
            Err(CheckoutError::SessionNotFound(_))
        ));
        assert_eq!(sink.purchase_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_on_unknown_session_fail() {
        let (service, _gateway, _sink) = service(ProviderStatus::Pending);
        let id = Uuid::new_v4();
        assert!(matches!(
            service.retry(&id).await,
            Err(CheckoutError::SessionNotFound(_))
        ));
        assert!(service.abandon(&id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_leaves_storage_once_idle() {
        let (service, _gateway, sink) = service(ProviderStatus::Pending);
        let (id, _) = service
            .start_checkout(OrderForm::default(), AttributionContext::default(), "")
            .unwrap();

        let mut rx = service.session(&id).unwrap().subscribe();
        rx.wait_for(|s| s.state == PaymentState::Expired).await.unwrap();
        drop(rx);
        assert_eq!(service.active_sessions(), 1);

        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        assert_eq!(service.active_sessions(), 0);
        assert_eq!(sink.purchase_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_removes_session() {
        let (service, _gateway, _sink) = service(ProviderStatus::Pending);
        let (id, _) = service
            .start_checkout(OrderForm::default(), AttributionContext::default(), "")
            .unwrap();

        service.abandon(&id).await.unwrap();
        assert_eq!(service.active_sessions(), 0);
    }
}
