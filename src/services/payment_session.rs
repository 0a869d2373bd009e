//! Payment session controller.
//!
//! [`SessionCore`] owns all session state and is only mutated through
//! [`SessionCore::handle`]. [`PaymentSession`] drives a core from a single
//! tokio task: it owns the countdown and poll intervals, runs the provider
//! calls on spawned tasks and feeds their results back as events tagged with
//! the charge generation they were issued for.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::config::SessionSettings;
use crate::app::error::{CheckoutError, CHARGE_FAILED_MESSAGE};
use crate::models::attribution::AttributionContext;
use crate::models::order::Order;
use crate::models::pix::{ChargeRequest, PaymentState, PixCharge, ProviderStatus, SessionSnapshot};
use crate::services::payment_provider_client::PaymentGateway;
use crate::services::telemetry::Telemetry;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ChargeCreated { generation: u64, charge: PixCharge },
    ChargeFailed { generation: u64, reason: String },
    /// One second of the expiry countdown elapsed.
    Tick,
    PollDue,
    PollResult { generation: u64, status: ProviderStatus },
    PollFailed { generation: u64, reason: String },
    Retry,
    Regenerate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateCharge { generation: u64, request: ChargeRequest },
    Poll { generation: u64, transaction_id: String },
    ResetTimers,
    FirePurchase { value: f64, attribution: AttributionContext },
    Deliver { url: String, after: Duration },
    ReturnToOrderEntry { after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Delivered { redirect_url: String },
    ReturnToOrderEntry,
    Abandoned,
}

pub struct SessionCore {
    order: Order,
    attribution: AttributionContext,
    settings: SessionSettings,
    product_title: String,
    state: PaymentState,
    generation: u64,
    charge: Option<PixCharge>,
    seconds_left: u64,
    bonus_seconds_left: u64,
    consecutive_failures: u32,
    error_message: Option<String>,
    bonus_earned: Option<bool>,
    redirect_url: Option<String>,
}

impl SessionCore {
    pub fn new(
        order: Order,
        attribution: AttributionContext,
        settings: SessionSettings,
        product_title: &str,
    ) -> Self {
        Self {
            seconds_left: settings.expiry_secs,
            bonus_seconds_left: settings.bonus_window_secs,
            order,
            attribution,
            settings,
            product_title: product_title.to_string(),
            state: PaymentState::Loading,
            generation: 0,
            charge: None,
            consecutive_failures: 0,
            error_message: None,
            bonus_earned: None,
            redirect_url: None,
        }
    }

    /// Issues the first charge request.
    pub fn begin(&mut self) -> Vec<Effect> {
        self.start_charge()
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn charge(&self) -> Option<&PixCharge> {
        self.charge.as_ref()
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<Effect>, CheckoutError> {
        let effects = match event {
            SessionEvent::ChargeCreated { generation, charge } => {
                if !self.is_current(generation, PaymentState::Loading) {
                    debug!(generation, "Dropping stale charge");
                    return Ok(Vec::new());
                }
                info!(
                    order_id = %self.order.order_id(),
                    transaction_id = %charge.transaction_id,
                    "Awaiting PIX payment"
                );
                self.charge = Some(charge);
                self.state = PaymentState::Pending;
                self.consecutive_failures = 0;
                self.error_message = None;
                vec![Effect::ResetTimers]
            }
            SessionEvent::ChargeFailed { generation, reason } => {
                if !self.is_current(generation, PaymentState::Loading) {
                    return Ok(Vec::new());
                }
                self.consecutive_failures += 1;
                error!(
                    order_id = %self.order.order_id(),
                    failures = self.consecutive_failures,
                    "Failed to generate PIX: {}",
                    reason
                );
                self.state = PaymentState::Error;
                self.error_message = Some(CHARGE_FAILED_MESSAGE.to_string());

                let limit = self.settings.auto_return_after_failures;
                if limit > 0 && self.consecutive_failures >= limit {
                    warn!(order_id = %self.order.order_id(), "Returning customer to order entry");
                    vec![Effect::ReturnToOrderEntry {
                        after: self.settings.auto_return_delay,
                    }]
                } else {
                    Vec::new()
                }
            }
            SessionEvent::Tick => {
                if self.state != PaymentState::Pending {
                    return Ok(Vec::new());
                }
                self.seconds_left = self.seconds_left.saturating_sub(1);
                self.bonus_seconds_left = self.bonus_seconds_left.saturating_sub(1);
                if self.seconds_left == 0 {
                    info!(order_id = %self.order.order_id(), "PIX expired");
                    self.state = PaymentState::Expired;
                }
                Vec::new()
            }
            SessionEvent::PollDue => match (&self.state, &self.charge) {
                (PaymentState::Pending, Some(charge)) => vec![Effect::Poll {
                    generation: self.generation,
                    transaction_id: charge.transaction_id.clone(),
                }],
                _ => Vec::new(),
            },
            SessionEvent::PollResult { generation, status } => {
                if !self.is_current(generation, PaymentState::Pending) {
                    debug!(generation, state = self.state.as_str(), "Ignoring late poll result");
                    return Ok(Vec::new());
                }
                if status.is_completed() {
                    self.complete()
                } else {
                    Vec::new()
                }
            }
            SessionEvent::PollFailed { generation, reason } => {
                warn!(generation, "Erro ao verificar pagamento: {}", reason);
                Vec::new()
            }
            SessionEvent::Retry => {
                self.require(PaymentState::Error, "retry")?;
                self.start_charge()
            }
            SessionEvent::Regenerate => {
                self.require(PaymentState::Expired, "regenerate")?;
                self.seconds_left = self.settings.expiry_secs;
                self.start_charge()
            }
        };
        Ok(effects)
    }

    fn is_current(&self, generation: u64, state: PaymentState) -> bool {
        generation == self.generation && self.state == state
    }

    fn require(&self, state: PaymentState, action: &'static str) -> Result<(), CheckoutError> {
        if self.state == state {
            Ok(())
        } else {
            Err(CheckoutError::InvalidTransition {
                action,
                state: self.state.as_str(),
            })
        }
    }

    fn start_charge(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.state = PaymentState::Loading;
        self.charge = None;
        self.error_message = None;
        vec![Effect::CreateCharge {
            generation: self.generation,
            request: ChargeRequest::for_order(&self.order, &self.attribution, &self.product_title),
        }]
    }

    fn complete(&mut self) -> Vec<Effect> {
        self.state = PaymentState::Completed;
        let earned = self.order.bonus_opt_in()
            && self.settings.bonus_window_secs > 0
            && self.bonus_seconds_left > 0;
        self.bonus_earned = Some(earned);

        let url = self.attribution.append_to(&self.settings.delivery_url);
        self.redirect_url = Some(url.clone());
        info!(order_id = %self.order.order_id(), bonus_earned = earned, "PIX payment completed");

        vec![
            Effect::FirePurchase {
                value: self.order.amount(),
                attribution: self.attribution.clone(),
            },
            Effect::Deliver {
                url,
                after: self.settings.redirect_delay,
            },
        ]
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let total = self.settings.expiry_secs.max(1);
        let elapsed = total.saturating_sub(self.seconds_left);
        SessionSnapshot {
            state: self.state,
            order_id: self.order.order_id().to_string(),
            amount: self.order.amount(),
            items: self.order.items().to_vec(),
            pix_code: self.charge.as_ref().map(|c| c.pix_code.clone()),
            transaction_id: self.charge.as_ref().map(|c| c.transaction_id.clone()),
            seconds_left: self.seconds_left,
            countdown: format_countdown(self.seconds_left),
            bonus_seconds_left: self.bonus_seconds_left,
            progress_percent: elapsed as f64 / total as f64 * 100.0,
            error_message: self.error_message.clone(),
            bonus_earned: self.bonus_earned,
            redirect_url: self.redirect_url.clone(),
        }
    }
}

/// `MM:SS`
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub enum SessionCommand {
    Retry(oneshot::Sender<Result<(), CheckoutError>>),
    Regenerate(oneshot::Sender<Result<(), CheckoutError>>),
    Abandon,
}

/// Cloneable handle used by the UI/API to observe and steer a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub async fn retry(&self) -> Result<(), CheckoutError> {
        self.request(SessionCommand::Retry).await
    }

    pub async fn regenerate(&self) -> Result<(), CheckoutError> {
        self.request(SessionCommand::Regenerate).await
    }

    pub async fn abandon(&self) {
        let _ = self.commands.send(SessionCommand::Abandon).await;
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), CheckoutError>>) -> SessionCommand,
    ) -> Result<(), CheckoutError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| CheckoutError::SessionClosed)?;
        response.await.map_err(|_| CheckoutError::SessionClosed)?
    }
}

pub struct PaymentSession {
    core: SessionCore,
    gateway: Arc<dyn PaymentGateway>,
    telemetry: Telemetry,
    commands: mpsc::Receiver<SessionCommand>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl PaymentSession {
    pub fn new(
        order: Order,
        attribution: AttributionContext,
        settings: SessionSettings,
        product_title: &str,
        gateway: Arc<dyn PaymentGateway>,
        telemetry: Telemetry,
    ) -> (Self, SessionHandle) {
        let core = SessionCore::new(order, attribution, settings, product_title);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());

        let session = Self {
            core,
            gateway,
            telemetry,
            commands: command_rx,
            snapshot: snapshot_tx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        (session, handle)
    }

    pub async fn run(self) -> SessionExit {
        let PaymentSession {
            mut core,
            gateway,
            telemetry,
            mut commands,
            snapshot,
        } = self;

        let (results_tx, mut results) = mpsc::unbounded_channel();
        let mut timers = Timers::new(core.settings.poll_interval);
        let mut exit: Option<(Instant, SessionExit)> = None;
        let mut idle: Option<Instant> = None;
        let idle_timeout = core.settings.idle_timeout;

        let mut driver = Driver {
            gateway,
            telemetry,
            results: results_tx,
        };

        let effects = core.begin();
        driver.apply(effects, &mut timers, &mut exit);
        snapshot.send_replace(core.snapshot());

        loop {
            idle = idle_deadline(core.state(), idle, idle_timeout);
            let pending = core.state() == PaymentState::Pending;
            let exit_deadline = exit.as_ref().map(|(at, _)| *at).unwrap_or_else(Instant::now);
            let idle_at = idle.unwrap_or_else(Instant::now);

            let event = tokio::select! {
                Some(event) = results.recv() => event,
                _ = timers.countdown.tick(), if pending => SessionEvent::Tick,
                _ = timers.poll.tick(), if pending => SessionEvent::PollDue,
                _ = sleep_until(exit_deadline), if exit.is_some() => {
                    if let Some((_, exit)) = exit.take() {
                        if let SessionExit::Delivered { redirect_url } = &exit {
                            info!(%redirect_url, "Redirecting to delivery");
                        }
                        return exit;
                    }
                    continue;
                }
                _ = sleep_until(idle_at), if idle.is_some() => {
                    info!(
                        order_id = %core.order().order_id(),
                        state = core.state().as_str(),
                        "Session idle, dropping"
                    );
                    return SessionExit::Abandoned;
                }
                command = commands.recv() => match command {
                    Some(SessionCommand::Retry(reply)) => {
                        let result = Self::command(&mut core, &mut driver, &mut timers, &mut exit, SessionEvent::Retry);
                        snapshot.send_replace(core.snapshot());
                        let _ = reply.send(result);
                        continue;
                    }
                    Some(SessionCommand::Regenerate(reply)) => {
                        let result = Self::command(&mut core, &mut driver, &mut timers, &mut exit, SessionEvent::Regenerate);
                        snapshot.send_replace(core.snapshot());
                        let _ = reply.send(result);
                        continue;
                    }
                    Some(SessionCommand::Abandon) | None => {
                        info!(order_id = %core.order().order_id(), "Session abandoned");
                        return SessionExit::Abandoned;
                    }
                },
            };

            match core.handle(event) {
                Ok(effects) => driver.apply(effects, &mut timers, &mut exit),
                Err(e) => warn!("Rejected session event: {}", e),
            }
            snapshot.send_replace(core.snapshot());
        }
    }

    fn command(
        core: &mut SessionCore,
        driver: &mut Driver,
        timers: &mut Timers,
        exit: &mut Option<(Instant, SessionExit)>,
        event: SessionEvent,
    ) -> Result<(), CheckoutError> {
        let effects = core.handle(event)?;
        // A manual retry wins over a scheduled return to order entry.
        if matches!(exit, Some((_, SessionExit::ReturnToOrderEntry))) {
            *exit = None;
        }
        driver.apply(effects, timers, exit);
        Ok(())
    }
}

/// Arms the idle deadline when the session comes to rest in `expired` or
/// `error`, keeps it while it stays there and clears it otherwise.
fn idle_deadline(state: PaymentState, current: Option<Instant>, timeout: Duration) -> Option<Instant> {
    match state {
        PaymentState::Expired | PaymentState::Error if !timeout.is_zero() => {
            current.or_else(|| Some(Instant::now() + timeout))
        }
        _ => None,
    }
}

struct Timers {
    countdown: Interval,
    poll: Interval,
    poll_period: Duration,
}

impl Timers {
    fn new(poll_period: Duration) -> Self {
        Self {
            countdown: delayed_interval(COUNTDOWN_TICK),
            poll: delayed_interval(poll_period),
            poll_period,
        }
    }

    fn reset(&mut self) {
        self.countdown = delayed_interval(COUNTDOWN_TICK);
        self.poll = delayed_interval(self.poll_period);
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

struct Driver {
    gateway: Arc<dyn PaymentGateway>,
    telemetry: Telemetry,
    results: mpsc::UnboundedSender<SessionEvent>,
}

impl Driver {
    fn apply(
        &mut self,
        effects: Vec<Effect>,
        timers: &mut Timers,
        exit: &mut Option<(Instant, SessionExit)>,
    ) {
        for effect in effects {
            match effect {
                Effect::CreateCharge { generation, request } => {
                    let gateway = self.gateway.clone();
                    let results = self.results.clone();
                    tokio::spawn(async move {
                        let event = match gateway.create_charge(&request).await {
                            Ok(charge) => SessionEvent::ChargeCreated { generation, charge },
                            Err(e) => SessionEvent::ChargeFailed {
                                generation,
                                reason: e.to_string(),
                            },
                        };
                        let _ = results.send(event);
                    });
                }
                Effect::Poll {
                    generation,
                    transaction_id,
                } => {
                    let gateway = self.gateway.clone();
                    let results = self.results.clone();
                    tokio::spawn(async move {
                        let event = match gateway.verify(&transaction_id).await {
                            Ok(status) => SessionEvent::PollResult { generation, status },
                            Err(e) => SessionEvent::PollFailed {
                                generation,
                                reason: e.to_string(),
                            },
                        };
                        let _ = results.send(event);
                    });
                }
                Effect::ResetTimers => timers.reset(),
                Effect::FirePurchase { value, attribution } => {
                    self.telemetry.purchase(value, &attribution);
                }
                Effect::Deliver { url, after } => {
                    *exit = Some((
                        Instant::now() + after,
                        SessionExit::Delivered { redirect_url: url },
                    ));
                }
                Effect::ReturnToOrderEntry { after } => {
                    *exit = Some((Instant::now() + after, SessionExit::ReturnToOrderEntry));
                }
            }
        }
    }
}
