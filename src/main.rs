use anyhow::Context;
use clap::{Parser, Subcommand};
use pix_checkout::app::config::Config;
use pix_checkout::handlers;
use pix_checkout::models::attribution::AttributionContext;
use pix_checkout::models::order::Order;
use pix_checkout::models::pix::PaymentState;
use pix_checkout::services::{
    CheckoutService, HttpTelemetrySink, PaymentProviderClient, PaymentSession, SessionExit,
    Telemetry,
};
use pix_checkout::utils::money;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the checkout API and the tracking endpoints
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single PIX payment from the terminal
    Pay {
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        /// Landing query string, e.g. `utm_source=fb&utm_campaign=x`
        #[arg(long, default_value = "")]
        query: String,
        /// Full landing URL; its query string becomes the attribution
        #[arg(long, conflicts_with = "query")]
        landing_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pix_checkout=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };
    config.validate()?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            serve(config).await
        }
        Command::Pay {
            amount,
            name,
            email,
            phone,
            query,
            landing_url,
        } => {
            let attribution = attribution(query, landing_url.as_deref());
            pay(config, Order::simple(name, email, phone, amount)?, attribution).await
        }
    }
}

fn attribution(query: String, landing_url: Option<&str>) -> AttributionContext {
    match landing_url {
        Some(url) => AttributionContext::from_landing_url(url),
        None => AttributionContext::new(query),
    }
}

fn telemetry(config: &Config) -> anyhow::Result<Telemetry> {
    let sink = HttpTelemetrySink::new(
        &config.telemetry_base_url,
        Duration::from_millis(config.http_timeout_ms),
    )
    .context("building telemetry client")?;
    Ok(Telemetry::new(Arc::new(sink), &config.product_title, &config.currency))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Starting PIX checkout server on port {}", config.server_port);

    let gateway = Arc::new(PaymentProviderClient::new(&config).context("building provider client")?);
    let telemetry = telemetry(&config)?;
    let addr = format!("0.0.0.0:{}", config.server_port);
    let service = Arc::new(CheckoutService::new(config, gateway, telemetry));

    let app = handlers::router(service);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn pay(config: Config, order: Order, attribution: AttributionContext) -> anyhow::Result<()> {
    info!(
        order_id = %order.order_id(),
        "Pedido de {} via PIX",
        money::format_brl(order.amount())
    );

    let gateway = Arc::new(PaymentProviderClient::new(&config).context("building provider client")?);
    let (session, handle) = PaymentSession::new(
        order,
        attribution,
        config.session_settings(),
        &config.product_title,
        gateway,
        telemetry(&config)?,
    );
    let mut run = tokio::spawn(session.run());
    let mut updates = handle.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut last_state = None;
    let mut stdin_open = true;
    let mut updates_open = true;

    loop {
        tokio::select! {
            exit = &mut run => {
                match exit? {
                    SessionExit::Delivered { redirect_url } => println!("Pagamento aprovado: {}", redirect_url),
                    SessionExit::ReturnToOrderEntry => println!("Não foi possível gerar o PIX. Volte ao pedido."),
                    SessionExit::Abandoned => println!("Pagamento cancelado."),
                }
                return Ok(());
            }
            changed = updates.changed(), if updates_open => {
                if changed.is_err() {
                    updates_open = false;
                    continue;
                }
                let snapshot = updates.borrow_and_update().clone();
                if last_state == Some(snapshot.state) {
                    continue;
                }
                last_state = Some(snapshot.state);
                match snapshot.state {
                    PaymentState::Loading => println!("Gerando PIX..."),
                    PaymentState::Pending => {
                        println!("PIX copia e cola:\n{}", snapshot.pix_code.unwrap_or_default());
                        println!("Faltam {} minutos para o pix expirar...", snapshot.countdown);
                    }
                    PaymentState::Completed => println!("Pagamento confirmado!"),
                    PaymentState::Expired => println!("PIX expirado. Digite 'n' para gerar um novo."),
                    PaymentState::Error => println!(
                        "{} Digite 'r' para tentar novamente.",
                        snapshot.error_message.unwrap_or_default()
                    ),
                }
            }
            line = stdin.next_line(), if stdin_open => {
                let result = match line?.as_deref().map(str::trim) {
                    Some("r") => handle.retry().await,
                    Some("n") => handle.regenerate().await,
                    Some("q") | None => {
                        stdin_open = false;
                        handle.abandon().await;
                        Ok(())
                    }
                    Some(_) => Ok(()),
                };
                if let Err(e) = result {
                    warn!("{}", e);
                }
            }
        }
    }
}
