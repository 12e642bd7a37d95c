//! Composition root: loads config, wires the Tracker/DataStore/RiskFilter/
//! PaperTrader/Scheduler together, and serves the dashboard query surface
//! over axum. Structure (tracing init, `AppState`, graceful shutdown via a
//! `watch` channel) follows the teacher's `main.rs`.

use anomaly_trader::api::routes;
use anomaly_trader::api::AppState;
use anomaly_trader::config::Config;
use anomaly_trader::datastore::DataStore;
use anomaly_trader::detectors::CooldownMap;
use anomaly_trader::exchange::HttpRestClient;
use anomaly_trader::labels::LabelGenerator;
use anomaly_trader::notifier::Notifier;
use anomaly_trader::orderbook::OrderBookMonitor;
use anomaly_trader::paper::account::VirtualAccount;
use anomaly_trader::paper::PositionManager;
use anomaly_trader::risk::RiskFilter;
use anomaly_trader::scheduler::Scheduler;
use anomaly_trader::tracker::Tracker;
use clap::Parser;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anomaly-trader")]
struct Cli {
    /// Path to a TOML config file; falls back to built-in defaults plus env overrides.
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Base URL for the polled REST data source (open interest / spot price).
    #[arg(long, env = "REST_BASE_URL", default_value = "http://localhost:9000")]
    rest_base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    info!(port = config.port, "loaded configuration");

    let store = Arc::new(DataStore::open(std::path::Path::new(&config.database_path))?);
    let tracker = Tracker::new();
    let orderbook = OrderBookMonitor::new();
    let cooldowns = CooldownMap::new();
    let risk = RiskFilter::new();
    let account = Arc::new(Mutex::new(VirtualAccount::new(config.trading.account.clone())));
    let positions = Arc::new(Mutex::new(PositionManager::new()));
    let labels = Arc::new(Mutex::new(LabelGenerator::new()));
    let notifier = Notifier::new(1024);

    let state = AppState {
        config: Arc::new(config),
        tracker,
        orderbook,
        cooldowns,
        risk,
        account,
        positions,
        labels,
        store,
        notifier,
    };

    let rest: Arc<dyn anomaly_trader::exchange::RestClient> = Arc::new(HttpRestClient::new(cli.rest_base_url));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(state.clone(), rest);
    let handles = scheduler.spawn(shutdown_rx);

    let app = routes::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    info!(%addr, "starting dashboard server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
