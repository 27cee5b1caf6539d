use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fleet_tracker::alerting::evaluation_service::{AlertDedupPolicy, EvaluationService};
use fleet_tracker::db::schema::ensure_tracking_constraints;
use fleet_tracker::db::services::PgStore;
use fleet_tracker::server::config::ServerConfig;
use fleet_tracker::server::hub::{HubConfig, HubHandle};
use fleet_tracker::tracking::geofence::GeofenceMatcher;
use fleet_tracker::web::{AppState, create_axum_router};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // File: JSON, rotated daily
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Logging needs the log directory, so configuration comes first.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };
    init_logging(&server_config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting fleet tracker.");

    // --- Database ---
    let mut opt = ConnectOptions::new(server_config.database_url.clone());
    opt.max_connections(10).sqlx_logging(false);
    let db: DatabaseConnection = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Failed to connect to the database.");
        e
    })?;
    ensure_tracking_constraints(&db).await?;
    let store = Arc::new(PgStore::new(db));

    // --- Live hub and services ---
    let hub = HubHandle::spawn(HubConfig {
        client_buffer: server_config.hub_client_buffer,
        ..HubConfig::default()
    });
    let app_state = Arc::new(AppState::new(
        server_config.clone(),
        store.clone(),
        store.clone(),
        hub.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let evaluation_service = Arc::new(
        EvaluationService::new(
            app_state.shifts.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(GeofenceMatcher::new(store.clone())),
            hub,
        )
        .with_dedup(AlertDedupPolicy::from_minutes(server_config.alert_dedup_minutes)),
    );
    let evaluation_handle = tokio::spawn(evaluation_service.start_periodic_evaluation(
        Duration::from_secs(server_config.alert_check_interval_seconds),
        shutdown_rx,
    ));

    // --- HTTP ---
    let addr: SocketAddr = server_config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening.");
    let app = create_axum_router(app_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Err(e) = evaluation_handle.await {
        error!(error = %e, "Alert evaluation task ended abnormally.");
    }
    info!("Fleet tracker stopped.");
    Ok(())
}
