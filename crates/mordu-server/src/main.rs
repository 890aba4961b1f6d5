//! mordu server - local store, periodic MongoDB sync and HTTP API
//!
//! Writes always land in the local JSON store first. The sync engine pushes
//! them to MongoDB whenever it is reachable.

mod config;

use anyhow::Result;
use axum::{http::HeaderValue, routing::get, Router};
use clap::Parser;
use mordu::oracle::Oracle;
use mordu::remote::MongoRemote;
use mordu::routes::{self, AppState};
use mordu::store::LocalStore;
use mordu::sync::SyncEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "mordu-server", version, about = "mordu fortune API server")]
struct Args {
    /// TOML config file; environment variables are used when omitted
    #[arg(short, long, env = "MORDU_CONFIG")]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mordu=info,mordu_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A TLS crypto provider was already installed");
    }

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    info!("Starting mordu server on {}:{}", config.host, config.port);

    // Local store first: a corrupt collection file stops startup
    info!("Opening local store in {}", config.data_dir.display());
    let readings = match LocalStore::open(&config.data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Cannot open local readings store: {}", e);
            return Err(e.into());
        }
    };
    let sessions = match LocalStore::open(&config.data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Cannot open local chats store: {}", e);
            return Err(e.into());
        }
    };

    let remote = Arc::new(MongoRemote::new(
        config.database_url.clone(),
        config.database_name.clone(),
        config.sync.clone(),
    ));
    let engine = Arc::new(SyncEngine::new(
        readings,
        sessions,
        remote,
        config.sync.clone(),
    ));
    engine.start(config.sync.interval()).await;

    let oracle = Oracle::from_config(config.oracle.clone(), config.typhoon_api_key.clone())?;
    let state = Arc::new(AppState::new(
        engine.clone(),
        oracle,
        config.environment.clone(),
    ));

    let app = build_router(state, &config)?;

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping periodic sync");
    engine.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

fn build_router(state: Arc<AppState>, config: &Config) -> Result<Router> {
    // CORS configuration
    let cors = match &config.frontend_url {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Ok(Router::new()
        .route("/", get(root))
        .merge(routes::configure(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

async fn root() -> &'static str {
    "mordu server"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
