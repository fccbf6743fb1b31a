//! rmk-daemon entry point.
//!
//! Sets up tracing, loads config, builds the shared state for the configured
//! backend, wires middleware, and starts the HTTP server. Handlers live in
//! `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rmk_config::{
    report_unused_keys, BackendKind, ConfigService, DaemonSettings, DatabaseSettings,
    LoadedConfig, PricingSettings, UnusedKeyPolicy,
};
use rmk_daemon::{routes, state::AppState};
use rmk_pricing::RuleBook;
use rmk_reconcile::MemoryCatalog;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

/// Comma-separated YAML layers, lowest precedence first.
const ENV_CONFIG: &str = "RMK_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = load_config()?;
    let unused = report_unused_keys(
        ConfigService::Daemon,
        &cfg.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "unused config keys");
    }
    let daemon = DaemonSettings::from_config(&cfg.config_json)?;
    let pricing = PricingSettings::from_config(&cfg.config_json)?;

    let shared = match daemon.backend {
        BackendKind::Memory => {
            warn!("memory backend: catalog and rules are lost on exit");
            AppState::in_memory(Arc::new(MemoryCatalog::new()), RuleBook::new(), pricing)
        }
        BackendKind::Postgres => {
            let url = DatabaseSettings::from_config(&cfg.config_json)?.require_url()?;
            let pool = rmk_db::connect(&url).await?;
            let st = rmk_db::status(&pool).await?;
            if !st.has_catalog_tables {
                anyhow::bail!("database has no catalog tables; run `rmk db migrate` first");
            }
            AppState::postgres(pool, pricing)
        }
    }
    .with_config_hash(cfg.config_hash.clone());
    let shared = Arc::new(shared);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = daemon
        .addr
        .parse()
        .with_context(|| format!("invalid daemon addr {}", daemon.addr))?;
    info!(
        backend = shared.rules.backend_name(),
        config_hash = %cfg.config_hash,
        "rmk-daemon listening on http://{}",
        addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG) {
        Ok(v) if !v.trim().is_empty() => {
            let paths: Vec<&str> = v.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
            rmk_config::load_layered_yaml(&paths)
        }
        _ => LoadedConfig::empty(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
