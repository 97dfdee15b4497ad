use clap::Parser;
use custody_service::config::{BackendConfig, ServiceConfig};
use custody_service::{build_router, ServiceState};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "custodyd", version, about = "Risk-gated custodial transaction service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CUSTODY_CONFIG")]
    config: Option<String>,

    /// REST socket address to bind, e.g. 127.0.0.1:8092
    #[arg(short, long, env = "CUSTODY_LISTEN_ADDR")]
    listen: Option<SocketAddr>,

    /// Wallet gateway base url. Replaces the configured backend with the HTTP gateway.
    #[arg(long, env = "CUSTODY_LEDGER_URL")]
    ledger_url: Option<String>,

    /// Log level
    #[arg(long, env = "CUSTODY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CUSTODY_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn apply_overrides(config: &mut ServiceConfig, cli: &Cli) {
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(url) = &cli.ledger_url {
        let timeout_ms = match &config.backend {
            BackendConfig::Http { timeout_ms, .. } => *timeout_ms,
            BackendConfig::Simulated { .. } => 10_000,
        };
        config.backend = BackendConfig::Http {
            url: url.clone(),
            timeout_ms,
        };
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.json = true;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    init_tracing(&config.logging.level, config.logging.json);

    let state = ServiceState::bootstrap(&config)?;
    let manager = state.manager.clone();
    let mut app = build_router(state.clone());
    if config.server.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!(
        backend = state.backend,
        warn_policy = ?config.pipeline.warn_policy,
        "custody-service REST listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let cancelled = manager.shutdown();
    info!(cancelled, "custody-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
