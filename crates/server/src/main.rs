//! Farmgate server binary.

use anyhow::{Context, Result};
use clap::Parser;
use farmgate_core::config::AppConfig;
use farmgate_server::bootstrap::ensure_admin_token;
use farmgate_server::{AppState, Bucket, BucketStores, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Farmgate - farm visitor registry API
#[derive(Parser, Debug)]
#[command(name = "farmgated")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "FARMGATE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Open one bucket and verify it is reachable before serving requests.
async fn open_bucket(config: &AppConfig, name: &str) -> Result<Bucket> {
    let store = farmgate_storage::from_config(&config.storage, name)
        .await
        .with_context(|| format!("failed to initialize bucket {name}"))?;
    store
        .health_check()
        .await
        .with_context(|| format!("storage health check failed for bucket {name}"))?;
    tracing::info!(bucket = %name, backend = store.backend_name(), "Bucket ready");
    Ok(Bucket::new(name, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Farmgate v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; env vars can provide or override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("FARMGATE_") && key != "FARMGATE_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: farmgated --config /path/to/config.toml\n  \
             2. Environment variables: FARMGATE_SERVER__BIND=0.0.0.0:8080 \
             FARMGATE_ADMIN__TOKEN_HASH=YOUR_TOKEN_HASH_HERE farmgated\n\n\
             See config/server.example.toml for example configuration.\n\
             Set FARMGATE_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("FARMGATE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let warnings = config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    for warning in warnings {
        tracing::warn!("{warning}");
    }

    farmgate_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let buckets = BucketStores {
        visitor: open_bucket(&config, &config.buckets.visitor_photos).await?,
        profile: open_bucket(&config, &config.buckets.profile_images).await?,
    };

    let metadata = farmgate_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_token(metadata.as_ref(), &config.admin).await?;

    let state = AppState::new(config.clone(), buckets, metadata.clone());

    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        farmgate_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    if config.audit.auto_purge_enabled {
        farmgate_server::audit::spawn_purge_task(metadata, config.audit.clone());
        tracing::info!(
            interval_secs = config.audit.auto_purge_interval_secs,
            retention_days = config.audit.retention_days,
            "System log auto-purge enabled"
        );
    } else {
        tracing::info!("System log auto-purge disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds client IP extraction for rate limiting.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
