use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use keyserver::config;
use keyserver::extractor::AdminSecret;
use keyserver::interactions::InteractionSettings;
use keyserver::keys::{FileKeyStore, KeyService};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    let lifecycle = config::lifecycle_config_from_env();
    let store = FileKeyStore::open(config::KEYS_FILE.as_str())
        .await
        .with_context(|| format!("failed to load key store from {}", config::KEYS_FILE.as_str()))?;
    let service = Arc::new(KeyService::new(store, lifecycle));
    tracing::info!(
        require_owner = lifecycle.require_owner,
        hwid_binding = lifecycle.hwid_binding,
        single_use = lifecycle.single_use,
        owner_policy = lifecycle.owner_policy.as_str(),
        "key lifecycle configured"
    );

    let admin_secret = AdminSecret(config::ADMIN_SECRET.clone());
    if admin_secret.0.is_none() {
        tracing::warn!("ADMIN_SECRET not set; admin endpoints will reject all requests");
    }

    let interaction_settings = InteractionSettings::from_hex(
        config::DISCORD_PUBLIC_KEY.as_deref(),
        config::DISCORD_ADMIN_IDS.clone(),
    )
    .context("failed to parse DISCORD_PUBLIC_KEY")?;
    if interaction_settings.public_key.is_none() {
        tracing::warn!("DISCORD_PUBLIC_KEY not set; chat interactions are disabled");
    }

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = keyserver::app(service, admin_secret, Arc::new(interaction_settings))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .context("invalid bind address")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
