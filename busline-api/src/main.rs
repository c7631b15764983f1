use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use busline_api::{app, AppState, AuthConfig};
use busline_store::{app_config::Config, open_repositories, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "busline_api=debug,busline_store=info,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    let repositories = open_repositories(&config.database)
        .await
        .context("Failed to open storage")?;

    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("redis.url not set, rate limiting disabled");
            None
        }
    };

    let state = AppState::new(
        repositories,
        config.rules.clone(),
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        redis,
        config.rate_limit.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
