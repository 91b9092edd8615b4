use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use connectrix::{
    AppState,
    backend::MemoryBackend,
    config::Config,
    preferences::RedisPreferenceStore,
    reporting::TracingReporter,
    routes,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let backend = Arc::new(MemoryBackend::new());
    if let Some(seed_file) = &config.seed_file {
        let seeded = backend
            .seed_from_file(seed_file)
            .await
            .expect("Failed to seed backend");
        tracing::info!("Seeded {} documents from {}", seeded, seed_file);
    }

    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    let reporter = Arc::new(TracingReporter::new());
    let mut notices = reporter.notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => {
                    tracing::info!("User notice ({}): {}", notice.operation, notice.message)
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} user notices", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = AppState {
        config: config.clone(),
        backend,
        preferences: Arc::new(RedisPreferenceStore::new(redis_client)),
        reporter,
    };

    let router = routes::router(state);

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router,
    )
    .await
    .expect("Failed to start server");
}
