use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vimbalambi_relay::{
    app_state::AppState,
    config,
    router::build_router,
    store::{InMemoryMessageStore, MessageStore},
};

const CONFIG_PATH: &str = "vimbalambi.yaml";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = if std::path::Path::new(CONFIG_PATH).exists() {
        config::load_from_file(CONFIG_PATH).expect("config load failed")
    } else {
        tracing::info!(path = CONFIG_PATH, "no config file, using defaults");
        config::RelayConfig::default()
    };

    let listen: SocketAddr = cfg
        .relay
        .listen
        .parse()
        .expect("relay.listen must be a valid SocketAddr");

    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let state = AppState::new(cfg, store);
    let app = build_router(state);

    tracing::info!(%listen, "vimbalambi-relay starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
