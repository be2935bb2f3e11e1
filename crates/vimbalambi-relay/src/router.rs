//! Axum router wiring (HTTP -> WS upgrade, metrics).

use axum::{extract::State, routing::get, Router};

use crate::{app_state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(transport::ws::ws_upgrade))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

async fn render_metrics(State(app): State<AppState>) -> String {
    app.metrics.render()
}
