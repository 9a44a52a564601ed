//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the websocket endpoint used by drawing clients, a read-only canvas
//! snapshot, and a health check under one Axum router. CORS follows the
//! configured origin list.

pub mod canvas;
pub mod ws;

use axum::Router;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::get;
use tower_http::cors::{self, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::CorsOrigins;
use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState, origins: &CorsOrigins) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/socket", get(ws::handle_ws))
        .route("/api/canvas", get(canvas::get_canvas))
        .route("/healthz", get(healthz))
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(cors::Any);

    match origins {
        CorsOrigins::Any => layer.allow_origin(cors::Any),
        CorsOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(%origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
