//! Read-only canvas snapshot over HTTP.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::frame::FRAME_OBJECTS;
use crate::services;
use crate::state::AppState;

/// `GET /api/canvas` → `{"objects": [...]}`, the same shape list a new
/// websocket connection receives in `object_sync`.
pub async fn get_canvas(State(state): State<AppState>) -> Response {
    match services::session::snapshot(&state).await {
        Ok(objects) => Json(serde_json::json!({ FRAME_OBJECTS: objects })).into_response(),
        Err(e) => {
            warn!(error = %e, "canvas snapshot failed");
            (StatusCode::SERVICE_UNAVAILABLE, "event store unavailable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers;
    use serde_json::{Value, json};
    use uuid::Uuid;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn returns_reconstructed_objects() {
        let state = test_helpers::test_app_state();
        let client = Uuid::new_v4();
        let frame = crate::frame::Frame::new("object_added", Some(json!({"id": "a", "w": 10})));
        services::session::handle_mutation(&state, client, frame)
            .await
            .unwrap();

        let response = get_canvas(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"objects": [{"id": "a", "w": 10}]}));
    }

    #[tokio::test]
    async fn empty_canvas_returns_empty_list() {
        let response = get_canvas(State(test_helpers::test_app_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"objects": []}));
    }

    #[tokio::test]
    async fn store_down_is_service_unavailable() {
        let response = get_canvas(State(test_helpers::failing_app_state())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
