use axum::{extract::State, routing::get, Json, Router};

use crate::state::{AppState, GatewayStatus};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<GatewayStatus> {
    Json(state.status())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::state::testing::test_state;

    #[tokio::test]
    async fn health_returns_ok() {
        let app = crate::routes::app(test_state(3));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn status_reports_counters() {
        let state = test_state(3);
        let _permit = state.admission.try_admit().expect("admit");
        let app = crate::routes::app(state);

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 4096).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["activeConnections"], 1);
        assert_eq!(json["maxConnections"], 3);
        assert_eq!(json["identifiedUsers"], 0);
        assert_eq!(json["protocolVersion"], 1);
    }
}
