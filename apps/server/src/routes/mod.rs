pub mod status;
pub mod ws;

use axum::{
    http::{HeaderValue, Method},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    Router::new()
        .merge(status::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}
