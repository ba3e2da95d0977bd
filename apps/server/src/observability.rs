use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

static PROCESS_TRACE_ID: OnceLock<String> = OnceLock::new();

/// Installs the global JSON subscriber. Production defaults to errors only.
pub fn init_tracing(production: bool) {
    let directive = filter_directive(production, |key| std::env::var(key).ok());

    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(EnvFilter::new(&directive))
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!(
        component = "bootstrap",
        trace_id = %trace_id(),
        filter = %directive,
        protocol_version = shared_proto::signaling::PROTOCOL_VERSION,
        production,
        "gateway tracing initialized"
    );
}

/// `APP_LOG_LEVEL` wins over `RUST_LOG`; blank values are ignored.
fn filter_directive<F>(production: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["APP_LOG_LEVEL", "RUST_LOG"]
        .into_iter()
        .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| if production { "error" } else { "info" }.to_string())
}

fn trace_id() -> &'static str {
    PROCESS_TRACE_ID.get_or_init(|| Uuid::new_v4().to_string())
}
