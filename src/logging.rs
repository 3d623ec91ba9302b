use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a `fmt` subscriber filtered by `SEARCHSYNC_LOG` (or `RUST_LOG`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let directives = std::env::var("SEARCHSYNC_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".into());

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(directives))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Render a JSON body for debug logs.
pub(crate) fn render_json(value: &serde_json::Value, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}
