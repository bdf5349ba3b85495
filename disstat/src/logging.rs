//! Logging setup and secret redaction

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive`. Returns `false` when a
/// global subscriber was already installed by the host application.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

/// Mask an API key for display, keeping only a short prefix
pub fn redact_api_key(key: &str) -> String {
    const VISIBLE: usize = 4;

    if key.chars().count() <= VISIBLE * 2 {
        return "[REDACTED]".to_string();
    }
    let prefix: String = key.chars().take(VISIBLE).collect();
    format!("{}...[REDACTED]", prefix)
}
