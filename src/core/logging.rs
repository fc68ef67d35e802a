use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` wins over the configured level. `format` is `json` or anything
/// else for the human-readable layer.
pub fn init_logging(log_level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    tracing::info!("Logging initialized at level: {} ({})", log_level, format);
}
