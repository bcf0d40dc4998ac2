use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. A parseable `RUST_LOG` directive wins; otherwise
/// `level` applies to the library, the calling binary and the HTTP trace layer.
pub fn init_tracing(binary: &str, level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={level},{binary}={level},tower_http={level}",
                env!("CARGO_CRATE_NAME")
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
