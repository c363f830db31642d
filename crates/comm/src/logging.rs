use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber, honoring `RUST_LOG` and
/// falling back to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
