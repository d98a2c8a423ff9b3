//! Tracing bootstrap for binaries and tools embedding the engagement layer.

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to info-level output with debug logging
/// for the pulse crates. Call once at startup.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pulse_core=debug,pulse_infra=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}
