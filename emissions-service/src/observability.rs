use tracing_subscriber::EnvFilter;

/// Logs go to stderr so the run summary on stdout stays clean. `RUST_LOG`
/// overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,emissions_service=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
