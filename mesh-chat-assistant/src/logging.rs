use tracing_subscriber::EnvFilter;

/// Process-wide `tracing` subscriber initialization, mirroring the
/// teacher's `main.rs` startup sequence (`FmtSubscriber` +
/// `tracing::subscriber::set_global_default`), generalized to take the
/// level from configuration instead of a hardcoded `Level::INFO`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global tracing subscriber already set");
    }
}

/// Same as [`init`], but writes to stderr instead of stdout. `assistant-worker`
/// reserves its stdout for the [`crate::worker::protocol`] wire format, so it
/// cannot share the server binary's default `fmt()` writer.
pub fn init_stderr(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global tracing subscriber already set");
    }
}
