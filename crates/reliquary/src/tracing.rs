/// Installs the process-wide `tracing` subscriber.
///
/// Output is compact, one line per event, without module targets. Verbosity is
/// read from `RUST_LOG`:
///
/// - `RUST_LOG=info` shows completed writes and flushes
/// - `RUST_LOG=debug` adds per-row, per-document and per-container detail
/// - `RUST_LOG=reliquary=debug` limits the detail to this crate
///
/// Calling it a second time is a no-op.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
