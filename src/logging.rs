//! Purpose: Optional tracing setup for hosts that do not install their own subscriber.
//! Exports: `init_tracing`.
//! Role: The library only emits events; installing a subscriber is the host's choice.
//! Invariants: Honors `RUST_LOG`; defaults to `info`. Safe to call more than once.
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
