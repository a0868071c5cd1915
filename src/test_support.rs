//! Opt-in test logging, shared by every module's `#[cfg(test)]` block.
//!
//! `tracing` events are silent by default in tests; call [`init_tracing`] at
//! the top of a test to see them (set `RUST_LOG` to control verbosity).
//! `try_init` rather than `init` since multiple test threads in the same
//! binary would otherwise panic on the second call.

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
