//! Structured logging setup, grounded in
//! `tools/butterfly-route/src/step9/mod.rs::init_tracing`: `RUST_LOG`-driven
//! `EnvFilter`, with a `--log-format json` switch for log aggregators.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. `log_format` is `"text"` for
/// human-readable output or `"json"` for structured JSON lines. Call once,
/// at process start.
pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(false).init();
        }
    }
}
