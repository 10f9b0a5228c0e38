//! `tracing-subscriber` wiring: an `RUST_LOG`-driven `EnvFilter`, with
//! the `-v`/`--log-level` flag as the default when `RUST_LOG` is unset
//! (spec's ambient logging stack, matching `rqbit`'s `-v` flag).

use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub fn init(level: Option<LogLevel>) {
    let default = match level.unwrap_or(LogLevel::Info) {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
