use std::env;
use std::str::FromStr;
use std::sync::Mutex;

use slog::Drain;
use slog::{Fuse, Level, LevelFilter};
use slog_async::Async;
use slog_json::Json;

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

/// Environment variable holding the minimum level to emit.
pub const LEVEL_VARIABLE: &str = "BACKEND_LOG_LEVEL";

/// Creates the root JSON logger, writing to standard error.
pub fn initialize_logger() -> Logger {
    let level = env::var(LEVEL_VARIABLE)
        .ok()
        .and_then(|l| Level::from_str(&l).ok())
        .unwrap_or(Level::Info);

    initialize_logger_at(level)
}

pub fn initialize_logger_at(level: Level) -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = LevelFilter::new(drain, level).fuse();
    let drain = Async::new(drain).build().fuse();

    Logger::root(drain, identity())
}

/// A logger that drops everything. Useful in tests.
pub fn discard() -> Logger {
    Logger::root(Discard, identity())
}

/// Installs a `RUST_LOG`-driven global logger and returns its guard.
#[cfg(feature = "env_logging")]
pub fn initialize_env_logger() -> slog_scope::GlobalLoggerGuard {
    slog_envlogger::init().expect("initialize slog-envlogger")
}

fn identity() -> slog::OwnedKV<impl slog::SendSyncRefUnwindSafeKV> {
    o!(
        "name" => info::NAME,
        "version" => info::VERSION,
        "revision" => info::REVISION,
        "build_timestamp" => info::BUILD_TIMESTAMP
    )
}
