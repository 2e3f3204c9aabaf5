//! Logging configuration and initialization.

use crate::cli::LogLevel;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn max_level(level: LogLevel) -> Level {
    use LogLevel::*;
    match level {
        Error => Level::ERROR,
        Warn => Level::WARN,
        Info => Level::INFO,
        Debug => Level::DEBUG,
        Trace => Level::TRACE,
    }
}

/// Filter for `level`. At the default level `rust_log` directives apply as given and INFO is
/// used when there are none; any verbosity flag replaces them with a single global level.
fn env_filter(level: LogLevel, rust_log: &str) -> EnvFilter {
    if level == LogLevel::Info {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy(rust_log)
    } else {
        EnvFilter::default().add_directive(LevelFilter::from_level(max_level(level)).into())
    }
}

/// Configure the tracing subscriber according to CLI verbosity flags.
///
/// Precedence:
/// 1. `-qq` => ERROR, `-q` => WARN.
/// 2. `-vv` => TRACE.
/// 3. `-v`  => DEBUG.
/// 4. Else `RUST_LOG` directives, INFO when unset.
pub fn configure_logging(level: LogLevel) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .with_env_filter(env_filter(level, &rust_log))
        .init();
}
