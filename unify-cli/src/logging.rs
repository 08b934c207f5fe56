//! Tracing subscriber setup for the `unify` binary.

use shared::config::{LogFormat, LoggingConfig};
use std::io;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
///
/// Returns the configured default level.
pub fn initialize_tracing(config: &LoggingConfig) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr);

    // A subscriber may already be installed when embedded in tests.
    let _ = if matches!(config.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };

    config.level.clone()
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let default_level = config.level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}
