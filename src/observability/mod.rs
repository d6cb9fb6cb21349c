pub mod token_counter;

use std::fmt::Write as _;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::protocol::openai_chat::Usage;

/// HTTP stack crates whose per-connection chatter stays at `warn` unless the
/// bridge itself runs at `debug`.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2"];

/// Build the `EnvFilter` directive for a `features.log_level` value.
///
/// Returns `None` for `DISABLED`. `WARNING` and `CRITICAL` follow the
/// Python-style names accepted in the config file.
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = match log_level.to_uppercase().as_str() {
        "DISABLED" => return None,
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    };
    let dependency_level = if level == "debug" { "debug" } else { "warn" };

    let mut directive = level.to_string();
    for krate in QUIET_DEPENDENCIES {
        let _ = write!(directive, ",{krate}={dependency_level}");
    }
    Some(directive)
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over the
/// configured level.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log token usage for a finished stream.
pub fn log_stream_complete(model: &str, usage: &Usage, started_at: Instant) {
    token_counter::log_stream_usage(model, usage, started_at.elapsed());
}
