//! Tracing setup.
//!
//! The agent is a single chatty process: stream handlers, per-market
//! reconcilers, and the scheduler all log with component prefixes, so
//! the default filter keeps our own crates at the configured level and
//! holds everything else (TLS, websocket handshakes, runtime internals)
//! at `warn` to stop reconnect storms from burying trading decisions.

use tracing_subscriber::EnvFilter;

/// Crates that follow the configured level.
const LOG_SCOPES: [&str; 3] = ["marketmaker", "streamkit", "outcome_mm"];

/// Install the global subscriber at `info`.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Install the global subscriber at `level` (error, warn, info, debug,
/// trace). An explicit `RUST_LOG` takes precedence wholesale.
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    // Targets stay on so a line can be traced back to its module; the
    // component prefixes in the messages carry the per-market context.
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_directives(level: &str) -> String {
    LOG_SCOPES
        .iter()
        .fold(String::from("warn"), |mut directives, scope| {
            directives.push(',');
            directives.push_str(scope);
            directives.push('=');
            directives.push_str(level);
            directives
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_our_crates_and_quiet_the_rest() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("marketmaker=debug"));
        assert!(directives.contains("streamkit=debug"));
        assert!(directives.contains("outcome_mm=debug"));
    }
}
