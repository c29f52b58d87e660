//! Tracing setup for vulnwatch-daemon.
//!
//! Driven by `[general]` (`log_level`, `log_format`). `RUST_LOG`, when set,
//! replaces the configured level entirely.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vulnwatch_core::config::GeneralConfig;

/// HTTP client and server internals are only interesting when asked for.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "h2=warn", "reqwest=warn", "tower_http=info"];

/// Filter for a configured level: the level itself plus [`QUIET_TARGETS`].
fn filter_for_level(level: &str) -> Result<EnvFilter> {
    let mut directives = vec![level.to_owned()];
    directives.extend(QUIET_TARGETS.iter().map(|d| (*d).to_owned()));
    EnvFilter::try_new(directives.join(","))
        .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", level, e))
}

/// Install the global subscriber. Call once, before the first log line.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for_level(&config.log_level)?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        "pretty" => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_keeps_level_and_quiets_http_stack() {
        let filter = filter_for_level("debug").expect("valid level");
        let rendered = filter.to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let config = GeneralConfig {
            log_format: "xml".to_owned(),
            ..GeneralConfig::default()
        };
        let err = init_tracing(&config).expect_err("xml is not a format");
        assert!(err.to_string().contains("unknown log format"));
    }
}
