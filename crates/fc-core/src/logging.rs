//! Process-wide `tracing` setup for the feedchat binary.
//!
//! Logs go to stderr so they never interleave with the streamed reply on
//! stdout.

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn logging_disabled() -> bool {
    std::env::var("FEEDCHAT_LOG_DISABLED")
        .ok()
        .and_then(|value| parse_bool_env(&value))
        .unwrap_or(false)
}

fn resolve_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(filter) = std::env::var("FEEDCHAT_LOG") {
        if let Ok(filter) = EnvFilter::try_new(filter) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `FEEDCHAT_LOG_DISABLED`: set to `1`/`true` to skip installing a subscriber.
/// - `FEEDCHAT_LOG`: filter override (`debug`, `fc_backend=trace`, ...).
/// - `RUST_LOG`: used when `FEEDCHAT_LOG` is unset.
///
/// `default_level` applies when neither variable is set.
pub fn init_logging(default_level: &str) {
    INIT.get_or_init(|| {
        if logging_disabled() {
            return;
        }

        let console_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr);
        let _ = tracing_subscriber::registry()
            .with(resolve_env_filter(default_level))
            .with(console_layer)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool_env("1"), Some(true));
        assert_eq!(parse_bool_env(" TRUE "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging("warn");
        init_logging("debug");
        tracing::warn!("logging initialized");
    }
}
