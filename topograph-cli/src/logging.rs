//! Tracing subscriber setup.

use topograph_core::LogFormat;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Resolve the filter directive from the configured level and the `-v`/`-q` flags.
///
/// Unknown levels fall back to `info`.
pub fn level_directive(configured: &str, verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => match configured.to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "info",
        },
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// The returned guard must be held until exit so buffered JSON lines are flushed.
pub fn init_tracing(format: LogFormat, level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Human => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
        LogFormat::Json => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(filter);
            tracing_subscriber::registry().with(json_layer).init();
            Some(guard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_config() {
        assert_eq!(level_directive("debug", 0, false), "debug");
        assert_eq!(level_directive("WARN", 0, false), "warn");
        assert_eq!(level_directive("verbose", 0, false), "info");
    }

    #[test]
    fn test_flags_override_config() {
        assert_eq!(level_directive("info", 1, false), "debug");
        assert_eq!(level_directive("info", 3, false), "trace");
        assert_eq!(level_directive("debug", 0, true), "error");
    }
}
