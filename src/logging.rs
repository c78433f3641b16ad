use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Build the filter: `RUST_LOG` if set and valid, else `level`, else `warn`.
pub fn filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Install the stderr subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(level: &str) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let _ = tracing_subscriber::registry()
        .with(filter(level, rust_log.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_takes_precedence() {
        assert_eq!(filter("warn", Some("taskboard=debug")).to_string(), "taskboard=debug");
        assert_eq!(filter("info", Some("  ")).to_string(), "info");
        assert_eq!(filter("info", None).to_string(), "info");
    }

    #[test]
    fn invalid_level_falls_back_to_warn() {
        assert_eq!(filter("taskboard=loud", None).to_string(), "warn");
    }
}
