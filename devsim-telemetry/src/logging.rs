//! ## devsim-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! `RUST_LOG` takes precedence over the configured level so a single run can be
//! turned up without editing the device file.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Calling it twice is harmless; the second
    /// call is ignored.
    pub fn init(default_level: &str) {
        let _ = fmt()
            .with_env_filter(Self::filter(default_level))
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .try_init();
    }

    fn filter(default_level: &str) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    }

    /// Logs a lifecycle transition of one of the pipeline services.
    #[inline]
    pub fn lifecycle(service: &str, transition: &str) {
        tracing::info!(service, transition, "service lifecycle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logging() {
        EventLogger::lifecycle("clock", "started");
        assert!(logs_contain("service lifecycle"));
        assert!(logs_contain("clock"));
    }
}
