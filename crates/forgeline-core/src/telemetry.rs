//! Tracing setup for processes embedding the engine.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for engine logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Text,
    /// Newline-delimited JSON for log shippers.
    Json,
}

/// Install the global tracing subscriber.
///
/// `level` is the default verbosity; a set `RUST_LOG` takes precedence.
/// The global subscriber can only be installed once per process, so later
/// calls are no-ops — embedders and test harnesses may both call this.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let base = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Json => base.with(fmt::layer().with_target(false).json()).try_init(),
        LogFormat::Text => base.with(fmt::layer().with_target(false)).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        init_tracing(LogFormat::Text, Level::INFO);
        // Second install must be swallowed, whatever the format.
        init_tracing(LogFormat::Json, Level::DEBUG);
        tracing::info!("subscriber installed");
    }
}
