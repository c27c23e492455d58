//! Constants for categorizing the logging type
//!
//! To help stabilize logging targets to avoid typos and improve consistency we
//! use constants for all log targets. The prefix `or` keeps the relay's own
//! targets apart from the ones emitted by dependencies.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _};

pub const LOG_RELAY: &str = "or::relay";
pub const LOG_RELAY_MEDIAN: &str = "or::relay::median";
pub const LOG_RELAY_SCRIBE: &str = "or::relay::scribe";
pub const LOG_RELAY_OPTIMISTIC: &str = "or::relay::optimistic";
pub const LOG_RPC: &str = "or::rpc";
pub const LOG_TASK: &str = "or::task";
pub const LOG_METRICS: &str = "or::metrics";

/// Consolidates the setup of the tracing subscriber
///
/// `RUST_LOG` takes precedence over everything configured here.
#[derive(Default)]
pub struct TracingSetup {
    base_level: Option<String>,
    extra_directives: Option<String>,
    with_ansi: bool,
}

impl TracingSetup {
    /// Sets the log level applied to most modules. Default is "info".
    pub fn with_base_level(&mut self, level: impl Into<String>) -> &mut Self {
        self.base_level = Some(level.into());
        self
    }

    /// Add a filter directive, e.g. `or::relay::scribe=debug`.
    pub fn with_directive(&mut self, directive: &str) -> &mut Self {
        self.extra_directives = Some(match self.extra_directives.take() {
            Some(existing) => format!("{existing},{directive}"),
            None => directive.to_owned(),
        });
        self
    }

    pub fn with_ansi(&mut self, enabled: bool) -> &mut Self {
        self.with_ansi = enabled;
        self
    }

    fn directives(&self) -> String {
        let base_level = self.base_level.as_deref().unwrap_or("info");
        match &self.extra_directives {
            Some(extra) => format!("{base_level},{extra}"),
            None => base_level.to_owned(),
        }
    }

    /// Initialize the logging, must be called for tracing to begin
    pub fn init(&mut self) -> anyhow::Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.directives())?,
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(self.with_ansi)
            .with_thread_names(false)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).try_init()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TracingSetup;

    #[test]
    fn directives_default_to_info() {
        assert_eq!(TracingSetup::default().directives(), "info");
    }

    #[test]
    fn directives_are_joined() {
        let mut setup = TracingSetup::default();
        setup
            .with_base_level("warn")
            .with_directive("or::relay=debug")
            .with_directive("or::rpc=trace");
        assert_eq!(setup.directives(), "warn,or::relay=debug,or::rpc=trace");
    }
}
