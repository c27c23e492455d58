/// Env var overriding [`crate::config::RelayConfig::interval_secs`]
pub const RELAY_INTERVAL_SECS_ENV: &str = "RELAY_INTERVAL_SECS";

/// Env var overriding [`crate::config::RelayConfig::concurrency`]
pub const RELAY_CONCURRENCY_ENV: &str = "RELAY_CONCURRENCY";

/// Env var overriding [`crate::config::RelayConfig::gas_limit`]
pub const RELAY_GAS_LIMIT_ENV: &str = "RELAY_GAS_LIMIT";
