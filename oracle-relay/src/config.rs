use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context as _, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::envs::{RELAY_CONCURRENCY_ENV, RELAY_GAS_LIMIT_ENV, RELAY_INTERVAL_SECS_ENV};
use crate::policy::UpdatePolicy;

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
/// Providers evaluated in parallel, bounds concurrent RPC connections
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Soft cap on the adjusted gas of one batch transaction
pub const DEFAULT_GAS_LIMIT: u64 = 2_500_000;

/// Settings of the relay scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub interval_secs: u64,
    pub concurrency: usize,
    pub gas_limit: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl RelayConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("Invalid relay config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.interval_secs > 0, "Relay interval must not be zero");
        ensure!(self.concurrency > 0, "Relay concurrency must not be zero");
        ensure!(self.gas_limit > 0, "Relay gas limit must not be zero");
        Ok(())
    }

    /// Apply the `RELAY_*` environment variables on top of the config
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> anyhow::Result<Option<T>>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("failure parsing env var {var}"))
                })
                .transpose()
        }

        if let Some(interval_secs) = parse(&lookup, RELAY_INTERVAL_SECS_ENV)? {
            self.interval_secs = interval_secs;
        }
        if let Some(concurrency) = parse(&lookup, RELAY_CONCURRENCY_ENV)? {
            self.concurrency = concurrency;
        }
        if let Some(gas_limit) = parse(&lookup, RELAY_GAS_LIMIT_ENV)? {
            self.gas_limit = gas_limit;
        }
        self.validate()
    }
}

fn validate_spread(name: &str, spread: f64) -> anyhow::Result<()> {
    if !spread.is_finite() || spread < 0.0 {
        bail!("{name} must be a non-negative percentage, got {spread}");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianConfig {
    pub wat: String,
    /// Percent
    pub spread: f64,
    pub expiration_secs: u64,
    /// Feeds allowed to contribute to the median
    pub feeds: Vec<Address>,
}

impl MedianConfig {
    pub fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::new(self.spread, Duration::from_secs(self.expiration_secs))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.wat.is_empty(), "Median asset name must not be empty");
        ensure!(!self.feeds.is_empty(), "Median {} has no feeds", self.wat);
        validate_spread("spread", self.spread)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScribeConfig {
    pub wat: String,
    pub spread: f64,
    pub expiration_secs: u64,
}

impl ScribeConfig {
    pub fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::new(self.spread, Duration::from_secs(self.expiration_secs))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.wat.is_empty(), "Scribe asset name must not be empty");
        validate_spread("spread", self.spread)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticScribeConfig {
    #[serde(flatten)]
    pub scribe: ScribeConfig,
    /// Thresholds of the optimistic path, usually tighter than the regular
    /// ones
    pub optimistic_spread: f64,
    pub optimistic_expiration_secs: u64,
}

impl OptimisticScribeConfig {
    pub fn optimistic_policy(&self) -> UpdatePolicy {
        UpdatePolicy::new(
            self.optimistic_spread,
            Duration::from_secs(self.optimistic_expiration_secs),
        )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.scribe.validate()?;
        validate_spread("optimistic_spread", self.optimistic_spread)
    }
}
