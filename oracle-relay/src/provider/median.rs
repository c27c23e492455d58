use std::fmt;

use alloy_primitives::Address;
use async_trait::async_trait;
use oracle_relay_core::time::now;
use oracle_relay_logging::LOG_RELAY_MEDIAN;
use tracing::{debug, info, warn};

use super::{CallKind, ICallProvider, ProviderError, RelayCall, ensure_asset, log_provider_error};
use crate::config::MedianConfig;
use crate::contract::{DynMedianContract, MedianPoke, MedianState};
use crate::policy::UpdatePolicy;
use crate::quorum;
use crate::store::{DynDataPointStore, ValidDataPoint};

/// Pokes a median contract with individually signed feed prices
pub struct MedianProvider {
    contract: DynMedianContract,
    store: DynDataPointStore,
    wat: String,
    feeds: Vec<Address>,
    policy: UpdatePolicy,
}

impl fmt::Debug for MedianProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MedianProvider")
            .field("contract", &self.contract.address())
            .field("wat", &self.wat)
            .field("feeds", &self.feeds.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl MedianProvider {
    pub fn new(cfg: &MedianConfig, contract: DynMedianContract, store: DynDataPointStore) -> Self {
        Self {
            contract,
            store,
            wat: cfg.wat.clone(),
            feeds: cfg.feeds.clone(),
            policy: cfg.policy(),
        }
    }

    /// Latest valid data point of each feed, in random feed order, until
    /// `bar` are found
    async fn collect_points(&self, state: &MedianState) -> Vec<ValidDataPoint> {
        let order = quorum::random_order(&self.feeds);
        quorum::collect_quorum(order, state.bar, |feed| async move {
            match self.store.latest_from(feed, &self.wat).await {
                Ok(Some(point)) => {
                    let valid = point.validate(feed, state.age);
                    if valid.is_none() {
                        debug!(target: LOG_RELAY_MEDIAN, %feed, wat = %self.wat, "Skipping invalid or outdated data point");
                    }
                    valid
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(target: LOG_RELAY_MEDIAN, %feed, wat = %self.wat, err = %format!("{err:#}"), "Failed to read data point");
                    None
                }
            }
        })
        .await
    }

    async fn relay_call(&self) -> Result<Option<RelayCall>, ProviderError> {
        let address = self.contract.address();
        let state = self
            .contract
            .read_state()
            .await
            .map_err(ProviderError::Read)?;
        ensure_asset(&self.wat, &state.wat)?;

        let points = self.collect_points(&state).await;
        if state.bar == 0 || points.len() < state.bar {
            warn!(
                target: LOG_RELAY_MEDIAN,
                contract = %address,
                wat = %self.wat,
                bar = state.bar,
                found = points.len(),
                "Not enough valid data points to reach quorum"
            );
            return Ok(None);
        }

        let values: Vec<u128> = points.iter().map(|point| point.val).collect();
        let Some(median) = quorum::median(&values) else {
            return Ok(None);
        };
        let decision = self.policy.evaluate(&state.poke_data(), median, now());
        if !decision.is_warranted() {
            debug!(
                target: LOG_RELAY_MEDIAN,
                contract = %address,
                wat = %self.wat,
                spread = decision.spread,
                "Median price is up to date"
            );
            return Ok(None);
        }

        let callable = self.contract.poke(MedianPoke::from_points(points));
        let gas_estimate = callable.estimate_gas().await?;
        info!(
            target: LOG_RELAY_MEDIAN,
            contract = %address,
            wat = %self.wat,
            %median,
            spread = decision.spread,
            expired = decision.expired,
            gas_estimate,
            "Median needs an update"
        );

        Ok(Some(RelayCall {
            endpoint: self.contract.endpoint(),
            contract: address,
            kind: CallKind::MedianPoke,
            callable,
            gas_estimate,
        }))
    }
}

#[async_trait]
impl ICallProvider for MedianProvider {
    fn name(&self) -> String {
        format!("median {} {}", self.wat, self.contract.address())
    }

    async fn relay_calls(&self) -> Vec<RelayCall> {
        match self.relay_call().await {
            Ok(call) => call.into_iter().collect(),
            Err(err) => {
                log_provider_error!(LOG_RELAY_MEDIAN, self.contract.address(), &err);
                vec![]
            }
        }
    }
}
