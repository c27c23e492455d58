use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools as _;
use oracle_relay_core::time::now;
use oracle_relay_logging::LOG_RELAY_SCRIBE;
use tracing::{debug, info, trace, warn};

use super::{CallKind, ICallProvider, ProviderError, RelayCall, ensure_asset, log_provider_error};
use crate::cache::StateCache;
use crate::config::ScribeConfig;
use crate::contract::{DynScribeContract, IScribeContract, PokeData, ScribeParams};
use crate::policy::UpdatePolicy;
use crate::quorum;
use crate::store::DynMuSigStore;

/// Cached on-chain state of a Scribe contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScribeState {
    pub params: ScribeParams,
    pub poke: PokeData,
}

/// Pokes a Scribe contract with prices signed by an aggregated Schnorr
/// signature
pub struct ScribeProvider {
    contract: DynScribeContract,
    store: DynMuSigStore,
    wat: String,
    policy: UpdatePolicy,
    state: StateCache<ScribeState>,
}

impl fmt::Debug for ScribeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScribeProvider")
            .field("contract", &self.contract.address())
            .field("wat", &self.wat)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ScribeProvider {
    pub fn new<C>(
        cfg: &ScribeConfig,
        contract: Arc<C>,
        store: DynMuSigStore,
        cache_ttl: Duration,
    ) -> Self
    where
        C: IScribeContract,
    {
        Self {
            contract,
            store,
            wat: cfg.wat.clone(),
            policy: cfg.policy(),
            state: StateCache::new(cache_ttl),
        }
    }

    pub(crate) async fn state(&self) -> Result<ScribeState, ProviderError> {
        self.state
            .get_or_try_fetch(now(), || async {
                let poke = self.contract.read_poke().await?;
                let params = self.contract.read_params().await?;
                Ok::<_, anyhow::Error>(ScribeState { params, poke })
            })
            .await
            .map_err(ProviderError::Read)
    }

    /// The first signed observation that is newer than the contract's price
    /// and warrants an update wins, later ones are not considered.
    pub(crate) async fn relay_call(&self) -> Result<Option<RelayCall>, ProviderError> {
        let address = self.contract.address();
        let state = self.state().await?;
        ensure_asset(&self.wat, &state.params.wat)?;

        let observations = self
            .store
            .signatures(&self.wat)
            .await
            .map_err(ProviderError::Read)?;
        let now = now();
        let mut structurally_valid = 0usize;

        for observation in &observations {
            if !observation.is_structurally_valid(state.params.bar) {
                debug!(
                    target: LOG_RELAY_SCRIBE,
                    contract = %address,
                    signers = observation.signers.len(),
                    bar = state.params.bar,
                    "Skipping incomplete signature"
                );
                continue;
            }
            structurally_valid += 1;

            // the contract rejects pokes that are not strictly newer
            if observation.age <= state.poke.age {
                trace!(target: LOG_RELAY_SCRIBE, contract = %address, "Skipping signature not newer than the contract price");
                continue;
            }

            let unlifted = quorum::unlifted_signers(&observation.signers, &state.params.feeds);
            if !unlifted.is_empty() {
                warn!(
                    target: LOG_RELAY_SCRIBE,
                    contract = %address,
                    wat = %self.wat,
                    signers = %observation.signers.iter().join(","),
                    feeds = %state.params.feeds.iter().join(","),
                    unlifted = %unlifted.iter().join(","),
                    "Signature contains feeds that are not lifted on the contract"
                );
                continue;
            }

            let Some(val) = observation.val else {
                continue;
            };
            let decision = self.policy.evaluate(&state.poke, val, now);
            if !decision.is_warranted() {
                debug!(
                    target: LOG_RELAY_SCRIBE,
                    contract = %address,
                    spread = decision.spread,
                    "Scribe price is up to date"
                );
                continue;
            }

            let poke = PokeData {
                val,
                age: observation.age,
            };
            let callable = self.contract.poke(&poke, &observation.schnorr);
            let gas_estimate = callable.estimate_gas().await?;
            info!(
                target: LOG_RELAY_SCRIBE,
                contract = %address,
                wat = %self.wat,
                val = %val,
                spread = decision.spread,
                expired = decision.expired,
                gas_estimate,
                "Scribe needs an update"
            );
            return Ok(Some(RelayCall {
                endpoint: self.contract.endpoint(),
                contract: address,
                kind: CallKind::ScribePoke,
                callable,
                gas_estimate,
            }));
        }

        if structurally_valid == 0 {
            warn!(
                target: LOG_RELAY_SCRIBE,
                contract = %address,
                wat = %self.wat,
                bar = state.params.bar,
                observations = observations.len(),
                "No valid signatures for contract, check the feed configuration"
            );
        }

        Ok(None)
    }
}

#[async_trait]
impl ICallProvider for ScribeProvider {
    fn name(&self) -> String {
        format!("scribe {} {}", self.wat, self.contract.address())
    }

    async fn relay_calls(&self) -> Vec<RelayCall> {
        match self.relay_call().await {
            Ok(call) => call.into_iter().collect(),
            Err(err) => {
                log_provider_error!(LOG_RELAY_SCRIBE, self.contract.address(), &err);
                vec![]
            }
        }
    }
}
