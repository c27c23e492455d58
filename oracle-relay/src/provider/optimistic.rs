use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oracle_relay_core::time::now;
use oracle_relay_logging::LOG_RELAY_OPTIMISTIC;
use itertools::Itertools as _;
use tracing::{debug, info, trace, warn};

use super::scribe::ScribeProvider;
use super::{CallKind, ICallProvider, ProviderError, RelayCall, ensure_asset, log_provider_error};
use crate::cache::StateCache;
use crate::config::OptimisticScribeConfig;
use crate::contract::{
    DynOptimisticScribeContract, IOptimisticScribeContract, NextPoke, PokeData, ScribeParams,
};
use crate::policy::UpdatePolicy;
use crate::quorum;
use crate::store::DynMuSigStore;

/// Cached on-chain state of an optimistic Scribe contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticState {
    pub params: ScribeParams,
    pub next: NextPoke,
}

/// Prefers cheap optimistic pokes and falls back to regular Scribe pokes
///
/// An optimistic poke is only attempted once the previous one left its
/// challenge period. Whenever no optimistic poke can be made the embedded
/// [`ScribeProvider`] runs, so the price keeps moving even if the fast path
/// stalls.
pub struct OptimisticScribeProvider {
    scribe: ScribeProvider,
    contract: DynOptimisticScribeContract,
    store: DynMuSigStore,
    wat: String,
    policy: UpdatePolicy,
    state: StateCache<OptimisticState>,
}

impl fmt::Debug for OptimisticScribeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticScribeProvider")
            .field("contract", &self.contract.address())
            .field("wat", &self.wat)
            .field("policy", &self.policy)
            .field("scribe", &self.scribe)
            .finish_non_exhaustive()
    }
}

impl OptimisticScribeProvider {
    pub fn new<C>(
        cfg: &OptimisticScribeConfig,
        contract: Arc<C>,
        store: DynMuSigStore,
        cache_ttl: Duration,
    ) -> Self
    where
        C: IOptimisticScribeContract,
    {
        Self {
            scribe: ScribeProvider::new(&cfg.scribe, contract.clone(), store.clone(), cache_ttl),
            contract,
            store,
            wat: cfg.scribe.wat.clone(),
            policy: cfg.optimistic_policy(),
            state: StateCache::new(cache_ttl),
        }
    }

    async fn state(&self) -> Result<OptimisticState, ProviderError> {
        self.state
            .get_or_try_fetch(now(), || async {
                let next = self.contract.read_next_poke().await?;
                let params = self.contract.read_params().await?;
                Ok::<_, anyhow::Error>(OptimisticState { params, next })
            })
            .await
            .map_err(ProviderError::Read)
    }

    async fn relay_call(&self) -> Result<Option<RelayCall>, ProviderError> {
        let address = self.contract.address();
        let state = self.state().await?;
        ensure_asset(&self.wat, &state.params.wat)?;

        if !state.next.finalized {
            self.log_challenge_period(&state.next.poke).await;
            return self.scribe.relay_call().await;
        }

        match self.optimistic_call(&state).await {
            Ok(Some(call)) => return Ok(Some(call)),
            Ok(None) => {}
            Err(err) => log_provider_error!(LOG_RELAY_OPTIMISTIC, address, &err),
        }

        self.scribe.relay_call().await
    }

    /// Logs the remaining challenge period, a failed read is not fatal
    async fn log_challenge_period(&self, poke: &PokeData) {
        let address = self.contract.address();
        match self.contract.read_challenge_period().await {
            Ok(period) => {
                let remaining_secs = poke
                    .age
                    .checked_add(period)
                    .map(|at| at.duration_since(now()).unwrap_or_default().as_secs());
                debug!(
                    target: LOG_RELAY_OPTIMISTIC,
                    contract = %address,
                    remaining_secs,
                    "Optimistic poke in challenge period, using regular poke"
                );
            }
            Err(err) => {
                warn!(
                    target: LOG_RELAY_OPTIMISTIC,
                    contract = %address,
                    err = %format!("{err:#}"),
                    "Failed to read challenge period, using regular poke"
                );
            }
        }
    }

    async fn optimistic_call(
        &self,
        state: &OptimisticState,
    ) -> Result<Option<RelayCall>, ProviderError> {
        let address = self.contract.address();
        let observations = self
            .store
            .signatures(&self.wat)
            .await
            .map_err(ProviderError::Read)?;
        let now = now();

        for observation in &observations {
            if !observation.is_structurally_valid(state.params.bar) {
                continue;
            }
            let (Some(val), Some(ecdsa)) = (observation.val, observation.optimistic_signature())
            else {
                trace!(target: LOG_RELAY_OPTIMISTIC, contract = %address, "Skipping signature without optimistic signature");
                continue;
            };
            // the contract rejects pokes that are not strictly newer
            if observation.age <= state.next.poke.age {
                continue;
            }
            let unlifted = quorum::unlifted_signers(&observation.signers, &state.params.feeds);
            if !unlifted.is_empty() {
                warn!(
                    target: LOG_RELAY_OPTIMISTIC,
                    contract = %address,
                    wat = %self.wat,
                    signers = %observation.signers.iter().join(","),
                    feeds = %state.params.feeds.iter().join(","),
                    unlifted = %unlifted.iter().join(","),
                    "Signature contains feeds that are not lifted on the contract"
                );
                continue;
            }

            let decision = self.policy.evaluate(&state.next.poke, val, now);
            if !decision.is_warranted() {
                continue;
            }

            let poke = PokeData {
                val,
                age: observation.age,
            };
            let callable = self.contract.op_poke(&poke, &observation.schnorr, &ecdsa);
            let gas_estimate = callable.estimate_gas().await?;
            info!(
                target: LOG_RELAY_OPTIMISTIC,
                contract = %address,
                wat = %self.wat,
                val = %val,
                spread = decision.spread,
                expired = decision.expired,
                gas_estimate,
                "Optimistic Scribe needs an update"
            );
            return Ok(Some(RelayCall {
                endpoint: self.contract.endpoint(),
                contract: address,
                kind: CallKind::OptimisticPoke,
                callable,
                gas_estimate,
            }));
        }

        Ok(None)
    }
}

#[async_trait]
impl ICallProvider for OptimisticScribeProvider {
    fn name(&self) -> String {
        format!("optimistic-scribe {} {}", self.wat, self.contract.address())
    }

    async fn relay_calls(&self) -> Vec<RelayCall> {
        match self.relay_call().await {
            Ok(call) => call.into_iter().collect(),
            Err(err) => {
                log_provider_error!(LOG_RELAY_OPTIMISTIC, self.contract.address(), &err);
                vec![]
            }
        }
    }
}
