//! Call providers, one per oracle contract
//!
//! On every tick a provider reads its contract, looks at the signed
//! observations available for the contract's asset and returns the poke
//! the contract needs, if any.

pub mod median;
pub mod optimistic;
pub mod scribe;

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use oracle_relay_rpc::{CallError, DynCallable, DynRpcEndpoint, EndpointId};
use thiserror::Error;

pub use self::median::MedianProvider;
pub use self::optimistic::OptimisticScribeProvider;
pub use self::scribe::ScribeProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    MedianPoke,
    ScribePoke,
    OptimisticPoke,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::MedianPoke => "median_poke",
            CallKind::ScribePoke => "scribe_poke",
            CallKind::OptimisticPoke => "optimistic_poke",
        }
    }
}

impl Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending contract update, produced and consumed within one tick
#[derive(Debug, Clone)]
pub struct RelayCall {
    pub endpoint: DynRpcEndpoint,
    pub contract: Address,
    pub kind: CallKind,
    pub callable: DynCallable,
    pub gas_estimate: u64,
}

impl RelayCall {
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The contract is for a different asset than configured, only an
    /// operator can fix this
    #[error("Contract asset {actual:?} does not match configured {expected:?}")]
    AssetMismatch { expected: String, actual: String },
    #[error("Failed to read contract state: {0:#}")]
    Read(anyhow::Error),
    #[error("Failed to estimate gas: {0}")]
    Estimate(#[from] CallError),
}

impl ProviderError {
    /// Rejections that are part of normal operation and not worth logging
    pub fn is_expected(&self) -> bool {
        matches!(self, ProviderError::Estimate(CallError::InChallengePeriod))
    }
}

/// Logs a [`ProviderError`] with the caller's log target
macro_rules! log_provider_error {
    ($target:expr, $contract:expr, $err:expr) => {{
        let err: &$crate::provider::ProviderError = $err;
        if err.is_expected() {
            ::tracing::debug!(target: $target, contract = %$contract, %err, "Update not possible yet");
        } else {
            ::tracing::error!(target: $target, contract = %$contract, %err, "Failed to prepare update");
        }
    }};
}
pub(crate) use log_provider_error;

pub(crate) fn ensure_asset(configured: &str, on_chain: &str) -> Result<(), ProviderError> {
    if crate::asset::matches(configured, on_chain) {
        Ok(())
    } else {
        Err(ProviderError::AssetMismatch {
            expected: configured.to_owned(),
            actual: on_chain.to_owned(),
        })
    }
}

pub type DynCallProvider = Arc<dyn ICallProvider>;

/// Produces the relay calls a contract needs
///
/// The scheduler never calls the same provider concurrently, the next tick
/// only starts after all providers of the previous one returned.
#[async_trait]
pub trait ICallProvider: Debug + Send + Sync + 'static {
    /// Human readable identification for logs
    fn name(&self) -> String;

    /// Failures are logged by the provider and result in no calls
    async fn relay_calls(&self) -> Vec<RelayCall>;

    fn into_dyn(self) -> DynCallProvider
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}
