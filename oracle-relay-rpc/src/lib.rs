#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod metrics;

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use oracle_relay_logging::LOG_RPC;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::metrics::{RPC_SEND_DURATION_SECONDS, RPC_SEND_REQUESTS_TOTAL};

/// Node error fragments that mean another transaction from the same sender
/// got there first. The next tick re-evaluates, nothing to retry.
const SUBMISSION_RACE_ERRORS: &[&str] = &["nonce too low", "replacement transaction underpriced"];

/// Identity of an RPC endpoint, calls are batched per endpoint id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("Call reverted: {0}")]
    Reverted(String),
    /// The optimistic value of the contract can still be challenged
    #[error("Optimistic poke still in challenge period")]
    InChallengePeriod,
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

/// Metadata of a transaction accepted by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTransaction {
    pub hash: B256,
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub input: Bytes,
}

pub type DynCallable = Arc<dyn ICallable>;

/// An encoded contract call bound to one endpoint
#[async_trait]
pub trait ICallable: Debug + Send + Sync + 'static {
    /// Contract the call is sent to
    fn to(&self) -> Address;

    fn calldata(&self) -> Bytes;

    async fn estimate_gas(&self) -> Result<u64, CallError>;

    fn into_dyn(self) -> DynCallable
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

pub type DynMulticall = Arc<dyn IMulticall>;

/// Combines independent calls into a single callable executed in one
/// transaction
pub trait IMulticall: Debug + Send + Sync + 'static {
    /// With `allow_failure` a reverting sub-call does not revert the others.
    fn aggregate(&self, calls: Vec<DynCallable>, allow_failure: bool) -> Result<DynCallable>;
}

pub type DynRpcEndpoint = Arc<dyn IRpcEndpoint>;

#[async_trait]
pub trait IRpcEndpoint: Debug + Send + Sync + 'static {
    fn id(&self) -> EndpointId;

    /// Aggregator deployed on the chain behind this endpoint
    fn multicall(&self) -> DynMulticall;

    /// Signs and submits `call` with the given gas limit
    async fn send_transaction(
        &self,
        call: DynCallable,
        gas_limit: u64,
    ) -> Result<SubmittedTransaction>;

    fn into_dyn(self) -> DynRpcEndpoint
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// Is `err` a node rejection caused by a competing transaction from the
/// same sender?
pub fn is_submission_race(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_lowercase();
    SUBMISSION_RACE_ERRORS
        .iter()
        .any(|fragment| msg.contains(fragment))
}

/// A wrapper around `DynRpcEndpoint` that tracks metrics for each
/// submission.
pub struct TrackedEndpoint {
    inner: DynRpcEndpoint,
    name: &'static str,
}

impl Debug for TrackedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEndpoint")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl TrackedEndpoint {
    /// `name` distinguishes different users of the same endpoint in metrics.
    pub fn new(inner: DynRpcEndpoint, name: &'static str) -> Self {
        Self { inner, name }
    }

    fn record_send<T>(&self, result: &Result<T>) {
        let result_label = match result {
            Ok(_) => "success",
            Err(e) if is_submission_race(e) => "race",
            Err(_) => "error",
        };
        RPC_SEND_REQUESTS_TOTAL
            .with_label_values(&[self.inner.id().as_str(), self.name, result_label])
            .inc();
    }
}

#[async_trait]
impl IRpcEndpoint for TrackedEndpoint {
    fn id(&self) -> EndpointId {
        self.inner.id()
    }

    fn multicall(&self) -> DynMulticall {
        self.inner.multicall()
    }

    async fn send_transaction(
        &self,
        call: DynCallable,
        gas_limit: u64,
    ) -> Result<SubmittedTransaction> {
        let endpoint = self.inner.id();
        trace!(target: LOG_RPC, %endpoint, to = %call.to(), gas_limit, "Sending transaction");
        let timer = RPC_SEND_DURATION_SECONDS
            .with_label_values(&[endpoint.as_str(), self.name])
            .start_timer();
        let result = self.inner.send_transaction(call, gas_limit).await;
        timer.observe_duration();
        self.record_send(&result);
        result
    }
}
