//! Periodic relay loop
//!
//! Every tick evaluates all providers with bounded parallelism, groups the
//! produced calls by RPC endpoint and submits one transaction per endpoint.
//! Submissions run one after another, a slow endpoint delays the others but
//! never their evaluation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use futures::{FutureExt as _, StreamExt as _, stream};
use itertools::Itertools as _;
use oracle_relay_core::task::TaskGroup;
use oracle_relay_logging::LOG_RELAY;
use oracle_relay_rpc::{
    DynRpcEndpoint, EndpointId, IRpcEndpoint as _, SubmittedTransaction, TrackedEndpoint,
    is_submission_race,
};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::metrics::{
    RELAY_CALLS_DROPPED_TOTAL, RELAY_PROVIDER_CALLS_TOTAL, RELAY_PROVIDER_DURATION_SECONDS,
    RELAY_TRANSACTIONS_TOTAL,
};
use crate::provider::{DynCallProvider, RelayCall};

/// Intrinsic gas of a transaction, paid once per batch
pub const TX_BASE_GAS: u64 = 21_000;
/// Multicall bookkeeping added for every aggregated call
pub const CALL_OVERHEAD_GAS: u64 = 5_000;
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Gas a call adds to a batch
///
/// Estimates include the intrinsic transaction gas which a batch pays only
/// once, aggregation adds a fixed overhead per call.
pub fn adjusted_gas(estimate: u64) -> u64 {
    estimate
        .saturating_add(CALL_OVERHEAD_GAS)
        .saturating_sub(TX_BASE_GAS)
        .max(CALL_OVERHEAD_GAS)
}

/// Calls that go out in one transaction
#[derive(Debug, Clone)]
pub struct EndpointBatch {
    pub endpoint: DynRpcEndpoint,
    pub calls: Vec<RelayCall>,
    /// Sum of [`adjusted_gas`] of `calls`
    pub gas_usage: u64,
    closed: bool,
}

impl EndpointBatch {
    fn new(endpoint: DynRpcEndpoint) -> Self {
        Self {
            endpoint,
            calls: vec![],
            gas_usage: 0,
            closed: false,
        }
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    pub fn contracts(&self) -> Vec<Address> {
        self.calls.iter().map(|call| call.contract).collect()
    }

    /// Gas limit of the transaction carrying this batch
    pub fn gas_limit(&self) -> u64 {
        match self.calls.as_slice() {
            [call] => call.gas_estimate,
            _ => self.gas_usage.saturating_add(TX_BASE_GAS),
        }
    }
}

/// Groups `calls` by endpoint, in order of first appearance
///
/// Within a group a contract is only included once. Calls are admitted while
/// the cumulative adjusted gas stays within `gas_limit`, the first call that
/// does not fit closes the group for this tick. The first call of a group is
/// always admitted so an expensive update cannot starve forever.
pub fn plan_batches(calls: Vec<RelayCall>, gas_limit: u64) -> Vec<EndpointBatch> {
    let mut batches: Vec<EndpointBatch> = vec![];
    let mut index: BTreeMap<EndpointId, usize> = BTreeMap::new();
    let mut seen: BTreeSet<(EndpointId, Address)> = BTreeSet::new();

    for call in calls {
        let endpoint_id = call.endpoint_id();
        let position = *index.entry(endpoint_id.clone()).or_insert_with(|| {
            batches.push(EndpointBatch::new(call.endpoint.clone()));
            batches.len() - 1
        });
        let batch = &mut batches[position];

        if !seen.insert((endpoint_id.clone(), call.contract)) {
            debug!(target: LOG_RELAY, endpoint = %endpoint_id, contract = %call.contract, "Skipping duplicate call");
            RELAY_CALLS_DROPPED_TOTAL
                .with_label_values(&["duplicate"])
                .inc();
            continue;
        }

        let gas = adjusted_gas(call.gas_estimate);
        let fits = batch.gas_usage.saturating_add(gas) <= gas_limit;
        if batch.closed || (!fits && !batch.calls.is_empty()) {
            batch.closed = true;
            debug!(
                target: LOG_RELAY,
                endpoint = %endpoint_id,
                contract = %call.contract,
                gas_usage = batch.gas_usage,
                gas_limit,
                "Gas limit reached, call postponed to next tick"
            );
            RELAY_CALLS_DROPPED_TOTAL
                .with_label_values(&["gas_limit"])
                .inc();
            continue;
        }

        batch.gas_usage = batch.gas_usage.saturating_add(gas);
        batch.calls.push(call);
    }

    batches.retain(|batch| !batch.calls.is_empty());
    batches
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay was already started")]
    AlreadyStarted,
    #[error("Relay needs at least one provider")]
    NoProviders,
}

#[derive(Debug, Clone)]
pub enum SubmissionResult {
    Sent(SubmittedTransaction),
    /// Another transaction from the same sender was in flight
    Race,
    Failed(String),
}

impl SubmissionResult {
    fn label(&self) -> &'static str {
        match self {
            SubmissionResult::Sent(_) => "success",
            SubmissionResult::Race => "race",
            SubmissionResult::Failed(_) => "error",
        }
    }
}

/// What happened to one endpoint's batch in a tick
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub endpoint: EndpointId,
    pub contracts: Vec<Address>,
    pub result: SubmissionResult,
}

struct RelayInner {
    providers: Vec<DynCallProvider>,
    interval: Duration,
    concurrency: usize,
    gas_limit: u64,
    status: Mutex<RelayStatus>,
}

/// Drives all providers on a fixed interval
///
/// Cheap to clone, clones share the same state.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("providers", &self.inner.providers.len())
            .field("interval", &self.inner.interval)
            .field("concurrency", &self.inner.concurrency)
            .field("gas_limit", &self.inner.gas_limit)
            .field("status", &self.status())
            .finish()
    }
}

impl Relay {
    pub fn new(cfg: &RelayConfig, providers: Vec<DynCallProvider>) -> Result<Self, RelayError> {
        if providers.is_empty() {
            return Err(RelayError::NoProviders);
        }
        Ok(Self {
            inner: Arc::new(RelayInner {
                providers,
                interval: cfg.interval().max(MIN_INTERVAL),
                concurrency: cfg.concurrency.max(1),
                gas_limit: cfg.gas_limit,
                status: Mutex::new(RelayStatus::Created),
            }),
        })
    }

    pub fn status(&self) -> RelayStatus {
        *self.inner.status.lock().expect("lock poison")
    }

    fn set_status(&self, status: RelayStatus) {
        *self.inner.status.lock().expect("lock poison") = status;
    }

    /// Starts the relay loop in `task_group`
    ///
    /// The loop stops when the group shuts down, the returned receiver fires
    /// once it did. A relay can only be started once.
    pub fn start(&self, task_group: &TaskGroup) -> Result<oneshot::Receiver<()>, RelayError> {
        {
            let mut status = self.inner.status.lock().expect("lock poison");
            if *status != RelayStatus::Created {
                return Err(RelayError::AlreadyStarted);
            }
            *status = RelayStatus::Running;
        }

        let relay = self.clone();
        Ok(task_group.spawn("relay", move |handle| async move {
            info!(
                target: LOG_RELAY,
                providers = relay.inner.providers.len(),
                interval_secs = relay.inner.interval.as_secs(),
                "Starting relay"
            );
            if handle.cancel_on_shutdown(relay.run()).await.is_err() {
                debug!(target: LOG_RELAY, "Relay interrupted by shutdown");
            }
            relay.set_status(RelayStatus::Stopped);
            info!(target: LOG_RELAY, "Relay stopped");
        }))
    }

    async fn run(&self) {
        let mut interval = tokio::time::interval(self.inner.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Evaluates all providers once and submits the resulting batches
    pub async fn tick(&self) -> Vec<BatchOutcome> {
        let calls = self.collect_calls().await;
        if calls.is_empty() {
            debug!(target: LOG_RELAY, "No contract needs an update");
            return vec![];
        }

        let batches = plan_batches(calls, self.inner.gas_limit);
        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in batches {
            outcomes.push(self.submit(batch).await);
        }
        outcomes
    }

    /// Calls of all providers in provider order
    async fn collect_calls(&self) -> Vec<RelayCall> {
        stream::iter(self.inner.providers.iter().cloned())
            .map(|provider| async move {
                let start = Instant::now();
                let result = AssertUnwindSafe(provider.relay_calls()).catch_unwind().await;
                let outcome = if result.is_ok() { "ok" } else { "panic" };
                RELAY_PROVIDER_DURATION_SECONDS
                    .with_label_values(&[outcome])
                    .observe(start.elapsed().as_secs_f64());
                match result {
                    Ok(calls) => {
                        for call in &calls {
                            RELAY_PROVIDER_CALLS_TOTAL
                                .with_label_values(&[call.kind.as_str()])
                                .inc();
                        }
                        calls
                    }
                    Err(_) => {
                        error!(target: LOG_RELAY, provider = %provider.name(), "Provider panicked");
                        vec![]
                    }
                }
            })
            .boxed()
            .buffered(self.inner.concurrency)
            .concat()
            .await
    }

    async fn submit(&self, batch: EndpointBatch) -> BatchOutcome {
        let endpoint = TrackedEndpoint::new(batch.endpoint.clone(), "relay");
        let endpoint_id = batch.endpoint_id();
        let contracts = batch.contracts();
        let gas_limit = batch.gas_limit();

        let result = match self.send(&endpoint, &batch, gas_limit).await {
            Ok(tx) => {
                info!(
                    target: LOG_RELAY,
                    endpoint = %endpoint_id,
                    contracts = %contracts.iter().join(","),
                    hash = %tx.hash,
                    chain_id = tx.chain_id,
                    from = %tx.from,
                    to = %tx.to,
                    nonce = tx.nonce,
                    gas_limit = tx.gas_limit,
                    max_fee_per_gas = %tx.max_fee_per_gas,
                    max_priority_fee_per_gas = %tx.max_priority_fee_per_gas,
                    input = %tx.input,
                    "Transaction sent"
                );
                SubmissionResult::Sent(tx)
            }
            Err(err) if is_submission_race(&err) => {
                info!(
                    target: LOG_RELAY,
                    endpoint = %endpoint_id,
                    err = %format!("{err:#}"),
                    "Previous transaction still pending, skipping"
                );
                SubmissionResult::Race
            }
            Err(err) => {
                error!(
                    target: LOG_RELAY,
                    endpoint = %endpoint_id,
                    contracts = %contracts.iter().join(","),
                    gas_limit,
                    err = %format!("{err:#}"),
                    "Failed to send transaction"
                );
                SubmissionResult::Failed(format!("{err:#}"))
            }
        };

        RELAY_TRANSACTIONS_TOTAL
            .with_label_values(&[result.label()])
            .inc();
        BatchOutcome {
            endpoint: endpoint_id,
            contracts,
            result,
        }
    }

    async fn send(
        &self,
        endpoint: &TrackedEndpoint,
        batch: &EndpointBatch,
        gas_limit: u64,
    ) -> anyhow::Result<SubmittedTransaction> {
        let callable = match batch.calls.as_slice() {
            [call] => call.callable.clone(),
            calls => {
                let callables = calls.iter().map(|call| call.callable.clone()).collect();
                endpoint.multicall().aggregate(callables, true)?
            }
        };
        if batch.gas_usage > self.inner.gas_limit {
            warn!(
                target: LOG_RELAY,
                endpoint = %batch.endpoint_id(),
                gas_usage = batch.gas_usage,
                cap = self.inner.gas_limit,
                "Single call exceeds the batch gas limit"
            );
        }
        endpoint.send_transaction(callable, gas_limit).await
    }
}
