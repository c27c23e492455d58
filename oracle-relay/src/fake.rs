//! In-memory collaborators for tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use alloy_primitives::{Address, B256, Bytes};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use oracle_relay_rpc::{
    CallError, DynCallable, DynMulticall, DynRpcEndpoint, EndpointId, ICallable, IMulticall,
    IRpcEndpoint, SubmittedTransaction,
};

use crate::contract::{
    EcdsaSignature, IMedianContract, IOptimisticScribeContract, IScribeContract, MedianPoke,
    MedianState, NextPoke, PokeData, SchnorrData, ScribeParams,
};
use crate::provider::{CallKind, ICallProvider, RelayCall};
use crate::store::{DataPoint, DataPointValue, IDataPointStore, IMuSigStore, SignedObservation};

pub fn ago(secs: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(secs)
}

pub fn ecdsa(seed: u8) -> EcdsaSignature {
    EcdsaSignature {
        v: 27,
        r: B256::repeat_byte(seed),
        s: B256::repeat_byte(seed.wrapping_add(1)),
    }
}

pub fn schnorr(seed: u8) -> SchnorrData {
    SchnorrData {
        signature: B256::repeat_byte(seed),
        commitment: Address::repeat_byte(seed),
    }
}

pub fn feed(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// How a fake call's gas estimation turns out
#[derive(Debug, Clone)]
pub enum Estimate {
    Gas(u64),
    Revert(&'static str),
    ChallengePeriod,
}

#[derive(Debug)]
pub struct FakeCall {
    pub to: Address,
    pub calldata: Bytes,
    pub estimate: Estimate,
}

impl FakeCall {
    pub fn new(to: Address, gas: u64) -> Self {
        Self {
            to,
            calldata: Bytes::new(),
            estimate: Estimate::Gas(gas),
        }
    }
}

#[async_trait]
impl ICallable for FakeCall {
    fn to(&self) -> Address {
        self.to
    }

    fn calldata(&self) -> Bytes {
        self.calldata.clone()
    }

    async fn estimate_gas(&self) -> Result<u64, CallError> {
        match &self.estimate {
            Estimate::Gas(gas) => Ok(*gas),
            Estimate::Revert(reason) => Err(CallError::Reverted((*reason).to_owned())),
            Estimate::ChallengePeriod => Err(CallError::InChallengePeriod),
        }
    }
}

/// A multicall whose callable remembers the aggregated targets
#[derive(Debug)]
pub struct FakeAggregate {
    pub calls: Vec<DynCallable>,
    pub allow_failure: bool,
}

#[async_trait]
impl ICallable for FakeAggregate {
    fn to(&self) -> Address {
        FakeMulticall::ADDRESS
    }

    fn calldata(&self) -> Bytes {
        self.calls.iter().flat_map(|call| call.to().to_vec()).collect()
    }

    async fn estimate_gas(&self) -> Result<u64, CallError> {
        Ok(0)
    }
}

#[derive(Debug)]
pub struct FakeMulticall;

impl FakeMulticall {
    pub const ADDRESS: Address = Address::new([0xca; 20]);
}

impl IMulticall for FakeMulticall {
    fn aggregate(&self, calls: Vec<DynCallable>, allow_failure: bool) -> Result<DynCallable> {
        Ok(FakeAggregate {
            calls,
            allow_failure,
        }
        .into_dyn())
    }
}

/// A submitted transaction as seen by [`FakeEndpoint`]
#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub to: Address,
    pub gas_limit: u64,
    pub calldata: Bytes,
}

#[derive(Debug)]
pub struct FakeEndpoint {
    id: &'static str,
    fail_with: Mutex<Option<String>>,
    pub sent: Mutex<Vec<SentTransaction>>,
}

impl FakeEndpoint {
    pub fn new(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail_with: Mutex::new(None),
            sent: Mutex::new(vec![]),
        })
    }

    pub fn fail_with(&self, msg: &str) {
        *self.fail_with.lock().expect("lock poison") = Some(msg.to_owned());
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.sent.lock().expect("lock poison").clone()
    }
}

#[async_trait]
impl IRpcEndpoint for FakeEndpoint {
    fn id(&self) -> EndpointId {
        EndpointId::new(self.id)
    }

    fn multicall(&self) -> DynMulticall {
        Arc::new(FakeMulticall)
    }

    async fn send_transaction(
        &self,
        call: DynCallable,
        gas_limit: u64,
    ) -> Result<SubmittedTransaction> {
        if let Some(msg) = self.fail_with.lock().expect("lock poison").clone() {
            return Err(anyhow!(msg));
        }
        let mut sent = self.sent.lock().expect("lock poison");
        sent.push(SentTransaction {
            to: call.to(),
            gas_limit,
            calldata: call.calldata(),
        });
        Ok(SubmittedTransaction {
            hash: B256::repeat_byte(0x11),
            chain_id: 1,
            from: Address::repeat_byte(0x22),
            to: call.to(),
            nonce: sent.len() as u64,
            gas_limit,
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            input: call.calldata(),
        })
    }
}

#[derive(Debug)]
pub struct FakeMedianContract {
    pub address: Address,
    pub endpoint: Arc<FakeEndpoint>,
    pub state: Mutex<MedianState>,
    pub estimate: Mutex<Estimate>,
    pub pokes: Mutex<Vec<MedianPoke>>,
}

impl FakeMedianContract {
    pub fn new(state: MedianState) -> Arc<Self> {
        Arc::new(Self {
            address: Address::repeat_byte(0x4d),
            endpoint: FakeEndpoint::new("ethereum"),
            state: Mutex::new(state),
            estimate: Mutex::new(Estimate::Gas(120_000)),
            pokes: Mutex::new(vec![]),
        })
    }

    pub fn pokes(&self) -> Vec<MedianPoke> {
        self.pokes.lock().expect("lock poison").clone()
    }
}

#[async_trait]
impl IMedianContract for FakeMedianContract {
    fn address(&self) -> Address {
        self.address
    }

    fn endpoint(&self) -> DynRpcEndpoint {
        self.endpoint.clone()
    }

    async fn read_state(&self) -> Result<MedianState> {
        Ok(self.state.lock().expect("lock poison").clone())
    }

    fn poke(&self, poke: MedianPoke) -> DynCallable {
        self.pokes.lock().expect("lock poison").push(poke);
        FakeCall {
            to: self.address,
            calldata: Bytes::from_static(b"poke"),
            estimate: self.estimate.lock().expect("lock poison").clone(),
        }
        .into_dyn()
    }
}

/// Implements both the regular and the optimistic Scribe interface
#[derive(Debug)]
pub struct FakeScribeContract {
    pub address: Address,
    pub endpoint: Arc<FakeEndpoint>,
    pub params: Mutex<ScribeParams>,
    pub poke: Mutex<PokeData>,
    pub next: Mutex<NextPoke>,
    /// `Err` makes the read fail with that message
    pub challenge_period: Mutex<Result<Duration, &'static str>>,
    pub estimate: Mutex<Estimate>,
    pub op_estimate: Mutex<Estimate>,
    pub pokes: Mutex<Vec<PokeData>>,
    pub op_pokes: Mutex<Vec<PokeData>>,
    pub reads: AtomicUsize,
}

impl FakeScribeContract {
    pub fn new(
        wat: &str,
        bar: usize,
        feeds: impl IntoIterator<Item = Address>,
        poke: PokeData,
    ) -> Arc<Self> {
        Arc::new(Self {
            address: Address::repeat_byte(0x5c),
            endpoint: FakeEndpoint::new("ethereum"),
            params: Mutex::new(ScribeParams {
                wat: wat.to_owned(),
                bar,
                feeds: feeds.into_iter().collect::<BTreeSet<_>>(),
            }),
            poke: Mutex::new(poke),
            next: Mutex::new(NextPoke {
                poke,
                finalized: true,
            }),
            challenge_period: Mutex::new(Ok(Duration::from_secs(20 * 60))),
            estimate: Mutex::new(Estimate::Gas(80_000)),
            op_estimate: Mutex::new(Estimate::Gas(60_000)),
            pokes: Mutex::new(vec![]),
            op_pokes: Mutex::new(vec![]),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn pokes(&self) -> Vec<PokeData> {
        self.pokes.lock().expect("lock poison").clone()
    }

    pub fn op_pokes(&self) -> Vec<PokeData> {
        self.op_pokes.lock().expect("lock poison").clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IScribeContract for FakeScribeContract {
    fn address(&self) -> Address {
        self.address
    }

    fn endpoint(&self) -> DynRpcEndpoint {
        self.endpoint.clone()
    }

    async fn read_poke(&self) -> Result<PokeData> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.poke.lock().expect("lock poison"))
    }

    async fn read_params(&self) -> Result<ScribeParams> {
        Ok(self.params.lock().expect("lock poison").clone())
    }

    fn poke(&self, poke: &PokeData, _schnorr: &SchnorrData) -> DynCallable {
        self.pokes.lock().expect("lock poison").push(*poke);
        FakeCall {
            to: self.address,
            calldata: Bytes::from_static(b"poke"),
            estimate: self.estimate.lock().expect("lock poison").clone(),
        }
        .into_dyn()
    }
}

#[async_trait]
impl IOptimisticScribeContract for FakeScribeContract {
    async fn read_next_poke(&self) -> Result<NextPoke> {
        Ok(*self.next.lock().expect("lock poison"))
    }

    async fn read_challenge_period(&self) -> Result<Duration> {
        (*self.challenge_period.lock().expect("lock poison")).map_err(|msg| anyhow!(msg))
    }

    fn op_poke(
        &self,
        poke: &PokeData,
        _schnorr: &SchnorrData,
        _ecdsa: &EcdsaSignature,
    ) -> DynCallable {
        self.op_pokes.lock().expect("lock poison").push(*poke);
        FakeCall {
            to: self.address,
            calldata: Bytes::from_static(b"opPoke"),
            estimate: self.op_estimate.lock().expect("lock poison").clone(),
        }
        .into_dyn()
    }
}

#[derive(Debug, Default)]
pub struct FakeDataPointStore {
    points: Mutex<BTreeMap<Address, DataPoint>>,
    failing: Mutex<BTreeSet<Address>>,
    pub queried: Mutex<Vec<Address>>,
}

impl FakeDataPointStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, feed: Address, point: DataPoint) {
        self.points.lock().expect("lock poison").insert(feed, point);
    }

    pub fn insert_price(&self, feed: Address, price: u128, time: SystemTime) {
        self.insert(
            feed,
            DataPoint {
                value: Some(DataPointValue::Price(price)),
                time,
                signature: Some(ecdsa(feed.0[0])),
            },
        );
    }

    pub fn fail_for(&self, feed: Address) {
        self.failing.lock().expect("lock poison").insert(feed);
    }

    pub fn queried(&self) -> Vec<Address> {
        self.queried.lock().expect("lock poison").clone()
    }
}

#[async_trait]
impl IDataPointStore for FakeDataPointStore {
    async fn latest_from(&self, feed: Address, _wat: &str) -> Result<Option<DataPoint>> {
        self.queried.lock().expect("lock poison").push(feed);
        if self.failing.lock().expect("lock poison").contains(&feed) {
            return Err(anyhow!("store unavailable"));
        }
        Ok(self.points.lock().expect("lock poison").get(&feed).cloned())
    }
}

#[derive(Debug, Default)]
pub struct FakeMuSigStore {
    observations: Mutex<Vec<SignedObservation>>,
}

impl FakeMuSigStore {
    pub fn new(observations: Vec<SignedObservation>) -> Arc<Self> {
        Arc::new(Self {
            observations: Mutex::new(observations),
        })
    }
}

#[async_trait]
impl IMuSigStore for FakeMuSigStore {
    async fn signatures(&self, wat: &str) -> Result<Vec<SignedObservation>> {
        Ok(self
            .observations
            .lock()
            .expect("lock poison")
            .iter()
            .filter(|observation| observation.wat == wat)
            .cloned()
            .collect())
    }
}

pub fn observation(
    wat: &str,
    val: u128,
    age: SystemTime,
    signers: Vec<Address>,
) -> SignedObservation {
    SignedObservation {
        wat: wat.to_owned(),
        val: Some(val),
        age,
        signers,
        schnorr: schnorr(0x33),
        ecdsa: Some(ecdsa(0x44)),
    }
}

/// Providers evaluated at the same time, shared between fake providers
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Returns fixed calls, or panics when asked to
#[derive(Debug)]
pub struct FakeProvider {
    pub name: &'static str,
    pub calls: Vec<RelayCall>,
    pub panics: bool,
    pub polled: AtomicUsize,
    pub delay: Duration,
    pub in_flight: Option<Arc<InFlight>>,
}

impl FakeProvider {
    pub fn new(name: &'static str, calls: Vec<RelayCall>) -> Self {
        Self {
            name,
            calls,
            panics: false,
            polled: AtomicUsize::new(0),
            delay: Duration::ZERO,
            in_flight: None,
        }
    }

    /// Takes `delay` to answer and reports itself in `in_flight` meanwhile
    pub fn slow(name: &'static str, delay: Duration, in_flight: Arc<InFlight>) -> Self {
        Self {
            delay,
            in_flight: Some(in_flight),
            ..Self::new(name, vec![])
        }
    }

    pub fn panicking(name: &'static str) -> Self {
        Self {
            panics: true,
            ..Self::new(name, vec![])
        }
    }
}

#[async_trait]
impl ICallProvider for FakeProvider {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    async fn relay_calls(&self) -> Vec<RelayCall> {
        self.polled.fetch_add(1, Ordering::SeqCst);
        assert!(!self.panics, "provider {} failed", self.name);
        if let Some(in_flight) = &self.in_flight {
            in_flight.enter();
        }
        tokio::time::sleep(self.delay).await;
        if let Some(in_flight) = &self.in_flight {
            in_flight.leave();
        }
        self.calls.clone()
    }
}

/// A ready-made call to `contract` through `endpoint`
pub fn relay_call(endpoint: &Arc<FakeEndpoint>, contract: u8, gas_estimate: u64) -> RelayCall {
    let contract = Address::repeat_byte(contract);
    RelayCall {
        endpoint: endpoint.clone(),
        contract,
        kind: CallKind::ScribePoke,
        callable: FakeCall::new(contract, gas_estimate).into_dyn(),
        gas_estimate,
    }
}
