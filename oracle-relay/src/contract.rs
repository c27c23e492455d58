//! Oracle contracts as seen by the relay
//!
//! Implementations own ABI encoding and the RPC client, the relay only
//! consumes decoded state and gets back callables it can estimate and
//! submit.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use oracle_relay_core::time::to_unix_secs;
use oracle_relay_rpc::{DynCallable, DynRpcEndpoint};
use serde::{Deserialize, Serialize};

use crate::store::ValidDataPoint;

/// A stored or proposed price and the time it was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PokeData {
    pub val: u128,
    pub age: SystemTime,
}

/// Aggregated Schnorr signature over a poke, produced jointly by the signers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrData {
    pub signature: B256,
    pub commitment: Address,
}

impl SchnorrData {
    pub fn is_empty(&self) -> bool {
        self.signature.is_zero() || self.commitment.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl EcdsaSignature {
    pub fn is_well_formed(&self) -> bool {
        matches!(self.v, 27 | 28) && !self.r.is_zero() && !self.s.is_zero()
    }
}

/// State of a median contract, read in a single multicall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedianState {
    pub wat: String,
    pub val: u128,
    pub age: SystemTime,
    pub bar: usize,
}

impl MedianState {
    pub fn poke_data(&self) -> PokeData {
        PokeData {
            val: self.val,
            age: self.age,
        }
    }
}

/// Arguments of a median poke, one entry per observation
///
/// The contract requires the entries sorted by value, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedianPoke {
    pub val: Vec<u128>,
    pub age: Vec<u64>,
    pub v: Vec<u8>,
    pub r: Vec<B256>,
    pub s: Vec<B256>,
}

impl MedianPoke {
    pub fn from_points(mut points: Vec<ValidDataPoint>) -> Self {
        points.sort_by_key(|point| point.val);
        let mut poke = Self::default();
        for point in points {
            poke.val.push(point.val);
            poke.age.push(to_unix_secs(point.age));
            poke.v.push(point.signature.v);
            poke.r.push(point.signature.r);
            poke.s.push(point.signature.s);
        }
        poke
    }
}

pub type DynMedianContract = Arc<dyn IMedianContract>;

#[async_trait]
pub trait IMedianContract: Debug + Send + Sync + 'static {
    fn address(&self) -> Address;

    fn endpoint(&self) -> DynRpcEndpoint;

    /// Reads `val`, `age`, `wat` and `bar` in one multicall
    async fn read_state(&self) -> Result<MedianState>;

    fn poke(&self, poke: MedianPoke) -> DynCallable;
}

/// Configuration of a Scribe contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScribeParams {
    pub wat: String,
    pub bar: usize,
    /// Lifted feeds, the only addresses allowed to sign a poke
    pub feeds: BTreeSet<Address>,
}

pub type DynScribeContract = Arc<dyn IScribeContract>;

#[async_trait]
pub trait IScribeContract: Debug + Send + Sync + 'static {
    fn address(&self) -> Address;

    fn endpoint(&self) -> DynRpcEndpoint;

    async fn read_poke(&self) -> Result<PokeData>;

    /// Reads `wat`, `bar` and the lifted feeds in one multicall
    async fn read_params(&self) -> Result<ScribeParams>;

    fn poke(&self, poke: &PokeData, schnorr: &SchnorrData) -> DynCallable;
}

/// The newest poke of an optimistic contract, which may still be challenged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextPoke {
    pub poke: PokeData,
    /// The challenge period of the last optimistic poke is over
    pub finalized: bool,
}

pub type DynOptimisticScribeContract = Arc<dyn IOptimisticScribeContract>;

#[async_trait]
pub trait IOptimisticScribeContract: IScribeContract {
    async fn read_next_poke(&self) -> Result<NextPoke>;

    async fn read_challenge_period(&self) -> Result<Duration>;

    fn op_poke(
        &self,
        poke: &PokeData,
        schnorr: &SchnorrData,
        ecdsa: &EcdsaSignature,
    ) -> DynCallable;
}
