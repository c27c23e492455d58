//! Signed observations collected from feeds
//!
//! The stores verify signatures before handing anything out, the relay only
//! checks that what it gets is complete enough to build a poke.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::SystemTime;

use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contract::{EcdsaSignature, SchnorrData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPointValue {
    Price(u128),
    Tick { price: u128, volume: u128 },
    /// Value kind the relay cannot poke with
    Other(String),
}

impl DataPointValue {
    pub fn price(&self) -> Option<u128> {
        match self {
            DataPointValue::Price(price) | DataPointValue::Tick { price, .. } => Some(*price),
            DataPointValue::Other(_) => None,
        }
    }
}

/// Latest observation of a single feed, as kept by the data point store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPoint {
    pub value: Option<DataPointValue>,
    pub time: SystemTime,
    pub signature: Option<EcdsaSignature>,
}

/// A data point that can go into a median poke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidDataPoint {
    pub feed: Address,
    pub val: u128,
    pub age: SystemTime,
    pub signature: EcdsaSignature,
}

impl DataPoint {
    /// `None` if the point is malformed or older than `not_before`
    pub fn validate(&self, feed: Address, not_before: SystemTime) -> Option<ValidDataPoint> {
        let val = self.value.as_ref()?.price()?;
        let signature = self.signature.filter(EcdsaSignature::is_well_formed)?;
        if self.time < not_before {
            return None;
        }
        Some(ValidDataPoint {
            feed,
            val,
            age: self.time,
            signature,
        })
    }
}

pub type DynDataPointStore = Arc<dyn IDataPointStore>;

#[async_trait]
pub trait IDataPointStore: Debug + Send + Sync + 'static {
    /// Latest data point `feed` published for `wat`
    async fn latest_from(&self, feed: Address, wat: &str) -> Result<Option<DataPoint>>;
}

/// A price signed by a group of feeds with an aggregated signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObservation {
    pub wat: String,
    pub val: Option<u128>,
    pub age: SystemTime,
    pub signers: Vec<Address>,
    pub schnorr: SchnorrData,
    /// Needed only for optimistic pokes
    pub ecdsa: Option<EcdsaSignature>,
}

impl SignedObservation {
    /// Complete aggregate signature from exactly `bar` signers
    pub fn is_structurally_valid(&self, bar: usize) -> bool {
        self.val.is_some() && !self.schnorr.is_empty() && self.signers.len() == bar
    }

    pub fn optimistic_signature(&self) -> Option<EcdsaSignature> {
        self.ecdsa.filter(EcdsaSignature::is_well_formed)
    }
}

pub type DynMuSigStore = Arc<dyn IMuSigStore>;

#[async_trait]
pub trait IMuSigStore: Debug + Send + Sync + 'static {
    /// All observations currently known for `wat`, in store order
    async fn signatures(&self, wat: &str) -> Result<Vec<SignedObservation>>;
}
