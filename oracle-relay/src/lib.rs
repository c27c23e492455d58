//! Relay decision engine for price oracle contracts
//!
//! Every [`provider`] wraps one on-chain contract and decides on each tick
//! whether the contract needs a poke. The [`scheduler::Relay`] runs all
//! providers with bounded parallelism and turns their calls into one
//! transaction per RPC endpoint.

pub mod asset;
pub mod cache;
pub mod config;
pub mod contract;
pub mod envs;
mod metrics;
pub mod policy;
pub mod provider;
pub mod quorum;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod fake;

pub use crate::provider::{CallKind, DynCallProvider, ICallProvider, RelayCall};
pub use crate::scheduler::{Relay, RelayStatus};
