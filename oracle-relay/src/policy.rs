//! When does a contract need a new price?
//!
//! A poke is warranted once the stored price is older than the expiration
//! or the candidate price deviates from it by at least the spread
//! threshold. The same policy is used by every provider, the optimistic
//! provider just runs a second instance with its own thresholds.

use std::time::{Duration, SystemTime};

use crate::contract::PokeData;

/// Relative deviation of `candidate` from `reference`, in percent
///
/// A zero reference or a missing candidate is infinitely far off.
pub fn calculate_spread(reference: u128, candidate: Option<u128>) -> f64 {
    match candidate {
        Some(candidate) if reference != 0 => {
            #[allow(clippy::cast_precision_loss)]
            let spread = candidate.abs_diff(reference) as f64 / reference as f64 * 100.0;
            spread
        }
        _ => f64::INFINITY,
    }
}

/// Has `expiration` passed since `reference_time`?
///
/// A reference time in the future (clock skew) never counts as expired.
pub fn is_expired(reference_time: SystemTime, now: SystemTime, expiration: Duration) -> bool {
    now.duration_since(reference_time)
        .is_ok_and(|age| age >= expiration)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdatePolicy {
    /// Minimum deviation in percent that warrants an update
    pub spread: f64,
    /// Maximum age of the stored price
    pub expiration: Duration,
}

impl UpdatePolicy {
    pub fn new(spread: f64, expiration: Duration) -> Self {
        Self { spread, expiration }
    }

    pub fn evaluate(&self, current: &PokeData, candidate: u128, now: SystemTime) -> UpdateDecision {
        UpdateDecision {
            spread: calculate_spread(current.val, Some(candidate)),
            threshold: self.spread,
            expired: is_expired(current.age, now, self.expiration),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateDecision {
    pub spread: f64,
    pub threshold: f64,
    pub expired: bool,
}

impl UpdateDecision {
    pub fn is_stale(&self) -> bool {
        self.spread >= self.threshold
    }

    pub fn is_warranted(&self) -> bool {
        self.expired || self.is_stale()
    }
}
