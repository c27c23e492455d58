//! Picking the observations an update is built from

use std::collections::BTreeSet;
use std::future::Future;

use alloy_primitives::Address;
use rand::Rng;
use rand::seq::SliceRandom as _;

/// Feeds in uniformly random order so no feed is favoured
pub fn random_order(feeds: &[Address]) -> Vec<Address> {
    random_order_with(feeds, &mut rand::thread_rng())
}

pub fn random_order_with<R: Rng + ?Sized>(feeds: &[Address], rng: &mut R) -> Vec<Address> {
    let mut order = feeds.to_vec();
    order.shuffle(rng);
    order
}

/// Walks `order` and keeps what `fetch` returns until `quorum` items are
/// collected or the feeds run out
///
/// The result may hold fewer than `quorum` items, callers decide what that
/// means.
pub async fn collect_quorum<T, F, Fut>(
    order: impl IntoIterator<Item = Address>,
    quorum: usize,
    mut fetch: F,
) -> Vec<T>
where
    F: FnMut(Address) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut collected = Vec::with_capacity(quorum);
    for feed in order {
        if collected.len() >= quorum {
            break;
        }
        if let Some(item) = fetch(feed).await {
            collected.push(item);
        }
    }
    collected
}

/// Signers that are not lifted on the contract
///
/// Empty when the lifted set covers every signer.
pub fn unlifted_signers(signers: &[Address], lifted: &BTreeSet<Address>) -> Vec<Address> {
    signers
        .iter()
        .filter(|signer| !lifted.contains(*signer))
        .copied()
        .collect()
}

/// Returns the sorted middle, or the average of the two middle items if
/// there is an even number of them.
pub fn median(values: &[u128]) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let (a, b) = (sorted[middle - 1], sorted[middle]);
        // halve first so the sum cannot overflow
        Some(a / 2 + b / 2 + (a % 2 + b % 2) / 2)
    } else {
        Some(sorted[middle])
    }
}
