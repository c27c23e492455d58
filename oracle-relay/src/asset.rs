//! Asset pair names ("wat")
//!
//! Configuration names pairs as `ETH/USD`. Older contracts store the same
//! pair as a `bytes32` without the separator (`ETHUSD`), and the decoded
//! string may still carry the zero padding.

const PAIR_SEPARATOR: char = '/';

/// Canonical form used for comparisons: no separator, no padding, upper case
pub fn normalize(wat: &str) -> String {
    wat.trim_end_matches('\0')
        .trim()
        .chars()
        .filter(|c| *c != PAIR_SEPARATOR)
        .flat_map(char::to_uppercase)
        .collect()
}

/// Does the on-chain `wat` name the configured pair?
pub fn matches(configured: &str, on_chain: &str) -> bool {
    !configured.is_empty() && normalize(configured) == normalize(on_chain)
}
