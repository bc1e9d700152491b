//! Share maps: peer id → share.

use std::collections::BTreeMap;

/// Mapping of peer/contributor id to a share. Ordered for stable output.
pub type ShareMap = BTreeMap<String, f64>;

/// Sum of all shares.
pub fn total(map: &ShareMap) -> f64 {
    map.values().sum()
}

/// Keep strictly positive entries and scale them to sum to 1.
///
/// Returns an empty map when nothing positive remains.
pub fn normalize(map: &ShareMap) -> ShareMap {
    let sum: f64 = map.values().filter(|v| **v > 0.0).sum();
    if sum <= 0.0 || !sum.is_finite() {
        return ShareMap::new();
    }
    map.iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(k, v)| (k.clone(), v / sum))
        .collect()
}
