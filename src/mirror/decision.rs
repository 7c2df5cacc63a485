//! Decide which scored categories a message currently qualifies for.

use super::score::ScoreVector;
use std::collections::BTreeSet;

/// Default vote threshold.  The bot seeds one of each reaction itself, so a count of 1 means
/// nobody voted.
pub const DEFAULT_MIN_THRESHOLD: u64 = 1;

/// Indices of the winning reactions.
///
/// Nothing qualifies unless the top count is strictly above `min_threshold`.  Otherwise every
/// index sharing the top count wins; ties mirror into each tied category.
pub fn decide(scores: &ScoreVector, min_threshold: u64) -> BTreeSet<usize> {
    let max_count = scores.iter().copied().max().unwrap_or(0);
    if max_count <= min_threshold {
        return BTreeSet::new();
    }

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == max_count)
        .map(|(i, _)| i)
        .collect()
}
