//! Turns raw edge hit counts into features, the unit of novelty used by the corpus.
//!
//! A feature packs the bucketed hit count above the edge id:
//!
//! ```text
//!  63      56 55            28 27             0
//! +----------+----------------+----------------+
//! |  bucket  |   prev block   |   cur block    |
//! +----------+----------------+----------------+
//! ```

use std::collections::BTreeSet;

/// Dense id of an instrumented control-flow join point. Id 0 means "no predecessor".
pub type BlockId = u32;
/// `prev_block << BLOCK_BITS | cur_block`.
pub type EdgeId = u64;
/// `bucket(count) << BUCKET_SHIFT | edge`.
pub type Feature = u64;
/// Features are kept ordered so identical executions compare and iterate identically.
pub type FeatureSet = BTreeSet<Feature>;

/// Width of a block id inside an edge id.
pub const BLOCK_BITS: u32 = 28;
/// Largest block id an instrumented program may use.
pub const MAX_BLOCK_ID: BlockId = (1 << BLOCK_BITS) - 1;
pub const BLOCK_MASK: u64 = (1 << BLOCK_BITS) - 1;
pub const BUCKET_SHIFT: u32 = 2 * BLOCK_BITS;
pub const EDGE_MASK: u64 = (1 << BUCKET_SHIFT) - 1;

pub const fn edge_id(prev: BlockId, cur: BlockId) -> EdgeId {
    ((prev as u64 & BLOCK_MASK) << BLOCK_BITS) | (cur as u64 & BLOCK_MASK)
}

/// Logarithmic hit-count bucket: 1, 2, 3, 4-7, 8-15, 16-31, 32-127, 128+.
pub const fn bucket(count: u32) -> u64 {
    match count {
        0..=3 => count.saturating_sub(1) as u64,
        4..=7 => 3,
        8..=15 => 4,
        16..=31 => 5,
        32..=127 => 6,
        _ => 7,
    }
}

pub const fn feature(edge: EdgeId, count: u32) -> Feature {
    (bucket(count) << BUCKET_SHIFT) | (edge & EDGE_MASK)
}

pub const fn feature_edge(feature: Feature) -> EdgeId {
    feature & EDGE_MASK
}

pub const fn edge_source(edge: EdgeId) -> BlockId {
    ((edge >> BLOCK_BITS) & BLOCK_MASK) as BlockId
}

pub const fn edge_target(edge: EdgeId) -> BlockId {
    (edge & BLOCK_MASK) as BlockId
}

/// Encodes every edge with a non-zero count into its feature.
pub fn encode<'a, I>(edge_counts: I) -> FeatureSet
where
    I: IntoIterator<Item = (&'a EdgeId, &'a u32)>,
{
    edge_counts
        .into_iter()
        .filter(|(_, count)| **count > 0)
        .map(|(edge, count)| feature(*edge, *count))
        .collect()
}
