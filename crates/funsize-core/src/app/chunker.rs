//! Chunker: groups pairs by history index and splits each group into
//! bounded, order-preserving chunks.

use std::collections::BTreeMap;

use tracing::info;

use crate::app::resolver::PairsByLocale;
use crate::domain::pair::{BuildPair, Chunk};

/// Regroups per-locale pairs by history index (cross-locale).
///
/// Every index in `1..=expected` gets an entry, possibly empty; over-fetched
/// indexes beyond it only appear when they hold pairs. Within a group, pairs
/// keep the locale order of the input.
pub fn group_by_history(pairs: &PairsByLocale, expected: usize) -> BTreeMap<u32, Vec<BuildPair>> {
    let mut groups: BTreeMap<u32, Vec<BuildPair>> =
        (1..=expected as u32).map(|i| (i, Vec::new())).collect();
    for pair in pairs.values().flatten() {
        groups
            .entry(pair.history_index())
            .or_default()
            .push(pair.clone());
    }
    groups
}

/// Splits each group into chunks of at most `max_chunk_size` pairs, cutting
/// every `max_chunk_size` elements.
///
/// `subchunk_index` (1-based) is only set when a group produced more than
/// one chunk. Empty groups produce nothing.
pub fn chunk(groups: BTreeMap<u32, Vec<BuildPair>>, max_chunk_size: usize) -> Vec<Chunk> {
    let size = max_chunk_size.max(1);
    let mut out = Vec::new();
    for (history_index, pairs) in groups {
        if pairs.is_empty() {
            info!(history_index, "nothing to submit");
            continue;
        }
        let split = pairs.len() > size;
        for (i, part) in pairs.chunks(size).enumerate() {
            let subchunk_index = split.then_some((i + 1) as u32);
            out.push(Chunk::new(history_index, subchunk_index, part.to_vec()));
        }
    }
    out
}
