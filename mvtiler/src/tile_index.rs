//! Per-tile buckets of output records.
//!
//! The ingestion driver fills one index at the base zoom; coarser zooms
//! are derived by integer-halving tile coordinates and re-merging.

use std::collections::BTreeMap;

use crate::coords::parent_tile;
use crate::output::OutputRecord;

pub type TileIndex = BTreeMap<u32, Vec<OutputRecord>>;

/// Sort every bucket and drop duplicate records.
pub fn sort_and_dedup(index: &mut TileIndex) {
    for bucket in index.values_mut() {
        bucket.sort();
        bucket.dedup();
    }
}

/// Map a base-zoom index onto a coarser zoom.
pub fn derive_zoom_index(base: &TileIndex, basezoom: u8, zoom: u8) -> TileIndex {
    debug_assert!(zoom < basezoom);
    let delta = basezoom - zoom;
    let mut derived = TileIndex::new();
    for (&tile, bucket) in base {
        derived
            .entry(parent_tile(tile, delta))
            .or_default()
            .extend(bucket.iter().cloned());
    }
    derived
}
