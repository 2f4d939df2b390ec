//! Multipolygon assembly: turn the `outer` and `inner` way bags of a
//! relation into one encoded way sequence describing a well-formed
//! multipolygon.
//!
//! The member ways arrive in arbitrary order, possibly needing reversal to
//! connect end-to-end, and some may be missing or empty. Rings are grown
//! greedily by repeatedly picking the unconsumed way whose nearer endpoint
//! is closest to the current walking coordinate; imperfect closures are
//! warned about but still used.

use geo_types::LineString;
use log::warn;

use crate::coords::{sq_dist, LatpLon, WayId};
use crate::store::{OsmStore, SeqItem};
use crate::geom;

struct RingBuild {
    ways: Vec<SeqItem>,
    ring: geom::Ring,
}

/// Assemble the encoded sequence for one multipolygon relation.
///
/// Always returns a sequence; defective input degrades by dropping rings
/// (with a warning) rather than failing the relation outright.
pub fn assemble_multipolygon(
    store: &OsmStore,
    outer_ways: &[WayId],
    inner_ways: &[WayId],
) -> Vec<SeqItem> {
    let mut outer_rings: Vec<RingBuild> = Vec::new();
    let mut inner_rings: Vec<RingBuild> = Vec::new();

    for is_outer in [true, false] {
        let way_vec = if is_outer { outer_ways } else { inner_ways };
        let rings = if is_outer { &mut outer_rings } else { &mut inner_rings };

        let mut consumed = vec![false; way_vec.len()];
        let mut endpoints = vec![(LatpLon::default(), LatpLon::default()); way_vec.len()];

        // remember begin/end coords of each way; unusable ways are consumed
        for (i, &way_id) in way_vec.iter().enumerate() {
            let nodes = match store.ways.get(way_id) {
                Ok(nodes) => nodes,
                Err(_) => {
                    warn!("relation member way {way_id} has no stored node list");
                    consumed[i] = true;
                    continue;
                }
            };
            if nodes.is_empty() {
                warn!("relation member way {way_id} is empty");
                consumed[i] = true;
                continue;
            }
            let first = store.nodes.get(nodes[0]);
            let last = store.nodes.get(*nodes.last().unwrap());
            match (first, last) {
                (Ok(first), Ok(last)) => endpoints[i] = (first, last),
                _ => {
                    warn!("relation member way {way_id} references unknown nodes");
                    consumed[i] = true;
                }
            }
        }

        // construct rings
        for start_idx in 0..way_vec.len() {
            if consumed[start_idx] {
                continue;
            }

            let mut seq: Vec<SeqItem> = Vec::new();
            let start_coord = endpoints[start_idx].0;
            let mut next_idx = start_idx;
            let mut reverse = false;
            loop {
                consumed[next_idx] = true;
                if reverse {
                    seq.push(SeqItem::ReverseMark);
                }
                seq.push(SeqItem::Way(way_vec[next_idx]));
                let current = if reverse {
                    endpoints[next_idx].0
                } else {
                    endpoints[next_idx].1
                };

                // nearest unconsumed endpoint, against closing the loop
                let mut min_sqd = sq_dist(current, start_coord);
                next_idx = start_idx;
                for (i, &(first, last)) in endpoints.iter().enumerate() {
                    if consumed[i] {
                        continue;
                    }
                    for (target, is_first) in [(first, true), (last, false)] {
                        let sqd = sq_dist(current, target);
                        if sqd < min_sqd {
                            min_sqd = sqd;
                            next_idx = i;
                            reverse = !is_first;
                        } else if sqd == 0 {
                            warn!(
                                "more than two ways share an endpoint at latp={} lon={}: way {} ({} end)",
                                current.latp,
                                current.lon,
                                way_vec[i],
                                if is_first { "first" } else { "second" }
                            );
                        }
                    }
                }
                if min_sqd > 0 {
                    warn!(
                        "no connected way at latp={} lon={}; using way {} at squared distance {}",
                        current.latp, current.lon, way_vec[next_idx], min_sqd
                    );
                }
                if next_idx == start_idx {
                    break;
                }
            }

            // materialize the ring from the chosen ways
            let mut points = Vec::new();
            let mut reverse_next = false;
            let mut resolved = true;
            for &item in &seq {
                match item {
                    SeqItem::ReverseMark => reverse_next = true,
                    SeqItem::Way(id) => {
                        let reverse = std::mem::take(&mut reverse_next);
                        let filled = store
                            .ways
                            .get(id)
                            .and_then(|nodes| store.fill_points(&mut points, nodes, reverse));
                        if filled.is_err() {
                            resolved = false;
                        }
                    }
                    _ => {}
                }
            }
            if !resolved {
                warn!("{} ring {} dropped: constituent nodes missing", ring_kind(is_outer), fmt_seq(&seq));
                continue;
            }
            let mut ring = LineString::new(points);
            geom::close_ring(&mut ring);
            if !geom::ring_is_valid(&ring) {
                warn!("invalid {} ring {} dropped", ring_kind(is_outer), fmt_seq(&seq));
                continue;
            }
            rings.push(RingBuild { ways: seq, ring });
        }
    }

    // attach each inner ring to the tightest outer ring containing it
    let mut inners_for_outer: Vec<Vec<SeqItem>> = vec![Vec::new(); outer_rings.len()];
    for inner in &inner_rings {
        let mut parent: Option<usize> = None;
        for (j, outer) in outer_rings.iter().enumerate() {
            if geom::ring_within(&inner.ring, &outer.ring) {
                let tighter = match parent {
                    None => true,
                    Some(p) => geom::ring_within(&outer.ring, &outer_rings[p].ring),
                };
                if tighter {
                    parent = Some(j);
                }
            }
        }
        match parent {
            Some(p) => {
                inners_for_outer[p].push(SeqItem::InnerMark);
                inners_for_outer[p].extend(inner.ways.iter().copied());
            }
            None => {
                warn!("inner ring {} is not in any outer ring", fmt_seq(&inner.ways));
            }
        }
    }

    // flatten, separating polygons with OuterMark
    let mut result = Vec::new();
    for (j, outer) in outer_rings.iter().enumerate() {
        if j > 0 {
            result.push(SeqItem::OuterMark);
        }
        result.extend(outer.ways.iter().copied());
        result.append(&mut inners_for_outer[j]);
    }

    // self-check; an invalid multipolygon is still returned since clipping
    // downstream may salvage parts of it
    match store.multipolygon_from_seq(&result) {
        Ok(mp) => {
            if !geom::multipolygon_is_valid(&mp) {
                warn!(
                    "assembled multipolygon is invalid (first outer way: {:?})",
                    outer_ways.first()
                );
            }
        }
        Err(err) => {
            warn!("assembled multipolygon could not be rebuilt: {err}");
        }
    }

    result
}

fn ring_kind(is_outer: bool) -> &'static str {
    if is_outer {
        "outer"
    } else {
        "inner"
    }
}

fn fmt_seq(seq: &[SeqItem]) -> String {
    let mut out = String::from("[");
    for (i, item) in seq.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match item {
            SeqItem::Way(id) => out.push_str(&id.to_string()),
            SeqItem::ReverseMark => out.push_str("rev"),
            SeqItem::OuterMark => out.push_str("outer"),
            SeqItem::InnerMark => out.push_str("inner"),
        }
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LatpLon;

    fn add_node(store: &mut OsmStore, id: u64, lat: f64, lon: f64) {
        store.nodes.insert(id, LatpLon::from_degrees(lat, lon));
    }

    /// Unit square 1-2-3-4, nodes 5..7 strictly inside it.
    fn base_store() -> OsmStore {
        let mut store = OsmStore::default();
        add_node(&mut store, 1, 0.0, 0.0);
        add_node(&mut store, 2, 0.0, 1.0);
        add_node(&mut store, 3, 1.0, 1.0);
        add_node(&mut store, 4, 1.0, 0.0);
        add_node(&mut store, 5, 0.2, 0.2);
        add_node(&mut store, 6, 0.2, 0.8);
        add_node(&mut store, 7, 0.8, 0.5);
        store
    }

    #[test]
    fn closed_single_way() {
        let mut store = base_store();
        store.ways.insert(100, vec![1, 2, 3, 4, 1]);
        let seq = assemble_multipolygon(&store, &[100], &[]);
        assert_eq!(seq, vec![SeqItem::Way(100)]);
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(geom::multipolygon_is_valid(&mp));
    }

    #[test]
    fn outer_of_two_fragments() {
        let mut store = base_store();
        store.ways.insert(10, vec![1, 2, 3]);
        store.ways.insert(11, vec![3, 4, 1]);
        let seq = assemble_multipolygon(&store, &[10, 11], &[]);
        assert_eq!(seq, vec![SeqItem::Way(10), SeqItem::Way(11)]);
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(mp.0[0].interiors().is_empty());
        // four distinct corners plus closure
        assert_eq!(mp.0[0].exterior().0.len(), 5);
    }

    #[test]
    fn fragment_needing_reversal() {
        let mut store = base_store();
        store.ways.insert(10, vec![1, 2, 3]);
        store.ways.insert(11, vec![1, 4, 3]);
        let seq = assemble_multipolygon(&store, &[10, 11], &[]);
        assert_eq!(
            seq,
            vec![SeqItem::Way(10), SeqItem::ReverseMark, SeqItem::Way(11)]
        );
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert!(geom::multipolygon_is_valid(&mp));
    }

    #[test]
    fn one_outer_one_inner() {
        let mut store = base_store();
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(20, vec![5, 6, 7, 5]);
        let seq = assemble_multipolygon(&store, &[10], &[20]);
        assert_eq!(
            seq,
            vec![SeqItem::Way(10), SeqItem::InnerMark, SeqItem::Way(20)]
        );
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
    }

    #[test]
    fn inner_without_parent_is_dropped() {
        let mut store = base_store();
        add_node(&mut store, 100, 40.0, 40.0);
        add_node(&mut store, 101, 40.0, 41.0);
        add_node(&mut store, 102, 41.0, 40.0);
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(20, vec![100, 101, 102, 100]);
        let seq = assemble_multipolygon(&store, &[10], &[20]);
        assert_eq!(seq, vec![SeqItem::Way(10)]);
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(mp.0[0].interiors().is_empty());
    }

    #[test]
    fn two_disjoint_outers() {
        let mut store = base_store();
        add_node(&mut store, 11, 5.0, 5.0);
        add_node(&mut store, 12, 5.0, 6.0);
        add_node(&mut store, 13, 6.0, 6.0);
        add_node(&mut store, 14, 6.0, 5.0);
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(11, vec![11, 12, 13, 14, 11]);
        let seq = assemble_multipolygon(&store, &[10, 11], &[]);
        assert_eq!(
            seq,
            vec![SeqItem::Way(10), SeqItem::OuterMark, SeqItem::Way(11)]
        );
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn missing_way_is_skipped() {
        let mut store = base_store();
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        let seq = assemble_multipolygon(&store, &[10, 999], &[]);
        assert_eq!(seq, vec![SeqItem::Way(10)]);
    }

    #[test]
    fn tightest_outer_wins() {
        let mut store = base_store();
        // big square around everything
        add_node(&mut store, 30, -5.0, -5.0);
        add_node(&mut store, 31, -5.0, 6.0);
        add_node(&mut store, 32, 6.0, 6.0);
        add_node(&mut store, 33, 6.0, -5.0);
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(12, vec![30, 31, 32, 33, 30]);
        store.ways.insert(20, vec![5, 6, 7, 5]);
        let seq = assemble_multipolygon(&store, &[12, 10], &[20]);
        // the hole must land on way 10, the smaller enclosing outer
        assert_eq!(
            seq,
            vec![
                SeqItem::Way(12),
                SeqItem::OuterMark,
                SeqItem::Way(10),
                SeqItem::InnerMark,
                SeqItem::Way(20)
            ]
        );
    }

    #[test]
    fn all_ways_reversed() {
        let mut store = base_store();
        // every fragment after the first connects by its far endpoint
        store.ways.insert(10, vec![2, 1]);
        store.ways.insert(11, vec![4, 1]);
        store.ways.insert(12, vec![3, 4]);
        store.ways.insert(13, vec![2, 3]);
        let seq = assemble_multipolygon(&store, &[10, 11, 12, 13], &[]);
        assert_eq!(
            seq,
            vec![
                SeqItem::Way(10),
                SeqItem::ReverseMark,
                SeqItem::Way(11),
                SeqItem::ReverseMark,
                SeqItem::Way(12),
                SeqItem::ReverseMark,
                SeqItem::Way(13)
            ]
        );
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        assert!(geom::multipolygon_is_valid(&mp));
    }

    #[test]
    fn inner_equal_to_outer_is_not_parented() {
        let mut store = base_store();
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(21, vec![1, 2, 3, 4, 1]);
        let seq = assemble_multipolygon(&store, &[10], &[21]);
        let mp = store.multipolygon_from_seq(&seq).unwrap();
        // either the duplicate hole was dropped, or the self-check flagged
        // the assembled multipolygon; the surviving polygon must be valid
        if mp.0[0].interiors().is_empty() {
            assert!(geom::multipolygon_is_valid(&mp));
        } else {
            assert!(!geom::multipolygon_is_valid(&mp));
        }
    }

    #[test]
    fn reassembly_is_idempotent() {
        let mut store = base_store();
        store.ways.insert(10, vec![1, 2, 3]);
        store.ways.insert(11, vec![3, 4, 1]);
        store.ways.insert(20, vec![5, 6, 7, 5]);
        let seq = assemble_multipolygon(&store, &[10, 11], &[20]);

        // re-split the flattened sequence by role and assemble again
        let mut outers = Vec::new();
        let mut inners = Vec::new();
        let mut in_inner = false;
        for item in &seq {
            match item {
                SeqItem::Way(id) => {
                    if in_inner {
                        inners.push(*id);
                    } else {
                        outers.push(*id);
                    }
                }
                SeqItem::InnerMark => in_inner = true,
                SeqItem::OuterMark => in_inner = false,
                SeqItem::ReverseMark => {}
            }
        }
        let again = assemble_multipolygon(&store, &outers, &inners);
        assert_eq!(seq, again);
    }
}
