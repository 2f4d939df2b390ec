//! The OSM geometry store: latp/lon for nodes, node lists for ways, and
//! encoded way sequences for multipolygon relations.
//!
//! Only the data selected for output ends up here. The stores are plain
//! fields of the pipeline; geometry construction reads them through
//! [`OsmStore`].

use ahash::AHashMap;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};

use crate::coords::{LatpLon, NodeId, WayId};
use crate::{geom, Error};

/// One item of an encoded relation sequence.
///
/// A multipolygon is flattened into a single sequence: concatenated outer
/// rings separated by `OuterMark`; within each outer, inner rings
/// introduced by `InnerMark`; a ring is a run of ways, each optionally
/// prefixed by `ReverseMark` meaning the way is traversed end-to-start.
///
/// Example: a polygon with outer `[1, rev 2, 3]` and inner `[4, 5]`,
/// followed by a second polygon with outer `[6]`, encodes as
/// `[Way(1), ReverseMark, Way(2), Way(3), InnerMark, Way(4), Way(5),
///   OuterMark, Way(6)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqItem {
    Way(WayId),
    OuterMark,
    InnerMark,
    ReverseMark,
}

#[derive(Debug, Default)]
pub struct NodeStore {
    latplons: AHashMap<NodeId, LatpLon>,
}

impl NodeStore {
    pub fn contains(&self, id: NodeId) -> bool {
        self.latplons.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Result<LatpLon, Error> {
        self.latplons.get(&id).copied().ok_or(Error::NodeNotFound(id))
    }

    /// Insert a coordinate; a duplicate id keeps the first value.
    pub fn insert(&mut self, id: NodeId, coord: LatpLon) {
        self.latplons.entry(id).or_insert(coord);
    }

    pub fn clear(&mut self) {
        self.latplons.clear();
    }

    pub fn len(&self) -> usize {
        self.latplons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latplons.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct WayStore {
    node_lists: AHashMap<WayId, Vec<NodeId>>,
}

impl WayStore {
    pub fn contains(&self, id: WayId) -> bool {
        self.node_lists.contains_key(&id)
    }

    pub fn get(&self, id: WayId) -> Result<&[NodeId], Error> {
        self.node_lists
            .get(&id)
            .map(Vec::as_slice)
            .ok_or(Error::WayNotFound(id))
    }

    pub fn insert(&mut self, id: WayId, nodes: Vec<NodeId>) {
        self.node_lists.entry(id).or_insert(nodes);
    }

    pub fn clear(&mut self) {
        self.node_lists.clear();
    }

    pub fn len(&self) -> usize {
        self.node_lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_lists.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RelationStore {
    way_lists: AHashMap<WayId, Vec<SeqItem>>,
}

impl RelationStore {
    pub fn contains(&self, id: WayId) -> bool {
        self.way_lists.contains_key(&id)
    }

    pub fn get(&self, id: WayId) -> Result<&[SeqItem], Error> {
        self.way_lists
            .get(&id)
            .map(Vec::as_slice)
            .ok_or(Error::RelationNotFound(id))
    }

    pub fn insert(&mut self, id: WayId, ways: Vec<SeqItem>) {
        self.way_lists.entry(id).or_insert(ways);
    }

    pub fn clear(&mut self) {
        self.way_lists.clear();
    }

    pub fn len(&self) -> usize {
        self.way_lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.way_lists.is_empty()
    }
}

/// All three stores plus the geometry constructors that read them.
#[derive(Debug, Default)]
pub struct OsmStore {
    pub nodes: NodeStore,
    pub ways: WayStore,
    pub relations: RelationStore,
}

impl OsmStore {
    /// Translate node ids to projected points and append them to `sink`,
    /// optionally traversing the way end-to-start.
    ///
    /// Adjacent equal points are pushed only once, including against the
    /// point already at the tail of `sink`, so no zero-length edge is ever
    /// produced.
    pub fn fill_points(
        &self,
        sink: &mut Vec<Coord<f64>>,
        node_ids: &[NodeId],
        reverse: bool,
    ) -> Result<(), Error> {
        let mut points: Vec<Coord<f64>> = Vec::with_capacity(node_ids.len());
        for &id in node_ids {
            let ll = self.nodes.get(id)?;
            let p = Coord {
                x: ll.lon_deg(),
                y: ll.latp_deg(),
            };
            if points.last() != Some(&p) {
                points.push(p);
            }
        }
        if reverse {
            points.reverse();
        }
        let mut iter = points.into_iter();
        if let Some(first) = iter.next() {
            if sink.last() != Some(&first) {
                sink.push(first);
            }
            sink.extend(iter);
        }
        Ok(())
    }

    pub fn linestring_from_nodes(&self, node_ids: &[NodeId]) -> Result<LineString<f64>, Error> {
        let mut points = Vec::with_capacity(node_ids.len());
        self.fill_points(&mut points, node_ids, false)?;
        Ok(LineString::new(points))
    }

    /// Build a polygon from a (closed) node list and fix its winding.
    pub fn polygon_from_nodes(&self, node_ids: &[NodeId]) -> Result<Polygon<f64>, Error> {
        let mut points = Vec::with_capacity(node_ids.len());
        self.fill_points(&mut points, node_ids, false)?;
        Ok(geom::correct_polygon(Polygon::new(
            LineString::new(points),
            Vec::new(),
        )))
    }

    /// Reconstruct a multipolygon from an encoded way sequence.
    pub fn multipolygon_from_seq(&self, seq: &[SeqItem]) -> Result<MultiPolygon<f64>, Error> {
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        if seq.is_empty() {
            return Ok(MultiPolygon::new(polygons));
        }

        let mut ring: Vec<Coord<f64>> = Vec::new();
        let mut is_outer = true;
        let mut reverse_next = false;

        fn place(polygons: &mut Vec<Polygon<f64>>, ring: Vec<Coord<f64>>, is_outer: bool) {
            let ring = LineString::new(ring);
            if is_outer || polygons.is_empty() {
                polygons.push(Polygon::new(ring, Vec::new()));
            } else {
                let last = polygons.last_mut().unwrap();
                last.interiors_push(ring);
            }
        }

        for &item in seq {
            match item {
                SeqItem::ReverseMark => reverse_next = true,
                SeqItem::Way(id) => {
                    let nodes = self.ways.get(id)?;
                    let reverse = std::mem::take(&mut reverse_next);
                    self.fill_points(&mut ring, nodes, reverse)?;
                }
                SeqItem::OuterMark | SeqItem::InnerMark => {
                    place(&mut polygons, std::mem::take(&mut ring), is_outer);
                    is_outer = item == SeqItem::OuterMark;
                }
            }
        }
        place(&mut polygons, ring, is_outer);

        Ok(geom::correct_multipolygon(MultiPolygon::new(polygons)))
    }

    /// Multipolygon of a stored relation.
    pub fn relation_multipolygon(&self, rel_id: WayId) -> Result<MultiPolygon<f64>, Error> {
        self.multipolygon_from_seq(self.relations.get(rel_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_square() -> OsmStore {
        let mut store = OsmStore::default();
        store.nodes.insert(1, LatpLon::from_degrees(0.0, 0.0));
        store.nodes.insert(2, LatpLon::from_degrees(0.0, 1.0));
        store.nodes.insert(3, LatpLon::from_degrees(1.0, 1.0));
        store.nodes.insert(4, LatpLon::from_degrees(1.0, 0.0));
        store
    }

    #[test]
    fn insert_then_get() {
        let mut store = OsmStore::default();
        let coord = LatpLon::from_degrees(51.5, -0.1);
        store.nodes.insert(42, coord);
        assert!(store.nodes.contains(42));
        assert_eq!(store.nodes.get(42).unwrap(), coord);

        store.ways.insert(7, vec![42, 42, 42]);
        assert!(store.ways.contains(7));
        assert_eq!(store.ways.get(7).unwrap(), &[42, 42, 42]);

        store.relations.insert(9, vec![SeqItem::Way(7)]);
        assert!(store.relations.contains(9));
        assert_eq!(store.relations.get(9).unwrap(), &[SeqItem::Way(7)]);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = OsmStore::default();
        assert!(matches!(store.nodes.get(1), Err(Error::NodeNotFound(1))));
        assert!(matches!(store.ways.get(1), Err(Error::WayNotFound(1))));
        assert!(matches!(store.relations.get(1), Err(Error::RelationNotFound(1))));
    }

    #[test]
    fn duplicate_insert_keeps_first() {
        let mut store = NodeStore::default();
        store.insert(1, LatpLon::from_degrees(1.0, 1.0));
        store.insert(1, LatpLon::from_degrees(2.0, 2.0));
        assert_eq!(store.get(1).unwrap(), LatpLon::from_degrees(1.0, 1.0));
    }

    #[test]
    fn clear_empties() {
        let mut store = store_with_square();
        assert!(!store.nodes.is_empty());
        store.nodes.clear();
        assert!(store.nodes.is_empty());
    }

    #[test]
    fn fill_points_dedups_adjacent() {
        let store = store_with_square();
        let mut sink = Vec::new();
        store.fill_points(&mut sink, &[1, 1, 2, 2, 2, 3], false).unwrap();
        assert_eq!(sink.len(), 3);
        for pair in sink.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        // the dedup also looks at the existing tail of the sink
        store.fill_points(&mut sink, &[3, 4], false).unwrap();
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn fill_points_reverse_touches_only_new_points() {
        let store = store_with_square();
        let mut forward = Vec::new();
        store.fill_points(&mut forward, &[1, 2, 3], false).unwrap();

        let mut sink = Vec::new();
        store.fill_points(&mut sink, &[4], false).unwrap();
        store.fill_points(&mut sink, &[1, 2, 3], true).unwrap();
        let head = sink[0];
        assert_eq!(head.x, 0.0);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(&sink[1..], reversed.as_slice());
    }

    #[test]
    fn single_sequence_builds_one_polygon() {
        let mut store = store_with_square();
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        let mp = store.multipolygon_from_seq(&[SeqItem::Way(10)]).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(mp.0[0].interiors().is_empty());
        assert!(geom::multipolygon_is_valid(&mp));
    }

    #[test]
    fn inner_mark_attaches_hole() {
        let mut store = store_with_square();
        store.nodes.insert(5, LatpLon::from_degrees(0.25, 0.25));
        store.nodes.insert(6, LatpLon::from_degrees(0.25, 0.75));
        store.nodes.insert(7, LatpLon::from_degrees(0.75, 0.5));
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(20, vec![5, 6, 7, 5]);
        let mp = store
            .multipolygon_from_seq(&[SeqItem::Way(10), SeqItem::InnerMark, SeqItem::Way(20)])
            .unwrap();
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!(geom::multipolygon_is_valid(&mp));
    }

    #[test]
    fn outer_mark_starts_second_polygon() {
        let mut store = store_with_square();
        store.nodes.insert(11, LatpLon::from_degrees(5.0, 5.0));
        store.nodes.insert(12, LatpLon::from_degrees(5.0, 6.0));
        store.nodes.insert(13, LatpLon::from_degrees(6.0, 6.0));
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(30, vec![11, 12, 13, 11]);
        let mp = store
            .multipolygon_from_seq(&[SeqItem::Way(10), SeqItem::OuterMark, SeqItem::Way(30)])
            .unwrap();
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn reverse_mark_reverses_one_way() {
        let mut store = store_with_square();
        store.ways.insert(10, vec![1, 2, 3]);
        store.ways.insert(11, vec![1, 4, 3]);
        // 10 runs 1->3, then 11 must run 3->1, i.e. reversed
        let mp = store
            .multipolygon_from_seq(&[SeqItem::Way(10), SeqItem::ReverseMark, SeqItem::Way(11)])
            .unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(geom::multipolygon_is_valid(&mp));
    }
}
