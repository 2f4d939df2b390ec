//! Output records: the unit of tile assignment, deduplication, and
//! adjacent-feature merging.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use geo_types::{MultiLineString, MultiPolygon, Point};

use crate::coords::WayId;
use crate::store::OsmStore;
use crate::{geom, Error};

/// Geometry family a record materializes into at tile-write time.
///
/// `Cached*` records index pre-built geometries instead of the OSM store
/// (the integration point for external sources such as shapefile loaders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputGeomType {
    Point,
    Linestring,
    Polygon,
    Centroid,
    CachedLinestring,
    CachedPolygon,
}

/// Attribute value written to the tile.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Double(f64),
    Bool(bool),
}

impl Eq for AttrValue {}

impl Ord for AttrValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use AttrValue::*;
        match (self, other) {
            (Str(a), Str(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Str(_), _) => Ordering::Less,
            (_, Str(_)) => Ordering::Greater,
            (Double(_), _) => Ordering::Less,
            (_, Double(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for AttrValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub type AttrMap = BTreeMap<String, AttrValue>;

/// One feature emitted by the tag processor.
///
/// Records are totally ordered by layer, then attributes, then geometry
/// type, then source id; the field order below is what the derive uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutputRecord {
    pub layer: u32,
    pub attributes: Arc<AttrMap>,
    pub geom_type: OutputGeomType,
    pub osm_id: u64,
}

/// Pre-built geometry usable by `Cached*` records.
#[derive(Debug, Clone)]
pub enum CachedGeometry {
    Lines(MultiLineString<f64>),
    Polygons(MultiPolygon<f64>),
}

/// Geometry of one feature, ready for clipping and encoding.
#[derive(Debug, Clone)]
pub enum FeatureGeometry {
    Point(Point<f64>),
    Lines(MultiLineString<f64>),
    Polygons(MultiPolygon<f64>),
}

impl OutputRecord {
    pub fn new(layer: u32, geom_type: OutputGeomType, osm_id: u64, attributes: Arc<AttrMap>) -> Self {
        OutputRecord {
            layer,
            attributes,
            geom_type,
            osm_id,
        }
    }

    /// Materialize the record's geometry from the store or the cache.
    ///
    /// A `Polygon`/`Centroid` record whose id names a stored relation is
    /// rebuilt from the relation's encoded sequence, otherwise from the
    /// way's node list.
    pub fn build_geometry(
        &self,
        store: &OsmStore,
        cached: &[CachedGeometry],
    ) -> Result<FeatureGeometry, Error> {
        match self.geom_type {
            OutputGeomType::Point => {
                let ll = store.nodes.get(self.osm_id)?;
                Ok(FeatureGeometry::Point(Point::new(ll.lon_deg(), ll.latp_deg())))
            }
            OutputGeomType::Linestring => {
                let ls = store.linestring_from_nodes(store.ways.get(self.way_id()?)?)?;
                Ok(FeatureGeometry::Lines(MultiLineString::new(vec![ls])))
            }
            OutputGeomType::Polygon => Ok(FeatureGeometry::Polygons(self.polygons(store)?)),
            OutputGeomType::Centroid => {
                let mp = self.polygons(store)?;
                let center = geom::centroid(&mp).ok_or(Error::GeometryFailed(self.osm_id))?;
                Ok(FeatureGeometry::Point(center))
            }
            OutputGeomType::CachedLinestring => match self.cached(cached)? {
                CachedGeometry::Lines(lines) => Ok(FeatureGeometry::Lines(lines.clone())),
                CachedGeometry::Polygons(_) => Err(Error::GeometryFailed(self.osm_id)),
            },
            OutputGeomType::CachedPolygon => match self.cached(cached)? {
                CachedGeometry::Polygons(polys) => Ok(FeatureGeometry::Polygons(polys.clone())),
                CachedGeometry::Lines(_) => Err(Error::GeometryFailed(self.osm_id)),
            },
        }
    }

    fn polygons(&self, store: &OsmStore) -> Result<MultiPolygon<f64>, Error> {
        let id = self.way_id()?;
        if store.relations.contains(id) {
            store.relation_multipolygon(id)
        } else {
            let polygon = store.polygon_from_nodes(store.ways.get(id)?)?;
            Ok(MultiPolygon::new(vec![polygon]))
        }
    }

    fn way_id(&self) -> Result<WayId, Error> {
        WayId::try_from(self.osm_id).map_err(|_| Error::GeometryFailed(self.osm_id))
    }

    fn cached<'a>(&self, cached: &'a [CachedGeometry]) -> Result<&'a CachedGeometry, Error> {
        cached
            .get(self.osm_id as usize)
            .ok_or(Error::CachedNotFound(self.osm_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LatpLon;
    use crate::store::SeqItem;

    fn attrs(pairs: &[(&str, &str)]) -> Arc<AttrMap> {
        Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), AttrValue::Str(v.to_string())))
                .collect(),
        )
    }

    #[test]
    fn ordering_is_layer_then_attributes_then_type_then_id() {
        let a = OutputRecord::new(0, OutputGeomType::Polygon, 5, attrs(&[("kind", "a")]));
        let b = OutputRecord::new(0, OutputGeomType::Polygon, 2, attrs(&[("kind", "b")]));
        let c = OutputRecord::new(1, OutputGeomType::Point, 1, attrs(&[]));
        let d = OutputRecord::new(0, OutputGeomType::Linestring, 9, attrs(&[("kind", "a")]));

        let mut sorted = vec![c.clone(), b.clone(), a.clone(), d.clone()];
        sorted.sort();
        // layer 0 first; within layer 0, attrs "a" before "b"; within equal
        // attrs, linestring before polygon (declaration order)
        assert_eq!(sorted, vec![d, a, b, c]);
    }

    #[test]
    fn dedup_uses_total_order() {
        let a = OutputRecord::new(0, OutputGeomType::Polygon, 5, attrs(&[("kind", "a")]));
        let mut records = vec![a.clone(), a.clone(), a.clone()];
        records.sort();
        records.dedup();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn polygon_record_prefers_relation() {
        let mut store = OsmStore::default();
        store.nodes.insert(1, LatpLon::from_degrees(0.0, 0.0));
        store.nodes.insert(2, LatpLon::from_degrees(0.0, 1.0));
        store.nodes.insert(3, LatpLon::from_degrees(1.0, 1.0));
        store.nodes.insert(4, LatpLon::from_degrees(1.0, 0.0));
        store.nodes.insert(11, LatpLon::from_degrees(5.0, 5.0));
        store.nodes.insert(12, LatpLon::from_degrees(5.0, 6.0));
        store.nodes.insert(13, LatpLon::from_degrees(6.0, 6.0));
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        store.ways.insert(30, vec![11, 12, 13, 11]);
        store
            .relations
            .insert(77, vec![SeqItem::Way(10), SeqItem::OuterMark, SeqItem::Way(30)]);

        let rec = OutputRecord::new(0, OutputGeomType::Polygon, 77, attrs(&[]));
        match rec.build_geometry(&store, &[]).unwrap() {
            FeatureGeometry::Polygons(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected polygons, got {other:?}"),
        }
    }

    #[test]
    fn centroid_record_builds_point() {
        let mut store = OsmStore::default();
        store.nodes.insert(1, LatpLon::from_degrees(0.0, 0.0));
        store.nodes.insert(2, LatpLon::from_degrees(0.0, 2.0));
        store.nodes.insert(3, LatpLon::from_degrees(2.0, 2.0));
        store.nodes.insert(4, LatpLon::from_degrees(2.0, 0.0));
        store.ways.insert(10, vec![1, 2, 3, 4, 1]);
        let rec = OutputRecord::new(0, OutputGeomType::Centroid, 10, attrs(&[]));
        match rec.build_geometry(&store, &[]).unwrap() {
            FeatureGeometry::Point(p) => {
                assert!((p.x() - 1.0).abs() < 1e-9);
            }
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn cached_record_reads_cache() {
        let store = OsmStore::default();
        let cached = vec![CachedGeometry::Lines(MultiLineString::new(vec![
            geo_types::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
        ]))];
        let rec = OutputRecord::new(0, OutputGeomType::CachedLinestring, 0, attrs(&[]));
        assert!(matches!(
            rec.build_geometry(&store, &cached).unwrap(),
            FeatureGeometry::Lines(_)
        ));
        let missing = OutputRecord::new(0, OutputGeomType::CachedLinestring, 5, attrs(&[]));
        assert!(missing.build_geometry(&store, &cached).is_err());
    }
}
