//! The per-element facade handed to the tag processor.
//!
//! Wraps one OSM node, way, or relation and exposes tag lookup, layer
//! emission, and basic geometric queries, accumulating the emitted output
//! records.

use std::sync::Arc;

use ahash::AHashMap;
use geo_types::{MultiLineString, MultiPolygon};
use log::warn;

use crate::config::LayerSet;
use crate::coords::{LatpLon, NodeId, WayId};
use crate::output::{AttrMap, AttrValue, OutputGeomType, OutputRecord};
use crate::store::OsmStore;
use crate::{geom, Error};

pub type Tags = AHashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

pub struct OsmElement<'a> {
    kind: ElementKind,
    id: u64,
    tags: &'a Tags,
    latp_lon: Option<LatpLon>,
    node_ids: Option<&'a [NodeId]>,
    relation_ways: Option<(&'a [WayId], &'a [WayId])>,
    store: &'a OsmStore,
    layers: &'a LayerSet,
    outputs: Vec<OutputRecord>,
}

impl<'a> OsmElement<'a> {
    pub fn for_node(
        id: u64,
        tags: &'a Tags,
        latp_lon: LatpLon,
        store: &'a OsmStore,
        layers: &'a LayerSet,
    ) -> Self {
        OsmElement {
            kind: ElementKind::Node,
            id,
            tags,
            latp_lon: Some(latp_lon),
            node_ids: None,
            relation_ways: None,
            store,
            layers,
            outputs: Vec::new(),
        }
    }

    pub fn for_way(
        id: u64,
        tags: &'a Tags,
        node_ids: &'a [NodeId],
        store: &'a OsmStore,
        layers: &'a LayerSet,
    ) -> Self {
        OsmElement {
            kind: ElementKind::Way,
            id,
            tags,
            latp_lon: None,
            node_ids: Some(node_ids),
            relation_ways: None,
            store,
            layers,
            outputs: Vec::new(),
        }
    }

    pub fn for_relation(
        id: u64,
        tags: &'a Tags,
        outer_ways: &'a [WayId],
        inner_ways: &'a [WayId],
        store: &'a OsmStore,
        layers: &'a LayerSet,
    ) -> Self {
        OsmElement {
            kind: ElementKind::Relation,
            id,
            tags,
            latp_lon: None,
            node_ids: None,
            relation_ways: Some((outer_ways, inner_ways)),
            store,
            layers,
            outputs: Vec::new(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stored coordinate, for node elements.
    pub fn latp_lon(&self) -> Option<LatpLon> {
        self.latp_lon
    }

    pub fn holds(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Tag value, or the empty string when the tag is absent.
    pub fn find(&self, key: &str) -> &str {
        self.tags.get(key).map(String::as_str).unwrap_or("")
    }

    /// Emit this element into a layer. Nodes become points; ways become
    /// polygons or linestrings depending on `is_area`; relations always
    /// become polygons.
    pub fn layer(&mut self, layer_name: &str, is_area: bool) -> Result<(), Error> {
        let geom_type = match self.kind {
            ElementKind::Node => OutputGeomType::Point,
            ElementKind::Way => {
                if is_area {
                    OutputGeomType::Polygon
                } else {
                    OutputGeomType::Linestring
                }
            }
            ElementKind::Relation => OutputGeomType::Polygon,
        };
        self.push_output(layer_name, geom_type)
    }

    /// Emit the centroid of this element's polygon geometry.
    pub fn layer_as_centroid(&mut self, layer_name: &str) -> Result<(), Error> {
        self.push_output(layer_name, OutputGeomType::Centroid)
    }

    fn push_output(&mut self, layer_name: &str, geom_type: OutputGeomType) -> Result<(), Error> {
        let layer = self
            .layers
            .index_of(layer_name)
            .ok_or_else(|| Error::UnknownLayer(layer_name.to_string()))?;
        self.outputs
            .push(OutputRecord::new(layer, geom_type, self.id, Arc::new(AttrMap::new())));
        Ok(())
    }

    /// Attach an attribute to the most recently emitted record.
    pub fn attribute(&mut self, key: &str, value: AttrValue) {
        let Some(last) = self.outputs.last_mut() else {
            warn!("attribute {key:?} on element {} ignored: no layer emitted yet", self.id);
            return;
        };
        Arc::make_mut(&mut last.attributes).insert(key.to_string(), value);
    }

    pub fn is_closed(&self) -> bool {
        match self.kind {
            ElementKind::Node => false,
            ElementKind::Relation => true,
            ElementKind::Way => self
                .node_ids
                .map(|ids| ids.len() > 1 && ids.first() == ids.last())
                .unwrap_or(false),
        }
    }

    /// Area of the element's polygon geometry, in projected square degrees.
    pub fn area(&self) -> f64 {
        match self.multipolygon() {
            Some(mp) => geom::polygon_area(&mp),
            None => 0.0,
        }
    }

    /// Length of the element's line geometry, in projected degrees.
    pub fn length(&self) -> f64 {
        let Some(node_ids) = self.node_ids else {
            return 0.0;
        };
        match self.store.linestring_from_nodes(node_ids) {
            Ok(ls) => geom::line_length(&MultiLineString::new(vec![ls])),
            Err(_) => 0.0,
        }
    }

    fn multipolygon(&self) -> Option<MultiPolygon<f64>> {
        match self.kind {
            ElementKind::Node => None,
            ElementKind::Way => {
                let polygon = self.store.polygon_from_nodes(self.node_ids?).ok()?;
                Some(MultiPolygon::new(vec![polygon]))
            }
            ElementKind::Relation => {
                // each member way is treated as a ring of its own here;
                // full stitching happens at assembly time
                let (outers, inners) = self.relation_ways?;
                let mut polygons = Vec::new();
                for &way_id in outers {
                    if let Ok(nodes) = self.store.ways.get(way_id) {
                        if let Ok(polygon) = self.store.polygon_from_nodes(nodes) {
                            polygons.push(polygon);
                        }
                    }
                }
                let mut mp = MultiPolygon::new(polygons);
                for &way_id in inners {
                    if let Ok(nodes) = self.store.ways.get(way_id) {
                        if let Ok(hole) = self.store.polygon_from_nodes(nodes) {
                            let holes = MultiPolygon::new(vec![hole]);
                            mp = geom::difference_polygons(&mp, &holes);
                        }
                    }
                }
                Some(mp)
            }
        }
    }

    /// Records emitted so far, leaving the element empty.
    pub fn into_outputs(self) -> Vec<OutputRecord> {
        self.outputs
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }
}
