//! Contract for decoded OSM input.
//!
//! Block decoding (varints, string tables, delta-coded dense nodes) is an
//! external concern; the driver only needs repeatable scans over decoded
//! elements. Each `scan_*` call starts from the beginning of the input, so
//! the driver's multiple passes are plain repeated calls.

use crate::coords::NodeId;
use crate::element::Tags;
use crate::Error;

#[derive(Debug, Clone)]
pub struct RawNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
}

#[derive(Debug, Clone)]
pub struct RawWay {
    pub id: u64,
    pub node_ids: Vec<NodeId>,
    pub tags: Tags,
}

/// A relation's way members with their role strings; non-way members are
/// not part of the contract.
#[derive(Debug, Clone)]
pub struct RawRelation {
    pub id: u64,
    pub way_members: Vec<(String, u64)>,
    pub tags: Tags,
}

pub trait OsmSource {
    fn scan_nodes(
        &mut self,
        visit: &mut dyn FnMut(RawNode) -> Result<(), Error>,
    ) -> Result<(), Error>;

    fn scan_ways(
        &mut self,
        visit: &mut dyn FnMut(RawWay) -> Result<(), Error>,
    ) -> Result<(), Error>;

    fn scan_relations(
        &mut self,
        visit: &mut dyn FnMut(RawRelation) -> Result<(), Error>,
    ) -> Result<(), Error>;
}

/// In-memory source, mainly for tests and programmatic input.
#[derive(Debug, Default, Clone)]
pub struct MemSource {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
    pub relations: Vec<RawRelation>,
}

impl MemSource {
    pub fn add_node(&mut self, id: NodeId, lat: f64, lon: f64, tags: Tags) {
        self.nodes.push(RawNode { id, lat, lon, tags });
    }

    pub fn add_way(&mut self, id: u64, node_ids: Vec<NodeId>, tags: Tags) {
        self.ways.push(RawWay { id, node_ids, tags });
    }

    pub fn add_relation(&mut self, id: u64, way_members: Vec<(String, u64)>, tags: Tags) {
        self.relations.push(RawRelation {
            id,
            way_members,
            tags,
        });
    }
}

impl OsmSource for MemSource {
    fn scan_nodes(
        &mut self,
        visit: &mut dyn FnMut(RawNode) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for node in &self.nodes {
            visit(node.clone())?;
        }
        Ok(())
    }

    fn scan_ways(
        &mut self,
        visit: &mut dyn FnMut(RawWay) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for way in &self.ways {
            visit(way.clone())?;
        }
        Ok(())
    }

    fn scan_relations(
        &mut self,
        visit: &mut dyn FnMut(RawRelation) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for relation in &self.relations {
            visit(relation.clone())?;
        }
        Ok(())
    }
}
