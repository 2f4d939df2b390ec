//! The ingestion driver: three logical passes over each input file.
//!
//! Pass order per file:
//! 1. nodes: store every coordinate, run the processor on tagged nodes;
//! 2. relations and the ways they reference: load referenced ways, run
//!    the processor on multipolygon relations, assemble and store their
//!    encoded sequences, then drop the way store;
//! 3. all ways: run the processor, re-store ways that emitted output or
//!    participate in a relation, and assign their records (plus any
//!    relation records riding on them) to base-zoom tiles.

use ahash::{AHashMap, AHashSet};
use log::{debug, warn};

use crate::assembly::assemble_multipolygon;
use crate::config::LayerSet;
use crate::coords::{self, LatpLon, WayId};
use crate::element::OsmElement;
use crate::output::{CachedGeometry, OutputRecord};
use crate::processor::TagProcessor;
use crate::source::OsmSource;
use crate::stats::Stats;
use crate::store::OsmStore;
use crate::tile_index::TileIndex;
use crate::Error;

pub struct Pipeline<'a, P: TagProcessor> {
    pub store: OsmStore,
    pub tile_index: TileIndex,
    pub stats: Stats,
    processor: P,
    layers: &'a LayerSet,
    basezoom: u8,
    node_keys: AHashSet<String>,
    way_to_relations: AHashMap<WayId, Vec<WayId>>,
    relation_outputs: AHashMap<WayId, Vec<OutputRecord>>,
    cached_geometries: Vec<CachedGeometry>,
}

impl<'a, P: TagProcessor> Pipeline<'a, P> {
    pub fn new(layers: &'a LayerSet, basezoom: u8, processor: P) -> Self {
        Pipeline {
            store: OsmStore::default(),
            tile_index: TileIndex::new(),
            stats: Stats::default(),
            processor,
            layers,
            basezoom,
            node_keys: AHashSet::new(),
            way_to_relations: AHashMap::new(),
            relation_outputs: AHashMap::new(),
            cached_geometries: Vec::new(),
        }
    }

    /// Run the processor's `init` hook and capture its node-key filter.
    pub fn init(&mut self) -> Result<(), Error> {
        self.processor.init()?;
        self.node_keys = self.processor.node_keys().into_iter().collect();
        Ok(())
    }

    /// Run the processor's `exit` hook.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.processor.exit()
    }

    /// Register a pre-built geometry and return the id `Cached*` records
    /// should carry.
    pub fn add_cached_geometry(&mut self, geometry: CachedGeometry) -> u64 {
        self.cached_geometries.push(geometry);
        (self.cached_geometries.len() - 1) as u64
    }

    pub fn cached_geometries(&self) -> &[CachedGeometry] {
        &self.cached_geometries
    }

    /// Ingest one input file: the three passes described above.
    pub fn ingest<S: OsmSource>(&mut self, source: &mut S) -> Result<(), Error> {
        self.read_nodes(source)?;
        self.read_relations(source)?;
        self.read_ways(source)?;
        Ok(())
    }

    fn read_nodes<S: OsmSource>(&mut self, source: &mut S) -> Result<(), Error> {
        let mut stats = Stats::default();
        source.scan_nodes(&mut |node| {
            let ll = LatpLon::from_degrees(node.lat, node.lon);
            self.store.nodes.insert(node.id, ll);
            stats.num_nodes += 1;

            let significant = node.tags.keys().any(|k| self.node_keys.contains(k));
            if significant {
                let mut element =
                    OsmElement::for_node(node.id, &node.tags, ll, &self.store, self.layers);
                self.processor.node(&mut element)?;
                let outputs = element.into_outputs();
                if !outputs.is_empty() {
                    stats.num_records += outputs.len();
                    let tile = coords::tile_of(ll, self.basezoom);
                    self.tile_index.entry(tile).or_default().extend(outputs);
                }
            }
            Ok(())
        })?;
        self.stats += stats;
        debug!("node pass done ({} nodes stored)", self.store.nodes.len());
        Ok(())
    }

    fn read_relations<S: OsmSource>(&mut self, source: &mut S) -> Result<(), Error> {
        // which ways do relations reference at all?
        let mut ways_in_relation: AHashSet<u64> = AHashSet::new();
        source.scan_relations(&mut |relation| {
            for (_, way_id) in &relation.way_members {
                ways_in_relation.insert(*way_id);
            }
            Ok(())
        })?;

        // load the node lists of exactly those ways
        source.scan_ways(&mut |way| {
            if ways_in_relation.contains(&way.id) {
                if let Some(way_id) = checked_way_id(way.id) {
                    self.store.ways.insert(way_id, way.node_ids);
                }
            }
            Ok(())
        })?;
        drop(ways_in_relation);
        debug!("{} relation-referenced ways loaded", self.store.ways.len());

        // process multipolygon relations
        let mut stats = Stats::default();
        source.scan_relations(&mut |relation| {
            stats.num_relations += 1;
            if relation.tags.get("type").map(String::as_str) != Some("multipolygon") {
                return Ok(());
            }
            let Some(rel_id) = checked_way_id(relation.id) else {
                warn!("relation {} id does not fit the way-id space; skipped", relation.id);
                return Ok(());
            };

            let mut outer_ways: Vec<WayId> = Vec::new();
            let mut inner_ways: Vec<WayId> = Vec::new();
            for (role, way_id) in &relation.way_members {
                let Some(way_id) = checked_way_id(*way_id) else {
                    warn!("way {way_id} id does not fit the way-id space; skipped");
                    continue;
                };
                if role == "inner" {
                    inner_ways.push(way_id);
                } else {
                    outer_ways.push(way_id);
                }
            }

            let mut element = OsmElement::for_relation(
                relation.id,
                &relation.tags,
                &outer_ways,
                &inner_ways,
                &self.store,
                self.layers,
            );
            self.processor.way(&mut element)?;
            let outputs = element.into_outputs();
            if outputs.is_empty() {
                return Ok(());
            }
            stats.num_records += outputs.len();

            let sequence = assemble_multipolygon(&self.store, &outer_ways, &inner_ways);
            self.store.relations.insert(rel_id, sequence);
            for way_id in outer_ways.iter().chain(inner_ways.iter()) {
                self.way_to_relations.entry(*way_id).or_default().push(rel_id);
            }
            self.relation_outputs.insert(rel_id, outputs);
            Ok(())
        })?;
        self.stats += stats;

        // node lists were only needed to encode the relations
        self.store.ways.clear();
        Ok(())
    }

    fn read_ways<S: OsmSource>(&mut self, source: &mut S) -> Result<(), Error> {
        let mut stats = Stats::default();
        source.scan_ways(&mut |way| {
            stats.num_ways += 1;
            let mut element =
                OsmElement::for_way(way.id, &way.tags, &way.node_ids, &self.store, self.layers);
            self.processor.way(&mut element)?;
            let outputs = element.into_outputs();

            let checked_id = checked_way_id(way.id);
            let in_relation = checked_id
                .map(|id| self.way_to_relations.contains_key(&id))
                .unwrap_or(false);
            if outputs.is_empty() && !in_relation {
                return Ok(());
            }
            let Some(way_id) = checked_id else {
                warn!("way {} id does not fit the way-id space; its output is dropped", way.id);
                return Ok(());
            };
            stats.num_records += outputs.len();

            // the way is needed again when tiles are written
            self.store.ways.insert(way_id, way.node_ids.clone());

            let tiles = self.way_tiles(&way.node_ids);
            for &tile in &tiles {
                let bucket = self.tile_index.entry(tile).or_default();
                bucket.extend(outputs.iter().cloned());
            }
            if in_relation {
                for rel_id in &self.way_to_relations[&way_id] {
                    if let Some(rel_outputs) = self.relation_outputs.get(rel_id) {
                        for &tile in &tiles {
                            let bucket = self.tile_index.entry(tile).or_default();
                            bucket.extend(rel_outputs.iter().cloned());
                        }
                    }
                }
            }
            Ok(())
        })?;
        self.stats += stats;
        Ok(())
    }

    /// Base-zoom tiles the way's polyline passes through.
    fn way_tiles(&self, node_ids: &[u64]) -> AHashSet<u32> {
        let mut tiles = AHashSet::new();
        let mut last: Option<(u32, u32, LatpLon)> = None;
        for &node_id in node_ids {
            let ll = match self.store.nodes.get(node_id) {
                Ok(ll) => ll,
                Err(_) => {
                    warn!("way references unknown node {node_id}; skipped for tile assignment");
                    continue;
                }
            };
            let tile_x = coords::lon2tilex(ll.lon_deg(), self.basezoom);
            let tile_y = coords::latp2tiley(ll.latp_deg(), self.basezoom);
            if let Some((last_x, last_y, last_ll)) = last {
                let dx = tile_x.abs_diff(last_x);
                let dy = tile_y.abs_diff(last_y);
                if dx > 1 || dy > 1 || (dx == 1 && dy == 1) {
                    coords::insert_intermediate_tiles(&mut tiles, last_ll, ll, self.basezoom);
                }
            }
            tiles.insert(coords::pack_tile(tile_x, tile_y));
            last = Some((tile_x, tile_y, ll));
        }
        tiles
    }
}

fn checked_way_id(id: u64) -> Option<WayId> {
    WayId::try_from(id).ok()
}
