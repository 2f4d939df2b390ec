//! End-to-end scenarios: ingest an in-memory extract, write tiles into an
//! in-memory sink, and check which tiles come out.

use std::collections::BTreeMap;

use mvtiler::config::{Compression, LayerSet};
use mvtiler::container::TileSink;
use mvtiler::coords::{pack_tile, unpack_tile};
use mvtiler::element::{OsmElement, Tags};
use mvtiler::emitter::Emitter;
use mvtiler::pipeline::Pipeline;
use mvtiler::processor::TagProcessor;
use mvtiler::source::MemSource;
use mvtiler::stats::Stats;
use mvtiler::Error;

#[derive(Default)]
struct MemSink {
    tiles: BTreeMap<(u8, u32, u32), Vec<u8>>,
    metadata: BTreeMap<String, String>,
}

impl TileSink for MemSink {
    fn put_tile(&mut self, zoom: u8, x: u32, y: u32, data: &[u8]) -> Result<(), Error> {
        self.tiles.insert((zoom, x, y), data.to_vec());
        Ok(())
    }

    fn put_metadata(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.metadata.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

struct TestProcessor;

impl TagProcessor for TestProcessor {
    fn node_keys(&self) -> Vec<String> {
        vec!["place".to_string()]
    }

    fn node(&mut self, element: &mut OsmElement<'_>) -> Result<(), Error> {
        if element.holds("place") {
            element.layer("poi", false)?;
        }
        Ok(())
    }

    fn way(&mut self, element: &mut OsmElement<'_>) -> Result<(), Error> {
        if element.holds("building") {
            element.layer("building", true)?;
        }
        if element.holds("highway") {
            element.layer("roads", false)?;
        }
        Ok(())
    }
}

fn layer_set() -> LayerSet {
    let mut set = LayerSet::default();
    set.add_layer("building".into(), 0, 14, 0, 0.01, 0.0, 1.0, None);
    set.add_layer("roads".into(), 0, 14, 0, 0.01, 0.0, 1.0, None);
    set.add_layer("poi".into(), 0, 14, 0, 0.01, 0.0, 1.0, None);
    set
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_zooms(
    pipeline: &mut Pipeline<'_, TestProcessor>,
    layers: &LayerSet,
    start_zoom: u8,
    end_zoom: u8,
) -> MemSink {
    let mut base_index = std::mem::take(&mut pipeline.tile_index);
    let mut stats = Stats::default();
    let mut sink = MemSink::default();
    let emitter = Emitter {
        store: &pipeline.store,
        cached: pipeline.cached_geometries(),
        layers,
        basezoom: 14,
        start_zoom,
        end_zoom,
        include_ids: false,
        compression: Compression::None,
        bounding_box: None,
        verbose: false,
    };
    emitter
        .write_tiles(&mut base_index, &mut sink, &mut stats)
        .unwrap();
    sink
}

/// A single closed way produces exactly one tile at the base zoom.
#[test]
fn single_closed_way_fills_one_tile() {
    let layers = layer_set();
    let mut pipeline = Pipeline::new(&layers, 14, TestProcessor);
    pipeline.init().unwrap();

    let mut source = MemSource::default();
    source.add_node(1, 0.0010, 0.0010, Tags::default());
    source.add_node(2, 0.0010, 0.0020, Tags::default());
    source.add_node(3, 0.0020, 0.0020, Tags::default());
    source.add_node(4, 0.0020, 0.0010, Tags::default());
    source.add_way(100, vec![1, 2, 3, 4, 1], tags(&[("building", "yes")]));
    pipeline.ingest(&mut source).unwrap();

    let sink = write_zooms(&mut pipeline, &layers, 14, 14);
    assert_eq!(sink.tiles.len(), 1);
    let (&(zoom, x, y), data) = sink.tiles.iter().next().unwrap();
    assert_eq!((zoom, x, y), (14, 8192, 8191));
    assert!(!data.is_empty());
}

/// A linestring across three horizontally adjacent base-zoom tiles shows
/// up in all three, and in fewer buckets one zoom up.
#[test]
fn cross_tile_linestring() {
    let layers = layer_set();
    let mut pipeline = Pipeline::new(&layers, 14, TestProcessor);
    pipeline.init().unwrap();

    let mut source = MemSource::default();
    source.add_node(1, 0.0010, 0.0010, Tags::default());
    source.add_node(2, 0.0010, 0.0500, Tags::default());
    source.add_way(300, vec![1, 2], tags(&[("highway", "primary")]));
    pipeline.ingest(&mut source).unwrap();

    let sink = write_zooms(&mut pipeline, &layers, 13, 14);
    let z14: Vec<u32> = sink
        .tiles
        .keys()
        .filter(|(z, _, _)| *z == 14)
        .map(|&(_, x, _)| x)
        .collect();
    assert_eq!(z14, vec![8192, 8193, 8194]);

    let z13: Vec<u32> = sink
        .tiles
        .keys()
        .filter(|(z, _, _)| *z == 13)
        .map(|&(_, x, _)| x)
        .collect();
    // 8192 and 8193 share parent 4096; 8194 maps to 4097
    assert_eq!(z13, vec![4096, 4097]);
}

/// A tagged node lands in the tile containing its coordinate.
#[test]
fn tagged_node_feature() {
    let layers = layer_set();
    let mut pipeline = Pipeline::new(&layers, 14, TestProcessor);
    pipeline.init().unwrap();

    let mut source = MemSource::default();
    source.add_node(7, 0.0010, 0.0010, tags(&[("place", "town"), ("name", "X")]));
    pipeline.ingest(&mut source).unwrap();

    let sink = write_zooms(&mut pipeline, &layers, 14, 14);
    assert_eq!(sink.tiles.len(), 1);
    assert!(sink.tiles.contains_key(&(14, 8192, 8191)));
}

/// Multipolygon relation: the member ways carry the relation's record into
/// every tile they touch.
#[test]
fn multipolygon_relation_tiles() {
    let layers = layer_set();
    let mut pipeline = Pipeline::new(&layers, 14, TestProcessor);
    pipeline.init().unwrap();

    let mut source = MemSource::default();
    // outer square with a hole, all inside one base-zoom tile
    source.add_node(1, 0.00100, 0.00100, Tags::default());
    source.add_node(2, 0.00100, 0.00200, Tags::default());
    source.add_node(3, 0.00200, 0.00200, Tags::default());
    source.add_node(4, 0.00200, 0.00100, Tags::default());
    source.add_node(5, 0.00130, 0.00130, Tags::default());
    source.add_node(6, 0.00130, 0.00170, Tags::default());
    source.add_node(7, 0.00170, 0.00150, Tags::default());
    source.add_way(10, vec![1, 2, 3, 4, 1], Tags::default());
    source.add_way(20, vec![5, 6, 7, 5], Tags::default());
    source.add_relation(
        500,
        vec![("outer".to_string(), 10), ("inner".to_string(), 20)],
        tags(&[("type", "multipolygon"), ("building", "yes")]),
    );
    pipeline.ingest(&mut source).unwrap();

    let sink = write_zooms(&mut pipeline, &layers, 14, 14);
    assert_eq!(sink.tiles.len(), 1);
    assert!(sink.tiles.contains_key(&(14, 8192, 8191)));
}

/// Parent derivation halves tile coordinates all the way up.
#[test]
fn parent_derivation_matches_shift() {
    let tile = pack_tile(8194, 8191);
    let (x, y) = unpack_tile(tile);
    assert_eq!((x >> 1, y >> 1), (4097, 4095));
}
