//! Per-tile feature building and serialization.
//!
//! For every requested zoom the base-zoom index is reused (at base zoom)
//! or remapped by integer halving, each bucket is sorted and deduplicated,
//! and features are built layer group by layer group: geometry
//! materialization, union-merging of adjacent same-attribute records,
//! simplification, clipping to the tile box, and MVT encoding.

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo_types::{MultiLineString, MultiPolygon};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use mvt::{Feature, GeomData, GeomEncoder, GeomType, Tile};

use crate::config::{Compression, LayerDef, LayerSet};
use crate::container::{compress_payload, TileSink};
use crate::coords::{self, TileBbox};
use crate::output::{AttrValue, CachedGeometry, FeatureGeometry, OutputGeomType, OutputRecord};
use crate::stats::Stats;
use crate::store::{OsmStore, SeqItem};
use crate::tile_index::{self, TileIndex};
use crate::{geom, Error};

const TILE_EXTENT: u32 = 4096;

pub struct Emitter<'a> {
    pub store: &'a OsmStore,
    pub cached: &'a [CachedGeometry],
    pub layers: &'a LayerSet,
    pub basezoom: u8,
    pub start_zoom: u8,
    pub end_zoom: u8,
    pub include_ids: bool,
    pub compression: Compression,
    /// `[min_lon, min_lat, max_lon, max_lat]`, raw latitudes.
    pub bounding_box: Option<[f64; 4]>,
    pub verbose: bool,
}

impl Emitter<'_> {
    /// Write every tile of every requested zoom into `sink`.
    pub fn write_tiles(
        &self,
        base_index: &mut TileIndex,
        sink: &mut dyn TileSink,
        stats: &mut Stats,
    ) -> Result<(), Error> {
        tile_index::sort_and_dedup(base_index);
        for zoom in self.start_zoom..=self.end_zoom {
            let derived;
            let index: &TileIndex = if zoom == self.basezoom {
                base_index
            } else {
                let mut remapped = tile_index::derive_zoom_index(base_index, self.basezoom, zoom);
                tile_index::sort_and_dedup(&mut remapped);
                derived = remapped;
                &derived
            };

            let progress = ProgressBar::new(index.len() as u64)
                .with_style(progress_style())
                .with_prefix(format!("Writing zoom {zoom}"));
            for (&tile_id, records) in index {
                progress.inc(1);
                let bbox = TileBbox::new(tile_id, zoom);
                if self.outside_bounding_box(&bbox) {
                    continue;
                }
                let data = self.build_tile(zoom, &bbox, records, stats)?;
                let payload = compress_payload(&data, self.compression)?;
                sink.put_tile(zoom, bbox.x, bbox.y, &payload)?;
                stats.num_tiles_written += 1;
            }
            progress.finish();
            debug!("zoom {zoom}: {} tiles", index.len());
        }
        Ok(())
    }

    fn outside_bounding_box(&self, bbox: &TileBbox) -> bool {
        let Some([min_lon, min_lat, max_lon, max_lat]) = self.bounding_box else {
            return false;
        };
        max_lon <= bbox.min_lon
            || min_lon >= bbox.max_lon
            || coords::lat2latp(max_lat) <= bbox.min_latp
            || coords::lat2latp(min_lat) >= bbox.max_latp
    }

    fn build_tile(
        &self,
        zoom: u8,
        bbox: &TileBbox,
        records: &[OutputRecord],
        stats: &mut Stats,
    ) -> Result<Vec<u8>, Error> {
        let mut tile = Tile::new(TILE_EXTENT);
        for group in self.layers.groups() {
            let mut layer = tile.create_layer(&self.layers.def(group[0]).name);
            let mut features = 0usize;

            for &layer_index in group {
                let def = self.layers.def(layer_index);
                if zoom < def.minzoom || zoom > def.maxzoom {
                    continue;
                }
                let simplify_level = simplify_level(def, zoom, bbox);

                let lo = records.partition_point(|r| r.layer < layer_index);
                let hi = records.partition_point(|r| r.layer <= layer_index);
                let slice = &records[lo..hi];

                let mut i = 0;
                while i < slice.len() {
                    let record = &slice[i];
                    let built = catch_unwind(AssertUnwindSafe(|| {
                        self.build_feature(slice, &mut i, simplify_level, bbox)
                    }))
                    .unwrap_or(Err(Error::GeometryFailed(record.osm_id)));
                    match built {
                        Ok(Some(data)) => {
                            let mut feature = layer.into_feature(data);
                            if self.include_ids {
                                feature.set_id(record.osm_id);
                            }
                            for (key, value) in record.attributes.iter() {
                                write_tag(&mut feature, key, value);
                            }
                            layer = feature.into_layer();
                            features += 1;
                        }
                        Ok(None) => {} // clipped away entirely
                        Err(err) => {
                            stats.num_features_dropped += 1;
                            warn!("dropping object {} of type {:?}: {err}", record.osm_id, record.geom_type);
                            if self.verbose {
                                self.dump_missing_ways(record);
                            }
                        }
                    }
                    i += 1;
                }
            }

            if features > 0 {
                tile.add_layer(layer)?;
            }
        }
        Ok(tile.to_bytes()?)
    }

    /// Build the geometry starting at `slice[*i]`, consuming any following
    /// records that union-merge into it, and encode it against the tile.
    /// Returns `None` when clipping leaves nothing.
    fn build_feature(
        &self,
        slice: &[OutputRecord],
        i: &mut usize,
        simplify_level: f64,
        bbox: &TileBbox,
    ) -> Result<Option<GeomData>, Error> {
        let record = &slice[*i];
        let geometry = self.coalesce_geometry(slice, i)?;
        match geometry {
            FeatureGeometry::Point(point) => {
                if !geom::point_in_rect(point.0, &bbox.rect()) {
                    return Ok(None);
                }
                let (x, y) = tile_coords(point.0.x, point.0.y, bbox);
                let data = GeomEncoder::<f64>::new(GeomType::Point).point(x, y)?.encode()?;
                Ok(Some(data))
            }
            FeatureGeometry::Lines(lines) => {
                let lines = if simplify_level > 0.0 {
                    geom::simplify_lines(&lines, simplify_level)
                } else {
                    lines
                };
                let clipped = geom::clip_lines(&lines, &bbox.rect());
                if clipped.0.is_empty() {
                    return Ok(None);
                }
                Ok(Some(encode_lines(&clipped, bbox)?))
            }
            FeatureGeometry::Polygons(polygons) => {
                let polygons = if simplify_level > 0.0 {
                    geom::simplify_polygons(&polygons, simplify_level)
                } else {
                    polygons
                };
                let clipped = geom::clip_polygons(&polygons, &bbox.rect());
                if clipped.0.is_empty() {
                    return Ok(None);
                }
                Ok(Some(encode_polygons(&clipped, bbox)?))
            }
        }
    }

    /// Materialize `slice[*i]` and union-merge the run of following records
    /// with the same geometry type and identical attributes. Applies to the
    /// polygon and linestring families only.
    fn coalesce_geometry(
        &self,
        slice: &[OutputRecord],
        i: &mut usize,
    ) -> Result<FeatureGeometry, Error> {
        let record = &slice[*i];
        let mut geometry = record.build_geometry(self.store, self.cached)?;
        let mergeable = matches!(
            record.geom_type,
            OutputGeomType::Polygon
                | OutputGeomType::CachedPolygon
                | OutputGeomType::Linestring
                | OutputGeomType::CachedLinestring
        );
        if !mergeable {
            return Ok(geometry);
        }
        while *i + 1 < slice.len()
            && slice[*i + 1].geom_type == record.geom_type
            && slice[*i + 1].attributes == record.attributes
        {
            *i += 1;
            let next = slice[*i].build_geometry(self.store, self.cached)?;
            geometry = match (geometry, next) {
                (FeatureGeometry::Polygons(a), FeatureGeometry::Polygons(b)) => {
                    FeatureGeometry::Polygons(geom::union_polygons(&a, &b))
                }
                (FeatureGeometry::Lines(mut a), FeatureGeometry::Lines(b)) => {
                    a.0.extend(b.0);
                    FeatureGeometry::Lines(a)
                }
                (a, _) => a,
            };
        }
        Ok(geometry)
    }

    fn dump_missing_ways(&self, record: &OutputRecord) {
        let Ok(rel_id) = u32::try_from(record.osm_id) else {
            return;
        };
        let Ok(sequence) = self.store.relations.get(rel_id) else {
            return;
        };
        for item in sequence {
            if let SeqItem::Way(way_id) = item {
                if !self.store.ways.contains(*way_id) {
                    warn!("  object {} misses constituent way {way_id}", record.osm_id);
                }
            }
        }
    }
}

/// Simplification tolerance for one layer at one zoom, in projected
/// degrees. Zero means no simplification.
fn simplify_level(def: &LayerDef, zoom: u8, bbox: &TileBbox) -> f64 {
    if zoom >= def.simplify_below {
        return 0.0;
    }
    let mut level = if def.simplify_length > 0.0 {
        coords::meter2degp(def.simplify_length, bbox.center_latp())
    } else {
        def.simplify_level
    };
    level *= def
        .simplify_ratio
        .powi(i32::from(def.simplify_below - 1) - i32::from(zoom));
    level
}

/// Projected degrees -> tile-local coordinates (y grows downward).
fn tile_coords(lon: f64, latp: f64, bbox: &TileBbox) -> (f64, f64) {
    let extent = f64::from(TILE_EXTENT);
    let x = (lon - bbox.min_lon) / (bbox.max_lon - bbox.min_lon) * extent;
    let y = (bbox.max_latp - latp) / (bbox.max_latp - bbox.min_latp) * extent;
    (x, y)
}

fn encode_lines(lines: &MultiLineString<f64>, bbox: &TileBbox) -> Result<GeomData, Error> {
    let mut encoder = GeomEncoder::<f64>::new(GeomType::Linestring);
    for (index, line) in lines.0.iter().enumerate() {
        for coord in &line.0 {
            let (x, y) = tile_coords(coord.x, coord.y, bbox);
            encoder.add_point(x, y)?;
        }
        if index + 1 < lines.0.len() {
            encoder.complete_geom()?;
        }
    }
    Ok(encoder.encode()?)
}

fn encode_polygons(polygons: &MultiPolygon<f64>, bbox: &TileBbox) -> Result<GeomData, Error> {
    let mut encoder = GeomEncoder::<f64>::new(GeomType::Polygon);
    let total = polygons.0.len();
    for (poly_index, polygon) in polygons.0.iter().enumerate() {
        let mut rings = Vec::with_capacity(1 + polygon.interiors().len());
        rings.push(polygon.exterior());
        rings.extend(polygon.interiors().iter());
        for (ring_index, ring) in rings.iter().enumerate() {
            for coord in ring_coords(ring) {
                let (x, y) = tile_coords(coord.x, coord.y, bbox);
                encoder.add_point(x, y)?;
            }
            if ring_index + 1 < rings.len() || poly_index + 1 < total {
                encoder.complete_geom()?;
            }
        }
    }
    Ok(encoder.encode()?)
}

/// Ring coordinates without the redundant closing point; MVT closes rings
/// implicitly.
fn ring_coords(ring: &geo_types::LineString<f64>) -> &[geo_types::Coord<f64>] {
    let coords = ring.0.as_slice();
    if coords.len() > 1 && coords.first() == coords.last() {
        &coords[..coords.len() - 1]
    } else {
        coords
    }
}

fn write_tag(feature: &mut Feature, key: &str, value: &AttrValue) {
    match value {
        AttrValue::Str(text) => feature.add_tag_string(key, text),
        AttrValue::Double(number) => feature.add_tag_double(key, *number),
        AttrValue::Bool(flag) => feature.add_tag_bool(key, *flag),
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>16} [{bar:23}] {pos}/{len}: {per_sec} {elapsed}")
        .unwrap()
        .progress_chars("=> ")
}
