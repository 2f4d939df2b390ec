//! Thin capability layer over the `geo` crate.
//!
//! Everything the rest of the crate needs from a planar geometry library
//! goes through here, so the underlying implementation can change without
//! touching the pipeline.

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Centroid, Simplify, Validation, Within};
use geo_types::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon, Rect};

pub type Ring = LineString<f64>;

/// Force a ring closed.
pub fn close_ring(ring: &mut Ring) {
    ring.close();
}

/// Close all rings of a polygon and normalize winding.
pub fn correct_polygon(mut polygon: Polygon<f64>) -> Polygon<f64> {
    polygon.exterior_mut(|ring| ring.close());
    polygon.interiors_mut(|rings| {
        for ring in rings {
            ring.close();
        }
    });
    polygon.orient(Direction::Default)
}

pub fn correct_multipolygon(mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(mp.0.into_iter().map(correct_polygon).collect())
}

/// Validity of a single ring, viewed as a shell-only polygon.
pub fn ring_is_valid(ring: &Ring) -> bool {
    Polygon::new(ring.clone(), Vec::new()).is_valid()
}

pub fn multipolygon_is_valid(mp: &MultiPolygon<f64>) -> bool {
    mp.is_valid()
}

/// Whether ring `a` lies within ring `b`.
pub fn ring_within(a: &Ring, b: &Ring) -> bool {
    let a = Polygon::new(a.clone(), Vec::new());
    let b = Polygon::new(b.clone(), Vec::new());
    a.is_within(&b)
}

pub fn union_polygons(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    a.union(b)
}

pub fn difference_polygons(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    a.difference(b)
}

pub fn polygon_area(mp: &MultiPolygon<f64>) -> f64 {
    mp.unsigned_area()
}

pub fn centroid(mp: &MultiPolygon<f64>) -> Option<Point<f64>> {
    mp.centroid()
}

/// Sum of segment lengths in projected degrees.
pub fn line_length(lines: &MultiLineString<f64>) -> f64 {
    lines
        .iter()
        .flat_map(|ls| ls.0.windows(2))
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .sum()
}

pub fn simplify_polygons(mp: &MultiPolygon<f64>, epsilon: f64) -> MultiPolygon<f64> {
    mp.simplify(&epsilon)
}

pub fn simplify_lines(ml: &MultiLineString<f64>, epsilon: f64) -> MultiLineString<f64> {
    ml.simplify(&epsilon)
}

pub fn clip_polygons(mp: &MultiPolygon<f64>, bounds: &Rect<f64>) -> MultiPolygon<f64> {
    let clip = MultiPolygon::new(vec![bounds.to_polygon()]);
    mp.intersection(&clip)
}

pub fn clip_lines(ml: &MultiLineString<f64>, bounds: &Rect<f64>) -> MultiLineString<f64> {
    let clipped = bounds.to_polygon().clip(ml, false);
    // drop degenerate pieces the clipper may leave behind
    MultiLineString::new(clipped.0.into_iter().filter(|ls| ls.0.len() >= 2).collect())
}

pub fn point_in_rect(p: Coord<f64>, bounds: &Rect<f64>) -> bool {
    p.x >= bounds.min().x && p.x <= bounds.max().x && p.y >= bounds.min().y && p.y <= bounds.max().y
}
