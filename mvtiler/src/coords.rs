//! Coordinate and tile arithmetic.
//!
//! All stored coordinates are Mercator-projected latitude (`latp`, not raw
//! latitude) and raw longitude, both as 1e7 fixed-point integers. Tile IDs
//! pack `(x << 16) | y`, which is valid through zoom 15.

use std::f64::consts::PI;

use ahash::AHashSet;
use geo_types::Rect;

pub type NodeId = u64;
pub type WayId = u32;

pub const FIXED_SCALE: f64 = 1e7;

/// Projected latitude / longitude pair at 1e7 fixed-point scale.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatpLon {
    pub latp: i32,
    pub lon: i32,
}

impl LatpLon {
    /// Project raw WGS84 degrees into stored form.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        LatpLon {
            latp: (lat2latp(lat) * FIXED_SCALE) as i32,
            lon: (lon * FIXED_SCALE) as i32,
        }
    }

    pub fn latp_deg(&self) -> f64 {
        f64::from(self.latp) / FIXED_SCALE
    }

    pub fn lon_deg(&self) -> f64 {
        f64::from(self.lon) / FIXED_SCALE
    }
}

/// Squared Euclidean distance over the fixed-point integer plane.
pub fn sq_dist(a: LatpLon, b: LatpLon) -> i64 {
    let dl = i64::from(a.latp) - i64::from(b.latp);
    let dn = i64::from(a.lon) - i64::from(b.lon);
    dl * dl + dn * dn
}

pub fn lat2latp(lat: f64) -> f64 {
    (((lat.to_radians() / 2.0) + PI / 4.0).tan()).ln().to_degrees()
}

pub fn latp2lat(latp: f64) -> f64 {
    (2.0 * latp.to_radians().exp().atan() - PI / 2.0).to_degrees()
}

/// Convert a length in meters to projected degrees at the given latp.
pub fn meter2degp(meters: f64, latp: f64) -> f64 {
    meters / (111_319.9 * latp2lat(latp).to_radians().cos())
}

pub fn lon2tilex(lon: f64, zoom: u8) -> u32 {
    ((lon + 180.0) / 360.0 * f64::from(1u32 << zoom)) as u32
}

pub fn latp2tiley(latp: f64, zoom: u8) -> u32 {
    ((180.0 - latp) / 360.0 * f64::from(1u32 << zoom)) as u32
}

pub fn tilex2lon(x: u32, zoom: u8) -> f64 {
    f64::from(x) / f64::from(1u32 << zoom) * 360.0 - 180.0
}

pub fn tiley2latp(y: u32, zoom: u8) -> f64 {
    180.0 - f64::from(y) / f64::from(1u32 << zoom) * 360.0
}

pub fn pack_tile(x: u32, y: u32) -> u32 {
    (x << 16) | (y & 0xffff)
}

pub fn unpack_tile(id: u32) -> (u32, u32) {
    (id >> 16, id & 0xffff)
}

/// Tile at `zoom - delta` containing the given tile.
pub fn parent_tile(id: u32, delta: u8) -> u32 {
    let (x, y) = unpack_tile(id);
    pack_tile(x >> delta, y >> delta)
}

/// Base-zoom tile containing a stored coordinate.
pub fn tile_of(ll: LatpLon, zoom: u8) -> u32 {
    pack_tile(lon2tilex(ll.lon_deg(), zoom), latp2tiley(ll.latp_deg(), zoom))
}

/// Projected-degree bounding box of one tile.
#[derive(Debug, Clone, Copy)]
pub struct TileBbox {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_latp: f64,
    pub max_latp: f64,
}

impl TileBbox {
    pub fn new(id: u32, zoom: u8) -> Self {
        let (x, y) = unpack_tile(id);
        TileBbox {
            zoom,
            x,
            y,
            min_lon: tilex2lon(x, zoom),
            max_lon: tilex2lon(x + 1, zoom),
            min_latp: tiley2latp(y + 1, zoom),
            max_latp: tiley2latp(y, zoom),
        }
    }

    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            (self.min_lon, self.min_latp),
            (self.max_lon, self.max_latp),
        )
    }

    pub fn center_latp(&self) -> f64 {
        (self.min_latp + self.max_latp) / 2.0
    }
}

/// Add every tile the segment from `a` to `b` crosses at the given zoom.
///
/// Grid traversal over continuous tile coordinates; the endpoints' own
/// tiles are included, so callers inserting those separately just hit the
/// set twice.
pub fn insert_intermediate_tiles(tiles: &mut AHashSet<u32>, a: LatpLon, b: LatpLon, zoom: u8) {
    let scale = f64::from(1u32 << zoom);
    let ax = (a.lon_deg() + 180.0) / 360.0 * scale;
    let ay = (180.0 - a.latp_deg()) / 360.0 * scale;
    let bx = (b.lon_deg() + 180.0) / 360.0 * scale;
    let by = (180.0 - b.latp_deg()) / 360.0 * scale;

    let max_tile = (1i64 << zoom) - 1;
    let clamp = |v: i64| v.clamp(0, max_tile) as u32;

    let mut x = ax.floor() as i64;
    let mut y = ay.floor() as i64;
    let end_x = bx.floor() as i64;
    let end_y = by.floor() as i64;

    let dx = bx - ax;
    let dy = by - ay;
    let step_x: i64 = if dx >= 0.0 { 1 } else { -1 };
    let step_y: i64 = if dy >= 0.0 { 1 } else { -1 };

    // parametric distance to the next vertical/horizontal grid line
    let mut t_max_x = if dx == 0.0 {
        f64::INFINITY
    } else {
        let next = if dx > 0.0 { x as f64 + 1.0 } else { x as f64 };
        (next - ax) / dx
    };
    let mut t_max_y = if dy == 0.0 {
        f64::INFINITY
    } else {
        let next = if dy > 0.0 { y as f64 + 1.0 } else { y as f64 };
        (next - ay) / dy
    };
    let t_delta_x = if dx == 0.0 { f64::INFINITY } else { (1.0 / dx).abs() };
    let t_delta_y = if dy == 0.0 { f64::INFINITY } else { (1.0 / dy).abs() };

    tiles.insert(pack_tile(clamp(x), clamp(y)));
    let mut steps_left = (end_x - x).abs() + (end_y - y).abs();
    while (x != end_x || y != end_y) && steps_left > 0 {
        if t_max_x <= t_max_y {
            x += step_x;
            t_max_x += t_delta_x;
        } else {
            y += step_y;
            t_max_y += t_delta_y;
        }
        tiles.insert(pack_tile(clamp(x), clamp(y)));
        steps_left -= 1;
    }
}
