//! Core of the mvtiler pipeline: OSM geometry stores, multipolygon
//! assembly, the three-pass ingestion driver, and the per-tile feature
//! emitter. The CLI in `mvtilerc` wires these together.

pub mod assembly;
pub mod config;
pub mod container;
pub mod coords;
pub mod element;
pub mod emitter;
pub mod geom;
pub mod output;
pub mod pbf;
pub mod pipeline;
pub mod processor;
pub mod source;
pub mod stats;
pub mod store;
pub mod tile_index;

pub use coords::{LatpLon, NodeId, WayId};
pub use pipeline::Pipeline;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("way {0} not found")]
    WayNotFound(WayId),
    #[error("relation {0} not found")]
    RelationNotFound(WayId),
    #[error("no layer named {0:?} in the configuration")]
    UnknownLayer(String),
    #[error("no cached geometry at index {0}")]
    CachedNotFound(u64),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("geometry operation failed for object {0}")]
    GeometryFailed(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Pbf(#[from] osmpbfreader::Error),
    #[error("vector tile encoding: {0}")]
    Tile(#[from] mvt::Error),
}
