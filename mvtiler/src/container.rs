//! Tile containers: a `zoom/x/y.pbf` directory tree or an mbtiles-style
//! SQLite database.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use flate2::write::{GzEncoder, ZlibEncoder};
use rusqlite::{params, Connection};

use crate::config::Compression;
use crate::Error;

pub trait TileSink {
    fn put_tile(&mut self, zoom: u8, x: u32, y: u32, data: &[u8]) -> Result<(), Error>;

    /// Record a metadata key/value pair. Sinks without a metadata notion
    /// may ignore this.
    fn put_metadata(&mut self, name: &str, value: &str) -> Result<(), Error>;
}

pub fn compress_payload(data: &[u8], compression: Compression) -> Result<Vec<u8>, Error> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        Compression::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Writes tiles as `root/zoom/x/y.pbf`.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: PathBuf) -> Result<Self, Error> {
        fs::create_dir_all(&root)?;
        Ok(DirectorySink { root })
    }
}

impl TileSink for DirectorySink {
    fn put_tile(&mut self, zoom: u8, x: u32, y: u32, data: &[u8]) -> Result<(), Error> {
        let dir = self.root.join(zoom.to_string()).join(x.to_string());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(format!("{y}.pbf")), data)?;
        Ok(())
    }

    fn put_metadata(&mut self, _name: &str, _value: &str) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes tiles into an mbtiles SQLite database.
pub struct MbtilesSink {
    connection: Connection,
}

impl MbtilesSink {
    pub fn open(path: &std::path::Path) -> Result<Self, Error> {
        let connection = Connection::open(path)?;
        connection.execute_batch(
            "PRAGMA synchronous = OFF;
             CREATE TABLE IF NOT EXISTS metadata (name TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE IF NOT EXISTS tiles (
                 zoom_level INTEGER,
                 tile_column INTEGER,
                 tile_row INTEGER,
                 tile_data BLOB,
                 PRIMARY KEY (zoom_level, tile_column, tile_row)
             );",
        )?;
        Ok(MbtilesSink { connection })
    }
}

impl TileSink for MbtilesSink {
    fn put_tile(&mut self, zoom: u8, x: u32, y: u32, data: &[u8]) -> Result<(), Error> {
        // mbtiles counts rows from the south edge
        let tms_y = (1u32 << zoom) - 1 - y;
        self.connection.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![zoom, x, tms_y, data],
        )?;
        Ok(())
    }

    fn put_metadata(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.connection.execute(
            "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        Ok(())
    }
}
