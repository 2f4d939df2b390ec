use std::path::PathBuf;

use clap::Parser;

/// Convert OpenStreetMap .pbf extracts into vector tiles.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Source .osm.pbf file(s), read in order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Target directory, or .mbtiles/.sqlite file
    #[arg(long)]
    pub output: PathBuf,

    /// Config JSON file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Tag-processing rules file
    #[arg(long, default_value = "process.json")]
    pub process: PathBuf,

    /// Verbose error output
    #[arg(long)]
    pub verbose: bool,
}
