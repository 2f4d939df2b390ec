//! Counters reported at the end of a run.

use std::fmt;
use std::ops::AddAssign;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub num_nodes: usize,
    pub num_ways: usize,
    pub num_relations: usize,
    pub num_records: usize,
    pub num_tiles_written: usize,
    pub num_features_dropped: usize,
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.num_nodes += other.num_nodes;
        self.num_ways += other.num_ways;
        self.num_relations += other.num_relations;
        self.num_records += other.num_records;
        self.num_tiles_written += other.num_tiles_written;
        self.num_features_dropped += other.num_features_dropped;
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Nodes read:       {}", self.num_nodes)?;
        writeln!(f, "Ways read:        {}", self.num_ways)?;
        writeln!(f, "Relations read:   {}", self.num_relations)?;
        writeln!(f, "Records emitted:  {}", self.num_records)?;
        writeln!(f, "Tiles written:    {}", self.num_tiles_written)?;
        write!(f, "Features dropped: {}", self.num_features_dropped)
    }
}
