//! `OsmSource` backed by an `.osm.pbf` file via the `osmpbfreader` crate.
//!
//! Every scan rewinds to the start of the file and skips the element kinds
//! it is not interested in, which is what gives the driver its repeated
//! passes over one sequentially-read file.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use osmpbfreader::{OsmId, OsmObj, OsmPbfReader};

use crate::element::Tags;
use crate::source::{OsmSource, RawNode, RawRelation, RawWay};
use crate::Error;

pub struct PbfSource<R: Read + Seek> {
    reader: OsmPbfReader<R>,
}

impl PbfSource<File> {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(PbfSource {
            reader: OsmPbfReader::new(file),
        })
    }
}

impl<R: Read + Seek> PbfSource<R> {
    pub fn new(reader: R) -> Self {
        PbfSource {
            reader: OsmPbfReader::new(reader),
        }
    }
}

fn convert_tags(tags: &osmpbfreader::Tags) -> Tags {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl<R: Read + Seek> OsmSource for PbfSource<R> {
    fn scan_nodes(
        &mut self,
        visit: &mut dyn FnMut(RawNode) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.reader.rewind()?;
        for obj in self.reader.iter() {
            if let OsmObj::Node(node) = obj? {
                visit(RawNode {
                    id: node.id.0 as u64,
                    lat: node.lat(),
                    lon: node.lon(),
                    tags: convert_tags(&node.tags),
                })?;
            }
        }
        Ok(())
    }

    fn scan_ways(
        &mut self,
        visit: &mut dyn FnMut(RawWay) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.reader.rewind()?;
        for obj in self.reader.iter() {
            if let OsmObj::Way(way) = obj? {
                visit(RawWay {
                    id: way.id.0 as u64,
                    node_ids: way.nodes.iter().map(|n| n.0 as u64).collect(),
                    tags: convert_tags(&way.tags),
                })?;
            }
        }
        Ok(())
    }

    fn scan_relations(
        &mut self,
        visit: &mut dyn FnMut(RawRelation) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.reader.rewind()?;
        for obj in self.reader.iter() {
            if let OsmObj::Relation(relation) = obj? {
                let way_members = relation
                    .refs
                    .iter()
                    .filter_map(|member| match member.member {
                        OsmId::Way(way_id) => Some((member.role.to_string(), way_id.0 as u64)),
                        _ => None,
                    })
                    .collect();
                visit(RawRelation {
                    id: relation.id.0 as u64,
                    way_members,
                    tags: convert_tags(&relation.tags),
                })?;
            }
        }
        Ok(())
    }
}
