//! Declarative tag-processing rules: the CLI's implementation of the
//! library's `TagProcessor` contract.
//!
//! The `--process` file is a JSON document listing rules. Each rule matches
//! a tag key (optionally a specific value), names the target layer and
//! geometry kind, and lists tag keys to copy into the feature's
//! attributes:
//!
//! ```json
//! {
//!   "node_keys": ["place"],
//!   "rules": [
//!     { "key": "building", "layer": "building", "kind": "area" },
//!     { "key": "highway", "layer": "roads", "kind": "line",
//!       "attributes": ["highway", "name"] }
//!   ]
//! }
//! ```

use std::fs::File;
use std::path::Path;

use mvtiler::element::{ElementKind, OsmElement};
use mvtiler::output::AttrValue;
use mvtiler::processor::TagProcessor;
use mvtiler::Error;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Point,
    Line,
    Area,
    Centroid,
    /// Area when the way is closed, line otherwise.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    pub layer: String,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub node_keys: Vec<String>,
    pub rules: Vec<Rule>,
}

#[derive(Debug)]
pub struct RuleProcessor {
    file: RuleFile,
}

impl RuleProcessor {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("cannot open {}: {e}", path.display())))?;
        let file: RuleFile = serde_json::from_reader(file)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        Ok(RuleProcessor { file })
    }

    pub fn from_rules(file: RuleFile) -> Self {
        RuleProcessor { file }
    }

    fn apply(&self, element: &mut OsmElement<'_>) -> Result<(), Error> {
        for rule in &self.file.rules {
            if !element.holds(&rule.key) {
                continue;
            }
            if let Some(value) = &rule.value {
                if element.find(&rule.key) != value {
                    continue;
                }
            }
            match (element.kind(), rule.kind) {
                (ElementKind::Node, Kind::Line | Kind::Area | Kind::Centroid) => continue,
                (ElementKind::Way | ElementKind::Relation, Kind::Point) => continue,
                (_, Kind::Centroid) => element.layer_as_centroid(&rule.layer)?,
                (_, Kind::Area) => element.layer(&rule.layer, true)?,
                (_, Kind::Line) => element.layer(&rule.layer, false)?,
                (_, Kind::Point) => element.layer(&rule.layer, false)?,
                (_, Kind::Auto) => {
                    let is_area = element.is_closed();
                    element.layer(&rule.layer, is_area)?;
                }
            }
            for key in &rule.attributes {
                if element.holds(key) {
                    let value = element.find(key).to_string();
                    element.attribute(key, AttrValue::Str(value));
                }
            }
        }
        Ok(())
    }
}

impl TagProcessor for RuleProcessor {
    fn node_keys(&self) -> Vec<String> {
        self.file.node_keys.clone()
    }

    fn node(&mut self, element: &mut OsmElement<'_>) -> Result<(), Error> {
        self.apply(element)
    }

    fn way(&mut self, element: &mut OsmElement<'_>) -> Result<(), Error> {
        self.apply(element)
    }
}
