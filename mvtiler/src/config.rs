//! Run configuration: global settings plus the output layer definitions.
//!
//! The on-disk format is the JSON file passed via `--config`; layer order
//! in the file is the order layers are written into each tile.

use std::fs::File;
use std::path::Path;

use ahash::AHashMap;
use serde::Deserialize;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Deflate,
    None,
}

impl Compression {
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "gzip" => Ok(Compression::Gzip),
            "deflate" => Ok(Compression::Deflate),
            "none" => Ok(Compression::None),
            other => Err(Error::Config(format!(
                "\"compress\" should be one of \"gzip\", \"deflate\", \"none\"; got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub basezoom: u8,
    pub minzoom: u8,
    pub maxzoom: u8,
    #[serde(default)]
    pub include_ids: bool,
    #[serde(default = "default_compress")]
    pub compress: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bounding_box: Option<[f64; 4]>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_compress() -> String {
    "gzip".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    pub minzoom: u8,
    pub maxzoom: u8,
    #[serde(default)]
    pub write_to: Option<String>,
    #[serde(default)]
    pub simplify_below: u8,
    #[serde(default = "default_simplify_level")]
    pub simplify_level: f64,
    #[serde(default)]
    pub simplify_length: f64,
    #[serde(default = "default_simplify_ratio")]
    pub simplify_ratio: f64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_columns: Vec<String>,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub index_column: Option<String>,
}

fn default_simplify_level() -> f64 {
    0.01
}

fn default_simplify_ratio() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub settings: Settings,
    // order of appearance is the layer write order
    pub layers: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("cannot open {}: {e}", path.display())))?;
        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.settings.maxzoom > self.settings.basezoom {
            return Err(Error::Config(
                "maxzoom must be the same or smaller than basezoom".to_string(),
            ));
        }
        if self.settings.minzoom > self.settings.maxzoom {
            return Err(Error::Config(
                "minzoom must be the same or smaller than maxzoom".to_string(),
            ));
        }
        Compression::parse(&self.settings.compress)?;
        Ok(())
    }

    pub fn compression(&self) -> Compression {
        // validated at load time
        Compression::parse(&self.settings.compress).unwrap_or(Compression::Gzip)
    }

    /// Parse the layer table, preserving file order.
    pub fn layer_set(&self) -> Result<LayerSet, Error> {
        let mut set = LayerSet::default();
        for (name, value) in &self.layers {
            let layer: LayerConfig = serde_json::from_value(value.clone())
                .map_err(|e| Error::Config(format!("layer {name:?}: {e}")))?;
            set.add_layer(
                name.clone(),
                layer.minzoom,
                layer.maxzoom,
                layer.simplify_below,
                layer.simplify_level,
                layer.simplify_length,
                layer.simplify_ratio,
                layer.write_to.clone(),
            );
        }
        Ok(set)
    }

    /// Layer configs that name an external source, with the layer name.
    pub fn source_layers(&self) -> Vec<(String, LayerConfig)> {
        self.layers
            .iter()
            .filter_map(|(name, value)| {
                let layer: LayerConfig = serde_json::from_value(value.clone()).ok()?;
                layer.source.is_some().then(|| (name.clone(), layer))
            })
            .collect()
    }
}

/// One output layer as the emitter sees it.
#[derive(Debug, Clone)]
pub struct LayerDef {
    pub name: String,
    pub minzoom: u8,
    pub maxzoom: u8,
    pub simplify_below: u8,
    pub simplify_level: f64,
    pub simplify_length: f64,
    pub simplify_ratio: f64,
    pub write_to: Option<String>,
}

/// All layers, plus their grouping into wire layers.
///
/// A layer with `write_to` pointing at an earlier layer joins that layer's
/// group and is serialized into the same wire layer.
#[derive(Debug, Default)]
pub struct LayerSet {
    layers: Vec<LayerDef>,
    groups: Vec<Vec<u32>>,
    by_name: AHashMap<String, u32>,
    group_of: AHashMap<String, usize>,
}

impl LayerSet {
    #[allow(clippy::too_many_arguments)]
    pub fn add_layer(
        &mut self,
        name: String,
        minzoom: u8,
        maxzoom: u8,
        simplify_below: u8,
        simplify_level: f64,
        simplify_length: f64,
        simplify_ratio: f64,
        write_to: Option<String>,
    ) -> u32 {
        let index = self.layers.len() as u32;
        self.by_name.insert(name.clone(), index);
        match write_to.as_ref().and_then(|target| self.group_of.get(target)) {
            Some(&group) => self.groups[group].push(index),
            None => {
                self.group_of.insert(name.clone(), self.groups.len());
                self.groups.push(vec![index]);
            }
        }
        self.layers.push(LayerDef {
            name,
            minzoom,
            maxzoom,
            simplify_below,
            simplify_level,
            simplify_length,
            simplify_ratio,
            write_to,
        });
        index
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn def(&self, index: u32) -> &LayerDef {
        &self.layers[index as usize]
    }

    /// Wire-layer groups in declaration order.
    pub fn groups(&self) -> &[Vec<u32>] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
