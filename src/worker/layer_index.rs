//! Per-session index of style layers, grouped the way parsers consume them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prelude::HashMap;

/// The subset of a style layer that tile parsing depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleLayer {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "source-layer", default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub layout: Map<String, Value>,
    #[serde(default)]
    pub paint: Map<String, Value>,
}

/// Source layer used for sources without named layers.
const DEFAULT_SOURCE_LAYER: &str = "_geojsonTileLayer";

impl StyleLayer {
    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility").and_then(Value::as_str) != Some("none")
    }

    /// Whether the layer is drawn at `zoom`.
    pub fn is_in_zoom_range(&self, zoom: f64) -> bool {
        if let Some(min) = self.minzoom {
            if zoom < min.floor() {
                return false;
            }
        }
        if let Some(max) = self.maxzoom {
            if zoom >= max {
                return false;
            }
        }
        true
    }

    /// Layers sharing this key produce identical buckets and are laid out once.
    fn layout_key(&self) -> String {
        let key = serde_json::json!([
            self.layer_type,
            self.source,
            self.source_layer,
            self.minzoom,
            self.maxzoom,
            self.filter,
            self.layout,
        ]);
        key.to_string()
    }
}

/// source-layer id -> families of layout-identical layers.
pub type LayerFamilies = HashMap<String, Vec<Vec<StyleLayer>>>;

#[derive(Debug, Clone, Default)]
pub struct StyleLayerIndex {
    order: Vec<String>,
    layers: HashMap<String, StyleLayer>,
    families_by_source: HashMap<String, LayerFamilies>,
}

impl StyleLayerIndex {
    pub fn new(layers: Vec<StyleLayer>) -> Self {
        let mut index = Self::default();
        index.replace(layers);
        index
    }

    /// Swap in a whole new layer list.
    pub fn replace(&mut self, layers: Vec<StyleLayer>) {
        self.order.clear();
        self.layers.clear();
        self.update(layers, &[]);
    }

    /// Upsert `layers` and drop `removed_ids`; unknown ids are ignored.
    pub fn update(&mut self, layers: Vec<StyleLayer>, removed_ids: &[String]) {
        for layer in layers {
            if !self.layers.contains_key(&layer.id) {
                self.order.push(layer.id.clone());
            }
            self.layers.insert(layer.id.clone(), layer);
        }
        for id in removed_ids {
            if self.layers.remove(id).is_some() {
                self.order.retain(|existing| existing != id);
            }
        }
        self.rebuild_families();
    }

    fn rebuild_families(&mut self) {
        let mut groups: Vec<Vec<StyleLayer>> = Vec::new();
        let mut group_of_key: HashMap<String, usize> = HashMap::default();

        for id in &self.order {
            let Some(layer) = self.layers.get(id) else {
                continue;
            };
            let key = layer.layout_key();
            match group_of_key.get(&key) {
                Some(&idx) => groups[idx].push(layer.clone()),
                None => {
                    group_of_key.insert(key, groups.len());
                    groups.push(vec![layer.clone()]);
                }
            }
        }

        self.families_by_source.clear();
        for family in groups {
            let first = &family[0];
            if !first.is_visible() {
                continue;
            }
            let source = first.source.clone().unwrap_or_default();
            let source_layer = first
                .source_layer
                .clone()
                .unwrap_or_else(|| DEFAULT_SOURCE_LAYER.to_string());
            self.families_by_source
                .entry(source)
                .or_default()
                .entry(source_layer)
                .or_default()
                .push(family);
        }
    }

    pub fn families_by_source(&self, source: &str) -> Option<&LayerFamilies> {
        self.families_by_source.get(source)
    }

    pub fn get(&self, id: &str) -> Option<&StyleLayer> {
        self.layers.get(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
