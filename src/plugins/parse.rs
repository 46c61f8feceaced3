//! Tile decoding.
//!
//! [`TileParser`] is the seam; [`JsonTileParser`] is the built-in parser for
//! JSON-encoded tiles. It groups features into buckets by the session's layer
//! families and, like a full vector tile parser, asks the front for glyphs
//! and images before it completes.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::actor::{lock, read, ResponseCallback, SessionActor};
use crate::plugins::FetchedTile;
use crate::worker::{SharedLayerIndex, SharedRtlPlugin, WorkerTileParameters};
use crate::{Error, Result};

/// Everything a parser gets for one tile.
#[derive(Clone)]
pub struct ParseRequest {
    pub params: WorkerTileParameters,
    pub data: FetchedTile,
    pub layer_index: SharedLayerIndex,
    pub available_images: Vec<String>,
    /// For dependency requests back to the front
    pub actor: SessionActor,
    pub rtl: SharedRtlPlugin,
}

pub type ParseCallback = Box<dyn FnOnce(Result<Value>) + Send>;

/// Turns tile bytes into an opaque result.
///
/// May issue further requests through `request.actor`; `callback` fires once,
/// after all of them have resolved.
pub trait TileParser: Send + Sync {
    fn parse(&self, request: ParseRequest, callback: ParseCallback);
}

const DEFAULT_FONT_STACK: &str = "Open Sans Regular,Arial Unicode MS Regular";
const PATTERN_PROPERTIES: [&str; 3] = ["fill-pattern", "line-pattern", "fill-extrusion-pattern"];

#[derive(Debug, Deserialize)]
struct TileDocument {
    #[serde(default)]
    layers: BTreeMap<String, Vec<TileFeature>>,
}

#[derive(Debug, Deserialize)]
struct TileFeature {
    #[serde(default)]
    properties: Map<String, Value>,
}

/// Parser for tiles encoded as `{"layers": {"<source-layer>": [{"properties": {..}}]}}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTileParser;

#[derive(Default)]
struct Dependencies {
    glyphs: BTreeMap<String, BTreeSet<u32>>,
    icons: BTreeSet<String>,
    patterns: BTreeSet<String>,
}

impl TileParser for JsonTileParser {
    fn parse(&self, request: ParseRequest, callback: ParseCallback) {
        let document: TileDocument = match serde_json::from_slice(&request.data.data) {
            Ok(document) => document,
            Err(err) => return callback(Err(Error::Parse(err.to_string()))),
        };

        let params = &request.params;
        let zoom = params.zoom;
        let shaper = read(&request.rtl).shaper();
        let mut buckets = Vec::new();
        let mut deps = Dependencies::default();

        {
            let index = read(&request.layer_index);
            if let Some(families) = index.families_by_source(params.source()) {
                for (source_layer, features) in &document.layers {
                    let Some(families) = families.get(source_layer) else {
                        continue;
                    };
                    for family in families {
                        let layer = &family[0];
                        if !layer.is_in_zoom_range(zoom) {
                            continue;
                        }

                        for feature in features {
                            if let Some(text) = layer.layout.get("text-field").and_then(Value::as_str) {
                                let mut text = resolve_tokens(text, &feature.properties);
                                if let Some(shaper) = &shaper {
                                    text = shaper.apply_arabic_shaping(&text);
                                }
                                let stack = font_stack(&layer.layout);
                                deps.glyphs
                                    .entry(stack)
                                    .or_default()
                                    .extend(text.chars().map(u32::from));
                            }
                            if let Some(icon) = layer.layout.get("icon-image").and_then(Value::as_str) {
                                let icon = resolve_tokens(icon, &feature.properties);
                                if !icon.is_empty() {
                                    deps.icons.insert(icon);
                                }
                            }
                        }
                        for property in PATTERN_PROPERTIES {
                            if let Some(pattern) = layer.paint.get(property).and_then(Value::as_str) {
                                deps.patterns.insert(pattern.to_string());
                            }
                        }

                        buckets.push(json!({
                            "layerIds": family.iter().map(|l| l.id.clone()).collect::<Vec<_>>(),
                            "sourceLayer": source_layer,
                            "featureCount": features.len(),
                        }));
                    }
                }
            }
        }

        let missing_images: Vec<&String> = deps
            .icons
            .iter()
            .chain(deps.patterns.iter())
            .filter(|name| !request.available_images.contains(*name))
            .collect();
        let output = json!({
            "buckets": buckets,
            "layerIds": document.layers.keys().collect::<Vec<_>>(),
            "missingImages": missing_images,
            "overscaling": params.tile_id.overscale_factor(),
        });

        DependencyCollector::start(request, deps, output, callback);
    }
}

/// Waits for glyph and image answers; the first error wins.
struct DependencyCollector {
    error: Option<Error>,
    glyphs: Option<Value>,
    icons: Option<Value>,
    patterns: Option<Value>,
    output: Value,
    return_dependencies: bool,
    callback: Option<ParseCallback>,
}

impl DependencyCollector {
    fn start(request: ParseRequest, deps: Dependencies, output: Value, callback: ParseCallback) {
        let params = &request.params;
        let state = Arc::new(Mutex::new(DependencyCollector {
            error: None,
            glyphs: None,
            icons: None,
            patterns: None,
            output,
            return_dependencies: params.return_dependencies,
            callback: Some(callback),
        }));

        if deps.glyphs.is_empty() {
            lock(&state).glyphs = Some(json!({}));
        } else {
            let body = json!({ "uid": params.uid(), "stacks": deps.glyphs });
            request_dependency(&request.actor, &state, "getGlyphs", body, |s, v| s.glyphs = Some(v));
        }

        for (kind, names) in [("icons", deps.icons), ("patterns", deps.patterns)] {
            let store = move |s: &mut DependencyCollector, v: Value| match kind {
                "icons" => s.icons = Some(v),
                _ => s.patterns = Some(v),
            };
            if names.is_empty() {
                store(&mut *lock(&state), json!({}));
            } else {
                let body = json!({
                    "icons": names,
                    "source": params.source(),
                    "tileID": params.tile_id,
                    "type": kind,
                });
                request_dependency(&request.actor, &state, "getImages", body, store);
            }
        }

        Self::maybe_prepare(&state);
    }

    fn maybe_prepare(state: &Arc<Mutex<DependencyCollector>>) {
        let (callback, result) = {
            let mut s = lock(state);
            if s.callback.is_none() {
                return;
            }
            if let Some(err) = s.error.take() {
                (s.callback.take(), Err(err))
            } else if s.glyphs.is_some() && s.icons.is_some() && s.patterns.is_some() {
                let mut output = s.output.take();
                if s.return_dependencies {
                    output["glyphMap"] = s.glyphs.take().unwrap_or_default();
                    output["iconMap"] = s.icons.take().unwrap_or_default();
                    output["patternMap"] = s.patterns.take().unwrap_or_default();
                }
                (s.callback.take(), Ok(output))
            } else {
                return;
            }
        };
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

fn request_dependency(
    actor: &SessionActor,
    state: &Arc<Mutex<DependencyCollector>>,
    method: &str,
    body: Value,
    store: impl FnOnce(&mut DependencyCollector, Value) + Send + 'static,
) {
    let shared = state.clone();
    let callback: ResponseCallback = Box::new(move |result| {
        {
            let mut s = lock(&shared);
            if s.error.is_some() || s.callback.is_none() {
                return;
            }
            match result {
                Ok(value) => store(&mut *s, value),
                Err(err) => s.error = Some(err),
            }
        }
        DependencyCollector::maybe_prepare(&shared);
    });
    if let Err(err) = actor.send(method, &body, Some(callback)) {
        log::error!("{method} request failed: {}", err.error);
        let mut s = lock(state);
        if s.error.is_none() {
            s.error = Some(err.error);
        }
    }
}

/// Replace `{property}` tokens with feature property values.
fn resolve_tokens(template: &str, properties: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = &rest[start + 1..start + len];
        match properties.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn font_stack(layout: &Map<String, Value>) -> String {
    layout
        .get("text-font")
        .and_then(Value::as_array)
        .map(|fonts| {
            fonts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|stack| !stack.is_empty())
        .unwrap_or_else(|| DEFAULT_FONT_STACK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tokens() {
        let props = json!({"name": "Main St", "ref": 5}).as_object().cloned().unwrap();
        assert_eq!(resolve_tokens("{name}", &props), "Main St");
        assert_eq!(resolve_tokens("{name} ({ref})", &props), "Main St (5)");
        assert_eq!(resolve_tokens("shield-{missing}", &props), "shield-");
        assert_eq!(resolve_tokens("plain", &props), "plain");
        assert_eq!(resolve_tokens("open {brace", &props), "open {brace");
    }

    #[test]
    fn test_font_stack() {
        let layout = json!({"text-font": ["Noto Sans", "Arial"]}).as_object().cloned().unwrap();
        assert_eq!(font_stack(&layout), "Noto Sans,Arial");
        assert_eq!(font_stack(&Map::new()), DEFAULT_FONT_STACK);
    }
}
