//! Front-side answers to the requests workers make while parsing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::actor::{ActorParent, CallOutcome, Done, Incoming};
use crate::core::tile_id::{OverscaledTileId, TileUid};
use crate::{Error, Result};

/// `getGlyphs` payload: code points wanted per font stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphRequest {
    pub uid: TileUid,
    pub stacks: BTreeMap<String, Vec<u32>>,
}

/// `getImages` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub icons: Vec<String>,
    pub source: String,
    #[serde(rename = "tileID")]
    pub tile_id: OverscaledTileId,
    /// `icons` or `patterns`
    #[serde(rename = "type")]
    pub kind: String,
}

/// Glyph and image lookups the front owns.
pub trait DependencyProvider: Send + Sync {
    fn get_glyphs(&self, request: GlyphRequest) -> Result<Value>;

    fn get_images(&self, request: ImageRequest) -> Result<Value>;
}

/// Provider that knows no glyphs or images; every lookup answers with an
/// empty map per requested key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDependencies;

impl DependencyProvider for NoDependencies {
    fn get_glyphs(&self, request: GlyphRequest) -> Result<Value> {
        let stacks: Map<String, Value> = request
            .stacks
            .into_keys()
            .map(|stack| (stack, json!({})))
            .collect();
        Ok(Value::Object(stacks))
    }

    fn get_images(&self, _request: ImageRequest) -> Result<Value> {
        Ok(json!({}))
    }
}

/// Serves `getGlyphs` and `getImages` on a session's front actors.
#[derive(Debug, Default)]
pub struct DependencyParent<P> {
    provider: P,
}

impl<P: DependencyProvider> DependencyParent<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: DependencyProvider> ActorParent for DependencyParent<P> {
    fn call(&self, request: Incoming, done: Done) -> CallOutcome {
        let result = match request.method.as_str() {
            "getGlyphs" => serde_json::from_value(request.params)
                .map_err(Error::from)
                .and_then(|req| self.provider.get_glyphs(req)),
            "getImages" => serde_json::from_value(request.params)
                .map_err(Error::from)
                .and_then(|req| self.provider.get_images(req)),
            _ => return Err(done),
        };
        done.respond(result);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ContextKind, Port, ResponseCallback, SessionId};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_serves_worker_requests() {
        let (a, b) = Port::pair();
        let session = SessionId::generate();
        let (_front, front_box) = Actor::new("front", a, ContextKind::Coordinator, Some(session));
        let (worker, worker_box) = Actor::new("worker", b, ContextKind::Worker, None);
        let parent = DependencyParent::new(NoDependencies);

        let seen = Arc::new(Mutex::new(Vec::new()));
        for (method, body) in [
            ("getGlyphs", json!({"uid": 1, "stacks": {"Noto Sans": [65, 66]}})),
            (
                "getImages",
                json!({
                    "icons": ["pin"],
                    "source": "streets",
                    "tileID": {"overscaledZ": 1, "wrap": 0, "canonical": {"z": 1, "x": 0, "y": 0}},
                    "type": "icons"
                }),
            ),
            ("getResource", json!({})),
        ] {
            let sink = seen.clone();
            let callback: ResponseCallback = Box::new(move |result| sink.lock().unwrap().push(result));
            worker.send(method, &body, Some(callback), Some(session)).unwrap();
        }

        front_box.pump(&parent);
        worker_box.pump(&());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].as_ref().unwrap(), &json!({"Noto Sans": {}}));
        assert_eq!(seen[1].as_ref().unwrap(), &json!({}));
        assert!(matches!(seen[2], Err(Error::MethodNotFound(_))));
    }
}
