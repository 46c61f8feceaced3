//! Worker context: the per-session dispatch table and the tile handlers it
//! routes to.

mod layer_index;
mod registry;
mod route;
mod rtl;
mod vector;
mod worker_tile;

pub use layer_index::{StyleLayer, StyleLayerIndex, LayerFamilies};
pub use registry::{source_factory, Worker, WorkerSourceFactory};
pub use route::{Route, WorkerMethod};
pub use rtl::{PluginState, PluginStatus, RtlTextPlugin, SharedRtlPlugin, TextShaper};
pub use vector::VectorTileWorkerSource;
pub use worker_tile::{TileStatus, WorkerTile};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};

use crate::actor::{CallOutcome, Cancelable, Done, SessionActor};
use crate::core::tile_id::{OverscaledTileId, TileUid};
use crate::plugins::WorkerPlugins;
use crate::Result;

/// Layer index shared by every handler of one session.
pub type SharedLayerIndex = Arc<RwLock<StyleLayerIndex>>;

/// Completion of a tile load or reload: `Ok(None)` means "no data".
pub type WorkerTileCallback = Box<dyn FnOnce(Result<Option<WorkerTileResult>>) + Send>;

/// Completion of an operation that returns nothing.
pub type Completion = Box<dyn FnOnce(Result<()>) + Send>;

/// Identifies one tile object within one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileParameters {
    pub source: String,
    pub uid: TileUid,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

/// Where a tile's bytes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRequest {
    pub url: String,
}

/// Everything a handler needs to load or reload one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTileParameters {
    #[serde(flatten)]
    pub tile: TileParameters,
    #[serde(rename = "tileID")]
    pub tile_id: OverscaledTileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<TileRequest>,
    pub zoom: f64,
    pub tile_size: u32,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f32,
    #[serde(default)]
    pub show_collision_boxes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote_id: Option<Value>,
    #[serde(default)]
    pub return_dependencies: bool,
}

fn default_pixel_ratio() -> f32 {
    1.0
}

impl WorkerTileParameters {
    pub fn uid(&self) -> TileUid {
        self.tile.uid
    }

    pub fn source(&self) -> &str {
        &self.tile.source
    }
}

/// Decoded tile, as sent back to the front.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTileResult {
    /// Opaque parser output
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tile_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

/// Public view of a tile's decode state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeState {
    Loading,
    Loaded,
}

/// What a handler is given when the dispatch table creates it.
#[derive(Clone)]
pub struct WorkerSourceContext {
    /// Actor bound to the session that owns the handler
    pub actor: SessionActor,
    pub layer_index: SharedLayerIndex,
    /// The session's image list at construction time
    pub available_images: Vec<String>,
    pub plugins: WorkerPlugins,
    pub rtl: SharedRtlPlugin,
}

/// Back-side handler for one source type.
///
/// Every operation completes its callback exactly once. `load_tile` may hand
/// back a cancel handle which the transport invokes on a `<cancel>` notice.
pub trait WorkerSource: Send + Sync {
    fn load_tile(&self, params: WorkerTileParameters, callback: WorkerTileCallback)
        -> Option<Cancelable>;

    fn reload_tile(&self, params: WorkerTileParameters, callback: WorkerTileCallback);

    fn abort_tile(&self, params: TileParameters, callback: Completion);

    fn remove_tile(&self, params: TileParameters, callback: Completion);

    /// Teardown when the session drops the source.
    fn remove_source(&self, _params: &Value, callback: Completion) {
        callback(Ok(()));
    }

    /// Source-specific methods beyond the tile lifecycle.
    fn call_custom(&self, _method: &str, _params: Value, done: Done) -> CallOutcome {
        Err(done)
    }

    fn set_available_images(&self, _images: &[String]) {}

    fn decode_state(&self, _uid: TileUid) -> Option<DecodeState> {
        None
    }
}
