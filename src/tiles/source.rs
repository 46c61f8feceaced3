//! Front-side tile lifecycle controller for vector sources.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::actor::{lock, read, write, ResponseCallback};
use crate::core::constants::{PLANET_SOURCE_TYPE, VECTOR_SOURCE_TYPE, VECTOR_TILE_SIZE};
use crate::core::tile_id::TileScheme;
use crate::tiles::dispatcher::{BroadcastCallback, Dispatcher};
use crate::tiles::tile::{Tile, TileCallback, TileState};
use crate::worker::{TileParameters, TileRequest, WorkerMethod, WorkerTileParameters, WorkerTileResult};
use crate::{Error, Result};

fn default_source_type() -> String {
    VECTOR_SOURCE_TYPE.to_string()
}

fn default_tile_size() -> u32 {
    VECTOR_TILE_SIZE
}

fn default_maxzoom() -> u8 {
    22
}

/// Style-level options of a vector source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSourceOptions {
    #[serde(rename = "type", default = "default_source_type")]
    pub source_type: String,
    /// URL templates
    #[serde(default)]
    pub tiles: Vec<String>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default)]
    pub scheme: TileScheme,
    #[serde(default)]
    pub minzoom: u8,
    #[serde(default = "default_maxzoom")]
    pub maxzoom: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote_id: Option<Value>,
}

impl Default for VectorSourceOptions {
    fn default() -> Self {
        Self {
            source_type: default_source_type(),
            tiles: Vec::new(),
            tile_size: default_tile_size(),
            scheme: TileScheme::default(),
            minzoom: 0,
            maxzoom: default_maxzoom(),
            promote_id: None,
        }
    }
}

impl VectorSourceOptions {
    pub fn validate(&self) -> Result<()> {
        if self.tile_size != VECTOR_TILE_SIZE {
            return Err(Error::InvalidOptions(format!(
                "vector tile sources must have a tileSize of {VECTOR_TILE_SIZE}"
            )));
        }
        // Planet tiles come from the native fetcher; templates are optional.
        if self.tiles.is_empty() && self.source_type != PLANET_SOURCE_TYPE {
            return Err(Error::InvalidOptions(
                "vector tile sources require \"tiles\"".to_string(),
            ));
        }
        if self.minzoom > self.maxzoom {
            return Err(Error::InvalidOptions(format!(
                "minzoom {} is greater than maxzoom {}",
                self.minzoom, self.maxzoom
            )));
        }
        Ok(())
    }
}

/// Map-level settings that shape every tile request.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub pixel_ratio: f32,
    pub show_collision_boxes: bool,
    pub refresh_expired_tiles: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            show_collision_boxes: false,
            refresh_expired_tiles: true,
        }
    }
}

struct Inner {
    id: String,
    options: RwLock<VectorSourceOptions>,
    settings: SourceSettings,
    dispatcher: Dispatcher,
}

/// Decides, per tile, between a fresh load, a deferred reload and a reload of
/// loaded data, and applies the worker's answer to the tile.
#[derive(Clone)]
pub struct VectorTileSource {
    inner: Arc<Inner>,
}

impl fmt::Debug for VectorTileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorTileSource")
            .field("id", &self.inner.id)
            .field("options", &*read(&self.inner.options))
            .finish()
    }
}

impl VectorTileSource {
    pub fn new(id: impl Into<String>, options: VectorSourceOptions, dispatcher: Dispatcher) -> Result<Self> {
        Self::with_settings(id, options, SourceSettings::default(), dispatcher)
    }

    pub fn with_settings(
        id: impl Into<String>,
        options: VectorSourceOptions,
        settings: SourceSettings,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                id: id.into(),
                options: RwLock::new(options),
                settings,
                dispatcher,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn source_type(&self) -> String {
        read(&self.inner.options).source_type.clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Replace the URL templates used by later loads.
    pub fn set_tiles(&self, tiles: Vec<String>) -> &Self {
        write(&self.inner.options).tiles = tiles;
        self
    }

    pub fn serialize(&self) -> Value {
        serde_json::to_value(&*read(&self.inner.options)).unwrap_or_else(|_| json!({}))
    }

    fn tile_params(&self, tile: &Tile) -> WorkerTileParameters {
        let options = read(&self.inner.options);
        let settings = &self.inner.settings;
        let request = tile
            .tile_id
            .canonical
            .url(&options.tiles, settings.pixel_ratio, options.scheme)
            .map(|url| TileRequest { url });
        WorkerTileParameters {
            tile: TileParameters {
                source: self.inner.id.clone(),
                uid: tile.uid,
                source_type: Some(options.source_type.clone()),
            },
            tile_id: tile.tile_id,
            request,
            zoom: f64::from(tile.tile_id.overscaled_z),
            tile_size: options
                .tile_size
                .saturating_mul(tile.tile_id.overscale_factor()),
            pixel_ratio: settings.pixel_ratio,
            show_collision_boxes: settings.show_collision_boxes,
            promote_id: options.promote_id.clone(),
            return_dependencies: false,
        }
    }

    fn tile_key(&self, tile: &Tile) -> TileParameters {
        TileParameters {
            source: self.inner.id.clone(),
            uid: tile.uid,
            source_type: Some(self.source_type()),
        }
    }

    /// Load `tile`, or reload it if it already has worker-side state.
    ///
    /// While a first load is in flight the request is parked on the tile and
    /// re-issued once that load completes; only the latest parked request is
    /// kept.
    pub fn load_tile(&self, tile: &Arc<Mutex<Tile>>, callback: TileCallback) {
        let failed = {
            let mut t = lock(tile);
            let params = self.tile_params(&t);

            let (actor, method) = if t.actor.is_none() || t.state == TileState::Expired {
                let actor = match self.inner.dispatcher.get_actor() {
                    Ok(actor) => actor,
                    Err(err) => {
                        t.state = TileState::Errored;
                        drop(t);
                        return callback(Err(err));
                    }
                };
                t.actor = Some(actor.clone());
                t.state = TileState::Loading;
                (actor, WorkerMethod::LoadTile)
            } else if t.state == TileState::Loading {
                if t.reload_callback.replace(callback).is_some() {
                    log::debug!("tile {}: parked reload superseded", t.tile_id);
                }
                return;
            } else {
                let Some(actor) = t.actor.clone() else {
                    return;
                };
                if t.state == TileState::Loaded {
                    t.state = TileState::Reloading;
                }
                (actor, WorkerMethod::ReloadTile)
            };

            let source = self.clone();
            let target = tile.clone();
            let on_response: ResponseCallback =
                Box::new(move |result| source.loaded(&target, result, callback));
            match actor.send(method.name(), &params, Some(on_response), None) {
                Ok(request) => {
                    t.request = Some(request);
                    None
                }
                Err(err) => Some(err),
            }
        };

        // Route a local send failure through the normal completion path.
        if let Some(err) = failed {
            log::warn!("tile request not sent: {}", err);
            if let Some(on_response) = err.callback {
                on_response(Err(err.error));
            }
        }
    }

    fn loaded(&self, tile: &Arc<Mutex<Tile>>, result: Result<Value>, callback: TileCallback) {
        let (outcome, reload) = {
            let mut t = lock(tile);
            t.request = None;

            if t.aborted {
                drop(t);
                return callback(Ok(()));
            }

            let data = result.and_then(|value| {
                serde_json::from_value::<Option<WorkerTileResult>>(value).map_err(Error::from)
            });
            let outcome = match data {
                Err(err) if !err.is_not_found() => {
                    log::error!("tile {} failed: {}", t.tile_id, err);
                    t.state = TileState::Errored;
                    Err(err)
                }
                data => {
                    let data = data.unwrap_or(None);
                    if self.inner.settings.refresh_expired_tiles {
                        if let Some(data) = &data {
                            t.set_expiry_data(data);
                        }
                    }
                    t.load_vector_data(data);
                    Ok(())
                }
            };
            (outcome, t.reload_callback.take())
        };

        if outcome.is_ok() {
            self.inner.dispatcher.cache_entry_possibly_added();
        }
        callback(outcome);

        if let Some(reload) = reload {
            self.load_tile(tile, reload);
        }
    }

    /// Cancel the tile's outstanding request and tell its worker to drop any
    /// in-flight decode.
    pub fn abort_tile(&self, tile: &Arc<Mutex<Tile>>) {
        let (request, actor, key) = {
            let mut t = lock(tile);
            t.aborted = true;
            t.reload_callback = None;
            if matches!(t.state, TileState::Loading | TileState::Reloading) {
                t.state = TileState::Unloaded;
            }
            (t.request.take(), t.actor.clone(), self.tile_key(&t))
        };

        if let Some(request) = request {
            request.cancel();
        }
        if let Some(actor) = actor {
            if let Err(err) = actor.send(WorkerMethod::AbortTile.name(), &key, None, None) {
                log::warn!("abortTile not sent: {}", err);
            }
        }
    }

    /// Drop the tile's data here and its decode state on the worker.
    pub fn remove_tile(&self, tile: &Arc<Mutex<Tile>>) {
        let (actor, key) = {
            let mut t = lock(tile);
            t.unload_vector_data();
            (t.actor.clone(), self.tile_key(&t))
        };
        if let Some(actor) = actor {
            if let Err(err) = actor.send(WorkerMethod::RemoveTile.name(), &key, None, None) {
                log::warn!("removeTile not sent: {}", err);
            }
        }
    }

    /// Tear the source down on every worker.
    pub fn remove(&self, callback: Option<BroadcastCallback>) {
        let params = json!({ "source": self.inner.id, "type": self.source_type() });
        self.inner
            .dispatcher
            .broadcast(WorkerMethod::RemoveSource.name(), &params, callback);
    }
}
