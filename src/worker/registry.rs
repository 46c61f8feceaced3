//! The per-session dispatch table a worker context runs.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::actor::{
    lock, read, write, Actor, ActorParent, CallOutcome, Done, Incoming, SessionActor, SessionId,
};
use crate::core::constants::{PLANET_SOURCE_TYPE, VECTOR_SOURCE_TYPE};
use crate::core::tile_id::TileUid;
use crate::plugins::{WorkerPlugins, WorkerScope};
use crate::prelude::HashMap;
use crate::worker::{
    Completion, DecodeState, PluginState, Route, SharedLayerIndex, SharedRtlPlugin, StyleLayer,
    StyleLayerIndex, TextShaper, TileParameters, VectorTileWorkerSource, WorkerMethod,
    WorkerSource, WorkerSourceContext, WorkerTileCallback, WorkerTileParameters,
};
use crate::{Error, Result};

/// Builds a handler for one (session, source type, source name).
pub type WorkerSourceFactory =
    Arc<dyn Fn(WorkerSourceContext) -> Arc<dyn WorkerSource> + Send + Sync>;

/// Wrap a constructor as a [`WorkerSourceFactory`].
pub fn source_factory<S, F>(make: F) -> WorkerSourceFactory
where
    S: WorkerSource + 'static,
    F: Fn(WorkerSourceContext) -> S + Send + Sync + 'static,
{
    Arc::new(move |ctx| Arc::new(make(ctx)) as Arc<dyn WorkerSource>)
}

/// source type -> source name -> handler
type SessionSources = HashMap<String, HashMap<String, Arc<dyn WorkerSource>>>;

struct Inner {
    actor: Actor,
    plugins: WorkerPlugins,
    layer_indexes: Mutex<HashMap<SessionId, SharedLayerIndex>>,
    available_images: Mutex<HashMap<SessionId, Vec<String>>>,
    source_types: RwLock<HashMap<String, WorkerSourceFactory>>,
    sources: Mutex<HashMap<SessionId, SessionSources>>,
    rtl: SharedRtlPlugin,
}

/// Worker-side entry point: routes every incoming request to a flat method or
/// to the handler for `(session, params.type, params.source)`, creating the
/// handler on first use.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("actor", &self.inner.actor)
            .field("source_types", &self.source_types())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLayers {
    layers: Vec<StyleLayer>,
    #[serde(default)]
    removed_ids: Vec<String>,
}

#[derive(Deserialize)]
struct LoadWorkerSource {
    url: String,
}

#[derive(Deserialize)]
struct RemoveSource {
    source: String,
    #[serde(rename = "type", default)]
    source_type: Option<String>,
}

fn from_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(Error::from)
}

/// Unwrap a `Result`, failing `done` and finishing the call on `Err`.
macro_rules! or_fail {
    ($done:ident, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                $done.fail(err);
                return Ok(None);
            }
        }
    };
}

impl Worker {
    /// A worker answering through `actor`, with the built-in source types.
    ///
    /// `planet` is only available when `plugins` carries a native fetcher.
    pub fn new(actor: Actor, plugins: WorkerPlugins) -> Self {
        let mut source_types: HashMap<String, WorkerSourceFactory> = HashMap::default();
        source_types.insert(
            VECTOR_SOURCE_TYPE.to_string(),
            source_factory(VectorTileWorkerSource::new),
        );
        if let Some(planet) = plugins.planet.clone() {
            source_types.insert(
                PLANET_SOURCE_TYPE.to_string(),
                source_factory(move |ctx| VectorTileWorkerSource::with_fetcher(ctx, planet.clone())),
            );
        }

        Self {
            inner: Arc::new(Inner {
                actor,
                plugins,
                layer_indexes: Mutex::new(HashMap::default()),
                available_images: Mutex::new(HashMap::default()),
                source_types: RwLock::new(source_types),
                sources: Mutex::new(HashMap::default()),
                rtl: SharedRtlPlugin::default(),
            }),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.inner.actor
    }

    pub fn rtl(&self) -> &SharedRtlPlugin {
        &self.inner.rtl
    }

    /// The referrer tile downloads currently send.
    pub fn referrer(&self) -> Option<String> {
        read(&self.inner.plugins.referrer).clone()
    }

    /// Registered source type names, sorted.
    pub fn source_types(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner.source_types).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn layer_index(&self, session: SessionId) -> SharedLayerIndex {
        lock(&self.inner.layer_indexes)
            .entry(session)
            .or_insert_with(|| Arc::new(RwLock::new(StyleLayerIndex::default())))
            .clone()
    }

    pub fn available_images(&self, session: SessionId) -> Vec<String> {
        lock(&self.inner.available_images)
            .get(&session)
            .cloned()
            .unwrap_or_default()
    }

    /// The handler for `(session, source_type, source)`, created on first use.
    pub fn worker_source(
        &self,
        session: SessionId,
        source_type: &str,
        source: &str,
    ) -> Result<Arc<dyn WorkerSource>> {
        if let Some(existing) = lock(&self.inner.sources)
            .get(&session)
            .and_then(|types| types.get(source_type))
            .and_then(|names| names.get(source))
        {
            return Ok(existing.clone());
        }

        let factory = read(&self.inner.source_types)
            .get(source_type)
            .cloned()
            .ok_or_else(|| Error::UnknownSourceType(source_type.to_string()))?;
        let layer_index = self.layer_index(session);
        let available_images = self.available_images(session);

        let mut sources = lock(&self.inner.sources);
        let names = sources
            .entry(session)
            .or_default()
            .entry(source_type.to_string())
            .or_default();
        let handler = names.entry(source.to_string()).or_insert_with(|| {
            log::debug!("{}: new {} handler for {}", session, source_type, source);
            factory(WorkerSourceContext {
                actor: SessionActor::new(self.inner.actor.clone(), session),
                layer_index,
                available_images,
                plugins: self.inner.plugins.clone(),
                rtl: self.inner.rtl.clone(),
            })
        });
        Ok(handler.clone())
    }

    /// Every handler created for `session`.
    fn session_sources(&self, session: SessionId) -> Vec<Arc<dyn WorkerSource>> {
        lock(&self.inner.sources)
            .get(&session)
            .map(|types| {
                types
                    .values()
                    .flat_map(|names| names.values().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handlers alive for `session`, across all types.
    pub fn source_count(&self, session: SessionId) -> usize {
        self.session_sources(session).len()
    }

    pub fn decode_state(
        &self,
        session: SessionId,
        source_type: &str,
        source: &str,
        uid: TileUid,
    ) -> Option<DecodeState> {
        let handler = lock(&self.inner.sources)
            .get(&session)?
            .get(source_type)?
            .get(source)?
            .clone();
        handler.decode_state(uid)
    }

    pub fn set_images(&self, session: SessionId, images: Vec<String>) {
        lock(&self.inner.available_images).insert(session, images.clone());
        for handler in self.session_sources(session) {
            handler.set_available_images(&images);
        }
    }

    pub fn set_layers(&self, session: SessionId, layers: Vec<StyleLayer>) {
        write(&self.layer_index(session)).replace(layers);
    }

    pub fn update_layers(&self, session: SessionId, layers: Vec<StyleLayer>, removed: &[String]) {
        write(&self.layer_index(session)).update(layers, removed);
    }

    /// Detach a handler and let it tear down; unknown sources answer at once.
    fn remove_source(&self, session: SessionId, params: Value, done: Done) {
        let request: RemoveSource = match from_params(params.clone()) {
            Ok(request) => request,
            Err(err) => return done.fail(err),
        };
        let source_type = request
            .source_type
            .unwrap_or_else(|| VECTOR_SOURCE_TYPE.to_string());

        let handler = lock(&self.inner.sources)
            .get_mut(&session)
            .and_then(|types| types.get_mut(&source_type))
            .and_then(|names| names.remove(&request.source));

        match handler {
            Some(handler) => {
                log::debug!("{}: removing {} source {}", session, source_type, request.source);
                handler.remove_source(&params, Box::new(move |result| done.send(result)));
            }
            None => done.empty(),
        }
    }

    /// Apply the front's plugin state and import the plugin when it has
    /// finished downloading but not been evaluated yet.
    fn sync_rtl_plugin_state(&self, state: PluginState) -> Result<bool> {
        let pending_url = {
            let mut rtl = write(&self.inner.rtl);
            rtl.set_state(state);
            match rtl.plugin_url() {
                Some(url) if rtl.is_loaded() && !rtl.is_parsed() => Some(url.to_string()),
                _ => None,
            }
        };

        let Some(url) = pending_url else {
            return Ok(read(&self.inner.rtl).is_parsed());
        };
        self.inner.plugins.scripts.import(&url, self)?;
        if read(&self.inner.rtl).is_parsed() {
            Ok(true)
        } else {
            Err(Error::RtlPlugin(format!(
                "RTL Text Plugin failed to import scripts from {url}"
            )))
        }
    }

    fn call_method(
        &self,
        method: WorkerMethod,
        session: SessionId,
        params: Value,
        done: Done,
    ) -> CallOutcome {
        match method {
            WorkerMethod::SetReferrer => {
                let referrer: Option<String> = or_fail!(done, from_params(params));
                *write(&self.inner.plugins.referrer) = referrer;
                done.empty();
            }
            WorkerMethod::SetImages => {
                let images: Vec<String> = or_fail!(done, from_params(params));
                self.set_images(session, images);
                done.empty();
            }
            WorkerMethod::SetLayers => {
                let layers: Vec<StyleLayer> = or_fail!(done, from_params(params));
                self.set_layers(session, layers);
                done.empty();
            }
            WorkerMethod::UpdateLayers => {
                let update: UpdateLayers = or_fail!(done, from_params(params));
                self.update_layers(session, update.layers, &update.removed_ids);
                done.empty();
            }
            WorkerMethod::LoadTile | WorkerMethod::ReloadTile => {
                let params: WorkerTileParameters = or_fail!(done, from_params(params));
                let handler = or_fail!(done, self.tile_handler(session, &params.tile));
                let callback: WorkerTileCallback = Box::new(move |result| done.send(result));
                if method == WorkerMethod::LoadTile {
                    return Ok(handler.load_tile(params, callback));
                }
                handler.reload_tile(params, callback);
            }
            WorkerMethod::AbortTile | WorkerMethod::RemoveTile => {
                let params: TileParameters = or_fail!(done, from_params(params));
                let handler = or_fail!(done, self.tile_handler(session, &params));
                let callback: Completion = Box::new(move |result| done.send(result));
                if method == WorkerMethod::AbortTile {
                    handler.abort_tile(params, callback);
                } else {
                    handler.remove_tile(params, callback);
                }
            }
            WorkerMethod::RemoveSource => self.remove_source(session, params, done),
            WorkerMethod::LoadWorkerSource => {
                let request: LoadWorkerSource = or_fail!(done, from_params(params));
                done.send(self.inner.plugins.scripts.import(&request.url, self));
            }
            WorkerMethod::SyncRtlPluginState => {
                let state: PluginState = or_fail!(done, from_params(params));
                done.send(self.sync_rtl_plugin_state(state));
            }
            WorkerMethod::EnforceCacheSizeLimit => {
                let limit: usize = or_fail!(done, from_params(params));
                if let Some(cache) = &self.inner.plugins.request_cache {
                    cache.enforce_size_limit(limit);
                }
                done.empty();
            }
        }
        Ok(None)
    }

    fn tile_handler(
        &self,
        session: SessionId,
        params: &TileParameters,
    ) -> Result<Arc<dyn WorkerSource>> {
        let source_type = params.source_type.as_deref().unwrap_or(VECTOR_SOURCE_TYPE);
        self.worker_source(session, source_type, &params.source)
    }
}

impl ActorParent for Worker {
    fn call(&self, request: Incoming, done: Done) -> CallOutcome {
        let Some(route) = Route::parse(&request.method) else {
            return Err(done);
        };
        let Some(session) = request.source_session else {
            done.fail(Error::MissingParameter("sourceSessionId"));
            return Ok(None);
        };

        match route {
            Route::Method(method) => self.call_method(method, session, request.params, done),
            Route::Source {
                source_type,
                method,
            } => {
                let Some(source) = request.params.get("source").and_then(Value::as_str) else {
                    done.fail(Error::MissingParameter("source"));
                    return Ok(None);
                };
                let handler = or_fail!(done, self.worker_source(session, &source_type, source));
                handler.call_custom(&method, request.params, done)
            }
        }
    }
}

impl WorkerScope for Worker {
    fn register_worker_source(&self, name: &str, factory: WorkerSourceFactory) -> Result<()> {
        let mut types = write(&self.inner.source_types);
        if types.contains_key(name) {
            return Err(Error::DuplicateSourceType(name.to_string()));
        }
        log::debug!("{}: registered worker source type {}", self.inner.actor.name(), name);
        types.insert(name.to_string(), factory);
        Ok(())
    }

    fn register_rtl_text_plugin(&self, shaper: Arc<dyn TextShaper>) -> Result<()> {
        write(&self.inner.rtl).register(shaper)
    }
}
