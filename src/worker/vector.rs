//! Worker source for vector tiles: fetch, parse, keep decode state per uid.

use std::sync::{Arc, Mutex, RwLock};

use crate::actor::{lock, read, write, Cancelable};
use crate::core::tile_id::TileUid;
use crate::plugins::{FetchedTile, ParseRequest, TileFetcher};
use crate::prelude::HashMap;
use crate::worker::worker_tile::{ReloadIntent, TileStatus, WorkerTile};
use crate::worker::{
    Completion, DecodeState, TileParameters, WorkerSource, WorkerSourceContext, WorkerTileCallback,
    WorkerTileParameters, WorkerTileResult,
};
use crate::Result;

type TileEntry = Arc<Mutex<WorkerTile>>;

struct Shared {
    ctx: WorkerSourceContext,
    fetcher: Arc<dyn TileFetcher>,
    available_images: RwLock<Vec<String>>,
    loaded: Mutex<HashMap<TileUid, TileEntry>>,
}

/// Handler for the `vector` source type, and for `planet` with the native
/// fetcher swapped in.
///
/// At most one decode runs per uid. A reload that arrives while a tile is
/// loading is parked on the tile (the latest one wins) and run against the
/// same bytes once the current parse finishes.
#[derive(Clone)]
pub struct VectorTileWorkerSource {
    shared: Arc<Shared>,
}

impl VectorTileWorkerSource {
    pub fn new(ctx: WorkerSourceContext) -> Self {
        let fetcher = ctx.plugins.fetcher.clone();
        Self::with_fetcher(ctx, fetcher)
    }

    pub fn with_fetcher(ctx: WorkerSourceContext, fetcher: Arc<dyn TileFetcher>) -> Self {
        let available_images = RwLock::new(ctx.available_images.clone());
        Self {
            shared: Arc::new(Shared {
                ctx,
                fetcher,
                available_images,
                loaded: Mutex::new(HashMap::default()),
            }),
        }
    }

    /// Number of uids with decode state.
    pub fn loaded_tiles(&self) -> usize {
        lock(&self.shared.loaded).len()
    }

    pub fn available_images(&self) -> Vec<String> {
        read(&self.shared.available_images).clone()
    }
}

impl Shared {
    fn entry(&self, uid: TileUid) -> Option<TileEntry> {
        lock(&self.loaded).get(&uid).cloned()
    }

    fn fetched(
        self: &Arc<Self>,
        tile: &TileEntry,
        result: Result<Option<FetchedTile>>,
        callback: WorkerTileCallback,
    ) {
        let mut t = lock(tile);
        if t.aborted {
            log::debug!("tile {}: fetch finished after abort", t.uid());
            return;
        }
        t.fetch = None;

        match result {
            Ok(Some(data)) => {
                t.data = Some(data.clone());
                t.status = TileStatus::Parsing;
                let params = t.params.clone();
                drop(t);
                self.parse(tile, params, data, callback);
            }
            other => {
                t.status = TileStatus::Done;
                let reload = t.reload.take();
                drop(t);
                if let Err(err) = &other {
                    if !err.is_not_found() {
                        log::error!("tile fetch failed: {}", err);
                    }
                }
                callback(other.map(|_| None));
                if let Some(reload) = reload {
                    (reload.callback)(Ok(None));
                }
            }
        }
    }

    fn parse(
        self: &Arc<Self>,
        tile: &TileEntry,
        params: WorkerTileParameters,
        data: FetchedTile,
        callback: WorkerTileCallback,
    ) {
        let request = ParseRequest {
            params,
            data: data.clone(),
            layer_index: self.ctx.layer_index.clone(),
            available_images: read(&self.available_images).clone(),
            actor: self.ctx.actor.clone(),
            rtl: self.ctx.rtl.clone(),
        };
        let shared = self.clone();
        let tile = tile.clone();
        self.ctx.plugins.parser.parse(
            request,
            Box::new(move |result| shared.parsed(&tile, data, result, callback)),
        );
    }

    fn parsed(
        self: &Arc<Self>,
        tile: &TileEntry,
        data: FetchedTile,
        result: Result<serde_json::Value>,
        callback: WorkerTileCallback,
    ) {
        let reload = {
            let mut t = lock(tile);
            if t.aborted {
                log::debug!("tile {}: parse finished after abort", t.uid());
                return;
            }
            let reload = t.reload.take();
            match &reload {
                Some(intent) => t.params = intent.params.clone(),
                None => t.status = TileStatus::Done,
            }
            reload
        };

        if let Err(err) = &result {
            log::error!("tile parse failed: {}", err);
        }
        callback(result.map(|value| {
            Some(WorkerTileResult {
                data: value,
                raw_tile_data: Some(data.data.as_ref().clone()),
                expires: data.expires.clone(),
                cache_control: data.cache_control.clone(),
            })
        }));

        if let Some(ReloadIntent { params, callback }) = reload {
            self.parse(tile, params, data, callback);
        }
    }

    /// Abort `tile` if it is still the entry for `uid` and still loading.
    fn abort(&self, uid: TileUid, only: Option<&TileEntry>) -> bool {
        let entry = {
            let mut loaded = lock(&self.loaded);
            let matches = match loaded.get(&uid) {
                Some(current) => {
                    only.map_or(true, |tile| Arc::ptr_eq(current, tile))
                        && lock(current).status != TileStatus::Done
                }
                None => false,
            };
            if matches {
                loaded.remove(&uid)
            } else {
                None
            }
        };

        let Some(entry) = entry else {
            return false;
        };
        let fetch = lock(&entry).abort();
        if let Some(fetch) = fetch {
            fetch.cancel();
        }
        log::debug!("tile {}: aborted", uid);
        true
    }
}

impl WorkerSource for VectorTileWorkerSource {
    fn load_tile(
        &self,
        params: WorkerTileParameters,
        callback: WorkerTileCallback,
    ) -> Option<Cancelable> {
        let uid = params.uid();
        let entry: TileEntry = Arc::new(Mutex::new(WorkerTile::new(params.clone())));

        let previous = lock(&self.shared.loaded).insert(uid, entry.clone());
        if let Some(previous) = previous {
            let fetch = {
                let mut t = lock(&previous);
                if t.status == TileStatus::Done {
                    None
                } else {
                    log::debug!("tile {}: new load replaces one in flight", uid);
                    t.abort()
                }
            };
            if let Some(fetch) = fetch {
                fetch.cancel();
            }
        }

        // Fetchers may answer on any thread; decoding continues on this
        // worker's loop.
        let shared = self.shared.clone();
        let tile = entry.clone();
        let fetch = self.shared.fetcher.fetch(
            &params,
            Box::new(move |result| {
                let actor = shared.ctx.actor.actor().clone();
                let posted = actor.post(move || shared.fetched(&tile, result, callback));
                if !posted {
                    log::debug!("tile {}: fetch finished after the worker stopped", uid);
                }
            }),
        );
        {
            let mut t = lock(&entry);
            if t.status == TileStatus::Fetching && !t.aborted {
                t.fetch = Some(fetch);
            }
        }

        let shared = self.shared.clone();
        Some(Cancelable::new(move || {
            shared.abort(uid, Some(&entry));
        }))
    }

    fn reload_tile(&self, params: WorkerTileParameters, callback: WorkerTileCallback) {
        let uid = params.uid();
        let Some(entry) = self.shared.entry(uid) else {
            callback(Ok(None));
            return;
        };

        let mut t = lock(&entry);
        match t.status {
            TileStatus::Fetching | TileStatus::Parsing => {
                t.defer_reload(ReloadIntent { params, callback });
            }
            TileStatus::Done => match t.data.clone() {
                Some(data) => {
                    t.status = TileStatus::Parsing;
                    t.params = params.clone();
                    drop(t);
                    self.shared.parse(&entry, params, data, callback);
                }
                // Nothing was fetched on the first load; nothing to reparse.
                None => {
                    drop(t);
                    callback(Ok(None));
                }
            },
        }
    }

    fn abort_tile(&self, params: TileParameters, callback: Completion) {
        self.shared.abort(params.uid, None);
        callback(Ok(()));
    }

    fn remove_tile(&self, params: TileParameters, callback: Completion) {
        if lock(&self.shared.loaded).remove(&params.uid).is_some() {
            log::debug!("tile {}: removed", params.uid);
        }
        callback(Ok(()));
    }

    fn set_available_images(&self, images: &[String]) {
        *write(&self.shared.available_images) = images.to_vec();
    }

    fn decode_state(&self, uid: TileUid) -> Option<DecodeState> {
        self.shared.entry(uid).map(|tile| lock(&tile).decode_state())
    }
}
