//! Collaborators a worker calls out to: fetching tile bytes, parsing them,
//! and loading extra worker code.
//!
//! They are installed explicitly through [`WorkerPlugins`] when a worker is
//! created; there is no process-wide plugin slot.

mod fetch;
pub mod http;
mod parse;
mod script;

pub use fetch::{FetchCallback, FetchedTile, TileFetcher};
pub use http::{AsyncTileFetcher, ReqwestDownloader, TileDownloader};
pub use parse::{JsonTileParser, ParseCallback, ParseRequest, TileParser};
pub use script::{ScriptLoader, StaticScripts, WorkerScope};

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::core::config::RequestCacheConfig;
use crate::runtime::AsyncSpawner;
use crate::tiles::cache::TileRequestCache;

/// Referrer sent with tile downloads; written by `setReferrer`.
pub type SharedReferrer = Arc<RwLock<Option<String>>>;

/// The collaborators one worker uses.
#[derive(Clone)]
pub struct WorkerPlugins {
    /// Bytes for network-backed sources
    pub fetcher: Arc<dyn TileFetcher>,
    /// Native tile extraction; the `planet` source type exists only when set
    pub planet: Option<Arc<dyn TileFetcher>>,
    pub parser: Arc<dyn TileParser>,
    pub scripts: Arc<dyn ScriptLoader>,
    /// Trimmed on `enforceCacheSizeLimit`
    pub request_cache: Option<TileRequestCache>,
    pub referrer: SharedReferrer,
}

impl WorkerPlugins {
    pub fn new(fetcher: Arc<dyn TileFetcher>) -> Self {
        Self {
            fetcher,
            planet: None,
            parser: Arc::new(JsonTileParser),
            scripts: Arc::new(StaticScripts::new()),
            request_cache: None,
            referrer: SharedReferrer::default(),
        }
    }

    /// HTTP fetching on `spawner`, with a request cache when enabled.
    pub fn http(spawner: Arc<dyn AsyncSpawner>, cache: &RequestCacheConfig) -> Self {
        let referrer = SharedReferrer::default();
        let mut fetcher =
            AsyncTileFetcher::new(ReqwestDownloader::new(), spawner).with_referrer(referrer.clone());
        let request_cache = cache.enabled.then(TileRequestCache::new);
        if let Some(cache) = &request_cache {
            fetcher = fetcher.with_cache(cache.clone());
        }
        Self {
            request_cache,
            referrer,
            ..Self::new(Arc::new(fetcher))
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn TileParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_planet(mut self, planet: Arc<dyn TileFetcher>) -> Self {
        self.planet = Some(planet);
        self
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptLoader>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_request_cache(mut self, cache: TileRequestCache) -> Self {
        self.request_cache = Some(cache);
        self
    }

    /// Share `referrer` with a fetcher built outside [`WorkerPlugins::http`].
    pub fn with_referrer(mut self, referrer: SharedReferrer) -> Self {
        self.referrer = referrer;
        self
    }
}

impl fmt::Debug for WorkerPlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPlugins")
            .field("planet", &self.planet.is_some())
            .field("request_cache", &self.request_cache.is_some())
            .finish()
    }
}
