//! Fixtures shared by the integration tests: an in-memory tile fetcher and
//! helpers to wait on work happening on worker threads.

#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tilewire::plugins::{FetchCallback, FetchedTile, StaticScripts, TileFetcher};
use tilewire::prelude::*;
use tilewire::tiles::{DependencyParent, NoDependencies};

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const TEMPLATE: &str = "mem://tiles/{z}/{x}/{y}.json";

/// Serves tiles from memory. Unknown URLs are "not found"; with `hold` set,
/// fetches are parked until [`MemoryFetcher::release`].
#[derive(Default)]
pub struct MemoryFetcher {
    tiles: Mutex<HashMap<String, FetchedTile>>,
    failing: Mutex<Vec<String>>,
    held: Mutex<Vec<(String, FetchCallback)>>,
    hold: AtomicBool,
    fetches: AtomicUsize,
    canceled: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, z: u8, x: u32, y: u32, tile: FetchedTile) {
        self.tiles.lock().unwrap().insert(url(z, x, y), tile);
    }

    pub fn insert_json(&self, z: u8, x: u32, y: u32, body: Value) {
        self.insert(z, x, y, FetchedTile::new(body.to_string().into_bytes()));
    }

    pub fn fail(&self, z: u8, x: u32, y: u32) {
        self.failing.lock().unwrap().push(url(z, x, y));
    }

    pub fn hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn canceled(&self) -> usize {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Complete every parked fetch on the calling thread.
    pub fn release(&self) {
        self.hold(false);
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for (url, callback) in held {
            callback(self.answer(&url));
        }
    }

    fn answer(&self, url: &str) -> tilewire::Result<Option<FetchedTile>> {
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(Error::Http {
                status: 500,
                url: url.to_string(),
            });
        }
        match self.tiles.lock().unwrap().get(url) {
            Some(tile) if tile.data.is_empty() => Ok(None),
            Some(tile) => Ok(Some(tile.clone())),
            None => Err(Error::NotFound(url.to_string())),
        }
    }
}

impl TileFetcher for MemoryFetcher {
    fn fetch(&self, params: &WorkerTileParameters, callback: FetchCallback) -> Cancelable {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let Some(url) = params.request.as_ref().map(|r| r.url.clone()) else {
            callback(Err(Error::MissingParameter("request.url")));
            return Cancelable::noop();
        };
        if self.hold.load(Ordering::SeqCst) {
            self.held.lock().unwrap().push((url, callback));
        } else {
            callback(self.answer(&url));
        }
        let canceled = self.canceled.clone();
        Cancelable::new(move || {
            canceled.fetch_add(1, Ordering::SeqCst);
        })
    }
}

pub fn url(z: u8, x: u32, y: u32) -> String {
    format!("mem://tiles/{z}/{x}/{y}.json")
}

pub fn options(workers: usize) -> RuntimeOptions {
    RuntimeOptions {
        worker_pool: WorkerPoolConfig {
            worker_count: workers,
            ..WorkerPoolConfig::for_testing()
        },
        request_cache: RequestCacheConfig::default(),
    }
}

pub fn pool(fetcher: &Arc<MemoryFetcher>, workers: usize) -> WorkerPool {
    pool_with(WorkerPlugins::new(fetcher.clone()), workers)
}

pub fn pool_with(plugins: WorkerPlugins, workers: usize) -> WorkerPool {
    WorkerPool::new(options(workers), plugins).expect("pool starts")
}

pub fn plugins_with_scripts(fetcher: &Arc<MemoryFetcher>, scripts: &StaticScripts) -> WorkerPlugins {
    WorkerPlugins::new(fetcher.clone()).with_scripts(Arc::new(scripts.clone()))
}

pub fn connect(pool: &WorkerPool) -> Dispatcher {
    pool.connect(Arc::new(DependencyParent::new(NoDependencies)))
        .expect("session connects")
}

pub fn source(dispatcher: &Dispatcher) -> VectorTileSource {
    let options = VectorSourceOptions {
        tiles: vec![TEMPLATE.to_string()],
        ..Default::default()
    };
    VectorTileSource::new("streets", options, dispatcher.clone()).expect("valid options")
}

pub fn tile(z: u8, x: u32, y: u32) -> Arc<Mutex<Tile>> {
    Arc::new(Mutex::new(Tile::new(OverscaledTileId::unwrapped(z, x, y))))
}

pub fn road_tile() -> Value {
    json!({
        "layers": {
            "road": [
                {"properties": {"name": "Main Street"}},
                {"properties": {"name": "Side Street"}}
            ]
        }
    })
}

pub fn road_layers() -> Value {
    json!([
        {"id": "roads", "type": "line", "source": "streets", "source-layer": "road"},
        {
            "id": "road-labels",
            "type": "symbol",
            "source": "streets",
            "source-layer": "road",
            "layout": {"text-field": "{name}"}
        }
    ])
}

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    crossbeam_channel::unbounded()
}

/// A tile callback that reports into a channel.
pub fn tile_callback() -> (TileCallback, Receiver<tilewire::Result<()>>) {
    let (tx, rx) = channel();
    (
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
        rx,
    )
}

/// Broadcast and wait for every worker's answer.
pub fn broadcast(dispatcher: &Dispatcher, method: &str, data: Value) -> tilewire::Result<Vec<Value>> {
    let (tx, rx) = channel();
    dispatcher.broadcast(
        method,
        &data,
        Some(Box::new(move |result| {
            let _ = tx.send(result);
        })),
    );
    rx.recv_timeout(TIMEOUT).expect("broadcast answered")
}

pub fn wait<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(TIMEOUT).expect("timed out waiting for a callback")
}

/// Poll until `check` holds.
pub fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
