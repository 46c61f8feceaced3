//! Network tile fetching on an async runtime.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::actor::{read, Cancelable};
use crate::plugins::{FetchCallback, FetchedTile, SharedReferrer, TileFetcher};
use crate::runtime::{spawn_on, AsyncSpawner};
use crate::tiles::cache::TileRequestCache;
use crate::worker::WorkerTileParameters;
use crate::{Error, Result};

/// Shared async HTTP client for tile fetching
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("tilewire/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_default()
});

/// Downloads one URL, sending `referrer` when one is set.
#[async_trait]
pub trait TileDownloader: Send + Sync + 'static {
    async fn download(&self, url: &str, referrer: Option<&str>) -> Result<Option<FetchedTile>>;
}

/// [`TileDownloader`] over HTTP(S).
///
/// 404 becomes [`Error::NotFound`], 204 or an empty body is "no data", any
/// other non-success status is [`Error::Http`]. A referrer set with
/// [`ReqwestDownloader::with_referrer`] is only used when the fetch has none.
#[derive(Clone)]
pub struct ReqwestDownloader {
    client: reqwest::Client,
    referrer: Option<String>,
}

impl ReqwestDownloader {
    pub fn new() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            referrer: None,
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            referrer: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

impl Default for ReqwestDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileDownloader for ReqwestDownloader {
    async fn download(&self, url: &str, referrer: Option<&str>) -> Result<Option<FetchedTile>> {
        let mut request = self.client.get(url);
        if let Some(referrer) = referrer.or(self.referrer.as_deref()) {
            request = request.header(reqwest::header::REFERER, referrer);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let expires = header(reqwest::header::EXPIRES);
        let cache_control = header(reqwest::header::CACHE_CONTROL);

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        log::debug!("downloaded {} bytes from {}", bytes.len(), url);

        Ok(Some(FetchedTile {
            data: Arc::new(bytes.to_vec()),
            expires,
            cache_control,
        }))
    }
}

/// Adapts a [`TileDownloader`] to the callback-based [`TileFetcher`] seam.
///
/// Downloads run on the given spawner; canceling aborts the task, so the
/// callback is never invoked for a canceled fetch.
pub struct AsyncTileFetcher<D> {
    downloader: Arc<D>,
    spawner: Arc<dyn AsyncSpawner>,
    cache: Option<TileRequestCache>,
    referrer: SharedReferrer,
}

impl<D: TileDownloader> AsyncTileFetcher<D> {
    pub fn new(downloader: D, spawner: Arc<dyn AsyncSpawner>) -> Self {
        Self {
            downloader: Arc::new(downloader),
            spawner,
            cache: None,
            referrer: SharedReferrer::default(),
        }
    }

    pub fn with_cache(mut self, cache: TileRequestCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Read the referrer from `referrer` at every fetch.
    pub fn with_referrer(mut self, referrer: SharedReferrer) -> Self {
        self.referrer = referrer;
        self
    }
}

impl<D: TileDownloader> TileFetcher for AsyncTileFetcher<D> {
    fn fetch(&self, params: &WorkerTileParameters, callback: FetchCallback) -> Cancelable {
        let Some(url) = params.request.as_ref().map(|r| r.url.clone()) else {
            callback(Err(Error::MissingParameter("request.url")));
            return Cancelable::noop();
        };

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&url)) {
            log::debug!("request cache hit for {}", url);
            callback(Ok(Some(hit)));
            return Cancelable::noop();
        }

        let downloader = self.downloader.clone();
        let cache = self.cache.clone();
        let referrer = read(&self.referrer).clone();
        let handle = spawn_on(self.spawner.as_ref(), async move {
            let result = downloader.download(&url, referrer.as_deref()).await;
            match &result {
                Ok(Some(tile)) => {
                    if let Some(cache) = &cache {
                        cache.put(url, tile.clone());
                    }
                }
                Ok(None) => {}
                Err(err) if err.is_not_found() => log::debug!("tile not found: {}", url),
                Err(err) => log::error!("tile fetch failed for {}: {}", url, err),
            }
            callback(result);
        });

        Cancelable::new(move || handle.cancel())
    }
}

#[cfg(all(test, feature = "tokio-runtime"))]
mod tests {
    use super::*;
    use crate::core::tile_id::OverscaledTileId;
    use crate::runtime::TokioSpawner;
    use crate::worker::{TileParameters, TileRequest};
    use futures::channel::oneshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeDownloader {
        calls: AtomicUsize,
        delay_ms: u64,
        referrers: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl TileDownloader for FakeDownloader {
        async fn download(&self, url: &str, referrer: Option<&str>) -> Result<Option<FetchedTile>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.referrers.lock().unwrap().push(referrer.map(str::to_string));
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            match url {
                u if u.ends_with("missing.pbf") => Err(Error::NotFound(u.to_string())),
                u if u.ends_with("empty.pbf") => Ok(None),
                _ => Ok(Some(FetchedTile::new(b"tile".to_vec()))),
            }
        }
    }

    fn params(url: &str) -> WorkerTileParameters {
        WorkerTileParameters {
            tile: TileParameters {
                source: "streets".into(),
                uid: 1,
                source_type: Some("vector".into()),
            },
            tile_id: OverscaledTileId::unwrapped(1, 0, 0),
            request: Some(TileRequest { url: url.into() }),
            zoom: 1.0,
            tile_size: 512,
            pixel_ratio: 1.0,
            show_collision_boxes: false,
            promote_id: None,
            return_dependencies: false,
        }
    }

    fn fetcher(delay_ms: u64) -> AsyncTileFetcher<FakeDownloader> {
        let spawner = Arc::new(TokioSpawner::current().unwrap());
        AsyncTileFetcher::new(
            FakeDownloader {
                calls: AtomicUsize::new(0),
                delay_ms,
                referrers: Mutex::new(Vec::new()),
            },
            spawner,
        )
    }

    async fn fetch_once(
        fetcher: &AsyncTileFetcher<FakeDownloader>,
        url: &str,
    ) -> Result<Option<FetchedTile>> {
        let (tx, rx) = oneshot::channel();
        fetcher.fetch(
            &params(url),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_fetch_outcomes() {
        let fetcher = fetcher(0);
        let tile = fetch_once(&fetcher, "https://t/1/0/0.pbf").await.unwrap();
        assert_eq!(tile.unwrap().data.as_slice(), b"tile");

        assert!(fetch_once(&fetcher, "https://t/empty.pbf").await.unwrap().is_none());

        let err = fetch_once(&fetcher, "https://t/missing.pbf").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_download() {
        let cache = TileRequestCache::new();
        let fetcher = fetcher(0).with_cache(cache.clone());

        fetch_once(&fetcher, "https://t/1/0/0.pbf").await.unwrap();
        fetch_once(&fetcher, "https://t/1/0/0.pbf").await.unwrap();

        assert_eq!(fetcher.downloader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_callback() {
        let fetcher = fetcher(200);
        let (tx, rx) = oneshot::channel::<()>();
        let handle = fetcher.fetch(
            &params("https://t/1/0/0.pbf"),
            Box::new(move |_| {
                let _ = tx.send(());
            }),
        );
        handle.cancel();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_referrer_is_read_per_fetch() {
        let referrer = SharedReferrer::default();
        let fetcher = fetcher(0).with_referrer(referrer.clone());

        fetch_once(&fetcher, "https://t/1/0/0.pbf").await.unwrap();
        *referrer.write().unwrap() = Some("https://maps.example.com".into());
        fetch_once(&fetcher, "https://t/1/0/1.pbf").await.unwrap();

        assert_eq!(
            *fetcher.downloader.referrers.lock().unwrap(),
            vec![None, Some("https://maps.example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_url_fails_immediately() {
        let fetcher = fetcher(0);
        let mut p = params("unused");
        p.request = None;
        let (tx, rx) = oneshot::channel();
        fetcher.fetch(
            &p,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        assert!(matches!(rx.await.unwrap(), Err(Error::MissingParameter(_))));
    }
}
