//! Tile byte acquisition.

use std::fmt;
use std::sync::Arc;

use crate::actor::Cancelable;
use crate::worker::WorkerTileParameters;
use crate::Result;

/// Raw bytes of one tile plus the HTTP caching hints that came with them.
#[derive(Clone, PartialEq)]
pub struct FetchedTile {
    pub data: Arc<Vec<u8>>,
    pub expires: Option<String>,
    pub cache_control: Option<String>,
}

impl FetchedTile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            expires: None,
            cache_control: None,
        }
    }
}

impl fmt::Debug for FetchedTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedTile")
            .field("bytes", &self.data.len())
            .field("expires", &self.expires)
            .field("cache_control", &self.cache_control)
            .finish()
    }
}

/// `Ok(None)` is a tile outside the data's coverage, not a failure.
pub type FetchCallback = Box<dyn FnOnce(Result<Option<FetchedTile>>) + Send>;

/// Resolves a tile request to bytes.
///
/// Implementations call `callback` exactly once unless the returned handle is
/// canceled first, in which case they may skip it.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, params: &WorkerTileParameters, callback: FetchCallback) -> Cancelable;
}
