use std::time::{Duration, Instant};

use crate::actor::{Actor, Cancelable};
use crate::core::tile_id::{next_tile_uid, OverscaledTileId, TileUid};
use crate::worker::WorkerTileResult;
use crate::Result;

/// Completion of a front-side load: `Ok(())` once the tile's state is final
/// for this request, whether or not it holds data.
pub type TileCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Front-side lifecycle state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileState {
    /// Never requested, or unloaded
    #[default]
    Unloaded,
    /// First load in flight
    Loading,
    /// Reload of loaded data in flight
    Reloading,
    Loaded,
    Errored,
    /// Data outlived its cache lifetime; the next load refetches
    Expired,
}

/// A tile as the front sees it.
pub struct Tile {
    pub uid: TileUid,
    pub tile_id: OverscaledTileId,
    pub state: TileState,
    /// Set by an explicit abort. An aborted tile ignores any result that
    /// still arrives and is not reused.
    pub aborted: bool,
    pub data: Option<WorkerTileResult>,
    pub expiration: Option<Instant>,
    /// Worker actor this tile is pinned to after its first load
    pub(crate) actor: Option<Actor>,
    pub(crate) request: Option<Cancelable>,
    pub(crate) reload_callback: Option<TileCallback>,
}

impl Tile {
    pub fn new(tile_id: OverscaledTileId) -> Self {
        Self {
            uid: next_tile_uid(),
            tile_id,
            state: TileState::Unloaded,
            aborted: false,
            data: None,
            expiration: None,
            actor: None,
            request: None,
            reload_callback: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether a transport request for this tile is outstanding.
    pub fn is_requesting(&self) -> bool {
        self.request.is_some()
    }

    pub fn has_deferred_reload(&self) -> bool {
        self.reload_callback.is_some()
    }

    pub fn load_vector_data(&mut self, data: Option<WorkerTileResult>) {
        if self.has_data() {
            self.unload_vector_data();
        }
        self.state = TileState::Loaded;
        self.data = data;
    }

    pub fn unload_vector_data(&mut self) {
        self.data = None;
        self.state = TileState::Unloaded;
    }

    /// Derive the expiry time from the response's `Cache-Control: max-age`.
    pub fn set_expiry_data(&mut self, data: &WorkerTileResult) {
        if let Some(max_age) = data.cache_control.as_deref().and_then(max_age) {
            self.expiration = Some(Instant::now() + max_age);
        }
    }

    /// Move a loaded tile past its expiry to [`TileState::Expired`].
    pub fn expire_if_due(&mut self, now: Instant) -> bool {
        match self.expiration {
            Some(at) if self.state == TileState::Loaded && at <= now => {
                log::debug!("tile {} expired", self.tile_id);
                self.state = TileState::Expired;
                true
            }
            _ => false,
        }
    }
}

fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value.trim().trim_matches('"').parse().ok().map(Duration::from_secs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_age_parsing() {
        assert_eq!(max_age("public, max-age=300"), Some(Duration::from_secs(300)));
        assert_eq!(max_age("Max-Age=\"5\""), Some(Duration::from_secs(5)));
        assert_eq!(max_age("no-cache"), None);
        assert_eq!(max_age("max-age=soon"), None);
    }

    #[test]
    fn test_expiry() {
        let mut tile = Tile::new(OverscaledTileId::unwrapped(1, 0, 0));
        let data = WorkerTileResult {
            cache_control: Some("max-age=0".into()),
            ..Default::default()
        };
        tile.set_expiry_data(&data);

        // Only loaded tiles expire.
        assert!(!tile.expire_if_due(Instant::now()));
        tile.load_vector_data(Some(data));
        assert!(tile.expire_if_due(Instant::now()));
        assert_eq!(tile.state, TileState::Expired);
    }

    #[test]
    fn test_load_and_unload() {
        let mut tile = Tile::new(OverscaledTileId::unwrapped(2, 1, 1));
        let other = Tile::new(OverscaledTileId::unwrapped(2, 1, 1));
        assert_ne!(tile.uid, other.uid);

        tile.load_vector_data(None);
        assert_eq!(tile.state, TileState::Loaded);
        assert!(!tile.has_data());

        tile.load_vector_data(Some(WorkerTileResult::default()));
        assert!(tile.has_data());
        tile.unload_vector_data();
        assert_eq!(tile.state, TileState::Unloaded);
    }
}
