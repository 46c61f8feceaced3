use crate::actor::Cancelable;
use crate::core::tile_id::TileUid;
use crate::plugins::FetchedTile;
use crate::worker::{DecodeState, WorkerTileCallback, WorkerTileParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// Waiting on the fetcher.
    Fetching,
    /// Bytes resolved, waiting on the parser.
    Parsing,
    /// Last parse (or fetch failure) has completed.
    Done,
}

/// A reload that arrived while the tile was still loading.
pub(crate) struct ReloadIntent {
    pub params: WorkerTileParameters,
    pub callback: WorkerTileCallback,
}

/// Worker-side decode state of one tile object.
pub struct WorkerTile {
    pub params: WorkerTileParameters,
    pub status: TileStatus,
    /// Set by an explicit abort; late completions are swallowed.
    pub aborted: bool,
    /// Resolved bytes, kept so reloads can reparse without refetching.
    pub data: Option<FetchedTile>,
    pub(crate) reload: Option<ReloadIntent>,
    pub(crate) fetch: Option<Cancelable>,
}

impl WorkerTile {
    pub fn new(params: WorkerTileParameters) -> Self {
        Self {
            params,
            status: TileStatus::Fetching,
            aborted: false,
            data: None,
            reload: None,
            fetch: None,
        }
    }

    pub fn uid(&self) -> TileUid {
        self.params.uid()
    }

    pub fn overscaling(&self) -> u32 {
        self.params.tile_id.overscale_factor()
    }

    pub fn decode_state(&self) -> DecodeState {
        match self.status {
            TileStatus::Fetching | TileStatus::Parsing => DecodeState::Loading,
            TileStatus::Done => DecodeState::Loaded,
        }
    }

    pub fn has_pending_reload(&self) -> bool {
        self.reload.is_some()
    }

    /// Replace any pending reload; the last one wins.
    pub(crate) fn defer_reload(&mut self, intent: ReloadIntent) {
        if self.reload.replace(intent).is_some() {
            log::debug!("tile {}: pending reload superseded", self.uid());
        }
    }

    /// Mark aborted and drop the pending reload. Returns the fetch handle so
    /// the caller can cancel it outside any lock.
    pub(crate) fn abort(&mut self) -> Option<Cancelable> {
        self.aborted = true;
        self.reload = None;
        self.fetch.take()
    }
}
