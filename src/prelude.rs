//! Prelude module for common tilewire types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilewire::prelude::*;`

pub use crate::core::{
    config::{RequestCacheConfig, RuntimeOptions, RuntimeProfile, WorkerPoolConfig},
    tile_id::{next_tile_uid, CanonicalTileId, OverscaledTileId, TileScheme, TileUid},
};

pub use crate::actor::{
    Actor, ActorParent, Cancelable, ContextKind, Done, Incoming, Mailbox, PendingRequest, Port,
    ResponseCallback, SessionActor, SessionId,
};

pub use crate::worker::{
    DecodeState, StyleLayerIndex, TileParameters, Worker, WorkerSource, WorkerSourceContext,
    WorkerTileParameters, WorkerTileResult,
};

pub use crate::plugins::{
    FetchedTile, ParseRequest, ScriptLoader, TileFetcher, TileParser, WorkerPlugins,
};

pub use crate::tiles::{
    dependencies::{DependencyParent, DependencyProvider, NoDependencies},
    dispatcher::Dispatcher,
    pool::WorkerPool,
    source::{SourceSettings, VectorSourceOptions, VectorTileSource},
    tile::{Tile, TileCallback, TileState},
};

pub use crate::runtime::{AsyncHandle, AsyncSpawner};

pub use crate::{Error, Result, WireError};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
