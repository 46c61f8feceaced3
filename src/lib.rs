//! # tilewire
//!
//! Off-thread tile decoding for map engines.
//!
//! The crate coordinates asynchronous production of renderable tile data
//! between a coordinating ("front") context that owns map state and one or
//! more worker contexts that fetch and parse tiles. The contexts share no
//! state; every interaction is a message through an [`actor::Actor`].
//!
//! - [`actor`]: request/response correlation, cancellation and throttled task draining
//! - [`worker`]: the per-session dispatch table and the vector tile worker source
//! - [`tiles`]: the front-side tile lifecycle controller, dispatcher and worker pool
//! - [`plugins`]: fetch, parse and script collaborators wired in explicitly

pub mod actor;
pub mod core;
pub mod logging;
pub mod plugins;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub mod worker;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{RequestCacheConfig, RuntimeOptions, RuntimeProfile, WorkerPoolConfig},
    tile_id::{CanonicalTileId, OverscaledTileId, TileScheme, TileUid},
};

pub use actor::{Actor, Cancelable, ContextKind, Done, Envelope, SessionActor, SessionId};

pub use worker::{Worker, WorkerSource, WorkerTileParameters, WorkerTileResult};

pub use tiles::{
    dispatcher::Dispatcher,
    pool::WorkerPool,
    source::{VectorSourceOptions, VectorTileSource},
    tile::{Tile, TileState},
};

pub use plugins::{TileFetcher, TileParser, WorkerPlugins};

use serde::{Deserialize, Serialize};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Could not find function {0}")]
    MethodNotFound(String),

    #[error("Unknown source type: {0}")]
    UnknownSourceType(String),

    #[error("Worker source with name \"{0}\" already registered.")]
    DuplicateSourceType(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid source options: {0}")]
    InvalidOptions(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("RTL text plugin error: {0}")]
    RtlPlugin(String),

    #[error("Script load error: {0}")]
    ScriptLoad(String),

    #[error("Context disconnected: {0}")]
    Disconnected(String),

    #[error("{kind}: {message}")]
    Remote {
        kind: String,
        message: String,
        status: Option<u16>,
    },
}

impl Error {
    /// A tile that is absent from its data source. The front side treats
    /// this as an empty result rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Http { status, .. } => *status == 404,
            Error::Remote { status, .. } => *status == Some(404),
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "Io",
            Error::Network(_) => "Network",
            Error::Serialization(_) => "Serialization",
            Error::NotFound(_) => "NotFound",
            Error::Http { .. } => "Http",
            Error::MethodNotFound(_) => "MethodNotFound",
            Error::UnknownSourceType(_) => "UnknownSourceType",
            Error::DuplicateSourceType(_) => "DuplicateSourceType",
            Error::MissingParameter(_) => "MissingParameter",
            Error::InvalidOptions(_) => "InvalidOptions",
            Error::Parse(_) => "Parse",
            Error::RtlPlugin(_) => "RtlPlugin",
            Error::ScriptLoad(_) => "ScriptLoad",
            Error::Disconnected(_) => "Disconnected",
            Error::Remote { .. } => "Remote",
        }
    }
}

/// An [`Error`] in the shape it takes when crossing a context boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&Error> for WireError {
    fn from(err: &Error) -> Self {
        let (message, status) = match err {
            Error::NotFound(what) => (what.clone(), Some(404)),
            Error::MethodNotFound(method) => (method.clone(), None),
            Error::Http { status, url } => (url.clone(), Some(*status)),
            Error::Remote {
                kind,
                message,
                status,
            } => {
                return WireError {
                    kind: kind.clone(),
                    message: message.clone(),
                    status: *status,
                }
            }
            other => (other.to_string(), None),
        };
        WireError {
            kind: err.kind().to_string(),
            message,
            status,
        }
    }
}

impl From<WireError> for Error {
    fn from(wire: WireError) -> Self {
        match wire.kind.as_str() {
            "NotFound" => Error::NotFound(wire.message),
            "MethodNotFound" => Error::MethodNotFound(wire.message),
            "Http" => Error::Http {
                status: wire.status.unwrap_or(0),
                url: wire.message,
            },
            _ => Error::Remote {
                kind: wire.kind,
                message: wire.message,
                status: wire.status,
            },
        }
    }
}
