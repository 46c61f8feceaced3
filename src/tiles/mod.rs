//! Front side: tiles, the lifecycle controller that loads them through the
//! worker pool, and the worker-side request cache.

pub mod cache;
pub mod dependencies;
pub mod dispatcher;
pub mod pool;
pub mod source;
pub mod tile;

pub use cache::TileRequestCache;
pub use dependencies::{DependencyParent, DependencyProvider, NoDependencies};
pub use source::SourceSettings;
pub use tile::TileCallback;
