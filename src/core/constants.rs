//! Engine-wide constants shared by the front and worker sides.

/// Square tile size, in pixels, that vector tile sources must declare.
pub const VECTOR_TILE_SIZE: u32 = 512;

/// Highest canonical zoom a tile id may carry.
pub const MAX_CANONICAL_ZOOM: u8 = 30;

/// Upper bound on worker contexts in a pool.
pub const MAX_WORKER_COUNT: usize = 6;

/// Number of cached tile responses a worker keeps by default.
pub const DEFAULT_REQUEST_CACHE_CAPACITY: usize = 500;

/// Completed tile loads between two cache size checks.
pub const CACHE_CHECK_THRESHOLD: usize = 50;

/// Source type that is always available on a worker.
pub const VECTOR_SOURCE_TYPE: &str = "vector";

/// Source type backed by a native tile extraction plugin.
pub const PLANET_SOURCE_TYPE: &str = "planet";
