//! Configuration for the worker pool and the worker-side request cache.
//!
//! Hosts pick a [`RuntimeProfile`] preset or pass custom options; everything
//! is handed explicitly to constructors, nothing is read from global state.

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    CACHE_CHECK_THRESHOLD, DEFAULT_REQUEST_CACHE_CAPACITY, MAX_WORKER_COUNT,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeProfile {
    Balanced,
    LowResource,
    HighThroughput,
    Custom(RuntimeOptions),
}

impl RuntimeProfile {
    pub fn resolve(&self) -> RuntimeOptions {
        match self {
            Self::Balanced => RuntimeOptions {
                worker_pool: WorkerPoolConfig::default(),
                request_cache: RequestCacheConfig::default(),
            },
            Self::LowResource => RuntimeOptions {
                worker_pool: WorkerPoolConfig::low_resource(),
                request_cache: RequestCacheConfig {
                    enabled: true,
                    capacity: 100,
                    check_threshold: 20,
                },
            },
            Self::HighThroughput => RuntimeOptions {
                worker_pool: WorkerPoolConfig::high_performance(),
                request_cache: RequestCacheConfig {
                    enabled: true,
                    capacity: 2000,
                    check_threshold: 100,
                },
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for RuntimeProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    pub worker_pool: WorkerPoolConfig,
    pub request_cache: RequestCacheConfig,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeProfile::default().resolve()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of worker contexts (threads) to spawn
    pub worker_count: usize,
    /// Prefix for worker thread names, suffixed with the worker index
    pub thread_name_prefix: String,
}

impl WorkerPoolConfig {
    /// Half the available cores, at least one, at most [`MAX_WORKER_COUNT`].
    pub fn default_worker_count() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cpus / 2).clamp(1, MAX_WORKER_COUNT)
    }

    /// Create config optimized for low-resource environments
    pub fn low_resource() -> Self {
        Self {
            worker_count: 1,
            ..Default::default()
        }
    }

    /// Create config optimized for high-performance environments
    pub fn high_performance() -> Self {
        Self {
            worker_count: MAX_WORKER_COUNT,
            ..Default::default()
        }
    }

    /// Create config for testing
    pub fn for_testing() -> Self {
        Self {
            worker_count: 2,
            thread_name_prefix: "tilewire-test-worker".to_string(),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: Self::default_worker_count(),
            thread_name_prefix: "tilewire-worker".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCacheConfig {
    pub enabled: bool,
    /// Entries kept after an `enforceCacheSizeLimit` pass
    pub capacity: usize,
    /// Completed loads between two size checks
    pub check_threshold: usize,
}

impl Default for RequestCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_REQUEST_CACHE_CAPACITY,
            check_threshold: CACHE_CHECK_THRESHOLD,
        }
    }
}
