//! Loading extra worker code by URL.
//!
//! Workers cannot evaluate foreign scripts, so a "script" is a registration
//! function the host installs under a URL ahead of time. Importing the URL
//! runs it against the worker's [`WorkerScope`].

use std::sync::{Arc, RwLock};

use crate::actor::{read, write};
use crate::prelude::HashMap;
use crate::worker::{TextShaper, WorkerSourceFactory};
use crate::{Error, Result};

/// Registration hooks a script may call on the worker that imports it.
pub trait WorkerScope {
    /// Fails if a source type with `name` already exists.
    fn register_worker_source(&self, name: &str, factory: WorkerSourceFactory) -> Result<()>;

    /// Fails if a shaper is already registered.
    fn register_rtl_text_plugin(&self, shaper: Arc<dyn TextShaper>) -> Result<()>;
}

pub trait ScriptLoader: Send + Sync {
    fn import(&self, url: &str, scope: &dyn WorkerScope) -> Result<()>;
}

pub type Script = Arc<dyn Fn(&dyn WorkerScope) -> Result<()> + Send + Sync>;

/// Scripts installed in-process, keyed by URL.
#[derive(Clone, Default)]
pub struct StaticScripts {
    scripts: Arc<RwLock<HashMap<String, Script>>>,
}

impl StaticScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &self,
        url: impl Into<String>,
        script: impl Fn(&dyn WorkerScope) -> Result<()> + Send + Sync + 'static,
    ) {
        write(&self.scripts).insert(url.into(), Arc::new(script));
    }

    pub fn contains(&self, url: &str) -> bool {
        read(&self.scripts).contains_key(url)
    }
}

impl ScriptLoader for StaticScripts {
    fn import(&self, url: &str, scope: &dyn WorkerScope) -> Result<()> {
        let script = read(&self.scripts).get(url).cloned();
        match script {
            Some(script) => script(scope),
            None => Err(Error::ScriptLoad(format!("no script installed at {url}"))),
        }
    }
}
