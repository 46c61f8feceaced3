//! State of the optional right-to-left text shaping plugin on a worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    #[default]
    Unavailable,
    Deferred,
    Loading,
    Loaded,
    Error,
}

/// Plugin state as broadcast by the front.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginState {
    pub plugin_status: PluginStatus,
    #[serde(rename = "pluginURL", default)]
    pub plugin_url: Option<String>,
}

/// Text shaping entry points a loaded plugin provides.
pub trait TextShaper: Send + Sync {
    fn apply_arabic_shaping(&self, text: &str) -> String;

    fn process_bidirectional_text(&self, text: &str, line_break_points: &[usize]) -> Vec<String>;
}

#[derive(Default)]
pub struct RtlTextPlugin {
    state: PluginState,
    shaper: Option<Arc<dyn TextShaper>>,
}

/// One plugin slot per worker, read by parsers.
pub type SharedRtlPlugin = Arc<RwLock<RtlTextPlugin>>;

impl RtlTextPlugin {
    pub fn set_state(&mut self, state: PluginState) {
        self.state = state;
    }

    pub fn state(&self) -> &PluginState {
        &self.state
    }

    pub fn plugin_url(&self) -> Option<&str> {
        self.state.plugin_url.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.plugin_status == PluginStatus::Loaded
    }

    /// The plugin script has run and registered its shaper.
    pub fn is_parsed(&self) -> bool {
        self.shaper.is_some()
    }

    pub fn register(&mut self, shaper: Arc<dyn TextShaper>) -> Result<()> {
        if self.is_parsed() {
            return Err(Error::RtlPlugin("RTL text plugin already registered.".into()));
        }
        self.shaper = Some(shaper);
        Ok(())
    }

    pub fn shaper(&self) -> Option<Arc<dyn TextShaper>> {
        self.shaper.clone()
    }
}

impl fmt::Debug for RtlTextPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtlTextPlugin")
            .field("state", &self.state)
            .field("parsed", &self.is_parsed())
            .finish()
    }
}
