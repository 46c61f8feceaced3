use std::fmt;

/// Methods a worker answers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerMethod {
    SetReferrer,
    SetImages,
    SetLayers,
    UpdateLayers,
    LoadTile,
    ReloadTile,
    AbortTile,
    RemoveTile,
    RemoveSource,
    LoadWorkerSource,
    SyncRtlPluginState,
    EnforceCacheSizeLimit,
}

impl WorkerMethod {
    pub const ALL: [WorkerMethod; 12] = [
        WorkerMethod::SetReferrer,
        WorkerMethod::SetImages,
        WorkerMethod::SetLayers,
        WorkerMethod::UpdateLayers,
        WorkerMethod::LoadTile,
        WorkerMethod::ReloadTile,
        WorkerMethod::AbortTile,
        WorkerMethod::RemoveTile,
        WorkerMethod::RemoveSource,
        WorkerMethod::LoadWorkerSource,
        WorkerMethod::SyncRtlPluginState,
        WorkerMethod::EnforceCacheSizeLimit,
    ];

    /// Name as it appears in an envelope's `type`.
    pub fn name(self) -> &'static str {
        match self {
            WorkerMethod::SetReferrer => "setReferrer",
            WorkerMethod::SetImages => "setImages",
            WorkerMethod::SetLayers => "setLayers",
            WorkerMethod::UpdateLayers => "updateLayers",
            WorkerMethod::LoadTile => "loadTile",
            WorkerMethod::ReloadTile => "reloadTile",
            WorkerMethod::AbortTile => "abortTile",
            WorkerMethod::RemoveTile => "removeTile",
            WorkerMethod::RemoveSource => "removeSource",
            WorkerMethod::LoadWorkerSource => "loadWorkerSource",
            WorkerMethod::SyncRtlPluginState => "syncRTLPluginState",
            WorkerMethod::EnforceCacheSizeLimit => "enforceCacheSizeLimit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }
}

impl fmt::Display for WorkerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an incoming request type is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A flat method on the worker itself.
    Method(WorkerMethod),
    /// `"<sourceType>.<method>"`, sent to a handler of that type.
    Source { source_type: String, method: String },
}

impl Route {
    pub fn parse(name: &str) -> Option<Route> {
        if let Some(method) = WorkerMethod::from_name(name) {
            return Some(Route::Method(method));
        }
        let (source_type, method) = name.split_once('.')?;
        if source_type.is_empty() || method.is_empty() {
            return None;
        }
        Some(Route::Source {
            source_type: source_type.to_string(),
            method: method.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_methods_round_trip() {
        for method in WorkerMethod::ALL {
            assert_eq!(Route::parse(method.name()), Some(Route::Method(method)));
        }
        assert_eq!(WorkerMethod::SyncRtlPluginState.to_string(), "syncRTLPluginState");
    }

    #[test]
    fn test_composite_names() {
        assert_eq!(
            Route::parse("geojson.getClusterExpansionZoom"),
            Some(Route::Source {
                source_type: "geojson".into(),
                method: "getClusterExpansionZoom".into(),
            })
        );
        assert_eq!(Route::parse("bogus"), None);
        assert_eq!(Route::parse(".loadTile"), None);
        assert_eq!(Route::parse("vector."), None);
    }
}
