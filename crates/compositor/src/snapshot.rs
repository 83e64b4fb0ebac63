//! Persisted list of active overlays, replayed on startup.

use layers::{OverlayConfiguration, OverlayKind};
use serde::{Deserialize, Serialize};
use store::{KeyValueStore, StoreError, load_json, save_json};

use crate::registry::OverlayRegistry;

pub const DEFAULT_SNAPSHOT_KEY: &str = "overlays.snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: OverlayKind,
    pub config: OverlayConfiguration,
}

/// Active overlays in activation order.
pub fn capture(registry: &OverlayRegistry) -> Vec<SnapshotEntry> {
    registry
        .active()
        .into_iter()
        .map(|o| SnapshotEntry {
            kind: o.kind,
            config: o.config.clone(),
        })
        .collect()
}

pub fn load(store: &dyn KeyValueStore, key: &str) -> Result<Vec<SnapshotEntry>, StoreError> {
    Ok(load_json(store, key)?.unwrap_or_default())
}

pub fn save(store: &dyn KeyValueStore, key: &str, entries: &[SnapshotEntry]) -> Result<(), StoreError> {
    save_json(store, key, entries)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use store::InMemoryStore;

    use super::*;

    #[test]
    fn missing_snapshot_is_empty() {
        let store = InMemoryStore::new();
        assert_eq!(load(&store, DEFAULT_SNAPSHOT_KEY).unwrap(), Vec::new());
    }

    #[test]
    fn wire_format_is_kind_and_config() {
        let store = InMemoryStore::new();
        let entries = vec![SnapshotEntry {
            kind: OverlayKind::PressureGradient,
            config: OverlayConfiguration::new().with("opacity", 0.5),
        }];
        save(&store, DEFAULT_SNAPSHOT_KEY, &entries).unwrap();
        assert_eq!(
            store.get(DEFAULT_SNAPSHOT_KEY).unwrap().unwrap(),
            r#"[{"kind":"pressureGradient","config":{"opacity":0.5}}]"#
        );
        assert_eq!(load(&store, DEFAULT_SNAPSHOT_KEY).unwrap(), entries);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let store = InMemoryStore::new();
        store.put(DEFAULT_SNAPSHOT_KEY, "{not json".into()).unwrap();
        assert!(matches!(load(&store, DEFAULT_SNAPSHOT_KEY), Err(StoreError::Corrupt(_))));
    }
}
