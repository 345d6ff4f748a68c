//! Best-effort persistence of positions and filter state over an injected
//! key-value store. Store failures are logged and swallowed here; layout
//! never waits on or fails because of storage.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PersistConfig;
use crate::filter::{Filters, GraphConfig};
use crate::ir::GraphData;
use crate::layout::LayoutKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage quota exceeded while writing `{key}`")]
    QuotaExceeded { key: String },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// String key-value storage, in the shape of a browser's local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
    offline: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the total stored bytes past `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    /// Every call fails with `StoreError::Unavailable`.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = self
                .entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StoreError::QuotaExceeded { key: key.to_string() });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.base_path.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for_key(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_path)?;
        fs::write(self.path_for_key(key), value)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for_key(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredPosition {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f32>,
}

pub type StoredPositions = BTreeMap<String, StoredPosition>;

pub fn snapshot_positions(data: &GraphData) -> StoredPositions {
    data.nodes
        .values()
        .map(|node| {
            (
                node.id.clone(),
                StoredPosition {
                    x: node.x,
                    y: node.y,
                    fx: node.fx,
                    fy: node.fy,
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone)]
struct PendingWrite {
    due: Instant,
    positions: StoredPositions,
}

/// Debounced position writer plus filter-state blob, keyed under the
/// configured prefix.
#[derive(Debug)]
pub struct PositionStore<S> {
    store: S,
    key_prefix: String,
    debounce: Duration,
    pending: BTreeMap<LayoutKind, PendingWrite>,
}

impl<S: KeyValueStore> PositionStore<S> {
    pub fn new(store: S, config: &PersistConfig) -> Self {
        Self {
            store,
            key_prefix: config.key_prefix.clone(),
            debounce: Duration::from_millis(config.debounce_ms),
            pending: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn positions_key(&self, kind: LayoutKind) -> String {
        format!("{}positions.{}", self.key_prefix, kind.as_str())
    }

    pub fn filters_key(&self) -> String {
        format!("{}filters", self.key_prefix)
    }

    /// Queue a snapshot of `data` for `kind`. A later call for the same kind
    /// replaces the snapshot and restarts the quiet period.
    pub fn schedule(&mut self, kind: LayoutKind, data: &GraphData, now: Instant) {
        self.pending.insert(
            kind,
            PendingWrite {
                due: now + self.debounce,
                positions: snapshot_positions(data),
            },
        );
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Write every queued snapshot whose quiet period has elapsed. Returns
    /// how many were written successfully.
    pub fn flush_due(&mut self, now: Instant) -> usize {
        let due: Vec<LayoutKind> = self
            .pending
            .iter()
            .filter(|(_, write)| write.due <= now)
            .map(|(kind, _)| *kind)
            .collect();
        self.write_pending(&due)
    }

    pub fn flush_all(&mut self) -> usize {
        let all: Vec<LayoutKind> = self.pending.keys().copied().collect();
        self.write_pending(&all)
    }

    fn write_pending(&mut self, kinds: &[LayoutKind]) -> usize {
        let mut written = 0;
        for kind in kinds {
            let Some(write) = self.pending.remove(kind) else {
                continue;
            };
            let key = self.positions_key(*kind);
            let result = serde_json::to_string(&write.positions)
                .map_err(StoreError::from)
                .and_then(|json| self.store.set(&key, &json));
            match result {
                Ok(()) => written += 1,
                Err(err) => tracing::warn!(%key, error = %err, "failed to persist positions"),
            }
        }
        written
    }

    /// Stored positions for `kind`; missing or corrupt data reads as empty.
    pub fn load_positions(&self, kind: LayoutKind) -> StoredPositions {
        let key = self.positions_key(kind);
        self.read_json(&key).unwrap_or_default()
    }

    /// Copy stored positions onto matching nodes. Returns how many nodes
    /// were restored.
    pub fn restore(&self, kind: LayoutKind, data: &mut GraphData) -> usize {
        let stored = self.load_positions(kind);
        let mut restored = 0;
        for (id, position) in stored {
            if let Some(node) = data.nodes.get_mut(&id) {
                node.x = position.x;
                node.y = position.y;
                node.fx = position.fx;
                node.fy = position.fy;
                restored += 1;
            }
        }
        restored
    }

    pub fn clear_positions(&mut self, kind: LayoutKind) {
        self.pending.remove(&kind);
        let key = self.positions_key(kind);
        if let Err(err) = self.store.delete(&key) {
            tracing::warn!(%key, error = %err, "failed to clear positions");
        }
    }

    pub fn save_filters(&mut self, filters: &Filters) -> bool {
        let key = self.filters_key();
        let result = serde_json::to_string(filters)
            .map_err(StoreError::from)
            .and_then(|json| self.store.set(&key, &json));
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%key, error = %err, "failed to persist filters");
                false
            }
        }
    }

    /// Stored filters layered over the config defaults. Kinds the blob does
    /// not mention keep their configured visibility.
    pub fn load_filters(&self, config: &GraphConfig) -> Filters {
        let defaults = Filters::for_config(config);
        let key = self.filters_key();
        let Some(mut filters) = self.read_json::<Filters>(&key) else {
            return defaults;
        };
        for (kind, visible) in defaults.node_kinds {
            filters.node_kinds.entry(kind).or_insert(visible);
        }
        for (kind, visible) in defaults.edge_kinds {
            filters.edge_kinds.entry(kind).or_insert(visible);
        }
        filters
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(%key, error = %err, "failed to read persisted state");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%key, error = %err, "ignoring corrupt persisted state");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;

    fn graph() -> GraphData {
        let mut pinned = Node::new("a", "container").with_position(10.0, 20.0);
        pinned.pin();
        GraphData::new()
            .with_node(pinned)
            .with_node(Node::new("b", "volume").with_position(30.0, 40.0))
    }

    fn store() -> PositionStore<MemoryStore> {
        PositionStore::new(MemoryStore::new(), &PersistConfig::default())
    }

    #[test]
    fn writes_wait_for_the_quiet_period() {
        let mut positions = store();
        let start = Instant::now();
        positions.schedule(LayoutKind::Structured, &graph(), start);
        assert_eq!(positions.flush_due(start + Duration::from_millis(100)), 0);
        positions.schedule(LayoutKind::Structured, &graph(), start + Duration::from_millis(300));
        assert_eq!(positions.flush_due(start + Duration::from_millis(600)), 0);
        assert_eq!(positions.flush_due(start + Duration::from_millis(800)), 1);
        assert!(!positions.has_pending());
        assert_eq!(positions.store().len(), 1);
    }

    #[test]
    fn positions_round_trip_per_layout_kind() {
        let mut positions = store();
        positions.schedule(LayoutKind::Community, &graph(), Instant::now());
        assert_eq!(positions.flush_all(), 1);
        assert_eq!(
            positions.positions_key(LayoutKind::Community),
            "topograph.v1.positions.community"
        );

        let mut fresh = GraphData::new()
            .with_node(Node::new("a", "container"))
            .with_node(Node::new("c", "image"));
        assert_eq!(positions.restore(LayoutKind::Community, &mut fresh), 1);
        assert_eq!((fresh.nodes["a"].x, fresh.nodes["a"].y), (10.0, 20.0));
        assert!(fresh.nodes["a"].is_pinned());
        assert!(positions.load_positions(LayoutKind::Force).is_empty());
    }

    #[test]
    fn clearing_one_kind_keeps_the_others() {
        let mut positions = store();
        positions.schedule(LayoutKind::Force, &graph(), Instant::now());
        positions.schedule(LayoutKind::Structured, &graph(), Instant::now());
        assert_eq!(positions.flush_all(), 2);
        positions.schedule(LayoutKind::Force, &graph(), Instant::now());
        positions.clear_positions(LayoutKind::Force);
        assert!(!positions.has_pending());

        let kv = positions.into_inner();
        assert_eq!(kv.len(), 1);
        assert!(kv.get("topograph.v1.positions.force").unwrap().is_none());
        assert!(kv.get("topograph.v1.positions.structured").unwrap().is_some());
    }

    #[test]
    fn corrupt_blobs_fall_back_to_defaults() {
        let mut kv = MemoryStore::new();
        kv.set("topograph.v1.positions.force", "{not json").unwrap();
        kv.set("topograph.v1.filters", "[1,2,3]").unwrap();
        let positions = PositionStore::new(kv, &PersistConfig::default());
        assert!(positions.load_positions(LayoutKind::Force).is_empty());
        let config = GraphConfig::inventory();
        assert_eq!(positions.load_filters(&config), Filters::for_config(&config));
    }

    #[test]
    fn store_failures_are_swallowed() {
        let mut offline = PositionStore::new(MemoryStore::offline(), &PersistConfig::default());
        offline.schedule(LayoutKind::Force, &graph(), Instant::now());
        assert_eq!(offline.flush_all(), 0);
        assert!(!offline.save_filters(&Filters::default()));
        assert!(offline.load_positions(LayoutKind::Force).is_empty());

        let mut full =
            PositionStore::new(MemoryStore::new().with_quota(16), &PersistConfig::default());
        full.schedule(LayoutKind::Force, &graph(), Instant::now());
        assert_eq!(full.flush_all(), 0);
        assert!(full.store().is_empty());
    }

    #[test]
    fn quota_error_names_the_key() {
        let mut kv = MemoryStore::new().with_quota(4);
        let err = kv.set("key", "value").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { ref key } if key == "key"));
    }

    #[test]
    fn filters_keep_configured_kinds_missing_from_blob() {
        let config = GraphConfig::inventory();
        let mut positions = store();
        let mut filters = Filters::for_config(&config);
        filters.search = "web".to_string();
        filters.node_kinds.clear();
        filters.node_kinds.insert("volume".to_string(), false);
        assert!(positions.save_filters(&filters));

        let loaded = positions.load_filters(&config);
        assert_eq!(loaded.search, "web");
        assert!(!loaded.node_kind_visible("volume"));
        assert_eq!(loaded.node_kinds.len(), config.node_kinds.len());
    }

    #[test]
    fn file_store_reads_missing_keys_as_none() {
        let dir = std::env::temp_dir().join(format!("topograph-store-{}", std::process::id()));
        let mut kv = FileStore::new(&dir);
        assert_eq!(kv.get("topograph.v1.filters").unwrap(), None);
        kv.set("topograph.v1.filters", "{}").unwrap();
        assert_eq!(kv.get("topograph.v1.filters").unwrap().as_deref(), Some("{}"));
        kv.delete("topograph.v1.filters").unwrap();
        kv.delete("topograph.v1.filters").unwrap();
        let _ = fs::remove_dir_all(&dir);
    }
}
