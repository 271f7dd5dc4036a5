//! Durable record of which mesh each tracked object started from
//!
//! The store is a single JSON document rewritten wholesale on every save.
//! It is read lazily on first access and can be invalidated so that another
//! view of the same project picks up changes made elsewhere.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One persisted binding. An empty `derived_mesh_path` means no derived
/// mesh has been generated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshMapping {
    pub object_id: String,
    pub original_mesh_guid: String,
    #[serde(default)]
    pub derived_mesh_path: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    mesh_mappings: Vec<MeshMapping>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access binding store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("binding store {path} is malformed: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Handle to the on-disk binding records.
#[derive(Debug)]
pub struct BindingStore {
    path: Option<PathBuf>,
    cache: Option<Vec<MeshMapping>>,
    saves: usize,
}

impl BindingStore {
    /// Store backed by a JSON file. Nothing is read until first access.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cache: None,
            saves: 0,
        }
    }

    /// Store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cache: Some(Vec::new()),
            saves: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of completed saves since this handle was created
    pub fn save_count(&self) -> usize {
        self.saves
    }

    /// Current records, loading them from disk if the cache is cold.
    pub fn records(&mut self) -> Result<&[MeshMapping], StoreError> {
        if self.cache.is_none() {
            self.cache = Some(self.read()?);
        }
        Ok(self.cache.as_deref().unwrap_or_default())
    }

    /// Replace every record and write the store out.
    pub fn replace(&mut self, records: Vec<MeshMapping>) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            write_atomic(path, &StoreData {
                mesh_mappings: records.clone(),
            })?;
        }
        tracing::debug!(records = records.len(), "saved binding store");
        self.cache = Some(records);
        self.saves += 1;
        Ok(())
    }

    /// Drop the cache so the next access rereads the file.
    pub fn invalidate(&mut self) {
        if self.path.is_some() {
            self.cache = None;
        }
    }

    fn read(&self) -> Result<Vec<MeshMapping>, StoreError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "binding store not found, starting empty");
            return Ok(Vec::new());
        }

        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let data: StoreData = serde_json::from_str(&text).map_err(|source| StoreError::Format {
            path: path.display().to_string(),
            source,
        })?;
        Ok(data.mesh_mappings)
    }
}

fn write_atomic(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let io = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let json = serde_json::to_string_pretty(data).map_err(|source| StoreError::Format {
        path: path.display().to_string(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io)?;
    std::fs::rename(&tmp, path).map_err(io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(id: &str, derived: &str) -> MeshMapping {
        MeshMapping {
            object_id: id.to_string(),
            original_mesh_guid: format!("guid-{id}"),
            derived_mesh_path: derived.to_string(),
        }
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BindingStore::open(dir.path().join("bindings.json"));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_replace_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/bindings.json");

        let mut store = BindingStore::open(&path);
        store
            .replace(vec![mapping("wall", "Meshes/Wall_AutoUV.mesh.json"), mapping("floor", "")])
            .unwrap();
        assert_eq!(store.save_count(), 1);

        let mut reopened = BindingStore::open(&path);
        let records = reopened.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], mapping("wall", "Meshes/Wall_AutoUV.mesh.json"));
        assert_eq!(records[1].derived_mesh_path, "");
    }

    #[test]
    fn test_invalidate_picks_up_external_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json");

        let mut first = BindingStore::open(&path);
        let mut second = BindingStore::open(&path);
        assert!(second.records().unwrap().is_empty());

        first.replace(vec![mapping("crate", "")]).unwrap();
        assert!(second.records().unwrap().is_empty());

        second.invalidate();
        assert_eq!(second.records().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_derived_path_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json");
        std::fs::write(
            &path,
            r#"{ "mesh_mappings": [ { "object_id": "a", "original_mesh_guid": "g" } ] }"#,
        )
        .unwrap();

        let mut store = BindingStore::open(&path);
        assert_eq!(store.records().unwrap()[0].derived_mesh_path, "");
    }

    #[test]
    fn test_malformed_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.json");
        std::fs::write(&path, "not json").unwrap();

        let mut store = BindingStore::open(&path);
        assert!(matches!(store.records(), Err(StoreError::Format { .. })));
    }

    #[test]
    fn test_in_memory_store() {
        let mut store = BindingStore::in_memory();
        store.replace(vec![mapping("x", "")]).unwrap();
        store.invalidate();
        assert_eq!(store.records().unwrap().len(), 1);
    }
}
