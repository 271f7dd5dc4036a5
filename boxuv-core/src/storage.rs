//! Mesh asset storage
//!
//! Meshes live as assets addressed by a relative [`AssetPath`] and by a
//! stable [`AssetGuid`] that survives process restarts. Creating a new asset
//! and overwriting an existing one are separate operations so that live
//! refreshes reuse a single slot instead of piling up files.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::geometry::{DerivedMesh, SourceMesh};

/// File extension of mesh assets
pub const MESH_EXTENSION: &str = "mesh.json";

const META_EXTENSION: &str = "meta";

/// Forward-slash separated path relative to the asset root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(String);

impl AssetPath {
    /// Normalize separators and reject paths that escape the asset root.
    pub fn new(path: impl AsRef<str>) -> Result<Self, StorageError> {
        let raw = path.as_ref();
        let normalized = raw.replace('\\', "/");
        let trimmed = normalized.trim_end_matches('/');
        if trimmed.is_empty()
            || trimmed.starts_with('/')
            || trimmed.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(StorageError::InvalidPath(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, name: &str) -> Result<Self, StorageError> {
        Self::new(format!("{}/{}", self.0, name))
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('/').map(|(parent, _)| Self(parent.to_string()))
    }

    /// `Folder/Name.mesh.json` becomes `Folder/Name n.mesh.json`.
    fn numbered(&self, n: usize) -> Self {
        let suffix = format!(".{MESH_EXTENSION}");
        let (stem, ext) = match self.0.strip_suffix(&suffix) {
            Some(stem) => (stem, suffix.as_str()),
            None => match self.0.rfind('.') {
                Some(dot) if dot > self.0.rfind('/').map_or(0, |s| s + 1) => self.0.split_at(dot),
                _ => (self.0.as_str(), ""),
            },
        };
        Self(format!("{stem} {n}{ext}"))
    }

    fn to_fs(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable content identifier of a stored asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetGuid(String);

impl AssetGuid {
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    /// GUID assigned to an asset first created at `path`.
    pub fn for_path(path: &AssetPath) -> Self {
        let digest = Sha256::digest(path.as_str().as_bytes());
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid asset path {0:?}")]
    InvalidPath(String),

    #[error("asset not found: {0}")]
    NotFound(AssetPath),

    #[error("no asset with GUID {0}")]
    UnknownGuid(AssetGuid),

    #[error("asset already exists: {0}")]
    AlreadyExists(AssetPath),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed asset {path}: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk form of a mesh. Source meshes leave the UV channels empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshAsset {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uv0: Vec<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uv1: Vec<[f32; 2]>,
}

impl MeshAsset {
    /// Geometry usable as projection input; any UVs are dropped.
    pub fn to_source(&self) -> SourceMesh {
        SourceMesh {
            name: self.name.clone(),
            positions: self.positions.iter().map(|p| Point3::from(*p)).collect(),
            normals: self.normals.iter().map(|n| Vector3::from(*n)).collect(),
            indices: self.indices.clone(),
        }
    }

    pub fn to_derived(&self) -> DerivedMesh {
        let uv = |channel: &[[f32; 2]]| -> Vec<Vector2<f32>> {
            channel.iter().map(|t| Vector2::from(*t)).collect()
        };
        DerivedMesh {
            name: self.name.clone(),
            positions: self.positions.iter().map(|p| Point3::from(*p)).collect(),
            normals: self.normals.iter().map(|n| Vector3::from(*n)).collect(),
            uv0: uv(&self.uv0),
            uv1: uv(&self.uv1),
            indices: self.indices.clone(),
        }
    }
}

impl From<&SourceMesh> for MeshAsset {
    fn from(mesh: &SourceMesh) -> Self {
        Self {
            name: mesh.name.clone(),
            positions: mesh.positions.iter().map(|p| [p.x, p.y, p.z]).collect(),
            normals: mesh.normals.iter().map(|n| [n.x, n.y, n.z]).collect(),
            indices: mesh.indices.clone(),
            uv0: Vec::new(),
            uv1: Vec::new(),
        }
    }
}

impl From<&DerivedMesh> for MeshAsset {
    fn from(mesh: &DerivedMesh) -> Self {
        Self {
            name: mesh.name.clone(),
            positions: mesh.positions.iter().map(|p| [p.x, p.y, p.z]).collect(),
            normals: mesh.normals.iter().map(|n| [n.x, n.y, n.z]).collect(),
            indices: mesh.indices.clone(),
            uv0: mesh.uv0.iter().map(|t| [t.x, t.y]).collect(),
            uv1: mesh.uv1.iter().map(|t| [t.x, t.y]).collect(),
        }
    }
}

/// Host asset database the tracker persists meshes through.
pub trait AssetStorage {
    fn load(&self, path: &AssetPath) -> Result<MeshAsset, StorageError>;

    fn exists(&self, path: &AssetPath) -> bool;

    fn guid_to_path(&self, guid: &AssetGuid) -> Option<AssetPath>;

    fn path_to_guid(&self, path: &AssetPath) -> Option<AssetGuid>;

    fn is_folder(&self, folder: &AssetPath) -> bool;

    /// Create `folder` and any missing parents.
    fn ensure_folder(&mut self, folder: &AssetPath) -> Result<(), StorageError>;

    /// Store a new asset at a path that must not be taken yet.
    fn create(&mut self, path: &AssetPath, asset: &MeshAsset) -> Result<AssetGuid, StorageError>;

    /// Replace the contents of an existing asset, keeping its GUID.
    ///
    /// Implementations may defer the write until [`AssetStorage::save`].
    fn overwrite(&mut self, path: &AssetPath, asset: &MeshAsset) -> Result<(), StorageError>;

    /// Flush deferred writes.
    fn save(&mut self) -> Result<(), StorageError>;

    /// First free path derived from `desired` by numbering it.
    fn unique_path(&self, desired: &AssetPath) -> AssetPath {
        if !self.exists(desired) {
            return desired.clone();
        }
        (1..)
            .map(|n| desired.numbered(n))
            .find(|candidate| !self.exists(candidate))
            .unwrap_or_else(|| desired.clone())
    }

    fn load_by_guid(&self, guid: &AssetGuid) -> Result<MeshAsset, StorageError> {
        let path = self
            .guid_to_path(guid)
            .ok_or_else(|| StorageError::UnknownGuid(guid.clone()))?;
        self.load(&path)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    guid: AssetGuid,
}

/// Assets stored as JSON files under a root directory, each with a
/// `.meta` sidecar holding its GUID.
#[derive(Debug)]
pub struct FsAssetStorage {
    root: PathBuf,
    guids: HashMap<AssetGuid, AssetPath>,
    paths: HashMap<AssetPath, AssetGuid>,
    pending: BTreeMap<AssetPath, MeshAsset>,
}

impl FsAssetStorage {
    /// Open (and create if needed) an asset root and index its GUIDs.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;

        let mut storage = Self {
            root,
            guids: HashMap::new(),
            paths: HashMap::new(),
            pending: BTreeMap::new(),
        };
        storage.reindex()?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the GUID index from the sidecars on disk.
    pub fn reindex(&mut self) -> Result<(), StorageError> {
        self.guids.clear();
        self.paths.clear();

        for entry in walkdir::WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable asset entry: {err}");
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            let Some(asset) = relative.strip_suffix(&format!(".{META_EXTENSION}")) else {
                continue;
            };

            let text = std::fs::read_to_string(entry.path())
                .map_err(|source| io_error(entry.path(), source))?;
            let meta: MetaFile = match serde_json::from_str(&text) {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), "ignoring malformed meta file: {err}");
                    continue;
                }
            };
            let path = AssetPath::new(asset)?;
            self.guids.insert(meta.guid.clone(), path.clone());
            self.paths.insert(path, meta.guid);
        }

        tracing::debug!(root = %self.root.display(), assets = self.guids.len(), "indexed assets");
        Ok(())
    }

    fn write_asset(&self, path: &AssetPath, asset: &MeshAsset) -> Result<(), StorageError> {
        let file = path.to_fs(&self.root);
        let json = serde_json::to_string(asset).map_err(|source| StorageError::Format {
            path: path.to_string(),
            source,
        })?;
        std::fs::write(&file, json).map_err(|source| io_error(&file, source))
    }
}

fn meta_path(asset_file: &Path) -> PathBuf {
    let mut name = asset_file.as_os_str().to_owned();
    name.push(format!(".{META_EXTENSION}"));
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl AssetStorage for FsAssetStorage {
    fn load(&self, path: &AssetPath) -> Result<MeshAsset, StorageError> {
        if let Some(asset) = self.pending.get(path) {
            return Ok(asset.clone());
        }
        let file = path.to_fs(&self.root);
        if !file.is_file() {
            return Err(StorageError::NotFound(path.clone()));
        }
        let text = std::fs::read_to_string(&file).map_err(|source| io_error(&file, source))?;
        serde_json::from_str(&text).map_err(|source| StorageError::Format {
            path: path.to_string(),
            source,
        })
    }

    fn exists(&self, path: &AssetPath) -> bool {
        path.to_fs(&self.root).exists()
    }

    fn guid_to_path(&self, guid: &AssetGuid) -> Option<AssetPath> {
        self.guids.get(guid).cloned()
    }

    fn path_to_guid(&self, path: &AssetPath) -> Option<AssetGuid> {
        self.paths.get(path).cloned()
    }

    fn is_folder(&self, folder: &AssetPath) -> bool {
        folder.to_fs(&self.root).is_dir()
    }

    fn ensure_folder(&mut self, folder: &AssetPath) -> Result<(), StorageError> {
        let dir = folder.to_fs(&self.root);
        if dir.is_file() {
            return Err(StorageError::InvalidPath(folder.to_string()));
        }
        std::fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))
    }

    fn create(&mut self, path: &AssetPath, asset: &MeshAsset) -> Result<AssetGuid, StorageError> {
        if self.exists(path) {
            return Err(StorageError::AlreadyExists(path.clone()));
        }
        if let Some(parent) = path.parent() {
            if !self.is_folder(&parent) {
                return Err(StorageError::NotFound(parent));
            }
        }

        self.write_asset(path, asset)?;

        let guid = AssetGuid::for_path(path);
        let meta_file = meta_path(&path.to_fs(&self.root));
        let meta = serde_json::to_string_pretty(&MetaFile { guid: guid.clone() }).map_err(|source| {
            StorageError::Format {
                path: path.to_string(),
                source,
            }
        })?;
        std::fs::write(&meta_file, meta).map_err(|source| io_error(&meta_file, source))?;

        self.guids.insert(guid.clone(), path.clone());
        self.paths.insert(path.clone(), guid.clone());
        tracing::debug!(%path, %guid, "created asset");
        Ok(guid)
    }

    fn overwrite(&mut self, path: &AssetPath, asset: &MeshAsset) -> Result<(), StorageError> {
        if !self.pending.contains_key(path) && !self.exists(path) {
            return Err(StorageError::NotFound(path.clone()));
        }
        self.pending.insert(path.clone(), asset.clone());
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        let pending = std::mem::take(&mut self.pending);
        for (path, asset) in &pending {
            self.write_asset(path, asset)?;
        }
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "saved modified assets");
        }
        Ok(())
    }
}

/// In-memory storage, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAssetStorage {
    assets: BTreeMap<AssetPath, MeshAsset>,
    guids: BTreeMap<AssetGuid, AssetPath>,
    folders: BTreeSet<AssetPath>,
    /// Number of `create` calls that succeeded
    pub created: usize,
    /// Number of `overwrite` calls that succeeded
    pub overwritten: usize,
}

impl MemoryAssetStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Store a mesh (creating its folder) and return its GUID.
    pub fn insert_source(&mut self, path: &str, mesh: &SourceMesh) -> Result<AssetGuid, StorageError> {
        let path = AssetPath::new(path)?;
        if let Some(parent) = path.parent() {
            self.ensure_folder(&parent)?;
        }
        self.create(&path, &MeshAsset::from(mesh))
    }

    /// Drop an asset as if it had been deleted outside the tool.
    pub fn remove(&mut self, path: &AssetPath) {
        self.assets.remove(path);
        self.guids.retain(|_, p| p != path);
    }
}

impl AssetStorage for MemoryAssetStorage {
    fn load(&self, path: &AssetPath) -> Result<MeshAsset, StorageError> {
        self.assets
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.clone()))
    }

    fn exists(&self, path: &AssetPath) -> bool {
        self.assets.contains_key(path) || self.folders.contains(path)
    }

    fn guid_to_path(&self, guid: &AssetGuid) -> Option<AssetPath> {
        self.guids.get(guid).cloned()
    }

    fn path_to_guid(&self, path: &AssetPath) -> Option<AssetGuid> {
        self.guids
            .iter()
            .find(|(_, p)| *p == path)
            .map(|(guid, _)| guid.clone())
    }

    fn is_folder(&self, folder: &AssetPath) -> bool {
        self.folders.contains(folder)
    }

    fn ensure_folder(&mut self, folder: &AssetPath) -> Result<(), StorageError> {
        if self.assets.contains_key(folder) {
            return Err(StorageError::InvalidPath(folder.to_string()));
        }
        let mut current = Some(folder.clone());
        while let Some(dir) = current {
            current = dir.parent();
            self.folders.insert(dir);
        }
        Ok(())
    }

    fn create(&mut self, path: &AssetPath, asset: &MeshAsset) -> Result<AssetGuid, StorageError> {
        if self.exists(path) {
            return Err(StorageError::AlreadyExists(path.clone()));
        }
        if let Some(parent) = path.parent() {
            if !self.folders.contains(&parent) {
                return Err(StorageError::NotFound(parent));
            }
        }
        let guid = AssetGuid::for_path(path);
        self.assets.insert(path.clone(), asset.clone());
        self.guids.insert(guid.clone(), path.clone());
        self.created += 1;
        Ok(guid)
    }

    fn overwrite(&mut self, path: &AssetPath, asset: &MeshAsset) -> Result<(), StorageError> {
        let slot = self
            .assets
            .get_mut(path)
            .ok_or_else(|| StorageError::NotFound(path.clone()))?;
        *slot = asset.clone();
        self.overwritten += 1;
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
