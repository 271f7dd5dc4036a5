//! Mesh-binding tracker
//!
//! A [`Session`] remembers, per scene object, which mesh it had before box
//! projection was first applied (the original) and where the generated mesh
//! lives (the slot). Refreshes always project from the original and rewrite
//! the same slot, so repeated scale drags neither compound nor pile up
//! assets. Reverting hands the original back and forgets the binding.
//!
//! Every change to the set of bindings is written to the [`BindingStore`]
//! before the operation returns, so the original survives a restart.

use std::collections::BTreeMap;

use crate::geometry::{DerivedMesh, SourceMesh};
use crate::projection::project;
use crate::scene::{ObjectKey, SceneGraph};
use crate::settings::ProjectionSettings;
use crate::storage::{AssetGuid, AssetPath, AssetStorage, MeshAsset, StorageError, MESH_EXTENSION};
use crate::store::{BindingStore, MeshMapping, StoreError};
use crate::transform::ObjectTransform;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("original mesh {guid} of {key} could not be loaded: {source}")]
    OriginalUnavailable {
        key: ObjectKey,
        guid: AssetGuid,
        #[source]
        source: StorageError,
    },

    #[error("original mesh {guid} of {key} no longer exists")]
    OriginalMissing { key: ObjectKey, guid: AssetGuid },

    #[error("original mesh {guid} of {key} is malformed")]
    MalformedMesh { key: ObjectKey, guid: AssetGuid },
}

/// Where an object is in its tracking lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    BoundNoDerived,
    BoundWithDerived,
}

/// Original mesh of one object and the slot of its derived mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub original: AssetGuid,
    pub derived: Option<AssetPath>,
}

impl Binding {
    pub fn state(&self) -> BindingState {
        match self.derived {
            Some(_) => BindingState::BoundWithDerived,
            None => BindingState::BoundNoDerived,
        }
    }
}

/// A freshly projected mesh and the slot it was written to
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub mesh: DerivedMesh,
    pub slot: AssetPath,
    /// GUID to install as the object's active mesh
    pub guid: AssetGuid,
    /// Whether the slot was allocated by this call
    pub created: bool,
}

#[derive(Debug, Clone)]
pub enum Refresh {
    /// The object has no binding; nothing was done.
    NotTracked,
    Applied(Refreshed),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revert {
    NothingToRevert,
    /// GUID of the original mesh to install again
    Restored(AssetGuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The object has no mesh, or its mesh no longer exists
    NoGeometry,
    /// The mesh has no vertices or no triangles
    Degenerate,
    Failed(String),
}

/// Outcome of [`Session::batch_generate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub generated: usize,
    pub skipped: Vec<(ObjectKey, SkipReason)>,
}

impl BatchReport {
    pub fn count(&self, reason: &SkipReason) -> usize {
        self.skipped.iter().filter(|(_, r)| r == reason).count()
    }
}

/// Binding map plus the storage and store it persists through.
#[derive(Debug)]
pub struct Session<S> {
    storage: S,
    store: BindingStore,
    save_folder: AssetPath,
    bindings: BTreeMap<ObjectKey, Binding>,
}

impl<S: AssetStorage> Session<S> {
    /// Load bindings from `store`, dropping any whose original mesh no
    /// longer resolves.
    pub fn open(storage: S, store: BindingStore, save_folder: AssetPath) -> Result<Self, TrackerError> {
        let mut session = Self {
            storage,
            store,
            save_folder,
            bindings: BTreeMap::new(),
        };
        session.reload()?;
        Ok(session)
    }

    /// Reread the store, discarding in-memory state.
    pub fn reload(&mut self) -> Result<(), TrackerError> {
        self.store.invalidate();
        let records = self.store.records()?.to_vec();

        self.bindings.clear();
        for record in records {
            if record.object_id.is_empty() {
                tracing::warn!("ignoring binding record without an object id");
                continue;
            }
            let original = AssetGuid::new(record.original_mesh_guid);
            if self.storage.guid_to_path(&original).is_none() {
                tracing::warn!(
                    object = %record.object_id,
                    %original,
                    "dropping binding whose original mesh no longer exists"
                );
                continue;
            }
            let derived = match record.derived_mesh_path.as_str() {
                "" => None,
                path => match AssetPath::new(path) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        tracing::warn!(object = %record.object_id, "ignoring derived mesh path: {err}");
                        None
                    }
                },
            };
            self.bindings
                .insert(ObjectKey::new(record.object_id), Binding { original, derived });
        }

        tracing::debug!(bindings = self.bindings.len(), "loaded bindings");
        Ok(())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn store(&self) -> &BindingStore {
        &self.store
    }

    pub fn save_folder(&self) -> &AssetPath {
        &self.save_folder
    }

    pub fn binding(&self, key: &ObjectKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&ObjectKey, &Binding)> {
        self.bindings.iter()
    }

    pub fn state(&self, key: &ObjectKey) -> BindingState {
        self.bindings
            .get(key)
            .map_or(BindingState::Unbound, Binding::state)
    }

    /// Record `current` as the original of `key` unless one is already
    /// recorded, and return the recorded original.
    pub fn get_or_create_original(
        &mut self,
        key: &ObjectKey,
        current: &AssetGuid,
    ) -> Result<AssetGuid, TrackerError> {
        if let Some(binding) = self.bindings.get(key) {
            return Ok(binding.original.clone());
        }

        self.bindings.insert(
            key.clone(),
            Binding {
                original: current.clone(),
                derived: None,
            },
        );
        if let Err(err) = self.flush() {
            self.bindings.remove(key);
            return Err(err);
        }
        tracing::info!(object = %key, original = %current, "captured original mesh");
        Ok(current.clone())
    }

    /// Re-project the original mesh of `key` into its slot.
    pub fn refresh(
        &mut self,
        key: &ObjectKey,
        settings: &ProjectionSettings,
        transform: &ObjectTransform,
    ) -> Result<Refresh, TrackerError> {
        let Some(binding) = self.bindings.get(key) else {
            tracing::debug!(object = %key, "refresh skipped, object is not tracked");
            return Ok(Refresh::NotTracked);
        };

        let source = self.load_original(key, &binding.original.clone())?;
        let refreshed = self.apply(key, &source, settings, transform)?;
        if refreshed.created {
            self.flush()?;
        }
        Ok(Refresh::Applied(refreshed))
    }

    /// Refresh `key` using its world transform from `scene` and install the
    /// result as its active mesh.
    pub fn refresh_object<G: SceneGraph>(
        &mut self,
        scene: &mut G,
        key: &ObjectKey,
        settings: &ProjectionSettings,
    ) -> Result<Refresh, TrackerError> {
        let Some(transform) = scene.world_transform(key) else {
            return Ok(Refresh::NotTracked);
        };
        let refresh = self.refresh(key, settings, &transform)?;
        if let Refresh::Applied(refreshed) = &refresh {
            scene.set_active_mesh(key, refreshed.guid.clone());
        }
        Ok(refresh)
    }

    /// Forget the binding of `key` and return its original mesh.
    ///
    /// The derived slot is left in storage.
    pub fn revert(&mut self, key: &ObjectKey) -> Result<Revert, TrackerError> {
        let Some(binding) = self.bindings.remove(key) else {
            tracing::info!(object = %key, "nothing to revert");
            return Ok(Revert::NothingToRevert);
        };

        if self.storage.guid_to_path(&binding.original).is_none() {
            let guid = binding.original.clone();
            self.bindings.insert(key.clone(), binding);
            return Err(TrackerError::OriginalMissing {
                key: key.clone(),
                guid,
            });
        }

        if let Err(err) = self.flush() {
            self.bindings.insert(key.clone(), binding);
            return Err(err);
        }
        tracing::info!(object = %key, original = %binding.original, "reverted to original mesh");
        Ok(Revert::Restored(binding.original))
    }

    /// Revert every key and reinstall the originals in `scene`. Returns how
    /// many objects were restored; failures are logged and skipped.
    pub fn revert_all<G: SceneGraph>(
        &mut self,
        scene: &mut G,
        keys: &[ObjectKey],
    ) -> Result<usize, TrackerError> {
        let mut restored = 0;
        for key in keys {
            match self.revert(key) {
                Ok(Revert::Restored(original)) => {
                    scene.set_active_mesh(key, original);
                    restored += 1;
                }
                Ok(Revert::NothingToRevert) => {}
                Err(TrackerError::Store(err)) => return Err(err.into()),
                Err(err) => tracing::warn!(object = %key, "revert failed: {err}"),
            }
        }
        Ok(restored)
    }

    /// Capture, project and install a derived mesh for each key in turn.
    ///
    /// Objects that cannot be processed are skipped and reported; they do
    /// not stop the batch. The store is flushed once at the end.
    pub fn batch_generate<G: SceneGraph>(
        &mut self,
        scene: &mut G,
        keys: &[ObjectKey],
        settings: &ProjectionSettings,
    ) -> Result<BatchReport, TrackerError> {
        let mut report = BatchReport::default();

        for key in keys {
            match self.generate_one(scene, key, settings) {
                Ok(()) => report.generated += 1,
                Err(reason) => {
                    match &reason {
                        SkipReason::Failed(err) => tracing::warn!(object = %key, "generation failed: {err}"),
                        other => tracing::debug!(object = %key, ?other, "skipped"),
                    }
                    report.skipped.push((key.clone(), reason));
                }
            }
        }

        self.flush()?;
        self.storage.save()?;
        tracing::info!(
            generated = report.generated,
            skipped = report.skipped.len(),
            "box projection complete"
        );
        Ok(report)
    }

    fn generate_one<G: SceneGraph>(
        &mut self,
        scene: &mut G,
        key: &ObjectKey,
        settings: &ProjectionSettings,
    ) -> Result<(), SkipReason> {
        let current = scene.active_mesh(key).ok_or(SkipReason::NoGeometry)?;
        let transform = scene.world_transform(key).ok_or(SkipReason::NoGeometry)?;

        let original = self
            .bindings
            .get(key)
            .map_or_else(|| current.clone(), |b| b.original.clone());
        let source = self
            .storage
            .load_by_guid(&original)
            .map_err(|err| match err {
                StorageError::UnknownGuid(_) | StorageError::NotFound(_) => SkipReason::NoGeometry,
                err => SkipReason::Failed(err.to_string()),
            })?
            .to_source();
        if source.is_degenerate() {
            return Err(SkipReason::Degenerate);
        }
        if !source.is_well_formed() {
            return Err(SkipReason::Failed(format!("mesh {original} is malformed")));
        }

        let newly_bound = !self.bindings.contains_key(key);
        if newly_bound {
            self.bindings.insert(
                key.clone(),
                Binding {
                    original,
                    derived: None,
                },
            );
        }

        match self.apply(key, &source, settings, &transform) {
            Ok(refreshed) => {
                scene.set_active_mesh(key, refreshed.guid);
                Ok(())
            }
            Err(err) => {
                if newly_bound {
                    self.bindings.remove(key);
                }
                Err(SkipReason::Failed(err.to_string()))
            }
        }
    }

    /// Write bindings to the store and flush pending asset writes.
    pub fn save(&mut self) -> Result<(), TrackerError> {
        self.flush()?;
        self.storage.save()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TrackerError> {
        let records = self
            .bindings
            .iter()
            .map(|(key, binding)| MeshMapping {
                object_id: key.to_string(),
                original_mesh_guid: binding.original.to_string(),
                derived_mesh_path: binding
                    .derived
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
            .collect();
        self.store.replace(records)?;
        Ok(())
    }

    fn load_original(&self, key: &ObjectKey, guid: &AssetGuid) -> Result<SourceMesh, TrackerError> {
        let asset = self
            .storage
            .load_by_guid(guid)
            .map_err(|source| TrackerError::OriginalUnavailable {
                key: key.clone(),
                guid: guid.clone(),
                source,
            })?;
        let mesh = asset.to_source();
        if !mesh.is_well_formed() {
            return Err(TrackerError::MalformedMesh {
                key: key.clone(),
                guid: guid.clone(),
            });
        }
        Ok(mesh)
    }

    /// Project `source` and write it to the slot of `key`, allocating the
    /// slot if there is none yet or it has vanished from storage.
    fn apply(
        &mut self,
        key: &ObjectKey,
        source: &SourceMesh,
        settings: &ProjectionSettings,
        transform: &ObjectTransform,
    ) -> Result<Refreshed, TrackerError> {
        let mesh = project(source, transform, settings);
        let asset = MeshAsset::from(&mesh);

        let existing = self.bindings.get(key).and_then(|b| b.derived.clone());
        if let Some(slot) = &existing {
            if self.storage.exists(slot) {
                self.storage.overwrite(slot, &asset)?;
                let guid = self
                    .storage
                    .path_to_guid(slot)
                    .ok_or_else(|| StorageError::NotFound(slot.clone()))?;
                return Ok(Refreshed {
                    mesh,
                    slot: slot.clone(),
                    guid,
                    created: false,
                });
            }
            tracing::warn!(object = %key, %slot, "derived mesh is gone, allocating a new one");
        }

        self.storage.ensure_folder(&self.save_folder)?;
        let file_name = format!("{}_AutoUV.{MESH_EXTENSION}", mesh.name.replace(['/', '\\'], "_"));
        let slot = self.storage.unique_path(&self.save_folder.join(&file_name)?);
        let guid = self.storage.create(&slot, &asset)?;
        if let Some(binding) = self.bindings.get_mut(key) {
            binding.derived = Some(slot.clone());
        }
        tracing::info!(object = %key, %slot, "created derived mesh");

        Ok(Refreshed {
            mesh,
            slot,
            guid,
            created: true,
        })
    }
}

/// One scale drag on one object.
///
/// Pointer-down captures the original and flushes the store before any
/// drag can refresh; pointer-up saves once all drags are done.
#[derive(Debug, Default)]
pub struct Gesture {
    target: Option<ObjectKey>,
}

impl Gesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<&ObjectKey> {
        self.target.as_ref()
    }

    /// Returns `false` when the object has no mesh to track.
    pub fn pointer_down<S: AssetStorage, G: SceneGraph>(
        &mut self,
        session: &mut Session<S>,
        scene: &G,
        key: &ObjectKey,
    ) -> Result<bool, TrackerError> {
        let Some(current) = scene.active_mesh(key) else {
            return Ok(false);
        };
        session.get_or_create_original(key, &current)?;
        self.target = Some(key.clone());
        Ok(true)
    }

    /// Refresh the gesture's object. Ignored outside a gesture.
    pub fn drag<S: AssetStorage, G: SceneGraph>(
        &mut self,
        session: &mut Session<S>,
        scene: &mut G,
        settings: &ProjectionSettings,
    ) -> Result<Refresh, TrackerError> {
        match &self.target {
            Some(key) => session.refresh_object(scene, key, settings),
            None => Ok(Refresh::NotTracked),
        }
    }

    pub fn pointer_up<S: AssetStorage>(&mut self, session: &mut Session<S>) -> Result<(), TrackerError> {
        if self.target.take().is_some() {
            session.save()?;
        }
        Ok(())
    }
}
