//! A project directory: config, scene, asset root and binding store

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use boxuv_core::config::CONFIG_FILE;
use boxuv_core::obj::write_obj;
use boxuv_core::stl::load_stl;
use boxuv_core::{
    AssetGuid, AssetPath, AssetStorage, BatchReport, BindingStore, Config, FsAssetStorage, Gesture, MeshAsset,
    ObjectKey, Refresh, Revert, Scene, SceneGraph, SceneObject, Session, SourceMesh,
};

/// Asset folder imported meshes are placed in
const IMPORT_FOLDER: &str = "Imported";

pub struct Project {
    dir: PathBuf,
    pub config: Config,
    pub scene: Scene,
    pub session: Session<FsAssetStorage>,
}

impl Project {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let config = Config::load(&dir)?;

        let storage = FsAssetStorage::open(config.assets_dir(&dir))
            .with_context(|| format!("Failed to open asset root in {}", dir.display()))?;
        let store = BindingStore::open(config.store_path(&dir));

        let scene_path = config.scene_path(&dir);
        let scene = if scene_path.exists() {
            Scene::load(&scene_path)?
        } else {
            tracing::debug!(path = %scene_path.display(), "no scene file, starting empty");
            Scene::new()
        };

        let session = Session::open(storage, store, config.paths.save_folder()?)
            .context("Failed to load mesh bindings")?;

        Ok(Self {
            dir,
            config,
            scene,
            session,
        })
    }

    /// Write a default config (unless one exists) and open the project.
    pub fn init(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        if !dir.join(CONFIG_FILE).exists() {
            Config::default().save(&dir)?;
            tracing::info!(path = %dir.join(CONFIG_FILE).display(), "wrote default config");
        }
        Self::open(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_scene(&self) -> Result<()> {
        self.scene.save(&self.config.scene_path(&self.dir))?;
        Ok(())
    }

    /// Persist projection settings and flush bindings and assets.
    pub fn commit_settings(&mut self) -> Result<()> {
        self.config.save(&self.dir)?;
        self.session.save()?;
        Ok(())
    }

    fn require(&self, id: &str) -> Result<ObjectKey> {
        let key = ObjectKey::from(id);
        if self.scene.get(&key).is_none() {
            bail!("No object '{id}' in the scene");
        }
        Ok(key)
    }

    /// Store `mesh` as a new asset and add an object showing it.
    pub fn add_mesh(&mut self, id: &str, parent: Option<&str>, mesh: &SourceMesh) -> Result<AssetGuid> {
        if self.scene.get(&ObjectKey::from(id)).is_some() {
            bail!("Object '{id}' already exists");
        }

        let storage = self.session.storage_mut();
        let folder = AssetPath::new(IMPORT_FOLDER)?;
        storage.ensure_folder(&folder)?;
        let path = storage.unique_path(&folder.join(&format!("{}.mesh.json", mesh.name))?);
        let guid = storage.create(&path, &MeshAsset::from(mesh))?;

        let mut object = SceneObject::new(id).with_mesh(guid.clone());
        if let Some(parent) = parent {
            object = object.with_parent(parent);
        }
        self.scene.add(object)?;
        self.save_scene()?;
        tracing::info!(object = id, %path, "added mesh");
        Ok(guid)
    }

    pub fn import_stl(&mut self, file: &Path, id: Option<&str>, parent: Option<&str>) -> Result<AssetGuid> {
        let mesh = load_stl(file)?;
        let id = id.map_or_else(|| mesh.name.clone(), str::to_string);
        self.add_mesh(&id, parent, &mesh)
    }

    /// Objects with geometry under `root`, or in the whole scene.
    pub fn targets(&self, root: Option<&str>) -> Result<Vec<ObjectKey>> {
        match root {
            Some(root) => Ok(self.scene.mesh_descendants(&self.require(root)?)),
            None => Ok(self
                .scene
                .roots()
                .flat_map(|r| self.scene.mesh_descendants(&r.id))
                .collect()),
        }
    }

    pub fn generate(&mut self, root: Option<&str>) -> Result<BatchReport> {
        let keys = self.targets(root)?;
        let report = self
            .session
            .batch_generate(&mut self.scene, &keys, &self.config.projection)?;
        self.save_scene()?;
        Ok(report)
    }

    pub fn refresh(&mut self, id: &str) -> Result<Refresh> {
        let key = self.require(id)?;
        let refresh = self
            .session
            .refresh_object(&mut self.scene, &key, &self.config.projection)?;
        self.session.save()?;
        self.save_scene()?;
        Ok(refresh)
    }

    /// Refresh every tracked object, e.g. after the settings changed.
    pub fn refresh_all(&mut self) -> Result<usize> {
        let keys: Vec<ObjectKey> = self.session.bindings().map(|(key, _)| key.clone()).collect();
        let mut refreshed = 0;
        for key in &keys {
            if let Refresh::Applied(_) = self
                .session
                .refresh_object(&mut self.scene, key, &self.config.projection)?
            {
                refreshed += 1;
            }
        }
        self.session.save()?;
        self.save_scene()?;
        Ok(refreshed)
    }

    pub fn revert(&mut self, id: &str) -> Result<Revert> {
        let key = self.require(id)?;
        let revert = self.session.revert(&key)?;
        if let Revert::Restored(original) = &revert {
            self.scene.set_active_mesh(&key, original.clone());
            self.save_scene()?;
        }
        Ok(revert)
    }

    pub fn revert_all(&mut self, root: Option<&str>) -> Result<usize> {
        let keys = match root {
            Some(_) => self.targets(root)?,
            None => self.session.bindings().map(|(key, _)| key.clone()).collect(),
        };
        let restored = self.session.revert_all(&mut self.scene, &keys)?;
        self.save_scene()?;
        Ok(restored)
    }

    /// Rescale an object as one scale gesture: capture, resize, refresh,
    /// save.
    pub fn rescale(&mut self, id: &str, scale: [f32; 3]) -> Result<Refresh> {
        let key = self.require(id)?;
        let mut gesture = Gesture::new();
        if !gesture.pointer_down(&mut self.session, &self.scene, &key)? {
            bail!("Object '{id}' has no mesh");
        }
        if let Some(object) = self.scene.get_mut(&key) {
            object.scale = scale;
        }
        let refresh = gesture.drag(&mut self.session, &mut self.scene, &self.config.projection)?;
        gesture.pointer_up(&mut self.session)?;
        self.save_scene()?;
        Ok(refresh)
    }

    /// Write the active mesh of `id` as OBJ. The mesh must carry UVs.
    pub fn export_obj(&self, id: &str, out: &Path) -> Result<()> {
        let key = self.require(id)?;
        let Some(guid) = self.scene.active_mesh(&key) else {
            bail!("Object '{id}' has no mesh");
        };
        let asset = self.session.storage().load_by_guid(&guid)?;
        if asset.uv0.is_empty() {
            bail!("Object '{id}' has no generated UVs; run `boxuv generate` first");
        }
        write_obj(&asset.to_derived(), out).with_context(|| format!("Failed to write {}", out.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxuv_core::BindingState;

    fn project_with_cubes(dir: &Path) -> Project {
        let mut project = Project::init(dir).unwrap();
        project.scene.add(SceneObject::new("room")).unwrap();
        project
            .add_mesh("box_a", Some("room"), &SourceMesh::cube(1.0))
            .unwrap();
        project
            .add_mesh("box_b", Some("room"), &SourceMesh::cube(2.0))
            .unwrap();
        project
    }

    #[test]
    fn test_init_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        Project::init(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert!(dir.path().join("assets").is_dir());
    }

    #[test]
    fn test_generate_and_revert_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_with_cubes(dir.path());

        let report = project.generate(Some("room")).unwrap();
        assert_eq!(report.generated, 2);

        let reopened = Project::open(dir.path()).unwrap();
        assert_eq!(
            reopened.session.state(&ObjectKey::from("box_a")),
            BindingState::BoundWithDerived
        );

        assert_eq!(project.revert_all(Some("room")).unwrap(), 2);
        let reopened = Project::open(dir.path()).unwrap();
        assert_eq!(reopened.session.bindings().count(), 0);
    }

    #[test]
    fn test_rescale_reuses_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_with_cubes(dir.path());

        let first = match project.rescale("box_a", [2.0, 1.0, 1.0]).unwrap() {
            Refresh::Applied(r) => r,
            Refresh::NotTracked => panic!("expected a refresh"),
        };
        let second = match project.rescale("box_a", [3.0, 1.0, 1.0]).unwrap() {
            Refresh::Applied(r) => r,
            Refresh::NotTracked => panic!("expected a refresh"),
        };
        assert_eq!(first.slot, second.slot);
        assert!(!second.created);
        assert_ne!(first.mesh.uv0, second.mesh.uv0);
    }

    #[test]
    fn test_export_requires_uvs() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_with_cubes(dir.path());
        let out = dir.path().join("box.obj");

        assert!(project.export_obj("box_a", &out).is_err());
        project.generate(None).unwrap();
        project.export_obj("box_a", &out).unwrap();
        assert!(std::fs::read_to_string(&out).unwrap().starts_with("o Cube"));
    }

    #[test]
    fn test_unknown_object_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::init(dir.path()).unwrap();
        assert!(project.refresh("ghost").is_err());
    }
}
