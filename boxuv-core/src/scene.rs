//! Scene objects carrying meshes, loaded from a TOML scene file
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::storage::AssetGuid;
use crate::transform::{LocalTransform, ObjectTransform, RotationState};

/// Stable identity of a scene object across sessions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// What the tracker needs from the host scene.
pub trait SceneGraph {
    /// GUID of the mesh the object currently renders, if it has one.
    fn active_mesh(&self, key: &ObjectKey) -> Option<AssetGuid>;

    /// Returns `false` when the object does not exist.
    fn set_active_mesh(&mut self, key: &ObjectKey, mesh: AssetGuid) -> bool;

    fn world_transform(&self, key: &ObjectKey) -> Option<ObjectTransform>;

    /// `root` and everything below it that carries a mesh, in scene order.
    fn mesh_descendants(&self, root: &ObjectKey) -> Vec<ObjectKey>;
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to access scene {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scene {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize scene: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("duplicate object id {0}")]
    DuplicateId(ObjectKey),

    #[error("object {child} names unknown parent {parent}")]
    UnknownParent { child: ObjectKey, parent: ObjectKey },

    #[error("object {0} is its own ancestor")]
    Cycle(ObjectKey),
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn is_zero(v: &[f32; 3]) -> bool {
    *v == [0.0; 3]
}

/// One object in the scene file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectKey>,
    /// Active mesh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<AssetGuid>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub position: [f32; 3],
    /// Euler angles in degrees
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rotation: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl SceneObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ObjectKey::new(id),
            name: None,
            parent: None,
            mesh: None,
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: unit_scale(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(ObjectKey::new(parent));
        self
    }

    pub fn with_mesh(mut self, mesh: AssetGuid) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_scale(mut self, scale: [f32; 3]) -> Self {
        self.scale = scale;
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn local_transform(&self) -> LocalTransform {
        LocalTransform {
            translation: Vector3::from(self.position),
            rotation: RotationState::from_degrees(self.rotation),
            scale: Vector3::from(self.scale),
        }
    }
}

/// Flat list of objects; hierarchy is expressed through `parent` ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a scene file.
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let scene = Self::from_toml(&text).map_err(|err| match err {
            SceneError::Parse { source, .. } => SceneError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), objects = scene.objects.len(), "loaded scene");
        Ok(scene)
    }

    pub fn from_toml(text: &str) -> Result<Self, SceneError> {
        let scene: Scene = toml::from_str(text).map_err(|source| SceneError::Parse {
            path: "<string>".to_string(),
            source,
        })?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn save(&self, path: &Path) -> Result<(), SceneError> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| SceneError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Append an object; its parent must already be present.
    pub fn add(&mut self, object: SceneObject) -> Result<(), SceneError> {
        if self.get(&object.id).is_some() {
            return Err(SceneError::DuplicateId(object.id));
        }
        if let Some(parent) = &object.parent {
            if self.get(parent).is_none() {
                return Err(SceneError::UnknownParent {
                    child: object.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
        self.objects.push(object);
        Ok(())
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&SceneObject> {
        self.objects.iter().find(|o| &o.id == key)
    }

    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| &o.id == key)
    }

    pub fn children<'a>(&'a self, key: &'a ObjectKey) -> impl Iterator<Item = &'a SceneObject> + 'a {
        self.objects
            .iter()
            .filter(move |o| o.parent.as_ref() == Some(key))
    }

    /// `root` followed by all of its descendants, depth first.
    pub fn descendants(&self, root: &ObjectKey) -> Vec<ObjectKey> {
        let mut out = Vec::new();
        if self.get(root).is_none() {
            return out;
        }
        let mut stack = vec![root.clone()];
        while let Some(key) = stack.pop() {
            let children: Vec<ObjectKey> = self.children(&key).map(|c| c.id.clone()).collect();
            stack.extend(children.into_iter().rev());
            out.push(key);
        }
        out
    }

    /// Objects without a parent, in file order.
    pub fn roots(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(|o| o.parent.is_none())
    }

    fn validate(&self) -> Result<(), SceneError> {
        let mut seen = HashSet::new();
        for object in &self.objects {
            if !seen.insert(&object.id) {
                return Err(SceneError::DuplicateId(object.id.clone()));
            }
        }

        for object in &self.objects {
            let mut steps = 0;
            let mut current = object;
            while let Some(parent) = &current.parent {
                current = self.get(parent).ok_or_else(|| SceneError::UnknownParent {
                    child: current.id.clone(),
                    parent: parent.clone(),
                })?;
                steps += 1;
                if steps > self.objects.len() {
                    return Err(SceneError::Cycle(object.id.clone()));
                }
            }
        }
        Ok(())
    }
}

impl SceneGraph for Scene {
    fn active_mesh(&self, key: &ObjectKey) -> Option<AssetGuid> {
        self.get(key).and_then(|o| o.mesh.clone())
    }

    fn set_active_mesh(&mut self, key: &ObjectKey, mesh: AssetGuid) -> bool {
        match self.get_mut(key) {
            Some(object) => {
                object.mesh = Some(mesh);
                true
            }
            None => false,
        }
    }

    fn world_transform(&self, key: &ObjectKey) -> Option<ObjectTransform> {
        let mut current = self.get(key)?;
        let mut chain = vec![current];
        while let Some(parent) = &current.parent {
            if chain.len() > self.objects.len() {
                return None;
            }
            current = self.get(parent)?;
            chain.push(current);
        }

        Some(
            chain
                .iter()
                .rev()
                .fold(ObjectTransform::identity(), |world, object| {
                    world.child(&object.local_transform())
                }),
        )
    }

    fn mesh_descendants(&self, root: &ObjectKey) -> Vec<ObjectKey> {
        self.descendants(root)
            .into_iter()
            .filter(|key| self.active_mesh(key).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    const SCENE: &str = r#"
[[objects]]
id = "level"
scale = [2.0, 2.0, 2.0]

[[objects]]
id = "wall"
parent = "level"
mesh = "aaaa"
position = [1.0, 0.0, 0.0]
scale = [1.0, 3.0, 0.5]

[[objects]]
id = "trim"
parent = "wall"
mesh = "bbbb"

[[objects]]
id = "lamp"
parent = "level"
"#;

    #[test]
    fn test_parse_scene() {
        let scene = Scene::from_toml(SCENE).unwrap();
        assert_eq!(scene.objects.len(), 4);
        assert_eq!(scene.roots().count(), 1);
        let wall = scene.get(&"wall".into()).unwrap();
        assert_eq!(wall.rotation, [0.0; 3]);
        assert_eq!(wall.display_name(), "wall");
    }

    #[test]
    fn test_descendants_and_mesh_filter() {
        let scene = Scene::from_toml(SCENE).unwrap();
        let all: Vec<_> = scene.descendants(&"level".into());
        assert_eq!(
            all,
            vec![
                ObjectKey::from("level"),
                ObjectKey::from("wall"),
                ObjectKey::from("trim"),
                ObjectKey::from("lamp"),
            ]
        );
        let with_mesh = scene.mesh_descendants(&"level".into());
        assert_eq!(with_mesh, vec![ObjectKey::from("wall"), ObjectKey::from("trim")]);
        assert!(scene.mesh_descendants(&"nope".into()).is_empty());
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let scene = Scene::from_toml(SCENE).unwrap();
        let trim = scene.world_transform(&"trim".into()).unwrap();
        assert_eq!(trim.lossy_scale, Vector3::new(2.0, 6.0, 1.0));

        let origin = trim.transform_point(&Point3::origin());
        assert!((origin - Point3::new(2.0, 0.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn test_set_active_mesh() {
        let mut scene = Scene::from_toml(SCENE).unwrap();
        assert!(scene.set_active_mesh(&"lamp".into(), AssetGuid::new("cccc")));
        assert_eq!(scene.active_mesh(&"lamp".into()), Some(AssetGuid::new("cccc")));
        assert!(!scene.set_active_mesh(&"ghost".into(), AssetGuid::new("cccc")));
    }

    #[test]
    fn test_rejects_bad_hierarchies() {
        let dup = "[[objects]]\nid = \"a\"\n[[objects]]\nid = \"a\"\n";
        assert!(matches!(Scene::from_toml(dup), Err(SceneError::DuplicateId(_))));

        let orphan = "[[objects]]\nid = \"a\"\nparent = \"b\"\n";
        assert!(matches!(Scene::from_toml(orphan), Err(SceneError::UnknownParent { .. })));

        let cycle = "[[objects]]\nid = \"a\"\nparent = \"b\"\n[[objects]]\nid = \"b\"\nparent = \"a\"\n";
        assert!(matches!(Scene::from_toml(cycle), Err(SceneError::Cycle(_))));
    }

    #[test]
    fn test_add_requires_existing_parent() {
        let mut scene = Scene::new();
        scene.add(SceneObject::new("root")).unwrap();
        scene.add(SceneObject::new("child").with_parent("root")).unwrap();
        assert!(scene.add(SceneObject::new("child")).is_err());
        assert!(scene.add(SceneObject::new("x").with_parent("missing")).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.toml");
        let scene = Scene::from_toml(SCENE).unwrap();
        scene.save(&path).unwrap();
        assert_eq!(Scene::load(&path).unwrap(), scene);
    }
}
