use std::path::Path;

use boxuv_core::{
    AssetPath, AssetStorage, BindingState, BindingStore, Config, FsAssetStorage, ObjectKey, Revert, Scene,
    SceneGraph, SceneObject, Session, SourceMesh, MeshAsset,
};

fn open_session(project: &Path, config: &Config) -> Session<FsAssetStorage> {
    let storage = FsAssetStorage::open(config.assets_dir(project)).unwrap();
    let store = BindingStore::open(config.store_path(project));
    Session::open(storage, store, config.paths.save_folder().unwrap()).unwrap()
}

fn setup(project: &Path) -> (Config, Scene) {
    let config = Config::default();
    let mut storage = FsAssetStorage::open(config.assets_dir(project)).unwrap();
    let props = AssetPath::new("Props").unwrap();
    storage.ensure_folder(&props).unwrap();
    let crate_mesh = storage
        .create(&props.join("Crate.mesh.json").unwrap(), &MeshAsset::from(&SourceMesh::cube(1.0)))
        .unwrap();

    let mut scene = Scene::new();
    scene.add(SceneObject::new("level")).unwrap();
    for id in ["crate_a", "crate_b"] {
        scene
            .add(
                SceneObject::new(id)
                    .with_parent("level")
                    .with_mesh(crate_mesh.clone())
                    .with_scale([2.0, 1.0, 1.0]),
            )
            .unwrap();
    }
    scene.save(&config.scene_path(project)).unwrap();
    (config, scene)
}

#[test]
fn bindings_survive_reopening_the_project() {
    let dir = tempfile::tempdir().unwrap();
    let (config, mut scene) = setup(dir.path());
    let original = scene.active_mesh(&ObjectKey::from("crate_a")).unwrap();

    {
        let mut session = open_session(dir.path(), &config);
        let keys = scene.mesh_descendants(&ObjectKey::from("level"));
        let report = session
            .batch_generate(&mut scene, &keys, &config.projection)
            .unwrap();
        assert_eq!(report.generated, 2);
        scene.save(&config.scene_path(dir.path())).unwrap();
    }

    let slots: Vec<_> = std::fs::read_dir(dir.path().join("assets/AutoUV/Meshes"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.ends_with(".meta"))
        .collect();
    assert_eq!(slots.len(), 2);

    let mut scene = Scene::load(&config.scene_path(dir.path())).unwrap();
    let mut session = open_session(dir.path(), &config);
    let key = ObjectKey::from("crate_a");
    assert_eq!(session.state(&key), BindingState::BoundWithDerived);
    assert_ne!(scene.active_mesh(&key), Some(original.clone()));

    assert_eq!(session.revert(&key).unwrap(), Revert::Restored(original.clone()));
    scene.set_active_mesh(&key, original);

    let reopened = open_session(dir.path(), &config);
    assert_eq!(reopened.state(&key), BindingState::Unbound);
    assert_eq!(reopened.state(&ObjectKey::from("crate_b")), BindingState::BoundWithDerived);
}

#[test]
fn refresh_writes_reach_disk_on_save() {
    let dir = tempfile::tempdir().unwrap();
    let (config, mut scene) = setup(dir.path());
    let key = ObjectKey::from("crate_a");

    let mut session = open_session(dir.path(), &config);
    session
        .batch_generate(&mut scene, &[key.clone()], &config.projection)
        .unwrap();
    let slot = session.binding(&key).unwrap().derived.clone().unwrap();
    let before = session.storage().load(&slot).unwrap();

    scene.get_mut(&key).unwrap().scale = [4.0, 1.0, 1.0];
    session
        .refresh_object(&mut scene, &key, &config.projection)
        .unwrap();
    session.save().unwrap();

    let fresh = FsAssetStorage::open(config.assets_dir(dir.path())).unwrap();
    let after = fresh.load(&slot).unwrap();
    assert_ne!(before.uv0, after.uv0);
    assert_eq!(before.positions, after.positions);
}

#[test]
fn deleted_original_drops_binding_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (config, mut scene) = setup(dir.path());
    let key = ObjectKey::from("crate_b");

    let mut session = open_session(dir.path(), &config);
    session
        .batch_generate(&mut scene, &[key.clone()], &config.projection)
        .unwrap();
    drop(session);

    let props = dir.path().join("assets/Props");
    std::fs::remove_file(props.join("Crate.mesh.json")).unwrap();
    std::fs::remove_file(props.join("Crate.mesh.json.meta")).unwrap();

    let session = open_session(dir.path(), &config);
    assert_eq!(session.state(&key), BindingState::Unbound);
}
