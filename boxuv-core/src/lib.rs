/// boxuv Core Library - box projection and mesh binding tracking
///
/// This library projects meshes onto the six faces of a cube to produce
/// texture coordinates, and tracks, per scene object, the original mesh a
/// derived mesh was generated from so it can be regenerated or reverted.

pub mod config;
pub mod geometry;
pub mod obj;
pub mod projection;
pub mod scene;
pub mod settings;
pub mod stl;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod transform;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use geometry::{DerivedMesh, SourceMesh, Triangle, Vertex};
pub use projection::{project, Direction};
pub use scene::{ObjectKey, Scene, SceneError, SceneGraph, SceneObject};
pub use settings::{ProjectionSettings, ProjectionSpace, TILING_RANGES};
pub use storage::{AssetGuid, AssetPath, AssetStorage, FsAssetStorage, MemoryAssetStorage, MeshAsset, StorageError};
pub use store::{BindingStore, MeshMapping, StoreError};
pub use tracker::{
    BatchReport, Binding, BindingState, Gesture, Refresh, Refreshed, Revert, Session, SkipReason, TrackerError,
};
pub use transform::{LocalTransform, ObjectTransform, RotationState};
