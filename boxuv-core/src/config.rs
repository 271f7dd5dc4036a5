//! Project configuration (`boxuv.toml`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::settings::ProjectionSettings;
use crate::storage::{AssetPath, StorageError};

pub const CONFIG_FILE: &str = "boxuv.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid save folder: {0}")]
    SaveFolder(#[source] StorageError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub projection: ProjectionSettings,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Locations of project files, relative to the project directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_assets")]
    pub assets: PathBuf,
    /// Asset folder derived meshes are created in, relative to `assets`
    #[serde(default = "default_save_folder")]
    pub save_folder: String,
    #[serde(default = "default_store")]
    pub store: PathBuf,
    #[serde(default = "default_scene")]
    pub scene: PathBuf,
}

fn default_assets() -> PathBuf {
    PathBuf::from("assets")
}
fn default_save_folder() -> String {
    "AutoUV/Meshes".to_string()
}
fn default_store() -> PathBuf {
    PathBuf::from("boxuv-bindings.json")
}
fn default_scene() -> PathBuf {
    PathBuf::from("scene.toml")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            save_folder: default_save_folder(),
            store: default_store(),
            scene: default_scene(),
        }
    }
}

impl PathsConfig {
    pub fn save_folder(&self) -> Result<AssetPath, ConfigError> {
        AssetPath::new(&self.save_folder).map_err(ConfigError::SaveFolder)
    }
}

impl Config {
    /// Read `boxuv.toml` from `project`. A missing file yields defaults;
    /// out-of-range projection values are clamped.
    pub fn load(project: &Path) -> Result<Self, ConfigError> {
        let path = project.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.projection = config.projection.clamped();
        Ok(config)
    }

    pub fn save(&self, project: &Path) -> Result<(), ConfigError> {
        let path = project.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn assets_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.paths.assets)
    }

    pub fn store_path(&self, project: &Path) -> PathBuf {
        project.join(&self.paths.store)
    }

    pub fn scene_path(&self, project: &Path) -> PathBuf {
        project.join(&self.paths.scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!((config.projection.tiling_factor() - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.projection.tiling_range(), 2);
        assert!(config.projection.ignore_object_rotation());
        assert_eq!(config.paths.assets, PathBuf::from("assets"));
        assert_eq!(config.paths.save_folder().unwrap().as_str(), "AutoUV/Meshes");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[paths]\nassets = \"content\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.paths.assets, PathBuf::from("content"));
        assert_eq!(config.paths.store, PathBuf::from("boxuv-bindings.json"));
        assert_eq!(config.projection, ProjectionSettings::default());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[projection]\ntiling_factor = 500.0\ntiling_range = 1\nuv_offset = [1.5, -0.5]\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert!((config.projection.tiling_factor() - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.projection.uv_offset().x, 1.0);
        assert_eq!(config.projection.uv_offset().y, 0.0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.projection.set_tiling_factor(0.25);
        config.projection.set_ignore_object_rotation(false);
        config.save(dir.path()).unwrap();

        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[projection\n").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::Parse { .. })));
    }
}
