//! Viewer configuration, read from a TOML file.
//!
//! Every field has a default, so a partial file (or no file at all) is valid:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [render]
//! vsync = true
//!
//! [[scene.objects]]
//! model = "models/quad.obj"
//! translation = [0.0, 0.5, 0.0]
//! scale = [3.0, 1.0, 3.0]
//! ```

use crate::error::EngineResult;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "viewer.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub camera: CameraConfig,
    pub scene: SceneConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: String::from("Vulkan Tutorial"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Force FIFO presentation instead of preferring MAILBOX.
    pub vsync: bool,
    pub validation: bool,
    /// Directory holding the compiled `.spv` shaders.
    pub shader_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: false,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub start_position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 50.0,
            near: 0.1,
            far: 100.0,
            start_position: [0.0, 0.0, -2.5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub objects: Vec<ObjectConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            objects: vec![ObjectConfig {
                model: PathBuf::from("models/quad.obj"),
                translation: [0.0, 0.5, 0.0],
                scale: [3.0, 1.0, 3.0],
                ..Default::default()
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub model: PathBuf,
    pub translation: [f32; 3],
    /// Tait-Bryan angles in radians, applied Y, X, Z.
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub color: [f32; 3],
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            color: [0.0; 3],
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Loads `path` if it exists, falls back to the defaults otherwise.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Loading config from {}", path.display());
            Self::load(path)
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
