//! Configuration system
//!
//! Every section has defaults that reproduce the viewer's built-in behavior,
//! so a missing or partial file is never an error.

use std::path::{Path, PathBuf};

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            ConfigFormat::Ron => {
                ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
            }
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Top-level viewer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Scene settings
    pub scene: SceneConfig,
}

impl Config for ViewerConfig {}

impl ViewerConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renderer.validate()?;
        self.scene.validate()
    }
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title; the frame rate is appended at runtime
    pub title: String,
    /// Initial client width in pixels
    pub width: u32,
    /// Initial client height in pixels
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Scene Viewer".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

impl WindowConfig {
    /// Validate window settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid {
                field: "window.width/height",
                reason: format!("{}x{} has zero area", self.width, self.height),
            });
        }
        Ok(())
    }
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Requested number of swapchain back buffers
    pub frame_buffer_count: u32,
    /// Wait for vertical blank; when `false` and supported, present with tearing
    pub vsync: bool,
    /// Enable validation layers (debug builds only)
    pub enable_validation: bool,
    /// Back buffer clear color (linear RGBA)
    pub clear_color: [f32; 4],
    /// Directory holding compiled SPIR-V shaders
    pub shader_dir: PathBuf,
    /// Distance at which the ground grid fades out
    pub grid_fade_distance: f32,
    /// Number of texture slots in the shader-visible descriptor heap
    pub descriptor_heap_capacity: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_buffer_count: 3,
            vsync: true,
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            shader_dir: PathBuf::from("target/shaders"),
            grid_fade_distance: 80.0,
            descriptor_heap_capacity: 256,
        }
    }
}

impl RendererConfig {
    /// Validate renderer settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=8).contains(&self.frame_buffer_count) {
            return Err(ConfigError::Invalid {
                field: "renderer.frame_buffer_count",
                reason: format!("{} is outside 2..=8", self.frame_buffer_count),
            });
        }
        if self.descriptor_heap_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "renderer.descriptor_heap_capacity",
                reason: "must hold at least the fallback texture".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve a shader file name against [`RendererConfig::shader_dir`]
    #[must_use]
    pub fn shader_path(&self, file_name: &str) -> PathBuf {
        self.shader_dir.join(file_name)
    }
}

/// Scene settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Model file to load (`.obj`, `.gltf`, `.glb`)
    pub model_path: PathBuf,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane distance
    pub near_plane: f32,
    /// Far clip plane as a multiple of the model's bounding radius
    pub far_radius_multiplier: f32,
    /// Global ambient light intensity
    pub ambient: f32,
    /// Blinn-Phong instead of Phong specular
    pub blinn_phong: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/models/mountain1/mountain.obj"),
            fov_degrees: 45.0,
            near_plane: 0.1,
            far_radius_multiplier: 10.0,
            ambient: 0.1,
            blinn_phong: true,
        }
    }
}

impl SceneConfig {
    /// Validate scene settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=179.0).contains(&self.fov_degrees) {
            return Err(ConfigError::Invalid {
                field: "scene.fov_degrees",
                reason: format!("{} is outside 1..=179", self.fov_degrees),
            });
        }
        if self.near_plane <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "scene.near_plane",
                reason: "must be positive".to_string(),
            });
        }
        if self.far_radius_multiplier <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "scene.far_radius_multiplier",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
