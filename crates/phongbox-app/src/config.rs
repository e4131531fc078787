// SPDX-License-Identifier: CEPL-1.0
use std::f32::consts::PI;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use phongbox_math::{Light, OrbitCamera, Vec3};
use phongbox_render_vk::VkConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("window size must be non-zero, got {width}x{height}")]
    EmptyWindow { width: u32, height: u32 },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "phongbox".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub shader_dir: Option<PathBuf>,
    /// Radians per second about +Y.
    pub spin_rate: f32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let vk = VkConfig::default();
        Self {
            clear_color: vk.clear_color,
            vsync: vk.vsync,
            shader_dir: None,
            spin_rate: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LightCfg {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Default for LightCfg {
    fn default() -> Self {
        let light = Light::default();
        Self {
            position: light.position.to_array(),
            color: light.color.to_array(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CameraCfg {
    pub radius: f32,
    pub theta: f32,
    pub phi: f32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            radius: 5.0,
            theta: 1.5 * PI,
            phi: 0.25 * PI,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub light: LightCfg,
    pub camera: CameraCfg,
}

impl AppConfig {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        if cfg.window.width == 0 || cfg.window.height == 0 {
            return Err(ConfigError::EmptyWindow {
                width: cfg.window.width,
                height: cfg.window.height,
            });
        }
        Ok(cfg)
    }

    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let cfg = Self::parse(path, &text)?;
                info!("config loaded from {}", path.display());
                Ok(cfg)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no config at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// `shader_dir` from the command line wins over the file.
    pub fn vk_config(&self, shader_dir: Option<PathBuf>) -> VkConfig {
        VkConfig {
            clear_color: self.render.clear_color,
            vsync: self.render.vsync,
            shader_dir: shader_dir.or_else(|| self.render.shader_dir.clone()),
        }
    }

    pub fn camera(&self) -> OrbitCamera {
        OrbitCamera::new(self.camera.radius, self.camera.theta, self.camera.phi)
    }

    pub fn light(&self) -> Light {
        Light {
            position: Vec3::from_array(self.light.position),
            color: Vec3::from_array(self.light.color),
        }
    }
}
