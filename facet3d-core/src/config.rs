/// Renderer and viewport configuration.
///
/// Every field has a default, so partial JSON documents are accepted.
/// Environment variables can override the most common toggles.
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::normalize_or_zero;
use crate::projection::{Camera, ProjectionMode};

/// Presentation policy applied when faces are turned into draw commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Material fill with lighting, textures and opacity
    #[default]
    Normal,
    /// Greyscale by depth, near faces bright
    Depth,
    /// Outlines only
    Wireframe,
    /// Material fill, every face fully opaque
    Solid,
}

impl RenderMode {
    /// The next mode in a fixed cycle, for UI toggles
    pub fn next(self) -> Self {
        match self {
            RenderMode::Normal => RenderMode::Depth,
            RenderMode::Depth => RenderMode::Wireframe,
            RenderMode::Wireframe => RenderMode::Solid,
            RenderMode::Solid => RenderMode::Normal,
        }
    }
}

/// Toggles and thresholds read once at the start of every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub mode: RenderMode,
    pub backface_culling: bool,
    /// Split crossing triangles from different objects
    pub intersections: bool,
    /// Emit markers along the seams of split pairs
    pub show_intersection_lines: bool,
    /// Outline every face on top of its fill
    pub wireframe: bool,
    /// Faces whose depth keys differ by at least this much are never tested against each other
    pub intersection_threshold: f32,
    /// Depth difference treated as a tie when sorting
    pub depth_tie_epsilon: f32,
    /// How far past edge-on a face may turn away before it is culled
    pub cull_epsilon: f32,
    /// Extent below which a mesh counts as flat and is never culled
    pub flat_epsilon: f32,
    /// Direction the light travels in
    pub light_direction: [f32; 3],
    pub ambient: f32,
    pub marker_samples: usize,
    pub marker_padding: f32,
    pub marker_radius: f32,
    pub stroke_width: f32,
}

impl RenderSettings {
    pub fn light(&self) -> Vector3<f32> {
        normalize_or_zero(&Vector3::from(self.light_direction))
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::Normal,
            backface_culling: true,
            intersections: true,
            show_intersection_lines: false,
            wireframe: false,
            intersection_threshold: 2.0,
            depth_tie_epsilon: 1e-3,
            cull_epsilon: 0.01,
            flat_epsilon: 1e-5,
            light_direction: [-0.5, -1.0, -0.75],
            ambient: 0.35,
            marker_samples: 16,
            marker_padding: 0.1,
            marker_radius: 1.5,
            stroke_width: 1.0,
        }
    }
}

/// Surface size and camera parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub projection: ProjectionMode,
}

impl ViewportConfig {
    /// Apply to a camera through its single viewport entry point
    pub fn apply(&self, camera: &mut Camera) {
        camera.setup_for_viewport(self.width, self.height, self.fov, self.near, self.far, self.zoom);
        camera.set_mode(self.projection);
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fov: 45.0,
            near: 0.1,
            far: 1000.0,
            zoom: 1.0,
            projection: ProjectionMode::Perspective,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderSettings,
    pub viewport: ViewportConfig,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Override fields from `FACET3D_*` environment variables, then validate
    /// the result. Unparsable values leave the current setting alone.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(mode) = var("FACET3D_MODE").and_then(|v| parse_mode(&v)) {
            self.render.mode = mode;
        }
        if let Some(culling) = var("FACET3D_CULLING").and_then(|v| parse_bool(&v)) {
            self.render.backface_culling = culling;
        }
        if let Some(intersections) = var("FACET3D_INTERSECTIONS").and_then(|v| parse_bool(&v)) {
            self.render.intersections = intersections;
        }
        if let Some(width) = var("FACET3D_WIDTH").and_then(|v| v.parse().ok()) {
            self.viewport.width = width;
        }
        if let Some(height) = var("FACET3D_HEIGHT").and_then(|v| v.parse().ok()) {
            self.viewport.height = height;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.viewport;
        if v.width == 0 || v.height == 0 {
            return Err(ConfigError::Invalid("viewport must be at least 1x1".into()));
        }
        if !(v.near > 0.0 && v.far > v.near) {
            return Err(ConfigError::Invalid(format!(
                "clip range must satisfy 0 < near < far (near {}, far {})",
                v.near, v.far
            )));
        }
        if !(v.fov > 0.0 && v.fov < 180.0) {
            return Err(ConfigError::Invalid(format!("fov {} out of (0, 180)", v.fov)));
        }
        if !(0.0..=1.0).contains(&self.render.ambient) {
            return Err(ConfigError::Invalid("ambient must be in [0, 1]".into()));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn parse_mode(value: &str) -> Option<RenderMode> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase())).ok()
}
