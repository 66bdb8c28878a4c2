/// Materials, textures and the per-face texture pattern cache.
///
/// Texture loading happens outside the frame loop. The host inserts a
/// [`Texture`] into the [`TextureStore`], starts fetching it however it likes,
/// and later reports [`TextureStore::complete`] or [`TextureStore::fail`].
/// The renderer only ever reads the current [`TextureState`]; anything not yet
/// loaded renders with the material's base color.
use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::scene::NodeKey;

/// Opacity below which a material is considered transparent
pub const OPAQUE_THRESHOLD: f32 = 0.999;

/// Linear RGB color, each channel in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
    pub const GREY: Color = Color::new(0.6, 0.6, 0.6);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build from a `0xRRGGBB` literal
    pub fn from_hex(hex: u32) -> Self {
        Self::new(
            ((hex >> 16) & 0xff) as f32 / 255.0,
            ((hex >> 8) & 0xff) as f32 / 255.0,
            (hex & 0xff) as f32 / 255.0,
        )
    }

    /// Multiply every channel by `factor`, clamped to `[0, 1]`
    pub fn scale(&self, factor: f32) -> Self {
        Self::new(
            (self.r * factor).clamp(0.0, 1.0),
            (self.g * factor).clamp(0.0, 1.0),
            (self.b * factor).clamp(0.0, 1.0),
        )
    }

    /// Perceived brightness (Rec. 709 weights)
    pub fn luminance(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    /// CSS hex notation, e.g. `#ff8000`
    pub fn to_css(&self) -> String {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", channel(self.r), channel(self.g), channel(self.b))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::GREY
    }
}

/// Lighting model used for solid fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shading {
    /// One light term from the face normal
    #[default]
    Flat,
    /// Light term from the averaged per-corner normals, when the mesh has them
    Phong,
}

/// Surface description shared by many faces
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Color,
    /// In `[0, 1]`; 1 is fully opaque
    pub opacity: f32,
    pub wireframe: bool,
    pub shading: Shading,
    pub texture: Option<TextureId>,
}

impl Material {
    pub fn new(color: Color) -> Self {
        Self {
            name: String::new(),
            color,
            opacity: 1.0,
            wireframe: false,
            shading: Shading::Flat,
            texture: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_shading(mut self, shading: Shading) -> Self {
        self.shading = shading;
        self
    }

    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity < OPAQUE_THRESHOLD
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Color::default())
    }
}

new_key_type! {
    /// Key for a texture held by a [`TextureStore`]
    pub struct TextureId;
}

/// Where texture pixels come from
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    Url(String),
    Bytes(Vec<u8>),
}

/// An image fill plus its wrap parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub source: TextureSource,
    pub repeat: Vector2<f32>,
    pub offset: Vector2<f32>,
    /// Rotation of the UV frame in radians
    pub rotation: f32,
    pub flip_y: bool,
}

impl Texture {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::with_source(TextureSource::Url(url.into()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::with_source(TextureSource::Bytes(bytes))
    }

    fn with_source(source: TextureSource) -> Self {
        Self {
            source,
            repeat: Vector2::new(1.0, 1.0),
            offset: Vector2::zeros(),
            rotation: 0.0,
            flip_y: true,
        }
    }

    /// Map a mesh UV into the texture's unit square, applying repeat, rotation,
    /// offset and the vertical flip.
    pub fn map_uv(&self, uv: &Vector2<f32>) -> Vector2<f32> {
        let scaled = uv.component_mul(&self.repeat);
        let (s, c) = self.rotation.sin_cos();
        let rotated = Vector2::new(c * scaled.x - s * scaled.y, s * scaled.x + c * scaled.y);
        let shifted = rotated + self.offset;
        if self.flip_y {
            Vector2::new(shifted.x, 1.0 - shifted.y)
        } else {
            shifted
        }
    }

    /// Something an SVG `<image href>` can point at
    pub fn href(&self) -> String {
        match &self.source {
            TextureSource::Url(url) => url.clone(),
            TextureSource::Bytes(bytes) => {
                format!("data:{};base64,{}", sniff_mime(bytes), BASE64.encode(bytes))
            }
        }
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xff, 0xd8]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

/// Load progress of a texture
#[derive(Debug, Clone, PartialEq)]
pub enum TextureState {
    Pending,
    Loaded { width: u32, height: u32 },
    Failed(String),
}

#[derive(Debug, Clone)]
struct TextureEntry {
    texture: Texture,
    state: TextureState,
}

/// Owner of every texture and its load state
#[derive(Debug, Default)]
pub struct TextureStore {
    entries: SlotMap<TextureId, TextureEntry>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a texture; it starts out pending
    pub fn insert(&mut self, texture: Texture) -> TextureId {
        self.entries.insert(TextureEntry {
            texture,
            state: TextureState::Pending,
        })
    }

    pub fn get(&self, id: TextureId) -> Option<&Texture> {
        self.entries.get(id).map(|entry| &entry.texture)
    }

    pub fn state(&self, id: TextureId) -> Option<&TextureState> {
        self.entries.get(id).map(|entry| &entry.state)
    }

    /// The texture and its pixel size, only once loading has completed
    pub fn loaded(&self, id: TextureId) -> Option<(&Texture, u32, u32)> {
        let entry = self.entries.get(id)?;
        match entry.state {
            TextureState::Loaded { width, height } => Some((&entry.texture, width, height)),
            _ => None,
        }
    }

    /// Mark a texture as loaded. Returns false for unknown ids.
    pub fn complete(&mut self, id: TextureId, width: u32, height: u32) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                tracing::debug!(width, height, "Texture loaded");
                entry.state = TextureState::Loaded { width, height };
                true
            }
            None => false,
        }
    }

    /// Mark a texture as failed. It is never retried unless [`retry`](Self::retry) is called.
    pub fn fail(&mut self, id: TextureId, reason: impl Into<String>) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                let reason = reason.into();
                tracing::warn!(%reason, "Texture load failed; using material color");
                entry.state = TextureState::Failed(reason);
                true
            }
            None => false,
        }
    }

    /// Put a failed texture back into the pending state
    pub fn retry(&mut self, id: TextureId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if matches!(entry.state, TextureState::Failed(_)) => {
                entry.state = TextureState::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifier of a texture pattern on the drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(pub u32);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "facet-pattern-{}", self.0)
    }
}

/// Append-only map from `(mesh, face)` to a stable pattern id
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: HashMap<(NodeKey, usize), PatternId>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern_for(&mut self, mesh: NodeKey, face: usize) -> PatternId {
        let next = PatternId(self.patterns.len() as u32);
        *self.patterns.entry((mesh, face)).or_insert_with(|| {
            tracing::debug!(pattern = next.0, face, "New texture pattern");
            next
        })
    }

    pub fn get(&self, mesh: NodeKey, face: usize) -> Option<PatternId> {
        self.patterns.get(&(mesh, face)).copied()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
