/// facet3d core library - software 3D rendering without a depth buffer
///
/// This library holds the platform-independent pipeline: matrix math, the
/// scene graph, cameras, geometry and materials, the triangle intersection
/// engine, the painter's-order renderer, model loaders and SVG output.

pub mod config;
pub mod error;
pub mod geometry;
pub mod intersect;
pub mod loader;
pub mod material;
pub mod math;
pub mod obj;
pub mod projection;
pub mod renderer;
pub mod scene;
pub mod stl;
pub mod svg;

// Re-export commonly used types
pub use config::{Config, RenderMode, RenderSettings, ViewportConfig};
pub use error::{Error, Result};
pub use geometry::{Aabb, Face, Geometry, Mesh};
pub use loader::{load_model, load_path, LoadReport};
pub use material::{Color, Material, Shading, Texture, TextureId, TextureState, TextureStore};
pub use math::{RotationState, Transform};
pub use projection::{Camera, ProjectionMode, ScreenPoint};
pub use renderer::{DrawPolygon, Fill, Frame, FrameStats, Renderer};
pub use scene::{NodeKey, Scene, SceneNode};
pub use svg::frame_to_svg;
