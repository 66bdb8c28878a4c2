/// Model loading dispatch.
///
/// Picks a parser from the file extension and turns its output into a
/// [`Mesh`] with one material slot per `usemtl` name.
use std::path::Path;

use crate::error::LoadError;
use crate::geometry::Mesh;
use crate::material::{Color, Material};
use crate::obj::parse_obj;
use crate::stl::parse_stl;

/// Colors handed out to named OBJ material slots in order
const PALETTE: [u32; 6] = [0x4f86c6, 0xd9534f, 0x5cb85c, 0xf0ad4e, 0x8e6cc4, 0x46b8b0];

/// Result of loading a model
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub mesh: Mesh,
    /// Records dropped while parsing
    pub skipped: usize,
    /// Group or solid names found in the file
    pub groups: Vec<String>,
}

/// Parse `bytes` according to `extension` (case-insensitive, with or without a dot)
pub fn load_model(bytes: &[u8], extension: &str) -> Result<LoadReport, LoadError> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    match extension.as_str() {
        "obj" => {
            let text = std::str::from_utf8(bytes).map_err(|e| LoadError::Parse {
                line: 0,
                message: format!("OBJ is not valid UTF-8: {e}"),
            })?;
            let model = parse_obj(text)?;
            let materials: Vec<Material> = if model.materials.is_empty() {
                vec![Material::default()]
            } else {
                model
                    .materials
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let mut material = Material::named(name.as_str());
                        material.color = Color::from_hex(PALETTE[i % PALETTE.len()]);
                        material
                    })
                    .collect()
            };
            let mesh = Mesh::with_materials(model.geometry, materials)
                .map_err(|e| LoadError::Parse {
                    line: 0,
                    message: e.to_string(),
                })?;
            tracing::debug!(
                faces = mesh.geometry.face_count(),
                skipped = model.skipped,
                "Loaded OBJ"
            );
            Ok(LoadReport {
                mesh,
                skipped: model.skipped,
                groups: model.groups,
            })
        }
        "stl" => {
            let model = parse_stl(bytes)?;
            let groups = if model.name.is_empty() {
                Vec::new()
            } else {
                vec![model.name]
            };
            tracing::debug!(faces = model.geometry.face_count(), "Loaded STL");
            Ok(LoadReport {
                mesh: Mesh::new(model.geometry, Material::default()),
                skipped: model.skipped,
                groups,
            })
        }
        "gltf" | "glb" => Err(LoadError::UnsupportedFormat(format!(".{extension}"))),
        other => Err(LoadError::UnsupportedFormat(if other.is_empty() {
            "missing file extension".to_string()
        } else {
            format!(".{other}")
        })),
    }
}

/// Read a file and load it by its extension
pub fn load_path(path: impl AsRef<Path>) -> Result<LoadReport, LoadError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let bytes = std::fs::read(path)?;
    load_model(&bytes, extension)
}
