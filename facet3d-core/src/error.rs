/// Error types for the facet3d pipeline
use thiserror::Error;

/// Result type for facet3d operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Matrix math failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Matrix is singular (determinant {determinant})")]
    SingularMatrix { determinant: f32 },
}

/// Geometry construction failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Face {face} references vertex {index} but only {len} vertices exist")]
    IndexOutOfRange { face: usize, index: usize, len: usize },

    #[error("Face {face} references material slot {slot} but only {len} slots exist")]
    MaterialOutOfRange { face: usize, slot: usize, len: usize },
}

/// Scene graph operation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Node does not exist in this scene")]
    MissingNode,

    #[error("Attaching the node would make it its own ancestor")]
    WouldCreateCycle,

    #[error("The scene root cannot be re-parented or removed")]
    RootImmovable,
}

/// Model ingestion failures
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Model contains no faces")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any facet3d error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
