/// facet3d terminal viewer
///
/// Usage: facet3d-terminal [MODEL.obj|MODEL.stl] [--config FILE.json] [--svg OUT.svg]
///
/// Without `--svg` the model is shown interactively in the terminal.
/// With `--svg` one frame is rendered at the configured viewport size and
/// written as an SVG file.
///
/// Controls:
///   - WASD / Arrow Keys: Orbit
///   - +/-: Zoom
///   - C / I / L: Toggle culling, intersections, seam markers
///   - M: Cycle render mode
///   - P: Toggle projection
///   - Space: Toggle auto-rotation
///   - Q/ESC: Quit
use facet3d_core::{
    frame_to_svg, load_path, Camera, Config, Mesh, Renderer, Scene, SceneNode, TextureStore,
};
use facet3d_terminal::{default_mesh, OrbitState, TerminalApp};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    model: Option<PathBuf>,
    config: Option<PathBuf>,
    svg: Option<PathBuf>,
}

fn parse_args() -> io::Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--svg" => args.svg = Some(required(&mut iter, "--svg")?),
            "--config" => args.config = Some(required(&mut iter, "--config")?),
            _ if args.model.is_none() && !arg.starts_with("--") => {
                args.model = Some(PathBuf::from(arg))
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unexpected argument: {other}"),
                ))
            }
        }
    }
    Ok(args)
}

fn required(iter: &mut impl Iterator<Item = String>, flag: &str) -> io::Result<PathBuf> {
    iter.next().map(PathBuf::from).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{flag} needs a path"))
    })
}

fn invalid_data(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

fn main() -> io::Result<()> {
    // Logs go to stderr so they never interleave with the frame on stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => Config::from_path(path).map_err(invalid_data)?,
        None => Config::default(),
    };
    config.apply_env().map_err(invalid_data)?;

    let mesh = match &args.model {
        Some(path) => {
            let report = load_path(path).map_err(invalid_data)?;
            tracing::info!(
                path = %path.display(),
                faces = report.mesh.geometry.face_count(),
                skipped = report.skipped,
                "Loaded model"
            );
            report.mesh
        }
        None => default_mesh(),
    };

    if let Some(out) = &args.svg {
        return export_svg(mesh, &config, out);
    }

    let mut app = TerminalApp::new(mesh, config)?;
    app.run()?;

    Ok(())
}

/// Render a single frame of `mesh` and write it as SVG
fn export_svg(mesh: Mesh, config: &Config, out: &Path) -> io::Result<()> {
    let viewport = &config.viewport;
    let mut scene = Scene::new();
    let root = scene.root();
    scene
        .add_child(root, SceneNode::mesh("model", mesh))
        .map_err(invalid_data)?;

    let mut camera = Camera::new(viewport.width, viewport.height);
    OrbitState::default().apply(&mut camera);
    viewport.apply(&mut camera);

    let mut renderer = Renderer::with_settings(viewport.width, viewport.height, config.render.clone());
    let textures = TextureStore::new();
    let frame = renderer.render(&mut scene, &mut camera, &textures);
    std::fs::write(out, frame_to_svg(&frame, &textures))?;

    tracing::info!(
        path = %out.display(),
        polygons = frame.polygons.len(),
        culled = frame.stats.culled,
        "Wrote SVG"
    );
    Ok(())
}
