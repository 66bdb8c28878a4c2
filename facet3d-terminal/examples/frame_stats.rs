/// Example: Load a model and print one ASCII frame with its statistics
///
/// Usage: cargo run --example frame_stats -- path/to/model.obj
use facet3d_core::{load_path, Config};
use facet3d_terminal::{default_mesh, TerminalApp};
use std::env;
use std::io::{self, Write};

fn main() -> io::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mesh = match args.get(1) {
        Some(path) => {
            let report = load_path(path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            println!(
                "Loaded {} faces ({} records skipped)",
                report.mesh.geometry.face_count(),
                report.skipped
            );
            report.mesh
        }
        None => {
            eprintln!("No model provided, using default cube...");
            default_mesh()
        }
    };

    let mut app = TerminalApp::with_size(mesh, Config::default(), 80, 24);
    let frame = app.snapshot();
    println!("{:?}", frame.stats);

    let mut canvas = facet3d_terminal::AsciiRenderer::new(80, 24);
    canvas.draw_frame(&frame);
    let mut stdout = io::stdout();
    canvas.draw(&mut stdout)?;
    writeln!(stdout)?;
    Ok(())
}
