/// Terminal host for the facet3d software renderer
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self},
};
use facet3d_core::{
    Camera, Config, Frame, Material, Mesh, NodeKey, ProjectionMode, Renderer, Scene, SceneNode,
    TextureStore, ViewportConfig,
};
use nalgebra::Point3;
use std::f32::consts::{PI, TAU};
use std::io::{self, stdout, Write};
use std::time::{Duration, Instant};

pub mod renderer;

pub use renderer::AsciiRenderer;

/// Longest step fed into time-based state after a stall
pub const MAX_TICK: Duration = Duration::from_millis(100);

/// Radians per second of automatic orbit
const AUTO_ROTATE_SPEED: f32 = 0.5;
const ORBIT_STEP: f32 = 0.1;
const ZOOM_STEP: f32 = 1.1;
const MIN_POLAR: f32 = 0.05;

/// Terminal cells are roughly twice as tall as they are wide
const CELL_ASPECT: u32 = 2;

/// Orbit camera parameters around the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitState {
    pub distance: f32,
    /// Polar angle from +Y
    pub phi: f32,
    /// Azimuth from +Z towards +X
    pub theta: f32,
}

impl OrbitState {
    pub fn apply(&self, camera: &mut Camera) {
        camera.orbit(Point3::origin(), self.distance, self.phi, self.theta);
    }
}

impl Default for OrbitState {
    fn default() -> Self {
        Self {
            distance: 5.0,
            phi: 1.2,
            theta: 0.6,
        }
    }
}

/// Clamp the time since the last tick
pub fn clamp_tick(elapsed: Duration) -> Duration {
    elapsed.min(MAX_TICK)
}

/// Main application struct for terminal 3D rendering
pub struct TerminalApp {
    scene: Scene,
    model: NodeKey,
    camera: Camera,
    orbit: OrbitState,
    viewport: ViewportConfig,
    renderer: Renderer,
    textures: TextureStore,
    canvas: AsciiRenderer,
    auto_rotate: bool,
    running: bool,
    last_tick: Instant,
    last_fps: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    /// Create an app sized to the current terminal
    pub fn new(mesh: Mesh, config: Config) -> io::Result<Self> {
        let (width, height) = terminal::size()?;
        Ok(Self::with_size(mesh, config, width as u32, height as u32))
    }

    /// Create an app for a fixed character grid
    pub fn with_size(mesh: Mesh, config: Config, columns: u32, rows: u32) -> Self {
        let mut scene = Scene::new();
        let root = scene.root();
        let model = scene.insert(SceneNode::mesh("model", mesh));
        if let Err(err) = scene.add(root, model) {
            tracing::warn!(%err, "Could not attach model to scene root");
        }

        let mut camera = Camera::new(columns, rows);
        let orbit = OrbitState {
            distance: fit_distance(&scene, model),
            ..OrbitState::default()
        };
        orbit.apply(&mut camera);

        let mut app = Self {
            scene,
            model,
            camera,
            orbit,
            viewport: config.viewport,
            renderer: Renderer::with_settings(columns, rows, config.render),
            textures: TextureStore::new(),
            canvas: AsciiRenderer::new(columns as usize, rows as usize),
            auto_rotate: true,
            running: true,
            last_tick: Instant::now(),
            last_fps: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        };
        app.resize(columns, rows);
        app
    }

    fn resize(&mut self, columns: u32, rows: u32) {
        let rows = rows.max(1);
        let columns = columns.max(1);
        let viewport = &self.viewport;
        // Aspect uses the physical cell shape; the frame itself stays on the cell grid
        self.camera.setup_for_viewport(
            columns,
            rows * CELL_ASPECT,
            viewport.fov,
            viewport.near,
            viewport.far,
            viewport.zoom,
        );
        self.renderer.set_size(columns, rows);
        self.canvas.resize(columns as usize, rows as usize);
    }

    pub fn run(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

        let result = self.main_loop();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), terminal::LeaveAlternateScreen, cursor::Show)?;

        result
    }

    fn main_loop(&mut self) -> io::Result<()> {
        let target_frame_time = Duration::from_millis(1000 / 30); // 30 FPS target
        self.last_tick = Instant::now();

        while self.running {
            let frame_start = Instant::now();

            // Handle input
            while event::poll(Duration::from_millis(0))? {
                match event::read()? {
                    Event::Key(KeyEvent {
                        code,
                        kind: KeyEventKind::Press,
                        ..
                    }) => self.handle_key(code),
                    Event::Resize(columns, rows) => self.resize(columns as u32, rows as u32),
                    _ => {}
                }
            }

            // Update
            let now = Instant::now();
            self.update(clamp_tick(now - self.last_tick));
            self.last_tick = now;

            // Render
            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_fps).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_fps).as_secs_f32();
                self.frame_count = 0;
                self.last_fps = now;
            }
        }

        Ok(())
    }

    /// Apply one key press
    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('c') => {
                let settings = &mut self.renderer.settings;
                settings.backface_culling = !settings.backface_culling;
            }
            KeyCode::Char('i') => {
                let settings = &mut self.renderer.settings;
                settings.intersections = !settings.intersections;
            }
            KeyCode::Char('l') => {
                let settings = &mut self.renderer.settings;
                settings.show_intersection_lines = !settings.show_intersection_lines;
            }
            KeyCode::Char('m') => {
                let settings = &mut self.renderer.settings;
                settings.mode = settings.mode.next();
            }
            KeyCode::Char('p') => {
                let mode = match self.camera.mode() {
                    ProjectionMode::Perspective => ProjectionMode::Orthographic,
                    ProjectionMode::Orthographic => ProjectionMode::Perspective,
                };
                self.camera.set_mode(mode);
            }
            KeyCode::Char(' ') => self.auto_rotate = !self.auto_rotate,
            KeyCode::Char('+') | KeyCode::Char('=') => self.zoom(1.0 / ZOOM_STEP),
            KeyCode::Char('-') => self.zoom(ZOOM_STEP),
            KeyCode::Char('w') | KeyCode::Up => self.rotate(0.0, -ORBIT_STEP),
            KeyCode::Char('s') | KeyCode::Down => self.rotate(0.0, ORBIT_STEP),
            KeyCode::Char('a') | KeyCode::Left => self.rotate(-ORBIT_STEP, 0.0),
            KeyCode::Char('d') | KeyCode::Right => self.rotate(ORBIT_STEP, 0.0),
            _ => {}
        }
    }

    fn rotate(&mut self, d_theta: f32, d_phi: f32) {
        self.orbit.theta = (self.orbit.theta + d_theta).rem_euclid(TAU);
        self.orbit.phi = (self.orbit.phi + d_phi).clamp(MIN_POLAR, PI - MIN_POLAR);
        self.orbit.apply(&mut self.camera);
    }

    fn zoom(&mut self, factor: f32) {
        self.orbit.distance = (self.orbit.distance * factor).max(0.1);
        self.orbit.apply(&mut self.camera);
        // Orthographic zoom tracks the orbit distance
        let zoom = self.camera.orthographic_params().zoom / factor;
        self.camera.set_zoom(zoom);
    }

    /// Advance time-based state by an already clamped step
    pub fn update(&mut self, dt: Duration) {
        if self.auto_rotate {
            self.rotate(AUTO_ROTATE_SPEED * dt.as_secs_f32(), 0.0);
        }
    }

    /// Render the current view without touching the terminal
    pub fn snapshot(&mut self) -> Frame {
        self.renderer
            .render(&mut self.scene, &mut self.camera, &self.textures)
    }

    fn render(&mut self) -> io::Result<()> {
        let frame = self.snapshot();
        self.canvas.draw_frame(&frame);

        // Output to terminal
        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;

        self.canvas.draw(&mut stdout)?;

        // Draw UI overlay
        let settings = &self.renderer.settings;
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "facet3d | FPS {:.1} | {:?} {:?} | faces {} culled {} split {} | c cull:{} i isect:{} l lines:{} m mode p proj +/- zoom WASD orbit q quit",
                self.fps,
                settings.mode,
                self.camera.mode(),
                frame.stats.emitted,
                frame.stats.culled,
                frame.stats.subdivided,
                on_off(settings.backface_culling),
                on_off(settings.intersections),
                on_off(settings.show_intersection_lines),
            )),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn orbit(&self) -> OrbitState {
        self.orbit
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn model(&self) -> NodeKey {
        self.model
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Orbit distance that keeps the model's bounding sphere in view
fn fit_distance(scene: &Scene, model: NodeKey) -> f32 {
    let radius = scene
        .get(model)
        .and_then(|node| node.as_mesh())
        .and_then(|mesh| mesh.geometry.bounding_box())
        .map(|bb| bb.size().norm() / 2.0)
        .unwrap_or(1.0);
    (radius * 3.0).max(2.0)
}

/// Cube used when no model is given
pub fn default_mesh() -> Mesh {
    Mesh::cube(2.0, Material::new(facet3d_core::Color::from_hex(0x4f86c6)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet3d_core::RenderMode;

    fn app() -> TerminalApp {
        TerminalApp::with_size(default_mesh(), Config::default(), 80, 24)
    }

    #[test]
    fn tick_is_clamped_after_stall() {
        assert_eq!(clamp_tick(Duration::from_secs(3)), MAX_TICK);
        assert_eq!(clamp_tick(Duration::from_millis(16)), Duration::from_millis(16));
    }

    #[test]
    fn keys_toggle_render_settings() {
        let mut app = app();
        let before = app.renderer().settings.clone();

        app.handle_key(KeyCode::Char('c'));
        app.handle_key(KeyCode::Char('i'));
        app.handle_key(KeyCode::Char('l'));
        app.handle_key(KeyCode::Char('m'));

        let after = &app.renderer().settings;
        assert_eq!(after.backface_culling, !before.backface_culling);
        assert_eq!(after.intersections, !before.intersections);
        assert_eq!(after.show_intersection_lines, !before.show_intersection_lines);
        assert_eq!(after.mode, RenderMode::Depth);

        app.handle_key(KeyCode::Char('p'));
        assert_eq!(app.camera().mode(), ProjectionMode::Orthographic);

        app.handle_key(KeyCode::Char('q'));
        assert!(!app.is_running());
    }

    #[test]
    fn orbit_keys_keep_distance_and_clamp_pole() {
        let mut app = app();
        let distance = app.orbit().distance;
        for _ in 0..100 {
            app.handle_key(KeyCode::Up);
        }
        assert!(app.orbit().phi >= MIN_POLAR);
        let position = app.camera().position();
        assert!(((position - Point3::origin()).norm() - distance).abs() < 1e-3);

        app.handle_key(KeyCode::Char('-'));
        assert!(app.orbit().distance > distance);
    }

    #[test]
    fn snapshot_fits_terminal_grid() {
        let mut app = app();
        let frame = app.snapshot();
        assert_eq!((frame.width, frame.height), (80, 24));
        assert!(!frame.polygons.is_empty());
    }

    #[test]
    fn update_rotates_by_clamped_step() {
        let mut app = app();
        let theta = app.orbit().theta;
        app.update(clamp_tick(Duration::from_secs(10)));
        let expected = (theta + AUTO_ROTATE_SPEED * MAX_TICK.as_secs_f32()).rem_euclid(TAU);
        assert!((app.orbit().theta - expected).abs() < 1e-5);
    }
}
