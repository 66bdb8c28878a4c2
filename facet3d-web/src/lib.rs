/// facet3d Web - WASM bindings that render scenes to SVG markup
///
/// The browser owns the animation loop; each tick calls `orbit` and
/// `render_into`, which replaces the target element's markup with the new frame.
use facet3d_core::{
    error::LoadError, frame_to_svg, load_model, Camera, NodeKey, RenderMode, Renderer, Scene,
    SceneNode, TextureStore,
};
use nalgebra::Point3;
use wasm_bindgen::prelude::*;

const MIN_POLAR: f32 = 0.05;

#[wasm_bindgen]
pub struct WebRenderer {
    scene: Scene,
    model: Option<NodeKey>,
    camera: Camera,
    renderer: Renderer,
    textures: TextureStore,
    distance: f32,
    phi: f32,
    theta: f32,
}

#[wasm_bindgen]
impl WebRenderer {
    #[wasm_bindgen(constructor)]
    pub fn new(width: u32, height: u32) -> WebRenderer {
        let mut renderer = WebRenderer {
            scene: Scene::new(),
            model: None,
            camera: Camera::new(width, height),
            renderer: Renderer::new(width, height),
            textures: TextureStore::new(),
            distance: 5.0,
            phi: 1.2,
            theta: 0.6,
        };
        renderer.apply_orbit();
        renderer
    }

    /// Replace the displayed model with OBJ text
    pub fn load_obj(&mut self, text: &str) -> Result<usize, JsValue> {
        self.load(text.as_bytes(), "obj").map_err(to_js)
    }

    /// Replace the displayed model with an ASCII STL file
    pub fn load_stl(&mut self, bytes: &[u8]) -> Result<usize, JsValue> {
        self.load(bytes, "stl").map_err(to_js)
    }

    /// Rotate the orbit camera by angle deltas in radians
    pub fn orbit(&mut self, d_theta: f32, d_phi: f32) {
        self.theta = (self.theta + d_theta).rem_euclid(std::f32::consts::TAU);
        self.phi = (self.phi + d_phi).clamp(MIN_POLAR, std::f32::consts::PI - MIN_POLAR);
        self.apply_orbit();
    }

    pub fn zoom(&mut self, factor: f32) {
        self.distance = (self.distance * factor).max(0.1);
        self.apply_orbit();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let fov = self.camera.perspective_params().fov;
        let zoom = self.camera.orthographic_params().zoom;
        self.camera
            .setup_for_viewport(width, height, fov, self.camera.near(), self.camera.far(), zoom);
        self.renderer.set_size(width, height);
    }

    /// Set the render mode by name: normal, depth, wireframe or solid.
    /// Returns false for unknown names.
    pub fn set_mode(&mut self, mode: &str) -> bool {
        let mode = match mode.to_ascii_lowercase().as_str() {
            "normal" => RenderMode::Normal,
            "depth" => RenderMode::Depth,
            "wireframe" => RenderMode::Wireframe,
            "solid" => RenderMode::Solid,
            _ => return false,
        };
        self.renderer.settings.mode = mode;
        true
    }

    pub fn set_backface_culling(&mut self, enabled: bool) {
        self.renderer.settings.backface_culling = enabled;
    }

    pub fn set_intersections(&mut self, enabled: bool) {
        self.renderer.settings.intersections = enabled;
    }

    pub fn set_intersection_lines(&mut self, enabled: bool) {
        self.renderer.settings.show_intersection_lines = enabled;
    }

    /// Render one frame as SVG markup
    pub fn render_svg(&mut self) -> String {
        let frame = self
            .renderer
            .render(&mut self.scene, &mut self.camera, &self.textures);
        frame_to_svg(&frame, &self.textures)
    }

    /// Render one frame into the element with `element_id`
    pub fn render_into(&mut self, element_id: &str) -> Result<(), JsValue> {
        let svg = self.render_svg();
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;
        let element = document
            .get_element_by_id(element_id)
            .ok_or_else(|| JsValue::from_str(&format!("No element with id '{element_id}'")))?;
        element.set_inner_html(&svg);
        Ok(())
    }
}

impl WebRenderer {
    fn load(&mut self, bytes: &[u8], extension: &str) -> Result<usize, LoadError> {
        let report = load_model(bytes, extension)?;
        let faces = report.mesh.geometry.face_count();
        if let Some(old) = self.model.take() {
            let _ = self.scene.remove(old);
        }
        let root = self.scene.root();
        let key = self.scene.insert(SceneNode::mesh("model", report.mesh));
        // Root always exists and a fresh node cannot form a cycle
        if self.scene.add(root, key).is_ok() {
            self.model = Some(key);
        }
        Ok(faces)
    }

    fn apply_orbit(&mut self) {
        self.camera
            .orbit(Point3::origin(), self.distance, self.phi, self.theta);
    }
}

fn to_js(err: LoadError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
