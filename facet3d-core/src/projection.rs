/// Camera and projection utilities
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::math::Transform;
use crate::scene::NodeTransform;

/// Clip-space `w` at or below which a point is behind the eye
const W_EPSILON: f32 = 1e-6;

/// Smallest eye-to-target distance used to size the orthographic frustum
const MIN_ORTHO_DISTANCE: f32 = 1e-3;

/// Smallest accepted gap between the near and far planes, relative to `far`
const MIN_CLIP_GAP: f32 = 1e-4;

/// Smallest accepted orthographic frustum extent
const MIN_ORTHO_EXTENT: f32 = 1e-3;

/// Largest orthographic zoom; keeps the zoomed extent above `MIN_ORTHO_EXTENT / MAX_ORTHO_ZOOM`
const MAX_ORTHO_ZOOM: f32 = 1e3;

/// Projection mode for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    Orthographic,
    #[default]
    Perspective,
}

/// One way of turning view space into clip space and clip space into NDC
pub trait ProjectionStrategy {
    fn projection_matrix(&self, near: f32, far: f32) -> Matrix4<f32>;

    /// Clip coordinates to normalized device coordinates, or `None` when the
    /// point cannot be projected.
    fn project_clip(&self, clip: &Vector4<f32>) -> Option<Point3<f32>>;
}

/// Perspective parameters; `fov` is the vertical field of view in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveParams {
    pub fov: f32,
    pub aspect: f32,
}

impl ProjectionStrategy for PerspectiveParams {
    fn projection_matrix(&self, near: f32, far: f32) -> Matrix4<f32> {
        Transform::perspective(self.fov.to_radians(), self.aspect, near, far)
    }

    fn project_clip(&self, clip: &Vector4<f32>) -> Option<Point3<f32>> {
        // Prevent division by near-zero or negative w (behind the camera)
        if clip.w <= W_EPSILON {
            return None;
        }
        Some(Point3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w))
    }
}

/// Orthographic frustum; the extents are divided by `zoom`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicParams {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub zoom: f32,
}

impl ProjectionStrategy for OrthographicParams {
    fn projection_matrix(&self, near: f32, far: f32) -> Matrix4<f32> {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        Transform::orthographic(
            self.left / zoom,
            self.right / zoom,
            self.top / zoom,
            self.bottom / zoom,
            near,
            far,
        )
    }

    fn project_clip(&self, clip: &Vector4<f32>) -> Option<Point3<f32>> {
        if clip.w.abs() <= W_EPSILON {
            return None;
        }
        Some(Point3::new(clip.x, clip.y, clip.z))
    }
}

/// A projected vertex in screen pixels; `depth` is NDC z
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
    pub depth: f32,
}

/// Camera configuration for 3D rendering.
///
/// The view, projection and view-projection matrices are recomputed eagerly by
/// every mutating call, so `view_projection == projection * view` always holds.
#[derive(Debug, Clone)]
pub struct Camera {
    pub node: NodeTransform,
    target: Point3<f32>,
    up: Vector3<f32>,
    near: f32,
    far: f32,
    mode: ProjectionMode,
    perspective: PerspectiveParams,
    orthographic: OrthographicParams,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    view_projection: Matrix4<f32>,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self::blank();
        camera.set_position(Point3::new(0.0, 0.0, 5.0));
        camera.setup_for_viewport(width, height, 45.0, 0.1, 1000.0, 1.0);
        camera
    }

    /// A perspective camera at `(0, 0, 5)` looking at the origin
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self::blank();
        camera.near = near;
        camera.far = far;
        camera.perspective = PerspectiveParams { fov, aspect };
        camera.set_position(Point3::new(0.0, 0.0, 5.0));
        camera.update_projection_matrix();
        camera
    }

    /// An orthographic camera at `(0, 0, 5)` looking at the origin
    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        let mut camera = Self::blank();
        camera.near = near;
        camera.far = far;
        camera.mode = ProjectionMode::Orthographic;
        camera.orthographic = OrthographicParams {
            left,
            right,
            top,
            bottom,
            zoom: 1.0,
        };
        let aspect = if top != bottom {
            (right - left) / (top - bottom)
        } else {
            1.0
        };
        camera.perspective.aspect = aspect;
        camera.set_position(Point3::new(0.0, 0.0, 5.0));
        camera.update_projection_matrix();
        camera
    }

    fn blank() -> Self {
        Self {
            node: NodeTransform::new(),
            target: Point3::origin(),
            up: Vector3::y(),
            near: 0.1,
            far: 1000.0,
            mode: ProjectionMode::Perspective,
            perspective: PerspectiveParams {
                fov: 45.0,
                aspect: 1.0,
            },
            orthographic: OrthographicParams {
                left: -1.0,
                right: 1.0,
                top: 1.0,
                bottom: -1.0,
                zoom: 1.0,
            },
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            view_projection: Matrix4::identity(),
        }
    }

    fn strategy(&self) -> &dyn ProjectionStrategy {
        match self.mode {
            ProjectionMode::Perspective => &self.perspective,
            ProjectionMode::Orthographic => &self.orthographic,
        }
    }

    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ProjectionMode) {
        self.mode = mode;
        self.update_projection_matrix();
    }

    pub fn perspective_params(&self) -> &PerspectiveParams {
        &self.perspective
    }

    pub fn orthographic_params(&self) -> &OrthographicParams {
        &self.orthographic
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn set_clip(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.update_projection_matrix();
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.orthographic.zoom = zoom.max(f32::EPSILON);
        self.update_projection_matrix();
    }

    pub fn position(&self) -> Point3<f32> {
        Point3::from(self.node.position)
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.node.position = position.coords;
        self.update_view_matrix();
    }

    pub fn look_at(&mut self, target: Point3<f32>) {
        self.target = target;
        self.update_view_matrix();
    }

    /// Place the camera on a sphere around `target`.
    ///
    /// `phi` is the polar angle from +Y and `theta` the azimuth from +Z towards +X.
    pub fn orbit(&mut self, target: Point3<f32>, distance: f32, phi: f32, theta: f32) {
        let offset = Vector3::new(
            distance * phi.sin() * theta.sin(),
            distance * phi.cos(),
            distance * phi.sin() * theta.cos(),
        );
        self.node.position = target.coords + offset;
        self.target = target;
        self.update_view_matrix();
    }

    /// Rebuild the view matrix from position and target, then the camera's
    /// world matrix as its inverse.
    pub fn update_view_matrix(&mut self) {
        let eye = self.position();
        self.view = Transform::look_at(&eye, &self.target, &self.up);
        match Transform::invert(&self.view) {
            Ok(world) => self.node.set_world_matrix(world),
            Err(err) => {
                tracing::warn!(%err, "Camera view matrix is not invertible; using identity world matrix");
                self.node.set_world_matrix(Matrix4::identity());
            }
        }
        self.view_projection = self.projection * self.view;
    }

    /// Rebuild the projection matrix from the active parameter set
    pub fn update_projection_matrix(&mut self) {
        self.sanitize_parameters();
        self.projection = self.strategy().projection_matrix(self.near, self.far);
        self.view_projection = self.projection * self.view;
    }

    /// Pull the projection parameters back into a range the matrix builders
    /// accept. Degenerate input is repaired with a warning rather than aborting.
    fn sanitize_parameters(&mut self) {
        let aspect = self.perspective.aspect;
        if !(aspect.is_finite() && aspect > 0.0) {
            tracing::warn!(aspect, "Aspect ratio must be positive; using 1");
            self.perspective.aspect = 1.0;
        }
        let fov = self.perspective.fov;
        if !(fov > 0.0 && fov < 180.0) {
            tracing::warn!(fov, "Field of view must be inside (0, 180) degrees; using 45");
            self.perspective.fov = 45.0;
        }

        let (near, far) = (self.near, self.far);
        let gap = MIN_CLIP_GAP * far.abs().max(1.0);
        if !(near.is_finite() && far.is_finite() && far - near > gap) {
            let near = if near.is_finite() { near } else { 0.1 };
            let far = near + gap.max(near.abs()).max(1.0);
            tracing::warn!(
                requested_near = self.near,
                requested_far = self.far,
                near,
                far,
                "Clip planes must satisfy near < far; widening the range"
            );
            self.near = near;
            self.far = far;
        }

        let ortho = &mut self.orthographic;
        if !(ortho.zoom.is_finite() && ortho.zoom <= MAX_ORTHO_ZOOM) {
            let zoom = if ortho.zoom.is_finite() { MAX_ORTHO_ZOOM } else { 1.0 };
            tracing::warn!(requested = ortho.zoom, zoom, "Orthographic zoom out of range");
            ortho.zoom = zoom;
        }
        if let Some((left, right)) = widen_extent(ortho.left, ortho.right) {
            tracing::warn!(left = ortho.left, right = ortho.right, "Orthographic frustum has no width");
            ortho.left = left;
            ortho.right = right;
        }
        if let Some((bottom, top)) = widen_extent(ortho.bottom, ortho.top) {
            tracing::warn!(top = ortho.top, bottom = ortho.bottom, "Orthographic frustum has no height");
            ortho.bottom = bottom;
            ortho.top = top;
        }
    }

    /// Recompute view, projection and view-projection
    pub fn update_matrices(&mut self) {
        self.update_view_matrix();
        self.update_projection_matrix();
    }

    /// Resize both projection parameter sets for a new viewport.
    ///
    /// The orthographic frustum is sized so that, at the target distance, it
    /// covers the same area as the perspective frustum.
    pub fn setup_for_viewport(
        &mut self,
        width: u32,
        height: u32,
        fov: f32,
        near: f32,
        far: f32,
        zoom: f32,
    ) {
        let aspect = if width == 0 || height == 0 {
            tracing::warn!(width, height, "Empty viewport; keeping the previous aspect ratio");
            self.perspective.aspect
        } else {
            width as f32 / height as f32
        };
        self.near = near;
        self.far = far;
        self.perspective = PerspectiveParams { fov, aspect };

        let distance = (self.position() - self.target).norm().max(MIN_ORTHO_DISTANCE);
        let half_height = distance * (fov.to_radians() / 2.0).tan();
        let half_width = half_height * aspect;
        self.orthographic = OrthographicParams {
            left: -half_width,
            right: half_width,
            top: half_height,
            bottom: -half_height,
            zoom: zoom.max(f32::EPSILON),
        };
        self.update_projection_matrix();
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> &Matrix4<f32> {
        &self.view
    }

    /// Create the projection matrix
    pub fn projection_matrix(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn view_projection_matrix(&self) -> &Matrix4<f32> {
        &self.view_projection
    }

    /// Project a world-space point to screen pixels (origin top-left, y down)
    pub fn project_point(&self, point: &Point3<f32>, width: u32, height: u32) -> Option<ScreenPoint> {
        let clip = Transform::transform_homogeneous(&self.view_projection, point);
        let ndc = self.strategy().project_clip(&clip)?;
        if !(ndc.x.is_finite() && ndc.y.is_finite() && ndc.z.is_finite()) {
            return None;
        }
        Some(ScreenPoint {
            x: (ndc.x + 1.0) * 0.5 * width as f32,
            y: (1.0 - ndc.y) * 0.5 * height as f32,
            depth: ndc.z,
        })
    }
}

/// A replacement `(low, high)` pair one unit wide around the midpoint when
/// the extent is empty or not finite, `None` when it is usable.
fn widen_extent(low: f32, high: f32) -> Option<(f32, f32)> {
    if low.is_finite() && high.is_finite() && (high - low).abs() > MIN_ORTHO_EXTENT {
        return None;
    }
    let mid = if low.is_finite() && high.is_finite() {
        (low + high) / 2.0
    } else {
        0.0
    };
    Some((mid - 0.5, mid + 0.5))
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn assert_vp_consistent(camera: &Camera) {
        let expected = camera.projection_matrix() * camera.view_matrix();
        assert_relative_eq!(*camera.view_projection_matrix(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_camera_creation() {
        let camera = Camera::new(800, 600);
        assert_eq!(camera.mode(), ProjectionMode::Perspective);
        assert!((camera.perspective_params().aspect - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn test_view_matrix() {
        let camera = Camera::new(800, 600);
        let view = camera.view_matrix();
        // View matrix should be non-zero
        assert!(view.norm() > 0.0);
    }

    #[test]
    fn view_projection_tracks_every_mutation() {
        let mut camera = Camera::new(640, 480);
        assert_vp_consistent(&camera);
        camera.set_position(Point3::new(1.0, 2.0, 3.0));
        assert_vp_consistent(&camera);
        camera.set_mode(ProjectionMode::Orthographic);
        assert_vp_consistent(&camera);
        camera.set_zoom(2.0);
        assert_vp_consistent(&camera);
        camera.orbit(Point3::new(0.5, 0.0, 0.0), 4.0, 1.0, 2.0);
        assert_vp_consistent(&camera);
        camera.set_clip(0.5, 50.0);
        assert_vp_consistent(&camera);
    }

    #[test]
    fn orbit_keeps_requested_distance() {
        let mut camera = Camera::default();
        let target = Point3::new(1.0, -2.0, 0.5);
        for &distance in &[0.5f32, 1.0, 7.5, 120.0] {
            for i in 1..8 {
                let phi = PI * i as f32 / 8.0;
                for j in 0..8 {
                    let theta = 2.0 * PI * j as f32 / 8.0;
                    camera.orbit(target, distance, phi, theta);
                    let actual = (camera.position() - target).norm();
                    assert_relative_eq!(actual, distance, max_relative = 1e-4);
                }
            }
        }
    }

    #[test]
    fn orbit_over_the_pole_stays_finite() {
        let mut camera = Camera::default();
        camera.orbit(Point3::origin(), 5.0, 0.0, 0.0);
        assert!(camera.view_matrix().iter().all(|v| v.is_finite()));
        let center = camera.project_point(&Point3::origin(), 800, 600).unwrap();
        assert_relative_eq!(center.x, 400.0, epsilon = 0.5);
        assert_relative_eq!(center.y, 300.0, epsilon = 0.5);
    }

    #[test]
    fn world_matrix_is_inverse_of_view() {
        let mut camera = Camera::default();
        camera.orbit(Point3::origin(), 6.0, 1.1, 0.4);
        let world_position = camera.node.world_position();
        assert_relative_eq!(world_position, camera.position(), epsilon = 1e-4);
    }

    #[test]
    fn setup_for_viewport_updates_both_modes() {
        let mut camera = Camera::new(800, 600);
        camera.setup_for_viewport(1000, 500, 60.0, 0.1, 100.0, 1.5);

        let persp = *camera.perspective_params();
        assert_relative_eq!(persp.aspect, 2.0);
        assert_relative_eq!(persp.fov, 60.0);

        let ortho = *camera.orthographic_params();
        assert_relative_eq!((ortho.right - ortho.left) / (ortho.top - ortho.bottom), 2.0, epsilon = 1e-5);
        assert_relative_eq!(ortho.zoom, 1.5);

        camera.set_mode(ProjectionMode::Orthographic);
        assert_vp_consistent(&camera);
        let center = camera.project_point(&Point3::origin(), 1000, 500).unwrap();
        assert_relative_eq!(center.x, 500.0, epsilon = 1e-3);
        assert_relative_eq!(center.y, 250.0, epsilon = 1e-3);
    }

    #[test]
    fn points_behind_perspective_camera_are_rejected() {
        let camera = Camera::default();
        assert!(camera.project_point(&Point3::new(0.0, 0.0, 10.0), 800, 600).is_none());
        assert!(camera.project_point(&Point3::new(0.0, 0.0, 0.0), 800, 600).is_some());
    }

    #[test]
    fn screen_y_points_down() {
        let camera = Camera::default();
        let above = camera.project_point(&Point3::new(0.0, 1.0, 0.0), 800, 600).unwrap();
        assert!(above.y < 300.0);
        let right = camera.project_point(&Point3::new(1.0, 0.0, 0.0), 800, 600).unwrap();
        assert!(right.x > 400.0);
    }

    fn assert_finite(camera: &Camera) {
        assert!(camera.projection_matrix().iter().all(|v| v.is_finite()));
        assert!(camera.view_projection_matrix().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn zero_width_viewport_keeps_a_positive_aspect() {
        let camera = Camera::new(0, 240);
        assert!(camera.perspective_params().aspect > 0.0);
        assert_finite(&camera);

        let mut camera = Camera::new(800, 400);
        camera.setup_for_viewport(0, 600, 45.0, 0.1, 100.0, 1.0);
        assert_relative_eq!(camera.perspective_params().aspect, 2.0);
        let ortho = *camera.orthographic_params();
        assert!(ortho.right - ortho.left > 0.0);
        camera.set_mode(ProjectionMode::Orthographic);
        assert_finite(&camera);
        assert_vp_consistent(&camera);
    }

    #[test]
    fn collapsed_clip_range_is_widened() {
        let mut camera = Camera::default();
        camera.set_clip(1.0, 1.0);
        assert!(camera.far() > camera.near());
        assert_finite(&camera);

        camera.set_clip(10.0, 2.0);
        assert!(camera.far() > camera.near());
        camera.set_mode(ProjectionMode::Orthographic);
        assert_finite(&camera);

        let camera = Camera::perspective(60.0, 0.0, 5.0, 5.0);
        assert!(camera.perspective_params().aspect > 0.0);
        assert!(camera.far() > camera.near());
        assert_finite(&camera);
    }

    #[test]
    fn empty_orthographic_frustum_is_widened() {
        let camera = Camera::orthographic(1.0, 1.0, 2.0, 2.0, 0.1, 100.0);
        let ortho = *camera.orthographic_params();
        assert!(ortho.right > ortho.left);
        assert!(ortho.top > ortho.bottom);
        assert_relative_eq!((ortho.left + ortho.right) / 2.0, 1.0);
        assert_finite(&camera);

        let mut camera = Camera::orthographic(-1.0, 1.0, 1.0, -1.0, 0.1, 100.0);
        camera.set_zoom(f32::INFINITY);
        assert_finite(&camera);
        // Zero field of view collapses the derived orthographic frustum
        camera.setup_for_viewport(320, 240, 0.0, 0.1, 100.0, 1.0);
        assert_finite(&camera);
        camera.set_mode(ProjectionMode::Perspective);
        assert_relative_eq!(camera.perspective_params().fov, 45.0);
        assert_finite(&camera);
    }
}
