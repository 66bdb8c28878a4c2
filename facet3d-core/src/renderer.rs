/// Per-frame projection, culling, intersection splitting and painter's-order
/// compositing.
///
/// A frame runs to completion in one call: matrices are refreshed, every
/// visible mesh is projected, faces are culled and keyed by their nearest
/// vertex, crossing faces from different objects are split against each
/// other, and everything is sorted farthest first into a list of filled
/// polygons. Failures are contained per face: a face that cannot be projected
/// is skipped and counted, never propagated.
use std::cmp::Reverse;

use nalgebra::{Matrix4, Point2, Point3, Vector2, Vector3};

use crate::config::{RenderMode, RenderSettings};
use crate::geometry::{triangle_normal, Aabb, Face, Mesh};
use crate::intersect::{
    generate_intersection_markers, plane_plane_intersection, subdivide_triangle,
    triangles_intersect, Fragment, Plane, Side,
};
use crate::material::{Color, Material, PatternCache, PatternId, Shading, TextureId, TextureStore};
use crate::math::{normalize_or_zero, Transform};
use crate::projection::{Camera, ProjectionMode, ScreenPoint};
use crate::scene::{NodeKey, Scene};

/// How a polygon is filled
#[derive(Debug, Clone, PartialEq)]
pub enum Fill {
    None,
    Solid {
        color: Color,
        opacity: f32,
    },
    /// Image fill; `uvs` are per-corner texture coordinates already mapped
    /// through the texture's wrap parameters.
    Texture {
        pattern: PatternId,
        texture: TextureId,
        uvs: [Vector2<f32>; 3],
        texture_size: (u32, u32),
        opacity: f32,
    },
}

/// Outline of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
    pub opacity: f32,
}

/// One filled triangle in screen space, in draw order
#[derive(Debug, Clone, PartialEq)]
pub struct DrawPolygon {
    pub points: [Point2<f32>; 3],
    pub fill: Fill,
    pub stroke: Option<Stroke>,
    pub depth: f32,
    pub object: NodeKey,
    pub face_index: usize,
    pub subdivided: bool,
}

/// A diagnostic dot on an intersection seam
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub position: Point2<f32>,
    pub radius: f32,
}

/// Counters for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub meshes: usize,
    pub faces: usize,
    pub culled: usize,
    pub skipped: usize,
    pub intersection_tests: usize,
    pub intersecting_pairs: usize,
    pub subdivided: usize,
    pub emitted: usize,
}

/// The output of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub polygons: Vec<DrawPolygon>,
    pub markers: Vec<Marker>,
    pub stats: FrameStats,
}

/// Two crossing triangles whose seam gets diagnostic markers
type Seam = ([Point3<f32>; 3], [Point3<f32>; 3]);

/// A face that survived culling, or a fragment of one
#[derive(Debug, Clone)]
pub struct RenderableFace<'a> {
    pub object: NodeKey,
    pub face_index: usize,
    pub screen: [ScreenPoint; 3],
    pub world: [Point3<f32>; 3],
    /// Corner weights relative to the source face's corners
    pub barycentric: [Vector3<f32>; 3],
    /// Nearest vertex distance to the camera
    pub depth: f32,
    pub is_subdivided: bool,
    pub is_front: bool,
    pub sequence: usize,
    mesh: &'a Mesh,
    face: &'a Face,
    world_matrix: Matrix4<f32>,
}

impl<'a> RenderableFace<'a> {
    pub fn material(&self) -> &'a Material {
        self.mesh.material(self.face.material)
    }

    fn transparent(&self, mode: RenderMode) -> bool {
        mode != RenderMode::Solid && self.material().is_transparent()
    }
}

/// Software renderer producing painter's-ordered polygon lists
#[derive(Debug)]
pub struct Renderer {
    width: u32,
    height: u32,
    pub settings: RenderSettings,
    patterns: PatternCache,
    last_stats: FrameStats,
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_settings(width, height, RenderSettings::default())
    }

    pub fn with_settings(width: u32, height: u32, settings: RenderSettings) -> Self {
        Self {
            width,
            height,
            settings,
            patterns: PatternCache::new(),
            last_stats: FrameStats::default(),
        }
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Render one frame of `scene` as seen by `camera`
    pub fn render(&mut self, scene: &mut Scene, camera: &mut Camera, textures: &TextureStore) -> Frame {
        // Toggles are frozen for the whole frame
        let settings = self.settings.clone();
        let mut stats = FrameStats::default();

        camera.update_matrices();
        scene.update_world_matrices();
        let scene: &Scene = scene;
        let camera: &Camera = camera;

        let mut faces = self.collect_faces(scene, camera, &settings, &mut stats);

        let mut seams = Vec::new();
        if settings.intersections && faces.len() >= 2 {
            let (split, pairs) = resolve_intersections(&faces, &settings, &mut stats);
            faces = self.rebuild_with_fragments(faces, split, camera, &mut stats);
            seams = pairs;
        }
        for (sequence, face) in faces.iter_mut().enumerate() {
            face.sequence = sequence;
        }

        let ordered = sort_faces(faces, &settings);
        let (min_depth, max_depth) = depth_range(&ordered);

        let mut polygons = Vec::with_capacity(ordered.len());
        for face in &ordered {
            polygons.push(self.draw_face(face, &settings, textures, min_depth, max_depth));
        }
        stats.emitted = polygons.len();

        let markers = seams
            .iter()
            .flat_map(|seam| self.seam_markers(seam, camera, &settings))
            .collect();

        tracing::debug!(
            meshes = stats.meshes,
            faces = stats.faces,
            culled = stats.culled,
            skipped = stats.skipped,
            tests = stats.intersection_tests,
            pairs = stats.intersecting_pairs,
            subdivided = stats.subdivided,
            emitted = stats.emitted,
            "Frame rendered"
        );
        self.last_stats = stats;

        Frame {
            width: self.width,
            height: self.height,
            polygons,
            markers,
            stats,
        }
    }

    fn collect_faces<'a>(
        &self,
        scene: &'a Scene,
        camera: &Camera,
        settings: &RenderSettings,
        stats: &mut FrameStats,
    ) -> Vec<RenderableFace<'a>> {
        let eye = camera.position();
        let orthographic_view = match camera.mode() {
            ProjectionMode::Orthographic => Some(normalize_or_zero(&(eye - camera.target()))),
            ProjectionMode::Perspective => None,
        };

        let mut faces = Vec::new();
        for (key, node, mesh) in scene.visible_meshes() {
            stats.meshes += 1;
            let world_matrix = *node.transform.world_matrix();
            let geometry = &mesh.geometry;
            let world: Vec<Point3<f32>> = geometry
                .vertices()
                .iter()
                .map(|v| Transform::transform_point(&world_matrix, v))
                .collect();
            let projected: Vec<Option<ScreenPoint>> = world
                .iter()
                .map(|p| camera.project_point(p, self.width, self.height))
                .collect();
            let flat = geometry.is_flat(settings.flat_epsilon);

            for (face_index, face) in geometry.faces().iter().enumerate() {
                stats.faces += 1;
                let tri = [world[face.a], world[face.b], world[face.c]];
                let normal = triangle_normal(&tri);
                if normal == Vector3::zeros() {
                    stats.skipped += 1;
                    continue;
                }

                let centroid = Point3::from((tri[0].coords + tri[1].coords + tri[2].coords) / 3.0);
                let to_camera = orthographic_view.unwrap_or_else(|| normalize_or_zero(&(eye - centroid)));
                let facing = normal.dot(&to_camera);
                if settings.backface_culling && !flat && facing < -settings.cull_epsilon {
                    stats.culled += 1;
                    continue;
                }

                let (Some(a), Some(b), Some(c)) = (projected[face.a], projected[face.b], projected[face.c])
                else {
                    stats.skipped += 1;
                    continue;
                };

                let depth = nearest_distance(&tri, &eye);
                if !depth.is_finite() {
                    stats.skipped += 1;
                    continue;
                }

                faces.push(RenderableFace {
                    object: key,
                    face_index,
                    screen: [a, b, c],
                    world: tri,
                    barycentric: [Vector3::x(), Vector3::y(), Vector3::z()],
                    depth,
                    is_subdivided: false,
                    is_front: false,
                    sequence: faces.len(),
                    mesh,
                    face,
                    world_matrix,
                });
            }
        }
        faces
    }

    fn rebuild_with_fragments<'a>(
        &self,
        faces: Vec<RenderableFace<'a>>,
        split: Vec<Option<Vec<Fragment>>>,
        camera: &Camera,
        stats: &mut FrameStats,
    ) -> Vec<RenderableFace<'a>> {
        let eye = camera.position();
        let mut rebuilt = Vec::with_capacity(faces.len());
        for (face, fragments) in faces.into_iter().zip(split) {
            let Some(fragments) = fragments else {
                rebuilt.push(face);
                continue;
            };
            stats.subdivided += 1;

            for fragment in fragments {
                let world = fragment.positions();
                let screen = world.map(|p| camera.project_point(&p, self.width, self.height));
                let [Some(a), Some(b), Some(c)] = screen else {
                    stats.skipped += 1;
                    continue;
                };
                let barycentric = fragment.vertices.map(|v| compose_barycentric(&face.barycentric, &v.barycentric));
                rebuilt.push(RenderableFace {
                    screen: [a, b, c],
                    world,
                    barycentric,
                    depth: nearest_distance(&world, &eye),
                    is_subdivided: true,
                    is_front: fragment.side == Side::Front,
                    ..face.clone()
                });
            }
        }
        rebuilt
    }

    fn draw_face(
        &mut self,
        face: &RenderableFace<'_>,
        settings: &RenderSettings,
        textures: &TextureStore,
        min_depth: f32,
        max_depth: f32,
    ) -> DrawPolygon {
        let material = face.material();
        let outline = |color: Color, opacity: f32| Stroke {
            color,
            width: settings.stroke_width,
            opacity,
        };

        let (fill, stroke) = match settings.mode {
            RenderMode::Wireframe => (Fill::None, Some(outline(material.color, 1.0))),
            RenderMode::Depth => {
                let span = max_depth - min_depth;
                let t = if span > f32::EPSILON {
                    (face.depth - min_depth) / span
                } else {
                    0.0
                };
                let grey = 1.0 - t.clamp(0.0, 1.0) * 0.85;
                let fill = Fill::Solid {
                    color: Color::new(grey, grey, grey),
                    opacity: 1.0,
                };
                (fill, settings.wireframe.then(|| outline(Color::BLACK, 1.0)))
            }
            RenderMode::Normal | RenderMode::Solid => {
                let opacity = if settings.mode == RenderMode::Solid {
                    1.0
                } else {
                    material.opacity
                };
                if material.wireframe {
                    (Fill::None, Some(outline(material.color, opacity)))
                } else {
                    let fill = self.material_fill(face, material, opacity, settings, textures);
                    let stroke = settings
                        .wireframe
                        .then(|| outline(material.color.scale(0.5), opacity));
                    (fill, stroke)
                }
            }
        };

        DrawPolygon {
            points: face.screen.map(|p| Point2::new(p.x, p.y)),
            fill,
            stroke,
            depth: face.depth,
            object: face.object,
            face_index: face.face_index,
            subdivided: face.is_subdivided,
        }
    }

    fn material_fill(
        &mut self,
        face: &RenderableFace<'_>,
        material: &Material,
        opacity: f32,
        settings: &RenderSettings,
        textures: &TextureStore,
    ) -> Fill {
        if let Some(texture_id) = material.texture {
            // Anything short of a completed load draws the literal material color
            let loaded = textures.loaded(texture_id);
            let uvs = face_uvs(face);
            return match (loaded, uvs) {
                (Some((texture, width, height)), Some(uvs)) => Fill::Texture {
                    pattern: self.patterns.pattern_for(face.object, face.face_index),
                    texture: texture_id,
                    uvs: uvs.map(|uv| texture.map_uv(&uv)),
                    texture_size: (width, height),
                    opacity,
                },
                _ => Fill::Solid {
                    color: material.color,
                    opacity,
                },
            };
        }

        let normal = shading_normal(face, material);
        let diffuse = normal.dot(&-settings.light()).max(0.0);
        let intensity = settings.ambient + (1.0 - settings.ambient) * diffuse;
        Fill::Solid {
            color: material.color.scale(intensity),
            opacity,
        }
    }

    fn seam_markers(&self, seam: &Seam, camera: &Camera, settings: &RenderSettings) -> Vec<Marker> {
        let (a, b) = seam;
        let (Some(pa), Some(pb)) = (Plane::from_triangle(a), Plane::from_triangle(b)) else {
            return Vec::new();
        };
        let Some(line) = plane_plane_intersection(&pa, &pb) else {
            return Vec::new();
        };
        let Some(bounds) = Aabb::from_points(a.iter().chain(b.iter())) else {
            return Vec::new();
        };

        generate_intersection_markers(&line, &bounds, settings.marker_padding, settings.marker_samples)
            .iter()
            .filter_map(|p| camera.project_point(p, self.width, self.height))
            .map(|s| Marker {
                position: Point2::new(s.x, s.y),
                radius: settings.marker_radius,
            })
            .collect()
    }
}

/// Test every candidate pair and split both faces of each crossing pair.
///
/// A face is split at most once per frame: by the first partner that actually
/// cuts it. Pairs whose splits fall back leave both faces eligible for later
/// partners.
fn resolve_intersections(
    faces: &[RenderableFace<'_>],
    settings: &RenderSettings,
    stats: &mut FrameStats,
) -> (Vec<Option<Vec<Fragment>>>, Vec<Seam>) {
    let mut split: Vec<Option<Vec<Fragment>>> = vec![None; faces.len()];
    let mut seams = Vec::new();

    for i in 0..faces.len() {
        for j in (i + 1)..faces.len() {
            let (fi, fj) = (&faces[i], &faces[j]);
            if fi.object == fj.object || (fi.depth - fj.depth).abs() >= settings.intersection_threshold {
                continue;
            }
            if split[i].is_some() && split[j].is_some() {
                continue;
            }

            stats.intersection_tests += 1;
            if !triangles_intersect(&fi.world, &fj.world) {
                continue;
            }
            stats.intersecting_pairs += 1;
            tracing::trace!(a = fi.face_index, b = fj.face_index, "Faces may intersect");

            let mut any_split = false;
            for (me, other) in [(i, j), (j, i)] {
                if split[me].is_some() {
                    continue;
                }
                let Some(plane) = Plane::from_triangle(&faces[other].world) else {
                    continue;
                };
                let fragments = subdivide_triangle(&faces[me].world, &plane);
                if fragments.len() > 1 {
                    split[me] = Some(fragments);
                    any_split = true;
                }
            }

            if any_split && settings.show_intersection_lines {
                seams.push((fi.world, fj.world));
            }
        }
    }
    (split, seams)
}

/// Farthest first. Normal mode draws every opaque face before any transparent one.
fn sort_faces<'a>(faces: Vec<RenderableFace<'a>>, settings: &RenderSettings) -> Vec<RenderableFace<'a>> {
    let epsilon = settings.depth_tie_epsilon.max(1e-6);
    let key = |face: &RenderableFace<'_>| {
        (
            Reverse((face.depth / epsilon).floor() as i64),
            !face.is_subdivided,
            !face.is_front,
            face.transparent(settings.mode),
            face.sequence,
        )
    };

    if settings.mode == RenderMode::Normal {
        let (mut opaque, mut transparent): (Vec<_>, Vec<_>) =
            faces.into_iter().partition(|f| !f.transparent(settings.mode));
        opaque.sort_by_key(key);
        transparent.sort_by_key(key);
        opaque.extend(transparent);
        opaque
    } else {
        let mut faces = faces;
        faces.sort_by_key(key);
        faces
    }
}

fn depth_range(faces: &[RenderableFace<'_>]) -> (f32, f32) {
    faces.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), f| {
        (lo.min(f.depth), hi.max(f.depth))
    })
}

fn nearest_distance(tri: &[Point3<f32>; 3], eye: &Point3<f32>) -> f32 {
    tri.iter()
        .map(|p| (p - eye).norm())
        .fold(f32::INFINITY, f32::min)
}

fn compose_barycentric(parent: &[Vector3<f32>; 3], weights: &Vector3<f32>) -> Vector3<f32> {
    parent[0] * weights.x + parent[1] * weights.y + parent[2] * weights.z
}

fn face_uvs(face: &RenderableFace<'_>) -> Option<[Vector2<f32>; 3]> {
    let indices = face.face.uvs?;
    let uvs = face.mesh.geometry.uvs();
    let corner = [uvs[indices[0]], uvs[indices[1]], uvs[indices[2]]];
    Some(face.barycentric.map(|w| corner[0] * w.x + corner[1] * w.y + corner[2] * w.z))
}

/// Face normal for flat shading, the mean interpolated corner normal for Phong
fn shading_normal(face: &RenderableFace<'_>, material: &Material) -> Vector3<f32> {
    let flat = triangle_normal(&face.world);
    if material.shading != Shading::Phong {
        return flat;
    }
    let Some(indices) = face.face.normals else {
        return flat;
    };
    let Some(normal_matrix) = Transform::normal_matrix(&face.world_matrix) else {
        return flat;
    };
    let normals = face.mesh.geometry.normals();
    let corner = indices.map(|i| normal_matrix * normals[i]);
    let sum: Vector3<f32> = face
        .barycentric
        .iter()
        .map(|w| corner[0] * w.x + corner[1] * w.y + corner[2] * w.z)
        .sum();
    let smooth = normalize_or_zero(&sum);
    if smooth == Vector3::zeros() {
        flat
    } else {
        smooth
    }
}
