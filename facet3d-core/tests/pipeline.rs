/// End-to-end rendering scenarios
use approx::assert_relative_eq;
use facet3d_core::{
    error::LoadError,
    load_model,
    material::TextureState,
    Camera, Color, Face, Fill, Geometry, Material, Mesh, NodeKey, Renderer, Scene, SceneNode,
    Texture, TextureStore,
};
use nalgebra::{Point2, Point3};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn signed_area(points: &[Point2<f32>; 3]) -> f32 {
    let [a, b, c] = points;
    ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)) * 0.5
}

fn add_mesh(scene: &mut Scene, name: &str, mesh: Mesh) -> NodeKey {
    let root = scene.root();
    scene.add_child(root, SceneNode::mesh(name, mesh)).unwrap()
}

/// A triangle facing +Z at depth `z`
fn facing_triangle(z: f32, offset_x: f32) -> Mesh {
    let mut geometry = Geometry::new();
    geometry.add_vertex(Point3::new(offset_x - 1.0, -1.0, z));
    geometry.add_vertex(Point3::new(offset_x + 1.0, -1.0, z));
    geometry.add_vertex(Point3::new(offset_x, 1.0, z));
    geometry.add_face(Face::new(0, 1, 2)).unwrap();
    Mesh::new(geometry, Material::default())
}

#[test]
fn unit_cube_front_face_projects_to_two_triangles() {
    let mut scene = Scene::new();
    add_mesh(&mut scene, "cube", Mesh::cube(1.0, Material::default()));
    let mut camera = Camera::new(WIDTH, HEIGHT);
    camera.look_at(Point3::origin());
    let mut renderer = Renderer::new(WIDTH, HEIGHT);

    let frame = renderer.render(&mut scene, &mut camera, &TextureStore::new());

    assert_eq!(frame.polygons.len(), 2);
    let areas: Vec<f32> = frame.polygons.iter().map(|p| signed_area(&p.points)).collect();
    // Screen y points down, so counter-clockwise world winding has negative screen area
    assert!(areas.iter().all(|&a| a < 0.0), "areas {areas:?}");

    for polygon in &frame.polygons {
        for point in &polygon.points {
            assert!(point.x > 0.0 && point.x < WIDTH as f32);
            assert!(point.y > 0.0 && point.y < HEIGHT as f32);
        }
    }

    // Back face (slots 2 and 3 of the cube) is culled
    assert!(frame.polygons.iter().all(|p| p.face_index != 2 && p.face_index != 3));
}

#[test]
fn back_faces_appear_only_without_culling() {
    let mut scene = Scene::new();
    add_mesh(&mut scene, "cube", Mesh::cube(1.0, Material::default()));
    let mut camera = Camera::new(WIDTH, HEIGHT);
    let mut renderer = Renderer::new(WIDTH, HEIGHT);
    let textures = TextureStore::new();

    let culled = renderer.render(&mut scene, &mut camera, &textures);
    assert!(!culled.polygons.iter().any(|p| p.face_index == 2));

    renderer.settings.backface_culling = false;
    let kept = renderer.render(&mut scene, &mut camera, &textures);
    assert!(kept.polygons.iter().any(|p| p.face_index == 2));
    assert!(kept.polygons.iter().any(|p| p.face_index == 3));
}

#[test]
fn overlapping_cubes_are_split_only_with_intersections_enabled() {
    let mut scene = Scene::new();
    add_mesh(&mut scene, "a", Mesh::cube(1.0, Material::default()));
    let root = scene.root();
    scene
        .add_child(
            root,
            SceneNode::mesh("b", Mesh::cube(1.0, Material::new(Color::from_hex(0x3366cc))))
                .with_position(0.5, 0.0, 0.0),
        )
        .unwrap();

    let mut camera = Camera::new(WIDTH, HEIGHT);
    camera.orbit(Point3::origin(), 5.0, 1.1, 0.6);
    let mut renderer = Renderer::new(WIDTH, HEIGHT);
    renderer.settings.backface_culling = false;
    let textures = TextureStore::new();

    let split = renderer.render(&mut scene, &mut camera, &textures);
    assert!(split.polygons.len() > 24, "got {}", split.polygons.len());
    assert!(split.stats.intersecting_pairs > 0);
    assert!(split.polygons.iter().any(|p| p.subdivided));

    renderer.settings.intersections = false;
    let whole = renderer.render(&mut scene, &mut camera, &textures);
    assert_eq!(whole.polygons.len(), 24);
    assert_eq!(whole.stats.intersection_tests, 0);
    assert!(whole.polygons.iter().all(|p| !p.subdivided));
}

#[test]
fn painter_order_draws_far_before_near() {
    let mut scene = Scene::new();
    // Insert the near triangle first so insertion order cannot explain the result
    let near = add_mesh(&mut scene, "near", facing_triangle(0.0, -1.5));
    let far = add_mesh(&mut scene, "far", facing_triangle(-2.0, 1.5));

    let mut camera = Camera::new(WIDTH, HEIGHT);
    let mut renderer = Renderer::new(WIDTH, HEIGHT);
    let frame = renderer.render(&mut scene, &mut camera, &TextureStore::new());

    let position = |key: NodeKey| frame.polygons.iter().position(|p| p.object == key).unwrap();
    assert!(position(far) < position(near));
    assert!(frame.polygons[position(far)].depth > frame.polygons[position(near)].depth);
}

#[test]
fn failed_texture_keeps_literal_color() {
    let mut textures = TextureStore::new();
    let id = textures.insert(Texture::from_url("missing.png"));
    textures.fail(id, "404");
    assert!(matches!(textures.state(id), Some(TextureState::Failed(_))));

    let color = Color::new(0.2, 0.4, 0.6);
    let mut scene = Scene::new();
    add_mesh(&mut scene, "cube", Mesh::cube(1.0, Material::new(color).with_texture(id)));
    let mut camera = Camera::new(WIDTH, HEIGHT);
    let mut renderer = Renderer::new(WIDTH, HEIGHT);

    for _ in 0..3 {
        let frame = renderer.render(&mut scene, &mut camera, &textures);
        assert!(!frame.polygons.is_empty());
        for polygon in &frame.polygons {
            assert_eq!(
                polygon.fill,
                Fill::Solid {
                    color,
                    opacity: 1.0
                }
            );
        }
    }
    assert!(renderer.patterns().is_empty());
}

#[test]
fn pending_texture_is_picked_up_after_load() {
    let mut textures = TextureStore::new();
    let id = textures.insert(Texture::from_url("brick.png"));

    let mut scene = Scene::new();
    add_mesh(&mut scene, "cube", Mesh::cube(1.0, Material::default().with_texture(id)));
    let mut camera = Camera::new(WIDTH, HEIGHT);
    let mut renderer = Renderer::new(WIDTH, HEIGHT);

    let before = renderer.render(&mut scene, &mut camera, &textures);
    assert!(before.polygons.iter().all(|p| matches!(p.fill, Fill::Solid { .. })));

    textures.complete(id, 64, 64);
    let after = renderer.render(&mut scene, &mut camera, &textures);
    assert!(after.polygons.iter().all(|p| matches!(p.fill, Fill::Texture { .. })));

    let svg = facet3d_core::frame_to_svg(&after, &textures);
    assert!(svg.contains("<pattern"));
    assert!(svg.contains("patternTransform=\"matrix("));
}

#[test]
fn orbit_keeps_requested_distance() {
    let target = Point3::new(1.0, -2.0, 0.5);
    let mut camera = Camera::new(WIDTH, HEIGHT);
    for distance in [0.5_f32, 3.0, 42.0] {
        for phi in [0.1_f32, 0.8, 1.5, 2.4, 3.0] {
            for step in 0..8 {
                let theta = step as f32 * std::f32::consts::TAU / 8.0;
                camera.orbit(target, distance, phi, theta);
                assert_relative_eq!(
                    (camera.position() - target).norm(),
                    distance,
                    max_relative = 1e-4
                );
            }
        }
    }
}

#[test]
fn loaded_obj_renders() {
    let obj = "o tri\nv -1 -1 0\nv 1 -1 0\nv 0 1 0\nv 0 0 0\nf 1 2 3\nf 1 2 x\n";
    let report = load_model(obj.as_bytes(), "obj").unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.groups, vec!["tri".to_string()]);

    let mut scene = Scene::new();
    add_mesh(&mut scene, "tri", report.mesh);
    let mut camera = Camera::new(WIDTH, HEIGHT);
    let mut renderer = Renderer::new(WIDTH, HEIGHT);
    let frame = renderer.render(&mut scene, &mut camera, &TextureStore::new());
    assert_eq!(frame.polygons.len(), 1);
}

#[test]
fn binary_stl_is_refused() {
    let mut data = vec![0u8; 84 + 50];
    data[80..84].copy_from_slice(&1u32.to_le_bytes());
    assert!(matches!(
        load_model(&data, "stl"),
        Err(LoadError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        load_model(b"{}", "gltf"),
        Err(LoadError::UnsupportedFormat(_))
    ));
}
