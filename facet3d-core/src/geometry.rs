/// Indexed triangle geometry and meshes
use nalgebra::{Point3, Vector2, Vector3};

use crate::error::GeometryError;
use crate::material::Material;
use crate::math::normalize_or_zero;

/// A triangle referencing vertices of its [`Geometry`] by index
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub normal: Vector3<f32>,
    /// Slot in the owning mesh's material list
    pub material: usize,
    pub uvs: Option<[usize; 3]>,
    pub normals: Option<[usize; 3]>,
}

impl Face {
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        Self {
            a,
            b,
            c,
            normal: Vector3::zeros(),
            material: 0,
            uvs: None,
            normals: None,
        }
    }

    pub fn with_material(mut self, slot: usize) -> Self {
        self.material = slot;
        self
    }

    pub fn with_uvs(mut self, uvs: [usize; 3]) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_normals(mut self, normals: [usize; 3]) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn indices(&self) -> [usize; 3] {
        [self.a, self.b, self.c]
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f32>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self {
            min: first,
            max: first,
        };
        for p in iter {
            aabb.include(p);
        }
        Some(aabb)
    }

    pub fn include(&mut self, p: &Point3<f32>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grow by `amount` on every side
    pub fn padded(&self, amount: f32) -> Aabb {
        let pad = Vector3::repeat(amount);
        Aabb {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }
}

/// Vertex buffers plus a face list.
///
/// Buffers are append-only, so every index checked by `add_face` stays valid.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    vertices: Vec<Point3<f32>>,
    normals: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
    faces: Vec<Face>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, faces: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            normals: Vec::new(),
            uvs: Vec::new(),
            faces: Vec::with_capacity(faces),
        }
    }

    pub fn add_vertex(&mut self, position: Point3<f32>) -> usize {
        self.vertices.push(position);
        self.vertices.len() - 1
    }

    pub fn add_normal(&mut self, normal: Vector3<f32>) -> usize {
        self.normals.push(normal);
        self.normals.len() - 1
    }

    pub fn add_uv(&mut self, uv: Vector2<f32>) -> usize {
        self.uvs.push(uv);
        self.uvs.len() - 1
    }

    /// Append a face after checking every index it carries.
    ///
    /// A zero face normal is replaced by the geometric normal of the triangle.
    pub fn add_face(&mut self, mut face: Face) -> Result<usize, GeometryError> {
        let index = self.faces.len();
        check_indices(index, &face.indices(), self.vertices.len())?;
        if let Some(uvs) = &face.uvs {
            check_indices(index, uvs, self.uvs.len())?;
        }
        if let Some(normals) = &face.normals {
            check_indices(index, normals, self.normals.len())?;
        }

        if face.normal == Vector3::zeros() {
            face.normal = triangle_normal(&[
                self.vertices[face.a],
                self.vertices[face.b],
                self.vertices[face.c],
            ]);
        }
        self.faces.push(face);
        Ok(index)
    }

    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vector3<f32>] {
        &self.normals
    }

    pub fn uvs(&self) -> &[Vector2<f32>] {
        &self.uvs
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle(&self, face: &Face) -> [Point3<f32>; 3] {
        [self.vertices[face.a], self.vertices[face.b], self.vertices[face.c]]
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }

    /// True when the geometry has zero thickness along some axis (e.g. a ground plane)
    pub fn is_flat(&self, epsilon: f32) -> bool {
        self.bounding_box()
            .map(|bb| bb.size().iter().any(|extent| extent.abs() <= epsilon))
            .unwrap_or(false)
    }

    /// Axis-aligned cube centered at the origin, 4 vertices and 2 faces per side,
    /// counter-clockwise when seen from outside.
    pub fn cube(size: f32) -> Self {
        let half = size / 2.0;
        let x = Vector3::x();
        let y = Vector3::y();
        let z = Vector3::z();
        // (normal, u axis, v axis) with u x v == normal
        let sides = [
            (z, x, y),   // front
            (-z, -x, y), // back
            (y, x, -z),  // top
            (-y, x, z),  // bottom
            (x, -z, y),  // right
            (-x, z, y),  // left
        ];

        let mut geometry = Self::with_capacity(24, 12);
        for (normal, u, v) in sides {
            push_quad(&mut geometry, normal * half, u * half, v * half, normal);
        }
        geometry
    }

    /// Flat rectangle in the XZ plane facing +Y
    pub fn plane(width: f32, depth: f32) -> Self {
        let mut geometry = Self::with_capacity(4, 2);
        push_quad(
            &mut geometry,
            Vector3::zeros(),
            Vector3::x() * (width / 2.0),
            -Vector3::z() * (depth / 2.0),
            Vector3::y(),
        );
        geometry
    }
}

fn push_quad(
    geometry: &mut Geometry,
    center: Vector3<f32>,
    u: Vector3<f32>,
    v: Vector3<f32>,
    normal: Vector3<f32>,
) {
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let n = geometry.add_normal(normal);
    let base = geometry.vertices.len();
    let uv_base = geometry.uvs.len();
    for (su, sv) in corners {
        geometry.add_vertex(Point3::from(center + u * su + v * sv));
        geometry.add_uv(Vector2::new((su + 1.0) / 2.0, (sv + 1.0) / 2.0));
    }

    for [i, j, k] in [[0, 1, 2], [0, 2, 3]] {
        let mut face = Face::new(base + i, base + j, base + k)
            .with_uvs([uv_base + i, uv_base + j, uv_base + k])
            .with_normals([n, n, n]);
        face.normal = normal;
        geometry.faces.push(face);
    }
}

fn check_indices(face: usize, indices: &[usize; 3], len: usize) -> Result<(), GeometryError> {
    match indices.iter().find(|&&index| index >= len) {
        Some(&index) => Err(GeometryError::IndexOutOfRange { face, index, len }),
        None => Ok(()),
    }
}

/// Unit normal of a counter-clockwise triangle; zero for degenerate input
pub fn triangle_normal(points: &[Point3<f32>; 3]) -> Vector3<f32> {
    let edge1 = points[1] - points[0];
    let edge2 = points[2] - points[0];
    normalize_or_zero(&edge1.cross(&edge2))
}

/// Area of a triangle
pub fn triangle_area(points: &[Point3<f32>; 3]) -> f32 {
    (points[1] - points[0]).cross(&(points[2] - points[0])).norm() * 0.5
}

/// Geometry plus the materials its faces refer to by slot
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Geometry,
    materials: Vec<Material>,
}

impl Mesh {
    /// A mesh where every face uses one material
    pub fn new(geometry: Geometry, material: Material) -> Self {
        let mut geometry = geometry;
        for face in &mut geometry.faces {
            face.material = 0;
        }
        Self {
            geometry,
            materials: vec![material],
        }
    }

    /// A mesh with several material slots; every face slot must exist
    pub fn with_materials(
        geometry: Geometry,
        materials: Vec<Material>,
    ) -> Result<Self, GeometryError> {
        let len = materials.len().max(1);
        if let Some((face, f)) = geometry
            .faces
            .iter()
            .enumerate()
            .find(|(_, f)| f.material >= len)
        {
            return Err(GeometryError::MaterialOutOfRange {
                face,
                slot: f.material,
                len,
            });
        }
        let materials = if materials.is_empty() {
            vec![Material::default()]
        } else {
            materials
        };
        Ok(Self {
            geometry,
            materials,
        })
    }

    /// Create a simple cube mesh for testing
    pub fn cube(size: f32, material: Material) -> Self {
        Self::new(Geometry::cube(size), material)
    }

    pub fn material(&self, slot: usize) -> &Material {
        &self.materials[slot.min(self.materials.len() - 1)]
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut [Material] {
        &mut self.materials
    }
}
