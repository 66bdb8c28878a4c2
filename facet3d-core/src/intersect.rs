/// Plane classification, triangle/triangle intersection and triangle splitting.
///
/// The triangle test is deliberately conservative: it only tries each
/// triangle's own supporting plane as a separating plane, so nearly coplanar
/// or edge-adjacent triangles can be reported as intersecting. Splitting
/// tolerates that by returning the triangle unsplit whenever the plane does not
/// cut it cleanly.
use nalgebra::{Point3, Vector3};

use crate::geometry::Aabb;

/// Signed distance below which a point counts as lying on a plane
pub const CLASSIFY_EPSILON: f32 = 1e-5;

/// Cross-product magnitude below which two planes are parallel
pub const PARALLEL_EPSILON: f32 = 1e-6;

/// Which side of a plane a point is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Front,
    Back,
    On,
}

impl Side {
    /// `+1` front, `-1` back, `0` on the plane
    pub fn sign(self) -> i8 {
        match self {
            Side::Front => 1,
            Side::Back => -1,
            Side::On => 0,
        }
    }

    fn opposes(self, other: Side) -> bool {
        matches!(
            (self, other),
            (Side::Front, Side::Back) | (Side::Back, Side::Front)
        )
    }
}

/// `normal . p + d = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f32>,
    pub d: f32,
}

impl Plane {
    /// Plane through three counter-clockwise points. `None` for a degenerate triangle.
    pub fn from_points(a: &Point3<f32>, b: &Point3<f32>, c: &Point3<f32>) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        let length = normal.norm();
        if length <= f32::EPSILON {
            return None;
        }
        let normal = normal / length;
        Some(Self {
            normal,
            d: -normal.dot(&a.coords),
        })
    }

    pub fn from_triangle(tri: &[Point3<f32>; 3]) -> Option<Self> {
        Self::from_points(&tri[0], &tri[1], &tri[2])
    }

    pub fn signed_distance(&self, point: &Point3<f32>) -> f32 {
        self.normal.dot(&point.coords) + self.d
    }

    pub fn classify_point(&self, point: &Point3<f32>, epsilon: f32) -> Side {
        let distance = self.signed_distance(point);
        if distance > epsilon {
            Side::Front
        } else if distance < -epsilon {
            Side::Back
        } else {
            Side::On
        }
    }

    /// Intersection of the infinite line `origin + t * direction` with the plane
    pub fn intersect_line(&self, origin: &Point3<f32>, direction: &Vector3<f32>) -> Option<Point3<f32>> {
        let denom = self.normal.dot(direction);
        if denom.abs() <= f32::EPSILON {
            return None;
        }
        let t = -self.signed_distance(origin) / denom;
        Some(origin + direction * t)
    }

    /// Intersection with the segment `a..b`, with the parameter `t` along it
    pub fn intersect_segment(&self, a: &Point3<f32>, b: &Point3<f32>) -> Option<(Point3<f32>, f32)> {
        let da = self.signed_distance(a);
        let db = self.signed_distance(b);
        let denom = da - db;
        if denom.abs() <= f32::EPSILON {
            return None;
        }
        let t = da / denom;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }
        Some((a + (b - a) * t, t))
    }
}

fn strictly_one_side(plane: &Plane, tri: &[Point3<f32>; 3]) -> bool {
    let sides = tri.map(|p| plane.classify_point(&p, CLASSIFY_EPSILON));
    sides.iter().all(|&s| s == Side::Front) || sides.iter().all(|&s| s == Side::Back)
}

/// Conservative triangle/triangle overlap test.
///
/// Returns false only when one triangle's supporting plane has all three
/// vertices of the other strictly on one side. Degenerate triangles never
/// intersect anything.
pub fn triangles_intersect(t1: &[Point3<f32>; 3], t2: &[Point3<f32>; 3]) -> bool {
    let (Some(p1), Some(p2)) = (Plane::from_triangle(t1), Plane::from_triangle(t2)) else {
        return false;
    };
    !(strictly_one_side(&p1, t2) || strictly_one_side(&p2, t1))
}

/// A point on a source triangle together with its barycentric weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubVertex {
    pub position: Point3<f32>,
    pub barycentric: Vector3<f32>,
}

impl SubVertex {
    fn corner(tri: &[Point3<f32>; 3], i: usize) -> Self {
        let mut barycentric = Vector3::zeros();
        barycentric[i] = 1.0;
        Self {
            position: tri[i],
            barycentric,
        }
    }
}

fn edge_crossing(tri: &[Point3<f32>; 3], plane: &Plane, i: usize, j: usize) -> SubVertex {
    let di = plane.signed_distance(&tri[i]);
    let dj = plane.signed_distance(&tri[j]);
    let t = di / (di - dj);
    let mut barycentric = Vector3::zeros();
    barycentric[i] = 1.0 - t;
    barycentric[j] = t;
    SubVertex {
        position: tri[i] + (tri[j] - tri[i]) * t,
        barycentric,
    }
}

/// Points where the triangle's boundary meets the plane.
///
/// Each vertex lying on the plane contributes itself and each edge whose
/// endpoints are strictly on opposite sides contributes its crossing point.
/// The usual crossing yields 2 points, a touching vertex 1, a coplanar
/// triangle 3.
pub fn triangle_plane_intersection(tri: &[Point3<f32>; 3], plane: &Plane) -> Vec<SubVertex> {
    let sides = tri.map(|p| plane.classify_point(&p, CLASSIFY_EPSILON));
    let mut points = Vec::with_capacity(3);
    for i in 0..3 {
        let j = (i + 1) % 3;
        if sides[i] == Side::On {
            points.push(SubVertex::corner(tri, i));
        }
        if sides[i].opposes(sides[j]) {
            points.push(edge_crossing(tri, plane, i, j));
        }
    }
    points
}

/// A piece of a split triangle and the side of the splitting plane it lies on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub vertices: [SubVertex; 3],
    pub side: Side,
}

impl Fragment {
    fn whole(tri: &[Point3<f32>; 3]) -> Self {
        Self {
            vertices: [
                SubVertex::corner(tri, 0),
                SubVertex::corner(tri, 1),
                SubVertex::corner(tri, 2),
            ],
            side: Side::On,
        }
    }

    pub fn positions(&self) -> [Point3<f32>; 3] {
        self.vertices.map(|v| v.position)
    }
}

/// Split `tri` along `plane`.
///
/// With one vertex isolated on one side, emits one fragment on that side and
/// two on the other. With one vertex on the plane and the opposite edge
/// crossing it, emits one fragment per side. Anything else (no crossing, a
/// touching vertex, a coplanar triangle) returns the triangle unsplit as a
/// single fragment tagged [`Side::On`]. Fragments keep the source winding.
pub fn subdivide_triangle(tri: &[Point3<f32>; 3], plane: &Plane) -> Vec<Fragment> {
    let hits = triangle_plane_intersection(tri, plane);
    if hits.len() != 2 {
        return vec![Fragment::whole(tri)];
    }

    let sides = tri.map(|p| plane.classify_point(&p, CLASSIFY_EPSILON));
    let count = |side: Side| sides.iter().filter(|&&s| s == side).count();
    let (front, back, on) = (count(Side::Front), count(Side::Back), count(Side::On));

    if on == 0 && (front == 1 || back == 1) {
        let lonely = if front == 1 { Side::Front } else { Side::Back };
        let Some(a) = sides.iter().position(|&s| s == lonely) else {
            return vec![Fragment::whole(tri)];
        };
        let (b, c) = ((a + 1) % 3, (a + 2) % 3);
        let ab = edge_crossing(tri, plane, a, b);
        let ca = edge_crossing(tri, plane, c, a);
        let (va, vb, vc) = (
            SubVertex::corner(tri, a),
            SubVertex::corner(tri, b),
            SubVertex::corner(tri, c),
        );
        return vec![
            Fragment {
                vertices: [va, ab, ca],
                side: sides[a],
            },
            Fragment {
                vertices: [ab, vb, vc],
                side: sides[b],
            },
            Fragment {
                vertices: [ab, vc, ca],
                side: sides[b],
            },
        ];
    }

    if on == 1 && front == 1 && back == 1 {
        let Some(a) = sides.iter().position(|&s| s == Side::On) else {
            return vec![Fragment::whole(tri)];
        };
        let (b, c) = ((a + 1) % 3, (a + 2) % 3);
        let bc = edge_crossing(tri, plane, b, c);
        let (va, vb, vc) = (
            SubVertex::corner(tri, a),
            SubVertex::corner(tri, b),
            SubVertex::corner(tri, c),
        );
        return vec![
            Fragment {
                vertices: [va, vb, bc],
                side: sides[b],
            },
            Fragment {
                vertices: [va, bc, vc],
                side: sides[c],
            },
        ];
    }

    vec![Fragment::whole(tri)]
}

/// An infinite line with a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line3 {
    pub point: Point3<f32>,
    pub direction: Vector3<f32>,
}

impl Line3 {
    pub fn at(&self, t: f32) -> Point3<f32> {
        self.point + self.direction * t
    }
}

/// Line shared by two planes, `None` when they are parallel.
///
/// The point on the line is found by zeroing the coordinate along which the
/// line direction is largest and solving both plane equations for the other two.
pub fn plane_plane_intersection(a: &Plane, b: &Plane) -> Option<Line3> {
    let direction = a.normal.cross(&b.normal);
    let length = direction.norm();
    if length < PARALLEL_EPSILON {
        return None;
    }

    let k = direction.iamax();
    let (i, j) = ((k + 1) % 3, (k + 2) % 3);
    let det = a.normal[i] * b.normal[j] - a.normal[j] * b.normal[i];
    if det.abs() <= f32::EPSILON {
        return None;
    }

    let mut point = Point3::origin();
    point[i] = (-a.d * b.normal[j] + b.d * a.normal[j]) / det;
    point[j] = (-b.d * a.normal[i] + a.d * b.normal[i]) / det;
    Some(Line3 {
        point,
        direction: direction / length,
    })
}

/// Evenly spaced points on `line` inside `bounds` grown by `padding`.
/// Empty when the line misses the box.
pub fn generate_intersection_markers(
    line: &Line3,
    bounds: &Aabb,
    padding: f32,
    count: usize,
) -> Vec<Point3<f32>> {
    let bounds = bounds.padded(padding);
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for axis in 0..3 {
        let origin = line.point[axis];
        let dir = line.direction[axis];
        if dir.abs() <= f32::EPSILON {
            if origin < bounds.min[axis] || origin > bounds.max[axis] {
                return Vec::new();
            }
            continue;
        }
        let t1 = (bounds.min[axis] - origin) / dir;
        let t2 = (bounds.max[axis] - origin) / dir;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
        if t_min > t_max {
            return Vec::new();
        }
    }

    match count {
        0 => Vec::new(),
        1 => vec![line.at((t_min + t_max) * 0.5)],
        _ => (0..count)
            .map(|n| line.at(t_min + (t_max - t_min) * n as f32 / (count - 1) as f32))
            .collect(),
    }
}
