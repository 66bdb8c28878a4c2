/// Wavefront OBJ parser
///
/// Supports `v`, `vt`, `vn`, `f` (with `v/vt/vn`, `v//vn` and negative
/// indices), `g`/`o` names and `usemtl` slots. Polygons are fan
/// triangulated. Malformed records are skipped and counted.
use std::collections::HashMap;

use nalgebra::{Point3, Vector2, Vector3};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, space0, space1},
    combinator::{map_res, opt, recognize},
    multi::separated_list1,
    number::complete::float,
    sequence::{pair, preceded},
    IResult,
};

use crate::error::LoadError;
use crate::geometry::{Face, Geometry};

/// Parsed OBJ content
#[derive(Debug, Clone, Default)]
pub struct ObjModel {
    pub geometry: Geometry,
    /// Material names in slot order, as introduced by `usemtl`
    pub materials: Vec<String>,
    /// `g` and `o` names in order of appearance
    pub groups: Vec<String>,
    /// Records that could not be parsed or referenced missing data
    pub skipped: usize,
}

/// One `v/vt/vn` corner, indices as written (1-based or negative)
#[derive(Debug, Clone, Copy, PartialEq)]
struct Corner {
    position: i64,
    uv: Option<i64>,
    normal: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Record<'a> {
    Vertex(Point3<f32>),
    Uv(Vector2<f32>),
    Normal(Vector3<f32>),
    Face(Vec<Corner>),
    Group(&'a str),
    UseMaterial(&'a str),
    Ignored,
}

pub fn parse_obj(input: &str) -> Result<ObjModel, LoadError> {
    let mut model = ObjModel::default();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut current_slot = 0;

    for (number, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record = match parse_record(line) {
            Ok((rest, record)) if rest.trim().is_empty() => record,
            _ => {
                tracing::debug!(line = number + 1, text = line, "Skipping malformed OBJ record");
                model.skipped += 1;
                continue;
            }
        };

        match record {
            Record::Vertex(p) => {
                model.geometry.add_vertex(p);
            }
            Record::Uv(uv) => {
                model.geometry.add_uv(uv);
            }
            Record::Normal(n) => {
                model.geometry.add_normal(n);
            }
            Record::Group(name) => model.groups.push(name.to_string()),
            Record::UseMaterial(name) => {
                current_slot = match slots.get(name) {
                    Some(&slot) => slot,
                    None => {
                        model.materials.push(name.to_string());
                        let slot = model.materials.len() - 1;
                        slots.insert(name.to_string(), slot);
                        slot
                    }
                };
            }
            Record::Face(corners) => {
                if !push_polygon(&mut model.geometry, &corners, current_slot) {
                    tracing::debug!(line = number + 1, "Skipping OBJ face with bad indices");
                    model.skipped += 1;
                }
            }
            Record::Ignored => {}
        }
    }

    if model.skipped > 0 {
        tracing::warn!(skipped = model.skipped, "Skipped malformed OBJ records");
    }
    if model.geometry.face_count() == 0 {
        return Err(LoadError::Empty);
    }
    Ok(model)
}

/// Resolve a 1-based or negative (relative to the end) index
fn resolve(index: i64, len: usize) -> Option<usize> {
    let resolved = match index {
        0 => return None,
        i if i > 0 => i - 1,
        i => len as i64 + i,
    };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

/// Fan triangulate a polygon. Returns false without adding anything when an index is bad.
fn push_polygon(geometry: &mut Geometry, corners: &[Corner], slot: usize) -> bool {
    if corners.len() < 3 {
        return false;
    }

    let mut resolved = Vec::with_capacity(corners.len());
    for corner in corners {
        let Some(position) = resolve(corner.position, geometry.vertex_count()) else {
            return false;
        };
        let uv = match corner.uv {
            Some(i) => match resolve(i, geometry.uvs().len()) {
                Some(i) => Some(i),
                None => return false,
            },
            None => None,
        };
        let normal = match corner.normal {
            Some(i) => match resolve(i, geometry.normals().len()) {
                Some(i) => Some(i),
                None => return false,
            },
            None => None,
        };
        resolved.push((position, uv, normal));
    }

    let all_uvs = resolved.iter().all(|(_, uv, _)| uv.is_some());
    let all_normals = resolved.iter().all(|(_, _, n)| n.is_some());
    let first = resolved[0];
    for pair in resolved[1..].windows(2) {
        let tri = [first, pair[0], pair[1]];
        let mut face = Face::new(tri[0].0, tri[1].0, tri[2].0).with_material(slot);
        if all_uvs {
            face = face.with_uvs(tri.map(|(_, uv, _)| uv.unwrap_or_default()));
        }
        if all_normals {
            face = face.with_normals(tri.map(|(_, _, n)| n.unwrap_or_default()));
        }
        if geometry.add_face(face).is_err() {
            return false;
        }
    }
    true
}

fn parse_record(line: &str) -> IResult<&str, Record<'_>> {
    alt((
        preceded(pair(tag("vt"), space1), parse_uv),
        preceded(pair(tag("vn"), space1), parse_normal),
        preceded(pair(tag("v"), space1), parse_vertex),
        preceded(pair(tag("f"), space1), parse_face),
        preceded(pair(alt((tag("g"), tag("o"))), space1), parse_name(Record::Group)),
        preceded(pair(tag("usemtl"), space1), parse_name(Record::UseMaterial)),
        parse_ignored,
    ))(line)
}

fn parse_vertex(input: &str) -> IResult<&str, Record<'_>> {
    let (input, (x, y, z)) = parse_triple(input)?;
    // Optional w and vertex colors are ignored
    let (input, _) = opt(preceded(space1, separated_list1(space1, float)))(input)?;
    Ok((input, Record::Vertex(Point3::new(x, y, z))))
}

fn parse_normal(input: &str) -> IResult<&str, Record<'_>> {
    let (input, (x, y, z)) = parse_triple(input)?;
    Ok((input, Record::Normal(Vector3::new(x, y, z))))
}

fn parse_uv(input: &str) -> IResult<&str, Record<'_>> {
    let (input, u) = float(input)?;
    let (input, v) = opt(preceded(space1, float))(input)?;
    let (input, _) = opt(preceded(space1, float))(input)?;
    Ok((input, Record::Uv(Vector2::new(u, v.unwrap_or(0.0)))))
}

fn parse_triple(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, x) = float(input)?;
    let (input, _) = space1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = space1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}

fn parse_face(input: &str) -> IResult<&str, Record<'_>> {
    let (input, corners) = separated_list1(space1, parse_corner)(input)?;
    let (input, _) = space0(input)?;
    Ok((input, Record::Face(corners)))
}

fn parse_corner(input: &str) -> IResult<&str, Corner> {
    let (input, position) = parse_index(input)?;
    let (input, uv) = opt(preceded(char('/'), opt(parse_index)))(input)?;
    let (input, normal) = opt(preceded(char('/'), parse_index))(input)?;
    Ok((
        input,
        Corner {
            position,
            uv: uv.flatten(),
            normal,
        },
    ))
}

fn parse_index(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse)(input)
}

fn parse_name<'a>(
    wrap: fn(&'a str) -> Record<'a>,
) -> impl FnMut(&'a str) -> IResult<&'a str, Record<'a>> {
    move |input: &'a str| {
        let name = input.trim();
        if name.is_empty() {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Space,
            )));
        }
        Ok(("", wrap(name)))
    }
}

/// Known statements that carry no geometry
fn parse_ignored(input: &str) -> IResult<&str, Record<'_>> {
    let (_, _) = alt((
        pair(tag("mtllib"), space1),
        pair(tag("s"), space1),
        pair(tag("l"), space1),
        pair(tag("vp"), space1),
    ))(input)?;
    Ok(("", Record::Ignored))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "# a unit quad
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl red
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_is_fan_triangulated() {
        let model = parse_obj(QUAD).unwrap();
        assert_eq!(model.geometry.face_count(), 2);
        assert_eq!(model.geometry.faces()[0].indices(), [0, 1, 2]);
        assert_eq!(model.geometry.faces()[1].indices(), [0, 2, 3]);
        assert_eq!(model.geometry.faces()[1].uvs, Some([0, 2, 3]));
        assert_eq!(model.geometry.faces()[0].normals, Some([0, 0, 0]));
        assert_eq!(model.groups, vec!["quad".to_string()]);
        assert_eq!(model.materials, vec!["red".to_string()]);
        assert_eq!(model.skipped, 0);
    }

    #[test]
    fn negative_indices_are_relative() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let model = parse_obj(text).unwrap();
        assert_eq!(model.geometry.faces()[0].indices(), [0, 1, 2]);
        assert_eq!(model.geometry.faces()[0].normal, Vector3::z());
    }

    #[test]
    fn normal_only_corners() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        let model = parse_obj(text).unwrap();
        let face = &model.geometry.faces()[0];
        assert_eq!(face.uvs, None);
        assert_eq!(face.normals, Some([0, 0, 0]));
    }

    #[test]
    fn malformed_records_are_counted() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 nope 0\nf 1 2 9\nbogus line\nf 1 2 3\n";
        let model = parse_obj(text).unwrap();
        assert_eq!(model.skipped, 3);
        assert_eq!(model.geometry.face_count(), 1);
    }

    #[test]
    fn usemtl_assigns_slots() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl a\nf 1 2 3\nusemtl b\nf 1 2 3\nusemtl a\nf 1 2 3\n";
        let model = parse_obj(text).unwrap();
        let slots: Vec<usize> = model.geometry.faces().iter().map(|f| f.material).collect();
        assert_eq!(slots, vec![0, 1, 0]);
        assert_eq!(model.materials.len(), 2);
    }

    #[test]
    fn no_faces_is_empty() {
        assert!(matches!(parse_obj("v 0 0 0\n"), Err(LoadError::Empty)));
    }
}
