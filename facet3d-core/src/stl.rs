/// ASCII STL parser. Binary STL is recognised and refused.
use nom::{
    bytes::complete::tag,
    character::complete::{multispace0, multispace1, not_line_ending},
    number::complete::float,
    sequence::preceded,
    IResult,
};

use nalgebra::{Point3, Vector3};

use crate::error::LoadError;
use crate::geometry::{triangle_normal, Face, Geometry};

const BINARY_HEADER_LEN: usize = 80;
const BINARY_RECORD_LEN: usize = 50;

/// Parsed ASCII STL
#[derive(Debug, Clone)]
pub struct StlModel {
    pub name: String,
    pub geometry: Geometry,
    /// Facets that could not be parsed and were skipped
    pub skipped: usize,
}

/// Detect and parse an STL file; binary STL is an unsupported format
pub fn parse_stl(data: &[u8]) -> Result<StlModel, LoadError> {
    if looks_binary(data) {
        return Err(LoadError::UnsupportedFormat("binary STL".into()));
    }
    let text = std::str::from_utf8(data)
        .map_err(|_| LoadError::UnsupportedFormat("binary STL".into()))?;
    parse_ascii_stl(text)
}

fn looks_binary(data: &[u8]) -> bool {
    let trimmed = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &data[start..])
        .unwrap_or(data);
    if !trimmed.starts_with(b"solid") {
        return true;
    }
    // Binary files may also start with "solid"; trust the size field when it matches exactly
    if data.len() >= BINARY_HEADER_LEN + 4 {
        let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]);
        let expected = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(BINARY_RECORD_LEN))
            .and_then(|body| body.checked_add(BINARY_HEADER_LEN + 4));
        if expected == Some(data.len()) {
            return true;
        }
    }
    false
}

/// Parse an ASCII STL file. Malformed facets are skipped and counted.
pub fn parse_ascii_stl(input: &str) -> Result<StlModel, LoadError> {
    let (mut input, name) = parse_header(input).map_err(|e| LoadError::Parse {
        line: 1,
        message: format!("missing solid header: {e:?}"),
    })?;

    let mut geometry = Geometry::new();
    let mut skipped = 0;
    loop {
        input = input.trim_start();
        if input.is_empty() || input.starts_with("endsolid") {
            break;
        }
        match parse_facet(input) {
            Ok((rest, (normal, corners))) => {
                input = rest;
                push_facet(&mut geometry, normal, corners);
            }
            Err(_) => {
                skipped += 1;
                // Resynchronise on the next facet boundary
                match input.find("endfacet") {
                    Some(at) => input = &input[at + "endfacet".len()..],
                    None => break,
                }
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "Skipped malformed STL facets");
    }
    if geometry.face_count() == 0 {
        return Err(LoadError::Empty);
    }
    Ok(StlModel {
        name: name.trim().to_string(),
        geometry,
        skipped,
    })
}

fn push_facet(geometry: &mut Geometry, normal: (f32, f32, f32), corners: [(f32, f32, f32); 3]) {
    let points = corners.map(|(x, y, z)| Point3::new(x, y, z));
    let base = geometry.vertex_count();
    for p in points {
        geometry.add_vertex(p);
    }

    let mut face = Face::new(base, base + 1, base + 2);
    let stored = Vector3::new(normal.0, normal.1, normal.2);
    face.normal = if stored.norm() > 0.5 {
        stored.normalize()
    } else {
        triangle_normal(&points)
    };
    // Indices were just pushed, so this cannot fail
    if let Err(err) = geometry.add_face(face) {
        tracing::warn!(%err, "Dropped STL facet");
    }
}

fn parse_header(input: &str) -> IResult<&str, &str> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    not_line_ending(input)
}

type Facet = ((f32, f32, f32), [(f32, f32, f32); 3]);

fn parse_facet(input: &str) -> IResult<&str, Facet> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = parse_vector3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, v1) = parse_vertex(input)?;
    let (input, v2) = parse_vertex(input)?;
    let (input, v3) = parse_vertex(input)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((input, (normal, [v1, v2, v3])))
}

fn parse_vertex(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = preceded(multispace0, tag("vertex"))(input)?;
    parse_vector3(input)
}

fn parse_vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}
