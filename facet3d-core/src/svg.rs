/// Serialises a [`Frame`] into a standalone SVG document.
///
/// Polygons are written in draw order, so document order is painter's order.
/// Textured faces reference one `<pattern>` per pattern id; its
/// `patternTransform` maps texture pixels onto the face's screen triangle.
use std::collections::HashSet;
use std::fmt::Write;

use nalgebra::{Matrix3, Point2, Vector2};

use crate::material::{PatternId, TextureStore};
use crate::renderer::{DrawPolygon, Fill, Frame};

const MARKER_COLOR: &str = "#ff3b30";

/// Write `frame` as an SVG document sized to the frame's viewport
pub fn frame_to_svg(frame: &Frame, textures: &TextureStore) -> String {
    let mut out = String::with_capacity(128 + frame.polygons.len() * 96);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = frame.width,
        h = frame.height
    );

    write_patterns(&mut out, frame, textures);

    for polygon in &frame.polygons {
        write_polygon(&mut out, polygon);
    }
    for marker in &frame.markers {
        let _ = writeln!(
            out,
            r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{MARKER_COLOR}"/>"#,
            marker.position.x, marker.position.y, marker.radius
        );
    }

    out.push_str("</svg>\n");
    out
}

fn write_patterns(out: &mut String, frame: &Frame, textures: &TextureStore) {
    let mut written: HashSet<PatternId> = HashSet::new();
    let mut opened = false;
    for polygon in &frame.polygons {
        let Fill::Texture {
            pattern,
            texture,
            uvs,
            texture_size: (width, height),
            ..
        } = &polygon.fill
        else {
            continue;
        };
        if !written.insert(*pattern) {
            continue;
        }
        let Some(texture) = textures.get(*texture) else {
            continue;
        };
        let transform = pattern_transform(uvs, (*width, *height), &polygon.points)
            .unwrap_or_else(|| {
                tracing::trace!(%pattern, "Degenerate texture mapping, pattern left untransformed");
                "matrix(1 0 0 1 0 0)".to_string()
            });

        if !opened {
            out.push_str("<defs>\n");
            opened = true;
        }
        let _ = writeln!(
            out,
            r#"<pattern id="{pattern}" patternUnits="userSpaceOnUse" width="{width}" height="{height}" patternTransform="{transform}"><image href="{href}" xlink:href="{href}" width="{width}" height="{height}" preserveAspectRatio="none"/></pattern>"#,
            href = escape_attr(&texture.href()),
        );
    }
    if opened {
        out.push_str("</defs>\n");
    }
}

fn write_polygon(out: &mut String, polygon: &DrawPolygon) {
    let [a, b, c] = polygon.points;
    let _ = write!(
        out,
        r#"<polygon points="{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}""#,
        a.x, a.y, b.x, b.y, c.x, c.y
    );

    match &polygon.fill {
        Fill::None => out.push_str(r#" fill="none""#),
        Fill::Solid { color, opacity } => {
            let _ = write!(out, r#" fill="{}""#, color.to_css());
            write_opacity(out, "fill-opacity", *opacity);
        }
        Fill::Texture {
            pattern, opacity, ..
        } => {
            let _ = write!(out, r#" fill="url(#{pattern})""#);
            write_opacity(out, "fill-opacity", *opacity);
        }
    }

    match &polygon.stroke {
        Some(stroke) => {
            let _ = write!(
                out,
                r#" stroke="{}" stroke-width="{}" stroke-linejoin="round""#,
                stroke.color.to_css(),
                stroke.width
            );
            write_opacity(out, "stroke-opacity", stroke.opacity);
        }
        // Hairline in the fill color hides seams between adjacent triangles
        None => {
            if let Fill::Solid { color, .. } = &polygon.fill {
                let _ = write!(out, r#" stroke="{}" stroke-width="0.5""#, color.to_css());
            }
        }
    }

    out.push_str("/>\n");
}

fn write_opacity(out: &mut String, attribute: &str, opacity: f32) {
    if opacity < 1.0 {
        let _ = write!(out, r#" {attribute}="{opacity:.3}""#);
    }
}

/// Affine map from texture pixel space to screen space, as an SVG `matrix(...)`.
///
/// Solves `S = M * T` for the three corners, where `T` holds the texture pixel
/// coordinates and `S` the screen positions in homogeneous columns.
pub fn pattern_transform(
    uvs: &[Vector2<f32>; 3],
    texture_size: (u32, u32),
    screen: &[Point2<f32>; 3],
) -> Option<String> {
    let (w, h) = (texture_size.0 as f32, texture_size.1 as f32);
    let texel = |i: usize| (uvs[i].x * w, uvs[i].y * h);

    let (t0, t1, t2) = (texel(0), texel(1), texel(2));
    let tex = Matrix3::new(
        t0.0, t1.0, t2.0, //
        t0.1, t1.1, t2.1, //
        1.0, 1.0, 1.0,
    );
    let scr = Matrix3::new(
        screen[0].x, screen[1].x, screen[2].x, //
        screen[0].y, screen[1].y, screen[2].y, //
        1.0, 1.0, 1.0,
    );
    if tex.determinant().abs() < 1e-6 {
        return None;
    }
    let m = scr * tex.try_inverse()?;
    Some(format!(
        "matrix({:.6} {:.6} {:.6} {:.6} {:.4} {:.4})",
        m[(0, 0)],
        m[(1, 0)],
        m[(0, 1)],
        m[(1, 1)],
        m[(0, 2)],
        m[(1, 2)]
    ))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{FrameStats, Marker, Stroke};
    use crate::material::Color;
    use crate::scene::NodeKey;
    use approx::assert_relative_eq;

    fn polygon(fill: Fill) -> DrawPolygon {
        DrawPolygon {
            points: [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(0.0, 10.0),
            ],
            fill,
            stroke: None,
            depth: 1.0,
            object: NodeKey::default(),
            face_index: 0,
            subdivided: false,
        }
    }

    fn frame(polygons: Vec<DrawPolygon>) -> Frame {
        Frame {
            width: 100,
            height: 50,
            polygons,
            markers: vec![Marker {
                position: Point2::new(5.0, 5.0),
                radius: 1.5,
            }],
            stats: FrameStats::default(),
        }
    }

    #[test]
    fn polygons_keep_draw_order() {
        let red = Fill::Solid {
            color: Color::new(1.0, 0.0, 0.0),
            opacity: 1.0,
        };
        let blue = Fill::Solid {
            color: Color::new(0.0, 0.0, 1.0),
            opacity: 0.5,
        };
        let svg = frame_to_svg(&frame(vec![polygon(red), polygon(blue)]), &TextureStore::new());

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"viewBox="0 0 100 50""#));
        let red_at = svg.find("#ff0000").unwrap();
        let blue_at = svg.find("#0000ff").unwrap();
        assert!(red_at < blue_at);
        assert!(svg.contains(r#"fill-opacity="0.500""#));
        assert!(svg.contains("<circle"));
    }

    #[test]
    fn wireframe_polygons_have_no_fill() {
        let mut outline = polygon(Fill::None);
        outline.stroke = Some(Stroke {
            color: Color::BLACK,
            width: 1.0,
            opacity: 1.0,
        });
        let svg = frame_to_svg(&frame(vec![outline]), &TextureStore::new());
        assert!(svg.contains(r#"fill="none""#));
        assert!(svg.contains(r##"stroke="#000000""##));
    }

    #[test]
    fn pattern_transform_maps_texels_to_screen() {
        let uvs = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        let screen = [
            Point2::new(10.0, 20.0),
            Point2::new(30.0, 20.0),
            Point2::new(10.0, 60.0),
        ];
        // 2x2 texture: x scales by 10, y by 20, translation (10, 20)
        let matrix = pattern_transform(&uvs, (2, 2), &screen).unwrap();
        let values: Vec<f32> = matrix
            .trim_start_matches("matrix(")
            .trim_end_matches(')')
            .split(' ')
            .map(|v| v.parse().unwrap())
            .collect();
        let expected = [10.0, 0.0, 0.0, 20.0, 10.0, 20.0];
        for (value, expected) in values.iter().zip(expected) {
            assert_relative_eq!(*value, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn degenerate_uvs_have_no_transform() {
        let uvs = [Vector2::new(0.5, 0.5); 3];
        let screen = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        assert!(pattern_transform(&uvs, (8, 8), &screen).is_none());
    }

    #[test]
    fn textured_fill_writes_one_pattern_per_id() {
        use crate::material::{PatternId, Texture};

        let mut textures = TextureStore::new();
        let id = textures.insert(Texture::from_url("brick.png"));
        textures.complete(id, 4, 4);
        let fill = Fill::Texture {
            pattern: PatternId(3),
            texture: id,
            uvs: [
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(0.0, 1.0),
            ],
            texture_size: (4, 4),
            opacity: 1.0,
        };
        let svg = frame_to_svg(&frame(vec![polygon(fill.clone()), polygon(fill)]), &textures);
        assert_eq!(svg.matches("<pattern").count(), 1);
        assert_eq!(svg.matches("url(#facet-pattern-3)").count(), 2);
        assert!(svg.contains(r#"href="brick.png""#));
    }
}
