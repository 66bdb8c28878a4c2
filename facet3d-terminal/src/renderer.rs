/// ASCII rasterizer for terminal rendering
///
/// Polygons arrive already in painter's order, so later polygons simply
/// overwrite earlier ones. There is no depth buffer.
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use facet3d_core::{renderer::Marker, DrawPolygon, Fill, Frame};
use nalgebra::Point2;
use std::io::Write;

/// Character luminosity ramp for shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

const TEXTURE_CHAR: char = '%';
const EDGE_CHAR: char = '#';
const MARKER_CHAR: char = 'x';

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    character: char,
    color: Option<(u8, u8, u8)>,
}

const EMPTY: Cell = Cell {
    character: ' ',
    color: None,
};

/// Character-cell canvas that paints a [`Frame`]
pub struct AsciiRenderer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl AsciiRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![EMPTY; width * height],
        }
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.cells = vec![EMPTY; width * height];
    }

    pub fn clear(&mut self) {
        self.cells.fill(EMPTY);
    }

    /// Paint every polygon and marker of `frame` in order.
    ///
    /// Frame coordinates are scaled to the canvas, so the frame may be
    /// rendered at a different resolution than the terminal grid.
    pub fn draw_frame(&mut self, frame: &Frame) {
        self.clear();
        let sx = self.width as f32 / frame.width.max(1) as f32;
        let sy = self.height as f32 / frame.height.max(1) as f32;
        let scale = |p: &Point2<f32>| Point2::new(p.x * sx, p.y * sy);

        for polygon in &frame.polygons {
            let points = polygon.points.map(|p| scale(&p));
            self.draw_polygon(polygon, &points);
        }
        for Marker { position, .. } in &frame.markers {
            let p = scale(position);
            self.put(p.x as i32, p.y as i32, Cell {
                character: MARKER_CHAR,
                color: Some((255, 59, 48)),
            });
        }
    }

    fn draw_polygon(&mut self, polygon: &DrawPolygon, points: &[Point2<f32>; 3]) {
        match &polygon.fill {
            Fill::Solid { color, .. } => {
                let cell = Cell {
                    character: ramp_char(color.luminance()),
                    color: Some(to_rgb(color)),
                };
                self.rasterize_triangle(points, cell);
            }
            Fill::Texture { .. } => {
                let cell = Cell {
                    character: TEXTURE_CHAR,
                    color: None,
                };
                self.rasterize_triangle(points, cell);
            }
            Fill::None => {}
        }

        if let Some(stroke) = &polygon.stroke {
            let cell = Cell {
                character: EDGE_CHAR,
                color: Some(to_rgb(&stroke.color)),
            };
            for i in 0..3 {
                self.draw_line(&points[i], &points[(i + 1) % 3], cell);
            }
        }
    }

    fn rasterize_triangle(&mut self, coords: &[Point2<f32>; 3], cell: Cell) {
        let [v0, v1, v2] = coords;

        // Bounding box
        let min_x = v0.x.min(v1.x).min(v2.x).floor() as i32;
        let max_x = v0.x.max(v1.x).max(v2.x).ceil() as i32;
        let min_y = v0.y.min(v1.y).min(v2.y).floor() as i32;
        let max_y = v0.y.max(v1.y).max(v2.y).ceil() as i32;

        // Clip to screen bounds
        let min_x = min_x.max(0);
        let max_x = max_x.min(self.width as i32 - 1);
        let min_y = min_y.max(0);
        let max_y = max_y.min(self.height as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
                if let Some((w0, w1, w2)) = barycentric(v0, v1, v2, &p) {
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        self.put(x, y, cell);
                    }
                }
            }
        }
    }

    /// Bresenham line between two canvas points
    fn draw_line(&mut self, from: &Point2<f32>, to: &Point2<f32>, cell: Cell) {
        let (mut x0, mut y0) = (from.x as i32, from.y as i32);
        let (x1, y1) = (to.x as i32, to.y as i32);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let step_x = if x0 < x1 { 1 } else { -1 };
        let step_y = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        // Lines far outside the canvas are not worth walking
        let limit = (self.width + self.height) as i32 * 4;

        for _ in 0..=limit {
            self.put(x0, y0, cell);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += step_x;
            }
            if e2 <= dx {
                err += dx;
                y0 += step_y;
            }
        }
    }

    fn put(&mut self, x: i32, y: i32, cell: Cell) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.cells[y as usize * self.width + x as usize] = cell;
        }
    }

    /// Character at a canvas position, for inspection
    pub fn char_at(&self, x: usize, y: usize) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.cells[y * self.width + x].character)
    }

    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = self.cells[y * self.width + x];
                let color = match cell.color {
                    Some((r, g, b)) => Color::Rgb { r, g, b },
                    None => match cell.character {
                        ' ' | '.' | ':' => Color::DarkGrey,
                        '-' | '=' => Color::Grey,
                        _ => Color::Cyan,
                    },
                };

                writer.queue(SetForegroundColor(color))?;
                writer.queue(Print(cell.character))?;
            }
            if y + 1 < self.height {
                writer.queue(Print("\r\n"))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

fn ramp_char(luminance: f32) -> char {
    // Keep filled faces visible even when fully dark
    let index = (luminance.clamp(0.0, 1.0) * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
    LUMINOSITY_RAMP[index.clamp(1, LUMINOSITY_RAMP.len() - 1)]
}

fn to_rgb(color: &facet3d_core::Color) -> (u8, u8, u8) {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    (channel(color.r), channel(color.g), channel(color.b))
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: &Point2<f32>,
    v1: &Point2<f32>,
    v2: &Point2<f32>,
    p: &Point2<f32>,
) -> Option<(f32, f32, f32)> {
    let denom = (v1.y - v2.y) * (v0.x - v2.x) + (v2.x - v1.x) * (v0.y - v2.y);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.y - v2.y) * (p.x - v2.x) + (v2.x - v1.x) * (p.y - v2.y)) / denom;
    let w1 = ((v2.y - v0.y) * (p.x - v2.x) + (v0.x - v2.x) * (p.y - v2.y)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}
