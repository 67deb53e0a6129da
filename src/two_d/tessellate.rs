//! Turns a recorded [`DrawList`] into colored triangles.
//!
//! Fills and strokes become one indexed triangle list in canvas pixels.
//! Text and images cannot be tessellated and are passed through as overlays
//! for the host to draw on top.

use bevy_asset::RenderAssetUsages;
use bevy_mesh::{Indices, Mesh, PrimitiveTopology};
use error_stack::{Report, ResultExt};
use lyon_tessellation::math::point;
use lyon_tessellation::path::Path;
use lyon_tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, StrokeOptions, StrokeTessellator,
    StrokeVertex, VertexBuffers,
};
use thiserror::Error;

use crate::core::Color;
use crate::{OdometryError, Result};

use super::canvas::{DrawCommand, DrawList, Path2d};

#[derive(Debug, Error)]
#[error("lyon rejected a path: {0}")]
struct LyonError(String);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColoredVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

#[derive(Clone, Debug, Default)]
pub struct TessellatedFrame {
    pub size: [f32; 2],
    pub background: Option<Color>,
    pub vertices: Vec<ColoredVertex>,
    pub indices: Vec<u32>,
    /// Text and image commands, in draw order.
    pub overlays: Vec<DrawCommand>,
}

impl TessellatedFrame {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Mesh in canvas pixels with y flipped to point up.
    pub fn to_mesh(&self) -> Mesh {
        let positions: Vec<[f32; 3]> = self
            .vertices
            .iter()
            .map(|v| [v.position[0], -v.position[1], 0.0])
            .collect();
        let colors: Vec<[f32; 4]> = self.vertices.iter().map(|v| v.color).collect();
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
            .with_inserted_indices(Indices::U32(self.indices.clone()))
    }
}

fn to_lyon(path: &Path2d) -> Path {
    let mut builder = Path::builder();
    for sub in path.subpaths() {
        let Some((first, rest)) = sub.points.split_first() else {
            continue;
        };
        builder.begin(point(first.x, first.y));
        for p in rest {
            builder.line_to(point(p.x, p.y));
        }
        builder.end(sub.closed);
    }
    builder.build()
}

fn premultiplied(color: Color, alpha: f32) -> [f32; 4] {
    [color.r, color.g, color.b, color.a * alpha]
}

/// Tessellates every fill and stroke in `list` with the given curve
/// tolerance (canvas pixels).
pub fn tessellate(list: &DrawList, tolerance: f32) -> Result<TessellatedFrame> {
    let tolerance = if tolerance.is_finite() && tolerance > 0.0 { tolerance } else { 0.1 };
    let mut frame = TessellatedFrame::default();
    let mut buffers: VertexBuffers<ColoredVertex, u32> = VertexBuffers::new();
    let mut fill = FillTessellator::new();
    let mut stroke = StrokeTessellator::new();

    for command in list.commands() {
        match command {
            DrawCommand::Clear { size, background } => {
                frame.size = [size.x, size.y];
                frame.background = *background;
            }
            DrawCommand::Fill { path, color, alpha } => {
                let color = premultiplied(*color, *alpha);
                fill.tessellate_path(
                    &to_lyon(path),
                    &FillOptions::default().with_tolerance(tolerance),
                    &mut BuffersBuilder::new(&mut buffers, |v: FillVertex| ColoredVertex {
                        position: v.position().to_array(),
                        color,
                    }),
                )
                .map_err(|e| Report::new(LyonError(format!("{e:?}"))))
                .change_context(OdometryError::Tessellation)?;
            }
            DrawCommand::Stroke {
                path,
                color,
                width,
                alpha,
            } => {
                if !(width.is_finite() && *width > 0.0) {
                    continue;
                }
                let color = premultiplied(*color, *alpha);
                stroke
                    .tessellate_path(
                        &to_lyon(path),
                        &StrokeOptions::default()
                            .with_line_width(*width)
                            .with_tolerance(tolerance),
                        &mut BuffersBuilder::new(&mut buffers, |v: StrokeVertex| ColoredVertex {
                            position: v.position().to_array(),
                            color,
                        }),
                    )
                    .map_err(|e| Report::new(LyonError(format!("{e:?}"))))
                    .change_context(OdometryError::Tessellation)?;
            }
            DrawCommand::Text { .. } | DrawCommand::Image { .. } => {
                frame.overlays.push(command.clone());
            }
        }
    }

    frame.vertices = buffers.vertices;
    frame.indices = buffers.indices;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::two_d::canvas::{Canvas, TextAlign};
    use bevy_math::Vec2;

    #[test]
    fn square_fill_is_two_triangles() {
        let mut list = DrawList::new();
        list.clear(Vec2::new(100.0, 50.0), Some(Color::BLACK));
        list.set_alpha(0.5);
        list.fill(
            &Path2d::polygon([
                Vec2::new(0.0, 0.0),
                Vec2::new(10.0, 0.0),
                Vec2::new(10.0, 10.0),
                Vec2::new(0.0, 10.0),
            ]),
            Color::RED,
        );
        let frame = tessellate(&list, 0.1).unwrap();
        assert_eq!(frame.size, [100.0, 50.0]);
        assert_eq!(frame.background, Some(Color::BLACK));
        assert_eq!(frame.triangle_count(), 2);
        assert!(frame.vertices.iter().all(|v| v.color == [1.0, 0.0, 0.0, 0.5]));
    }

    #[test]
    fn strokes_and_overlays() {
        let mut list = DrawList::new();
        list.stroke(&Path2d::polyline([Vec2::ZERO, Vec2::new(20.0, 0.0)]), Color::WHITE, 2.0);
        list.stroke(&Path2d::polyline([Vec2::ZERO, Vec2::ONE]), Color::WHITE, 0.0);
        list.text("1.00 m", Vec2::ZERO, 12.0, Color::WHITE, TextAlign::Center);
        list.image("fields/2025.png", Vec2::ZERO, Vec2::splat(10.0));
        let frame = tessellate(&list, 0.1).unwrap();
        assert!(frame.triangle_count() >= 2);
        assert_eq!(frame.overlays.len(), 2);
        let mesh = frame.to_mesh();
        assert_eq!(mesh.count_vertices(), frame.vertices.len());
    }
}
