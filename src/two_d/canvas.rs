//! Minimal 2D drawing surface.
//!
//! Coordinates are canvas pixels (page pixels × quality), y down. The global
//! alpha set through [`Canvas::set_alpha`] multiplies every following draw
//! call until changed or restored.

use std::f32::consts::TAU;

use bevy_math::Vec2;

use crate::core::Color;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubPath {
    pub points: Vec<Vec2>,
    pub closed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path2d {
    subpaths: Vec<SubPath>,
}

impl Path2d {
    /// Segments used for a full circle.
    const ARC_SEGMENTS: usize = 48;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(mut self, p: Vec2) -> Self {
        self.subpaths.push(SubPath {
            points: vec![p],
            closed: false,
        });
        self
    }

    pub fn line_to(mut self, p: Vec2) -> Self {
        match self.subpaths.last_mut() {
            Some(sub) if !sub.closed => sub.points.push(p),
            _ => return self.move_to(p),
        }
        self
    }

    pub fn close(mut self) -> Self {
        if let Some(sub) = self.subpaths.last_mut() {
            sub.closed = true;
        }
        self
    }

    pub fn polyline(points: impl IntoIterator<Item = Vec2>) -> Self {
        let mut path = Self::new();
        for (i, p) in points.into_iter().enumerate() {
            path = if i == 0 { path.move_to(p) } else { path.line_to(p) };
        }
        path
    }

    pub fn polygon(points: impl IntoIterator<Item = Vec2>) -> Self {
        Self::polyline(points).close()
    }

    /// Arc from `start` to `end` radians, approximated with line segments,
    /// starting a new subpath.
    pub fn arc(self, center: Vec2, radius: f32, start: f32, end: f32) -> Self {
        let sweep = end - start;
        let steps = ((sweep.abs() / TAU) * Self::ARC_SEGMENTS as f32).ceil().max(1.0) as usize;
        let point = |a: f32| center + Vec2::new(a.cos(), a.sin()) * radius;
        let mut path = self.move_to(point(start));
        for i in 1..=steps {
            path = path.line_to(point(start + sweep * i as f32 / steps as f32));
        }
        path
    }

    pub fn circle(center: Vec2, radius: f32) -> Self {
        Self::new().arc(center, radius, 0.0, TAU).close()
    }

    pub fn subpaths(&self) -> &[SubPath] {
        &self.subpaths
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.iter().all(|s| s.points.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

pub trait Canvas {
    /// Resets the surface to `size` canvas pixels, optionally painting a
    /// background.
    fn clear(&mut self, size: Vec2, background: Option<Color>);
    fn save(&mut self);
    fn restore(&mut self);
    fn set_alpha(&mut self, alpha: f32);
    fn alpha(&self) -> f32;
    fn fill(&mut self, path: &Path2d, color: Color);
    fn stroke(&mut self, path: &Path2d, color: Color, width: f32);
    fn text(&mut self, text: &str, position: Vec2, size: f32, color: Color, align: TextAlign);
    fn image(&mut self, source: &str, min: Vec2, size: Vec2);
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear {
        size: Vec2,
        background: Option<Color>,
    },
    Fill {
        path: Path2d,
        color: Color,
        alpha: f32,
    },
    Stroke {
        path: Path2d,
        color: Color,
        width: f32,
        alpha: f32,
    },
    Text {
        text: String,
        position: Vec2,
        size: f32,
        color: Color,
        align: TextAlign,
        alpha: f32,
    },
    Image {
        source: String,
        min: Vec2,
        size: Vec2,
        alpha: f32,
    },
}

/// Canvas that records draw calls, for tessellation or inspection.
#[derive(Clone, Debug)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    alpha: f32,
    stack: Vec<f32>,
}

impl Default for DrawList {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            alpha: 1.0,
            stack: Vec::new(),
        }
    }
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl Canvas for DrawList {
    fn clear(&mut self, size: Vec2, background: Option<Color>) {
        self.commands.clear();
        self.stack.clear();
        self.alpha = 1.0;
        self.commands.push(DrawCommand::Clear { size, background });
    }

    fn save(&mut self) {
        self.stack.push(self.alpha);
    }

    fn restore(&mut self) {
        if let Some(alpha) = self.stack.pop() {
            self.alpha = alpha;
        }
    }

    fn set_alpha(&mut self, alpha: f32) {
        self.alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
    }

    fn alpha(&self) -> f32 {
        self.alpha
    }

    fn fill(&mut self, path: &Path2d, color: Color) {
        if path.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::Fill {
            path: path.clone(),
            color,
            alpha: self.alpha,
        });
    }

    fn stroke(&mut self, path: &Path2d, color: Color, width: f32) {
        if path.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::Stroke {
            path: path.clone(),
            color,
            width,
            alpha: self.alpha,
        });
    }

    fn text(&mut self, text: &str, position: Vec2, size: f32, color: Color, align: TextAlign) {
        self.commands.push(DrawCommand::Text {
            text: text.to_owned(),
            position,
            size,
            color,
            align,
            alpha: self.alpha,
        });
    }

    fn image(&mut self, source: &str, min: Vec2, size: Vec2) {
        self.commands.push(DrawCommand::Image {
            source: source.to_owned(),
            min,
            size,
            alpha: self.alpha,
        });
    }
}
