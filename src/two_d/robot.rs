//! Robots, markers and game pieces drawn on the 2D field.

use std::f32::consts::PI;

use bevy_math::Vec2;

use crate::core::{Color, METERS_PER_INCH, Pose2d};
use crate::hint::Hint;
use crate::transform::{normalize_degrees, rotate_vec2};

use super::canvas::Path2d;
use super::render::{Drawable, HitContext, HoverToken, PaintContext};

/// Seconds of travel the velocity arrow shows.
pub const VELOCITY_SCALE: f32 = 1.0;

const NOTE_OUTER_RADIUS: f32 = 7.0 * METERS_PER_INCH;
const NOTE_INNER_RADIUS: f32 = 5.0 * METERS_PER_INCH;
const CONE_BASE: f32 = 8.375 * METERS_PER_INCH;
const CUBE_SIZE: f32 = 9.5 * METERS_PER_INCH;
const ALGAE_RADIUS: f32 = 8.125 * METERS_PER_INCH;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Robot,
    Ghost,
    Box,
    ArrowCenter,
    ArrowFront,
    ArrowBack,
    Target,
    Note,
    Cone,
    Cube,
    Algae,
}

struct ShapeSpec {
    kind: ShapeKind,
    tag: &'static str,
    aliases: &'static [&'static str],
    paint: fn(&Robot, &mut PaintContext<'_>),
    hit: fn(&Robot, &HitContext) -> Option<HoverToken>,
}

const SHAPES: [ShapeSpec; 11] = [
    ShapeSpec {
        kind: ShapeKind::Robot,
        tag: "§default",
        aliases: &["robot"],
        paint: paint_robot,
        hit: hit_robot,
    },
    ShapeSpec {
        kind: ShapeKind::Ghost,
        tag: "§ghost",
        aliases: &[],
        paint: paint_robot,
        hit: hit_robot,
    },
    ShapeSpec {
        kind: ShapeKind::Box,
        tag: "§box",
        aliases: &[],
        paint: paint_box,
        hit: hit_box,
    },
    ShapeSpec {
        kind: ShapeKind::ArrowCenter,
        tag: "§arrowCenter",
        aliases: &["arrow", "arrow-center"],
        paint: paint_arrow,
        hit: hit_arrow,
    },
    ShapeSpec {
        kind: ShapeKind::ArrowFront,
        tag: "§arrowFront",
        aliases: &["arrow-front"],
        paint: paint_arrow,
        hit: hit_arrow,
    },
    ShapeSpec {
        kind: ShapeKind::ArrowBack,
        tag: "§arrowBack",
        aliases: &["arrow-back"],
        paint: paint_arrow,
        hit: hit_arrow,
    },
    ShapeSpec {
        kind: ShapeKind::Target,
        tag: "§target",
        aliases: &[],
        paint: paint_target,
        hit: hit_target,
    },
    ShapeSpec {
        kind: ShapeKind::Note,
        tag: "§note",
        aliases: &[],
        paint: paint_note,
        hit: hit_round_piece,
    },
    ShapeSpec {
        kind: ShapeKind::Cone,
        tag: "§cone",
        aliases: &[],
        paint: paint_cone,
        hit: hit_square_piece,
    },
    ShapeSpec {
        kind: ShapeKind::Cube,
        tag: "§cube",
        aliases: &[],
        paint: paint_cube,
        hit: hit_square_piece,
    },
    ShapeSpec {
        kind: ShapeKind::Algae,
        tag: "§algae",
        aliases: &[],
        paint: paint_algae,
        hit: hit_round_piece,
    },
];

impl ShapeKind {
    pub const ALL: [ShapeKind; 11] = [
        Self::Robot,
        Self::Ghost,
        Self::Box,
        Self::ArrowCenter,
        Self::ArrowFront,
        Self::ArrowBack,
        Self::Target,
        Self::Note,
        Self::Cone,
        Self::Cube,
        Self::Algae,
    ];

    fn spec(self) -> &'static ShapeSpec {
        &SHAPES[self as usize]
    }

    pub fn tag(self) -> &'static str {
        self.spec().tag
    }

    /// Parses a `§name` tag. The `§` is optional and names are matched
    /// case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let name = tag.trim();
        let name = name.strip_prefix('§').unwrap_or(name);
        SHAPES
            .iter()
            .find(|s| {
                s.tag[2..].eq_ignore_ascii_case(name)
                    || s.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
            })
            .map(|s| s.kind)
    }

    pub fn is_game_piece(self) -> bool {
        matches!(self, Self::Note | Self::Cone | Self::Cube | Self::Algae)
    }

    /// Half extents in the shape's own frame, for shapes with a fixed
    /// physical size.
    fn piece_half_extents(self) -> Option<Vec2> {
        match self {
            Self::Note => Some(Vec2::splat(NOTE_OUTER_RADIUS)),
            Self::Cone => Some(Vec2::splat(CONE_BASE * 0.5)),
            Self::Cube => Some(Vec2::splat(CUBE_SIZE * 0.5)),
            Self::Algae => Some(Vec2::splat(ALGAE_RADIUS)),
            _ => None,
        }
    }
}

/// A pose drawn as one of the builtin shapes. The node position carries the
/// translation; the drawable keeps heading, size and styling.
#[derive(Clone, Debug, PartialEq)]
pub struct Robot {
    pub kind: ShapeKind,
    pub name: String,
    /// Heading in radians, counter-clockwise from +X.
    pub rotation: f32,
    /// Length (along heading) and width in meters.
    pub size: Vec2,
    pub color: Color,
    /// Field-relative velocity in meters per second.
    pub velocity: Option<Vec2>,
}

impl Robot {
    pub fn new(kind: ShapeKind, size: Vec2) -> Self {
        Self {
            kind,
            name: String::new(),
            rotation: 0.0,
            size: size.max(Vec2::ZERO),
            color: Color::rgb(0.22, 0.45, 0.92),
            velocity: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.set_rotation(rotation);
        self
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        if rotation.is_finite() {
            self.rotation = rotation;
        }
    }

    pub fn set_velocity(&mut self, velocity: Option<Vec2>) {
        self.velocity = velocity.filter(|v| v.is_finite());
    }

    pub fn pose(&self, position: Vec2) -> Pose2d {
        Pose2d {
            translation: position,
            rotation: self.rotation,
        }
    }

    fn to_world(&self, origin: Vec2, local: Vec2) -> Vec2 {
        origin + rotate_vec2(local, self.rotation)
    }

    fn to_local(&self, origin: Vec2, world: Vec2) -> Vec2 {
        rotate_vec2(world - origin, -self.rotation)
    }

    fn front(&self, origin: Vec2) -> Vec2 {
        self.to_world(origin, Vec2::new(self.size.x * 0.5, 0.0))
    }

    fn velocity_tip(&self, origin: Vec2) -> Option<Vec2> {
        self.velocity
            .filter(|v| *v != Vec2::ZERO)
            .map(|v| origin + v * VELOCITY_SCALE)
    }

    /// Rectangle corners in world space for half extents `half`.
    fn corners(&self, origin: Vec2, half: Vec2) -> [Vec2; 4] {
        [
            Vec2::new(half.x, half.y),
            Vec2::new(-half.x, half.y),
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
        ]
        .map(|c| self.to_world(origin, c))
    }

    /// Tail, tip and anchor of an arrow shape along the heading.
    fn arrow(&self, origin: Vec2) -> (Vec2, Vec2) {
        let len = self.size.x;
        let (tail, tip) = match self.kind {
            ShapeKind::ArrowFront => (-len, 0.0),
            ShapeKind::ArrowBack => (0.0, len),
            _ => (-len * 0.5, len * 0.5),
        };
        (
            self.to_world(origin, Vec2::new(tail, 0.0)),
            self.to_world(origin, Vec2::new(tip, 0.0)),
        )
    }
}

impl Drawable for Robot {
    fn paint(&self, ctx: &mut PaintContext<'_>) {
        (self.kind.spec().paint)(self, ctx)
    }

    fn hovered(&self, ctx: &HitContext) -> Option<HoverToken> {
        (self.kind.spec().hit)(self, ctx)
    }

    fn hint(&self, position: Vec2, anchor: Vec2) -> Option<Hint> {
        let title = if self.name.is_empty() {
            format!("{:?}", self.kind)
        } else {
            self.name.clone()
        };
        let mut hint = Hint::new(title, anchor)
            .field("x", format!("{:.2} m", position.x))
            .field("y", format!("{:.2} m", position.y))
            .field("θ", format!("{:.1}°", normalize_degrees(self.rotation.to_degrees())));
        if let Some(v) = self.velocity {
            hint = hint.field("v", format!("{:.2} m/s", v.length()));
        }
        Some(hint)
    }
}

fn handle(ctx: &mut PaintContext<'_>, world: Vec2, color: Color) {
    let center = ctx.to_canvas(world);
    let path = Path2d::circle(center, ctx.handle_radius() * 0.5);
    ctx.canvas.fill(&path, color);
}

fn arrow_path(ctx: &PaintContext<'_>, tail: Vec2, tip: Vec2) -> Path2d {
    let a = ctx.to_canvas(tail);
    let b = ctx.to_canvas(tip);
    let dir = (b - a).normalize_or_zero();
    let head = ctx.handle_radius();
    let left = b + rotate_vec2(dir, PI * 5.0 / 6.0) * head;
    let right = b + rotate_vec2(dir, -PI * 5.0 / 6.0) * head;
    Path2d::polyline([a, b]).move_to(left).line_to(b).line_to(right)
}

fn paint_robot(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let origin = ctx.position;
    let ghost = robot.kind == ShapeKind::Ghost;
    let body = Path2d::polygon(robot.corners(origin, robot.size * 0.5).map(|c| ctx.to_canvas(c)));
    let fill = robot.color.with_a(if ghost { 0.15 } else { 0.35 });
    ctx.canvas.fill(&body, fill);
    let width = ctx.line_width() * if ghost { 1.0 } else { 2.0 };
    ctx.canvas.stroke(&body, robot.color, width);

    let front = robot.front(origin);
    let heading = Path2d::polyline([ctx.to_canvas(origin), ctx.to_canvas(front)]);
    let line = ctx.line_width();
    ctx.canvas.stroke(&heading, robot.color, line);
    let accent = ctx.theme.resolve("accent");
    handle(ctx, origin, robot.color);
    handle(ctx, front, accent);

    if let Some(tip) = robot.velocity_tip(origin) {
        let arrow = arrow_path(ctx, origin, tip);
        ctx.canvas.stroke(&arrow, ctx.theme.resolve("text"), line);
    }
}

fn hit_robot(robot: &Robot, ctx: &HitContext) -> Option<HoverToken> {
    let origin = ctx.position;
    if robot.velocity_tip(origin).is_some_and(|tip| ctx.on_handle(tip)) {
        return Some(HoverToken::Velocity);
    }
    if ctx.on_handle(robot.front(origin)) {
        return Some(HoverToken::Heading);
    }
    if ctx.on_handle(origin) {
        return Some(HoverToken::Main);
    }
    inside_box(robot.to_local(origin, ctx.point), robot.size * 0.5).then_some(HoverToken::Body)
}

fn paint_box(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let origin = ctx.position;
    let body = Path2d::polygon(robot.corners(origin, robot.size * 0.5).map(|c| ctx.to_canvas(c)));
    let width = ctx.line_width();
    ctx.canvas.stroke(&body, robot.color, width);
    handle(ctx, robot.front(origin), robot.color);
}

fn hit_box(robot: &Robot, ctx: &HitContext) -> Option<HoverToken> {
    let origin = ctx.position;
    if ctx.on_handle(robot.front(origin)) {
        return Some(HoverToken::Heading);
    }
    inside_box(robot.to_local(origin, ctx.point), robot.size * 0.5).then_some(HoverToken::Body)
}

fn paint_arrow(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let (tail, tip) = robot.arrow(ctx.position);
    let path = arrow_path(ctx, tail, tip);
    let width = ctx.line_width() * 1.5;
    ctx.canvas.stroke(&path, robot.color, width);
    let anchor = ctx.position;
    handle(ctx, anchor, robot.color);
}

/// The anchor is checked first, so an arrow whose tip sits on the anchor
/// (`ArrowFront`) is moved rather than rotated.
fn hit_arrow(robot: &Robot, ctx: &HitContext) -> Option<HoverToken> {
    let (_, tip) = robot.arrow(ctx.position);
    if ctx.on_handle(ctx.position) {
        return Some(HoverToken::Main);
    }
    ctx.on_handle(tip).then_some(HoverToken::Heading)
}

fn paint_target(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let origin = ctx.position;
    let half = robot.size * 0.5;
    let frame = Path2d::polygon(robot.corners(origin, half).map(|c| ctx.to_canvas(c)));
    let cross = Path2d::polyline([
        ctx.to_canvas(robot.to_world(origin, Vec2::new(-half.x, 0.0))),
        ctx.to_canvas(robot.to_world(origin, Vec2::new(half.x, 0.0))),
    ])
    .move_to(ctx.to_canvas(robot.to_world(origin, Vec2::new(0.0, -half.y))))
    .line_to(ctx.to_canvas(robot.to_world(origin, Vec2::new(0.0, half.y))));
    let width = ctx.line_width();
    ctx.canvas.stroke(&frame, robot.color.with_a(0.5), width);
    ctx.canvas.stroke(&cross, robot.color, width);
}

fn hit_target(robot: &Robot, ctx: &HitContext) -> Option<HoverToken> {
    inside_box(robot.to_local(ctx.position, ctx.point), robot.size * 0.5).then_some(HoverToken::Main)
}

fn paint_note(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let center = ctx.to_canvas(ctx.position);
    let outer = ctx.meters(NOTE_OUTER_RADIUS);
    let inner = ctx.meters(NOTE_INNER_RADIUS);
    let width = (outer - inner).max(1.0);
    let ring = Path2d::circle(center, (outer + inner) * 0.5);
    ctx.canvas.stroke(&ring, robot.color, width);
}

fn paint_cone(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let origin = ctx.position;
    let half = Vec2::splat(CONE_BASE * 0.5);
    let base = Path2d::polygon(robot.corners(origin, half).map(|c| ctx.to_canvas(c)));
    ctx.canvas.fill(&base, robot.color.with_a(0.6));
    let tip = Path2d::circle(ctx.to_canvas(origin), ctx.meters(CONE_BASE * 0.25));
    ctx.canvas.fill(&tip, robot.color);
}

fn paint_cube(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let origin = ctx.position;
    let half = Vec2::splat(CUBE_SIZE * 0.5);
    let body = Path2d::polygon(robot.corners(origin, half).map(|c| ctx.to_canvas(c)));
    ctx.canvas.fill(&body, robot.color);
}

fn paint_algae(robot: &Robot, ctx: &mut PaintContext<'_>) {
    let body = Path2d::circle(ctx.to_canvas(ctx.position), ctx.meters(ALGAE_RADIUS));
    ctx.canvas.fill(&body, robot.color);
}

fn hit_round_piece(robot: &Robot, ctx: &HitContext) -> Option<HoverToken> {
    let radius = robot.kind.piece_half_extents()?.x;
    ctx.within(ctx.position, radius).then_some(HoverToken::Main)
}

fn hit_square_piece(robot: &Robot, ctx: &HitContext) -> Option<HoverToken> {
    let half = robot.kind.piece_half_extents()?;
    inside_box(robot.to_local(ctx.position, ctx.point), half).then_some(HoverToken::Main)
}

fn inside_box(local: Vec2, half: Vec2) -> bool {
    local.x.abs() < half.x && local.y.abs() < half.y
}
