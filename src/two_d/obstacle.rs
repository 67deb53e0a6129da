use bevy_math::Vec2;

use crate::core::Color;
use crate::hint::Hint;

use super::canvas::Path2d;
use super::render::{Drawable, HitContext, HoverToken, PaintContext};

/// Circular keep-out zone centered on its node position.
#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    pub name: String,
    pub radius: f32,
    pub color: Color,
}

impl Obstacle {
    pub const MIN_RADIUS: f32 = 0.05;

    pub fn new(radius: f32) -> Self {
        let mut obstacle = Self {
            name: String::new(),
            radius: Self::MIN_RADIUS,
            color: Color::rgb(0.95, 0.55, 0.1),
        };
        obstacle.set_radius(radius);
        obstacle
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius.is_finite() {
            self.radius = radius.max(Self::MIN_RADIUS);
        }
    }

    pub fn radius_handle(&self, center: Vec2) -> Vec2 {
        center + Vec2::new(self.radius, 0.0)
    }
}

impl Drawable for Obstacle {
    fn paint(&self, ctx: &mut PaintContext<'_>) {
        let center = ctx.to_canvas(ctx.position);
        let circle = Path2d::circle(center, ctx.meters(self.radius));
        let width = ctx.line_width();
        ctx.canvas.fill(&circle, self.color.with_a(0.25));
        ctx.canvas.stroke(&circle, self.color, width);
        let handle = ctx.to_canvas(self.radius_handle(ctx.position));
        let dot = Path2d::circle(handle, ctx.handle_radius() * 0.5);
        ctx.canvas.fill(&dot, self.color);
    }

    fn hovered(&self, ctx: &HitContext) -> Option<HoverToken> {
        if ctx.on_handle(self.radius_handle(ctx.position)) {
            return Some(HoverToken::Radius);
        }
        ctx.within(ctx.position, self.radius).then_some(HoverToken::Body)
    }

    fn hint(&self, position: Vec2, anchor: Vec2) -> Option<Hint> {
        let title = if self.name.is_empty() { "Obstacle" } else { self.name.as_str() };
        Some(
            Hint::new(title, anchor)
                .field("x", format!("{:.2} m", position.x))
                .field("y", format!("{:.2} m", position.y))
                .field("r", format!("{:.2} m", self.radius)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(obstacle: &Obstacle, point: Vec2) -> Option<HoverToken> {
        obstacle.hovered(&HitContext {
            point,
            position: Vec2::new(2.0, 2.0),
            handle_radius: 0.125,
        })
    }

    #[test]
    fn radius_handle_wins_over_body() {
        let obstacle = Obstacle::new(1.0);
        assert_eq!(hit(&obstacle, Vec2::new(2.95, 2.0)), Some(HoverToken::Radius));
        assert_eq!(hit(&obstacle, Vec2::new(2.0, 2.5)), Some(HoverToken::Body));
        assert_eq!(hit(&obstacle, Vec2::new(2.0, 3.0)), None);
        assert_eq!(hit(&obstacle, Vec2::new(5.0, 5.0)), None);
    }

    #[test]
    fn radius_is_clamped() {
        let mut obstacle = Obstacle::new(-3.0);
        assert_eq!(obstacle.radius, Obstacle::MIN_RADIUS);
        obstacle.set_radius(f32::NAN);
        assert_eq!(obstacle.radius, Obstacle::MIN_RADIUS);
        obstacle.set_radius(0.75);
        assert_eq!(obstacle.radius, 0.75);
    }
}
