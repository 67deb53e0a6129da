use std::collections::VecDeque;

use bevy_math::Vec2;

use crate::core::{Color, Pose};

use super::canvas::Path2d;
use super::render::{Drawable, PaintContext};

/// Fading polyline of historic positions, oldest first. Points are relative
/// to the node position.
#[derive(Clone, Debug, PartialEq)]
pub struct Trail {
    points: VecDeque<Vec2>,
    capacity: usize,
    pub color: Color,
}

impl Trail {
    pub fn new(capacity: usize, color: Color) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(2),
            color,
        }
    }

    pub fn push(&mut self, point: Vec2) {
        if !point.is_finite() {
            return;
        }
        if self.points.back() == Some(&point) {
            return;
        }
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Replaces the trail with the translations of `poses`.
    pub fn set_poses(&mut self, poses: &[Pose]) {
        self.points.clear();
        for pose in poses {
            self.push(pose.to_2d().translation);
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.points.iter().copied()
    }
}

impl Drawable for Trail {
    fn paint(&self, ctx: &mut PaintContext<'_>) {
        let n = self.points.len();
        if n < 2 {
            return;
        }
        let width = ctx.line_width();
        let segments = (n - 1) as f32;
        for (i, (a, b)) in self.points.iter().zip(self.points.iter().skip(1)).enumerate() {
            let fade = (i + 1) as f32 / segments;
            let path = Path2d::polyline([
                ctx.to_canvas(ctx.position + *a),
                ctx.to_canvas(ctx.position + *b),
            ]);
            ctx.canvas.save();
            ctx.canvas.set_alpha(ctx.alpha * fade);
            ctx.canvas.stroke(&path, self.color, width);
            ctx.canvas.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pose2d;
    use crate::store::StaticTheme;
    use crate::transform::{CanvasTransform, Padding};
    use crate::two_d::canvas::{DrawCommand, DrawList};
    use crate::two_d::render::{RenderEnv, RenderTree};

    #[test]
    fn capacity_drops_oldest_and_skips_repeats() {
        let mut trail = Trail::new(3, Color::WHITE);
        for x in [0.0, 1.0, 1.0, 2.0, 3.0] {
            trail.push(Vec2::new(x, 0.0));
        }
        let xs: Vec<f32> = trail.points().map(|p| p.x).collect();
        assert_eq!(xs, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn set_poses_uses_translations() {
        let mut trail = Trail::new(10, Color::WHITE);
        trail.set_poses(&[
            Pose::TwoD(Pose2d::new(1.0, 2.0, 0.5)),
            Pose::TwoD(Pose2d::new(3.0, 4.0, 0.5)),
        ]);
        assert_eq!(trail.points().collect::<Vec<_>>(), [Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)]);
    }

    #[test]
    fn segments_fade_in_towards_newest() {
        let mut tree = RenderTree::new();
        let mut trail = Trail::new(10, Color::WHITE);
        for x in 0..5 {
            trail.push(Vec2::new(x as f32, 1.0));
        }
        let root = tree.root();
        tree.insert(root, trail).unwrap();

        let transform = CanvasTransform::new(1.0, Vec2::new(200.0, 100.0), Padding::uniform(0.0), Vec2::new(10.0, 5.0));
        let theme = StaticTheme::dark();
        let mut list = DrawList::new();
        tree.render(
            root,
            None,
            &mut RenderEnv {
                canvas: &mut list,
                transform: &transform,
                theme: &theme,
                style: Default::default(),
            },
        );
        let alphas: Vec<f32> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Stroke { alpha, .. } => Some(*alpha),
                _ => None,
            })
            .collect();
        assert_eq!(alphas, [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(tree.the_hovered(root, Vec2::new(1.0, 1.0), 1.0), None);
    }
}
