//! State shared by the 2D and 3D views: page size, device pixel ratio,
//! pointer position and the hint surface tooltips go to.

use std::time::Duration;

use bevy_math::Vec2;

use crate::hint::{HintBoard, SharedHints};
use crate::transform::sanitize_quality;

/// Host clock for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Time since the host started.
    pub now: Duration,
    pub delta: Duration,
}

impl FrameTime {
    pub fn new(now: Duration, delta: Duration) -> Self {
        Self { now, delta }
    }

    /// Advances by `delta` from a previous frame.
    pub fn next(self, delta: Duration) -> Self {
        Self {
            now: self.now + delta,
            delta,
        }
    }

    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

#[derive(Debug, Clone)]
pub struct ViewBase {
    page_size: Vec2,
    quality: f32,
    pointer: Option<Vec2>,
    hints: SharedHints,
}

impl ViewBase {
    pub fn new(page_size: Vec2, quality: f32, hints: SharedHints) -> Self {
        Self {
            page_size: page_size.max(Vec2::ZERO),
            quality: sanitize_quality(quality),
            pointer: None,
            hints,
        }
    }

    pub fn page_size(&self) -> Vec2 {
        self.page_size
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn pointer(&self) -> Option<Vec2> {
        self.pointer
    }

    pub fn hints(&self) -> &SharedHints {
        &self.hints
    }
}

impl Default for ViewBase {
    fn default() -> Self {
        Self::new(Vec2::new(800.0, 450.0), 1.0, HintBoard::shared())
    }
}

/// Common surface of [`Odometry2d`](crate::two_d::Odometry2d) and
/// [`Odometry3d`](crate::three_d::Odometry3d).
pub trait Odometry {
    fn base(&self) -> &ViewBase;
    fn base_mut(&mut self) -> &mut ViewBase;

    fn resize(&mut self, page_size: Vec2) {
        let size = if page_size.is_finite() {
            page_size.max(Vec2::ZERO)
        } else {
            Vec2::ZERO
        };
        self.base_mut().page_size = size;
    }

    fn set_quality(&mut self, quality: f32) {
        self.base_mut().quality = sanitize_quality(quality);
    }

    /// Pointer in page pixels, `None` when it left the view.
    fn set_pointer(&mut self, pointer: Option<Vec2>) {
        self.base_mut().pointer = pointer.filter(|p| p.is_finite());
    }

    fn hints(&self) -> SharedHints {
        self.base().hints.clone()
    }
}
