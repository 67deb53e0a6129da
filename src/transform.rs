//! Pure math shared by the 2D and 3D views.
//!
//! World space is meters with the field origin at the blue alliance corner,
//! +X down-field and +Z up. Page space is CSS-style pixels relative to the
//! top-left of the canvas element; canvas space is page space multiplied by
//! the device pixel ratio (`quality`).

use std::f32::consts::{PI, TAU};

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::{AxisRotation, Pose3d};

/// Composes a rotation sequence into a single orientation. Earlier entries are
/// applied first, each one about the axes produced by the previous steps.
pub fn orientation_from_rotations(rotations: &[AxisRotation]) -> Quat {
    rotations.iter().fold(Quat::IDENTITY, |q, r| {
        let degrees = if r.degrees.is_finite() { r.degrees } else { 0.0 };
        q * Quat::from_axis_angle(r.axis.unit(), degrees.to_radians())
    })
}

/// Wraps an angle into `(-π, π]`.
pub fn normalize_radians(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Wraps an angle into `[0, 360)`.
pub fn normalize_degrees(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

pub fn rotate_vec2(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(angle).rotate(v)
}

pub fn quat_from_heading(heading: f32) -> Quat {
    Quat::from_rotation_z(heading)
}

/// Yaw about +Z of an orientation.
pub fn heading_from_quat(q: Quat) -> f32 {
    let siny_cosp = 2.0 * (q.w * q.z + q.x * q.y);
    let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    siny_cosp.atan2(cosy_cosp)
}

pub fn distance_squared(a: Vec2, b: Vec2) -> f32 {
    (a - b).length_squared()
}

/// Translation distance and rotation angle (radians) between two poses.
pub fn pose_delta(a: &Pose3d, b: &Pose3d) -> (f32, f32) {
    (
        a.translation.distance(b.translation),
        a.rotation.angle_between(b.rotation),
    )
}

/// Pose of `child` expressed in the frame of `parent`.
pub fn compose_pose(parent: &Pose3d, child: &Pose3d) -> Pose3d {
    Pose3d {
        translation: parent.translation + parent.rotation * child.translation,
        rotation: parent.rotation * child.rotation,
    }
}

/// Padding around the field inside the canvas, in page pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Padding {
    pub const fn uniform(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

impl Default for Padding {
    fn default() -> Self {
        Self::uniform(40.0)
    }
}

/// Clamps a device pixel ratio to something usable.
pub fn sanitize_quality(quality: f32) -> f32 {
    if quality.is_finite() && quality > 0.0 {
        quality
    } else {
        1.0
    }
}

/// Mapping between world meters, canvas pixels and page pixels for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasTransform {
    quality: f32,
    page_size: Vec2,
    padding: Padding,
    field_size: Vec2,
    zoom: f32,
    pan: Vec2,
    pixels_per_meter: f32,
}

impl CanvasTransform {
    const MIN_PIXELS_PER_METER: f32 = 1e-3;

    pub fn new(quality: f32, page_size: Vec2, padding: Padding, field_size: Vec2) -> Self {
        Self::with_view(quality, page_size, padding, field_size, 1.0, Vec2::ZERO)
    }

    /// `pan` is the world offset of the view center from the field center.
    pub fn with_view(
        quality: f32,
        page_size: Vec2,
        padding: Padding,
        field_size: Vec2,
        zoom: f32,
        pan: Vec2,
    ) -> Self {
        let quality = sanitize_quality(quality);
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        let avail = Vec2::new(
            page_size.x - padding.horizontal(),
            page_size.y - padding.vertical(),
        );
        let fit = if field_size.x > 0.0 && field_size.y > 0.0 {
            (avail.x / field_size.x).min(avail.y / field_size.y)
        } else {
            0.0
        };
        let pixels_per_meter = if fit.is_finite() {
            (fit * zoom).max(Self::MIN_PIXELS_PER_METER)
        } else {
            Self::MIN_PIXELS_PER_METER
        };
        Self {
            quality,
            page_size,
            padding,
            field_size,
            zoom,
            pan: if pan.is_finite() { pan } else { Vec2::ZERO },
            pixels_per_meter,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn page_size(&self) -> Vec2 {
        self.page_size
    }

    pub fn canvas_size(&self) -> Vec2 {
        self.page_size * self.quality
    }

    pub fn field_size(&self) -> Vec2 {
        self.field_size
    }

    /// Page pixels per world meter.
    pub fn pixels_per_meter(&self) -> f32 {
        self.pixels_per_meter
    }

    /// Converts a length in page pixels into world meters.
    pub fn page_length_to_world(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_meter
    }

    /// Converts a length in page pixels into canvas pixels.
    pub fn page_length_to_canvas(&self, pixels: f32) -> f32 {
        pixels * self.quality
    }

    fn page_center(&self) -> Vec2 {
        let avail = Vec2::new(
            self.page_size.x - self.padding.horizontal(),
            self.page_size.y - self.padding.vertical(),
        );
        Vec2::new(
            self.padding.left + avail.x * 0.5,
            self.padding.top + avail.y * 0.5,
        )
    }

    fn view_center(&self) -> Vec2 {
        self.field_size * 0.5 + self.pan
    }

    pub fn world_to_page(&self, world: Vec2) -> Vec2 {
        let d = (world - self.view_center()) * self.pixels_per_meter;
        self.page_center() + Vec2::new(d.x, -d.y)
    }

    pub fn page_to_world(&self, page: Vec2) -> Vec2 {
        let d = page - self.page_center();
        self.view_center() + Vec2::new(d.x, -d.y) / self.pixels_per_meter
    }

    pub fn canvas_to_page(&self, canvas: Vec2) -> Vec2 {
        canvas / self.quality
    }

    pub fn page_to_canvas(&self, page: Vec2) -> Vec2 {
        page * self.quality
    }

    pub fn world_to_canvas(&self, world: Vec2) -> Vec2 {
        self.page_to_canvas(self.world_to_page(world))
    }

    pub fn canvas_to_world(&self, canvas: Vec2) -> Vec2 {
        self.page_to_world(self.canvas_to_page(canvas))
    }

    /// Canvas-space rectangle `(min, size)` covering the whole field.
    pub fn field_canvas_rect(&self) -> (Vec2, Vec2) {
        let a = self.world_to_canvas(Vec2::new(0.0, self.field_size.y));
        let b = self.world_to_canvas(Vec2::new(self.field_size.x, 0.0));
        (a.min(b), (b - a).abs())
    }
}

/// Axis-aligned bounds accumulated from points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds3 {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter().filter(|p| p.is_finite());
        let first = iter.next()?;
        Some(iter.fold(Self { min: first, max: first }, |b, p| Self {
            min: b.min.min(p),
            max: b.max.max(p),
        }))
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Axis;

    fn transform() -> CanvasTransform {
        CanvasTransform::with_view(
            2.0,
            Vec2::new(800.0, 500.0),
            Padding::uniform(30.0),
            Vec2::new(16.54, 8.21),
            1.5,
            Vec2::new(0.7, -0.3),
        )
    }

    #[test]
    fn world_canvas_round_trip() {
        let t = transform();
        for p in [
            Vec2::ZERO,
            Vec2::new(16.54, 8.21),
            Vec2::new(-3.25, 12.5),
            Vec2::new(1e3, -1e3),
        ] {
            let back = t.canvas_to_world(t.world_to_canvas(p));
            assert!(back.abs_diff_eq(p, 1e-3), "{p} -> {back}");
        }
    }

    #[test]
    fn page_canvas_round_trip() {
        let t = transform();
        for p in [Vec2::ZERO, Vec2::new(123.4, 56.7), Vec2::new(-10.0, 900.0)] {
            let back = t.page_to_canvas(t.canvas_to_page(p));
            assert!(back.abs_diff_eq(p, 1e-4));
        }
    }

    #[test]
    fn y_axis_points_up_on_page() {
        let t = CanvasTransform::new(1.0, Vec2::new(200.0, 100.0), Padding::uniform(0.0), Vec2::new(2.0, 1.0));
        let bottom_left = t.world_to_page(Vec2::ZERO);
        let top_right = t.world_to_page(Vec2::new(2.0, 1.0));
        assert!(bottom_left.abs_diff_eq(Vec2::new(0.0, 100.0), 1e-4));
        assert!(top_right.abs_diff_eq(Vec2::new(200.0, 0.0), 1e-4));
    }

    #[test]
    fn bad_quality_is_clamped() {
        let t = CanvasTransform::new(f32::NAN, Vec2::splat(100.0), Padding::default(), Vec2::ONE);
        assert_eq!(t.quality(), 1.0);
        let t = CanvasTransform::new(-2.0, Vec2::splat(100.0), Padding::default(), Vec2::ONE);
        assert_eq!(t.quality(), 1.0);
    }

    #[test]
    fn normalize_wraps() {
        assert!((normalize_radians(3.0 * PI) - PI).abs() < 1e-5);
        assert!((normalize_radians(-PI) - PI).abs() < 1e-5);
        assert!((normalize_radians(0.25) - 0.25).abs() < 1e-6);
        assert_eq!(normalize_radians(f32::INFINITY), 0.0);
        assert!((normalize_degrees(-90.0) - 270.0).abs() < 1e-4);
        assert!((normalize_degrees(720.0)).abs() < 1e-4);
    }

    #[test]
    fn rotation_sequence_applies_in_order() {
        let q = orientation_from_rotations(&[
            AxisRotation::new(Axis::Z, 90.0),
            AxisRotation::new(Axis::X, 90.0),
        ]);
        let expected = Quat::from_rotation_z(PI / 2.0) * Quat::from_rotation_x(PI / 2.0);
        assert!(q.abs_diff_eq(expected, 1e-5));
        assert_eq!(orientation_from_rotations(&[]), Quat::IDENTITY);
    }

    #[test]
    fn heading_round_trip() {
        for h in [-2.0, -0.5, 0.0, 1.0, 3.0] {
            assert!((heading_from_quat(quat_from_heading(h)) - h).abs() < 1e-5);
        }
    }

    #[test]
    fn pose_delta_measures_both_parts() {
        let a = Pose3d::default();
        let b = Pose3d::new(Vec3::new(3.0, 4.0, 0.0), quat_from_heading(0.5));
        let (d, angle) = pose_delta(&a, &b);
        assert!((d - 5.0).abs() < 1e-5);
        assert!((angle - 0.5).abs() < 1e-4);
        assert_eq!(distance_squared(Vec2::ZERO, Vec2::new(3.0, 4.0)), 25.0);
    }

    #[test]
    fn bounds_from_points() {
        let b = Bounds3::from_points([Vec3::new(1.0, -1.0, 0.0), Vec3::new(-1.0, 2.0, 3.0)]).unwrap();
        assert_eq!(b.center(), Vec3::new(0.0, 0.5, 1.5));
        assert_eq!(b.size(), Vec3::new(2.0, 3.0, 3.0));
        assert!(Bounds3::from_points([]).is_none());
    }
}
