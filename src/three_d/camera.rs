//! Scene camera. World space is Z-up, meters, field centered on the origin.

use bevy_math::{Mat3, Mat4, Quat, Vec2, Vec3};

use super::RenderType;

pub const NEAR: f32 = 0.05;
pub const FAR: f32 = 1000.0;

const PROJ_SPAWN: Vec3 = Vec3::new(-10.0, 0.0, 7.0);
const ISO_SPAWN: Vec3 = Vec3::new(-15.0, -15.0, 15.0);
const ISO_HEIGHT: f32 = 12.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub render_type: RenderType,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_degrees: f32,
    /// Visible height in meters for the orthographic projection.
    pub ortho_height: f32,
}

impl CameraState {
    /// Camera at the spawn point of `render_type`, looking at the origin.
    pub fn spawn(render_type: RenderType, fov_degrees: f32) -> Self {
        let position = match render_type {
            RenderType::Proj => PROJ_SPAWN,
            RenderType::Iso => ISO_SPAWN,
        };
        Self {
            render_type,
            position,
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_degrees,
            ortho_height: ISO_HEIGHT,
        }
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::X)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or(Vec3::NEG_Y)
    }

    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }

    /// World rotation of a camera looking down its local -Z.
    pub fn rotation(&self) -> Quat {
        let forward = self.forward();
        let right = self.right();
        let up = right.cross(forward);
        Quat::from_mat3(&Mat3::from_cols(right, up, -forward))
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        match self.render_type {
            RenderType::Proj => Mat4::perspective_rh(self.fov_degrees.to_radians(), aspect, NEAR, FAR),
            RenderType::Iso => {
                let h = self.ortho_height * 0.5;
                let w = h * aspect;
                Mat4::orthographic_rh(-w, w, -h, h, NEAR, FAR)
            }
        }
    }

    /// Projects a world point into page pixels. `None` behind the camera or
    /// outside the depth range.
    pub fn project(&self, world: Vec3, page_size: Vec2) -> Option<Vec2> {
        if page_size.x <= 0.0 || page_size.y <= 0.0 {
            return None;
        }
        let clip = self.projection_matrix(page_size.x / page_size.y)
            * self.view_matrix()
            * world.extend(1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if !(0.0..=1.0).contains(&ndc.z) {
            return None;
        }
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * page_size.x,
            (1.0 - ndc.y) * 0.5 * page_size.y,
        ))
    }
}
