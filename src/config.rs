//! Viewer configuration.
//!
//! Every field has a default, so partial JSON documents are accepted. Values
//! that would break layout or camera math are clamped by the `sanitized`
//! methods; both views apply them on construction.

use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};

use crate::three_d::{ControlType, Origin, RenderType};
use crate::transform::{Padding, sanitize_quality};
use crate::{OdometryError, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub field2d: Field2dConfig,
    pub scene3d: Scene3dConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field2dConfig {
    pub padding: Padding,
    /// Device pixel ratio.
    pub quality: f32,
    /// Grid spacing in meters.
    pub grid_size: f32,
    pub show_grid: bool,
    pub show_axes: bool,
    /// Radius of drag handles in page pixels.
    pub handle_radius_px: f32,
    pub line_width_px: f32,
    pub zoom: f32,
    /// Number of historic poses kept on a trail.
    pub trail_length: usize,
    /// Seconds of history a bound trail shows.
    pub trail_window_secs: f64,
}

impl Default for Field2dConfig {
    fn default() -> Self {
        Self {
            padding: Padding::default(),
            quality: 1.0,
            grid_size: 1.0,
            show_grid: true,
            show_axes: true,
            handle_radius_px: 8.0,
            line_width_px: 2.0,
            zoom: 1.0,
            trail_length: 500,
            trail_window_secs: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene3dConfig {
    pub render_type: RenderType,
    pub control_type: ControlType,
    pub origin: Origin,
    pub cinematic: bool,
    pub fov_degrees: f32,
    /// Minimum time between load attempts of the same model.
    pub load_throttle_ms: u64,
    /// Camera movement below this distance (meters) does not trigger a redraw.
    pub redraw_epsilon: f32,
    pub orbit_rotate_speed: f32,
    pub orbit_zoom_speed: f32,
    /// Free camera speed in meters per second.
    pub free_move_speed: f32,
    pub free_sprint_multiplier: f32,
    pub look_sensitivity: f32,
}

impl Default for Scene3dConfig {
    fn default() -> Self {
        Self {
            render_type: RenderType::Proj,
            control_type: ControlType::Orbit,
            origin: Origin::BluePlus,
            cinematic: false,
            fov_degrees: 50.0,
            load_throttle_ms: 1000,
            redraw_epsilon: 1e-4,
            orbit_rotate_speed: 0.005,
            orbit_zoom_speed: 0.1,
            free_move_speed: 3.0,
            free_sprint_multiplier: 3.0,
            look_sensitivity: 0.003,
        }
    }
}

impl Scene3dConfig {
    pub fn load_throttle(&self) -> Duration {
        Duration::from_millis(self.load_throttle_ms)
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(Report::new)
            .change_context(OdometryError::Config)?;
        Ok(config.sanitized())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(Report::new)
            .change_context(OdometryError::Config)
    }

    pub fn sanitized(self) -> Self {
        Self {
            field2d: self.field2d.sanitized(),
            scene3d: self.scene3d.sanitized(),
        }
    }
}

impl Field2dConfig {
    pub fn sanitized(mut self) -> Self {
        self.quality = sanitize_quality(self.quality);
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            self.grid_size = 1.0;
        }
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            self.zoom = 1.0;
        }
        self.handle_radius_px = finite_or(self.handle_radius_px, 8.0).max(1.0);
        self.line_width_px = finite_or(self.line_width_px, 2.0).max(0.5);
        if !(self.trail_window_secs.is_finite() && self.trail_window_secs >= 0.0) {
            self.trail_window_secs = 5.0;
        }
        self
    }
}

impl Scene3dConfig {
    pub fn sanitized(mut self) -> Self {
        self.fov_degrees = if self.fov_degrees.is_finite() {
            self.fov_degrees.clamp(10.0, 150.0)
        } else {
            50.0
        };
        if !(self.redraw_epsilon.is_finite() && self.redraw_epsilon >= 0.0) {
            self.redraw_epsilon = 1e-4;
        }
        self.free_sprint_multiplier = finite_or(self.free_sprint_multiplier, 3.0).max(1.0);
        self
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}
