//! Camera control schemes.
//!
//! Controls read a host-neutral [`ControlInput`] snapshot once per frame and
//! move the [`CameraState`]. The scene compares camera positions afterwards
//! to decide whether a redraw is due.

use std::collections::{HashMap, HashSet};
use std::f32::consts::PI;
use std::time::Duration;

use bevy_math::{Vec2, Vec3};

use crate::config::Scene3dConfig;
use crate::odometry::FrameTime;

use super::ControlType;
use super::camera::CameraState;

const MIN_DISTANCE: f32 = 0.5;
const MAX_DISTANCE: f32 = 100.0;
const MIN_ORTHO_HEIGHT: f32 = 1.0;
const MAX_ORTHO_HEIGHT: f32 = 200.0;
const POLAR_LIMIT: f32 = 0.01;
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
const PAN_PER_PIXEL: f32 = 0.0015;

/// Second press must follow the previous press within this window.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(250);
/// ...and the key must have been up for at least this long in between.
pub const DOUBLE_TAP_MIN_RELEASE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl Key {
    pub const ALL: [Key; 6] = [Key::Forward, Key::Back, Key::Left, Key::Right, Key::Up, Key::Down];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// Input accumulated over one frame.
#[derive(Clone, Debug, Default)]
pub struct ControlInput {
    /// Pointer motion in page pixels.
    pub pointer_delta: Vec2,
    /// Wheel lines; positive zooms in.
    pub scroll: f32,
    pub buttons: HashSet<PointerButton>,
    pub held: HashSet<Key>,
    pub pressed: HashSet<Key>,
    pub released: HashSet<Key>,
    pub pointer_locked: bool,
}

impl ControlInput {
    pub fn is_idle(&self) -> bool {
        self.pointer_delta == Vec2::ZERO
            && self.scroll == 0.0
            && self.held.is_empty()
            && self.pressed.is_empty()
            && self.released.is_empty()
    }
}

pub trait CameraControls: Send + Sync {
    fn kind(&self) -> ControlType;
    fn update(&mut self, camera: &mut CameraState, input: &ControlInput, frame: FrameTime);
    /// Releases whatever the controls hold (pointer lock, listeners). Later
    /// updates are ignored.
    fn dispose(&mut self);
    fn wants_pointer_lock(&self) -> bool {
        false
    }
}

/// Builds the controls for `kind`; `None` for [`ControlType::None`].
pub fn controls_for(kind: ControlType, config: &Scene3dConfig) -> Option<Box<dyn CameraControls>> {
    match kind {
        ControlType::Orbit => Some(Box::new(OrbitControls::orbit(config))),
        ControlType::Pan => Some(Box::new(OrbitControls::pan(config))),
        ControlType::Free => Some(Box::new(FreeControls::new(config))),
        ControlType::None => None,
    }
}

/// Target-locked rotation and zoom, optionally with panning.
#[derive(Clone, Debug)]
pub struct OrbitControls {
    kind: ControlType,
    rotate_speed: f32,
    zoom_speed: f32,
    rotate_button: PointerButton,
    pan_button: Option<PointerButton>,
    disposed: bool,
}

impl OrbitControls {
    pub fn orbit(config: &Scene3dConfig) -> Self {
        Self {
            kind: ControlType::Orbit,
            rotate_speed: config.orbit_rotate_speed,
            zoom_speed: config.orbit_zoom_speed,
            rotate_button: PointerButton::Left,
            pan_button: None,
            disposed: false,
        }
    }

    /// Left button pans, right button rotates.
    pub fn pan(config: &Scene3dConfig) -> Self {
        Self {
            kind: ControlType::Pan,
            rotate_button: PointerButton::Right,
            pan_button: Some(PointerButton::Left),
            ..Self::orbit(config)
        }
    }

    fn rotate(&self, camera: &mut CameraState, delta: Vec2) {
        let offset = camera.position - camera.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }
        let azimuth = offset.y.atan2(offset.x) - delta.x * self.rotate_speed;
        let polar = ((offset.z / radius).clamp(-1.0, 1.0).acos() - delta.y * self.rotate_speed)
            .clamp(POLAR_LIMIT, PI - POLAR_LIMIT);
        camera.position = camera.target
            + Vec3::new(
                polar.sin() * azimuth.cos(),
                polar.sin() * azimuth.sin(),
                polar.cos(),
            ) * radius;
    }

    fn zoom(&self, camera: &mut CameraState, scroll: f32) {
        let factor = (1.0 - scroll * self.zoom_speed).max(0.1);
        match camera.render_type {
            super::RenderType::Proj => {
                let offset = camera.position - camera.target;
                let distance = (offset.length() * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
                camera.position = camera.target + offset.normalize_or(Vec3::NEG_X) * distance;
            }
            super::RenderType::Iso => {
                camera.ortho_height =
                    (camera.ortho_height * factor).clamp(MIN_ORTHO_HEIGHT, MAX_ORTHO_HEIGHT);
            }
        }
    }

    fn pan_by(camera: &mut CameraState, delta: Vec2) {
        let right = camera.right();
        let up = right.cross(camera.forward());
        let scale = camera.distance().max(1.0) * PAN_PER_PIXEL;
        let shift = (-right * delta.x + up * delta.y) * scale;
        camera.position += shift;
        camera.target += shift;
    }
}

impl CameraControls for OrbitControls {
    fn kind(&self) -> ControlType {
        self.kind
    }

    fn update(&mut self, camera: &mut CameraState, input: &ControlInput, _frame: FrameTime) {
        if self.disposed {
            return;
        }
        if input.pointer_delta != Vec2::ZERO {
            if input.buttons.contains(&self.rotate_button) {
                self.rotate(camera, input.pointer_delta);
            } else if self.pan_button.is_some_and(|b| input.buttons.contains(&b)) {
                Self::pan_by(camera, input.pointer_delta);
            }
        }
        if input.scroll != 0.0 {
            self.zoom(camera, input.scroll);
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

/// Pointer-lock fly camera.
#[derive(Clone, Debug)]
pub struct FreeControls {
    move_speed: f32,
    sprint_multiplier: f32,
    sensitivity: f32,
    yaw: f32,
    pitch: f32,
    synced: bool,
    sprinting: bool,
    last_press: HashMap<Key, Duration>,
    last_release: HashMap<Key, Duration>,
    disposed: bool,
}

impl FreeControls {
    pub fn new(config: &Scene3dConfig) -> Self {
        Self {
            move_speed: config.free_move_speed,
            sprint_multiplier: config.free_sprint_multiplier,
            sensitivity: config.look_sensitivity,
            yaw: 0.0,
            pitch: 0.0,
            synced: false,
            sprinting: false,
            last_press: HashMap::new(),
            last_release: HashMap::new(),
            disposed: false,
        }
    }

    pub fn is_sprinting(&self) -> bool {
        self.sprinting
    }

    fn sync_from(&mut self, camera: &CameraState) {
        let f = camera.forward();
        self.yaw = f.y.atan2(f.x);
        self.pitch = f.z.clamp(-1.0, 1.0).asin().clamp(-MAX_PITCH, MAX_PITCH);
        self.synced = true;
    }

    fn forward(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.cos(),
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
        )
    }

    fn track_keys(&mut self, input: &ControlInput, now: Duration) {
        for key in Key::ALL {
            if input.released.contains(&key) {
                self.last_release.insert(key, now);
            }
            if input.pressed.contains(&key) {
                if self.is_double_tap(key, now) && key != Key::Up && key != Key::Down {
                    self.sprinting = true;
                }
                self.last_press.insert(key, now);
            }
        }
        let moving = [Key::Forward, Key::Back, Key::Left, Key::Right]
            .iter()
            .any(|k| input.held.contains(k));
        if !moving {
            self.sprinting = false;
        }
    }

    fn is_double_tap(&self, key: Key, now: Duration) -> bool {
        let (Some(press), Some(release)) = (self.last_press.get(&key), self.last_release.get(&key)) else {
            return false;
        };
        *release >= *press
            && now.saturating_sub(*press) <= DOUBLE_TAP_WINDOW
            && now.saturating_sub(*release) >= DOUBLE_TAP_MIN_RELEASE
    }
}

impl CameraControls for FreeControls {
    fn kind(&self) -> ControlType {
        ControlType::Free
    }

    fn update(&mut self, camera: &mut CameraState, input: &ControlInput, frame: FrameTime) {
        if self.disposed {
            return;
        }
        if !self.synced {
            self.sync_from(camera);
        }
        self.track_keys(input, frame.now);

        if input.pointer_locked && input.pointer_delta != Vec2::ZERO {
            self.yaw -= input.pointer_delta.x * self.sensitivity;
            self.pitch = (self.pitch - input.pointer_delta.y * self.sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
        }

        let forward = self.forward();
        let right = forward.cross(Vec3::Z).normalize_or(Vec3::NEG_Y);
        let mut direction = Vec3::ZERO;
        for key in &input.held {
            direction += match key {
                Key::Forward => forward,
                Key::Back => -forward,
                Key::Right => right,
                Key::Left => -right,
                Key::Up => Vec3::Z,
                Key::Down => Vec3::NEG_Z,
            };
        }
        if direction.length_squared() > 0.0 {
            let speed = if self.sprinting {
                self.move_speed * self.sprint_multiplier
            } else {
                self.move_speed
            };
            camera.position += direction.normalize() * speed * frame.delta_secs();
        }
        let reach = camera.distance().max(1.0);
        camera.target = camera.position + forward * reach;
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.sprinting = false;
    }

    fn wants_pointer_lock(&self) -> bool {
        !self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::three_d::RenderType;

    fn frame(ms: u64) -> FrameTime {
        FrameTime::new(Duration::from_millis(ms), Duration::from_millis(16))
    }

    fn drag(button: PointerButton, delta: Vec2) -> ControlInput {
        ControlInput {
            pointer_delta: delta,
            buttons: HashSet::from([button]),
            ..Default::default()
        }
    }

    fn keys(held: &[Key], pressed: &[Key], released: &[Key]) -> ControlInput {
        ControlInput {
            held: held.iter().copied().collect(),
            pressed: pressed.iter().copied().collect(),
            released: released.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn orbit_rotation_keeps_distance() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let before = camera.distance();
        let mut controls = OrbitControls::orbit(&config);
        controls.update(&mut camera, &drag(PointerButton::Left, Vec2::new(120.0, -40.0)), frame(0));
        assert!((camera.distance() - before).abs() < 1e-3);
        assert_ne!(camera.position, CameraState::spawn(RenderType::Proj, 50.0).position);
        assert_eq!(camera.target, Vec3::ZERO);
    }

    #[test]
    fn orbit_does_not_pan() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let before = camera;
        let mut controls = OrbitControls::orbit(&config);
        controls.update(&mut camera, &drag(PointerButton::Right, Vec2::new(50.0, 0.0)), frame(0));
        assert_eq!(camera, before);
    }

    #[test]
    fn pan_controls_swap_buttons() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let before = camera;
        let mut controls = OrbitControls::pan(&config);
        controls.update(&mut camera, &drag(PointerButton::Left, Vec2::new(50.0, 0.0)), frame(0));
        assert_ne!(camera.target, before.target);
        assert!((camera.distance() - before.distance()).abs() < 1e-4);

        let mut rotated = before;
        controls.update(&mut rotated, &drag(PointerButton::Right, Vec2::new(50.0, 0.0)), frame(0));
        assert_eq!(rotated.target, before.target);
    }

    #[test]
    fn zoom_is_clamped() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let mut controls = OrbitControls::orbit(&config);
        let input = ControlInput {
            scroll: 9.0,
            ..Default::default()
        };
        for _ in 0..100 {
            controls.update(&mut camera, &input, frame(0));
        }
        assert!((camera.distance() - MIN_DISTANCE).abs() < 1e-4);
    }

    #[test]
    fn disposed_controls_ignore_input() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let before = camera;
        let mut controls = OrbitControls::orbit(&config);
        controls.dispose();
        controls.update(&mut camera, &drag(PointerButton::Left, Vec2::splat(30.0)), frame(0));
        assert_eq!(camera, before);
    }

    #[test]
    fn free_moves_forward_and_up() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let start = camera.position;
        let mut controls = FreeControls::new(&config);
        controls.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(0));
        let moved = camera.position - start;
        assert!(moved.normalize().abs_diff_eq((Vec3::ZERO - start).normalize(), 1e-3));

        let before = camera.position;
        controls.update(&mut camera, &keys(&[Key::Up], &[], &[]), frame(16));
        assert!(camera.position.z > before.z);
        assert!(controls.wants_pointer_lock());
    }

    #[test]
    fn double_tap_sprints() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);
        let mut controls = FreeControls::new(&config);
        controls.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(0));
        controls.update(&mut camera, &keys(&[], &[], &[Key::Forward]), frame(100));
        controls.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(200));
        assert!(controls.is_sprinting());

        controls.update(&mut camera, &keys(&[], &[], &[Key::Forward]), frame(300));
        assert!(!controls.is_sprinting(), "sprint ends when movement stops");
    }

    #[test]
    fn slow_or_bouncy_taps_do_not_sprint() {
        let config = Scene3dConfig::default();
        let mut camera = CameraState::spawn(RenderType::Proj, 50.0);

        let mut slow = FreeControls::new(&config);
        slow.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(0));
        slow.update(&mut camera, &keys(&[], &[], &[Key::Forward]), frame(100));
        slow.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(300));
        assert!(!slow.is_sprinting());

        let mut bouncy = FreeControls::new(&config);
        bouncy.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(0));
        bouncy.update(&mut camera, &keys(&[], &[], &[Key::Forward]), frame(100));
        bouncy.update(&mut camera, &keys(&[Key::Forward], &[Key::Forward], &[]), frame(130));
        assert!(!bouncy.is_sprinting());
    }

    #[test]
    fn factory_matches_kind() {
        let config = Scene3dConfig::default();
        for kind in [ControlType::Orbit, ControlType::Free, ControlType::Pan] {
            assert_eq!(controls_for(kind, &config).map(|c| c.kind()), Some(kind));
        }
        assert!(controls_for(ControlType::None, &config).is_none());
    }
}
