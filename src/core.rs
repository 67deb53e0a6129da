use bevy_math::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
    pub const fn with_a(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Self = Self::rgb(0.0, 0.0, 1.0);
    pub const YELLOW: Self = Self::rgb(1.0, 1.0, 0.0);
    pub const GRAY: Self = Self::rgb(0.5, 0.5, 0.5);

    /// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match digits.len() {
            3 => {
                let mut it = digits.chars().map(|c| c.to_digit(16).map(|v| v as f32 / 15.0));
                Some(Self::rgb(it.next()??, it.next()??, it.next()??))
            }
            6 => Some(Self::rgb(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            8 => Some(Self::rgba(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
                channel(&digits[6..8])?,
            )),
            _ => None,
        }
    }

    /// Hue in degrees `[0, 360)`, saturation and lightness in `[0, 1]`.
    pub fn to_hsl(self) -> (f32, f32, f32) {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let lightness = (max + min) * 0.5;
        let delta = max - min;
        if delta <= f32::EPSILON {
            return (0.0, 0.0, lightness);
        }
        let saturation = delta / (1.0 - (2.0 * lightness - 1.0).abs()).max(f32::EPSILON);
        let hue = if max == self.r {
            60.0 * ((self.g - self.b) / delta).rem_euclid(6.0)
        } else if max == self.g {
            60.0 * ((self.b - self.r) / delta + 2.0)
        } else {
            60.0 * ((self.r - self.g) / delta + 4.0)
        };
        (hue.rem_euclid(360.0), saturation.min(1.0), lightness)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<Color> for bevy::prelude::Color {
    #[inline]
    fn from(c: Color) -> Self {
        bevy::prelude::Color::linear_rgba(c.r, c.g, c.b, c.a)
    }
}

/// Palette used for robots without an explicit color, indexed by robot slot.
const BASE_COLORS: [Color; 9] = [
    Color::rgb(0.22, 0.45, 0.92),
    Color::rgb(0.90, 0.20, 0.20),
    Color::rgb(0.20, 0.70, 0.30),
    Color::rgb(0.95, 0.65, 0.10),
    Color::rgb(0.60, 0.30, 0.80),
    Color::rgb(0.10, 0.75, 0.80),
    Color::rgb(0.95, 0.45, 0.70),
    Color::rgb(0.55, 0.40, 0.25),
    Color::rgb(0.70, 0.70, 0.70),
];

pub fn base_color(index: usize) -> Option<Color> {
    BASE_COLORS.get(index).copied()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// One step of a rotation sequence as written in robot/field definitions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisRotation {
    pub axis: Axis,
    pub degrees: f32,
}

impl AxisRotation {
    pub const fn new(axis: Axis, degrees: f32) -> Self {
        Self { axis, degrees }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub translation: Vec2,
    /// Heading in radians, counter-clockwise from +X.
    pub rotation: f32,
}

impl Pose2d {
    pub const fn new(x: f32, y: f32, rotation: f32) -> Self {
        Self {
            translation: Vec2::new(x, y),
            rotation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose3d {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Pose3d {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose3d {
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

impl From<Pose2d> for Pose3d {
    fn from(pose: Pose2d) -> Self {
        Self {
            translation: pose.translation.extend(0.0),
            rotation: Quat::from_rotation_z(pose.rotation),
        }
    }
}

impl From<Pose3d> for Pose2d {
    fn from(pose: Pose3d) -> Self {
        Self {
            translation: pose.translation.truncate(),
            rotation: crate::transform::heading_from_quat(pose.rotation),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pose {
    TwoD(Pose2d),
    ThreeD(Pose3d),
}

impl Pose {
    pub fn to_3d(self) -> Pose3d {
        match self {
            Pose::TwoD(p) => p.into(),
            Pose::ThreeD(p) => p,
        }
    }

    pub fn to_2d(self) -> Pose2d {
        match self {
            Pose::TwoD(p) => p,
            Pose::ThreeD(p) => p.into(),
        }
    }
}

/// Decodes a raw numeric pose sample.
///
/// Accepted layouts: `[x, y]`, `[x, y, θ]` and `[x, y, z, qw, qx, qy, qz]`.
/// Anything else, or any non-finite component, yields `None`.
pub fn decode_pose(values: &[f64]) -> Option<Pose> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let v: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    match v.len() {
        2 => Some(Pose::TwoD(Pose2d::new(v[0], v[1], 0.0))),
        3 => Some(Pose::TwoD(Pose2d::new(v[0], v[1], v[2]))),
        7 => {
            let q = Quat::from_xyzw(v[4], v[5], v[6], v[3]);
            let rotation = if q.length_squared() > f32::EPSILON {
                q.normalize()
            } else {
                Quat::IDENTITY
            };
            Some(Pose::ThreeD(Pose3d::new(Vec3::new(v[0], v[1], v[2]), rotation)))
        }
        _ => None,
    }
}

pub const METERS_PER_INCH: f32 = 0.0254;

pub fn inches_to_meters(inches: f32) -> f32 {
    inches * METERS_PER_INCH
}

pub fn meters_to_inches(meters: f32) -> f32 {
    meters / METERS_PER_INCH
}
