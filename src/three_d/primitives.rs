//! Static geometry for the builtin object kinds.
//!
//! Models are built once per process and shared; entities clone them like
//! any cached master. All shapes stand on the ground plane (z = 0) with +X
//! as the forward direction.

use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, TAU};
use std::sync::{Arc, LazyLock};

use bevy_math::{Quat, Vec3};

use crate::core::{Color, METERS_PER_INCH};
use crate::two_d::robot::ShapeKind;

use super::model::{Geometry, Material, SceneObject, Shading};

const SEGMENTS: u32 = 24;

static PRIMITIVES: LazyLock<HashMap<(ShapeKind, Shading), Arc<SceneObject>>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    for kind in ShapeKind::ALL {
        let model = build(kind);
        for shading in [Shading::Basic, Shading::Cinematic] {
            table.insert((kind, shading), Arc::new(model.with_shading(shading)));
        }
    }
    table
});

/// Shared master model for a builtin kind.
pub fn primitive(kind: ShapeKind, shading: Shading) -> Option<Arc<SceneObject>> {
    PRIMITIVES.get(&(kind, shading)).cloned()
}

fn build(kind: ShapeKind) -> SceneObject {
    let name = format!("{kind:?}");
    match kind {
        ShapeKind::Robot => robot(name, 1.0),
        ShapeKind::Ghost => robot(name, 0.5),
        ShapeKind::Box => SceneObject::mesh(
            name,
            cuboid(Vec3::splat(0.9)),
            Material::new(Color::GRAY).with_opacity(0.4),
        )
        .with_translation(Vec3::Z * 0.45),
        ShapeKind::ArrowCenter => arrow(name, -0.25),
        ShapeKind::ArrowFront => arrow(name, -0.5),
        ShapeKind::ArrowBack => arrow(name, 0.0),
        ShapeKind::Target => {
            let material = Material::new(Color::YELLOW);
            SceneObject::group(name)
                .with_child(SceneObject::mesh("x", cuboid(Vec3::new(0.5, 0.03, 0.03)), material.clone()))
                .with_child(SceneObject::mesh("y", cuboid(Vec3::new(0.03, 0.5, 0.03)), material.clone()))
                .with_child(
                    SceneObject::mesh("z", cuboid(Vec3::new(0.03, 0.03, 0.5)), material)
                        .with_translation(Vec3::Z * 0.25),
                )
        }
        ShapeKind::Note => SceneObject::mesh(
            name,
            torus(6.0 * METERS_PER_INCH, 1.0 * METERS_PER_INCH),
            Material::new(Color::rgb(0.95, 0.45, 0.1)),
        )
        .with_translation(Vec3::Z * METERS_PER_INCH),
        ShapeKind::Cone => SceneObject::mesh(
            name,
            cone(4.1875 * METERS_PER_INCH, 12.8125 * METERS_PER_INCH),
            Material::new(Color::rgb(1.0, 0.85, 0.1)),
        ),
        ShapeKind::Cube => SceneObject::mesh(
            name,
            cuboid(Vec3::splat(9.5 * METERS_PER_INCH)),
            Material::new(Color::rgb(0.55, 0.25, 0.85)),
        )
        .with_translation(Vec3::Z * 4.75 * METERS_PER_INCH),
        ShapeKind::Algae => SceneObject::mesh(
            name,
            sphere(8.125 * METERS_PER_INCH),
            Material::new(Color::rgb(0.2, 0.75, 0.65)),
        )
        .with_translation(Vec3::Z * 8.125 * METERS_PER_INCH),
    }
}

fn robot(name: String, opacity: f32) -> SceneObject {
    SceneObject::group(name)
        .with_child(
            SceneObject::mesh(
                "bumpers",
                cuboid(Vec3::new(0.9, 0.9, 0.12)),
                Material::new(Color::rgb(0.1, 0.3, 0.95))
                    .with_opacity(opacity)
                    .with_bumper(true),
            )
            .with_translation(Vec3::Z * 0.06),
        )
        .with_child(
            SceneObject::mesh(
                "chassis",
                cuboid(Vec3::new(0.76, 0.76, 0.3)),
                Material::new(Color::rgb(0.3, 0.3, 0.32)).with_opacity(opacity),
            )
            .with_translation(Vec3::Z * 0.25),
        )
}

/// Arrow along +X whose shaft starts at `tail`.
fn arrow(name: String, tail: f32) -> SceneObject {
    let material = Material::new(Color::rgb(0.25, 0.55, 1.0));
    let shaft_len = 0.35;
    SceneObject::group(name)
        .with_translation(Vec3::Z * 0.05)
        .with_child(
            SceneObject::mesh("shaft", cuboid(Vec3::new(shaft_len, 0.04, 0.04)), material.clone())
                .with_translation(Vec3::X * (tail + shaft_len * 0.5)),
        )
        .with_child(
            SceneObject::mesh("head", cone(0.06, 0.15), material)
                .with_rotation(Quat::from_rotation_y(FRAC_PI_2))
                .with_translation(Vec3::X * (tail + shaft_len)),
        )
}

pub fn cuboid(size: Vec3) -> Arc<Geometry> {
    let h = size * 0.5;
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::NEG_Y, Vec3::Z),
        (Vec3::Y, Vec3::NEG_X, Vec3::Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = positions.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (normal + u * su + v * sv) * h;
            positions.push(p.to_array());
            normals.push(normal.to_array());
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Geometry::new(positions, normals, indices)
}

/// Cone standing on z = 0 with its apex at `height`.
pub fn cone(radius: f32, height: f32) -> Arc<Geometry> {
    let mut positions = vec![[0.0, 0.0, height], [0.0, 0.0, 0.0]];
    let mut normals = vec![[0.0, 0.0, 1.0], [0.0, 0.0, -1.0]];
    let slope = radius / height.max(f32::EPSILON);
    for i in 0..SEGMENTS {
        let a = TAU * i as f32 / SEGMENTS as f32;
        let (s, c) = a.sin_cos();
        positions.push([c * radius, s * radius, 0.0]);
        normals.push(Vec3::new(c, s, slope).normalize().to_array());
    }
    let mut indices = Vec::new();
    for i in 0..SEGMENTS {
        let a = 2 + i;
        let b = 2 + (i + 1) % SEGMENTS;
        indices.extend([a, b, 0, b, a, 1]);
    }
    Geometry::new(positions, normals, indices)
}

pub fn sphere(radius: f32) -> Arc<Geometry> {
    let rings = SEGMENTS / 2;
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for r in 0..=rings {
        let phi = std::f32::consts::PI * r as f32 / rings as f32;
        for s in 0..=SEGMENTS {
            let theta = TAU * s as f32 / SEGMENTS as f32;
            let n = Vec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
            positions.push((n * radius).to_array());
            normals.push(n.to_array());
        }
    }
    Geometry::new(positions, normals, grid_indices(rings, SEGMENTS))
}

/// Torus in the XY plane.
pub fn torus(major: f32, minor: f32) -> Arc<Geometry> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for i in 0..=SEGMENTS {
        let u = TAU * i as f32 / SEGMENTS as f32;
        let center = Vec3::new(u.cos(), u.sin(), 0.0) * major;
        for j in 0..=SEGMENTS {
            let v = TAU * j as f32 / SEGMENTS as f32;
            let n = Vec3::new(v.cos() * u.cos(), v.cos() * u.sin(), v.sin());
            positions.push((center + n * minor).to_array());
            normals.push(n.to_array());
        }
    }
    Geometry::new(positions, normals, grid_indices(SEGMENTS, SEGMENTS))
}

fn grid_indices(rows: u32, cols: u32) -> Vec<u32> {
    let stride = cols + 1;
    let mut indices = Vec::with_capacity((rows * cols * 6) as usize);
    for r in 0..rows {
        for c in 0..cols {
            let a = r * stride + c;
            let b = a + stride;
            indices.extend([a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    indices
}
