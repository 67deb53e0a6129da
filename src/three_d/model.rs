//! Engine-agnostic scene objects.
//!
//! A [`SceneObject`] is a small tree of groups and meshes. Geometry is shared
//! behind an `Arc` while materials are owned per object, so cloning a model
//! gives an instance whose materials can be edited freely without touching
//! the master. Both carry a dispose flag standing in for GPU resource release.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bevy_asset::RenderAssetUsages;
use bevy_math::{Mat4, Quat, Vec3};
use bevy_mesh::{Indices, Mesh, PrimitiveTopology};

use crate::core::Color;
use crate::transform::Bounds3;

#[derive(Debug)]
pub struct Geometry {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    indices: Vec<u32>,
    disposed: AtomicBool,
}

impl Geometry {
    pub fn new(positions: Vec<[f32; 3]>, normals: Vec<[f32; 3]>, indices: Vec<u32>) -> Arc<Self> {
        Arc::new(Self {
            positions,
            normals,
            indices,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn bounds(&self, transform: Mat4) -> Option<Bounds3> {
        Bounds3::from_points(
            self.positions
                .iter()
                .map(|p| transform.transform_point3(Vec3::from_array(*p))),
        )
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn to_mesh(&self) -> Mesh {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, self.positions.clone())
            .with_inserted_indices(Indices::U32(self.indices.clone()));
        if self.normals.len() == self.positions.len() {
            mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, self.normals.clone());
        } else {
            mesh.compute_normals();
        }
        mesh
    }
}

/// Lighting model of a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shading {
    /// Cheap lighting, no shadows.
    Basic,
    /// Physically based with shadows.
    Cinematic,
}

#[derive(Debug)]
pub struct Material {
    pub shading: Shading,
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    /// Tagged at load time; excluded from solid recoloring.
    pub bumper: bool,
    pub cast_shadows: bool,
    disposed: AtomicBool,
}

impl Material {
    pub fn new(color: Color) -> Self {
        Self {
            shading: Shading::Basic,
            color,
            opacity: 1.0,
            transparent: false,
            bumper: false,
            cast_shadows: false,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self.transparent = self.opacity < 1.0;
        self
    }

    pub fn with_bumper(mut self, bumper: bool) -> Self {
        self.bumper = bumper;
        self
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Color with opacity folded into alpha.
    pub fn display_color(&self) -> Color {
        self.color.with_a(self.color.a * self.opacity)
    }
}

/// Copies get their own dispose flag.
impl Clone for Material {
    fn clone(&self) -> Self {
        Self {
            shading: self.shading,
            color: self.color,
            opacity: self.opacity,
            transparent: self.transparent,
            bumper: self.bumper,
            cast_shadows: self.cast_shadows,
            disposed: AtomicBool::new(false),
        }
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.shading == other.shading
            && self.color == other.color
            && self.opacity == other.opacity
            && self.transparent == other.transparent
            && self.bumper == other.bumper
            && self.cast_shadows == other.cast_shadows
    }
}

#[derive(Clone, Debug)]
pub enum ObjectKind {
    Group,
    Mesh {
        geometry: Arc<Geometry>,
        material: Material,
    },
}

#[derive(Clone, Debug)]
pub struct SceneObject {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub kind: ObjectKind,
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            kind: ObjectKind::Group,
            children: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, geometry: Arc<Geometry>, material: Material) -> Self {
        Self {
            kind: ObjectKind::Mesh { geometry, material },
            ..Self::group(name)
        }
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Calls `f` for every mesh with its transform relative to `parent`.
    pub fn for_each_mesh<F>(&self, parent: Mat4, f: &mut F)
    where
        F: FnMut(&SceneObject, &Arc<Geometry>, &Material, Mat4),
    {
        let world = parent * self.local_matrix();
        if let ObjectKind::Mesh { geometry, material } = &self.kind {
            f(self, geometry, material, world);
        }
        for child in &self.children {
            child.for_each_mesh(world, f);
        }
    }

    pub fn for_each_material_mut(&mut self, f: &mut impl FnMut(&mut Material)) {
        if let ObjectKind::Mesh { material, .. } = &mut self.kind {
            f(material);
        }
        for child in &mut self.children {
            child.for_each_material_mut(f);
        }
    }

    pub fn materials(&self) -> Vec<&Material> {
        let mut out = Vec::new();
        self.collect_materials(&mut out);
        out
    }

    fn collect_materials<'a>(&'a self, out: &mut Vec<&'a Material>) {
        if let ObjectKind::Mesh { material, .. } = &self.kind {
            out.push(material);
        }
        for child in &self.children {
            child.collect_materials(out);
        }
    }

    pub fn mesh_count(&self) -> usize {
        let own = usize::from(matches!(self.kind, ObjectKind::Mesh { .. }));
        own + self.children.iter().map(Self::mesh_count).sum::<usize>()
    }

    /// Bounds in the frame of `parent`, including this object's transform.
    pub fn bounds(&self, parent: Mat4) -> Option<Bounds3> {
        let mut bounds: Option<Bounds3> = None;
        self.for_each_mesh(parent, &mut |_, geometry, _, world| {
            if let Some(b) = geometry.bounds(world) {
                bounds = Some(bounds.map_or(b, |acc| acc.union(b)));
            }
        });
        bounds
    }

    /// Copy with every material switched to `shading`. Geometry stays shared.
    pub fn with_shading(&self, shading: Shading) -> Self {
        let mut copy = self.clone();
        copy.for_each_material_mut(&mut |m| {
            m.shading = shading;
            m.cast_shadows = shading == Shading::Cinematic;
        });
        copy
    }

    /// Releases materials only. Used for clones, which share geometry with
    /// their master.
    pub fn dispose_materials(&self) {
        for material in self.materials() {
            material.dispose();
        }
    }

    /// Releases materials and geometry.
    pub fn dispose(&self) {
        self.for_each_mesh(Mat4::IDENTITY, &mut |_, geometry, material, _| {
            geometry.dispose();
            material.dispose();
        });
    }

    /// True once any part has been released.
    pub fn is_disposed(&self) -> bool {
        let mut disposed = false;
        self.for_each_mesh(Mat4::IDENTITY, &mut |_, geometry, material, _| {
            disposed |= geometry.is_disposed() || material.is_disposed();
        });
        disposed
    }
}
