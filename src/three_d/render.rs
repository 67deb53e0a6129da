//! Per-entity 3D objects.
//!
//! A [`Render3d`] owns one default [`Component`] plus one per articulated
//! part listed in the robot definition. Each component holds a private clone
//! of whatever master currently backs it and rebuilds the clone when the
//! master's identity changes.

use std::sync::Arc;
use std::time::Duration;

use bevy_math::{Mat4, Vec2, Vec3};
use tracing::debug;

use crate::core::{Color, Pose3d, base_color};
use crate::hint::{Hint, HintSlot, HintSurface};
use crate::store::PoseSource;
use crate::transform::{compose_pose, heading_from_quat, normalize_degrees};
use crate::two_d::robot::ShapeKind;

use super::camera::CameraState;
use super::cache::{CachedModel, ModelCache, ModelKey, Variant};
use super::model::SceneObject;
use super::primitives::primitive;

/// Fraction of the original opacity kept by ghosted meshes.
pub const GHOST_OPACITY: f32 = 0.25;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityType {
    Builtin(ShapeKind),
    /// Data-driven robot, by definition name.
    Robot(String),
}

impl EntityType {
    /// `§`-prefixed names are builtin shapes; anything else names a robot
    /// definition. Unknown tags fall back to the default robot shape.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if name.starts_with('§') {
            Self::Builtin(ShapeKind::from_tag(name).unwrap_or(ShapeKind::Robot))
        } else {
            Self::Robot(name.to_owned())
        }
    }

    pub fn robot_name(&self) -> Option<&str> {
        match self {
            Self::Robot(name) => Some(name),
            Self::Builtin(_) => None,
        }
    }
}

/// What the host wants an entity to look like this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityState {
    pub id: String,
    pub entity_type: EntityType,
    pub pose: Pose3d,
    pub color: Color,
    pub ghost: bool,
    pub solid: bool,
    /// Hidden entities keep their models bound but produce no objects.
    pub visible: bool,
    /// Poses of articulated components relative to the robot, by index.
    pub components: Vec<Pose3d>,
}

impl EntityState {
    pub fn new(id: impl Into<String>, entity_type: EntityType, pose: Pose3d) -> Self {
        Self {
            id: id.into(),
            entity_type,
            pose,
            color: base_color(0).unwrap_or_default(),
            ghost: false,
            solid: false,
            visible: true,
            components: Vec::new(),
        }
    }

    /// State at `time` for the telemetry at `path`; hidden when the source
    /// has no sample.
    pub fn from_source(
        id: impl Into<String>,
        entity_type: EntityType,
        source: &dyn PoseSource,
        path: &str,
        time: f64,
    ) -> Self {
        match source.pose_at(path, time) {
            Some(pose) => Self::new(id, entity_type, pose.to_3d()),
            None => Self::new(id, entity_type, Pose3d::default()).visible(false),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn ghost(mut self, ghost: bool) -> Self {
        self.ghost = ghost;
        self
    }

    pub fn solid(mut self, solid: bool) -> Self {
        self.solid = solid;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_components(mut self, components: Vec<Pose3d>) -> Self {
        self.components = components;
        self
    }
}

/// Everything an entity needs from the scene for one update.
pub struct UpdateContext<'a> {
    pub cache: &'a mut ModelCache,
    pub variant: Variant,
    pub now: Duration,
    /// Subtracted from entity positions.
    pub scene_offset: Vec3,
    /// Scene root transform (origin rotation).
    pub root: Mat4,
    pub camera: &'a CameraState,
    pub page_size: Vec2,
    pub hints: &'a mut dyn HintSurface,
}

#[derive(Clone, Debug)]
enum Source {
    Primitive(Arc<SceneObject>),
    Cached(Arc<CachedModel>),
}

impl Source {
    fn object(&self) -> &SceneObject {
        match self {
            Self::Primitive(object) => object,
            Self::Cached(entry) => &entry.object,
        }
    }

    fn same(&self, other: &Source) -> bool {
        match (self, other) {
            (Self::Primitive(a), Self::Primitive(b)) => Arc::ptr_eq(a, b),
            (Self::Cached(a), Self::Cached(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Look {
    ghost: bool,
    solid: Option<Color>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct MaterialSnapshot {
    color: Color,
    opacity: f32,
    transparent: bool,
}

/// One object of an entity bound to a master model.
#[derive(Debug, Default)]
pub struct Component {
    index: Option<usize>,
    source: Option<Source>,
    live: Option<SceneObject>,
    snapshot: Vec<MaterialSnapshot>,
    applied: Option<Look>,
    pose: Pose3d,
    /// Top center of the model in its own frame.
    label_anchor: Vec3,
}

impl Component {
    fn new(index: Option<usize>) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn object(&self) -> Option<&SceneObject> {
        self.live.as_ref()
    }

    pub fn pose(&self) -> Pose3d {
        self.pose
    }

    pub fn label_anchor(&self) -> Vec3 {
        self.label_anchor
    }

    /// Binds to `resolved` and applies `look`. Returns whether anything
    /// visible changed.
    fn update(&mut self, resolved: Option<Source>, look: Look) -> bool {
        let mut changed = false;
        match resolved {
            Some(source) => {
                if !self.source.as_ref().is_some_and(|s| s.same(&source)) {
                    self.bind(source);
                    changed = true;
                }
            }
            None => {
                // Keep showing the old clone while a reload is pending, but
                // not once its master has been released.
                if self.source.as_ref().is_some_and(|s| s.object().is_disposed()) {
                    self.release();
                    changed = true;
                }
            }
        }
        if self.live.is_some() && self.applied != Some(look) {
            self.apply(look);
            changed = true;
        }
        changed
    }

    fn bind(&mut self, source: Source) {
        self.release();
        let live = source.object().clone();
        self.snapshot = live
            .materials()
            .iter()
            .map(|m| MaterialSnapshot {
                color: m.color,
                opacity: m.opacity,
                transparent: m.transparent,
            })
            .collect();
        self.label_anchor = live
            .bounds(Mat4::IDENTITY)
            .map(|b| Vec3::new(b.center().x, b.center().y, b.max.z))
            .unwrap_or(Vec3::ZERO);
        debug!(index = ?self.index, name = %live.name, "component bound to new model");
        self.live = Some(live);
        self.source = Some(source);
    }

    fn apply(&mut self, look: Look) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let snapshot = &self.snapshot;
        let mut i = 0;
        live.for_each_material_mut(&mut |m| {
            if let Some(s) = snapshot.get(i) {
                m.color = match look.solid {
                    Some(color) if !m.bumper => color.with_a(s.color.a),
                    _ => s.color,
                };
                if look.ghost {
                    m.opacity = s.opacity * GHOST_OPACITY;
                    m.transparent = true;
                } else {
                    m.opacity = s.opacity;
                    m.transparent = s.transparent;
                }
            }
            i += 1;
        });
        self.applied = Some(look);
    }

    /// Drops the clone. Its materials are released; geometry belongs to the
    /// master.
    fn release(&mut self) {
        if let Some(live) = self.live.take() {
            live.dispose_materials();
        }
        self.source = None;
        self.snapshot.clear();
        self.applied = None;
    }

    fn set_pose(&mut self, pose: Pose3d) -> bool {
        if self.pose == pose {
            return false;
        }
        self.pose = pose;
        self.live.is_some()
    }
}

#[derive(Debug)]
pub struct Render3d {
    state: EntityState,
    default: Component,
    components: Vec<Component>,
    /// Robot whose definition `components` mirrors.
    components_for: Option<String>,
    hovered: bool,
    hint: HintSlot,
    /// Visibility as of the last update.
    shown: bool,
}

impl Render3d {
    pub fn new(state: EntityState) -> Self {
        Self {
            default: Component::new(None),
            components: Vec::new(),
            components_for: None,
            hovered: false,
            hint: HintSlot::default(),
            shown: state.visible,
            state,
        }
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    /// External hover signal. Picking is up to the host.
    pub fn set_hovered(&mut self, hovered: bool) {
        self.hovered = hovered;
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    pub fn default_component(&self) -> &Component {
        &self.default
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    /// Live objects with their scene poses. Empty while hidden.
    pub fn objects(&self) -> impl Iterator<Item = (&SceneObject, Pose3d)> {
        let visible = self.state.visible;
        std::iter::once(&self.default)
            .chain(self.components.iter())
            .filter(move |_| visible)
            .filter_map(|c| c.live.as_ref().map(|o| (o, c.pose)))
    }

    /// Brings every component up to date. Returns whether a redraw is due.
    pub fn update(&mut self, ctx: &mut UpdateContext<'_>) -> bool {
        let mut changed = self.sync_components(ctx.cache);
        if self.shown != self.state.visible {
            self.shown = self.state.visible;
            changed = true;
        }

        let look = Look {
            ghost: self.state.ghost,
            solid: self.state.solid.then_some(self.state.color),
        };
        let resolved = self.resolve(ctx, None);
        changed |= self.default.update(resolved, look);
        for i in 0..self.components.len() {
            let resolved = self.resolve(ctx, Some(i));
            changed |= self.components[i].update(resolved, look);
        }

        let base = Pose3d::new(self.state.pose.translation - ctx.scene_offset, self.state.pose.rotation);
        changed |= self.default.set_pose(base);
        for (i, component) in self.components.iter_mut().enumerate() {
            let local = self.state.components.get(i).copied().unwrap_or_default();
            changed |= component.set_pose(compose_pose(&base, &local));
        }

        self.update_hint(ctx);
        changed
    }

    /// Releases every clone and the hint.
    pub fn dispose(&mut self, hints: &mut dyn HintSurface) {
        self.default.release();
        for component in &mut self.components {
            component.release();
        }
        self.components.clear();
        self.components_for = None;
        self.hint.hide(hints);
    }

    fn resolve(&self, ctx: &mut UpdateContext<'_>, index: Option<usize>) -> Option<Source> {
        match (&self.state.entity_type, index) {
            (EntityType::Builtin(kind), None) => primitive(*kind, ctx.variant.shading()).map(Source::Primitive),
            (EntityType::Builtin(_), Some(_)) => None,
            (EntityType::Robot(name), None) => ctx
                .cache
                .load(&ModelKey::Robot(name.clone()), ctx.variant, ctx.now)
                .map(Source::Cached),
            (EntityType::Robot(name), Some(i)) => ctx
                .cache
                .load(&ModelKey::RobotComponent(name.clone(), i), ctx.variant, ctx.now)
                .map(Source::Cached),
        }
    }

    /// Rebuilds the indexed components when the robot changed. Retries on
    /// later frames while the definition is unavailable.
    fn sync_components(&mut self, cache: &ModelCache) -> bool {
        let wanted = self.state.entity_type.robot_name();
        if wanted == self.components_for.as_deref() {
            return false;
        }
        let had_live = self.components.iter().any(|c| c.live.is_some());
        for component in &mut self.components {
            component.release();
        }
        self.components.clear();
        self.components_for = None;
        if let Some(name) = wanted {
            let Some(definition) = cache.store().robot(name) else {
                return had_live;
            };
            self.components = (0..definition.components.len())
                .map(|i| Component::new(Some(i)))
                .collect();
            self.components_for = Some(name.to_owned());
        }
        had_live
    }

    fn update_hint(&mut self, ctx: &mut UpdateContext<'_>) {
        if !self.hovered || !self.state.visible || self.default.live.is_none() {
            self.hint.hide(ctx.hints);
            return;
        }
        let pose = self.default.pose;
        let local = pose.translation + pose.rotation * self.default.label_anchor;
        let world = ctx.root.transform_point3(local);
        let Some(anchor) = ctx.camera.project(world, ctx.page_size) else {
            self.hint.hide(ctx.hints);
            return;
        };
        let p = self.state.pose;
        let hint = Hint::new(self.state.id.clone(), anchor)
            .field("x", format!("{:.2} m", p.translation.x))
            .field("y", format!("{:.2} m", p.translation.y))
            .field("z", format!("{:.2} m", p.translation.z))
            .field("θ", format!("{:.1}°", normalize_degrees(heading_from_quat(p.rotation).to_degrees())));
        self.hint.show(ctx.hints, hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pose;
    use crate::hint::HintBoard;
    use crate::store::{MemoryDefinitions, MemoryPoseSource};
    use crate::three_d::RenderType;
    use crate::three_d::cache::{LoadFuture, LoadError};
    use crate::three_d::model::{Geometry, Material, Shading};
    use bevy_math::Quat;
    use error_stack::Report;
    use futures::FutureExt;

    const DEFS: &str = r#"{
        "robots": [{
            "name": "Bot",
            "model_path": "bot.glb",
            "position": [0.0, 0.0, 0.0],
            "components": [{ "model_path": "arm.glb" }, { "model_path": "missing.glb" }]
        }]
    }"#;

    fn part() -> SceneObject {
        let positions = vec![[-0.5, -0.5, 0.0], [0.5, 0.5, 1.0], [0.5, -0.5, 0.0]];
        SceneObject::group("part")
            .with_child(SceneObject::mesh(
                "shell",
                Geometry::new(positions.clone(), Vec::new(), vec![0, 1, 2]),
                Material::new(Color::GRAY).with_opacity(0.8),
            ))
            .with_child(SceneObject::mesh(
                "bumper",
                Geometry::new(positions, Vec::new(), vec![0, 1, 2]),
                Material::new(Color::rgb(0.9, 0.1, 0.1)),
            ))
    }

    fn cache(store: Arc<MemoryDefinitions>) -> ModelCache {
        let loader = |path: &str| -> LoadFuture {
            if path == "missing.glb" {
                futures::future::ready(Err(Report::new(LoadError::Fetch(path.to_owned())))).boxed()
            } else {
                futures::future::ready(Ok(part())).boxed()
            }
        };
        ModelCache::new(store, Arc::new(loader))
    }

    struct Harness {
        store: Arc<MemoryDefinitions>,
        cache: ModelCache,
        camera: CameraState,
        hints: HintBoard,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryDefinitions::from_json(DEFS).unwrap());
            Self {
                cache: cache(store.clone()),
                store,
                camera: CameraState::spawn(RenderType::Proj, 50.0),
                hints: HintBoard::new(),
            }
        }

        fn update(&mut self, entity: &mut Render3d) -> bool {
            let mut ctx = UpdateContext {
                cache: &mut self.cache,
                variant: Variant::Basic,
                now: Duration::from_secs(5),
                scene_offset: Vec3::new(8.0, 4.0, 0.0),
                root: Mat4::IDENTITY,
                camera: &self.camera,
                page_size: Vec2::new(800.0, 600.0),
                hints: &mut self.hints,
            };
            entity.update(&mut ctx)
        }
    }

    fn builtin(ghost: bool, solid: bool) -> EntityState {
        EntityState::new("robot", EntityType::Builtin(ShapeKind::Robot), Pose3d::default())
            .with_color(Color::GREEN)
            .ghost(ghost)
            .solid(solid)
    }

    #[test]
    fn parses_types() {
        assert_eq!(EntityType::parse("§default"), EntityType::Builtin(ShapeKind::Robot));
        assert_eq!(EntityType::parse("§note"), EntityType::Builtin(ShapeKind::Note));
        assert_eq!(EntityType::parse("KitBot"), EntityType::Robot("KitBot".into()));
    }

    #[test]
    fn builtin_binds_once() {
        let mut h = Harness::new();
        let mut entity = Render3d::new(builtin(false, false));
        assert!(h.update(&mut entity));
        assert!(!h.update(&mut entity));
        let pose = entity.default_component().pose();
        assert_eq!(pose.translation, Vec3::new(-8.0, -4.0, 0.0));
    }

    #[test]
    fn ghost_and_solid_revert_exactly() {
        let mut h = Harness::new();
        let master = primitive(ShapeKind::Robot, Shading::Basic).unwrap();
        let mut entity = Render3d::new(builtin(false, false));
        h.update(&mut entity);
        let original: Vec<Material> = entity.default_component().object().unwrap().materials().into_iter().cloned().collect();

        entity.set_state(builtin(true, true));
        assert!(h.update(&mut entity));
        let live = entity.default_component().object().unwrap();
        for (m, o) in live.materials().iter().zip(&original) {
            assert!((m.opacity - o.opacity * GHOST_OPACITY).abs() < 1e-6);
            assert!(m.transparent);
            if m.bumper {
                assert_eq!(m.color, o.color);
            } else {
                assert_eq!(m.color, Color::GREEN);
            }
        }
        assert!(!h.update(&mut entity), "same look is not re-applied");

        entity.set_state(builtin(false, false));
        assert!(h.update(&mut entity));
        let restored: Vec<Material> = entity.default_component().object().unwrap().materials().into_iter().cloned().collect();
        assert_eq!(restored, original);
        let untouched: Vec<Material> = master.materials().into_iter().cloned().collect();
        assert_eq!(untouched, original, "master is never edited");
    }

    #[test]
    fn robot_mirrors_definition_components() {
        let mut h = Harness::new();
        let state = EntityState::new("bot", EntityType::Robot("Bot".into()), Pose3d::default())
            .with_components(vec![Pose3d::new(Vec3::Z, bevy_math::Quat::IDENTITY)]);
        let mut entity = Render3d::new(state);
        assert!(h.update(&mut entity));
        assert_eq!(entity.components().len(), 2);
        assert!(entity.default_component().object().is_some());
        assert!(entity.components()[0].object().is_some());
        assert!(entity.components()[1].object().is_none(), "failed load leaves the slot empty");
        let arm = entity.components()[0].pose();
        assert!(arm.translation.abs_diff_eq(Vec3::new(-8.0, -4.0, 1.0), 1e-5));
        assert_eq!(entity.objects().count(), 2);
    }

    #[test]
    fn decache_releases_live_clone() {
        let mut h = Harness::new();
        let state = EntityState::new("bot", EntityType::Robot("Bot".into()), Pose3d::default());
        let mut entity = Render3d::new(state);
        h.update(&mut entity);
        assert!(h.cache.decache_robot("Bot"));

        // Reload blocked: the clone of a released master is dropped.
        h.store.begin_refresh();
        assert!(h.update(&mut entity));
        assert!(entity.default_component().object().is_none());
        assert_eq!(entity.objects().count(), 0);

        h.store.finish_refresh(crate::store::Definitions::from_json(DEFS).unwrap());
        assert!(h.update(&mut entity));
        assert!(!entity.default_component().object().unwrap().is_disposed());
    }

    #[test]
    fn hint_only_while_hovered() {
        let mut h = Harness::new();
        let mut entity = Render3d::new(builtin(false, false));
        h.update(&mut entity);
        assert!(h.hints.is_empty());
        entity.set_hovered(true);
        h.update(&mut entity);
        assert_eq!(h.hints.len(), 1);
        let (_, hint) = h.hints.visible().next().unwrap();
        assert_eq!(hint.title, "robot");
        entity.set_hovered(false);
        h.update(&mut entity);
        assert!(h.hints.is_empty());
    }

    #[test]
    fn type_change_drops_components() {
        let mut h = Harness::new();
        let mut entity = Render3d::new(EntityState::new("bot", EntityType::Robot("Bot".into()), Pose3d::default()));
        h.update(&mut entity);
        entity.set_state(builtin(false, false));
        assert!(h.update(&mut entity));
        assert!(entity.components().is_empty());
        entity.dispose(&mut h.hints);
        assert!(entity.default_component().object().is_none());
    }

    #[test]
    fn hidden_entity_keeps_model_but_shows_nothing() {
        let mut h = Harness::new();
        let mut entity = Render3d::new(builtin(false, false));
        entity.set_hovered(true);
        h.update(&mut entity);
        assert_eq!(entity.objects().count(), 1);
        assert_eq!(h.hints.len(), 1);

        entity.set_state(builtin(false, false).visible(false));
        assert!(h.update(&mut entity));
        assert_eq!(entity.objects().count(), 0);
        assert!(entity.default_component().object().is_some());
        assert!(h.hints.is_empty());
        assert!(!h.update(&mut entity));

        entity.set_state(builtin(false, false));
        assert!(h.update(&mut entity));
        assert_eq!(entity.objects().count(), 1);
        assert_eq!(h.hints.len(), 1);
    }

    #[test]
    fn state_from_source_hides_missing_samples() {
        let mut source = MemoryPoseSource::new();
        let pose = Pose3d::new(Vec3::new(1.0, 2.0, 0.5), Quat::IDENTITY);
        source.push("/bot", 3.0, Pose::ThreeD(pose));
        let kind = || EntityType::parse("Bot");

        let early = EntityState::from_source("bot", kind(), &source, "/bot", 1.0);
        assert!(!early.visible);
        let late = EntityState::from_source("bot", kind(), &source, "/bot", 4.0);
        assert!(late.visible);
        assert_eq!(late.pose, pose);
        assert!(!EntityState::from_source("bot", kind(), &source, "/other", 4.0).visible);
    }
}
