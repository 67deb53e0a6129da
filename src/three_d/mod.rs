//! 3D scene view.
//!
//! [`Odometry3d`] owns the model cache, the camera and its controls, the
//! field object and one [`Render3d`] per entity. It redraws lazily: state
//! changes raise a flag which only [`Odometry3d::render`] clears.

pub mod cache;
pub mod camera;
pub mod controls;
pub mod model;
pub mod primitives;
pub mod render;

use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use bevy_math::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Scene3dConfig;
use crate::core::Color;
use crate::events::{Change, EventBus, SubscriptionId};
use crate::odometry::{FrameTime, Odometry, ViewBase};
use crate::store::{DefinitionStore, PoseSource};

use self::cache::{CachedModel, ModelCache, ModelKey, ModelLoader, Variant};
use self::camera::CameraState;
use self::controls::{CameraControls, ControlInput, controls_for};
use self::model::{Geometry, Material, SceneObject};
use self::render::{EntityState, Render3d, UpdateContext};

/// Field size assumed for centering until a definition is available.
const DEFAULT_FIELD_SIZE: Vec2 = Vec2::new(16.54, 8.07);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderType {
    /// Perspective.
    #[serde(rename = "proj")]
    Proj,
    /// Orthographic from a fixed diagonal.
    #[serde(rename = "iso")]
    Iso,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    #[serde(rename = "orbit")]
    Orbit,
    #[serde(rename = "free")]
    Free,
    #[serde(rename = "pan")]
    Pan,
    #[serde(rename = "none")]
    None,
}

/// Which alliance wall the field coordinates start from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "blue+")]
    BluePlus,
    #[serde(rename = "blue-")]
    BlueMinus,
    #[serde(rename = "red+")]
    RedPlus,
    #[serde(rename = "red-")]
    RedMinus,
}

impl Origin {
    pub fn is_red(self) -> bool {
        matches!(self, Self::RedPlus | Self::RedMinus)
    }

    pub fn is_mirrored(self) -> bool {
        matches!(self, Self::BlueMinus | Self::RedMinus)
    }

    /// Transform applied to the whole scene.
    pub fn root_transform(self) -> Mat4 {
        if self.is_red() {
            Mat4::from_rotation_z(PI)
        } else {
            Mat4::IDENTITY
        }
    }

    /// Extra transform for the field model only.
    pub fn field_transform(self) -> Mat4 {
        if self.is_mirrored() {
            Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        } else {
            Mat4::IDENTITY
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SceneEvent {
    FieldChanged(Change<Option<String>>),
    RenderTypeChanged(Change<RenderType>),
    ControlTypeChanged(Change<ControlType>),
    OriginChanged(Change<Origin>),
    CinematicChanged(Change<bool>),
    EntitiesChanged { added: Vec<String>, removed: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
    pub cast_shadows: bool,
}

/// Light rig for the current shading mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Lighting {
    pub ambient: Color,
    pub ambient_brightness: f32,
    pub lights: Vec<Light>,
}

impl Lighting {
    pub fn basic() -> Self {
        Self {
            ambient: Color::WHITE,
            ambient_brightness: 600.0,
            lights: vec![Light {
                kind: LightKind::Directional,
                color: Color::WHITE,
                intensity: 2_000.0,
                position: Vec3::new(0.0, 0.0, 10.0),
                cast_shadows: false,
            }],
        }
    }

    pub fn cinematic() -> Self {
        let fill = |position| Light {
            kind: LightKind::Point,
            color: Color::rgb(1.0, 0.95, 0.9),
            intensity: 400_000.0,
            position,
            cast_shadows: false,
        };
        Self {
            ambient: Color::rgb(0.8, 0.85, 1.0),
            ambient_brightness: 150.0,
            lights: vec![
                Light {
                    kind: LightKind::Directional,
                    color: Color::WHITE,
                    intensity: 8_000.0,
                    position: Vec3::new(-6.0, 4.0, 12.0),
                    cast_shadows: true,
                },
                fill(Vec3::new(8.0, -4.0, 6.0)),
                fill(Vec3::new(-8.0, 4.0, 6.0)),
            ],
        }
    }
}

/// One mesh of the current frame, in world space.
#[derive(Clone, Debug)]
pub struct FrameObject {
    /// Entity id; `None` for the field.
    pub owner: Option<String>,
    pub name: String,
    pub geometry: Arc<Geometry>,
    pub material: Material,
    pub transform: Mat4,
}

#[derive(Debug)]
struct FieldObject {
    source: Arc<CachedModel>,
    live: SceneObject,
}

impl FieldObject {
    fn release(self) {
        self.live.dispose_materials();
    }
}

pub struct Odometry3d {
    base: ViewBase,
    config: Scene3dConfig,
    cache: ModelCache,
    camera: CameraState,
    last_camera: CameraState,
    last_page_size: Vec2,
    controls: Option<Box<dyn CameraControls>>,
    render_type: RenderType,
    control_type: ControlType,
    origin: Origin,
    cinematic: bool,
    field_name: Option<String>,
    field: Option<FieldObject>,
    entities: BTreeMap<String, Render3d>,
    /// Telemetry path per entity id, pulled by [`Odometry3d::apply_poses`].
    pose_paths: BTreeMap<String, String>,
    camera_revision: u64,
    request_redraw: bool,
    events: EventBus<SceneEvent>,
}

impl Odometry for Odometry3d {
    fn base(&self) -> &ViewBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ViewBase {
        &mut self.base
    }
}

impl Odometry3d {
    pub fn new(
        base: ViewBase,
        config: Scene3dConfig,
        store: Arc<dyn DefinitionStore>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let config = config.sanitized();
        let camera = CameraState::spawn(config.render_type, config.fov_degrees);
        Self {
            last_page_size: base.page_size(),
            base,
            cache: ModelCache::new(store, loader).with_throttle(config.load_throttle()),
            camera,
            last_camera: camera,
            controls: controls_for(config.control_type, &config),
            render_type: config.render_type,
            control_type: config.control_type,
            origin: config.origin,
            cinematic: config.cinematic,
            field_name: None,
            field: None,
            entities: BTreeMap::new(),
            pose_paths: BTreeMap::new(),
            camera_revision: 0,
            request_redraw: true,
            events: EventBus::new(),
            config,
        }
    }

    pub fn config(&self) -> &Scene3dConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ModelCache {
        &mut self.cache
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    /// Direct camera access for hosts that drive it themselves.
    pub fn camera_mut(&mut self) -> &mut CameraState {
        &mut self.camera
    }

    /// Bumped whenever the camera moved past the redraw epsilon, changed
    /// projection or the page was resized.
    pub fn camera_revision(&self) -> u64 {
        self.camera_revision
    }

    pub fn controls(&self) -> Option<&dyn CameraControls> {
        self.controls.as_deref()
    }

    pub fn events(&mut self) -> &mut EventBus<SceneEvent> {
        &mut self.events
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&SceneEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    pub fn request_redraw(&mut self) {
        self.request_redraw = true;
    }

    pub fn needs_redraw(&self) -> bool {
        self.request_redraw
    }

    pub fn render_type(&self) -> RenderType {
        self.render_type
    }

    /// Switches projection and respawns the camera for it.
    pub fn set_render_type(&mut self, render_type: RenderType) {
        let Some(change) = Change::new(self.render_type, render_type) else {
            return;
        };
        self.render_type = render_type;
        self.camera = CameraState::spawn(render_type, self.config.fov_degrees);
        self.rebuild_controls();
        self.request_redraw = true;
        self.events.emit(SceneEvent::RenderTypeChanged(change));
    }

    pub fn control_type(&self) -> ControlType {
        self.control_type
    }

    pub fn set_control_type(&mut self, control_type: ControlType) {
        let Some(change) = Change::new(self.control_type, control_type) else {
            return;
        };
        self.control_type = control_type;
        self.rebuild_controls();
        self.request_redraw = true;
        self.events.emit(SceneEvent::ControlTypeChanged(change));
    }

    fn rebuild_controls(&mut self) {
        if let Some(mut old) = self.controls.take() {
            old.dispose();
        }
        self.controls = controls_for(self.control_type, &self.config);
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Origin) {
        let Some(change) = Change::new(self.origin, origin) else {
            return;
        };
        self.origin = origin;
        self.request_redraw = true;
        self.events.emit(SceneEvent::OriginChanged(change));
    }

    pub fn is_cinematic(&self) -> bool {
        self.cinematic
    }

    /// Toggles the shadowed light rig and the cache variant entities use.
    pub fn set_cinematic(&mut self, cinematic: bool) {
        let Some(change) = Change::new(self.cinematic, cinematic) else {
            return;
        };
        self.cinematic = cinematic;
        self.request_redraw = true;
        self.events.emit(SceneEvent::CinematicChanged(change));
    }

    pub fn variant(&self) -> Variant {
        Variant::from_cinematic(self.cinematic)
    }

    pub fn lighting(&self) -> Lighting {
        if self.cinematic { Lighting::cinematic() } else { Lighting::basic() }
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// Whether the field model is currently shown.
    pub fn has_field_object(&self) -> bool {
        self.field.is_some()
    }

    /// Swaps the field. The model appears once the cache has it.
    pub fn set_field(&mut self, name: Option<&str>) {
        let after = name.map(str::to_owned);
        let Some(change) = Change::new(self.field_name.clone(), after) else {
            return;
        };
        if let Some(old) = self.field.take() {
            old.release();
        }
        info!(before = ?change.before, after = ?change.after, "3d field changed");
        self.field_name = change.after.clone();
        self.request_redraw = true;
        self.events.emit(SceneEvent::FieldChanged(change));
    }

    /// Center of the field in field coordinates; subtracted from entity
    /// positions so the field sits on the origin.
    pub fn scene_offset(&self) -> Vec3 {
        let size = self
            .field_name
            .as_deref()
            .and_then(|name| self.cache.store().field(name))
            .map(|f| f.size)
            .filter(|s| s.x > 0.0 && s.y > 0.0 && s.is_finite())
            .unwrap_or(DEFAULT_FIELD_SIZE);
        (size * 0.5).extend(0.0)
    }

    pub fn entity(&self, id: &str) -> Option<&Render3d> {
        self.entities.get(id)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Replaces the entity set. Entities are matched by id; unknown ids are
    /// created and missing ones disposed.
    pub fn set_entities(&mut self, states: Vec<EntityState>) {
        let incoming: BTreeMap<String, EntityState> =
            states.into_iter().map(|s| (s.id.clone(), s)).collect();
        let mut hints = self.base.hints().clone();

        let removed: Vec<String> = self
            .entities
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for id in &removed {
            if let Some(mut entity) = self.entities.remove(id) {
                entity.dispose(&mut hints);
            }
        }

        let mut added = Vec::new();
        for (id, state) in incoming {
            match self.entities.get_mut(&id) {
                Some(entity) => entity.set_state(state),
                None => {
                    self.entities.insert(id.clone(), Render3d::new(state));
                    added.push(id);
                }
            }
        }

        if !added.is_empty() || !removed.is_empty() {
            debug!(?added, ?removed, "entity set changed");
            self.request_redraw = true;
            self.events.emit(SceneEvent::EntitiesChanged { added, removed });
        }
    }

    /// Drives the entity's pose from `path` on every [`Odometry3d::apply_poses`].
    pub fn bind_pose(&mut self, id: &str, path: impl Into<String>) -> bool {
        if !self.entities.contains_key(id) {
            return false;
        }
        self.pose_paths.insert(id.to_owned(), path.into());
        true
    }

    pub fn unbind_pose(&mut self, id: &str) -> bool {
        self.pose_paths.remove(id).is_some()
    }

    /// Pulls the pose of every bound entity at `time`. Entities without a
    /// sample are hidden until one arrives.
    pub fn apply_poses(&mut self, source: &dyn PoseSource, time: f64) {
        let entities = &mut self.entities;
        self.pose_paths.retain(|id, _| entities.contains_key(id));
        for (id, path) in &self.pose_paths {
            let Some(entity) = entities.get_mut(id) else {
                continue;
            };
            let mut state = entity.state().clone();
            match source.pose_at(path, time) {
                Some(pose) => {
                    state.pose = pose.to_3d();
                    state.visible = true;
                }
                None => state.visible = false,
            }
            entity.set_state(state);
        }
    }

    /// External hover signal for one entity.
    pub fn set_hovered(&mut self, id: &str, hovered: bool) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.set_hovered(hovered);
        }
    }

    /// Runs one frame: controls, cache, field, entities, then the camera
    /// check.
    /// Returns whether a redraw is due.
    pub fn update(&mut self, frame: FrameTime, input: &ControlInput) -> bool {
        if let Some(controls) = self.controls.as_mut() {
            controls.update(&mut self.camera, input, frame);
        }
        if self.cache.poll_pending() {
            self.request_redraw = true;
        }
        self.update_field(frame.now);
        self.update_entities(frame.now);
        self.check_camera();
        self.request_redraw
    }

    fn update_field(&mut self, now: Duration) {
        let Some(name) = self.field_name.clone() else {
            return;
        };
        let variant = self.variant();
        match self.cache.load(&ModelKey::Field(name), variant, now) {
            Some(entry) => {
                if self.field.as_ref().is_some_and(|f| Arc::ptr_eq(&f.source, &entry)) {
                    return;
                }
                if let Some(old) = self.field.take() {
                    old.release();
                }
                let live = entry.object.clone();
                self.field = Some(FieldObject { source: entry, live });
                self.request_redraw = true;
            }
            None => {
                if self.field.as_ref().is_some_and(|f| f.source.object.is_disposed()) {
                    if let Some(old) = self.field.take() {
                        old.release();
                    }
                    self.request_redraw = true;
                }
            }
        }
    }

    fn update_entities(&mut self, now: Duration) {
        let mut hints = self.base.hints().clone();
        let scene_offset = self.scene_offset();
        let mut ctx = UpdateContext {
            cache: &mut self.cache,
            variant: Variant::from_cinematic(self.cinematic),
            now,
            scene_offset,
            root: self.origin.root_transform(),
            camera: &self.camera,
            page_size: self.base.page_size(),
            hints: &mut hints,
        };
        for entity in self.entities.values_mut() {
            if entity.update(&mut ctx) {
                self.request_redraw = true;
            }
        }
    }

    fn check_camera(&mut self) {
        let eps = self.config.redraw_epsilon;
        let a = &self.camera;
        let b = &self.last_camera;
        let moved = a.render_type != b.render_type
            || a.position.distance(b.position) > eps
            || a.target.distance(b.target) > eps
            || (a.ortho_height - b.ortho_height).abs() > eps;
        if moved {
            self.last_camera = self.camera;
            self.camera_revision += 1;
            self.request_redraw = true;
        }
        let page_size = self.base.page_size();
        if page_size != self.last_page_size {
            self.last_page_size = page_size;
            self.camera_revision += 1;
            self.request_redraw = true;
        }
    }

    /// Produces the frame when a redraw is due and clears the flag.
    pub fn render(&mut self) -> Option<Vec<FrameObject>> {
        if !self.request_redraw {
            return None;
        }
        self.request_redraw = false;
        Some(self.frame_objects())
    }

    /// Every live mesh with its world transform.
    pub fn frame_objects(&self) -> Vec<FrameObject> {
        let root = self.origin.root_transform();
        let mut out = Vec::new();
        if let Some(field) = &self.field {
            let parent = root * self.origin.field_transform();
            field.live.for_each_mesh(parent, &mut |object, geometry, material, world| {
                out.push(FrameObject {
                    owner: None,
                    name: object.name.clone(),
                    geometry: geometry.clone(),
                    material: material.clone(),
                    transform: world,
                });
            });
        }
        for (id, entity) in &self.entities {
            for (object, pose) in entity.objects() {
                let parent = root * Mat4::from_rotation_translation(pose.rotation, pose.translation);
                object.for_each_mesh(parent, &mut |mesh, geometry, material, world| {
                    out.push(FrameObject {
                        owner: Some(id.clone()),
                        name: mesh.name.clone(),
                        geometry: geometry.clone(),
                        material: material.clone(),
                        transform: world,
                    });
                });
            }
        }
        out
    }

    /// Releases every clone and every cache entry.
    pub fn dispose(&mut self) {
        let mut hints = self.base.hints().clone();
        for entity in self.entities.values_mut() {
            entity.dispose(&mut hints);
        }
        self.entities.clear();
        if let Some(field) = self.field.take() {
            field.release();
        }
        if let Some(mut controls) = self.controls.take() {
            controls.dispose();
        }
        self.cache.decache_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Pose, Pose3d};
    use crate::hint::HintBoard;
    use crate::store::{MemoryDefinitions, MemoryPoseSource};
    use crate::three_d::cache::LoadFuture;
    use crate::three_d::primitives::cuboid;
    use crate::three_d::render::EntityType;
    use crate::two_d::robot::ShapeKind;
    use bevy_math::Quat;
    use futures::FutureExt;

    const DEFS: &str = r#"{
        "fields": [{ "name": "Arena", "model_path": "arena.glb", "size": [10.0, 6.0] }]
    }"#;

    fn scene() -> Odometry3d {
        let store = Arc::new(MemoryDefinitions::from_json(DEFS).unwrap());
        let loader = |_: &str| -> LoadFuture {
            let floor = SceneObject::mesh("floor", cuboid(Vec3::new(10.0, 6.0, 0.1)), Material::new(Color::GRAY));
            futures::future::ready(Ok(floor)).boxed()
        };
        let base = ViewBase::new(Vec2::new(800.0, 600.0), 1.0, HintBoard::shared());
        Odometry3d::new(base, Scene3dConfig::default(), store, Arc::new(loader))
    }

    fn tick(scene: &mut Odometry3d, ms: u64) -> bool {
        let frame = FrameTime::new(Duration::from_millis(ms), Duration::from_millis(16));
        scene.update(frame, &ControlInput::default())
    }

    #[test]
    fn redraw_flag_clears_after_render() {
        let mut scene = scene();
        assert!(tick(&mut scene, 0));
        assert!(scene.render().is_some());
        assert!(!tick(&mut scene, 16));
        assert!(scene.render().is_none());
    }

    #[test]
    fn tiny_camera_motion_does_not_redraw() {
        let mut scene = scene();
        tick(&mut scene, 0);
        scene.render();
        scene.camera_mut().position.x += 5e-5;
        assert!(!tick(&mut scene, 16));
        scene.camera_mut().position.x += 1e-3;
        assert!(tick(&mut scene, 32));
    }

    #[test]
    fn field_swap_loads_and_centers() {
        let mut scene = scene();
        scene.set_field(Some("Arena"));
        assert!(tick(&mut scene, 0));
        assert!(scene.has_field_object());
        assert_eq!(scene.scene_offset(), Vec3::new(5.0, 3.0, 0.0));
        let objects = scene.render().unwrap();
        assert!(objects.iter().any(|o| o.owner.is_none() && o.name == "floor"));

        let events = scene.events().drain();
        assert!(matches!(&events[0], SceneEvent::FieldChanged(c) if c.after.as_deref() == Some("Arena")));
    }

    #[test]
    fn unknown_field_shows_nothing() {
        let mut scene = scene();
        scene.set_field(Some("Foo"));
        tick(&mut scene, 0);
        assert!(!scene.has_field_object());
        assert_eq!(scene.cache().stats().entries, 0);
    }

    #[test]
    fn setters_emit_once_and_request_redraw() {
        let mut scene = scene();
        tick(&mut scene, 0);
        scene.render();

        scene.set_origin(Origin::RedMinus);
        scene.set_origin(Origin::RedMinus);
        assert!(scene.needs_redraw());
        scene.render();

        scene.set_render_type(RenderType::Iso);
        assert_eq!(scene.camera().render_type, RenderType::Iso);
        scene.set_control_type(ControlType::Free);
        assert_eq!(scene.controls().map(|c| c.kind()), Some(ControlType::Free));
        scene.set_control_type(ControlType::None);
        assert!(scene.controls().is_none());
        scene.set_cinematic(true);
        assert_eq!(scene.lighting(), Lighting::cinematic());

        let events = scene.events().drain();
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn entity_set_is_keyed_by_id() {
        let mut scene = scene();
        let robot = |id: &str| EntityState::new(id, EntityType::Builtin(ShapeKind::Robot), Pose3d::default());
        scene.set_entities(vec![robot("a"), robot("b")]);
        scene.set_entities(vec![robot("b"), robot("c")]);
        assert_eq!(scene.entity_ids().collect::<Vec<_>>(), vec!["b", "c"]);
        let events = scene.events().drain();
        assert_eq!(
            events.last(),
            Some(&SceneEvent::EntitiesChanged {
                added: vec!["c".into()],
                removed: vec!["a".into()],
            })
        );
        assert!(tick(&mut scene, 0));
        assert!(scene.frame_objects().iter().any(|o| o.owner.as_deref() == Some("b")));
    }

    #[test]
    fn red_origin_rotates_entities() {
        let mut scene = scene();
        let pose = Pose3d::new(Vec3::new(9.0, 4.035, 0.0), Quat::IDENTITY);
        scene.set_entities(vec![EntityState::new("r", EntityType::Builtin(ShapeKind::Cube), pose)]);
        tick(&mut scene, 0);
        let blue = scene.frame_objects()[0].transform.w_axis;
        scene.set_origin(Origin::RedPlus);
        let red = scene.frame_objects()[0].transform.w_axis;
        assert!((blue.x + red.x).abs() < 1e-4);
        assert!(blue.x > 0.0);
    }

    #[test]
    fn degenerate_camera_config_is_clamped() {
        let store = Arc::new(MemoryDefinitions::from_json(DEFS).unwrap());
        let loader = |_: &str| -> LoadFuture { futures::future::pending().boxed() };
        let config = Scene3dConfig {
            fov_degrees: 0.0,
            redraw_epsilon: f32::NAN,
            ..Default::default()
        };
        let base = ViewBase::new(Vec2::new(800.0, 600.0), 1.0, HintBoard::shared());
        let scene = Odometry3d::new(base, config, store, Arc::new(loader));
        assert_eq!(scene.config().fov_degrees, 10.0);
        assert_eq!(scene.config().redraw_epsilon, 1e-4);
        assert_eq!(scene.camera().fov_degrees, 10.0);
        assert!(scene.camera().projection_matrix(4.0 / 3.0).is_finite());
    }

    #[test]
    fn camera_revision_tracks_real_moves_only() {
        let mut scene = scene();
        tick(&mut scene, 0);
        let start = scene.camera_revision();
        tick(&mut scene, 16);
        assert_eq!(scene.camera_revision(), start);
        scene.camera_mut().position.x += 5e-5;
        tick(&mut scene, 32);
        assert_eq!(scene.camera_revision(), start);

        scene.camera_mut().position.x += 1.0;
        tick(&mut scene, 48);
        assert_eq!(scene.camera_revision(), start + 1);
        scene.set_render_type(RenderType::Iso);
        tick(&mut scene, 64);
        assert_eq!(scene.camera_revision(), start + 2);
    }

    #[test]
    fn bound_entity_follows_source_and_hides_without_data() {
        let mut scene = scene();
        let robot = |id: &str| EntityState::new(id, EntityType::Builtin(ShapeKind::Robot), Pose3d::default());
        scene.set_entities(vec![robot("a")]);
        assert!(!scene.bind_pose("missing", "/a"));
        assert!(scene.bind_pose("a", "/a"));

        let mut source = MemoryPoseSource::new();
        let pose = Pose3d::new(Vec3::new(2.0, 1.0, 0.0), Quat::IDENTITY);
        source.push("/a", 1.0, Pose::ThreeD(pose));

        scene.apply_poses(&source, 0.5);
        tick(&mut scene, 0);
        assert!(!scene.entity("a").unwrap().is_visible());
        assert!(scene.frame_objects().iter().all(|o| o.owner.as_deref() != Some("a")));

        scene.apply_poses(&source, 2.0);
        assert!(tick(&mut scene, 16));
        let entity = scene.entity("a").unwrap();
        assert!(entity.is_visible());
        assert_eq!(entity.state().pose, pose);
        assert!(scene.frame_objects().iter().any(|o| o.owner.as_deref() == Some("a")));

        scene.set_entities(Vec::new());
        scene.apply_poses(&source, 2.0);
        assert!(!scene.unbind_pose("a"));
    }
}
