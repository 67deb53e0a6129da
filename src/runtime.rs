//! Bevy host for the 3D view.
//!
//! The plugin feeds keyboard/mouse state into [`Odometry3d::update`], mirrors
//! the produced frame into `Mesh3d` entities and only asks bevy for a redraw
//! when the scene says one is due.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy::window::{PrimaryWindow, RequestRedraw};
use bevy_camera::{OrthographicProjection, PerspectiveProjection, Projection, ScalingMode};

use crate::odometry::{FrameTime, Odometry};
use crate::three_d::camera::{CameraState, FAR, NEAR};
use crate::three_d::controls::{ControlInput, Key, PointerButton};
use crate::three_d::model::{Geometry, Material};
use crate::three_d::{LightKind, Odometry3d, RenderType};

#[derive(Resource)]
pub struct OdometryRes(pub Odometry3d);

impl OdometryRes {
    pub fn new(scene: Odometry3d) -> Self {
        Self(scene)
    }
}

/// Input gathered this frame.
#[derive(Resource, Default)]
pub struct SceneInput(pub ControlInput);

#[derive(Component)]
pub struct SceneCamera;

#[derive(Component)]
pub struct SceneMesh;

#[derive(Component)]
pub struct SceneLight;

/// Bevy meshes per shared geometry, keyed by `Arc` address.
#[derive(Resource, Default)]
struct MeshHandles {
    by_geometry: HashMap<usize, (Arc<Geometry>, Handle<Mesh>)>,
}

/// What a `StandardMaterial` is built from, with floats as bits so it can key
/// a map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MaterialKey {
    rgba: [u32; 4],
    transparent: bool,
}

impl MaterialKey {
    fn of(material: &Material) -> Self {
        let color = material.display_color();
        Self {
            rgba: [color.r, color.g, color.b, color.a].map(f32::to_bits),
            transparent: material.transparent,
        }
    }

    fn build(self) -> StandardMaterial {
        let [r, g, b, a] = self.rgba.map(f32::from_bits);
        StandardMaterial {
            base_color: crate::core::Color::rgba(r, g, b, a).into(),
            alpha_mode: if self.transparent {
                AlphaMode::Blend
            } else {
                AlphaMode::Opaque
            },
            perceptual_roughness: 0.8,
            ..default()
        }
    }
}

/// One bevy material per distinct look. Entries unused by a frame are
/// dropped after it.
#[derive(Resource, Default)]
struct MaterialHandles {
    by_key: HashMap<MaterialKey, Handle<StandardMaterial>>,
}

#[derive(Default)]
pub struct OdometryPlugin;

impl Plugin for OdometryPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SceneInput>()
            .init_resource::<MeshHandles>()
            .init_resource::<MaterialHandles>()
            .add_systems(Startup, setup_scene_camera)
            .add_systems(
                Update,
                (collect_input, tick_scene, sync_camera, sync_frame).chain(),
            );
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_scene(scene: Odometry3d) {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.12, 0.12, 0.14)))
        .insert_resource(OdometryRes::new(scene))
        .add_plugins((DefaultPlugins, OdometryPlugin))
        .run();
}

#[cfg(target_arch = "wasm32")]
pub fn run_scene(scene: Odometry3d, canvas_id: &str) {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.12, 0.12, 0.14)))
        .insert_resource(OdometryRes::new(scene))
        .add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    canvas: Some(format!("#{}", canvas_id)),
                    fit_canvas_to_parent: true,
                    ..default()
                }),
                ..default()
            }),
            OdometryPlugin,
        ))
        .run();
}

fn setup_scene_camera(mut commands: Commands, scene: Option<Res<OdometryRes>>) {
    let state = scene
        .map(|s| *s.0.camera())
        .unwrap_or_else(|| CameraState::spawn(RenderType::Proj, 50.0));
    commands.spawn((
        Name::new("odometry_camera"),
        SceneCamera,
        Camera3d::default(),
        projection_for(&state),
        transform_for(&state),
    ));
}

fn movement_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(Key::Forward),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(Key::Back),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::Space => Some(Key::Up),
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Some(Key::Down),
        _ => None,
    }
}

fn pointer_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Left),
        MouseButton::Right => Some(PointerButton::Right),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

fn collect_input(
    keys: Res<ButtonInput<KeyCode>>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut wheel: MessageReader<MouseWheel>,
    mut motion: MessageReader<MouseMotion>,
    scene: Option<Res<OdometryRes>>,
    mut input: ResMut<SceneInput>,
) {
    let mut next = ControlInput::default();
    for event in wheel.read() {
        next.scroll += event.y;
    }
    for event in motion.read() {
        next.pointer_delta += event.delta;
    }
    next.held = keys.get_pressed().copied().filter_map(movement_key).collect();
    next.pressed = keys.get_just_pressed().copied().filter_map(movement_key).collect();
    next.released = keys.get_just_released().copied().filter_map(movement_key).collect();
    next.buttons = mouse.get_pressed().copied().filter_map(pointer_button).collect();
    // Locking the OS cursor is left to the host; free controls look around
    // while the right button is held instead.
    next.pointer_locked = scene
        .is_some_and(|s| s.0.controls().is_some_and(|c| c.wants_pointer_lock()))
        && mouse.pressed(MouseButton::Right);
    input.0 = next;
}

fn tick_scene(
    time: Res<Time>,
    input: Res<SceneInput>,
    scene: Option<ResMut<OdometryRes>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut redraw: MessageWriter<RequestRedraw>,
) {
    let Some(mut scene) = scene else {
        return;
    };
    if let Ok(window) = windows.single() {
        let size = Vec2::new(window.width(), window.height());
        if size != scene.0.base().page_size() {
            scene.0.resize(size);
        }
    }
    let frame = FrameTime::new(time.elapsed(), time.delta());
    if scene.0.update(frame, &input.0) {
        redraw.write(RequestRedraw);
    }
}

fn transform_for(state: &CameraState) -> Transform {
    Transform::from_translation(state.position).looking_at(state.target, state.up)
}

fn projection_for(state: &CameraState) -> Projection {
    match state.render_type {
        RenderType::Proj => Projection::Perspective(PerspectiveProjection {
            fov: state.fov_degrees.to_radians(),
            near: NEAR,
            far: FAR,
            ..default()
        }),
        RenderType::Iso => {
            let mut ortho = OrthographicProjection::default_3d();
            ortho.scaling_mode = ScalingMode::FixedVertical {
                viewport_height: state.ortho_height,
            };
            ortho.near = -FAR;
            ortho.far = FAR;
            Projection::Orthographic(ortho)
        }
    }
}

fn sync_camera(
    scene: Option<Res<OdometryRes>>,
    mut synced: Local<Option<u64>>,
    mut cameras: Query<(&mut Transform, &mut Projection), With<SceneCamera>>,
) {
    let Some(scene) = scene else {
        return;
    };
    let revision = scene.0.camera_revision();
    if *synced == Some(revision) {
        return;
    }
    *synced = Some(revision);
    let state = scene.0.camera();
    for (mut transform, mut projection) in cameras.iter_mut() {
        *transform = transform_for(state);
        *projection = projection_for(state);
    }
}

/// Rebuilds mesh and light entities when the scene produced a frame. Meshes
/// and materials are shared through the handle caches.
#[allow(clippy::too_many_arguments)]
fn sync_frame(
    mut commands: Commands,
    scene: Option<ResMut<OdometryRes>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut handles: ResMut<MeshHandles>,
    mut material_handles: ResMut<MaterialHandles>,
    existing_meshes: Query<Entity, With<SceneMesh>>,
    existing_lights: Query<Entity, With<SceneLight>>,
) {
    let Some(mut scene) = scene else {
        return;
    };
    if !scene.0.needs_redraw() {
        return;
    }
    let lighting = scene.0.lighting();
    let Some(objects) = scene.0.render() else {
        return;
    };

    for entity in existing_meshes.iter().chain(existing_lights.iter()) {
        commands.entity(entity).despawn();
    }

    handles.by_geometry.retain(|_, (geometry, handle)| {
        let keep = !geometry.is_disposed();
        if !keep {
            meshes.remove(handle.id());
        }
        keep
    });

    let mut used = HashSet::new();
    for object in objects {
        let key = Arc::as_ptr(&object.geometry) as usize;
        let mesh = handles
            .by_geometry
            .entry(key)
            .or_insert_with(|| {
                let handle = meshes.add(object.geometry.to_mesh());
                (object.geometry.clone(), handle)
            })
            .1
            .clone();
        let look = MaterialKey::of(&object.material);
        used.insert(look);
        let material = material_handles
            .by_key
            .entry(look)
            .or_insert_with(|| materials.add(look.build()))
            .clone();
        commands.spawn((
            Name::new(object.name),
            SceneMesh,
            Mesh3d(mesh),
            MeshMaterial3d(material),
            Transform::from_matrix(object.transform),
        ));
    }

    material_handles.by_key.retain(|key, handle| {
        let keep = used.contains(key);
        if !keep {
            materials.remove(handle.id());
        }
        keep
    });

    for light in lighting.lights {
        let transform = Transform::from_translation(light.position).looking_at(Vec3::ZERO, Vec3::Z);
        match light.kind {
            LightKind::Directional => {
                commands.spawn((
                    SceneLight,
                    DirectionalLight {
                        color: light.color.into(),
                        illuminance: light.intensity,
                        shadows_enabled: light.cast_shadows,
                        ..default()
                    },
                    transform,
                ));
            }
            LightKind::Point => {
                commands.spawn((
                    SceneLight,
                    PointLight {
                        color: light.color.into(),
                        intensity: light.intensity,
                        range: 50.0,
                        shadows_enabled: light.cast_shadows,
                        ..default()
                    },
                    transform,
                ));
            }
        }
    }
}
