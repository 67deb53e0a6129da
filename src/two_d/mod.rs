//! 2D field view.
//!
//! [`Odometry2d`] owns the render tree and repaints the whole canvas every
//! frame in four z bands around the grid, field image and border. Pointer
//! input drives hover hints and drag edits of robots and obstacles.

pub mod canvas;
pub mod obstacle;
pub mod render;
pub mod robot;
pub mod tessellate;
pub mod trail;

use std::collections::BTreeMap;
use std::sync::Arc;

use bevy_math::Vec2;
use tracing::debug;

use crate::config::Field2dConfig;
use crate::core::{Color, Pose2d};
use crate::events::{Change, EventBus, SubscriptionId};
use crate::hint::{HintSlot, SharedHints};
use crate::odometry::{Odometry, ViewBase};
use crate::store::{FieldDefinition, PoseSource, StaticTheme, ThemeResolver};
use crate::transform::{CanvasTransform, normalize_radians};

use self::canvas::{Canvas, Path2d, TextAlign};
use self::obstacle::Obstacle;
use self::render::{
    AFTER_BORDER, AFTER_GRID, AFTER_IMAGE, BEFORE_GRID, Drawable, HoverToken, NodeId, PaintStyle,
    RenderEnv, RenderTree,
};
use self::robot::{Robot, VELOCITY_SCALE};
use self::trail::Trail;

/// Field size used until a field definition is set.
const DEFAULT_FIELD_SIZE: Vec2 = Vec2::new(16.54, 8.07);
const MIN_ZOOM: f32 = 0.1;
const MAX_ZOOM: f32 = 50.0;
const MAX_GRID_LINES: usize = 1000;

/// Edits made through the 2D view.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldEvent {
    FieldChanged(Change<Option<String>>),
    PoseEdited { node: NodeId, change: Change<Pose2d> },
    VelocityEdited { node: NodeId, change: Change<Option<Vec2>> },
    RadiusEdited { node: NodeId, change: Change<f32> },
    ViewChanged { zoom: Change<f32>, pan: Change<Vec2> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum DragStart {
    Pose(Pose2d),
    Velocity(Option<Vec2>),
    Radius(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Drag {
    node: NodeId,
    token: HoverToken,
    /// Offset from the node's world position to the grab point.
    grab: Vec2,
    start: DragStart,
}

pub struct Odometry2d {
    base: ViewBase,
    config: Field2dConfig,
    theme: Arc<dyn ThemeResolver>,
    field: Option<Arc<FieldDefinition>>,
    tree: RenderTree,
    zoom: f32,
    pan: Vec2,
    hovered: Option<(NodeId, HoverToken)>,
    drag: Option<Drag>,
    hint: HintSlot,
    events: EventBus<FieldEvent>,
    /// Telemetry path per bound robot or trail node.
    pose_paths: BTreeMap<NodeId, String>,
}

impl Odometry for Odometry2d {
    fn base(&self) -> &ViewBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ViewBase {
        &mut self.base
    }
}

impl Default for Odometry2d {
    fn default() -> Self {
        Self::new(ViewBase::default(), Field2dConfig::default(), Arc::new(StaticTheme::dark()))
    }
}

impl Odometry2d {
    pub fn new(base: ViewBase, config: Field2dConfig, theme: Arc<dyn ThemeResolver>) -> Self {
        let config = config.sanitized();
        let zoom = config.zoom;
        let quality = config.quality;
        let mut view = Self {
            base,
            config,
            theme,
            field: None,
            tree: RenderTree::new(),
            zoom,
            pan: Vec2::ZERO,
            hovered: None,
            drag: None,
            hint: HintSlot::default(),
            events: EventBus::new(),
            pose_paths: BTreeMap::new(),
        };
        view.set_quality(quality);
        view
    }

    pub fn config(&self) -> &Field2dConfig {
        &self.config
    }

    pub fn set_theme(&mut self, theme: Arc<dyn ThemeResolver>) {
        self.theme = theme;
    }

    pub fn field(&self) -> Option<&FieldDefinition> {
        self.field.as_deref()
    }

    pub fn field_size(&self) -> Vec2 {
        self.field
            .as_ref()
            .map(|f| f.size)
            .filter(|s| s.x > 0.0 && s.y > 0.0 && s.is_finite())
            .unwrap_or(DEFAULT_FIELD_SIZE)
    }

    /// Swaps the field plan. `None` keeps drawing the default-size field
    /// without an image.
    pub fn set_field(&mut self, field: Option<Arc<FieldDefinition>>) {
        let before = self.field.as_ref().map(|f| f.name.clone());
        let after = field.as_ref().map(|f| f.name.clone());
        self.field = field;
        if let Some(change) = Change::new(before, after) {
            debug!(field = ?change.after, "2d field changed");
            self.events.emit(FieldEvent::FieldChanged(change));
        }
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut RenderTree {
        &mut self.tree
    }

    pub fn events(&mut self) -> &mut EventBus<FieldEvent> {
        &mut self.events
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&FieldEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    pub fn transform(&self) -> CanvasTransform {
        CanvasTransform::with_view(
            self.base.quality(),
            self.base.page_size(),
            self.config.padding,
            self.field_size(),
            self.zoom,
            self.pan,
        )
    }

    fn handle_radius_world(&self) -> f32 {
        self.transform().page_length_to_world(self.config.handle_radius_px)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    /// Zooms by `factor` keeping the world point under `anchor` (page
    /// pixels) fixed.
    pub fn zoom_by(&mut self, factor: f32, anchor: Vec2) {
        if !(factor.is_finite() && factor > 0.0 && anchor.is_finite()) {
            return;
        }
        let before = (self.zoom, self.pan);
        let fixed = self.transform().page_to_world(anchor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let moved = self.transform().page_to_world(anchor);
        self.pan += fixed - moved;
        self.emit_view_change(before);
    }

    /// Pans by a page-pixel delta.
    pub fn pan_by(&mut self, delta: Vec2) {
        if !delta.is_finite() {
            return;
        }
        let before = (self.zoom, self.pan);
        let ppm = self.transform().pixels_per_meter();
        self.pan += Vec2::new(-delta.x, delta.y) / ppm;
        self.emit_view_change(before);
    }

    pub fn reset_view(&mut self) {
        let before = (self.zoom, self.pan);
        self.zoom = self.config.zoom;
        self.pan = Vec2::ZERO;
        self.emit_view_change(before);
    }

    fn emit_view_change(&mut self, (zoom, pan): (f32, Vec2)) {
        if zoom != self.zoom || pan != self.pan {
            self.events.emit(FieldEvent::ViewChanged {
                zoom: Change {
                    before: zoom,
                    after: self.zoom,
                },
                pan: Change {
                    before: pan,
                    after: self.pan,
                },
            });
        }
    }

    fn add_node(&mut self, drawable: impl Drawable, position: Vec2, z: i32) -> Option<NodeId> {
        let root = self.tree.root();
        let id = self.tree.insert(root, drawable)?;
        self.tree.set_position(id, position);
        self.tree.set_z(id, z);
        Some(id)
    }

    pub fn add_robot(&mut self, robot: Robot, position: Vec2) -> Option<NodeId> {
        self.add_node(robot, position, AFTER_IMAGE)
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle, center: Vec2) -> Option<NodeId> {
        self.add_node(obstacle, center, AFTER_IMAGE)
    }

    /// Trails sit under robots so the robot stays grabbable.
    pub fn add_trail(&mut self, color: Color) -> Option<NodeId> {
        let trail = Trail::new(self.config.trail_length, color);
        let id = self.add_node(trail, Vec2::ZERO, AFTER_IMAGE)?;
        self.tree.set_z2(id, -1);
        Some(id)
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.hovered.is_some_and(|(h, _)| h == id) {
            self.hovered = None;
        }
        if self.drag.is_some_and(|d| d.node == id) {
            self.drag = None;
        }
        self.pose_paths.remove(&id);
        self.tree.remove(id)
    }

    /// Binds a robot or trail node to a telemetry path read by
    /// [`apply_poses`](Self::apply_poses). `false` for unknown nodes.
    pub fn bind_pose(&mut self, id: NodeId, path: impl Into<String>) -> bool {
        if !self.tree.contains(id) {
            return false;
        }
        self.pose_paths.insert(id, path.into());
        true
    }

    pub fn unbind_pose(&mut self, id: NodeId) -> bool {
        self.pose_paths.remove(&id).is_some()
    }

    /// Pulls the poses of every bound node at `time` (seconds).
    ///
    /// Robots move to the sample at `time` and are hidden while the source
    /// has none. Trails show the samples of the last `trail_window_secs` and
    /// are hidden when that range is empty. A robot being dragged keeps the
    /// dragged pose.
    pub fn apply_poses(&mut self, source: &dyn PoseSource, time: f64) {
        let tree = &self.tree;
        self.pose_paths.retain(|id, _| tree.contains(*id));
        let window = self.config.trail_window_secs;
        let bindings: Vec<(NodeId, String)> = self
            .pose_paths
            .iter()
            .map(|(id, path)| (*id, path.clone()))
            .collect();
        for (id, path) in bindings {
            if self.tree.drawable::<Trail>(id).is_some() {
                let poses = source.pose_range(&path, time - window, time);
                self.tree.set_visible(id, !poses.is_empty());
                if let Some(trail) = self.tree.drawable_mut::<Trail>(id) {
                    trail.set_poses(&poses);
                }
            } else if self.tree.drawable::<Robot>(id).is_some() {
                if self.drag.is_some_and(|d| d.node == id) {
                    continue;
                }
                match source.pose_at(&path, time) {
                    Some(pose) => {
                        self.set_robot_pose(id, pose.to_2d());
                        self.tree.set_visible(id, true);
                    }
                    None => {
                        self.tree.set_visible(id, false);
                        if self.hovered.is_some_and(|(h, _)| h == id) {
                            self.hovered = None;
                        }
                    }
                }
            }
        }
    }

    pub fn robot(&self, id: NodeId) -> Option<&Robot> {
        self.tree.drawable::<Robot>(id)
    }

    pub fn robot_mut(&mut self, id: NodeId) -> Option<&mut Robot> {
        self.tree.drawable_mut::<Robot>(id)
    }

    pub fn robot_pose(&self, id: NodeId) -> Option<Pose2d> {
        let robot = self.robot(id)?;
        Some(robot.pose(self.tree.world_position(id)))
    }

    /// Moves a robot to a field-relative pose.
    pub fn set_robot_pose(&mut self, id: NodeId, pose: Pose2d) -> bool {
        let Some(parent) = self.tree.get(id).and_then(|n| n.parent()) else {
            return false;
        };
        let origin = self.tree.world_position(parent);
        let Some(robot) = self.tree.drawable_mut::<Robot>(id) else {
            return false;
        };
        robot.set_rotation(pose.rotation);
        self.tree.set_position(id, pose.translation - origin);
        true
    }

    pub fn hovered(&self) -> Option<(NodeId, HoverToken)> {
        self.hovered
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Repaints the whole canvas and refreshes hover state.
    pub fn render(&mut self, canvas: &mut dyn Canvas) {
        let transform = self.transform();
        let theme = Arc::clone(&self.theme);
        let style = PaintStyle {
            line_width_px: self.config.line_width_px,
            handle_radius_px: self.config.handle_radius_px,
        };

        canvas.clear(transform.canvas_size(), Some(theme.resolve("background")));
        self.tree.begin_pass();
        let root = self.tree.root();
        let mut env = RenderEnv {
            canvas,
            transform: &transform,
            theme: theme.as_ref(),
            style,
        };

        self.tree.render(root, Some(BEFORE_GRID), &mut env);
        if self.config.show_grid {
            self.draw_grid(&mut env);
        }
        self.tree.render(root, Some(AFTER_GRID), &mut env);
        self.draw_image(&mut env);
        self.tree.render(root, Some(AFTER_IMAGE), &mut env);
        self.draw_border(&mut env);
        if self.config.show_axes {
            self.draw_axes(&mut env);
        }
        self.tree.render(root, Some(AFTER_BORDER), &mut env);

        self.update_hover();
    }

    fn draw_grid(&self, env: &mut RenderEnv<'_>) {
        let t = env.transform;
        let size = t.field_size();
        if !(size.is_finite() && size.cmpgt(Vec2::ZERO).all()) {
            return;
        }
        // Coarsen the grid rather than emit an unbounded number of lines.
        let step = self
            .config
            .grid_size
            .max(size.max_element() / MAX_GRID_LINES as f32);
        if !(step.is_finite() && step > 0.0) {
            return;
        }
        let color = env.theme.resolve("grid");
        let mut path = Path2d::new();
        let columns = ((size.x + 1e-4) / step).floor() as usize;
        for i in 0..=columns {
            let x = i as f32 * step;
            path = path
                .move_to(t.world_to_canvas(Vec2::new(x, 0.0)))
                .line_to(t.world_to_canvas(Vec2::new(x, size.y)));
        }
        let rows = ((size.y + 1e-4) / step).floor() as usize;
        for i in 0..=rows {
            let y = i as f32 * step;
            path = path
                .move_to(t.world_to_canvas(Vec2::new(0.0, y)))
                .line_to(t.world_to_canvas(Vec2::new(size.x, y)));
        }
        env.canvas.stroke(&path, color, t.page_length_to_canvas(1.0));
    }

    fn draw_image(&self, env: &mut RenderEnv<'_>) {
        let Some(image) = self.field.as_ref().and_then(|f| f.image_path.as_deref()) else {
            return;
        };
        let (min, size) = env.transform.field_canvas_rect();
        env.canvas.image(image, min, size);
    }

    fn draw_border(&self, env: &mut RenderEnv<'_>) {
        let (min, size) = env.transform.field_canvas_rect();
        let border = Path2d::polygon([
            min,
            min + Vec2::new(size.x, 0.0),
            min + size,
            min + Vec2::new(0.0, size.y),
        ]);
        let width = env.transform.page_length_to_canvas(self.config.line_width_px);
        env.canvas.stroke(&border, env.theme.resolve("border"), width);
    }

    fn draw_axes(&self, env: &mut RenderEnv<'_>) {
        let t = env.transform;
        let origin = t.world_to_canvas(Vec2::ZERO);
        let width = t.page_length_to_canvas(self.config.line_width_px);
        let font = t.page_length_to_canvas(12.0);
        for (dir, token, label) in [(Vec2::X, "axis-x", "x"), (Vec2::Y, "axis-y", "y")] {
            let tip = t.world_to_canvas(dir);
            let color = env.theme.resolve(token);
            env.canvas.stroke(&Path2d::polyline([origin, tip]), color, width);
            env.canvas.text(label, tip, font, color, TextAlign::Center);
        }
    }

    fn update_hover(&mut self) {
        let hovered = match (self.drag, self.base.pointer()) {
            (Some(drag), _) => Some((drag.node, drag.token)),
            (None, Some(pointer)) => {
                let world = self.transform().page_to_world(pointer);
                self.tree
                    .the_hovered(self.tree.root(), world, self.handle_radius_world())
            }
            (None, None) => None,
        };
        self.hovered = hovered;

        let mut hints: SharedHints = self.base.hints().clone();
        let hint = match (hovered, self.base.pointer()) {
            (Some((id, _)), Some(anchor)) => self.tree.get(id).and_then(|node| {
                let position = node
                    .resolved_position()
                    .unwrap_or_else(|| self.tree.world_position(id));
                node.drawable().hint(position, anchor)
            }),
            _ => None,
        };
        match hint {
            Some(hint) => self.hint.show(&mut hints, hint),
            None => self.hint.hide(&mut hints),
        }
    }

    /// Starts a drag when the pointer is over an editable region.
    pub fn pointer_down(&mut self, page: Vec2) -> bool {
        self.set_pointer(Some(page));
        let Some(pointer) = self.base.pointer() else {
            return false;
        };
        let world = self.transform().page_to_world(pointer);
        let Some((node, token)) = self
            .tree
            .the_hovered(self.tree.root(), world, self.handle_radius_world())
        else {
            return false;
        };
        let position = self.tree.world_position(node);
        let start = if let Some(robot) = self.tree.drawable::<Robot>(node) {
            match token {
                HoverToken::Velocity => DragStart::Velocity(robot.velocity),
                _ => DragStart::Pose(robot.pose(position)),
            }
        } else if let Some(obstacle) = self.tree.drawable::<Obstacle>(node) {
            match token {
                HoverToken::Radius => DragStart::Radius(obstacle.radius),
                _ => DragStart::Pose(Pose2d {
                    translation: position,
                    rotation: 0.0,
                }),
            }
        } else {
            return false;
        };
        self.drag = Some(Drag {
            node,
            token,
            grab: world - position,
            start,
        });
        self.hovered = Some((node, token));
        true
    }

    pub fn pointer_move(&mut self, page: Vec2) {
        self.set_pointer(Some(page));
        let (Some(drag), Some(pointer)) = (self.drag, self.base.pointer()) else {
            return;
        };
        let world = self.transform().page_to_world(pointer);
        let position = self.tree.world_position(drag.node);
        let parent_origin = self
            .tree
            .get(drag.node)
            .and_then(|n| n.parent())
            .map(|p| self.tree.world_position(p))
            .unwrap_or(Vec2::ZERO);

        match drag.token {
            HoverToken::Heading => {
                if let Some(robot) = self.tree.drawable_mut::<Robot>(drag.node) {
                    let d = world - position;
                    if d != Vec2::ZERO {
                        robot.set_rotation(normalize_radians(d.y.atan2(d.x)));
                    }
                }
            }
            HoverToken::Velocity => {
                if let Some(robot) = self.tree.drawable_mut::<Robot>(drag.node) {
                    robot.set_velocity(Some((world - position) / VELOCITY_SCALE));
                }
            }
            HoverToken::Radius => {
                if let Some(obstacle) = self.tree.drawable_mut::<Obstacle>(drag.node) {
                    obstacle.set_radius(world.distance(position));
                }
            }
            HoverToken::Main | HoverToken::Body => {
                self.tree
                    .set_position(drag.node, world - drag.grab - parent_origin);
            }
        }
    }

    /// Ends a drag and emits the resulting edit.
    pub fn pointer_up(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let position = self.tree.world_position(drag.node);
        let event = match drag.start {
            DragStart::Pose(before) => {
                let after = match self.tree.drawable::<Robot>(drag.node) {
                    Some(robot) => robot.pose(position),
                    None => Pose2d {
                        translation: position,
                        rotation: before.rotation,
                    },
                };
                Change::new(before, after).map(|change| FieldEvent::PoseEdited {
                    node: drag.node,
                    change,
                })
            }
            DragStart::Velocity(before) => {
                let after = self.tree.drawable::<Robot>(drag.node).and_then(|r| r.velocity);
                Change::new(before, after).map(|change| FieldEvent::VelocityEdited {
                    node: drag.node,
                    change,
                })
            }
            DragStart::Radius(before) => {
                let after = self
                    .tree
                    .drawable::<Obstacle>(drag.node)
                    .map_or(before, |o| o.radius);
                Change::new(before, after).map(|change| FieldEvent::RadiusEdited {
                    node: drag.node,
                    change,
                })
            }
        };
        if let Some(event) = event {
            debug!(?event, "2d edit");
            self.events.emit(event);
        }
    }

    /// Pointer left the view: cancels hover and any drag without emitting.
    pub fn pointer_leave(&mut self) {
        self.set_pointer(None);
        self.drag = None;
        self.update_hover();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pose;
    use crate::hint::HintBoard;
    use crate::store::MemoryPoseSource;
    use crate::transform::Padding;
    use crate::two_d::canvas::{DrawCommand, DrawList};
    use crate::two_d::robot::ShapeKind;
    use bevy_math::Vec3;

    fn view() -> Odometry2d {
        let config = Field2dConfig {
            padding: Padding::uniform(0.0),
            ..Default::default()
        };
        let mut view = Odometry2d::new(
            ViewBase::new(Vec2::new(1000.0, 500.0), 1.0, HintBoard::shared()),
            config,
            Arc::new(StaticTheme::dark()),
        );
        view.set_field(Some(Arc::new(FieldDefinition {
            name: "Plain".into(),
            model_path: None,
            image_path: Some("fields/plain.png".into()),
            size: Vec2::new(10.0, 5.0),
            rotations: Vec::new(),
            position: Vec3::ZERO,
        })));
        view.events().drain();
        view
    }

    #[test]
    fn frame_is_painted_in_band_order() {
        let mut view = view();
        let robot = view
            .add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE), Vec2::new(5.0, 2.5))
            .unwrap();
        let under = view
            .add_robot(Robot::new(ShapeKind::Target, Vec2::ONE), Vec2::new(1.0, 1.0))
            .unwrap();
        view.tree_mut().set_z(under, BEFORE_GRID);

        let mut canvas = DrawList::new();
        view.render(&mut canvas);
        let commands = canvas.commands();
        assert!(matches!(commands[0], DrawCommand::Clear { .. }));
        let image = commands
            .iter()
            .position(|c| matches!(c, DrawCommand::Image { .. }))
            .unwrap();
        let first_fill = commands
            .iter()
            .position(|c| matches!(c, DrawCommand::Fill { .. }))
            .unwrap();
        assert!(image < first_fill, "robot body must be painted over the image");
        assert!(view.tree().get(robot).unwrap().resolved_position().is_some());
        assert!(view.tree().get(under).unwrap().resolved_position().is_some());
    }

    #[test]
    fn hover_shows_and_hides_hint() {
        let mut view = view();
        let t = view.transform();
        let robot = view
            .add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE).with_name("Bot"), Vec2::new(5.0, 2.5))
            .unwrap();
        view.set_pointer(Some(t.world_to_page(Vec2::new(5.0, 2.5))));
        view.render(&mut DrawList::new());
        assert_eq!(view.hovered(), Some((robot, HoverToken::Main)));
        assert_eq!(view.hints().lock().len(), 1);

        view.set_pointer(Some(t.world_to_page(Vec2::new(9.0, 4.5))));
        view.render(&mut DrawList::new());
        assert_eq!(view.hovered(), None);
        assert!(view.hints().lock().is_empty());
    }

    #[test]
    fn dragging_body_moves_robot_and_emits_pose_edit() {
        let mut view = view();
        let t = view.transform();
        let robot = view
            .add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE), Vec2::new(5.0, 2.5))
            .unwrap();
        assert!(view.pointer_down(t.world_to_page(Vec2::new(5.3, 2.7))));
        view.pointer_move(t.world_to_page(Vec2::new(6.3, 3.7)));
        view.pointer_up();

        let pose = view.robot_pose(robot).unwrap();
        assert!(pose.translation.abs_diff_eq(Vec2::new(6.0, 3.5), 1e-3));
        let events = view.events().drain();
        assert!(matches!(
            events.as_slice(),
            [FieldEvent::PoseEdited { node, .. }] if *node == robot
        ));
    }

    #[test]
    fn dragging_heading_rotates() {
        let mut view = view();
        let t = view.transform();
        let robot = view
            .add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE), Vec2::new(5.0, 2.5))
            .unwrap();
        assert!(view.pointer_down(t.world_to_page(Vec2::new(5.5, 2.5))));
        view.pointer_move(t.world_to_page(Vec2::new(5.0, 4.0)));
        view.pointer_up();
        let rotation = view.robot(robot).unwrap().rotation;
        assert!((rotation - std::f32::consts::FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn obstacle_radius_drag() {
        let mut view = view();
        let t = view.transform();
        let id = view
            .add_obstacle(Obstacle::new(1.0), Vec2::new(3.0, 3.0))
            .unwrap();
        assert!(view.pointer_down(t.world_to_page(Vec2::new(4.0, 3.0))));
        view.pointer_move(t.world_to_page(Vec2::new(5.0, 3.0)));
        view.pointer_up();
        let radius = view.tree().drawable::<Obstacle>(id).unwrap().radius;
        assert!((radius - 2.0).abs() < 1e-3);
        assert!(matches!(
            view.events().drain().as_slice(),
            [FieldEvent::RadiusEdited { .. }]
        ));
    }

    #[test]
    fn pointer_down_on_empty_field_does_nothing() {
        let mut view = view();
        let t = view.transform();
        assert!(!view.pointer_down(t.world_to_page(Vec2::new(1.0, 1.0))));
        view.pointer_up();
        assert!(view.events().drain().is_empty());
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut view = view();
        let anchor = Vec2::new(200.0, 100.0);
        let before = view.transform().page_to_world(anchor);
        view.zoom_by(2.0, anchor);
        let after = view.transform().page_to_world(anchor);
        assert!(before.abs_diff_eq(after, 1e-3));
        assert_eq!(view.zoom(), 2.0);
        assert!(matches!(
            view.events().drain().as_slice(),
            [FieldEvent::ViewChanged { .. }]
        ));
        view.reset_view();
        assert_eq!(view.pan(), Vec2::ZERO);
    }

    #[test]
    fn field_swap_emits_once() {
        let mut view = view();
        view.set_field(None);
        view.set_field(None);
        assert_eq!(view.events().drain().len(), 1);
        assert_eq!(view.field_size(), DEFAULT_FIELD_SIZE);
    }

    #[test]
    fn degenerate_grid_size_is_clamped() {
        for grid_size in [0.0, -2.0, f32::NAN] {
            let config = Field2dConfig {
                grid_size,
                ..Default::default()
            };
            let mut view = Odometry2d::new(
                ViewBase::new(Vec2::new(1000.0, 500.0), 1.0, HintBoard::shared()),
                config,
                Arc::new(StaticTheme::dark()),
            );
            assert_eq!(view.config().grid_size, 1.0);
            let mut canvas = DrawList::new();
            view.render(&mut canvas);
            assert!(!canvas.commands().is_empty());
        }
    }

    #[test]
    fn huge_field_grid_is_coarsened() {
        let mut view = view();
        view.set_field(Some(Arc::new(FieldDefinition {
            name: "Huge".into(),
            model_path: None,
            image_path: None,
            size: Vec2::new(1.0e7, 5.0),
            rotations: Vec::new(),
            position: Vec3::ZERO,
        })));
        let mut canvas = DrawList::new();
        view.render(&mut canvas);
        let grid = canvas
            .commands()
            .iter()
            .find_map(|c| match c {
                DrawCommand::Stroke { path, .. } => Some(path.subpaths().len()),
                _ => None,
            })
            .unwrap();
        assert!(grid <= 2 * (MAX_GRID_LINES + 1));
    }

    #[test]
    fn bound_robot_follows_source_and_hides_without_data() {
        let mut view = view();
        let t = view.transform();
        let robot = view
            .add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE), Vec2::new(1.0, 1.0))
            .unwrap();
        assert!(view.bind_pose(robot, "/robot/pose"));
        let mut source = MemoryPoseSource::new();
        source.push("/robot/pose", 2.0, Pose::TwoD(Pose2d::new(6.0, 3.0, 0.5)));

        view.apply_poses(&source, 1.0);
        assert!(!view.tree().get(robot).unwrap().is_visible());
        view.set_pointer(Some(t.world_to_page(Vec2::new(1.0, 1.0))));
        view.render(&mut DrawList::new());
        assert_eq!(view.hovered(), None);

        view.apply_poses(&source, 2.5);
        assert!(view.tree().get(robot).unwrap().is_visible());
        let pose = view.robot_pose(robot).unwrap();
        assert!(pose.translation.abs_diff_eq(Vec2::new(6.0, 3.0), 1e-5));
        assert!((pose.rotation - 0.5).abs() < 1e-6);
    }

    #[test]
    fn bound_trail_shows_recent_window() {
        let mut view = view();
        let trail = view.add_trail(Color::RED).unwrap();
        assert!(view.bind_pose(trail, "/robot/pose"));
        let mut source = MemoryPoseSource::new();
        for i in 0..10 {
            let time = i as f64;
            source.push("/robot/pose", time, Pose::TwoD(Pose2d::new(time as f32 * 0.5, 1.0, 0.0)));
        }

        view.apply_poses(&source, 9.0);
        let points: Vec<Vec2> = view.tree().drawable::<Trail>(trail).unwrap().points().collect();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], Vec2::new(2.0, 1.0));
        assert!(view.tree().get(trail).unwrap().is_visible());

        view.apply_poses(&source, 100.0);
        assert!(view.tree().drawable::<Trail>(trail).unwrap().is_empty());
        assert!(!view.tree().get(trail).unwrap().is_visible());

        assert!(view.remove(trail));
        assert!(!view.unbind_pose(trail));
    }

    #[test]
    fn subscribed_view_does_not_queue_events() {
        let mut view = view();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = seen.clone();
        view.subscribe(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        });
        for _ in 0..10_000 {
            view.pan_by(Vec2::new(1.0, 0.0));
        }
        assert_eq!(seen.load(std::sync::atomic::Ordering::Relaxed), 10_000);
        assert!(view.events().drain().is_empty());
    }
}
