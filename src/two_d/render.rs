//! Hierarchical, z-ordered render tree for the 2D field view.
//!
//! Nodes live in an arena owned by [`RenderTree`]; parents refer to children
//! by [`NodeId`] and children keep a plain back-reference. Positions and
//! alphas are relative to the parent and get resolved during a render pass.

use std::any::Any;

use bevy_math::Vec2;

use crate::hint::Hint;
use crate::store::ThemeResolver;
use crate::transform::CanvasTransform;

use super::canvas::Canvas;

/// Drawn before the grid.
pub const BEFORE_GRID: i32 = 0;
/// Drawn after the grid, before the field image.
pub const AFTER_GRID: i32 = 1;
/// Drawn after the field image, before the border.
pub const AFTER_IMAGE: i32 = 2;
/// Drawn on top of everything.
pub const AFTER_BORDER: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Which part of a drawable is under the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HoverToken {
    Main,
    Body,
    Heading,
    Velocity,
    Radius,
}

impl HoverToken {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Body => "body",
            Self::Heading => "heading",
            Self::Velocity => "velocity",
            Self::Radius => "radius",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintStyle {
    pub line_width_px: f32,
    pub handle_radius_px: f32,
}

impl Default for PaintStyle {
    fn default() -> Self {
        Self {
            line_width_px: 2.0,
            handle_radius_px: 8.0,
        }
    }
}

/// Everything a render pass paints with.
pub struct RenderEnv<'a> {
    pub canvas: &'a mut dyn Canvas,
    pub transform: &'a CanvasTransform,
    pub theme: &'a dyn ThemeResolver,
    pub style: PaintStyle,
}

pub struct PaintContext<'a> {
    pub canvas: &'a mut dyn Canvas,
    pub transform: &'a CanvasTransform,
    pub theme: &'a dyn ThemeResolver,
    pub style: PaintStyle,
    /// Resolved world position of the node being painted.
    pub position: Vec2,
    pub alpha: f32,
}

impl PaintContext<'_> {
    pub fn to_canvas(&self, world: Vec2) -> Vec2 {
        self.transform.world_to_canvas(world)
    }

    /// World meters to canvas pixels.
    pub fn meters(&self, meters: f32) -> f32 {
        self.transform
            .page_length_to_canvas(meters * self.transform.pixels_per_meter())
    }

    pub fn line_width(&self) -> f32 {
        self.transform.page_length_to_canvas(self.style.line_width_px)
    }

    pub fn handle_radius(&self) -> f32 {
        self.transform.page_length_to_canvas(self.style.handle_radius_px)
    }
}

/// Input of a hit test, in world meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitContext {
    pub point: Vec2,
    /// Resolved world position of the node under test.
    pub position: Vec2,
    /// Handle radius converted from page pixels.
    pub handle_radius: f32,
}

impl HitContext {
    pub fn within(&self, center: Vec2, radius: f32) -> bool {
        self.point.distance_squared(center) < radius * radius
    }

    pub fn on_handle(&self, center: Vec2) -> bool {
        self.within(center, self.handle_radius)
    }
}

pub trait Drawable: Any + Send + Sync {
    fn paint(&self, ctx: &mut PaintContext<'_>);

    fn hovered(&self, _ctx: &HitContext) -> Option<HoverToken> {
        None
    }

    /// Tooltip shown while hovered. `position` is the resolved world position.
    fn hint(&self, _position: Vec2, _anchor: Vec2) -> Option<Hint> {
        None
    }
}

/// Drawable that paints nothing; used for the root and for grouping.
#[derive(Clone, Copy, Debug, Default)]
pub struct Group;

impl Drawable for Group {
    fn paint(&self, _ctx: &mut PaintContext<'_>) {}
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Resolved {
    position: Vec2,
    alpha: f32,
}

pub struct Node {
    parent: Option<NodeId>,
    position: Vec2,
    z: i32,
    z2: i32,
    alpha: f32,
    /// Hidden nodes and their subtrees are neither painted nor hit.
    visible: bool,
    children: Vec<NodeId>,
    drawable: Box<dyn Drawable>,
    resolved: Option<Resolved>,
}

impl Node {
    fn new(parent: Option<NodeId>, drawable: Box<dyn Drawable>) -> Self {
        Self {
            parent,
            position: Vec2::ZERO,
            z: 0,
            z2: 0,
            alpha: 1.0,
            visible: true,
            children: Vec::new(),
            drawable,
            resolved: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn z2(&self) -> i32 {
        self.z2
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn drawable(&self) -> &dyn Drawable {
        self.drawable.as_ref()
    }

    /// Position resolved by the current pass, if it reached this node.
    pub fn resolved_position(&self) -> Option<Vec2> {
        self.resolved.map(|r| r.position)
    }

    pub fn resolved_alpha(&self) -> Option<f32> {
        self.resolved.map(|r| r.alpha)
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub struct RenderTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for RenderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTree {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new(None, Box::new(Group))),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Adds a node under `parent`. `None` when the parent does not exist.
    pub fn insert(&mut self, parent: NodeId, drawable: impl Drawable) -> Option<NodeId> {
        self.insert_boxed(parent, Box::new(drawable))
    }

    pub fn insert_boxed(&mut self, parent: NodeId, drawable: Box<dyn Drawable>) -> Option<NodeId> {
        if !self.contains(parent) {
            return None;
        }
        let node = Node::new(Some(parent), drawable);
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        Some(id)
    }

    /// Removes a node and its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        if let Some(parent) = self.get(id).and_then(|n| n.parent) {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(slot) = self.slots.get_mut(next.index as usize) else {
                continue;
            };
            if slot.generation != next.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                self.free.push(next.index);
            }
        }
        true
    }

    /// Moves `id` under `parent`. Refuses to create cycles.
    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) -> bool {
        if id == self.root || !self.contains(id) || !self.contains(parent) {
            return false;
        }
        let mut cursor = Some(parent);
        while let Some(c) = cursor {
            if c == id {
                return false;
            }
            cursor = self.get(c).and_then(|n| n.parent);
        }
        if let Some(old) = self.get(id).and_then(|n| n.parent) {
            if let Some(p) = self.get_mut(old) {
                p.children.retain(|c| *c != id);
            }
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = Some(parent);
        }
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        true
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec2) {
        if let Some(node) = self.get_mut(id) {
            if position.is_finite() {
                node.position = position;
            }
        }
    }

    pub fn set_z(&mut self, id: NodeId, z: i32) {
        if let Some(node) = self.get_mut(id) {
            node.z = z;
        }
    }

    pub fn set_z2(&mut self, id: NodeId, z2: i32) {
        if let Some(node) = self.get_mut(id) {
            node.z2 = z2;
        }
    }

    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) {
        if let Some(node) = self.get_mut(id) {
            node.alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
        }
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.get_mut(id) {
            node.visible = visible;
        }
    }

    pub fn drawable<T: Drawable>(&self, id: NodeId) -> Option<&T> {
        let node = self.get(id)?;
        (node.drawable.as_ref() as &dyn Any).downcast_ref::<T>()
    }

    pub fn drawable_mut<T: Drawable>(&mut self, id: NodeId) -> Option<&mut T> {
        let node = self.get_mut(id)?;
        (node.drawable.as_mut() as &mut dyn Any).downcast_mut::<T>()
    }

    /// Children whose declared parent is `id`.
    pub fn renders(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .copied()
            .filter(|c| self.get(*c).is_some_and(|child| child.parent == Some(id)))
            .collect()
    }

    fn draw_order(&self, id: NodeId, wanted_z: Option<i32>) -> Vec<NodeId> {
        let mut children = self.renders(id);
        if let Some(z) = wanted_z {
            children.retain(|c| self.get(*c).is_some_and(|n| n.z == z));
        }
        children.sort_by_key(|c| self.get(*c).map(|n| (n.z, n.z2)).unwrap_or_default());
        children
    }

    /// World position composed from the ancestor chain, independent of any
    /// render pass.
    pub fn world_position(&self, id: NodeId) -> Vec2 {
        self.composed(id).position
    }

    fn composed(&self, id: NodeId) -> Resolved {
        let mut out = Resolved {
            position: Vec2::ZERO,
            alpha: 1.0,
        };
        let mut cursor = Some(id);
        while let Some(c) = cursor {
            let Some(node) = self.get(c) else { break };
            out.position += node.position;
            out.alpha *= node.alpha;
            cursor = node.parent;
        }
        out
    }

    /// Clears resolved values left over from the previous pass.
    pub fn begin_pass(&mut self) {
        for slot in &mut self.slots {
            if let Some(node) = slot.node.as_mut() {
                node.resolved = None;
            }
        }
    }

    /// Paints `id` and its subtree. `wanted_z` filters the direct children
    /// of `id` by z; deeper levels always render completely.
    pub fn render(&mut self, id: NodeId, wanted_z: Option<i32>, env: &mut RenderEnv<'_>) {
        let Some(node) = self.get(id) else { return };
        if !node.visible {
            return;
        }
        let base = match node.parent {
            Some(parent) => self
                .get(parent)
                .and_then(|p| p.resolved)
                .unwrap_or_else(|| self.composed(parent)),
            None => Resolved {
                position: Vec2::ZERO,
                alpha: 1.0,
            },
        };
        let resolved = Resolved {
            position: base.position + node.position,
            alpha: base.alpha * node.alpha,
        };
        if let Some(node) = self.get_mut(id) {
            node.resolved = Some(resolved);
        }

        if let Some(node) = self.get(id) {
            env.canvas.save();
            env.canvas.set_alpha(resolved.alpha);
            let mut ctx = PaintContext {
                canvas: &mut *env.canvas,
                transform: env.transform,
                theme: env.theme,
                style: env.style,
                position: resolved.position,
                alpha: resolved.alpha,
            };
            node.drawable.paint(&mut ctx);
            env.canvas.restore();
        }

        for child in self.draw_order(id, wanted_z) {
            self.render(child, None, env);
        }
    }

    /// First node under `point`, searching children before their parent and
    /// the topmost sibling first.
    pub fn the_hovered(&self, id: NodeId, point: Vec2, handle_radius: f32) -> Option<(NodeId, HoverToken)> {
        let node = self.get(id).filter(|n| n.visible)?;
        for child in self.draw_order(id, None).into_iter().rev() {
            if let Some(hit) = self.the_hovered(child, point, handle_radius) {
                return Some(hit);
            }
        }
        let ctx = HitContext {
            point,
            position: node
                .resolved_position()
                .unwrap_or_else(|| self.world_position(id)),
            handle_radius,
        };
        node.drawable.hovered(&ctx).map(|token| (id, token))
    }
}
