//! Hover tooltips ("hints").
//!
//! Entities never own hints. Each update they either show their hint through
//! a [`HintSlot`] or hide it; once hidden the slot forgets the id.

use std::collections::BTreeMap;
use std::sync::Arc;

use bevy_math::Vec2;
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HintId(u64);

#[derive(Clone, Debug, PartialEq)]
pub struct Hint {
    pub title: String,
    pub fields: Vec<(String, String)>,
    /// Anchor in page pixels.
    pub anchor: Vec2,
}

impl Hint {
    pub fn new(title: impl Into<String>, anchor: Vec2) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
            anchor,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

pub trait HintSurface {
    fn add(&mut self, hint: Hint) -> HintId;
    /// Replaces a live hint. Returns `false` if the id is unknown.
    fn update(&mut self, id: HintId, hint: Hint) -> bool;
    fn remove(&mut self, id: HintId) -> bool;
}

#[derive(Debug, Default)]
pub struct HintBoard {
    next_id: u64,
    hints: BTreeMap<HintId, Hint>,
}

impl HintBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedHints {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn visible(&self) -> impl Iterator<Item = (HintId, &Hint)> {
        self.hints.iter().map(|(id, h)| (*id, h))
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

impl HintSurface for HintBoard {
    fn add(&mut self, hint: Hint) -> HintId {
        self.next_id += 1;
        let id = HintId(self.next_id);
        self.hints.insert(id, hint);
        id
    }

    fn update(&mut self, id: HintId, hint: Hint) -> bool {
        match self.hints.get_mut(&id) {
            Some(slot) => {
                *slot = hint;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: HintId) -> bool {
        self.hints.remove(&id).is_some()
    }
}

pub type SharedHints = Arc<Mutex<HintBoard>>;

impl HintSurface for SharedHints {
    fn add(&mut self, hint: Hint) -> HintId {
        self.lock().add(hint)
    }

    fn update(&mut self, id: HintId, hint: Hint) -> bool {
        self.lock().update(id, hint)
    }

    fn remove(&mut self, id: HintId) -> bool {
        self.lock().remove(id)
    }
}

/// Per-entity handle to at most one live hint.
#[derive(Debug, Default)]
pub struct HintSlot {
    id: Option<HintId>,
}

impl HintSlot {
    pub fn show(&mut self, surface: &mut dyn HintSurface, hint: Hint) {
        match self.id {
            Some(id) if surface.update(id, hint.clone()) => {}
            _ => self.id = Some(surface.add(hint)),
        }
    }

    pub fn hide(&mut self, surface: &mut dyn HintSurface) {
        if let Some(id) = self.id.take() {
            surface.remove(id);
        }
    }

    pub fn is_shown(&self) -> bool {
        self.id.is_some()
    }
}
