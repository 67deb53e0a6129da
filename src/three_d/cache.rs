//! Keyed cache of loaded field and robot models.
//!
//! Loads are futures polled once per frame with a no-op waker. There is at
//! most one task per [`ModelKey`]; requests for any variant of a key attach
//! to it. A throttle window limits how often a key is retried after an
//! attempt. Entries are masters: callers clone them and never mutate the
//! shared copy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bevy_math::{Mat4, Quat, Vec3};
use error_stack::Report;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{Color, Pose3d};
use crate::store::DefinitionStore;
use crate::transform::{Bounds3, orientation_from_rotations};

use super::model::{SceneObject, Shading};

pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1000);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Field(String),
    Robot(String),
    RobotComponent(String, usize),
}

impl ModelKey {
    pub fn robot_name(&self) -> Option<&str> {
        match self {
            Self::Field(_) => None,
            Self::Robot(name) | Self::RobotComponent(name, _) => Some(name),
        }
    }

    pub fn is_robot(&self) -> bool {
        self.robot_name().is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Basic,
    Cinematic,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Basic, Variant::Cinematic];

    pub fn from_cinematic(cinematic: bool) -> Self {
        if cinematic { Self::Cinematic } else { Self::Basic }
    }

    pub fn shading(self) -> Shading {
        match self {
            Self::Basic => Shading::Basic,
            Self::Cinematic => Shading::Cinematic,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch model `{0}`")]
    Fetch(String),
    #[error("failed to parse model `{0}`")]
    Parse(String),
    #[error("model `{0}` has no meshes")]
    Empty(String),
}

pub type LoadFuture = BoxFuture<'static, Result<SceneObject, Report<LoadError>>>;

/// Produces a scene from an asset path.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &str) -> LoadFuture;
}

impl<F> ModelLoader for F
where
    F: Fn(&str) -> LoadFuture + Send + Sync,
{
    fn load(&self, path: &str) -> LoadFuture {
        self(path)
    }
}

/// A cached master model.
#[derive(Debug)]
pub struct CachedModel {
    pub key: ModelKey,
    pub variant: Variant,
    /// Root group; its transform is the zero transform.
    pub object: SceneObject,
    pub zero: Pose3d,
    pub bounds: Option<Bounds3>,
    pub bumper_meshes: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    /// Load tasks started since creation.
    pub attempts: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Zero {
    Explicit(Pose3d),
    /// Center XY on the rotated bounds and rest the bottom on z = 0.
    AutoCenter(Quat),
}

struct Job {
    path: String,
    zero: Zero,
}

struct InFlight {
    /// Locked only to make the cache `Sync`; polling goes through `get_mut`.
    future: Mutex<LoadFuture>,
    job: Job,
}

pub struct ModelCache {
    store: Arc<dyn DefinitionStore>,
    loader: Arc<dyn ModelLoader>,
    throttle: Duration,
    entries: HashMap<(ModelKey, Variant), Arc<CachedModel>>,
    in_flight: HashMap<ModelKey, InFlight>,
    last_attempt: HashMap<ModelKey, Duration>,
    attempts: u64,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("throttle", &self.throttle)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ModelCache {
    pub fn new(store: Arc<dyn DefinitionStore>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            store,
            loader,
            throttle: DEFAULT_THROTTLE,
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            last_attempt: HashMap::new(),
            attempts: 0,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn store(&self) -> &Arc<dyn DefinitionStore> {
        &self.store
    }

    /// Returns the entry for `(key, variant)`, starting or polling its load
    /// when missing. `None` means "not ready yet".
    ///
    /// `now` is the host clock used for throttling.
    pub fn load(&mut self, key: &ModelKey, variant: Variant, now: Duration) -> Option<Arc<CachedModel>> {
        if let Some(hit) = self.get(key, variant) {
            return Some(hit);
        }
        if self.in_flight.contains_key(key) {
            self.poll_key(key);
            return self.get(key, variant);
        }
        if let Some(last) = self.last_attempt.get(key) {
            if now.saturating_sub(*last) < self.throttle {
                return None;
            }
        }
        let job = self.resolve(key)?;
        debug!(?key, path = %job.path, "starting model load");
        let future = self.loader.load(&job.path);
        self.last_attempt.insert(key.clone(), now);
        self.attempts += 1;
        self.in_flight.insert(key.clone(), InFlight { future: Mutex::new(future), job });
        self.poll_key(key);
        self.get(key, variant)
    }

    /// Peeks without loading.
    pub fn get(&self, key: &ModelKey, variant: Variant) -> Option<Arc<CachedModel>> {
        self.entries.get(&(key.clone(), variant)).cloned()
    }

    pub fn is_loading(&self, key: &ModelKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Polls every in-flight load. Returns whether any entry was created.
    pub fn poll_pending(&mut self) -> bool {
        let keys: Vec<ModelKey> = self.in_flight.keys().cloned().collect();
        let mut created = false;
        for key in keys {
            created |= self.poll_key(&key);
        }
        created
    }

    /// Disposes and removes every variant of `key` and drops its in-flight
    /// load. Returns whether an entry was removed.
    pub fn decache(&mut self, key: &ModelKey) -> bool {
        let mut removed = false;
        for variant in Variant::ALL {
            if let Some(entry) = self.entries.remove(&(key.clone(), variant)) {
                entry.object.dispose();
                removed = true;
            }
        }
        if self.in_flight.remove(key).is_some() {
            debug!(?key, "dropped in-flight model load");
        }
        self.last_attempt.remove(key);
        if removed {
            info!(?key, "decached model");
        }
        removed
    }

    /// Decaches a robot and all of its components.
    pub fn decache_robot(&mut self, name: &str) -> bool {
        let keys: Vec<ModelKey> = self
            .known_keys()
            .into_iter()
            .filter(|k| k.robot_name() == Some(name))
            .collect();
        keys.iter().fold(false, |any, key| self.decache(key) | any)
    }

    /// Decaches everything. Returns the number of keys that had entries.
    pub fn decache_all(&mut self) -> usize {
        let keys = self.known_keys();
        keys.iter().filter(|key| self.decache(key)).count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            in_flight: self.in_flight.len(),
            attempts: self.attempts,
        }
    }

    fn known_keys(&self) -> Vec<ModelKey> {
        let keys: HashSet<ModelKey> = self
            .entries
            .keys()
            .map(|(k, _)| k.clone())
            .chain(self.in_flight.keys().cloned())
            .chain(self.last_attempt.keys().cloned())
            .collect();
        keys.into_iter().collect()
    }

    /// Looks the key up in the definition store. `None` when the definition
    /// is unknown, has no model, or the store is refreshing.
    fn resolve(&self, key: &ModelKey) -> Option<Job> {
        if self.store.is_refreshing() {
            return None;
        }
        match key {
            ModelKey::Field(name) => {
                let field = self.store.field(name)?;
                Some(Job {
                    path: field.model_path.clone()?,
                    zero: Zero::Explicit(Pose3d::new(
                        field.position,
                        orientation_from_rotations(&field.rotations),
                    )),
                })
            }
            ModelKey::Robot(name) => {
                let robot = self.store.robot(name)?;
                let rotation = orientation_from_rotations(&robot.rotations);
                Some(Job {
                    path: robot.model_path.clone(),
                    zero: match robot.position {
                        Some(position) => Zero::Explicit(Pose3d::new(position, rotation)),
                        None => Zero::AutoCenter(rotation),
                    },
                })
            }
            ModelKey::RobotComponent(name, index) => {
                let robot = self.store.robot(name)?;
                let component = robot.component(*index)?;
                Some(Job {
                    path: component.model_path.clone(),
                    zero: Zero::Explicit(Pose3d::new(
                        component.zero_position,
                        orientation_from_rotations(&component.zero_rotations),
                    )),
                })
            }
        }
    }

    /// Polls one task. Returns whether it completed successfully.
    fn poll_key(&mut self, key: &ModelKey) -> bool {
        let Some(task) = self.in_flight.get_mut(key) else {
            return false;
        };
        let mut cx = Context::from_waker(noop_waker_ref());
        let result = match task.future.get_mut().poll_unpin(&mut cx) {
            Poll::Pending => return false,
            Poll::Ready(result) => result,
        };
        let Some(task) = self.in_flight.remove(key) else {
            return false;
        };
        match result {
            Ok(object) => {
                self.store_variants(key, object, task.job.zero);
                true
            }
            Err(report) => {
                warn!(?key, path = %task.job.path, error = ?report, "model load failed");
                false
            }
        }
    }

    fn store_variants(&mut self, key: &ModelKey, object: SceneObject, zero: Zero) {
        let zero = match zero {
            Zero::Explicit(pose) => pose,
            Zero::AutoCenter(rotation) => auto_center(&object, rotation),
        };
        let mut root = SceneObject::group(format!("{key:?}"))
            .with_translation(zero.translation)
            .with_rotation(zero.rotation)
            .with_child(object);
        let mut bumper_meshes = 0;
        if key.is_robot() {
            root.for_each_material_mut(&mut |m| {
                m.bumper = is_bumper_color(m.color);
                bumper_meshes += usize::from(m.bumper);
            });
        }
        let bounds = root.bounds(Mat4::IDENTITY);
        for variant in Variant::ALL {
            let master = root.with_shading(variant.shading());
            self.entries.insert(
                (key.clone(), variant),
                Arc::new(CachedModel {
                    key: key.clone(),
                    variant,
                    object: master,
                    zero,
                    bounds,
                    bumper_meshes,
                }),
            );
        }
        info!(?key, meshes = root.mesh_count(), bumper_meshes, "model cached");
    }
}

/// Zero transform that centers the rotated model on XY and puts its lowest
/// point on the ground.
fn auto_center(object: &SceneObject, rotation: Quat) -> Pose3d {
    match object.bounds(Mat4::from_quat(rotation)) {
        Some(b) => {
            let c = b.center();
            Pose3d::new(Vec3::new(-c.x, -c.y, -b.min.z), rotation)
        }
        None => Pose3d::new(Vec3::ZERO, rotation),
    }
}

/// Saturated reds and blues, the usual bumper colors.
pub fn is_bumper_color(color: Color) -> bool {
    let (hue, saturation, lightness) = color.to_hsl();
    if saturation < 0.5 || !(0.15..=0.85).contains(&lightness) {
        return false;
    }
    !(20.0..=340.0).contains(&hue) || (200.0..=250.0).contains(&hue)
}
