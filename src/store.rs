//! Contracts for the collaborators the engine reads from: robot/field
//! definitions, themed colors and pose telemetry, plus in-memory versions
//! used by hosts and tests.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_math::{Vec2, Vec3};
use error_stack::{Report, ResultExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::{AxisRotation, Color, Pose, decode_pose};
use crate::{OdometryError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    /// Model asset; `None` for fields that only have a 2D image.
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    /// Field length and width in meters.
    pub size: Vec2,
    #[serde(default)]
    pub rotations: Vec<AxisRotation>,
    #[serde(default)]
    pub position: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub model_path: String,
    #[serde(default)]
    pub zero_rotations: Vec<AxisRotation>,
    #[serde(default)]
    pub zero_position: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotDefinition {
    pub name: String,
    pub model_path: String,
    #[serde(default)]
    pub rotations: Vec<AxisRotation>,
    /// Explicit model offset. When absent the model is auto-centered.
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,
    /// Bumper footprint in meters, used for 2D drawing.
    #[serde(default = "default_robot_size")]
    pub size: Vec2,
}

fn default_robot_size() -> Vec2 {
    Vec2::splat(0.9)
}

impl RobotDefinition {
    pub fn component(&self, index: usize) -> Option<&ComponentDefinition> {
        self.components.get(index)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub robots: Vec<RobotDefinition>,
}

impl Definitions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(Report::new)
            .change_context(OdometryError::Definitions)
    }
}

/// Read-only view of the currently loaded definitions.
///
/// Returning `None` means "not available right now": either the name is
/// unknown or the store is mid-refresh. Callers retry on a later frame.
pub trait DefinitionStore: Send + Sync {
    fn field(&self, name: &str) -> Option<Arc<FieldDefinition>>;
    fn robot(&self, name: &str) -> Option<Arc<RobotDefinition>>;
    fn is_refreshing(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct Snapshot {
    fields: HashMap<String, Arc<FieldDefinition>>,
    robots: HashMap<String, Arc<RobotDefinition>>,
}

impl Snapshot {
    fn from_definitions(defs: Definitions) -> Self {
        Self {
            fields: defs
                .fields
                .into_iter()
                .map(|f| (f.name.clone(), Arc::new(f)))
                .collect(),
            robots: defs
                .robots
                .into_iter()
                .map(|r| (r.name.clone(), Arc::new(r)))
                .collect(),
        }
    }
}

/// Definition store shared between the host (which refreshes it) and the
/// engine (which reads it every frame).
#[derive(Default)]
pub struct MemoryDefinitions {
    snapshot: RwLock<Option<Snapshot>>,
}

impl MemoryDefinitions {
    pub fn new(defs: Definitions) -> Self {
        Self {
            snapshot: RwLock::new(Some(Snapshot::from_definitions(defs))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(Definitions::from_json(json)?))
    }

    /// Marks the store as refreshing; lookups return `None` until
    /// [`finish_refresh`](Self::finish_refresh).
    pub fn begin_refresh(&self) {
        *self.snapshot.write() = None;
    }

    pub fn finish_refresh(&self, defs: Definitions) {
        *self.snapshot.write() = Some(Snapshot::from_definitions(defs));
    }
}

impl DefinitionStore for MemoryDefinitions {
    fn field(&self, name: &str) -> Option<Arc<FieldDefinition>> {
        self.snapshot.read().as_ref()?.fields.get(name).cloned()
    }

    fn robot(&self, name: &str) -> Option<Arc<RobotDefinition>> {
        self.snapshot.read().as_ref()?.robots.get(name).cloned()
    }

    fn is_refreshing(&self) -> bool {
        self.snapshot.read().is_none()
    }
}

/// Resolves symbolic color tokens (`"accent"`, `"grid"`, ...) to colors.
pub trait ThemeResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Color;
}

pub struct StaticTheme {
    tokens: HashMap<String, Color>,
    fallback: Color,
}

impl StaticTheme {
    pub fn new(fallback: Color) -> Self {
        Self {
            tokens: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, token: impl Into<String>, color: Color) -> Self {
        self.tokens.insert(token.into(), color);
        self
    }

    pub fn dark() -> Self {
        Self::new(Color::GRAY)
            .with("accent", Color::rgb(0.25, 0.55, 1.0))
            .with("background", Color::rgb(0.12, 0.12, 0.14))
            .with("grid", Color::rgba(1.0, 1.0, 1.0, 0.15))
            .with("border", Color::rgb(0.6, 0.6, 0.65))
            .with("axis-x", Color::rgb(0.9, 0.25, 0.25))
            .with("axis-y", Color::rgb(0.25, 0.8, 0.3))
            .with("text", Color::WHITE)
            .with("blue-alliance", Color::rgb(0.1, 0.3, 0.95))
            .with("red-alliance", Color::rgb(0.95, 0.15, 0.15))
    }
}

impl Default for StaticTheme {
    fn default() -> Self {
        Self::dark()
    }
}

impl ThemeResolver for StaticTheme {
    /// Known tokens first, then literal hex colors, then the fallback.
    fn resolve(&self, token: &str) -> Color {
        self.tokens
            .get(token)
            .copied()
            .or_else(|| Color::from_hex(token))
            .unwrap_or(self.fallback)
    }
}

/// Telemetry lookups by path. Absent data is `None`/empty, never an error.
pub trait PoseSource {
    fn pose_at(&self, path: &str, time: f64) -> Option<Pose>;
    fn pose_range(&self, path: &str, start: f64, end: f64) -> Vec<Pose>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPoseSource {
    series: HashMap<String, Vec<(f64, Pose)>>,
}

impl MemoryPoseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a sample keeping the series sorted by time.
    pub fn push(&mut self, path: impl Into<String>, time: f64, pose: Pose) {
        let series = self.series.entry(path.into()).or_default();
        let index = series.partition_point(|(t, _)| *t <= time);
        series.insert(index, (time, pose));
    }

    /// Parses `{ "path": [[time, [values...]], ...] }`. Samples with an
    /// unsupported layout are skipped.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<(f64, Vec<f64>)>> = serde_json::from_str(json)
            .map_err(Report::new)
            .change_context(OdometryError::Poses)?;
        let mut source = Self::new();
        for (path, samples) in raw {
            for (time, values) in samples {
                if let Some(pose) = decode_pose(&values) {
                    source.push(path.clone(), time, pose);
                }
            }
        }
        Ok(source)
    }
}

impl PoseSource for MemoryPoseSource {
    /// Latest sample at or before `time`.
    fn pose_at(&self, path: &str, time: f64) -> Option<Pose> {
        let series = self.series.get(path)?;
        let index = series.partition_point(|(t, _)| *t <= time);
        index.checked_sub(1).map(|i| series[i].1)
    }

    fn pose_range(&self, path: &str, start: f64, end: f64) -> Vec<Pose> {
        let Some(series) = self.series.get(path) else {
            return Vec::new();
        };
        series
            .iter()
            .filter(|(t, _)| *t >= start && *t <= end)
            .map(|(_, p)| *p)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pose2d;

    const DEFS: &str = r#"{
        "fields": [{ "name": "Reefscape", "model_path": "fields/reefscape.glb", "size": [17.55, 8.05] }],
        "robots": [{
            "name": "KitBot",
            "model_path": "robots/kitbot/model.glb",
            "rotations": [{ "axis": "z", "degrees": 90.0 }],
            "components": [{ "model_path": "robots/kitbot/model_0.glb" }]
        }]
    }"#;

    #[test]
    fn definitions_parse_and_resolve() {
        let store = MemoryDefinitions::from_json(DEFS).unwrap();
        let field = store.field("Reefscape").unwrap();
        assert_eq!(field.size, Vec2::new(17.55, 8.05));
        let robot = store.robot("KitBot").unwrap();
        assert_eq!(robot.size, Vec2::splat(0.9));
        assert_eq!(robot.components.len(), 1);
        assert!(store.field("Foo").is_none());
    }

    #[test]
    fn refreshing_store_reports_unavailable() {
        let store = MemoryDefinitions::from_json(DEFS).unwrap();
        store.begin_refresh();
        assert!(store.is_refreshing());
        assert!(store.robot("KitBot").is_none());
        store.finish_refresh(Definitions::from_json(DEFS).unwrap());
        assert!(store.robot("KitBot").is_some());
    }

    #[test]
    fn theme_falls_back_for_unknown_tokens() {
        let theme = StaticTheme::dark();
        assert_eq!(theme.resolve("text"), Color::WHITE);
        assert_eq!(theme.resolve("#00ff00"), Color::GREEN);
        assert_eq!(theme.resolve("no-such-token"), Color::GRAY);
    }

    #[test]
    fn pose_source_holds_last_sample() {
        let mut source = MemoryPoseSource::new();
        source.push("/Robot/Pose", 2.0, Pose::TwoD(Pose2d::new(2.0, 0.0, 0.0)));
        source.push("/Robot/Pose", 1.0, Pose::TwoD(Pose2d::new(1.0, 0.0, 0.0)));
        assert!(source.pose_at("/Robot/Pose", 0.5).is_none());
        assert_eq!(
            source.pose_at("/Robot/Pose", 1.5),
            Some(Pose::TwoD(Pose2d::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(source.pose_range("/Robot/Pose", 0.0, 10.0).len(), 2);
        assert!(source.pose_range("/Missing", 0.0, 10.0).is_empty());
    }

    #[test]
    fn pose_json_skips_malformed_samples() {
        let source = MemoryPoseSource::from_json(
            r#"{ "/Robot/Pose": [[0.0, [1.0, 2.0, 0.0]], [1.0, [1.0]], [2.0, [3.0, 4.0, 0.5]]] }"#,
        )
        .unwrap();
        assert_eq!(source.pose_range("/Robot/Pose", 0.0, 5.0).len(), 2);
    }
}
