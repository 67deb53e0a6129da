pub mod config;
pub mod core;
pub mod events;
pub mod hint;
pub mod odometry;
pub mod runtime;
pub mod store;
pub mod three_d;
pub mod transform;
pub mod two_d;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OdometryError {
    #[error("invalid viewer configuration")]
    Config,
    #[error("invalid robot/field definitions")]
    Definitions,
    #[error("invalid pose data")]
    Poses,
    #[error("failed to tessellate 2D frame")]
    Tessellation,
}

pub type Result<T> = std::result::Result<T, error_stack::Report<OdometryError>>;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

pub mod prelude {
    pub use crate::config::*;
    pub use crate::core::*;
    pub use crate::events::*;
    pub use crate::hint::*;
    pub use crate::odometry::*;
    pub use crate::runtime::*;
    pub use crate::store::*;
    pub use crate::three_d::cache::{ModelCache, ModelKey, ModelLoader, Variant};
    pub use crate::three_d::{ControlType, Odometry3d, Origin, RenderType};
    pub use crate::two_d::{Odometry2d, obstacle::Obstacle, robot::Robot, robot::ShapeKind};
}
