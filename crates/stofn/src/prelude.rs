//! Convenience re-exports — `use stofn::prelude::*` for the common items.

pub use crate::config::{Config, ConfigError, PhysicsConfig, SceneConfig};
pub use crate::ecs::{Entity, EntityAllocator, Hierarchy, HierarchyListener, Pool};
pub use crate::math::{HPose, Mat4, PoseMask, Quat, RPose, Vec3};
pub use crate::physics::{PhysicsRuntime, Simulation};
pub use crate::scene::{Scene, SceneListener};
