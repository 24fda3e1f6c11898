//! # Stofn — Scene Object Core
//!
//! Entity identities, columnar component pools, flattened scene hierarchies
//! and a fixed-timestep pose driver, for engines that want the object model
//! without the rest of the engine.
//!
//! Start with `use stofn::prelude::*` and build a [`Scene`](scene::Scene).

pub mod config;
pub mod ecs;
pub mod math;
pub mod physics;
pub mod prelude;
pub mod scene;
