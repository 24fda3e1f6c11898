//! # Entity Storage and Hierarchies
//!
//! The storage layer under [`Scene`](crate::scene::Scene). Nothing here knows
//! about scenes: an allocator hands out identities, pools attach data to
//! them, hierarchies arrange them into trees, and listener lists tell
//! interested subsystems when something changes.
//!
//! ## Module Overview
//!
//! - [`entity`] — Generational entity IDs and their labels
//! - [`pool`] — Columnar per-entity storage with swap-remove
//! - [`hierarchy`] — Depth-first flattened trees with local/world poses
//! - [`listener`] — Weak, non-owning subscriber lists

pub mod entity;
pub mod hierarchy;
pub mod listener;
pub mod pool;

pub use entity::{Entity, EntityAllocator};
pub use hierarchy::{Children, Hierarchy, HierarchyListener, Node};
pub use listener::ListenerList;
pub use pool::{Column, Pool, Row};
