//! # Scene — The Object Space
//!
//! A [`Scene`] owns the identity allocator and one [`Hierarchy`] per
//! sublevel. Sublevels are themselves entities: the sublevel's identity is
//! the hierarchy's owner and stands in for "top level" when attaching or
//! reparenting objects.
//!
//! ```text
//! Scene
//! ├── objects:   EntityAllocator       every identity + its name
//! ├── sublevels: Pool<(Hierarchy,)>    one tree per sublevel identity
//! ├── owners:    Pool<(Entity,)>       object → sublevel, kept by hierarchy callbacks
//! └── listeners: [Weak<dyn SceneListener>]
//! ```
//!
//! Subsystems never own identities. They key their own pools by the
//! identities the scene hands out, and register a [`SceneListener`] so they
//! can drop those rows when an object is released.
//!
//! ## Cascading Release
//!
//! Releasing an object releases its whole subtree, in three phases:
//!
//! 1. **Collect** the object and all of its descendants, in pre-order.
//! 2. **Notify** every listener for every collected identity. Nothing has
//!    been removed yet, so listeners can still query poses, names and
//!    parents.
//! 3. **Remove** the collected nodes from the hierarchy (leaves first) and
//!    reclaim their identities.
//!
//! Listeners receive `&Scene`, so they can't start another release (or any
//! other mutation) from inside the callback.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::config::SceneConfig;
use crate::ecs::{Entity, EntityAllocator, Hierarchy, HierarchyListener, ListenerList, Pool};
use crate::math::{HPose, PoseMask, RPose};

/// Callback surface for subsystems that keep per-object state.
pub trait SceneListener {
    /// `entity` is about to become invalid. It is still fully queryable
    /// through `scene`.
    fn scene_will_release_object(&mut self, scene: &Scene, entity: Entity);
}

/// Reverse index from hierarchy member to sublevel, maintained only through
/// hierarchy callbacks.
struct SceneObjects {
    owners: Pool<(Entity,)>,
}

impl HierarchyListener for SceneObjects {
    fn hierarchy_did_add(&mut self, hierarchy: &Hierarchy, entity: Entity) {
        self.owners.try_append(entity, (hierarchy.owner(),));
    }

    fn hierarchy_will_remove(&mut self, _hierarchy: &Hierarchy, entity: Entity) {
        self.owners.try_release_swap(entity);
    }
}

/// The object space: identities, names, sublevel hierarchies and listeners.
pub struct Scene {
    config: SceneConfig,
    objects: EntityAllocator,
    sublevels: Pool<(Hierarchy,)>,
    scene_objects: Rc<RefCell<SceneObjects>>,
    listeners: ListenerList<dyn SceneListener>,
}

impl Scene {
    /// An empty scene with default settings.
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// A scene with the given settings. Creates `config.default_sublevel` if set.
    pub fn with_config(config: SceneConfig) -> Self {
        let mut scene = Self {
            objects: EntityAllocator::with_capacity(config.reserve_objects),
            sublevels: Pool::new(),
            scene_objects: Rc::new(RefCell::new(SceneObjects {
                owners: Pool::with_capacity(config.reserve_objects),
            })),
            listeners: ListenerList::new(),
            config,
        };
        if let Some(name) = scene.config.default_sublevel.clone() {
            scene.create_sublevel(&name);
        }
        scene
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn add_listener(&mut self, listener: Weak<RefCell<dyn SceneListener>>) -> bool {
        self.listeners.register(listener)
    }

    pub fn remove_listener(&mut self, listener: &Weak<RefCell<dyn SceneListener>>) -> bool {
        self.listeners.unregister_swap(listener)
    }

    // ── Creation ────────────────────────────────────────────────────────

    /// Create a detached object. It has a name but no pose until attached.
    pub fn create_object(&mut self, name: &str) -> Entity {
        let entity = self.objects.create(name);
        log::debug!("created object {entity} {name:?}");
        entity
    }

    /// Create a sublevel: an identity that owns a new, empty hierarchy.
    pub fn create_sublevel(&mut self, name: &str) -> Entity {
        let entity = self.objects.create(name);
        let mut hierarchy = Hierarchy::new(entity);
        let listener: Rc<RefCell<dyn HierarchyListener>> = self.scene_objects.clone();
        hierarchy.add_listener(Rc::downgrade(&listener));
        self.sublevels.try_append(entity, (hierarchy,));
        log::debug!("created sublevel {entity} {name:?}");
        entity
    }

    /// Attach a detached object under `parent`, which is either a sublevel
    /// (attach at its top level) or an object already in a sublevel.
    pub fn try_attach(&mut self, entity: Entity, parent: Entity, local: HPose) -> bool {
        if !self.objects.is_valid(entity)
            || self.is_sublevel(entity)
            || self.is_scene_object(entity)
        {
            return false;
        }
        let Some((level, parent)) = self.resolve_parent(parent) else {
            return false;
        };
        self.hierarchy_mut(level)
            .is_some_and(|h| h.try_add(entity, parent, local))
    }

    /// Create an object and attach it under `parent` in one go.
    ///
    /// Returns `None` (creating nothing) if `parent` is neither a sublevel
    /// nor an attached object.
    pub fn create_child(&mut self, name: &str, parent: Entity, local: HPose) -> Option<Entity> {
        self.resolve_parent(parent)?;
        let entity = self.create_object(name);
        if self.try_attach(entity, parent, local) {
            Some(entity)
        } else {
            self.objects.release(entity);
            None
        }
    }

    // ── Names and validity ──────────────────────────────────────────────

    /// First object named `name`, in storage order. Linear in object count.
    pub fn find_object(&self, name: &str) -> Option<Entity> {
        self.objects.find(name)
    }

    pub fn get_name(&self, entity: Entity) -> Option<&str> {
        self.objects.name(entity)
    }

    /// Rename `entity`. Returns `false` (and does nothing) for stale handles.
    pub fn try_rename(&mut self, entity: Entity, name: &str) -> bool {
        self.objects.try_rename(entity, name)
    }

    pub fn is_valid(&self, entity: Entity) -> bool {
        self.objects.is_valid(entity)
    }

    /// Live objects, sublevels included, in storage order.
    pub fn objects(&self) -> impl Iterator<Item = Entity> + '_ {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.alive_count()
    }

    // ── Sublevels ───────────────────────────────────────────────────────

    pub fn is_sublevel(&self, entity: Entity) -> bool {
        self.sublevels.contains(entity)
    }

    pub fn sublevel_count(&self) -> usize {
        self.sublevels.count()
    }

    pub fn sublevel_by_index(&self, index: usize) -> Entity {
        self.sublevels.handle_by_index(index)
    }

    pub fn hierarchy_by_index(&self, index: usize) -> &Hierarchy {
        self.sublevels.get_by_index::<0>(index)
    }

    /// The hierarchy owned by sublevel `level`.
    pub fn hierarchy(&self, level: Entity) -> Option<&Hierarchy> {
        self.sublevels.try_get::<0>(level)
    }

    /// The hierarchy `entity` is a member of.
    pub fn hierarchy_for(&self, entity: Entity) -> Option<&Hierarchy> {
        self.hierarchy(self.sublevel_of(entity)?)
    }

    /// The sublevel whose hierarchy contains `entity`.
    pub fn sublevel_of(&self, entity: Entity) -> Option<Entity> {
        let objects = self.scene_objects.borrow();
        objects.owners.try_get::<0>(entity).copied()
    }

    /// Whether `entity` is attached to some sublevel's hierarchy.
    pub fn is_scene_object(&self, entity: Entity) -> bool {
        self.scene_objects.borrow().owners.contains(entity)
    }

    pub fn scene_object_count(&self) -> usize {
        self.scene_objects.borrow().owners.count()
    }

    pub fn scene_object_by_index(&self, index: usize) -> Entity {
        self.scene_objects.borrow().owners.handle_by_index(index)
    }

    // ── Poses ───────────────────────────────────────────────────────────

    pub fn local_pose(&self, entity: Entity) -> Option<HPose> {
        self.hierarchy_for(entity)?.local_pose(entity)
    }

    pub fn world_pose(&self, entity: Entity) -> Option<HPose> {
        self.hierarchy_for(entity)?.world_pose(entity)
    }

    pub fn set_local_pose(&mut self, entity: Entity, pose: HPose) -> bool {
        self.hierarchy_for_mut(entity)
            .is_some_and(|h| h.set_local_pose(entity, pose))
    }

    pub fn set_world_pose(&mut self, entity: Entity, pose: HPose) -> bool {
        self.hierarchy_for_mut(entity)
            .is_some_and(|h| h.set_world_pose(entity, pose))
    }

    /// Set rotation and position in world space, keeping world scale.
    pub fn set_world_rigid_pose(&mut self, entity: Entity, pose: RPose) -> bool {
        self.hierarchy_for_mut(entity)
            .is_some_and(|h| h.set_world_rigid_pose(entity, pose))
    }

    /// Move `entity` under `new_parent`, keeping its world pose.
    ///
    /// `new_parent` may be the owning sublevel (move to the top level) or
    /// another object in the same sublevel. Moving between sublevels is not
    /// supported.
    pub fn try_reparent(&mut self, entity: Entity, new_parent: Entity, mask: PoseMask) -> bool {
        let Some(level) = self.sublevel_of(entity) else {
            return false;
        };
        let target = if new_parent == level {
            None
        } else {
            match self.resolve_parent(new_parent) {
                Some((other, parent)) if other == level => parent,
                Some(_) => {
                    log::warn!("cannot reparent {entity} into another sublevel via {new_parent}");
                    return false;
                }
                None => return false,
            }
        };
        self.hierarchy_mut(level)
            .is_some_and(|h| h.try_reparent(entity, target, mask))
    }

    // ── Release ─────────────────────────────────────────────────────────

    /// Release `entity` and everything below it.
    ///
    /// Returns `false` for stale handles, and for sublevels unless
    /// [`SceneConfig::allow_sublevel_release`] is set.
    pub fn try_release_object(&mut self, entity: Entity) -> bool {
        if !self.objects.is_valid(entity) {
            return false;
        }
        if self.is_sublevel(entity) {
            if !self.config.allow_sublevel_release {
                log::warn!("releasing sublevel {entity} is disabled");
                return false;
            }
            return self.release_sublevel(entity);
        }

        let level = self.sublevel_of(entity);
        let mut doomed = Vec::new();
        match level.and_then(|level| self.hierarchy(level)) {
            Some(hierarchy) => {
                hierarchy.collect_subtree(entity, &mut doomed);
            }
            None => doomed.push(entity),
        }

        self.notify_will_release(&doomed);

        if let Some(hierarchy) = level.and_then(|level| self.hierarchy_mut(level)) {
            // Leaves first, so no node is ever promoted.
            for &e in doomed.iter().rev() {
                hierarchy.try_release(e);
            }
        }
        for &e in &doomed {
            log::trace!("released {e}");
            self.objects.release(e);
        }

        log::debug!("released {entity} and {} descendant(s)", doomed.len() - 1);
        true
    }

    fn release_sublevel(&mut self, level: Entity) -> bool {
        let mut doomed: Vec<Entity> = match self.hierarchy(level) {
            Some(hierarchy) => hierarchy.iter().map(|n| n.entity()).collect(),
            None => return false,
        };
        doomed.push(level);

        self.notify_will_release(&doomed);

        if let Some(hierarchy) = self.hierarchy_mut(level) {
            for &e in doomed.iter().rev().skip(1) {
                hierarchy.try_release(e);
            }
        }
        self.sublevels.try_release_swap(level);
        for &e in &doomed {
            self.objects.release(e);
        }

        log::debug!("released sublevel {level} with {} object(s)", doomed.len() - 1);
        true
    }

    fn notify_will_release(&self, doomed: &[Entity]) {
        for &entity in doomed {
            self.listeners
                .notify(|l| l.scene_will_release_object(self, entity));
        }
    }

    /// Assert every structural invariant across allocator, hierarchies and
    /// the sublevel index.
    ///
    /// # Panics
    ///
    /// Panics on any inconsistency.
    pub fn sanity_check(&self) {
        self.objects.sanity_check();
        self.sublevels.sanity_check();
        self.scene_objects.borrow().owners.sanity_check();

        let mut members = 0;
        for (level, hierarchy) in self.sublevels.iter_column::<0>() {
            assert!(self.objects.is_valid(level), "sublevel {level:?} is stale");
            assert_eq!(hierarchy.owner(), level, "hierarchy owner mismatch");
            hierarchy.sanity_check();
            for node in hierarchy.iter() {
                let entity = node.entity();
                assert!(self.objects.is_valid(entity), "{entity:?} in {level:?} is stale");
                assert_eq!(
                    self.sublevel_of(entity),
                    Some(level),
                    "{entity:?} owner index is stale"
                );
            }
            members += hierarchy.count();
        }
        assert_eq!(members, self.scene_object_count(), "owner index has extra rows");
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Map an attach/reparent target to `(sublevel, parent within it)`.
    fn resolve_parent(&self, parent: Entity) -> Option<(Entity, Option<Entity>)> {
        if self.is_sublevel(parent) {
            Some((parent, None))
        } else {
            self.sublevel_of(parent).map(|level| (level, Some(parent)))
        }
    }

    fn hierarchy_mut(&mut self, level: Entity) -> Option<&mut Hierarchy> {
        self.sublevels.try_get_mut::<0>(level)
    }

    fn hierarchy_for_mut(&mut self, entity: Entity) -> Option<&mut Hierarchy> {
        let level = self.sublevel_of(entity)?;
        self.hierarchy_mut(level)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
