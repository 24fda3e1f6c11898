//! # Hierarchy — Flattened Parent/Child Trees
//!
//! A [`Hierarchy`] holds a forest of entities as a single `Vec` in depth-first
//! pre-order. Each node stores its depth instead of a parent pointer, so a
//! node's whole subtree is the contiguous run right after it:
//!
//! ```text
//! index:  0    1    2    3    4
//! node:   A    B    D    C    E
//! depth:  0    1    2    1    0
//!
//!   A            subtree(A) = [0, 4)
//!   ├── B        subtree(B) = [1, 3)
//!   │   └── D
//!   └── C
//!   E
//! ```
//!
//! Finding the end of a subtree is a forward scan while depth stays greater.
//! Finding a parent is a backward scan for the first smaller depth. Moving a
//! subtree is one `drain` plus one `splice`.
//!
//! ## Poses
//!
//! Every node has a local pose (relative to its parent), a cached world pose
//! and a [`PoseMask`] naming the parent channels it does not inherit. World
//! poses are refreshed eagerly for the touched subtree on every write, so
//! [`Hierarchy::world_pose`] is always current.
//!
//! ## Comparison
//!
//! | Approach | Subtree walk | Reparent | Cycle check |
//! |----------|--------------|----------|-------------|
//! | Parent/children components | pointer chase | edit two lists | walk ancestors |
//! | Flattened pre-order (this) | linear slice | drain + splice | index range test |

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

use super::entity::Entity;
use super::listener::ListenerList;
use crate::math::{HPose, PoseMask, RPose, Vec3};

/// Callbacks fired synchronously by a [`Hierarchy`].
///
/// The hierarchy is passed in read-only: listeners can inspect it but never
/// mutate it from inside a callback.
pub trait HierarchyListener {
    /// `entity` was just added and is fully queryable.
    fn hierarchy_did_add(&mut self, _hierarchy: &Hierarchy, _entity: Entity) {}

    /// `entity` is about to be removed and is still fully queryable.
    fn hierarchy_will_remove(&mut self, _hierarchy: &Hierarchy, _entity: Entity) {}
}

/// One entry in the flattened tree.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    entity: Entity,
    depth: u32,
    local: HPose,
    world: HPose,
    mask: PoseMask,
}

impl Node {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Distance from the top level. Top-level nodes have depth 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn local(&self) -> &HPose {
        &self.local
    }

    pub fn world(&self) -> &HPose {
        &self.world
    }

    pub fn mask(&self) -> PoseMask {
        self.mask
    }
}

/// A depth-first flattened tree of entities with local and world poses.
pub struct Hierarchy {
    /// The entity this hierarchy belongs to (a sublevel in a scene).
    owner: Entity,
    nodes: Vec<Node>,
    /// Maps entity → index into `nodes`. Rebuilt for the shifted tail after
    /// every structural change.
    positions: HashMap<Entity, usize>,
    listeners: ListenerList<dyn HierarchyListener>,
}

impl Hierarchy {
    pub fn new(owner: Entity) -> Self {
        Self {
            owner,
            nodes: Vec::new(),
            positions: HashMap::new(),
            listeners: ListenerList::new(),
        }
    }

    pub fn owner(&self) -> Entity {
        self.owner
    }

    pub fn add_listener(&mut self, listener: Weak<RefCell<dyn HierarchyListener>>) -> bool {
        self.listeners.register(listener)
    }

    pub fn remove_listener(&mut self, listener: &Weak<RefCell<dyn HierarchyListener>>) -> bool {
        self.listeners.unregister_shift(listener)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn contains(&self, entity: Entity) -> bool {
        self.positions.contains_key(&entity)
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current pre-order index of `entity`. Invalidated by any structural change.
    pub fn index_of(&self, entity: Entity) -> Option<usize> {
        self.positions.get(&entity).copied()
    }

    /// All nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn entity_by_index(&self, index: usize) -> Entity {
        self.node_by_index(index).entity
    }

    pub fn depth_by_index(&self, index: usize) -> u32 {
        self.node_by_index(index).depth
    }

    pub fn has_children_by_index(&self, index: usize) -> bool {
        let depth = self.node_by_index(index).depth;
        self.nodes
            .get(index + 1)
            .is_some_and(|next| next.depth > depth)
    }

    /// One past the last index of the subtree rooted at `index`.
    ///
    /// `[index, descendant_range_by_index(index))` is the node plus all of its
    /// descendants.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn descendant_range_by_index(&self, index: usize) -> usize {
        self.node_by_index(index);
        subtree_end(&self.nodes, index)
    }

    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        let index = self.index_of(entity)?;
        self.parent_index(index).map(|p| self.nodes[p].entity)
    }

    pub fn local_pose(&self, entity: Entity) -> Option<HPose> {
        self.node(entity).map(|n| n.local)
    }

    pub fn world_pose(&self, entity: Entity) -> Option<HPose> {
        self.node(entity).map(|n| n.world)
    }

    pub fn mask(&self, entity: Entity) -> Option<PoseMask> {
        self.node(entity).map(|n| n.mask)
    }

    /// Direct children of `entity`, skipping over grandchildren subtrees.
    /// Empty if `entity` is absent.
    pub fn children(&self, entity: Entity) -> Children<'_> {
        match self.index_of(entity) {
            Some(index) => Children {
                nodes: &self.nodes,
                next: index + 1,
                end: subtree_end(&self.nodes, index),
            },
            None => Children {
                nodes: &self.nodes,
                next: 0,
                end: 0,
            },
        }
    }

    /// Top-level nodes.
    pub fn roots(&self) -> Children<'_> {
        Children {
            nodes: &self.nodes,
            next: 0,
            end: self.nodes.len(),
        }
    }

    /// Every descendant of `entity` in pre-order, excluding `entity` itself.
    pub fn descendants(&self, entity: Entity) -> impl Iterator<Item = Entity> + '_ {
        let range = match self.index_of(entity) {
            Some(index) => index + 1..subtree_end(&self.nodes, index),
            None => 0..0,
        };
        self.nodes[range].iter().map(|n| n.entity)
    }

    /// Append `entity` and all of its descendants to `out`, in pre-order.
    /// Returns `false` if `entity` is absent.
    pub fn collect_subtree(&self, entity: Entity, out: &mut Vec<Entity>) -> bool {
        let Some(index) = self.index_of(entity) else {
            return false;
        };
        let end = subtree_end(&self.nodes, index);
        out.extend(self.nodes[index..end].iter().map(|n| n.entity));
        true
    }

    // ── Structure ───────────────────────────────────────────────────────

    /// Insert `entity` as the last child of `parent`, or as the last top-level
    /// node when `parent` is `None`.
    ///
    /// Fails if `entity` is already present or `parent` is absent.
    pub fn try_add(&mut self, entity: Entity, parent: Option<Entity>, local: HPose) -> bool {
        if entity.is_nil() || self.contains(entity) {
            return false;
        }
        let (index, depth) = match parent {
            None => (self.nodes.len(), 0),
            Some(parent) => match self.index_of(parent) {
                Some(p) => (subtree_end(&self.nodes, p), self.nodes[p].depth + 1),
                None => return false,
            },
        };

        self.nodes.insert(
            index,
            Node {
                entity,
                depth,
                local,
                world: local,
                mask: PoseMask::empty(),
            },
        );
        self.rebuild_positions(index);
        self.refresh_subtree(index);
        log::trace!("hierarchy {}: added {entity} at depth {depth}", self.owner);

        let this = &*self;
        this.listeners
            .notify(|l| l.hierarchy_did_add(this, entity));
        true
    }

    /// Move `entity` and its subtree under `new_parent` (or to the top level),
    /// keeping its world pose.
    ///
    /// `mask` is stored on `entity` and names the parent channels it stops
    /// inheriting. Fails if either entity is absent or `new_parent` lies
    /// inside `entity`'s subtree.
    pub fn try_reparent(
        &mut self,
        entity: Entity,
        new_parent: Option<Entity>,
        mask: PoseMask,
    ) -> bool {
        let Some(start) = self.index_of(entity) else {
            return false;
        };
        let end = subtree_end(&self.nodes, start);
        let target = match new_parent {
            None => None,
            Some(parent) => match self.index_of(parent) {
                Some(p) if (start..end).contains(&p) => {
                    log::warn!("cannot reparent {entity} under its own descendant {parent}");
                    return false;
                }
                Some(p) => Some(p),
                None => return false,
            },
        };

        let world = self.nodes[start].world;
        let moved: Vec<Node> = self.nodes.drain(start..end).collect();
        let (insert_at, depth) = match target {
            None => (self.nodes.len(), 0),
            Some(p) => {
                let p = if p > start { p - moved.len() } else { p };
                (subtree_end(&self.nodes, p), self.nodes[p].depth + 1)
            }
        };

        let base = moved[0].depth;
        self.nodes.splice(
            insert_at..insert_at,
            moved.into_iter().map(|mut node| {
                node.depth = node.depth - base + depth;
                node
            }),
        );
        self.rebuild_positions(start.min(insert_at));

        let parent_world = self.parent_world(insert_at);
        let root = &mut self.nodes[insert_at];
        root.mask = mask;
        root.local = mask.rebase(&parent_world, &world);
        self.refresh_subtree(insert_at);

        log::debug!(
            "hierarchy {}: reparented {entity} under {}",
            self.owner,
            new_parent.map_or_else(|| "top level".to_owned(), |p| p.to_string())
        );
        true
    }

    /// Remove `entity`. Its direct children are promoted to its parent with
    /// their world poses kept.
    ///
    /// Listeners see `hierarchy_will_remove` while the node is still present.
    pub fn try_release(&mut self, entity: Entity) -> bool {
        let Some(index) = self.index_of(entity) else {
            return false;
        };

        let this = &*self;
        this.listeners
            .notify(|l| l.hierarchy_will_remove(this, entity));

        let end = subtree_end(&self.nodes, index);
        let depth = self.nodes[index].depth;
        let grandparent_world = self.parent_world(index);
        for node in &mut self.nodes[index + 1..end] {
            if node.depth == depth + 1 {
                node.local = node.mask.rebase(&grandparent_world, &node.world);
            }
            node.depth -= 1;
        }

        self.nodes.remove(index);
        self.positions.remove(&entity);
        self.rebuild_positions(index);

        let mut child = index;
        while child < end - 1 {
            self.refresh_subtree(child);
            child = subtree_end(&self.nodes, child);
        }

        log::trace!("hierarchy {}: removed {entity}", self.owner);
        true
    }

    // ── Poses ───────────────────────────────────────────────────────────

    pub fn set_local_pose(&mut self, entity: Entity, pose: HPose) -> bool {
        let Some(index) = self.index_of(entity) else {
            return false;
        };
        self.nodes[index].local = pose;
        self.refresh_subtree(index);
        true
    }

    pub fn set_local_scale(&mut self, entity: Entity, scale: Vec3) -> bool {
        let Some(index) = self.index_of(entity) else {
            return false;
        };
        self.nodes[index].local.scale = scale;
        self.refresh_subtree(index);
        true
    }

    /// Store the local pose that makes `entity`'s world pose equal `pose`.
    pub fn set_world_pose(&mut self, entity: Entity, pose: HPose) -> bool {
        let Some(index) = self.index_of(entity) else {
            return false;
        };
        let parent_world = self.parent_world(index);
        let node = &mut self.nodes[index];
        node.local = node.mask.rebase(&parent_world, &pose);
        self.refresh_subtree(index);
        true
    }

    /// Like [`set_world_pose`](Self::set_world_pose), keeping the current
    /// world scale.
    pub fn set_world_rigid_pose(&mut self, entity: Entity, pose: RPose) -> bool {
        let Some(index) = self.index_of(entity) else {
            return false;
        };
        let scale = self.nodes[index].world.scale;
        self.set_world_pose(entity, HPose::from_rigid(pose, scale))
    }

    /// Assert the pre-order layout, the position map and the world pose cache.
    ///
    /// # Panics
    ///
    /// Panics on any inconsistency; the hierarchy is corrupt.
    pub fn sanity_check(&self) {
        assert_eq!(
            self.positions.len(),
            self.nodes.len(),
            "hierarchy position map size mismatch"
        );
        let mut stack: Vec<HPose> = vec![HPose::IDENTITY];
        for (index, node) in self.nodes.iter().enumerate() {
            assert_eq!(
                self.positions.get(&node.entity),
                Some(&index),
                "hierarchy position of {:?} is stale",
                node.entity
            );
            let depth = node.depth as usize;
            assert!(
                depth < stack.len(),
                "node {:?} at depth {depth} skips a level",
                node.entity
            );
            stack.truncate(depth + 1);
            let world = node.mask.concat(&stack[depth], &node.local);
            assert!(
                world.abs_diff_eq(&node.world, 1e-3),
                "cached world pose of {:?} is stale",
                node.entity
            );
            stack.push(world);
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn node(&self, entity: Entity) -> Option<&Node> {
        self.index_of(entity).map(|index| &self.nodes[index])
    }

    fn node_by_index(&self, index: usize) -> &Node {
        assert!(
            index < self.nodes.len(),
            "hierarchy index {index} out of range (count {})",
            self.nodes.len()
        );
        &self.nodes[index]
    }

    fn parent_index(&self, index: usize) -> Option<usize> {
        let depth = self.nodes[index].depth;
        if depth == 0 {
            return None;
        }
        (0..index).rev().find(|&i| self.nodes[i].depth < depth)
    }

    fn parent_world(&self, index: usize) -> HPose {
        self.parent_index(index)
            .map_or(HPose::IDENTITY, |p| self.nodes[p].world)
    }

    fn rebuild_positions(&mut self, from: usize) {
        for (index, node) in self.nodes.iter().enumerate().skip(from) {
            self.positions.insert(node.entity, index);
        }
    }

    /// Recompute world poses for the subtree rooted at `start`.
    fn refresh_subtree(&mut self, start: usize) {
        let end = subtree_end(&self.nodes, start);
        let base = self.nodes[start].depth;
        // stack[k] is the world pose of the ancestor at relative depth k - 1.
        let mut stack = vec![self.parent_world(start)];
        for node in &mut self.nodes[start..end] {
            let rel = (node.depth - base) as usize;
            stack.truncate(rel + 1);
            node.world = node.mask.concat(&stack[rel], &node.local);
            stack.push(node.world);
        }
    }
}

fn subtree_end(nodes: &[Node], index: usize) -> usize {
    let depth = nodes[index].depth;
    nodes[index + 1..]
        .iter()
        .position(|n| n.depth <= depth)
        .map_or(nodes.len(), |offset| index + 1 + offset)
}

/// Iterator over sibling nodes that skips each sibling's subtree.
///
/// Returned by [`Hierarchy::children`] and [`Hierarchy::roots`].
pub struct Children<'a> {
    nodes: &'a [Node],
    next: usize,
    end: usize,
}

impl Iterator for Children<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        if self.next >= self.end {
            return None;
        }
        let entity = self.nodes[self.next].entity;
        self.next = subtree_end(self.nodes, self.next);
        Some(entity)
    }
}
