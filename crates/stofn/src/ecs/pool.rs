//! # Pool — Columnar Per-Entity Storage
//!
//! A [`Pool`] stores one row per [`Entity`]: a handle column plus one value
//! column per element of the row tuple. Columns are plain `Vec`s of equal
//! length, so a physics tick or a draw-list build can walk a whole column
//! densely, while per-entity lookups go through a side map in O(1).
//!
//! ```text
//! handles:   [e3, e7, e1]
//! column 0:  [p3, p7, p1]      ← e.g. RPose
//! column 1:  [m3, m7, m1]      ← e.g. mesh id
//! positions: {e3: 0, e7: 1, e1: 2}
//! ```
//!
//! ## Removal
//!
//! Removal is swap-with-last: the last row is moved into the hole and the
//! columns shrink by one. That keeps removal O(1) but means positional order
//! is **not stable**. Never hold a row index across a mutating call; resolve
//! through [`Pool::index_of`] again.
//!
//! ## Addressing columns
//!
//! Columns are addressed by their position in the row tuple, as a const
//! generic:
//!
//! ```
//! use stofn::ecs::{EntityAllocator, Pool};
//!
//! let mut alloc = EntityAllocator::new();
//! let e = alloc.create("crate");
//!
//! let mut pool: Pool<(f32, &str)> = Pool::new();
//! assert!(pool.try_append(e, (2.5, "wood")));
//! assert_eq!(pool.try_get::<0>(e), Some(&2.5));
//! assert_eq!(pool.try_get::<1>(e), Some(&"wood"));
//! ```

use std::collections::HashMap;

use super::entity::Entity;

/// A row tuple that can be split into parallel columns.
///
/// Implemented for tuples of one to six elements.
pub trait Row: Sized {
    /// One `Vec` per tuple element.
    type Columns: Default;

    fn push(columns: &mut Self::Columns, row: Self);
    fn swap_remove(columns: &mut Self::Columns, index: usize) -> Self;
    fn has_len(columns: &Self::Columns, len: usize) -> bool;
    fn reserve(columns: &mut Self::Columns, additional: usize);
    fn clear(columns: &mut Self::Columns);
}

/// Access to column `K` of a [`Row`].
pub trait Column<const K: usize>: Row {
    type Item;

    fn column(columns: &Self::Columns) -> &[Self::Item];
    fn column_mut(columns: &mut Self::Columns) -> &mut [Self::Item];
}

macro_rules! impl_row {
    ($($T:ident $idx:tt),+) => {
        impl<$($T),+> Row for ($($T,)+) {
            type Columns = ($(Vec<$T>,)+);

            fn push(columns: &mut Self::Columns, row: Self) {
                $( columns.$idx.push(row.$idx); )+
            }

            fn swap_remove(columns: &mut Self::Columns, index: usize) -> Self {
                ($( columns.$idx.swap_remove(index), )+)
            }

            fn has_len(columns: &Self::Columns, len: usize) -> bool {
                true $( && columns.$idx.len() == len )+
            }

            fn reserve(columns: &mut Self::Columns, additional: usize) {
                $( columns.$idx.reserve(additional); )+
            }

            fn clear(columns: &mut Self::Columns) {
                $( columns.$idx.clear(); )+
            }
        }

        impl_row!(@columns [$($T)+] $($T $idx),+);
    };
    (@columns $all:tt $($T:ident $idx:tt),+) => {
        $( impl_row!(@column $all $T $idx); )+
    };
    (@column [$($all:ident)+] $T:ident $idx:tt) => {
        impl<$($all),+> Column<$idx> for ($($all,)+) {
            type Item = $T;

            fn column(columns: &Self::Columns) -> &[$T] {
                &columns.$idx
            }

            fn column_mut(columns: &mut Self::Columns) -> &mut [$T] {
                &mut columns.$idx
            }
        }
    };
}

impl_row!(A 0);
impl_row!(A 0, B 1);
impl_row!(A 0, B 1, C 2);
impl_row!(A 0, B 1, C 2, D 3);
impl_row!(A 0, B 1, C 2, D 3, E 4);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5);

/// Columnar storage of one row per entity, with O(1) insert, lookup and
/// swap-remove.
pub struct Pool<R: Row> {
    handles: Vec<Entity>,
    columns: R::Columns,
    /// Maps entity → row index. Always mirrors `handles`.
    positions: HashMap<Entity, usize>,
}

impl<R: Row> Pool<R> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            columns: R::Columns::default(),
            positions: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self::new();
        pool.handles.reserve(capacity);
        pool.positions.reserve(capacity);
        R::reserve(&mut pool.columns, capacity);
        pool
    }

    /// Check whether `entity` has a row.
    pub fn contains(&self, entity: Entity) -> bool {
        self.positions.contains_key(&entity)
    }

    /// Append a row for `entity`.
    ///
    /// Returns `false` without touching the pool if `entity` already has a row.
    pub fn try_append(&mut self, entity: Entity, row: R) -> bool {
        if self.positions.contains_key(&entity) {
            return false;
        }
        self.positions.insert(entity, self.handles.len());
        self.handles.push(entity);
        R::push(&mut self.columns, row);
        true
    }

    /// Column `K` value for `entity`, or `None` if it has no row.
    pub fn try_get<const K: usize>(&self, entity: Entity) -> Option<&<R as Column<K>>::Item>
    where
        R: Column<K>,
    {
        let index = *self.positions.get(&entity)?;
        Some(&<R as Column<K>>::column(&self.columns)[index])
    }

    /// Mutable column `K` value for `entity`, or `None` if it has no row.
    pub fn try_get_mut<const K: usize>(
        &mut self,
        entity: Entity,
    ) -> Option<&mut <R as Column<K>>::Item>
    where
        R: Column<K>,
    {
        let index = *self.positions.get(&entity)?;
        Some(&mut <R as Column<K>>::column_mut(&mut self.columns)[index])
    }

    /// Remove the row for `entity` via swap-remove. Returns `false` if absent.
    ///
    /// Whatever entity occupied the last row now occupies the removed row's
    /// index.
    pub fn try_release_swap(&mut self, entity: Entity) -> bool {
        self.try_take_swap(entity).is_some()
    }

    /// Like [`try_release_swap`](Self::try_release_swap), but hands the removed
    /// row back to the caller.
    pub fn try_take_swap(&mut self, entity: Entity) -> Option<R> {
        let index = self.positions.remove(&entity)?;
        let row = R::swap_remove(&mut self.columns, index);
        self.handles.swap_remove(index);
        // The former last row now lives at `index` (unless we removed the last row).
        if let Some(&moved) = self.handles.get(index) {
            self.positions.insert(moved, index);
        }
        Some(row)
    }

    /// Number of rows.
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The handle column, in storage order.
    pub fn handles(&self) -> &[Entity] {
        &self.handles
    }

    /// Column `K` as a dense slice, parallel to [`handles`](Self::handles).
    pub fn column<const K: usize>(&self) -> &[<R as Column<K>>::Item]
    where
        R: Column<K>,
    {
        <R as Column<K>>::column(&self.columns)
    }

    /// Column `K` as a dense mutable slice.
    pub fn column_mut<const K: usize>(&mut self) -> &mut [<R as Column<K>>::Item]
    where
        R: Column<K>,
    {
        <R as Column<K>>::column_mut(&mut self.columns)
    }

    /// `(entity, &value)` pairs of column `K`, in storage order.
    pub fn iter_column<const K: usize>(
        &self,
    ) -> impl Iterator<Item = (Entity, &<R as Column<K>>::Item)>
    where
        R: Column<K>,
    {
        self.handles.iter().copied().zip(self.column::<K>())
    }

    /// Positional access to column `K`, for use inside a bulk pass.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count()`.
    pub fn get_by_index<const K: usize>(&self, index: usize) -> &<R as Column<K>>::Item
    where
        R: Column<K>,
    {
        self.assert_index(index);
        &self.column::<K>()[index]
    }

    /// Mutable positional access to column `K`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count()`.
    pub fn get_by_index_mut<const K: usize>(&mut self, index: usize) -> &mut <R as Column<K>>::Item
    where
        R: Column<K>,
    {
        self.assert_index(index);
        &mut self.column_mut::<K>()[index]
    }

    /// The entity stored at row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count()`.
    pub fn handle_by_index(&self, index: usize) -> Entity {
        self.assert_index(index);
        self.handles[index]
    }

    /// Current row index of `entity`. Only valid until the next mutation.
    pub fn index_of(&self, entity: Entity) -> Option<usize> {
        self.positions.get(&entity).copied()
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        self.handles.clear();
        self.positions.clear();
        R::clear(&mut self.columns);
    }

    /// Assert that every column has the same length and the position map
    /// mirrors the handle column.
    ///
    /// # Panics
    ///
    /// Panics on any mismatch; the pool is corrupt.
    pub fn sanity_check(&self) {
        let len = self.handles.len();
        assert!(R::has_len(&self.columns, len), "pool column length mismatch");
        assert_eq!(self.positions.len(), len, "pool position map size mismatch");
        for (index, entity) in self.handles.iter().enumerate() {
            assert_eq!(
                self.positions.get(entity),
                Some(&index),
                "pool position of {entity:?} is stale"
            );
        }
    }

    fn assert_index(&self, index: usize) {
        assert!(
            index < self.handles.len(),
            "pool index {index} out of range (count {})",
            self.handles.len()
        );
    }
}

impl<R: Row> Default for Pool<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::entity::EntityAllocator;

    fn entities(n: usize) -> Vec<Entity> {
        let mut alloc = EntityAllocator::new();
        (0..n).map(|i| alloc.create(&format!("e{i}"))).collect()
    }

    #[test]
    fn append_and_get() {
        let e = entities(3);
        let mut pool: Pool<(u32, f32)> = Pool::new();
        assert!(pool.try_append(e[0], (10, 1.0)));
        assert!(pool.try_append(e[1], (20, 2.0)));
        assert_eq!(pool.count(), 2);
        assert_eq!(pool.try_get::<0>(e[1]), Some(&20));
        assert_eq!(pool.try_get::<1>(e[0]), Some(&1.0));
        assert_eq!(pool.try_get::<0>(e[2]), None);
        assert!(pool.contains(e[0]));
        assert!(!pool.contains(e[2]));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let e = entities(1);
        let mut pool: Pool<(u32,)> = Pool::new();
        assert!(pool.try_append(e[0], (1,)));
        assert!(!pool.try_append(e[0], (2,)));
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.try_get::<0>(e[0]), Some(&1));
    }

    #[test]
    fn get_mut_writes_through() {
        let e = entities(1);
        let mut pool: Pool<(u32, String)> = Pool::new();
        pool.try_append(e[0], (1, "a".to_owned()));
        pool.try_get_mut::<1>(e[0]).unwrap().push('b');
        *pool.try_get_mut::<0>(e[0]).unwrap() += 1;
        assert_eq!(pool.try_get::<0>(e[0]), Some(&2));
        assert_eq!(pool.try_get::<1>(e[0]).map(String::as_str), Some("ab"));
    }

    #[test]
    fn swap_remove_middle() {
        let e = entities(3);
        let mut pool: Pool<(u32,)> = Pool::new();
        for (i, &entity) in e.iter().enumerate() {
            pool.try_append(entity, (i as u32 * 10,));
        }

        assert!(pool.try_release_swap(e[0]));
        assert_eq!(pool.count(), 2);
        assert!(!pool.contains(e[0]));
        // Last row moved into the hole.
        assert_eq!(pool.handle_by_index(0), e[2]);
        assert_eq!(pool.index_of(e[2]), Some(0));
        assert_eq!(pool.try_get::<0>(e[2]), Some(&20));
        assert_eq!(pool.try_get::<0>(e[1]), Some(&10));
        pool.sanity_check();
    }

    #[test]
    fn swap_remove_last_and_absent() {
        let e = entities(2);
        let mut pool: Pool<(u32,)> = Pool::new();
        pool.try_append(e[0], (1,));
        pool.try_append(e[1], (2,));
        assert!(pool.try_release_swap(e[1]));
        assert!(!pool.try_release_swap(e[1]));
        assert_eq!(pool.column::<0>(), &[1]);
        pool.sanity_check();
    }

    #[test]
    fn swap_remove_keeps_every_other_row() {
        let e = entities(16);
        let mut pool: Pool<(usize, u64)> = Pool::new();
        for (i, &entity) in e.iter().enumerate() {
            pool.try_append(entity, (i, (i * i) as u64));
        }

        for victim in [5, 0, 15, 7] {
            let before = pool.count();
            assert!(pool.try_release_swap(e[victim]));
            assert_eq!(pool.count(), before - 1);
            assert!(!pool.contains(e[victim]));
            pool.sanity_check();
        }

        for (i, &entity) in e.iter().enumerate() {
            if [5, 0, 15, 7].contains(&i) {
                continue;
            }
            assert_eq!(pool.try_get::<0>(entity), Some(&i));
            assert_eq!(pool.try_get::<1>(entity), Some(&((i * i) as u64)));
        }
    }

    #[test]
    fn take_returns_row() {
        let e = entities(2);
        let mut pool: Pool<(u32, &str)> = Pool::new();
        pool.try_append(e[0], (7, "seven"));
        pool.try_append(e[1], (8, "eight"));
        assert_eq!(pool.try_take_swap(e[0]), Some((7, "seven")));
        assert_eq!(pool.try_take_swap(e[0]), None);
    }

    #[test]
    fn dense_iteration() {
        let e = entities(3);
        let mut pool: Pool<(u32,)> = Pool::new();
        for (i, &entity) in e.iter().enumerate() {
            pool.try_append(entity, (i as u32,));
        }
        for value in pool.column_mut::<0>() {
            *value *= 2;
        }
        let pairs: Vec<_> = pool.iter_column::<0>().map(|(h, v)| (h, *v)).collect();
        assert_eq!(pairs, vec![(e[0], 0), (e[1], 2), (e[2], 4)]);
        assert_eq!(*pool.get_by_index::<0>(2), 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn positional_access_out_of_range_is_fatal() {
        let pool: Pool<(u32,)> = Pool::new();
        pool.get_by_index::<0>(0);
    }

    #[test]
    fn drop_called_on_remove() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        let e = entities(2);
        DROP_COUNT.store(0, Ordering::SeqCst);
        let mut pool: Pool<(Tracked,)> = Pool::new();
        pool.try_append(e[0], (Tracked,));
        pool.try_append(e[1], (Tracked,));
        pool.try_release_swap(e[0]);
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1); // only the removed one
        drop(pool);
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 2); // remaining one dropped
    }
}
