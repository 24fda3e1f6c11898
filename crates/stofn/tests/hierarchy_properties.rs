//! Structural properties checked over larger, irregular trees and pools.

use stofn::ecs::{Entity, EntityAllocator, Hierarchy, Pool};
use stofn::math::{HPose, PoseMask, Quat, Vec3};

/// Deterministic xorshift so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }

    fn unit(&mut self) -> f32 {
        (self.next() % 10_000) as f32 / 10_000.0
    }

    fn pose(&mut self) -> HPose {
        HPose::new(
            Quat::from_euler(
                glam::EulerRot::XYZ,
                self.unit() * 6.0,
                self.unit() * 6.0,
                self.unit() * 6.0,
            ),
            Vec3::new(self.unit(), self.unit(), self.unit()) * 4.0 - 2.0,
            Vec3::new(self.unit(), self.unit(), self.unit()) * 0.4 + 0.8,
        )
    }
}

fn random_tree(rng: &mut Rng, size: usize) -> (EntityAllocator, Hierarchy, Vec<Entity>) {
    let mut alloc = EntityAllocator::new();
    let owner = alloc.create("level");
    let mut hierarchy = Hierarchy::new(owner);
    let mut members: Vec<Entity> = Vec::new();
    for i in 0..size {
        let entity = alloc.create(&format!("n{i}"));
        let parent = match rng.below(4) {
            0 => None,
            _ if members.is_empty() => None,
            _ => Some(members[rng.below(members.len())]),
        };
        assert!(hierarchy.try_add(entity, parent, rng.pose()));
        members.push(entity);
    }
    (alloc, hierarchy, members)
}

fn dfs_size(hierarchy: &Hierarchy, entity: Entity) -> usize {
    1 + hierarchy
        .children(entity)
        .map(|child| dfs_size(hierarchy, child))
        .sum::<usize>()
}

#[test]
fn subtree_range_matches_depth_first_walk() {
    let mut rng = Rng(0x5eed_1234);
    let (_alloc, hierarchy, _) = random_tree(&mut rng, 200);
    hierarchy.sanity_check();

    for index in 0..hierarchy.count() {
        let entity = hierarchy.entity_by_index(index);
        let end = hierarchy.descendant_range_by_index(index);
        assert_eq!(end - index, dfs_size(&hierarchy, entity), "node {index}");
        assert_eq!(hierarchy.has_children_by_index(index), end > index + 1);
    }

    let total: usize = hierarchy.roots().map(|r| dfs_size(&hierarchy, r)).sum();
    assert_eq!(total, hierarchy.count());
}

#[test]
fn reparent_preserves_world_pose() {
    let mut rng = Rng(0xfeed_beef);
    let (_alloc, mut hierarchy, members) = random_tree(&mut rng, 40);

    let mut moved = 0;
    for _ in 0..100 {
        let entity = members[rng.below(members.len())];
        let target = members[rng.below(members.len())];
        let new_parent = if rng.below(5) == 0 { None } else { Some(target) };

        let before: Vec<(Entity, HPose)> = std::iter::once(entity)
            .chain(hierarchy.descendants(entity))
            .map(|e| (e, hierarchy.world_pose(e).unwrap()))
            .collect();

        if !hierarchy.try_reparent(entity, new_parent, PoseMask::empty()) {
            // Only cycles are rejected here.
            let target = new_parent.unwrap();
            assert!(before.iter().any(|(e, _)| *e == target));
            continue;
        }
        moved += 1;
        assert_eq!(hierarchy.parent_of(entity), new_parent);
        for (e, pose) in &before {
            let after = hierarchy.world_pose(*e).unwrap();
            assert!(
                after.abs_diff_eq(pose, 1e-4),
                "{e:?} moved from {pose:?} to {after:?}"
            );
        }
    }
    assert!(moved > 0);
    hierarchy.sanity_check();
}

#[test]
fn swap_remove_preserves_other_rows() {
    let mut rng = Rng(0x0dd_ba11);
    let mut alloc = EntityAllocator::new();
    let mut pool: Pool<(u64, String)> = Pool::new();
    let mut live: Vec<(Entity, u64)> = Vec::new();

    for round in 0..500 {
        if live.is_empty() || rng.below(3) != 0 {
            let entity = alloc.create("row");
            let value = rng.next();
            assert!(pool.try_append(entity, (value, format!("{round}"))));
            live.push((entity, value));
            continue;
        }

        let (victim, _) = live.swap_remove(rng.below(live.len()));
        let before = pool.count();
        assert!(pool.try_release_swap(victim));
        assert!(!pool.contains(victim));
        assert_eq!(pool.count(), before - 1);
        alloc.release(victim);

        for &(entity, value) in &live {
            assert_eq!(pool.try_get::<0>(entity), Some(&value));
        }
    }
    pool.sanity_check();
    assert_eq!(pool.count(), live.len());
}
