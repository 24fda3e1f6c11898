//! Fixed-timestep physics driver.
//!
//! [`PhysicsRuntime`] sits between a [`Scene`] and a physics engine behind
//! the [`Simulation`] trait. Each frame, [`PhysicsRuntime::tick`] feeds the
//! frame time into an accumulator and steps the simulation in fixed
//! increments, then publishes every body's pose back into the scene.
//!
//! Published poses are interpolated between the pose before the last step and
//! the pose after it, by the fraction of a step still left in the
//! accumulator. Rendering stays smooth at any frame rate while the
//! simulation itself only ever sees the fixed step.
//!
//! ```text
//! accumulator: |--step--|--step--|--step--|-rem-|
//!                                ^        ^
//!                            snapshot   current      alpha = rem / step
//! ```

use crate::config::PhysicsConfig;
use crate::ecs::{Entity, Pool};
use crate::math::RPose;
use crate::scene::{Scene, SceneListener};

/// A physics engine as seen by [`PhysicsRuntime`]. Bodies are rigid and keyed
/// by scene identity.
pub trait Simulation {
    fn add_body(&mut self, entity: Entity, pose: RPose);
    fn remove_body(&mut self, entity: Entity);
    fn body_pose(&self, entity: Entity) -> Option<RPose>;
    /// Advance by exactly `dt` seconds.
    fn step(&mut self, dt: f32);
}

/// Drives a [`Simulation`] at a fixed rate and writes interpolated poses into
/// a [`Scene`].
///
/// Register it as a [`SceneListener`] so released objects lose their bodies.
pub struct PhysicsRuntime<S: Simulation> {
    simulation: S,
    config: PhysicsConfig,
    /// Column 0 holds each body's pose from before the latest step.
    bodies: Pool<(RPose,)>,
    accumulator: f32,
}

impl<S: Simulation> PhysicsRuntime<S> {
    /// # Panics
    ///
    /// Panics if `config.fixed_timestep` is not positive.
    pub fn new(simulation: S, config: PhysicsConfig) -> Self {
        assert!(
            config.fixed_timestep > 0.0,
            "fixed timestep must be positive, got {}",
            config.fixed_timestep
        );
        Self {
            simulation,
            config,
            bodies: Pool::new(),
            accumulator: 0.0,
        }
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.simulation
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn body_count(&self) -> usize {
        self.bodies.count()
    }

    pub fn has_body(&self, entity: Entity) -> bool {
        self.bodies.contains(entity)
    }

    /// Create a body for `entity` at its current world pose.
    ///
    /// Fails if `entity` has no pose in `scene` or already has a body.
    pub fn try_attach_body(&mut self, scene: &Scene, entity: Entity) -> bool {
        let Some(pose) = scene.world_pose(entity) else {
            return false;
        };
        let pose = pose.rigid();
        if !self.bodies.try_append(entity, (pose,)) {
            return false;
        }
        self.simulation.add_body(entity, pose);
        log::debug!("attached body to {entity}");
        true
    }

    pub fn try_detach_body(&mut self, entity: Entity) -> bool {
        if !self.bodies.try_release_swap(entity) {
            return false;
        }
        self.simulation.remove_body(entity);
        log::debug!("detached body from {entity}");
        true
    }

    /// Fraction of a fixed step left in the accumulator, in `[0, 1)`.
    pub fn interpolation_alpha(&self) -> f32 {
        self.accumulator / self.config.fixed_timestep
    }

    /// Advance by `frame_dt` seconds of real time and publish body poses to
    /// `scene`. Returns the number of fixed steps taken.
    pub fn tick(&mut self, scene: &mut Scene, frame_dt: f32) -> u32 {
        let fixed_dt = self.config.fixed_timestep;
        // Capped to prevent spiral of death.
        self.accumulator += frame_dt.clamp(0.0, self.config.max_frame_time);

        let mut steps = 0;
        while self.accumulator >= fixed_dt {
            self.accumulator -= fixed_dt;
            steps += 1;
        }

        if steps > 0 {
            for _ in 1..steps {
                self.simulation.step(fixed_dt);
            }
            self.snapshot();
            self.simulation.step(fixed_dt);
        }

        self.publish(scene);
        steps
    }

    fn snapshot(&mut self) {
        for index in 0..self.bodies.count() {
            let entity = self.bodies.handle_by_index(index);
            if let Some(pose) = self.simulation.body_pose(entity) {
                *self.bodies.get_by_index_mut::<0>(index) = pose;
            }
        }
    }

    fn publish(&self, scene: &mut Scene) {
        let alpha = self.interpolation_alpha();
        for (entity, previous) in self.bodies.iter_column::<0>() {
            let Some(current) = self.simulation.body_pose(entity) else {
                continue;
            };
            scene.set_world_rigid_pose(entity, RPose::nlerp(previous, &current, alpha));
        }
    }
}

impl<S: Simulation> SceneListener for PhysicsRuntime<S> {
    fn scene_will_release_object(&mut self, _scene: &Scene, entity: Entity) {
        self.try_detach_body(entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{HPose, Vec3};
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    /// Moves every body +1 along X per second.
    #[derive(Default)]
    struct Drift {
        bodies: HashMap<Entity, RPose>,
        steps: u32,
    }

    impl Simulation for Drift {
        fn add_body(&mut self, entity: Entity, pose: RPose) {
            self.bodies.insert(entity, pose);
        }

        fn remove_body(&mut self, entity: Entity) {
            self.bodies.remove(&entity);
        }

        fn body_pose(&self, entity: Entity) -> Option<RPose> {
            self.bodies.get(&entity).copied()
        }

        fn step(&mut self, dt: f32) {
            self.steps += 1;
            for pose in self.bodies.values_mut() {
                pose.position.x += dt;
            }
        }
    }

    fn config() -> PhysicsConfig {
        PhysicsConfig {
            fixed_timestep: 0.1,
            max_frame_time: 0.25,
        }
    }

    fn setup() -> (Scene, Entity, PhysicsRuntime<Drift>) {
        let mut scene = Scene::new();
        let level = scene.create_sublevel("Default");
        let ball = scene.create_child("Ball", level, HPose::IDENTITY).unwrap();
        let mut physics = PhysicsRuntime::new(Drift::default(), config());
        assert!(physics.try_attach_body(&scene, ball));
        (scene, ball, physics)
    }

    #[test]
    fn attach_requires_pose_and_is_unique() {
        let (mut scene, ball, mut physics) = setup();
        assert!(!physics.try_attach_body(&scene, ball));
        let loose = scene.create_object("loose");
        assert!(!physics.try_attach_body(&scene, loose));
        assert_eq!(physics.body_count(), 1);
    }

    #[test]
    fn accumulates_partial_frames() {
        let (mut scene, _, mut physics) = setup();
        assert_eq!(physics.tick(&mut scene, 0.05), 0);
        assert_eq!(physics.tick(&mut scene, 0.05), 1);
        assert_eq!(physics.simulation().steps, 1);
        assert_relative_eq!(physics.interpolation_alpha(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn frame_time_is_clamped() {
        let (mut scene, _, mut physics) = setup();
        assert_eq!(physics.tick(&mut scene, 10.0), 2);
        assert_eq!(physics.tick(&mut scene, -1.0), 0);
    }

    #[test]
    fn publishes_interpolated_pose() {
        let (mut scene, ball, mut physics) = setup();
        // 2.5 steps: body goes 0.0 → 0.1 → 0.2, snapshot at 0.1, alpha 0.5.
        assert_eq!(physics.tick(&mut scene, 0.25), 2);
        assert_relative_eq!(physics.interpolation_alpha(), 0.5, epsilon = 1e-4);
        let x = scene.world_pose(ball).unwrap().position.x;
        assert_relative_eq!(x, 0.15, epsilon = 1e-4);
        let current = physics.simulation().body_pose(ball).unwrap();
        assert_relative_eq!(current.position.x, 0.2, epsilon = 1e-4);
    }

    #[test]
    fn published_pose_keeps_world_scale() {
        let (mut scene, ball, mut physics) = setup();
        scene.set_local_pose(ball, HPose::IDENTITY.with_scale(Vec3::splat(3.0)));
        physics.tick(&mut scene, 0.1);
        let scale = scene.world_pose(ball).unwrap().scale;
        assert!(scale.abs_diff_eq(Vec3::splat(3.0), 1e-5));
    }

    #[test]
    fn released_object_loses_body() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let (mut scene, ball, physics) = setup();
        let physics = Rc::new(RefCell::new(physics));
        let listener: Rc<RefCell<dyn SceneListener>> = physics.clone();
        scene.add_listener(Rc::downgrade(&listener));

        assert!(scene.try_release_object(ball));
        assert!(!physics.borrow().has_body(ball));
        assert!(physics.borrow().simulation().body_pose(ball).is_none());
        assert_eq!(physics.borrow_mut().tick(&mut scene, 0.1), 1);
    }
}
