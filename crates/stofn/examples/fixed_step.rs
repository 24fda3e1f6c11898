//! Fixed-timestep physics — a falling box at an uneven frame rate.
//!
//! The simulation steps at 1/60 s while frames arrive every 7–23 ms. The
//! published pose is interpolated between the last two physics states, so it
//! moves smoothly even when a frame takes zero or two steps.
//!
//! Run with: `RUST_LOG=info cargo run -p stofn --example fixed_step`

use std::collections::HashMap;

use stofn::prelude::*;

/// Point masses under gravity with a floor at y = 0.
#[derive(Default)]
struct Gravity {
    bodies: HashMap<Entity, (RPose, Vec3)>,
}

impl Simulation for Gravity {
    fn add_body(&mut self, entity: Entity, pose: RPose) {
        self.bodies.insert(entity, (pose, Vec3::ZERO));
    }

    fn remove_body(&mut self, entity: Entity) {
        self.bodies.remove(&entity);
    }

    fn body_pose(&self, entity: Entity) -> Option<RPose> {
        self.bodies.get(&entity).map(|(pose, _)| *pose)
    }

    fn step(&mut self, dt: f32) {
        for (pose, velocity) in self.bodies.values_mut() {
            velocity.y -= 9.81 * dt;
            pose.position += *velocity * dt;
            if pose.position.y < 0.0 {
                pose.position.y = 0.0;
                velocity.y = 0.0;
            }
        }
    }
}

fn main() {
    env_logger::init();

    let config = Config::default();
    let mut scene = Scene::with_config(config.scene.clone());
    let level = scene.create_sublevel("Level");
    let Some(crate_box) = scene.create_child("Box", level, HPose::from_xyz(0.0, 5.0, 0.0)) else {
        return;
    };

    let mut physics = PhysicsRuntime::new(Gravity::default(), config.physics);
    physics.try_attach_body(&scene, crate_box);

    let frame_times = [0.007, 0.023, 0.016, 0.011, 0.020];
    for frame in 0..60 {
        let dt = frame_times[frame % frame_times.len()];
        let steps = physics.tick(&mut scene, dt);
        if let Some(pose) = scene.world_pose(crate_box) {
            log::info!(
                "frame {frame:2}: {steps} step(s), alpha {:.2}, y = {:.3}",
                physics.interpolation_alpha(),
                pose.position.y
            );
        }
    }
}
