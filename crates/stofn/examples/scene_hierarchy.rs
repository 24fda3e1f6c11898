//! Scene hierarchy — headless solar system.
//!
//! Builds a sun with orbiting planets and moons, spins the sun, prints world
//! positions, then releases a planet (its moon goes with it).
//!
//! Run with: `RUST_LOG=debug cargo run -p stofn --example scene_hierarchy`

use std::cell::RefCell;
use std::rc::Rc;

use stofn::prelude::*;

// ── Subsystem ────────────────────────────────────────────────────────────

/// Keeps an orbit speed per object and forgets released ones.
#[derive(Default)]
struct Orbits {
    speeds: Pool<(f32,)>,
}

impl Orbits {
    fn spin(&self, scene: &mut Scene, dt: f32) {
        for (entity, speed) in self.speeds.iter_column::<0>() {
            let Some(mut pose) = scene.local_pose(entity) else {
                continue;
            };
            pose.rotation = Quat::from_rotation_y(speed * dt) * pose.rotation;
            scene.set_local_pose(entity, pose);
        }
    }
}

impl SceneListener for Orbits {
    fn scene_will_release_object(&mut self, scene: &Scene, entity: Entity) {
        if self.speeds.try_release_swap(entity) {
            log::info!("orbits: dropped {:?}", scene.get_name(entity));
        }
    }
}

fn main() {
    env_logger::init();

    let mut scene = Scene::with_config(SceneConfig {
        default_sublevel: Some("Solar System".to_owned()),
        ..SceneConfig::default()
    });
    let level = scene.sublevel_by_index(0);

    let orbits = Rc::new(RefCell::new(Orbits::default()));
    let listener: Rc<RefCell<dyn SceneListener>> = orbits.clone();
    scene.add_listener(Rc::downgrade(&listener));

    let Some(sun) = scene.create_child("Sun", level, HPose::IDENTITY) else {
        return;
    };
    orbits.borrow_mut().speeds.try_append(sun, (0.5,));

    let planets = [("Mercury", 4.0), ("Venus", 7.0), ("Earth", 10.0), ("Mars", 15.0)];
    for (name, distance) in planets {
        let Some(planet) = scene.create_child(name, sun, HPose::from_xyz(distance, 0.0, 0.0)) else {
            continue;
        };
        let speed = 2.0 / distance;
        orbits.borrow_mut().speeds.try_append(planet, (speed,));
        let moon = format!("{name} I");
        scene.create_child(
            &moon,
            planet,
            HPose::from_xyz(1.0, 0.0, 0.0).with_scale(Vec3::splat(0.25)),
        );
    }

    for _ in 0..10 {
        orbits.borrow().spin(&mut scene, 0.1);
    }

    let Some(hierarchy) = scene.hierarchy(level) else {
        return;
    };
    for node in hierarchy.iter() {
        let indent = "  ".repeat(node.depth() as usize);
        let name = scene.get_name(node.entity()).unwrap_or("?");
        log::info!("{indent}{name} @ {:.2}", node.world().position);
    }

    if let Some(earth) = scene.find_object("Earth") {
        scene.try_release_object(earth);
    }
    log::info!(
        "after release: {} objects, {} with orbits, Earth I present: {}",
        scene.object_count(),
        orbits.borrow().speeds.count(),
        scene.find_object("Earth I").is_some(),
    );
    scene.sanity_check();
}
