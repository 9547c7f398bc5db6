mod common;

use neon_mosaic::pixels::fnv1a64;
use neon_mosaic::RenderController;

use common::{config, controller, plan, provide_shapes};

fn energy_controller() -> RenderController {
    let mut controller = controller(config());
    provide_shapes(&mut controller, &[]);
    controller.set_population(4000);
    controller.submit_final(plan(false, 4000)).expect("final plan");
    controller
}

fn frame_hash_at(times_ms: &[u64]) -> u64 {
    let mut controller = energy_controller();
    for &now in times_ms {
        controller.tick(now);
    }
    fnv1a64(controller.displayed_frame().expect("energy frame").data())
}

#[test]
fn determinism_final_frame_is_stable() {
    let hash = |_: ()| {
        let mut controller = controller(config());
        provide_shapes(&mut controller, &[]);
        controller.submit_final(plan(false, 700)).expect("final plan");
        controller.tick(0);
        fnv1a64(controller.final_frame().expect("final frame").data())
    };
    assert_eq!(hash(()), hash(()), "final composite should be deterministic");
}

#[test]
fn determinism_energy_frame_depends_only_on_time() {
    let first = frame_hash_at(&[0, 16, 32, 48]);
    let second = frame_hash_at(&[0, 48]);
    assert_eq!(
        first, second,
        "energy frame at a given time should not depend on tick history"
    );
}

#[test]
fn determinism_energy_frame_changes_over_time() {
    let early = frame_hash_at(&[0, 16]);
    let late = frame_hash_at(&[0, 900]);
    assert_ne!(early, late, "animated energy should move between frames");
}
