//! Smoke tests of the rapier3d backend. Tolerances are loose on purpose:
//! these check wiring and signs, not tire model numbers.

use std::time::Instant;

use race_core::config::{PhysicsConfig, RaceConfig, VehicleTuning};
use race_core::physics::{Anchor, CollisionTag, PhysicsBackend, RapierPhysics, VehicleControl};
use race_core::session::{FrameInput, RaceSession};
use race_core::track::{BarrierGroup, CheckpointId, TrackDefinition};

const DT: f32 = 1.0 / 60.0;

fn world() -> (RapierPhysics, TrackDefinition) {
    let track = TrackDefinition::oval();
    let spawn = Anchor::from_spawn(track.spawn.position, track.spawn.yaw);
    let physics = RapierPhysics::new(
        PhysicsConfig::default(),
        &track,
        &spawn,
        VehicleTuning::default().chassis_probe_length,
    );
    (physics, track)
}

fn run(physics: &mut RapierPhysics, frames: usize) {
    for _ in 0..frames {
        physics.step(DT);
    }
}

#[test]
fn chassis_settles_on_its_wheels() {
    let (mut physics, _) = world();
    run(&mut physics, 180);

    let s = physics.vehicle_state();
    assert!(s.is_valid(1000.0));
    assert!(s.position.y > 0.3 && s.position.y < 2.0, "rest height {}", s.position.y);
    assert!(s.wheel_contacts.iter().all(|c| *c));
    assert!(!s.airborne());
    assert!(s.speed() < 0.5);
}

#[test]
fn engine_force_drives_forward() {
    let (mut physics, _) = world();
    run(&mut physics, 60);
    let start = physics.vehicle_state().position;

    physics.apply_control(&VehicleControl {
        engine_force: 6000.0,
        ..VehicleControl::idle()
    });
    run(&mut physics, 120);

    let s = physics.vehicle_state();
    assert!(s.forward_speed() > 1.0, "forward speed {}", s.forward_speed());
    assert!(s.position.z < start.z - 0.5);
}

#[test]
fn checkpoint_sensor_is_reported_after_teleport() {
    let (mut physics, _) = world();
    physics.teleport(&Anchor::from_spawn([0.0, 1.5, -60.0], 0.0));
    run(&mut physics, 1);

    let contacts = physics.query_contacts();
    assert!(contacts.contains(&CollisionTag::Checkpoint(CheckpointId::new("c1"))));
}

#[test]
fn removed_coin_stops_reporting_and_restores() {
    let (mut physics, _) = world();
    let coin = CollisionTag::Coin(0);
    physics.teleport(&Anchor::from_spawn([0.0, 1.0, -20.0], 0.0));
    run(&mut physics, 1);
    assert!(physics.query_contacts().contains(&coin));

    physics.remove_coin(0);
    run(&mut physics, 1);
    assert!(!physics.query_contacts().contains(&coin));

    physics.restore_coins();
    physics.teleport(&Anchor::from_spawn([0.0, 1.0, -20.0], 0.0));
    run(&mut physics, 1);
    assert!(physics.query_contacts().contains(&coin));
}

#[test]
fn disabled_barrier_is_not_touched() {
    let (mut physics, _) = world();
    let wall = CollisionTag::Barrier(BarrierGroup::InnerShortcut);

    physics.set_barrier_enabled(BarrierGroup::InnerShortcut, true);
    physics.teleport(&Anchor::from_spawn([8.0, 1.2, -60.0], 0.0));
    run(&mut physics, 1);
    assert!(physics.query_contacts().contains(&wall));

    physics.set_barrier_enabled(BarrierGroup::InnerShortcut, false);
    physics.teleport(&Anchor::from_spawn([8.0, 1.2, -60.0], 0.0));
    run(&mut physics, 1);
    assert!(!physics.query_contacts().contains(&wall));
}

#[test]
fn teleport_zeroes_motion() {
    let (mut physics, _) = world();
    physics.set_velocities([5.0, 0.0, -3.0].into(), [0.0, 2.0, 0.0].into());
    physics.teleport(&Anchor::from_spawn([10.0, 1.2, 10.0], 1.0));

    let s = physics.vehicle_state();
    assert_eq!(s.linear_velocity.magnitude(), 0.0);
    assert_eq!(s.angular_velocity.magnitude(), 0.0);
    assert!((s.position.x - 10.0).abs() < 1e-5);
    assert!((s.yaw() - 1.0).abs() < 1e-4);
}

#[test]
fn session_runs_on_rapier_without_faults() {
    let (physics, track) = world();
    let t0 = Instant::now();
    let mut session = RaceSession::new(&RaceConfig::default(), &track, physics, t0).unwrap();

    for _ in 0..120 {
        session.frame(FrameInput::drive(0.2, 1.0), t0, DT).unwrap();
    }
    assert!(session.vehicle_state().is_valid(1000.0));
    assert_eq!(session.laps().current_lap(), 1);
}

#[test]
fn parked_car_stays_on_its_wheels() {
    let (physics, track) = world();
    let mut config = RaceConfig::default();
    config.clock.countdown_secs = 0;
    let t0 = Instant::now();
    let mut session = RaceSession::new(&config, &track, physics, t0).unwrap();

    for _ in 0..120 {
        session.frame(FrameInput::default(), t0, DT).unwrap();
    }
    let rest = session.vehicle_state().position.y;

    // ten seconds parked with the settle support active every frame
    for frame in 0..600 {
        session.frame(FrameInput::default(), t0, DT).unwrap();
        let s = session.vehicle_state();
        assert!(s.wheel_contacts.iter().all(|c| *c), "frame {frame}: wheels off the ground at y = {}", s.position.y);
        assert!((s.position.y - rest).abs() < 0.05, "frame {frame}: y drifted from {rest} to {}", s.position.y);
    }

    // and it still drives away
    for _ in 0..60 {
        session.frame(FrameInput::drive(0.0, 1.0), t0, DT).unwrap();
    }
    assert!(session.vehicle_state().forward_speed() > 0.5);
}
