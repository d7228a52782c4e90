// ==============================================================================
// physics — PHYSICS INTEGRATION ADAPTER
// ------------------------------------------------------------------------------
// The rest of the core talks to the rigid-body engine only through
// PhysicsBackend. RapierPhysics is the production implementation; tests can
// substitute a deterministic backend.
//
// Conventions (world and chassis):
// - +Y is up, chassis forward is -Z, chassis right is +X
// - Positive steering angle turns the front wheels left (about +Y)
// - Positive engine force pushes the chassis forward
// ==============================================================================

pub mod rapier;
pub mod suspension;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::Serialize;

use crate::track::{BarrierGroup, CheckpointId};

pub use rapier::RapierPhysics;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelId {
    FL,
    FR,
    RL,
    RR,
}

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn index(&self) -> usize {
        match self {
            WheelId::FL => 0,
            WheelId::FR => 1,
            WheelId::RL => 2,
            WheelId::RR => 3,
        }
    }

    /// Front pair steers.
    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    /// Rear pair drives.
    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }
}

/// What the vehicle is touching. Every collider the adapter creates carries
/// exactly one tag, so callers switch on the kind instead of casting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollisionTag {
    Checkpoint(CheckpointId),
    Coin(u32),
    Barrier(BarrierGroup),
    Ground,
}

/// A safe pose to put the vehicle back at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub position: Point3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl Anchor {
    pub fn new(position: Point3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self { position, orientation }
    }

    pub fn from_spawn(position: [f32; 3], yaw: f32) -> Self {
        Self {
            position: Point3::from(position),
            orientation: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
        }
    }
}

/// Post-step pose and motion of the chassis. Written only by the physics
/// step; everything else reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Point3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    /// Indexed by `WheelId::index`.
    pub wheel_contacts: [bool; 4],
    /// Short ray straight down from the chassis found something.
    pub chassis_grounded: bool,
    pub mass: f32,
    pub gravity: f32,
}

impl VehicleState {
    pub fn at_rest(anchor: &Anchor, mass: f32, gravity: f32) -> Self {
        Self {
            position: anchor.position,
            orientation: anchor.orientation,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            wheel_contacts: [true; 4],
            chassis_grounded: true,
            mass,
            gravity,
        }
    }

    pub fn speed(&self) -> f32 {
        self.linear_velocity.magnitude()
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.orientation * -Vector3::z()
    }

    pub fn up(&self) -> Vector3<f32> {
        self.orientation * Vector3::y()
    }

    /// Velocity along the chassis forward axis; negative when rolling back.
    pub fn forward_speed(&self) -> f32 {
        self.linear_velocity.dot(&self.forward())
    }

    /// Heading about world up. 0 when facing -Z.
    pub fn yaw(&self) -> f32 {
        let f = self.forward();
        (-f.x).atan2(-f.z)
    }

    /// Nose-up angle.
    pub fn pitch(&self) -> f32 {
        self.forward().y.clamp(-1.0, 1.0).asin()
    }

    /// Bank angle; positive when the right side is lower.
    pub fn roll(&self) -> f32 {
        let right = self.orientation * Vector3::x();
        (-right.y).clamp(-1.0, 1.0).asin()
    }

    /// No wheel ray reports ground and the chassis probe misses too.
    pub fn airborne(&self) -> bool {
        !self.wheel_contacts.iter().any(|c| *c) && !self.chassis_grounded
    }

    /// False for NaN/Inf, a denormalized rotation, or a pose outside the world.
    pub fn is_valid(&self, world_bound: f32) -> bool {
        let finite = self.position.coords.iter().all(|v| v.is_finite())
            && self.linear_velocity.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite());

        finite
            && (self.orientation.coords.norm() - 1.0).abs() < 1e-3
            && self.position.coords.iter().all(|v| v.abs() <= world_bound)
    }
}

/// Per-frame actuation computed by the vehicle controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleControl {
    /// N, split over the rear pair.
    pub engine_force: f32,
    /// N, split over all four wheels.
    pub brake_force: f32,
    /// rad, front pair.
    pub steering_angle: f32,
    /// N, added to every wheel while stuck recovery is active.
    pub stuck_bonus: f32,
    pub going_forward: bool,
    pub stuck_counter: u32,
}

impl VehicleControl {
    pub fn idle() -> Self {
        Self {
            going_forward: true,
            ..Default::default()
        }
    }
}

/// The rigid-body engine as seen by the core.
pub trait PhysicsBackend {
    /// Advance the world by `dt` seconds of frame time.
    fn step(&mut self, dt: f32);

    fn vehicle_state(&self) -> VehicleState;

    /// Push forces, brake and steering to the wheel actuators for the next step.
    fn apply_control(&mut self, control: &VehicleControl);

    /// Every tagged collider currently touching or overlapping the chassis.
    fn query_contacts(&self) -> Vec<CollisionTag>;

    /// Place the chassis at `anchor` with no motion and no pending forces.
    fn teleport(&mut self, anchor: &Anchor);

    fn set_velocities(&mut self, linear: Vector3<f32>, angular: Vector3<f32>);

    /// World-space force at the center of mass for the next step only. An
    /// upward component is a support request: a backend with suspension adds
    /// only what its wheels do not already carry.
    fn apply_frame_force(&mut self, force: Vector3<f32>);

    /// World-space torque for the next step only.
    fn apply_frame_torque(&mut self, torque: Vector3<f32>);

    fn set_barrier_enabled(&mut self, group: BarrierGroup, enabled: bool);

    /// Stop reporting a collected coin.
    fn remove_coin(&mut self, id: u32);

    /// Bring every removed coin back.
    fn restore_coins(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn state_with(orientation: UnitQuaternion<f32>) -> VehicleState {
        let mut s = VehicleState::at_rest(&Anchor::from_spawn([0.0, 1.0, 0.0], 0.0), 1000.0, 9.81);
        s.orientation = orientation;
        s
    }

    #[test]
    fn yaw_round_trips_from_spawn() {
        let anchor = Anchor::from_spawn([0.0, 0.0, 0.0], 0.7);
        let s = VehicleState::at_rest(&anchor, 1000.0, 9.81);
        assert!((s.yaw() - 0.7).abs() < 1e-5);
        assert!(s.pitch().abs() < 1e-5);
        assert!(s.roll().abs() < 1e-5);
    }

    #[test]
    fn forward_speed_is_signed() {
        let mut s = state_with(UnitQuaternion::identity());
        s.linear_velocity = Vector3::new(0.0, 0.0, 4.0);
        assert!((s.forward_speed() + 4.0).abs() < 1e-6);
        assert!((s.speed() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn airborne_needs_every_probe_to_miss() {
        let mut s = state_with(UnitQuaternion::identity());
        s.wheel_contacts = [false; 4];
        s.chassis_grounded = true;
        assert!(!s.airborne());
        s.chassis_grounded = false;
        assert!(s.airborne());
        s.wheel_contacts[2] = true;
        assert!(!s.airborne());
    }

    #[test]
    fn nan_and_out_of_bounds_states_are_invalid() {
        let mut s = state_with(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2));
        assert!(s.is_valid(1000.0));

        s.position.y = f32::NAN;
        assert!(!s.is_valid(1000.0));

        s.position.y = 2000.0;
        assert!(!s.is_valid(1000.0));
    }
}
