// ==============================================================================
// recovery.rs — KEEPING THE CAR DRIVEABLE
// ------------------------------------------------------------------------------
// - StuckMonitor: commanded to move but barely moving for too long
//   -> escalating per-wheel drive bonus
// - air_correction: no ground under wheels or chassis
//   -> clamp spin, torque roll/pitch back toward level (yaw untouched)
// - settle: no drive and below stop threshold
//   -> zero velocities, cancel gravity for the frame
// - respawn_cause: below the fall floor or numerically broken
// ==============================================================================

use nalgebra::Vector3;

use crate::config::VehicleTuning;
use crate::physics::VehicleState;

#[derive(Debug, Clone, Default)]
pub struct StuckMonitor {
    pub counter: u32,
}

impl StuckMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count frames inside the stuck band while drive is commanded and return
    /// the bonus force for this frame. Leaving the band, or letting go of the
    /// throttle, resets the count.
    pub fn update(&mut self, speed: f32, commanded: bool, tuning: &VehicleTuning) -> f32 {
        let in_band = speed >= tuning.stuck_speed_min && speed <= tuning.stuck_speed_max;
        if !(commanded && in_band) {
            if self.counter > tuning.stuck_frames {
                tracing::debug!(frames = self.counter, "stuck recovery released");
            }
            self.counter = 0;
            return 0.0;
        }

        self.counter = self.counter.saturating_add(1);
        if self.counter <= tuning.stuck_frames {
            return 0.0;
        }
        if self.counter == tuning.stuck_frames + 1 {
            tracing::debug!(speed, "stuck recovery engaged");
        }
        (self.counter - tuning.stuck_frames) as f32 * tuning.stuck_bonus_per_frame
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirCorrection {
    /// Replacement angular velocity when the current one exceeds the clamp.
    pub angular_velocity: Option<Vector3<f32>>,
    /// World-space leveling torque; no component about world up.
    pub torque: Vector3<f32>,
}

pub fn air_correction(state: &VehicleState, tuning: &VehicleTuning) -> AirCorrection {
    let w = state.angular_velocity;
    let mag = w.magnitude();
    let angular_velocity = if mag > tuning.air_max_angvel {
        Some(w * (tuning.air_max_angvel / mag))
    } else {
        None
    };

    // axis that rotates the chassis up toward world up; |axis| = sin(tilt)
    let mut axis = state.up().cross(&Vector3::y());
    axis.y = 0.0;

    AirCorrection {
        angular_velocity,
        torque: axis * tuning.air_level_torque,
    }
}

pub fn should_settle(engine_force: f32, speed: f32, tuning: &VehicleTuning) -> bool {
    engine_force == 0.0 && speed < tuning.stop_threshold
}

/// Upward force that cancels gravity on the chassis for one frame.
pub fn settle_force(state: &VehicleState) -> Vector3<f32> {
    Vector3::y() * state.mass * state.gravity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnCause {
    FellOff,
    Unstable,
}

pub fn respawn_cause(state: &VehicleState, tuning: &VehicleTuning, world_bound: f32) -> Option<RespawnCause> {
    if !state.is_valid(world_bound) {
        return Some(RespawnCause::Unstable);
    }
    if state.position.y < tuning.fall_floor {
        return Some(RespawnCause::FellOff);
    }
    None
}
