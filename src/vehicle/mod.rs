// ==============================================================================
// vehicle — DYNAMICS CONTROLLER
// ------------------------------------------------------------------------------
// Turns the frame's movement input and the pre-step VehicleState into a
// VehicleControl, pushes it into the physics adapter, and announces speed,
// brake and reverse changes on the bus.
//
// Per frame, in order:
//   1) throttle / brake resolution (direction flips only below stop_threshold)
//   2) steering with speed degradation and self-centering
//   3) stuck recovery bonus
//   4) airborne: controls suppressed, spin clamped, leveling torque
//   5) full-stop settle
//   6) fall / instability respawn at the anchor
//   7) events
//
// Input convention: x = steer (+ right), z = throttle sign (-1 forward).
// ==============================================================================

pub mod recovery;
pub mod steering;

use nalgebra::Vector3;

use crate::config::VehicleTuning;
use crate::events::{EventBus, GameEvent};
use crate::physics::{Anchor, PhysicsBackend, VehicleControl, VehicleState};

use recovery::{air_correction, respawn_cause, settle_force, should_settle, StuckMonitor};

pub struct VehicleController {
    pub tuning: VehicleTuning,
    world_bound: f32,
    control: VehicleControl,
    stuck: StuckMonitor,
    braking: bool,
    reversing: bool,
    last_kmh: Option<u32>,
}

impl VehicleController {
    pub fn new(tuning: VehicleTuning, world_bound: f32) -> Self {
        Self {
            tuning,
            world_bound,
            control: VehicleControl::idle(),
            stuck: StuckMonitor::new(),
            braking: false,
            reversing: false,
            last_kmh: None,
        }
    }

    /// Last control handed to the physics adapter.
    pub fn control(&self) -> &VehicleControl {
        &self.control
    }

    /// Back to an idle car. Brake and reverse indicators that were on are
    /// switched off on the bus so lights and audio do not keep a stale state.
    pub fn reset(&mut self, bus: &mut EventBus) {
        self.control = VehicleControl::idle();
        self.stuck.reset();
        self.last_kmh = None;
        if std::mem::take(&mut self.braking) {
            bus.emit(&GameEvent::BrakeActive { active: false });
        }
        if std::mem::take(&mut self.reversing) {
            bus.emit(&GameEvent::ReverseActive { active: false });
        }
    }

    /// Speed after the [0, max_speed] clamp and noise floor.
    pub fn clamped_speed(&self, speed: f32) -> f32 {
        if !speed.is_finite() {
            return 0.0;
        }
        let s = speed.clamp(0.0, self.tuning.max_speed);
        if s < self.tuning.speed_noise_floor { 0.0 } else { s }
    }

    /// Whole km/h shown on the HUD; never above floor(max_speed * 3.6).
    pub fn displayed_speed_kmh(&self, speed: f32) -> u32 {
        let rounded = (self.clamped_speed(speed) * 3.6).round() as u32;
        rounded.min(self.top_kmh())
    }

    fn top_kmh(&self) -> u32 {
        (self.tuning.max_speed * 3.6).floor() as u32
    }

    pub fn update<P: PhysicsBackend + ?Sized>(
        &mut self,
        input: Vector3<f32>,
        state: &VehicleState,
        anchor: &Anchor,
        dt: f32,
        physics: &mut P,
        bus: &mut EventBus,
    ) -> VehicleControl {
        // --- 6) respawn wins over everything else this frame ---
        if self.recover(state, anchor, physics, bus) {
            return self.control;
        }

        let t = &self.tuning;
        let raw_speed = state.speed();
        let speed = self.clamped_speed(raw_speed);
        let forward_speed = state.forward_speed();
        let throttle = -input.z.clamp(-1.0, 1.0);

        // --- hard top-speed clamp ---
        if raw_speed > t.max_speed {
            let capped = state.linear_velocity * (t.max_speed / raw_speed);
            physics.set_velocities(capped, state.angular_velocity);
        }

        // --- 1) throttle / brake ---
        let mut going_forward = self.control.going_forward;
        if speed < t.stop_threshold {
            if throttle > 0.0 {
                going_forward = true;
            } else if throttle < 0.0 {
                going_forward = false;
            }
        }

        let mut engine = 0.0;
        let mut brake = 0.0;
        let mut conflict = false;

        if throttle > 0.0 {
            if going_forward {
                engine = t.engine_force * throttle;
            } else {
                brake = t.brake_force * throttle;
                conflict = true;
            }
        } else if throttle < 0.0 {
            if going_forward {
                brake = t.brake_force * -throttle;
                conflict = true;
            } else {
                engine = t.engine_force * t.reverse_ratio * throttle;
            }
        } else if speed >= t.stop_threshold {
            // coast: engine braking against the direction of travel
            engine = -forward_speed.signum() * t.coast_ratio * t.engine_force * (speed / t.max_speed);
        } else {
            brake = t.holding_brake;
        }

        if speed >= t.max_speed && engine * forward_speed > 0.0 {
            engine = 0.0;
        }

        // --- 2) steering ---
        let mut steering_angle = steering::step_steering(self.control.steering_angle, input.x, speed, dt, t);

        // --- 3) stuck ---
        let commanded = throttle != 0.0 && engine != 0.0;
        let mut stuck_bonus = self.stuck.update(speed, commanded, t);

        // --- 4) airborne ---
        let airborne = state.airborne();
        if airborne {
            engine = 0.0;
            brake = 0.0;
            stuck_bonus = 0.0;
            steering_angle = self.control.steering_angle;
            self.stuck.reset();

            let fix = air_correction(state, t);
            if let Some(w) = fix.angular_velocity {
                physics.set_velocities(state.linear_velocity, w);
            }
            physics.apply_frame_torque(fix.torque);
        }

        // --- 5) settle ---
        if !airborne && should_settle(engine, speed, t) {
            physics.set_velocities(Vector3::zeros(), Vector3::zeros());
            physics.apply_frame_force(settle_force(state));
        }

        self.control = VehicleControl {
            engine_force: engine,
            brake_force: brake,
            steering_angle,
            stuck_bonus,
            going_forward,
            stuck_counter: self.stuck.counter,
        };
        physics.apply_control(&self.control);

        tracing::trace!(
            engine,
            brake,
            steering_angle,
            stuck_bonus,
            going_forward,
            airborne,
            speed,
            "vehicle control"
        );

        // --- 7) events ---
        let braking = conflict && !airborne;
        if braking != self.braking {
            self.braking = braking;
            bus.emit(&GameEvent::BrakeActive { active: braking });
        }

        let reversing = !going_forward || (throttle < 0.0 && speed < t.stop_threshold);
        if reversing != self.reversing {
            self.reversing = reversing;
            bus.emit(&GameEvent::ReverseActive { active: reversing });
        }

        self.emit_speed(speed, bus);

        self.control
    }

    /// Teleport to `anchor` if the car fell off the world or the solver blew
    /// up. Returns whether it did.
    pub fn recover<P: PhysicsBackend + ?Sized>(
        &mut self,
        state: &VehicleState,
        anchor: &Anchor,
        physics: &mut P,
        bus: &mut EventBus,
    ) -> bool {
        let Some(cause) = respawn_cause(state, &self.tuning, self.world_bound) else {
            return false;
        };

        tracing::warn!(?cause, position = ?state.position, "respawning vehicle at anchor");
        physics.teleport(anchor);
        self.reset(bus);
        physics.apply_control(&self.control);
        bus.emit(&GameEvent::Respawned {
            position: anchor.position.coords.into(),
        });
        self.emit_speed(0.0, bus);
        true
    }

    fn emit_speed(&mut self, speed: f32, bus: &mut EventBus) {
        let rounded = (self.clamped_speed(speed) * 3.6).round() as u32;
        // rounding up to the top value would flicker against the floored cap
        if rounded > self.top_kmh() {
            return;
        }
        if self.last_kmh != Some(rounded) {
            self.last_kmh = Some(rounded);
            bus.emit(&GameEvent::SpeedChanged { kmh: rounded });
        }
    }
}
