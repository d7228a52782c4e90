// ==============================================================================
// session.rs — ONE RACE, ONE FRAME AT A TIME
// ------------------------------------------------------------------------------
// RaceSession is the simulation context: it owns the physics backend, the
// controller, the lap tracker, the clock and the bus. Nothing is global, so
// several sessions can run side by side in one test.
//
// frame():
//   1) clock ticks (countdown / elapsed)
//   2) controller reads the pre-step VehicleState and actuates physics
//      (movement input is zeroed unless the clock is running)
//   3) physics steps
//   4) post-step recovery, then (once the clock runs) contacts -> lap
//      tracker -> barriers, coins, final score
//   5) camera follows the post-step pose
//   6) any wiring fault raised by a listener ends the frame with an error
// ==============================================================================

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use nalgebra::Vector3;

use crate::camera::{CameraRig, CameraState, ViewMode};
use crate::config::RaceConfig;
use crate::events::{Channel, EventBus, GameEvent, WiringError};
use crate::hud::{HudSnapshot, HudState};
use crate::physics::{PhysicsBackend, VehicleControl, VehicleState};
use crate::race::{LapTracker, LapUpdate, RaceClock};
use crate::track::{TrackDefinition, TrackError};
use crate::vehicle::VehicleController;

/// Pre-normalized input for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    /// x = steer (+ right), z = throttle sign (-1 forward).
    pub movement: Vector3<f32>,
    /// x = yaw, y = pitch, z = zoom or roll.
    pub look: Vector3<f32>,
}

impl FrameInput {
    pub fn drive(steer: f32, throttle: f32) -> Self {
        Self {
            movement: Vector3::new(steer, 0.0, -throttle),
            look: Vector3::zeros(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("event wiring defect: {0}")]
    Wiring(#[from] WiringError),
}

pub struct RaceSession<P: PhysicsBackend> {
    pub physics: P,
    controller: VehicleController,
    laps: LapTracker,
    clock: RaceClock,
    bus: EventBus,
    camera: Rc<RefCell<CameraRig>>,
    hud: Rc<RefCell<HudState>>,
    fault: Rc<RefCell<Option<WiringError>>>,
    frames: u64,
}

impl<P: PhysicsBackend> RaceSession<P> {
    pub fn new(config: &RaceConfig, track: &TrackDefinition, physics: P, now: Instant) -> Result<Self, TrackError> {
        let laps = LapTracker::new(track)?;
        let mut bus = EventBus::new();

        let camera = Rc::new(RefCell::new(CameraRig::new(config.camera.clone())));
        let fault: Rc<RefCell<Option<WiringError>>> = Rc::new(RefCell::new(None));
        bus.subscribe_many(&CameraRig::channels(), || {
            let camera = Rc::clone(&camera);
            let fault = Rc::clone(&fault);
            move |e: &GameEvent| {
                if let Err(err) = camera.borrow_mut().on_event(e) {
                    tracing::error!(%err, "camera listener rejected event");
                    fault.borrow_mut().get_or_insert(err);
                }
            }
        });
        let hud = HudState::attach(&mut bus);

        let mut session = Self {
            physics,
            controller: VehicleController::new(config.vehicle.clone(), config.physics.world_bound),
            laps,
            clock: RaceClock::new(config.clock.clone(), now),
            bus,
            camera,
            hud,
            fault,
            frames: 0,
        };
        session.place_at_start();

        tracing::info!(
            checkpoints = track.checkpoints.len(),
            coins = track.coins.len(),
            "race session ready"
        );
        Ok(session)
    }

    /// Register an extra consumer (audio, lights, ...).
    pub fn subscribe<F>(&mut self, channel: Channel, listener: F)
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.bus.subscribe(channel, listener);
    }

    pub fn frame(&mut self, input: FrameInput, now: Instant, dt: f32) -> Result<(), SessionError> {
        self.frames += 1;

        self.clock.update(now, &mut self.bus);

        let state = self.physics.vehicle_state();
        let movement = if self.clock.is_running() { input.movement } else { Vector3::zeros() };
        self.controller.update(
            movement,
            &state,
            self.laps.respawn_anchor(),
            dt,
            &mut self.physics,
            &mut self.bus,
        );

        self.physics.step(dt);

        let mut post = self.physics.vehicle_state();
        if self
            .controller
            .recover(&post, self.laps.respawn_anchor(), &mut self.physics, &mut self.bus)
        {
            post = self.physics.vehicle_state();
        }

        // a grid spot overlapping a checkpoint must not score before the start
        if self.clock.is_running() {
            let contacts = self.physics.query_contacts();
            let update = self.laps.handle_contacts(&contacts, &post, &mut self.bus);
            self.apply_lap_update(update);
        }

        self.camera.borrow_mut().update(input.look, &post, dt);

        match self.fault.borrow_mut().take() {
            Some(err) => Err(SessionError::Wiring(err)),
            None => Ok(()),
        }
    }

    /// Everything back to the starting grid in this frame.
    pub fn restart(&mut self, now: Instant) {
        self.laps.reset();
        self.controller.reset(&mut self.bus);
        self.physics.restore_coins();
        self.place_at_start();
        self.clock.start(now);
        self.bus.emit(&GameEvent::Reset);
        tracing::info!(frames = self.frames, "race restarted");
    }

    /// Flip between chase and cockpit view; the camera hears it on the bus.
    pub fn request_view_toggle(&mut self) -> ViewMode {
        let mode = self.camera.borrow().mode().toggled();
        self.bus.emit(&GameEvent::ViewChanged { mode });
        mode
    }

    pub fn hud(&self) -> HudSnapshot {
        self.hud.borrow().snapshot().clone()
    }

    pub fn camera(&self) -> CameraState {
        self.camera.borrow().state().clone()
    }

    pub fn camera_mode(&self) -> ViewMode {
        self.camera.borrow().mode()
    }

    pub fn vehicle_state(&self) -> VehicleState {
        self.physics.vehicle_state()
    }

    pub fn control(&self) -> &VehicleControl {
        self.controller.control()
    }

    pub fn controller(&self) -> &VehicleController {
        &self.controller
    }

    pub fn laps(&self) -> &LapTracker {
        &self.laps
    }

    pub fn clock(&self) -> &RaceClock {
        &self.clock
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn place_at_start(&mut self) {
        for (group, enabled) in self.laps.barrier_plan() {
            self.physics.set_barrier_enabled(group, enabled);
        }
        self.physics.teleport(self.laps.respawn_anchor());
    }

    fn apply_lap_update(&mut self, update: LapUpdate) {
        if let Some(plan) = update.barriers {
            for (group, enabled) in plan {
                self.physics.set_barrier_enabled(group, enabled);
            }
        }
        for id in update.coins_collected {
            self.physics.remove_coin(id);
        }
        if update.finished {
            self.clock.finish(self.laps.coins(), &mut self.bus);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Anchor, CollisionTag};
    use crate::track::BarrierGroup;
    use std::collections::HashMap;

    /// Backend that never moves and reports scripted contacts once.
    #[derive(Default)]
    struct Scripted {
        pose: Option<Anchor>,
        contacts: Vec<CollisionTag>,
        barriers: HashMap<BarrierGroup, bool>,
        removed: Vec<u32>,
        restored: bool,
    }

    impl PhysicsBackend for Scripted {
        fn step(&mut self, _dt: f32) {}
        fn vehicle_state(&self) -> VehicleState {
            let a = self.pose.unwrap_or(Anchor::from_spawn([0.0; 3], 0.0));
            VehicleState::at_rest(&a, 1200.0, 9.81)
        }
        fn apply_control(&mut self, _control: &VehicleControl) {}
        fn query_contacts(&self) -> Vec<CollisionTag> {
            self.contacts.clone()
        }
        fn teleport(&mut self, anchor: &Anchor) {
            self.pose = Some(*anchor);
        }
        fn set_velocities(&mut self, _l: Vector3<f32>, _a: Vector3<f32>) {}
        fn apply_frame_force(&mut self, _f: Vector3<f32>) {}
        fn apply_frame_torque(&mut self, _t: Vector3<f32>) {}
        fn set_barrier_enabled(&mut self, group: BarrierGroup, enabled: bool) {
            self.barriers.insert(group, enabled);
        }
        fn remove_coin(&mut self, id: u32) {
            self.removed.push(id);
        }
        fn restore_coins(&mut self) {
            self.restored = true;
        }
    }

    fn session_with_countdown(secs: u32, now: Instant) -> RaceSession<Scripted> {
        let mut config = RaceConfig::default();
        config.clock.countdown_secs = secs;
        RaceSession::new(&config, &TrackDefinition::oval(), Scripted::default(), now).unwrap()
    }

    fn session(now: Instant) -> RaceSession<Scripted> {
        session_with_countdown(0, now)
    }

    #[test]
    fn new_session_closes_lap_one_barriers_and_spawns() {
        let s = session(Instant::now());
        assert_eq!(s.physics.barriers[&BarrierGroup::InnerShortcut], true);
        assert_eq!(s.physics.barriers[&BarrierGroup::OuterOval], false);
        assert_eq!(s.physics.pose.unwrap().position.y, 1.2);
    }

    #[test]
    fn view_toggle_reaches_camera_through_bus() {
        let mut s = session(Instant::now());
        assert_eq!(s.request_view_toggle(), ViewMode::FirstPerson);
        assert_eq!(s.camera_mode(), ViewMode::FirstPerson);
        assert_eq!(s.hud().view, ViewMode::FirstPerson);
        s.request_view_toggle();
        assert_eq!(s.camera_mode(), ViewMode::ThirdPerson);
    }

    #[test]
    fn miswired_camera_fails_the_frame() {
        let t0 = Instant::now();
        let mut s = session(t0);
        let camera = Rc::clone(&s.camera);
        let fault = Rc::clone(&s.fault);
        s.subscribe(Channel::Lap, move |e| {
            if let Err(err) = camera.borrow_mut().on_event(e) {
                fault.borrow_mut().get_or_insert(err);
            }
        });
        s.physics.contacts = ["c1", "c2", "c3", "c4", "final"]
            .iter()
            .map(|id| CollisionTag::Checkpoint((*id).into()))
            .collect();

        let err = s.frame(FrameInput::default(), t0, 1.0 / 60.0).unwrap_err();
        assert!(matches!(err, SessionError::Wiring(_)));
    }

    #[test]
    fn checkpoints_wait_for_the_start() {
        let t0 = Instant::now();
        let mut s = session_with_countdown(3, t0);
        s.physics.contacts = vec![CollisionTag::Checkpoint("c1".into()), CollisionTag::Coin(1)];

        s.frame(FrameInput::default(), t0, 1.0 / 60.0).unwrap();
        assert!(s.laps().find_checkpoint(&"c1".into()).is_some_and(|c| !c.hit));
        assert!(s.physics.removed.is_empty());

        s.frame(FrameInput::default(), t0 + std::time::Duration::from_secs(3), 1.0 / 60.0).unwrap();
        assert!(s.laps().find_checkpoint(&"c1".into()).is_some_and(|c| c.hit));
        assert_eq!(s.physics.removed, vec![1]);
    }

    #[test]
    fn coins_are_removed_and_restored_on_restart() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.physics.contacts = vec![CollisionTag::Coin(2)];
        s.frame(FrameInput::default(), t0, 1.0 / 60.0).unwrap();
        assert_eq!(s.physics.removed, vec![2]);
        assert_eq!(s.hud().coins, 1);

        s.physics.contacts.clear();
        s.restart(t0);
        assert!(s.physics.restored);
        assert_eq!(s.laps().coins(), 0);
        assert_eq!(s.hud().coins, 0);
    }
}
