// ==============================================================================
// camera.rs — CHASE / COCKPIT CAMERA RIG
// ------------------------------------------------------------------------------
// Two parameter sets, one per ViewMode, each clamped to its own ranges after
// every update. Switching modes is driven from the bus (ViewChanged) and
// re-initializes the target mode to its defaults.
//
// Third person:
//   target  = vehicle + Ry(vehicle_yaw) * target_offset
//   eye     = target + Ry(vehicle_yaw) Ry(yaw) Rx(-pitch) Rz(roll) * (0, 0, distance)
//   damped toward eye with 1 - exp(-k dt), snapping on the first frame
//   view    = look_at(eye, target)
//
// First person:
//   eye     = vehicle + vehicle_rotation * seat_offset
//   dir     = Ry(vehicle_yaw + yaw) Rx(pitch) * -Z
//   roll    = vehicle roll + look roll, hard-clamped to the first-person range
//   view    = look_in_direction(eye, dir)
//
// view_projection = perspective(fov, aspect, near, far) * view
// ==============================================================================

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::{CameraConfig, Range, ViewLimits};
use crate::events::{Channel, GameEvent, WiringError};
use crate::physics::VehicleState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    ThirdPerson,
    FirstPerson,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::ThirdPerson => ViewMode::FirstPerson,
            ViewMode::FirstPerson => ViewMode::ThirdPerson,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewAngles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub distance: f32,
}

impl ViewAngles {
    fn defaults(limits: &ViewLimits) -> Self {
        Self {
            pitch: limits.pitch.clamp(limits.default_pitch),
            yaw: limits.yaw.clamp(limits.default_yaw),
            roll: limits.roll.clamp(limits.default_roll),
            distance: limits.distance.clamp(limits.default_distance),
        }
    }

    fn clamp_to(&mut self, limits: &ViewLimits) {
        self.pitch = limits.pitch.clamp(self.pitch);
        self.yaw = limits.yaw.clamp(self.yaw);
        self.roll = limits.roll.clamp(self.roll);
        self.distance = limits.distance.clamp(self.distance);
    }
}

/// What the renderer reads each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub mode: ViewMode,
    pub angles: ViewAngles,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub view_projection: Matrix4<f32>,
}

pub struct CameraRig {
    pub config: CameraConfig,
    mode: ViewMode,
    third: ViewAngles,
    first: ViewAngles,
    damped: Option<Point3<f32>>,
    state: CameraState,
}

impl CameraRig {
    pub fn new(config: CameraConfig) -> Self {
        let projection = Matrix4::new_perspective(config.aspect, config.fov_y, config.z_near, config.z_far);
        let third = ViewAngles::defaults(&config.third_person);
        let first = ViewAngles::defaults(&config.first_person);
        Self {
            mode: ViewMode::ThirdPerson,
            third,
            first,
            damped: None,
            state: CameraState {
                mode: ViewMode::ThirdPerson,
                angles: third,
                position: Point3::origin(),
                target: Point3::origin(),
                view: Matrix4::identity(),
                projection,
                view_projection: projection,
            },
            config,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    /// Chase position after damping; `None` before the first update.
    pub fn damped_position(&self) -> Option<Point3<f32>> {
        self.damped
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        match mode {
            ViewMode::ThirdPerson => self.third = ViewAngles::defaults(&self.config.third_person),
            ViewMode::FirstPerson => self.first = ViewAngles::defaults(&self.config.first_person),
        }
        self.mode = mode;
        self.damped = None;
        tracing::debug!(?mode, "camera mode set");
    }

    pub fn toggle_mode(&mut self) -> ViewMode {
        let mode = self.mode.toggled();
        self.set_mode(mode);
        mode
    }

    /// Both modes back to defaults, chase snaps on the next update.
    pub fn reset(&mut self) {
        self.third = ViewAngles::defaults(&self.config.third_person);
        self.first = ViewAngles::defaults(&self.config.first_person);
        self.damped = None;
    }

    pub fn on_event(&mut self, event: &GameEvent) -> Result<(), WiringError> {
        match event {
            GameEvent::ViewChanged { mode } => self.set_mode(*mode),
            GameEvent::Reset => self.reset(),
            GameEvent::Respawned { .. } => self.damped = None,
            other if Self::channels().contains(&other.channel()) => {
                tracing::debug!(?other, "camera ignores event");
            }
            other => {
                return Err(WiringError::UnexpectedChannel {
                    component: "camera",
                    channel: other.channel(),
                    event: other.clone(),
                })
            }
        }
        Ok(())
    }

    /// Channels the rig listens on.
    pub fn channels() -> [Channel; 2] {
        [Channel::View, Channel::Control]
    }

    /// `look`: x = yaw, y = pitch, z = zoom (third person) or roll (first person).
    pub fn update(&mut self, look: Vector3<f32>, vehicle: &VehicleState, dt: f32) -> &CameraState {
        // never feed a broken pose into the matrices
        let finite = vehicle.position.coords.iter().all(|v| v.is_finite())
            && vehicle.orientation.coords.iter().all(|v| v.is_finite());
        if !finite {
            return &self.state;
        }

        let rot = self.config.rotation_speed * dt;
        let limits = match self.mode {
            ViewMode::ThirdPerson => &self.config.third_person,
            ViewMode::FirstPerson => &self.config.first_person,
        };
        let angles = match self.mode {
            ViewMode::ThirdPerson => &mut self.third,
            ViewMode::FirstPerson => &mut self.first,
        };

        angles.yaw += look.x * rot;
        angles.pitch += look.y * rot;
        match self.mode {
            ViewMode::ThirdPerson => angles.distance += look.z * self.config.zoom_speed * dt,
            ViewMode::FirstPerson => angles.roll += look.z * rot,
        }
        angles.clamp_to(limits);
        let angles = *angles;
        let roll_range = limits.roll;

        let heading = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), vehicle.yaw());
        let (position, target, view) = match self.mode {
            ViewMode::ThirdPerson => self.third_person(vehicle, heading, angles, dt),
            ViewMode::FirstPerson => self.first_person(vehicle, heading, angles, roll_range),
        };

        self.state.mode = self.mode;
        self.state.angles = angles;
        self.state.position = position;
        self.state.target = target;
        self.state.view = view;
        self.state.view_projection = self.state.projection * view;
        &self.state
    }

    fn third_person(
        &mut self,
        vehicle: &VehicleState,
        heading: UnitQuaternion<f32>,
        a: ViewAngles,
        dt: f32,
    ) -> (Point3<f32>, Point3<f32>, Matrix4<f32>) {
        let target = vehicle.position + heading * Vector3::from(self.config.chase_target_offset);

        let orbit = heading
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), a.yaw)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -a.pitch)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), a.roll);
        let desired = target + orbit * Vector3::new(0.0, 0.0, a.distance);

        let eye = match self.damped {
            None => desired,
            Some(prev) => {
                let k = 1.0 - (-self.config.chase_damping * dt).exp();
                prev + (desired - prev) * k
            }
        };
        self.damped = Some(eye);

        let up = orbit * Vector3::y();
        (eye, target, Matrix4::look_at_rh(&eye, &target, &up))
    }

    fn first_person(
        &self,
        vehicle: &VehicleState,
        heading: UnitQuaternion<f32>,
        a: ViewAngles,
        roll_range: Range,
    ) -> (Point3<f32>, Point3<f32>, Matrix4<f32>) {
        let eye = vehicle.position + vehicle.orientation * Vector3::from(self.config.seat_offset);

        let look = heading
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), a.yaw)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), a.pitch);
        let roll = roll_range.clamp(vehicle.roll() + a.roll);
        let look = look * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), roll);

        let dir = look * -Vector3::z();
        let up = look * Vector3::y();
        let target = eye + dir;
        (eye, target, Matrix4::look_at_rh(&eye, &target, &up))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Anchor;

    const DT: f32 = 1.0 / 60.0;

    fn vehicle() -> VehicleState {
        VehicleState::at_rest(&Anchor::from_spawn([10.0, 1.0, -5.0], 0.3), 1200.0, 9.81)
    }

    #[test]
    fn third_person_angles_stay_in_range_for_any_input() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let limits = rig.config.third_person.clone();
        let v = vehicle();

        for i in 0..400 {
            let s = if i < 200 { 50.0 } else { -80.0 };
            let a = rig.update(Vector3::new(s, s, -s), &v, DT).angles;
            assert!(limits.pitch.contains(a.pitch));
            assert!(limits.yaw.contains(a.yaw));
            assert!(limits.distance.contains(a.distance));
        }
    }

    #[test]
    fn chase_camera_reaches_steady_state() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let v = vehicle();

        rig.update(Vector3::zeros(), &v, DT);
        let first = rig.damped_position().unwrap();
        for _ in 0..10 {
            rig.update(Vector3::zeros(), &v, DT);
            assert_eq!(rig.damped_position(), Some(first));
        }
    }

    #[test]
    fn chase_camera_sits_behind_and_above() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let v = VehicleState::at_rest(&Anchor::from_spawn([0.0, 1.0, 0.0], 0.0), 1200.0, 9.81);
        let s = rig.update(Vector3::zeros(), &v, DT);
        // forward is -Z, so behind is +Z
        assert!(s.position.z > 0.0);
        assert!(s.position.y > s.target.y);
        let d = (s.position - s.target).magnitude();
        assert!((d - 7.0).abs() < 1e-4);
    }

    #[test]
    fn damping_lags_a_moving_car() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let mut v = vehicle();
        rig.update(Vector3::zeros(), &v, DT);
        let before = rig.damped_position().unwrap();

        v.position.x += 5.0;
        rig.update(Vector3::zeros(), &v, DT);
        let moved = rig.damped_position().unwrap().x - before.x;
        assert!(moved > 0.0 && moved < 5.0);
    }

    #[test]
    fn first_person_roll_is_hard_clamped() {
        let mut rig = CameraRig::new(CameraConfig::default());
        rig.set_mode(ViewMode::FirstPerson);
        let mut v = vehicle();
        v.orientation = v.orientation * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.6);

        for _ in 0..100 {
            let a = rig.update(Vector3::new(0.0, 0.0, 1.0), &v, DT).angles;
            assert!(a.roll.abs() <= 0.005);
            assert_eq!(a.distance, 0.0);
        }
    }

    #[test]
    fn view_change_event_reinitializes_target_mode() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let v = vehicle();
        for _ in 0..30 {
            rig.update(Vector3::new(1.0, 1.0, 1.0), &v, DT);
        }
        assert_ne!(rig.state().angles.distance, 7.0);

        rig.on_event(&GameEvent::ViewChanged { mode: ViewMode::FirstPerson }).unwrap();
        rig.on_event(&GameEvent::ViewChanged { mode: ViewMode::ThirdPerson }).unwrap();
        let a = rig.update(Vector3::zeros(), &v, DT).angles;
        assert_eq!(a.distance, 7.0);
        assert_eq!(a.pitch, 0.25);
    }

    #[test]
    fn foreign_events_are_a_wiring_error() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let err = rig.on_event(&GameEvent::Score { score: 1 }).unwrap_err();
        assert!(matches!(
            err,
            WiringError::UnexpectedChannel { channel: Channel::Score, .. }
        ));
    }

    #[test]
    fn unhandled_events_on_own_channels_are_ignored() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let before = rig.update(Vector3::zeros(), &vehicle(), DT).clone();
        let damped = rig.damped_position();

        assert_eq!(GameEvent::RaceStarted.channel(), Channel::Control);
        assert!(rig.on_event(&GameEvent::RaceStarted).is_ok());
        assert_eq!(rig.mode(), ViewMode::ThirdPerson);
        assert_eq!(rig.damped_position(), damped);
        assert_eq!(rig.state(), &before);
    }

    #[test]
    fn nan_pose_keeps_previous_camera() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let mut v = vehicle();
        let good = rig.update(Vector3::zeros(), &v, DT).clone();
        v.position.x = f32::NAN;
        assert_eq!(rig.update(Vector3::zeros(), &v, DT), &good);
    }

    #[test]
    fn view_projection_is_projection_times_view() {
        let mut rig = CameraRig::new(CameraConfig::default());
        let s = rig.update(Vector3::zeros(), &vehicle(), DT).clone();
        assert_eq!(s.view_projection, s.projection * s.view);
    }
}
