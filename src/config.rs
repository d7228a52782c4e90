//! Tuning and runtime configuration.
//!
//! Every value has a default, so a TOML file only needs the keys it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub vehicle: VehicleTuning,
    pub camera: CameraConfig,
    pub physics: PhysicsConfig,
    pub clock: ClockConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleTuning {
    pub engine_force: f32,          // N, rear pair
    pub brake_force: f32,           // N
    pub holding_brake: f32,         // N, applied while stopped with no input
    pub reverse_ratio: f32,         // share of engine force when reversing
    pub coast_ratio: f32,           // engine braking at max speed, share of engine force
    pub max_speed: f32,             // m/s
    pub stop_threshold: f32,        // m/s, direction may flip below this
    pub speed_noise_floor: f32,     // m/s, reported as exactly 0

    pub max_steering: f32,          // rad
    pub steering_increment: f32,    // rad/s at low speed
    pub min_steering_increment: f32,
    pub max_steering_increment: f32,
    pub degrade_threshold: f32,     // m/s
    pub degrade_exponent: f32,

    pub stuck_speed_min: f32,       // m/s
    pub stuck_speed_max: f32,       // m/s
    pub stuck_frames: u32,
    pub stuck_bonus_per_frame: f32, // N per frame past stuck_frames

    pub air_max_angvel: f32,        // rad/s
    pub air_level_torque: f32,      // N*m per unit tilt

    pub fall_floor: f32,            // m, world y
    pub chassis_probe_length: f32,  // m
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self {
            engine_force: 6000.0,
            brake_force: 9000.0,
            holding_brake: 4000.0,
            reverse_ratio: 0.5,
            coast_ratio: 0.15,
            max_speed: 50.52,
            stop_threshold: 0.5,
            speed_noise_floor: 0.1,

            max_steering: 0.5,
            steering_increment: 1.2,
            min_steering_increment: 0.15,
            max_steering_increment: 2.0,
            degrade_threshold: 10.0,
            degrade_exponent: 1.5,

            stuck_speed_min: 0.0,
            stuck_speed_max: 1.0,
            stuck_frames: 30,
            stuck_bonus_per_frame: 150.0,

            air_max_angvel: 3.0,
            air_level_torque: 900.0,

            fall_floor: -10.0,
            chassis_probe_length: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }

    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Limits and defaults for one camera mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewLimits {
    pub default_pitch: f32,
    pub default_yaw: f32,
    pub default_roll: f32,
    pub default_distance: f32,
    pub pitch: Range,
    pub yaw: Range,
    pub roll: Range,
    pub distance: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y: f32, // rad
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub rotation_speed: f32, // rad/s per unit look input
    pub zoom_speed: f32,     // m/s per unit look input
    pub chase_damping: f32,  // 1/s
    pub chase_target_offset: [f32; 3],
    pub seat_offset: [f32; 3],
    pub third_person: ViewLimits,
    pub first_person: ViewLimits,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            z_near: 0.1,
            z_far: 1000.0,
            rotation_speed: 1.5,
            zoom_speed: 6.0,
            chase_damping: 8.0,
            chase_target_offset: [0.0, 1.2, 0.0],
            seat_offset: [-0.35, 0.55, -0.2],
            third_person: ViewLimits {
                pitch: Range::new(-0.1, 1.2),
                yaw: Range::new(-std::f32::consts::PI, std::f32::consts::PI),
                roll: Range::new(-0.3, 0.3),
                distance: Range::new(3.0, 15.0),
                default_pitch: 0.25,
                default_yaw: 0.0,
                default_roll: 0.0,
                default_distance: 7.0,
            },
            first_person: ViewLimits {
                pitch: Range::new(-0.5, 0.5),
                yaw: Range::new(-1.3, 1.3),
                roll: Range::new(-0.005, 0.005),
                distance: Range::new(0.0, 0.0),
                default_pitch: 0.0,
                default_yaw: 0.0,
                default_roll: 0.0,
                default_distance: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: f32,            // m/s^2, downward
    pub fixed_dt: f32,           // s
    pub max_substeps: u32,
    pub world_bound: f32,        // m, any coordinate beyond is unstable

    pub chassis_mass: f32,       // kg
    pub chassis_half_extents: [f32; 3],
    pub chassis_com_offset: [f32; 3],
    pub linear_damping: f32,
    pub angular_damping: f32,

    pub wheelbase: f32,          // m
    pub track_width: f32,        // m
    pub ackermann: f32,          // 0 = parallel, 1 = full ackermann
    pub wheel_radius: f32,       // m
    pub suspension_rest: f32,    // m
    pub suspension_travel: f32,  // m
    pub suspension_sag: f32,     // m, static compression
    pub suspension_zeta: f32,    // damping ratio
    pub lateral_grip: f32,       // friction coefficient
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            fixed_dt: 1.0 / 120.0,
            max_substeps: 60,
            world_bound: 1000.0,

            chassis_mass: 1200.0,
            chassis_half_extents: [0.9, 0.35, 2.0],
            chassis_com_offset: [0.0, -0.15, 0.0],
            linear_damping: 0.05,
            angular_damping: 0.6,

            wheelbase: 3.0,
            track_width: 1.6,
            ackermann: 0.8,
            wheel_radius: 0.35,
            suspension_rest: 0.5,
            suspension_travel: 0.4,
            suspension_sag: 0.08,
            suspension_zeta: 0.9,
            lateral_grip: 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub countdown_secs: u32,
    pub time_budget_secs: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            time_budget_secs: 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl RaceConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RaceConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.vehicle;
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if v.engine_force <= 0.0 || v.brake_force <= 0.0 {
            return invalid("engine_force and brake_force must be positive");
        }
        if v.max_speed <= v.degrade_threshold {
            return invalid("max_speed must exceed degrade_threshold");
        }
        if v.stop_threshold <= 0.0 || v.stop_threshold >= v.max_speed {
            return invalid("stop_threshold must lie in (0, max_speed)");
        }
        if v.max_steering <= 0.0 {
            return invalid("max_steering must be positive");
        }
        if v.min_steering_increment > v.max_steering_increment {
            return invalid("min_steering_increment exceeds max_steering_increment");
        }
        if v.stuck_speed_min > v.stuck_speed_max {
            return invalid("stuck speed band is inverted");
        }

        for (name, limits) in [
            ("third_person", &self.camera.third_person),
            ("first_person", &self.camera.first_person),
        ] {
            for range in [limits.pitch, limits.yaw, limits.roll, limits.distance] {
                if range.min > range.max {
                    return Err(ConfigError::Invalid(format!("{name} has an inverted range")));
                }
            }
        }

        let p = &self.physics;
        if p.fixed_dt <= 0.0 || p.max_substeps == 0 {
            return invalid("fixed_dt and max_substeps must be positive");
        }
        if p.chassis_mass <= 0.0 || p.wheel_radius <= 0.0 {
            return invalid("chassis_mass and wheel_radius must be positive");
        }

        Ok(())
    }
}
