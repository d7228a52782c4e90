//! Simulation core of a racing game.
//!
//! A frame turns input into vehicle actuation, steps the rigid-body world,
//! advances checkpoint and lap progress from contacts, and moves the camera.
//! Everything the outside world reacts to (HUD, audio, lights) is announced
//! on the [`events::EventBus`].

pub mod camera;
pub mod config;
pub mod events;
pub mod hud;
pub mod logging;
pub mod physics;
pub mod race;
pub mod session;
pub mod track;
pub mod vehicle;

pub use camera::{CameraRig, CameraState, ViewMode};
pub use config::{ConfigError, RaceConfig};
pub use events::{Channel, EventBus, GameEvent, WiringError};
pub use hud::HudSnapshot;
pub use physics::{Anchor, CollisionTag, PhysicsBackend, RapierPhysics, VehicleControl, VehicleState};
pub use session::{FrameInput, RaceSession, SessionError};
pub use track::{TrackDefinition, TrackError};
