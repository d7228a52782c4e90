//! Race progress: checkpoints and laps, and the race clock.

pub mod clock;
pub mod lap;

pub use clock::{final_score, ClockPhase, RaceClock};
pub use lap::{Checkpoint, LapTracker, LapUpdate, LAP_FINISHED};
