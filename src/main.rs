use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use tokio::time::{interval, Duration, MissedTickBehavior};

use race_core::physics::{Anchor, RapierPhysics};
use race_core::race::ClockPhase;
use race_core::session::{FrameInput, RaceSession};
use race_core::{logging, RaceConfig, TrackDefinition, VehicleState};

const FRAME_DT: f32 = 1.0 / 60.0;
const DEFAULT_RUN_SECS: u64 = 120;

/// Aim for the next checkpoint: steer by heading error, ease off in tight turns.
fn autopilot(state: &VehicleState, target: Option<[f32; 3]>) -> FrameInput {
    let Some([tx, _, tz]) = target else {
        return FrameInput::default();
    };
    let dx = tx - state.position.x;
    let dz = tz - state.position.z;
    let desired = (-dx).atan2(-dz);

    let mut err = desired - state.yaw();
    while err > std::f32::consts::PI {
        err -= std::f32::consts::TAU;
    }
    while err < -std::f32::consts::PI {
        err += std::f32::consts::TAU;
    }

    // positive error is a left turn, positive steer input is right
    let steer = (-2.0 * err).clamp(-1.0, 1.0);
    let throttle = if err.abs() > 1.0 { 0.4 } else { 1.0 };
    FrameInput::drive(steer, throttle)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next().map(PathBuf::from) {
        Some(path) => RaceConfig::load(&path).with_context(|| format!("loading config {}", path.display()))?,
        None => RaceConfig::default(),
    };
    let track = match args.next().map(PathBuf::from) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading track {}", path.display()))?;
            serde_json::from_str::<TrackDefinition>(&raw).with_context(|| format!("parsing track {}", path.display()))?
        }
        None => TrackDefinition::oval(),
    };
    let run_secs = std::env::var("RACE_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RUN_SECS);

    tracing::info!(run_secs, "starting race core");

    let spawn = Anchor::from_spawn(track.spawn.position, track.spawn.yaw);
    let physics = RapierPhysics::new(config.physics.clone(), &track, &spawn, config.vehicle.chassis_probe_length);
    let mut session = RaceSession::new(&config, &track, physics, Instant::now()).context("building race session")?;

    // Fixed timestep: ~60 Hz
    let mut ticker = interval(Duration::from_millis(16));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = Instant::now() + Duration::from_secs(run_secs);

    loop {
        ticker.tick().await;
        let now = Instant::now();

        let state = session.vehicle_state();
        let target = session
            .laps()
            .next_checkpoint()
            .and_then(|id| session.laps().find_checkpoint(id))
            .map(|cp| cp.center.coords.into());
        let input = autopilot(&state, target);

        session.frame(input, now, FRAME_DT).context("frame failed")?;

        if session.frames() % 60 == 0 {
            let hud = serde_json::to_string(&session.hud())?;
            tracing::info!(frame = session.frames(), %hud, "hud");
        }

        if session.clock().phase() == ClockPhase::Finished {
            tracing::info!(score = ?session.clock().score(), "race complete");
            break;
        }
        if now >= deadline {
            tracing::info!(lap = session.laps().current_lap(), "run time over");
            break;
        }
    }

    Ok(())
}
