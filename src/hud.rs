//! HUD-side view of the race, folded from bus events.
//!
//! This is the reference consumer of the bus: it never reads core state
//! directly, only what was announced.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::camera::ViewMode;
use crate::events::{Channel, EventBus, GameEvent};
use crate::track::CheckpointId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HudSnapshot {
    pub speed_kmh: u32,
    pub braking: bool,
    pub reversing: bool,
    pub lap: u8,
    pub coins: u32,
    /// Seconds left before the start; `None` once racing.
    pub countdown: Option<u32>,
    pub elapsed_secs: u32,
    pub score: Option<u32>,
    pub last_checkpoint: Option<CheckpointId>,
    pub respawns: u32,
    pub view: ViewMode,
}

impl Default for HudSnapshot {
    fn default() -> Self {
        Self {
            speed_kmh: 0,
            braking: false,
            reversing: false,
            lap: 1,
            coins: 0,
            countdown: None,
            elapsed_secs: 0,
            score: None,
            last_checkpoint: None,
            respawns: 0,
            view: ViewMode::ThirdPerson,
        }
    }
}

#[derive(Debug, Default)]
pub struct HudState {
    snapshot: HudSnapshot,
}

impl HudState {
    pub const CHANNELS: [Channel; 11] = [
        Channel::Speed,
        Channel::Brake,
        Channel::Reverse,
        Channel::Lap,
        Channel::Checkpoint,
        Channel::Coins,
        Channel::Countdown,
        Channel::Clock,
        Channel::Score,
        Channel::View,
        Channel::Control,
    ];

    /// Subscribe a fresh HUD to every channel on `bus`.
    pub fn attach(bus: &mut EventBus) -> Rc<RefCell<HudState>> {
        let hud = Rc::new(RefCell::new(HudState::default()));
        bus.subscribe_many(&Self::CHANNELS, || {
            let hud = Rc::clone(&hud);
            move |e: &GameEvent| hud.borrow_mut().apply(e)
        });
        hud
    }

    pub fn snapshot(&self) -> &HudSnapshot {
        &self.snapshot
    }

    pub fn apply(&mut self, event: &GameEvent) {
        let s = &mut self.snapshot;
        match event {
            GameEvent::SpeedChanged { kmh } => s.speed_kmh = *kmh,
            GameEvent::BrakeActive { active } => s.braking = *active,
            GameEvent::ReverseActive { active } => s.reversing = *active,
            GameEvent::LapChanged { lap } => s.lap = *lap,
            GameEvent::CheckpointHit { id } => s.last_checkpoint = Some(id.clone()),
            GameEvent::CoinsChanged { coins } => s.coins = *coins,
            GameEvent::Countdown { remaining } => s.countdown = Some(*remaining),
            GameEvent::RaceStarted => s.countdown = None,
            GameEvent::TimeElapsed { seconds } => s.elapsed_secs = *seconds,
            GameEvent::Score { score } => s.score = Some(*score),
            GameEvent::Respawned { .. } => s.respawns += 1,
            GameEvent::ViewChanged { mode } => s.view = *mode,
            GameEvent::Reset => {
                let view = s.view;
                *s = HudSnapshot { view, ..HudSnapshot::default() };
            }
        }
    }
}
