// ==============================================================================
// events.rs — TYPED EVENT BUS (IN-FRAME FAN-OUT)
// ------------------------------------------------------------------------------
// Named channels, each with an ordered list of listeners registered at setup.
// emit() runs every listener of the event's channel synchronously, in
// registration order, on the calling thread. Nothing is queued or replayed.
//
// Payloads are a tagged union (GameEvent); every variant routes to exactly one
// Channel, so a listener subscribed to a channel only ever sees the variants
// that belong to it unless it was wired to the wrong channel.
// ==============================================================================

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::camera::ViewMode;
use crate::track::CheckpointId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Speed,
    Brake,
    Reverse,
    Lap,
    Checkpoint,
    Coins,
    Countdown,
    Clock,
    Score,
    View,
    Control,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Speed => "speed",
            Channel::Brake => "brake",
            Channel::Reverse => "reverse",
            Channel::Lap => "lap",
            Channel::Checkpoint => "checkpoint",
            Channel::Coins => "coins",
            Channel::Countdown => "countdown",
            Channel::Clock => "clock",
            Channel::Score => "score",
            Channel::View => "view",
            Channel::Control => "control",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the core announces to HUD, audio, lights and the camera.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Displayed speed in whole km/h; only sent when the integer changes.
    SpeedChanged { kmh: u32 },
    BrakeActive { active: bool },
    ReverseActive { active: bool },
    /// 1, 2, or 0 once the race is finished.
    LapChanged { lap: u8 },
    CheckpointHit { id: CheckpointId },
    CoinsChanged { coins: u32 },
    Countdown { remaining: u32 },
    RaceStarted,
    TimeElapsed { seconds: u32 },
    Score { score: u32 },
    Respawned { position: [f32; 3] },
    ViewChanged { mode: ViewMode },
    Reset,
}

impl GameEvent {
    pub fn channel(&self) -> Channel {
        match self {
            GameEvent::SpeedChanged { .. } => Channel::Speed,
            GameEvent::BrakeActive { .. } => Channel::Brake,
            GameEvent::ReverseActive { .. } => Channel::Reverse,
            GameEvent::LapChanged { .. } => Channel::Lap,
            GameEvent::CheckpointHit { .. } => Channel::Checkpoint,
            GameEvent::CoinsChanged { .. } => Channel::Coins,
            GameEvent::Countdown { .. } => Channel::Countdown,
            GameEvent::TimeElapsed { .. } => Channel::Clock,
            GameEvent::Score { .. } => Channel::Score,
            GameEvent::RaceStarted | GameEvent::Respawned { .. } | GameEvent::Reset => Channel::Control,
            GameEvent::ViewChanged { .. } => Channel::View,
        }
    }
}

/// A component was handed an event from a channel it never subscribed to.
/// That is a setup defect, not a runtime condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WiringError {
    #[error("{component} received {event:?} on channel {channel}, which it does not own")]
    UnexpectedChannel {
        component: &'static str,
        channel: Channel,
        event: GameEvent,
    },
}

pub type Listener = Box<dyn FnMut(&GameEvent)>;

#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<Channel, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, channel: Channel, listener: F)
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.listeners
            .entry(channel)
            .or_default()
            .push(Box::new(listener));
    }

    /// Subscribe the same listener factory to several channels.
    pub fn subscribe_many<F>(&mut self, channels: &[Channel], mut make: impl FnMut() -> F)
    where
        F: FnMut(&GameEvent) + 'static,
    {
        for &channel in channels {
            self.subscribe(channel, make());
        }
    }

    pub fn emit(&mut self, event: &GameEvent) {
        let channel = event.channel();
        tracing::trace!(%channel, ?event, "emit");

        if let Some(listeners) = self.listeners.get_mut(&channel) {
            for listener in listeners.iter_mut() {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        self.listeners.get(&channel).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(Channel, usize)> = self
            .listeners
            .iter()
            .map(|(c, l)| (*c, l.len()))
            .collect();
        counts.sort_by_key(|(c, _)| c.as_str());
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
