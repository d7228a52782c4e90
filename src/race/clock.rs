//! Countdown, then elapsed time, then a frozen final score.
//!
//! Ticks come from a monotonic [`Instant`] supplied by the caller, never from
//! simulation time, so a slow frame cannot stretch the countdown.

use std::time::{Duration, Instant};

use crate::config::ClockConfig;
use crate::events::{EventBus, GameEvent};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    /// Seconds left before the start.
    Countdown(u32),
    Running,
    Finished,
}

/// Remaining budget plus coins, floored at zero before the coins are added.
pub fn final_score(time_budget_secs: u32, elapsed_secs: u32, coins: u32) -> u32 {
    time_budget_secs.saturating_sub(elapsed_secs) + coins
}

#[derive(Debug, Clone)]
pub struct RaceClock {
    config: ClockConfig,
    phase: ClockPhase,
    next_tick: Instant,
    elapsed_secs: u32,
    score: Option<u32>,
    announced: bool,
}

impl RaceClock {
    pub fn new(config: ClockConfig, now: Instant) -> Self {
        let mut clock = Self {
            phase: ClockPhase::Countdown(config.countdown_secs),
            config,
            next_tick: now,
            elapsed_secs: 0,
            score: None,
            announced: false,
        };
        clock.start(now);
        clock
    }

    /// (Re)start the countdown from the configured length.
    pub fn start(&mut self, now: Instant) {
        self.phase = ClockPhase::Countdown(self.config.countdown_secs);
        self.next_tick = now + TICK;
        self.elapsed_secs = 0;
        self.score = None;
        self.announced = false;
        tracing::info!(countdown = self.config.countdown_secs, "race clock started");
    }

    pub fn phase(&self) -> ClockPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == ClockPhase::Running
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn score(&self) -> Option<u32> {
        self.score
    }

    /// Consume every whole second that passed up to `now`.
    pub fn update(&mut self, now: Instant, bus: &mut EventBus) {
        if let ClockPhase::Countdown(n) = self.phase {
            if !self.announced {
                self.announced = true;
                if n > 0 {
                    bus.emit(&GameEvent::Countdown { remaining: n });
                }
            }
        }

        loop {
            match self.phase {
                ClockPhase::Countdown(0) => {
                    self.phase = ClockPhase::Running;
                    tracing::info!("race started");
                    bus.emit(&GameEvent::RaceStarted);
                }
                ClockPhase::Countdown(n) if now >= self.next_tick => {
                    self.next_tick += TICK;
                    self.phase = ClockPhase::Countdown(n - 1);
                    if n > 1 {
                        bus.emit(&GameEvent::Countdown { remaining: n - 1 });
                    }
                }
                ClockPhase::Running if now >= self.next_tick => {
                    self.next_tick += TICK;
                    self.elapsed_secs += 1;
                    bus.emit(&GameEvent::TimeElapsed { seconds: self.elapsed_secs });
                }
                _ => break,
            }
        }
    }

    /// Stop the clock and emit the final score. Only the first call scores.
    pub fn finish(&mut self, coins: u32, bus: &mut EventBus) -> Option<u32> {
        if self.phase == ClockPhase::Finished {
            return None;
        }
        let score = final_score(self.config.time_budget_secs, self.elapsed_secs, coins);
        self.phase = ClockPhase::Finished;
        self.score = Some(score);

        tracing::info!(score, elapsed = self.elapsed_secs, coins, "race finished");
        bus.emit(&GameEvent::Score { score });
        Some(score)
    }
}
