// ==============================================================================
// lap.rs — CHECKPOINT & LAP STATE MACHINE
// ------------------------------------------------------------------------------
// Lap counter is cyclic 1 -> 2 -> 0, where 0 means finished.
//
// A contact with the checkpoint whose id equals `next`, while that checkpoint
// is enabled and not yet hit, marks it hit, moves the respawn anchor to its
// center (keeping the car's current orientation) and advances `next` to the
// first un-hit checkpoint of the active sequence. All hit -> lap advances:
// the new lap's checkpoints are cleared, only they are enabled, barriers are
// reconfigured, and `next` restarts at the head of the new sequence.
//
// Everything else in a contact list is ignored, and repeated contacts in the
// same or later frames are no-ops.
// ==============================================================================

use std::collections::HashSet;

use crate::events::{EventBus, GameEvent};
use crate::physics::{Anchor, CollisionTag, VehicleState};
use crate::track::{BarrierGroup, CheckpointDef, CheckpointId, LapRoute, TrackDefinition, TrackError};

use nalgebra::Point3;

pub const LAP_FINISHED: u8 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub center: Point3<f32>,
    pub half_extents: [f32; 3],
    pub hit: bool,
    pub enabled: bool,
}

impl From<&CheckpointDef> for Checkpoint {
    fn from(def: &CheckpointDef) -> Self {
        Self {
            id: def.id.clone(),
            center: Point3::from(def.center),
            half_extents: def.half_extents,
            hit: false,
            enabled: false,
        }
    }
}

/// What the session must push back into physics after contact handling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LapUpdate {
    /// Set on lap entry: every group with its new enabled flag.
    pub barriers: Option<Vec<(BarrierGroup, bool)>>,
    pub coins_collected: Vec<u32>,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct LapTracker {
    checkpoints: Vec<Checkpoint>,
    laps: Vec<LapRoute>,
    lap: u8,
    next: Option<CheckpointId>,
    anchor: Anchor,
    spawn: Anchor,
    coins: HashSet<u32>,
}

impl LapTracker {
    pub fn new(track: &TrackDefinition) -> Result<Self, TrackError> {
        track.validate()?;

        let spawn = Anchor::from_spawn(track.spawn.position, track.spawn.yaw);
        let mut tracker = Self {
            checkpoints: track.checkpoints.iter().map(Checkpoint::from).collect(),
            laps: track.laps.clone(),
            lap: 1,
            next: None,
            anchor: spawn,
            spawn,
            coins: HashSet::new(),
        };
        tracker.enter_lap(1);
        Ok(tracker)
    }

    /// Back to lap 1 at the spawn point with nothing hit or collected.
    pub fn reset(&mut self) {
        self.anchor = self.spawn;
        self.coins.clear();
        self.enter_lap(1);
    }

    pub fn current_lap(&self) -> u8 {
        self.lap
    }

    pub fn is_finished(&self) -> bool {
        self.lap == LAP_FINISHED
    }

    pub fn next_checkpoint(&self) -> Option<&CheckpointId> {
        self.next.as_ref()
    }

    pub fn respawn_anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn coins(&self) -> u32 {
        self.coins.len() as u32
    }

    /// `None` means no such checkpoint; callers skip it.
    pub fn find_checkpoint(&self, id: &CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| &c.id == id)
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Sequence of the lap in progress; empty once finished.
    pub fn active_sequence(&self) -> &[CheckpointId] {
        match self.route() {
            Some(route) => &route.sequence,
            None => &[],
        }
    }

    /// Barrier flags for the lap in progress.
    pub fn barrier_plan(&self) -> Vec<(BarrierGroup, bool)> {
        match self.route() {
            Some(route) => BarrierGroup::ALL.iter().map(|g| (*g, route.is_closed(*g))).collect(),
            None => Vec::new(),
        }
    }

    pub fn handle_contacts(&mut self, contacts: &[CollisionTag], state: &VehicleState, bus: &mut EventBus) -> LapUpdate {
        let mut update = LapUpdate::default();

        for tag in contacts {
            match tag {
                CollisionTag::Coin(id) => {
                    if self.coins.insert(*id) {
                        tracing::debug!(coin = id, total = self.coins.len(), "coin collected");
                        update.coins_collected.push(*id);
                        bus.emit(&GameEvent::CoinsChanged { coins: self.coins() });
                    }
                }
                CollisionTag::Checkpoint(id) => {
                    if self.is_finished() {
                        continue;
                    }
                    if self.try_hit(id, state, bus) && self.lap_complete() {
                        self.advance(bus, &mut update);
                    }
                }
                CollisionTag::Barrier(_) | CollisionTag::Ground => {}
            }
        }

        update
    }

    fn route(&self) -> Option<&LapRoute> {
        match self.lap {
            1 | 2 => self.laps.get(self.lap as usize - 1),
            _ => None,
        }
    }

    fn try_hit(&mut self, id: &CheckpointId, state: &VehicleState, bus: &mut EventBus) -> bool {
        if self.next.as_ref() != Some(id) {
            return false;
        }
        let Some(cp) = self.checkpoints.iter_mut().find(|c| &c.id == id) else {
            return false;
        };
        if !cp.enabled || cp.hit {
            return false;
        }

        cp.hit = true;
        self.anchor = Anchor::new(cp.center, state.orientation);
        tracing::debug!(checkpoint = %id, lap = self.lap, "checkpoint hit");
        bus.emit(&GameEvent::CheckpointHit { id: id.clone() });

        self.next = self.first_unhit();
        true
    }

    fn first_unhit(&self) -> Option<CheckpointId> {
        self.active_sequence()
            .iter()
            .find(|id| self.find_checkpoint(id).is_some_and(|c| !c.hit))
            .cloned()
    }

    fn lap_complete(&self) -> bool {
        self.active_sequence()
            .iter()
            .all(|id| self.find_checkpoint(id).is_some_and(|c| c.hit))
    }

    fn advance(&mut self, bus: &mut EventBus, update: &mut LapUpdate) {
        let next_lap = match self.lap {
            1 => 2,
            _ => LAP_FINISHED,
        };
        self.enter_lap(next_lap);

        tracing::info!(lap = self.lap, "lap changed");
        bus.emit(&GameEvent::LapChanged { lap: self.lap });

        if self.is_finished() {
            update.finished = true;
        } else {
            update.barriers = Some(self.barrier_plan());
        }
    }

    fn enter_lap(&mut self, lap: u8) {
        self.lap = lap;
        let sequence: HashSet<CheckpointId> = self.active_sequence().iter().cloned().collect();
        for cp in &mut self.checkpoints {
            cp.enabled = sequence.contains(&cp.id);
            if cp.enabled {
                cp.hit = false;
            }
        }
        self.next = self.active_sequence().first().cloned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Channel;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn state() -> VehicleState {
        VehicleState::at_rest(&Anchor::from_spawn([0.0, 1.0, 0.0], 0.4), 1200.0, 9.81)
    }

    fn hit(id: &str) -> CollisionTag {
        CollisionTag::Checkpoint(CheckpointId::new(id))
    }

    fn lap_bus() -> (EventBus, Rc<RefCell<Vec<GameEvent>>>) {
        let mut bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        bus.subscribe_many(&[Channel::Lap, Channel::Checkpoint, Channel::Coins], || {
            let l = Rc::clone(&l);
            move |e: &GameEvent| l.borrow_mut().push(e.clone())
        });
        (bus, log)
    }

    fn lap_changes(log: &[GameEvent]) -> Vec<u8> {
        log.iter()
            .filter_map(|e| match e {
                GameEvent::LapChanged { lap } => Some(*lap),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_on_lap_one_with_only_its_checkpoints_enabled() {
        let t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        assert_eq!(t.current_lap(), 1);
        assert_eq!(t.next_checkpoint(), Some(&CheckpointId::new("c1")));
        assert!(!t.find_checkpoint(&CheckpointId::new("c5")).unwrap().enabled);
        assert!(t.find_checkpoint(&CheckpointId::new("c2")).unwrap().enabled);
        assert_eq!(
            t.barrier_plan(),
            vec![(BarrierGroup::OuterOval, false), (BarrierGroup::InnerShortcut, true)]
        );
    }

    #[test]
    fn out_of_order_hit_is_ignored() {
        let mut t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        let (mut bus, log) = lap_bus();
        t.handle_contacts(&[hit("c2"), hit("c5")], &state(), &mut bus);
        assert!(log.borrow().is_empty());
        assert_eq!(t.next_checkpoint(), Some(&CheckpointId::new("c1")));
    }

    #[test]
    fn hit_moves_anchor_to_center_with_vehicle_orientation() {
        let mut t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        let (mut bus, _) = lap_bus();
        let s = state();
        t.handle_contacts(&[hit("c1")], &s, &mut bus);

        assert_eq!(t.respawn_anchor().position, Point3::new(0.0, 1.5, -60.0));
        assert_eq!(t.respawn_anchor().orientation, s.orientation);
        assert_eq!(t.next_checkpoint(), Some(&CheckpointId::new("c2")));
    }

    #[test]
    fn repeated_contacts_in_one_frame_are_idempotent() {
        let mut t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        let (mut bus, log) = lap_bus();
        t.handle_contacts(&[hit("c1"), hit("c1"), hit("c1")], &state(), &mut bus);
        let before = t.clone();
        t.handle_contacts(&[hit("c1")], &state(), &mut bus);

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(t.next_checkpoint(), before.next_checkpoint());
        assert_eq!(t.checkpoints(), before.checkpoints());
    }

    #[test]
    fn full_race_cycles_one_two_finished() {
        let mut t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        let (mut bus, log) = lap_bus();

        let lap1: Vec<_> = ["c1", "c2", "c3", "c4", "final"].iter().map(|id| hit(id)).collect();
        let update = t.handle_contacts(&lap1, &state(), &mut bus);
        assert_eq!(t.current_lap(), 2);
        assert_eq!(lap_changes(&log.borrow()), vec![2]);
        assert_eq!(
            update.barriers,
            Some(vec![(BarrierGroup::OuterOval, true), (BarrierGroup::InnerShortcut, false)])
        );
        // shared checkpoints were cleared for lap 2
        assert!(!t.find_checkpoint(&CheckpointId::new("c3")).unwrap().hit);
        assert!(!t.find_checkpoint(&CheckpointId::new("c1")).unwrap().enabled);

        for id in ["c5", "c3", "c4"] {
            let u = t.handle_contacts(&[hit(id)], &state(), &mut bus);
            assert!(!u.finished);
        }
        let u = t.handle_contacts(&[hit("final")], &state(), &mut bus);
        assert!(u.finished);
        assert!(t.is_finished());
        assert_eq!(lap_changes(&log.borrow()), vec![2, 0]);

        // finished: nothing moves any more
        let u = t.handle_contacts(&[hit("c1")], &state(), &mut bus);
        assert_eq!(u, LapUpdate::default());
        assert_eq!(t.next_checkpoint(), None);
    }

    #[test]
    fn coins_count_once() {
        let mut t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        let (mut bus, log) = lap_bus();
        let u = t.handle_contacts(
            &[CollisionTag::Coin(3), CollisionTag::Coin(3), CollisionTag::Ground],
            &state(),
            &mut bus,
        );
        t.handle_contacts(&[CollisionTag::Coin(3), CollisionTag::Coin(4)], &state(), &mut bus);

        assert_eq!(u.coins_collected, vec![3]);
        assert_eq!(t.coins(), 2);
        assert_eq!(
            *log.borrow(),
            vec![GameEvent::CoinsChanged { coins: 1 }, GameEvent::CoinsChanged { coins: 2 }]
        );
    }

    #[test]
    fn reset_then_replay_completes_the_lap_once_more() {
        let mut t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        let (mut bus, log) = lap_bus();
        let lap1: Vec<_> = ["c1", "c2", "c3", "c4", "final"].iter().map(|id| hit(id)).collect();

        t.handle_contacts(&lap1, &state(), &mut bus);
        t.reset();
        assert_eq!(t.current_lap(), 1);
        assert_eq!(t.respawn_anchor().position, Point3::new(0.0, 1.2, 0.0));

        t.handle_contacts(&lap1, &state(), &mut bus);
        assert_eq!(lap_changes(&log.borrow()), vec![2, 2]);
    }

    #[test]
    fn unknown_id_lookup_is_none() {
        let t = LapTracker::new(&TrackDefinition::oval()).unwrap();
        assert!(t.find_checkpoint(&CheckpointId::new("c9")).is_none());
    }
}
