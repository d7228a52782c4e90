//! Resolved track layout handed to the core once at load time.
//!
//! The core never reads files: whoever owns scene loading deserializes a
//! [`TrackDefinition`] (the binary reads JSON) and passes it in.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Alternate-route walls. Closing a group enables its colliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierGroup {
    OuterOval,
    InnerShortcut,
}

impl BarrierGroup {
    pub const ALL: [BarrierGroup; 2] = [BarrierGroup::OuterOval, BarrierGroup::InnerShortcut];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDef {
    pub id: CheckpointId,
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinDef {
    pub id: u32,
    pub center: [f32; 3],
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierDef {
    pub group: BarrierGroup,
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

/// Ordered checkpoints for one lap and the barriers closed while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapRoute {
    pub sequence: Vec<CheckpointId>,
    #[serde(default)]
    pub closed_barriers: Vec<BarrierGroup>,
}

impl LapRoute {
    pub fn is_closed(&self, group: BarrierGroup) -> bool {
        self.closed_barriers.contains(&group)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: [f32; 3],
    /// Heading around world up, radians. 0 faces -Z.
    #[serde(default)]
    pub yaw: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDefinition {
    pub checkpoints: Vec<CheckpointDef>,
    #[serde(default)]
    pub coins: Vec<CoinDef>,
    #[serde(default)]
    pub barriers: Vec<BarrierDef>,
    /// Exactly two entries: lap 1 then lap 2.
    pub laps: Vec<LapRoute>,
    pub spawn: SpawnPoint,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrackError {
    #[error("duplicate checkpoint id {0}")]
    DuplicateCheckpoint(CheckpointId),

    #[error("lap {lap} references unknown checkpoint {id}")]
    UnknownCheckpoint { lap: usize, id: CheckpointId },

    #[error("lap {0} has an empty checkpoint sequence")]
    EmptyLap(usize),

    #[error("lap {lap} visits checkpoint {id} twice")]
    RepeatedInLap { lap: usize, id: CheckpointId },

    #[error("expected 2 lap routes, found {0}")]
    LapCount(usize),
}

impl TrackDefinition {
    pub fn checkpoint(&self, id: &CheckpointId) -> Option<&CheckpointDef> {
        self.checkpoints.iter().find(|c| &c.id == id)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        if self.laps.len() != 2 {
            return Err(TrackError::LapCount(self.laps.len()));
        }

        let mut ids = HashSet::new();
        for c in &self.checkpoints {
            if !ids.insert(&c.id) {
                return Err(TrackError::DuplicateCheckpoint(c.id.clone()));
            }
        }

        for (i, route) in self.laps.iter().enumerate() {
            let lap = i + 1;
            if route.sequence.is_empty() {
                return Err(TrackError::EmptyLap(lap));
            }
            let mut seen = HashSet::new();
            for id in &route.sequence {
                if !ids.contains(id) {
                    return Err(TrackError::UnknownCheckpoint { lap, id: id.clone() });
                }
                if !seen.insert(id) {
                    return Err(TrackError::RepeatedInLap { lap, id: id.clone() });
                }
            }
        }

        Ok(())
    }

    /// Built-in two-lap oval. Lap 1 runs the outer oval with the inner
    /// shortcut walled off; lap 2 cuts through the shortcut past c5 and the
    /// outer oval is walled off instead.
    pub fn oval() -> Self {
        let gate = [6.0, 3.0, 1.5];
        let cp = |id: &str, center: [f32; 3], half_extents: [f32; 3]| CheckpointDef {
            id: CheckpointId::new(id),
            center,
            half_extents,
        };

        let checkpoints = vec![
            cp("c1", [0.0, 1.5, -60.0], gate),
            cp("c2", [60.0, 1.5, -120.0], [1.5, 3.0, 6.0]),
            cp("c3", [120.0, 1.5, -60.0], gate),
            cp("c4", [120.0, 1.5, 0.0], gate),
            cp("c5", [60.0, 1.5, -60.0], [1.5, 3.0, 6.0]),
            cp("final", [0.0, 1.5, -10.0], gate),
        ];

        let coins = (0..6)
            .map(|i| CoinDef {
                id: i,
                center: [0.0, 1.0, -20.0 - 15.0 * i as f32],
                radius: 1.0,
            })
            .collect();

        let barriers = vec![
            BarrierDef {
                group: BarrierGroup::InnerShortcut,
                center: [8.0, 1.5, -60.0],
                half_extents: [0.5, 1.5, 6.0],
            },
            BarrierDef {
                group: BarrierGroup::OuterOval,
                center: [60.0, 1.5, -112.0],
                half_extents: [0.5, 1.5, 8.0],
            },
        ];

        let ids = |names: &[&str]| names.iter().map(|n| CheckpointId::new(*n)).collect();

        Self {
            checkpoints,
            coins,
            barriers,
            laps: vec![
                LapRoute {
                    sequence: ids(&["c1", "c2", "c3", "c4", "final"]),
                    closed_barriers: vec![BarrierGroup::InnerShortcut],
                },
                LapRoute {
                    sequence: ids(&["c5", "c3", "c4", "final"]),
                    closed_barriers: vec![BarrierGroup::OuterOval],
                },
            ],
            spawn: SpawnPoint {
                position: [0.0, 1.2, 0.0],
                yaw: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oval_is_valid() {
        let track = TrackDefinition::oval();
        assert_eq!(track.validate(), Ok(()));
        assert_eq!(track.laps[0].sequence.len(), 5);
        assert_eq!(track.laps[1].sequence[0], CheckpointId::new("c5"));
    }

    #[test]
    fn unknown_checkpoint_in_route_is_rejected() {
        let mut track = TrackDefinition::oval();
        track.laps[1].sequence.push(CheckpointId::new("nowhere"));
        assert_eq!(
            track.validate(),
            Err(TrackError::UnknownCheckpoint {
                lap: 2,
                id: CheckpointId::new("nowhere")
            })
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut track = TrackDefinition::oval();
        let dup = track.checkpoints[0].clone();
        track.checkpoints.push(dup);
        assert!(matches!(track.validate(), Err(TrackError::DuplicateCheckpoint(_))));
    }

    #[test]
    fn lap_count_must_be_two() {
        let mut track = TrackDefinition::oval();
        track.laps.pop();
        assert_eq!(track.validate(), Err(TrackError::LapCount(1)));
    }

    #[test]
    fn definition_parses_from_json() {
        let json = r#"{
            "checkpoints": [
                {"id": "a", "center": [0, 0, 0], "half_extents": [1, 1, 1]},
                {"id": "b", "center": [0, 0, 10], "half_extents": [1, 1, 1]}
            ],
            "laps": [
                {"sequence": ["a", "b"], "closed_barriers": ["inner_shortcut"]},
                {"sequence": ["b", "a"]}
            ],
            "spawn": {"position": [0, 1, 0]}
        }"#;

        let track: TrackDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(track.validate(), Ok(()));
        assert!(track.laps[0].is_closed(BarrierGroup::InnerShortcut));
        assert!(track.coins.is_empty());
        assert_eq!(track.spawn.yaw, 0.0);
        assert!(track.checkpoint(&CheckpointId::new("missing")).is_none());
    }
}
