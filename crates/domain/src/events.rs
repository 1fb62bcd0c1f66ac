use serde::{Deserialize, Serialize};

use crate::chord::ChordSymbol;
use crate::pitch::PitchClass;

pub type LaneId = usize;

/// One judgeable chord on the compiled timeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TargetEvent {
    pub id: usize,
    /// Milliseconds after the count-in ends.
    pub time_ms: f64,
    pub measure: u32,
    pub beat: f64,
    pub chord: ChordSymbol,
    /// Pinned lane, if the stage author assigned one.
    pub lane: Option<LaneId>,
}

/// A single note reported by the input controller.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct InputEvent {
    /// Raw note number (MIDI) or a bare pitch class; both reduce mod 12.
    pub note: i32,
    /// Raw milliseconds since session start, on the same clock as `update`.
    pub timestamp_ms: f64,
}

impl InputEvent {
    pub fn new(note: i32, timestamp_ms: f64) -> Self {
        Self { note, timestamp_ms }
    }

    pub fn pitch_class(&self) -> PitchClass {
        PitchClass::from_note(self.note)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HitGrade {
    Perfect,
    Good,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    CountIn,
    Active,
    Cleared,
    GameOver,
    Stopped,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Cleared | Phase::GameOver | Phase::Stopped)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionResult {
    Clear,
    GameOver,
}

/// Everything the engine tells its observers (renderer, audio, persistence).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    TargetArmed {
        lane: LaneId,
        target_id: usize,
        chord: ChordSymbol,
        deadline_ms: f64,
    },
    Hit {
        lane: LaneId,
        target_id: usize,
        chord: ChordSymbol,
        damage: u32,
        grade: HitGrade,
        defeated: bool,
    },
    Defeated {
        lane: LaneId,
        defeated_count: u32,
    },
    Respawned {
        lane: LaneId,
        hp: u32,
    },
    Miss {
        lane: LaneId,
        target_id: usize,
        chord: ChordSymbol,
    },
    PlayerDamaged {
        amount: u32,
        remaining: u32,
    },
    PhaseChanged {
        phase: Phase,
    },
    SessionComplete {
        result: SessionResult,
        score: u64,
        correct_count: u32,
        total_count: u32,
    },
}
