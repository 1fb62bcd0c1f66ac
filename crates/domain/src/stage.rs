use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::chord::ChordSpec;
use crate::events::LaneId;
use crate::tempo::TimeBase;
use crate::DomainError;

/// Which window policy judges the stage.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JudgeMode {
    /// Targets arm ahead of time and stay open until the lane's next target arms.
    #[default]
    Progression,
    /// Targets are answerable only within a fixed tolerance around their nominal time.
    Rhythm,
    /// No tempo grid: each lane draws questions from `allowed_chords` and the
    /// player has `enemy_gauge_seconds` to answer each one.
    Single,
}

/// One authored `(bar, beat, chord)` entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimedEntry {
    pub bar: u32,
    pub beat: f64,
    pub chord: ChordSpec,
    #[serde(default)]
    pub lane: Option<LaneId>,
}

/// A list with any `bar` key is timed; otherwise it is a flat chord list.
/// Malformed entries are dropped one by one with a warning.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Progression {
    Timed(Vec<TimedEntry>),
    Flat(Vec<ChordSpec>),
}

impl<'de> Deserialize<'de> for Progression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
        if items.iter().any(|item| item.get("bar").is_some()) {
            Ok(Progression::Timed(lenient(items)))
        } else {
            Ok(Progression::Flat(lenient(items)))
        }
    }
}

fn lenient<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(index, %err, "dropping malformed progression entry");
                None
            }
        })
        .collect()
}

impl Default for Progression {
    fn default() -> Self {
        Progression::Flat(Vec::new())
    }
}

impl Progression {
    pub fn len(&self) -> usize {
        match self {
            Progression::Timed(entries) => entries.len(),
            Progression::Flat(chords) => chords.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DamageRange {
    pub min: u32,
    pub max: u32,
}

impl Default for DamageRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// How far ahead of its nominal time a progression target arms.
    pub arm_lead_beats: f64,
    /// Unanswerable gap between a missed deadline and the next target arming.
    pub null_interval_ms: f64,
    /// Half-width of the rhythm window.
    pub tolerance_ms: f64,
    /// Half-width of the inner rhythm window that grades Perfect.
    pub perfect_ms: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            arm_lead_beats: 3.0,
            null_interval_ms: 100.0,
            tolerance_ms: 200.0,
            perfect_ms: 50.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageConfig {
    pub id: String,
    pub title: String,
    pub description: String,
    pub bpm: f64,
    /// Beats per measure.
    pub time_signature: u32,
    pub measure_count: u32,
    pub count_in_measures: u32,
    #[serde(alias = "chord_progression")]
    pub progression: Progression,
    pub mode: JudgeMode,
    #[serde(alias = "simultaneous_monster_count")]
    pub simultaneous_lanes: usize,
    /// Total enemies in the stage, including those waiting for a free lane. Zero means endless.
    pub enemy_count: usize,
    /// Player HP.
    pub max_hp: u32,
    #[serde(alias = "enemy_hp")]
    pub lane_hp: u32,
    pub damage: DamageRange,
    /// Flat spelling of `damage.min` used by tabular stage exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_damage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_damage: Option<u32>,
    /// Player HP lost per missed target.
    pub miss_damage: u32,
    /// Correct answers that clear the stage outright.
    #[serde(alias = "question_count")]
    pub required_count: Option<u32>,
    pub window: WindowConfig,
    /// Consecutive hits needed per step of combo bonus damage. Zero disables the bonus.
    pub combo_step: u32,
    pub combo_bonus: u32,
    /// Repeat the progression until the session ends.
    pub loop_progression: bool,
    pub show_guide: bool,
    pub required_clears_for_next: u32,
    /// Fixed seed for damage rolls; entropy when absent.
    pub seed: Option<u64>,
    /// Question pool for [`JudgeMode::Single`].
    pub allowed_chords: Vec<ChordSpec>,
    /// Seconds a drawn question stays answerable.
    pub enemy_gauge_seconds: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            description: String::new(),
            bpm: 120.0,
            time_signature: 4,
            measure_count: 8,
            count_in_measures: 1,
            progression: Progression::default(),
            mode: JudgeMode::default(),
            simultaneous_lanes: 1,
            enemy_count: 1,
            max_hp: 5,
            lane_hp: 5,
            damage: DamageRange::default(),
            min_damage: None,
            max_damage: None,
            miss_damage: 1,
            required_count: None,
            window: WindowConfig::default(),
            combo_step: 0,
            combo_bonus: 0,
            loop_progression: true,
            show_guide: false,
            required_clears_for_next: 5,
            seed: None,
            allowed_chords: Vec::new(),
            enemy_gauge_seconds: 5.0,
        }
    }
}

impl StageConfig {
    pub fn new(id: impl Into<String>, title: impl Into<String>, progression: Progression) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            progression,
            ..Default::default()
        }
    }

    pub fn time_base(&self) -> Result<TimeBase, DomainError> {
        TimeBase::new(self.bpm, self.time_signature, self.count_in_measures)
    }

    /// Damage range after applying the flat `min_damage`/`max_damage` overrides.
    pub fn damage_range(&self) -> DamageRange {
        DamageRange {
            min: self.min_damage.unwrap_or(self.damage.min),
            max: self.max_damage.unwrap_or(self.damage.max),
        }
    }

    /// Enemies queued behind the ones occupying lanes at session start.
    pub fn backlog(&self) -> usize {
        self.enemy_count.saturating_sub(self.simultaneous_lanes)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.time_base()?;
        if self.measure_count == 0 {
            return Err(DomainError::configuration("measure_count must be at least 1"));
        }
        if self.simultaneous_lanes == 0 {
            return Err(DomainError::configuration(
                "simultaneous_lanes must be at least 1",
            ));
        }
        if self.max_hp == 0 || self.lane_hp == 0 {
            return Err(DomainError::configuration("hp values must be at least 1"));
        }
        let damage = self.damage_range();
        if damage.min > damage.max {
            return Err(DomainError::configuration(format!(
                "damage range is inverted ({} > {})",
                damage.min, damage.max
            )));
        }
        let window = &self.window;
        if window.arm_lead_beats < 0.0 {
            return Err(DomainError::configuration("arm lead cannot be negative"));
        }
        if window.null_interval_ms <= 0.0 {
            return Err(DomainError::configuration("null interval must be positive"));
        }
        if window.tolerance_ms <= 0.0 || window.perfect_ms < 0.0 || window.perfect_ms > window.tolerance_ms {
            return Err(DomainError::configuration(
                "rhythm window needs 0 <= perfect_ms <= tolerance_ms and tolerance_ms > 0",
            ));
        }
        if self.mode == JudgeMode::Single {
            if self.allowed_chords.is_empty() {
                return Err(DomainError::configuration("single mode needs allowed_chords"));
            }
            if !(self.enemy_gauge_seconds > 0.0) {
                return Err(DomainError::configuration(
                    "enemy_gauge_seconds must be positive",
                ));
            }
        } else if self.progression.is_empty() {
            return Err(DomainError::configuration("stage has no chord progression"));
        }
        Ok(())
    }
}

/// Running per-stage results, folded from finished sessions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub stage_id: String,
    pub plays: u32,
    pub clears: u32,
    pub best_score: u64,
    pub best_accuracy: f32,
}

impl StageRecord {
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            ..Default::default()
        }
    }

    pub fn unlocks_next(&self, required_clears: u32) -> bool {
        self.clears >= required_clears
    }
}
