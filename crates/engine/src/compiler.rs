use fantasia_domain::{
    ChordSpec, ChordSymbol, DomainError, JudgeMode, LaneId, Progression, StageConfig, TargetEvent,
    TimeBase, TimedEntry,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument, warn};

/// Immutable, time-ordered targets for one session.
///
/// Event times strictly increase. When looping, the sequence repeats forever
/// with every pass shifted by [`Timeline::loop_ms`].
///
/// A drawn timeline has no events: every lane pulls an endless run of
/// questions from a chord pool, and the scheduler times them as they arm.
#[derive(Clone, Debug)]
pub struct Timeline {
    events: Vec<TargetEvent>,
    lanes: Vec<Vec<usize>>,
    loop_ms: f64,
    looping: bool,
    pool: Vec<ChordSymbol>,
    seed: u64,
}

impl Timeline {
    pub fn events(&self) -> &[TargetEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.pool.is_empty()
    }

    pub fn is_drawn(&self) -> bool {
        !self.pool.is_empty()
    }

    pub fn pool(&self) -> &[ChordSymbol] {
        &self.pool
    }

    pub fn loop_ms(&self) -> f64 {
        self.loop_ms
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Number of targets per pass owned by `lane`.
    pub fn lane_len(&self, lane: LaneId) -> usize {
        self.lanes.get(lane).map_or(0, Vec::len)
    }

    /// The `sequence`-th target of `lane`, counting across loop passes.
    ///
    /// Returns `None` past the end of a non-looping timeline or for a lane
    /// that owns no targets.
    pub fn lane_target(&self, lane: LaneId, sequence: usize) -> Option<TargetEvent> {
        if self.is_drawn() {
            return self.draw(lane, sequence);
        }
        let indices = self.lanes.get(lane)?;
        if indices.is_empty() {
            return None;
        }
        let cycle = sequence / indices.len();
        if cycle > 0 && !self.looping {
            return None;
        }
        let event = &self.events[indices[sequence % indices.len()]];
        Some(self.shifted(event, cycle))
    }

    /// Any target by global index, counting across loop passes. Drawn timelines have none.
    pub fn event_at(&self, index: usize) -> Option<TargetEvent> {
        if self.events.is_empty() {
            return None;
        }
        let cycle = index / self.events.len();
        if cycle > 0 && !self.looping {
            return None;
        }
        Some(self.shifted(&self.events[index % self.events.len()], cycle))
    }

    /// Same `(lane, sequence)` always yields the same chord for a given seed.
    fn draw(&self, lane: LaneId, sequence: usize) -> Option<TargetEvent> {
        if lane >= self.lanes.len() {
            return None;
        }
        let id = sequence * self.lanes.len() + lane;
        let mixed = (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(self.seed ^ mixed);
        let chord = self.pool[rng.random_range(0..self.pool.len())].clone();
        Some(TargetEvent {
            id,
            time_ms: 0.0,
            measure: 0,
            beat: 0.0,
            chord,
            lane: Some(lane),
        })
    }

    fn shifted(&self, event: &TargetEvent, cycle: usize) -> TargetEvent {
        if cycle == 0 {
            return event.clone();
        }
        TargetEvent {
            id: event.id + cycle * self.events.len(),
            time_ms: event.time_ms + cycle as f64 * self.loop_ms,
            ..event.clone()
        }
    }
}

pub struct ProgressionCompiler;

impl ProgressionCompiler {
    #[instrument(skip(stage), fields(stage = %stage.id))]
    pub fn compile(stage: &StageConfig) -> Result<Timeline, DomainError> {
        if stage.mode == JudgeMode::Single {
            let seed = stage.seed.unwrap_or_else(rand::random);
            return Self::compile_pool(&stage.allowed_chords, stage.simultaneous_lanes, seed);
        }
        let time_base = stage.time_base()?;
        Self::compile_with(
            &stage.progression,
            &time_base,
            stage.measure_count,
            stage.simultaneous_lanes,
            stage.loop_progression,
        )
    }

    pub fn compile_with(
        progression: &Progression,
        time_base: &TimeBase,
        measure_count: u32,
        lane_count: usize,
        looping: bool,
    ) -> Result<Timeline, DomainError> {
        if measure_count == 0 {
            return Err(DomainError::configuration("measure_count must be at least 1"));
        }
        if lane_count == 0 {
            return Err(DomainError::configuration("at least one lane is required"));
        }
        let placed = match progression {
            Progression::Flat(chords) => Self::place_flat(chords, time_base, measure_count),
            Progression::Timed(entries) => {
                Self::place_timed(entries, time_base, measure_count, lane_count)
            }
        };
        let timeline = Self::assemble(placed, lane_count, time_base.loop_ms(measure_count), looping);
        if timeline.is_empty() {
            return Err(DomainError::configuration(
                "chord progression produced no valid targets",
            ));
        }
        debug!(
            events = timeline.len(),
            loop_ms = timeline.loop_ms,
            looping,
            "compiled timeline"
        );
        Ok(timeline)
    }

    /// Builds a drawn timeline over the resolvable chords of `chords`.
    pub fn compile_pool(
        chords: &[ChordSpec],
        lane_count: usize,
        seed: u64,
    ) -> Result<Timeline, DomainError> {
        if lane_count == 0 {
            return Err(DomainError::configuration("at least one lane is required"));
        }
        let pool: Vec<ChordSymbol> = chords.iter().filter_map(resolve_or_warn).collect();
        if pool.is_empty() {
            return Err(DomainError::configuration("chord pool has no valid chords"));
        }
        debug!(chords = pool.len(), lane_count, "compiled question pool");
        Ok(Timeline {
            events: Vec::new(),
            lanes: vec![Vec::new(); lane_count],
            loop_ms: 0.0,
            looping: true,
            pool,
            seed,
        })
    }

    fn place_flat(chords: &[ChordSpec], time_base: &TimeBase, measure_count: u32) -> Vec<Placed> {
        let resolved: Vec<ChordSymbol> = chords.iter().filter_map(resolve_or_warn).collect();
        if resolved.is_empty() {
            return Vec::new();
        }
        if chords.len() > measure_count as usize {
            warn!(
                chords = chords.len(),
                measure_count, "progression is longer than the stage; extra chords ignored"
            );
        }
        (0..measure_count)
            .map(|index| Placed {
                time_ms: time_base.position_to_ms(index + 1, 1.0),
                measure: index + 1,
                beat: 1.0,
                chord: resolved[index as usize % resolved.len()].clone(),
                lane: None,
            })
            .collect()
    }

    fn place_timed(
        entries: &[TimedEntry],
        time_base: &TimeBase,
        measure_count: u32,
        lane_count: usize,
    ) -> Vec<Placed> {
        let last_beat = time_base.beats_per_measure() as f64 + 1.0;
        let mut placed: Vec<Placed> = entries
            .iter()
            .filter_map(|entry| {
                if entry.bar < 1 || entry.bar > measure_count {
                    warn!(bar = entry.bar, measure_count, "dropping entry outside the stage");
                    return None;
                }
                if !(entry.beat >= 1.0 && entry.beat < last_beat) {
                    warn!(bar = entry.bar, beat = entry.beat, "dropping entry with invalid beat");
                    return None;
                }
                if let Some(lane) = entry.lane {
                    if lane >= lane_count {
                        warn!(lane, lane_count, "dropping entry pinned to a missing lane");
                        return None;
                    }
                }
                let chord = resolve_or_warn(&entry.chord)?;
                Some(Placed {
                    time_ms: time_base.position_to_ms(entry.bar, entry.beat),
                    measure: entry.bar,
                    beat: entry.beat,
                    chord,
                    lane: entry.lane,
                })
            })
            .collect();
        placed.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));
        placed
    }

    fn assemble(placed: Vec<Placed>, lane_count: usize, loop_ms: f64, looping: bool) -> Timeline {
        let mut events: Vec<TargetEvent> = Vec::with_capacity(placed.len());
        let mut lanes = vec![Vec::new(); lane_count];
        let mut next_lane = 0;
        for item in placed {
            if let Some(prev) = events.last() {
                if item.time_ms <= prev.time_ms {
                    warn!(
                        measure = item.measure,
                        beat = item.beat,
                        chord = %item.chord,
                        "dropping entry that shares a time with an earlier one"
                    );
                    continue;
                }
            }
            let lane = item.lane.unwrap_or_else(|| {
                let lane = next_lane;
                next_lane = (next_lane + 1) % lane_count;
                lane
            });
            let id = events.len();
            lanes[lane].push(id);
            events.push(TargetEvent {
                id,
                time_ms: item.time_ms,
                measure: item.measure,
                beat: item.beat,
                chord: item.chord,
                lane: Some(lane),
            });
        }
        Timeline {
            events,
            lanes,
            loop_ms,
            looping,
            pool: Vec::new(),
            seed: 0,
        }
    }
}

struct Placed {
    time_ms: f64,
    measure: u32,
    beat: f64,
    chord: ChordSymbol,
    lane: Option<LaneId>,
}

fn resolve_or_warn(spec: &ChordSpec) -> Option<ChordSymbol> {
    match spec.resolve() {
        Ok(chord) => Some(chord),
        Err(err) => {
            warn!(chord = spec.name(), %err, "dropping unresolvable chord");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat(names: &[&str]) -> Progression {
        Progression::Flat(names.iter().map(|name| ChordSpec::from(*name)).collect())
    }

    fn timed(entries: &[(u32, f64, &str)]) -> Progression {
        Progression::Timed(
            entries
                .iter()
                .map(|(bar, beat, chord)| TimedEntry {
                    bar: *bar,
                    beat: *beat,
                    chord: ChordSpec::from(*chord),
                    lane: None,
                })
                .collect(),
        )
    }

    fn tb() -> TimeBase {
        TimeBase::new(120.0, 4, 0).unwrap()
    }

    #[test]
    fn flat_list_lands_on_downbeats() {
        let timeline =
            ProgressionCompiler::compile_with(&flat(&["C", "F", "G", "C"]), &tb(), 4, 1, false)
                .unwrap();
        let times: Vec<f64> = timeline.events().iter().map(|e| e.time_ms).collect();
        assert_eq!(times, vec![0.0, 2000.0, 4000.0, 6000.0]);
        assert_eq!(timeline.events()[1].chord.to_string(), "F");
    }

    #[test]
    fn short_flat_list_wraps() {
        let timeline =
            ProgressionCompiler::compile_with(&flat(&["Am", "G"]), &tb(), 5, 1, false).unwrap();
        let names: Vec<String> = timeline
            .events()
            .iter()
            .map(|e| e.chord.to_string())
            .collect();
        assert_eq!(names, vec!["Am", "G", "Am", "G", "Am"]);
    }

    #[test]
    fn timed_entries_sort_and_drop_invalid() {
        let progression = timed(&[
            (2, 3.0, "G7"),
            (1, 1.0, "C"),
            (0, 1.0, "F"),
            (1, 0.5, "F"),
            (1, 3.0, "Xq"),
            (9, 1.0, "C"),
            (1, 1.0, "Dm"),
        ]);
        let timeline = ProgressionCompiler::compile_with(&progression, &tb(), 4, 1, true).unwrap();
        let times: Vec<f64> = timeline.events().iter().map(|e| e.time_ms).collect();
        assert_eq!(times, vec![0.0, 3000.0]);
        assert_eq!(timeline.events()[0].chord.to_string(), "C");
    }

    #[test]
    fn times_strictly_increase() {
        let progression = timed(&[(1, 1.0, "C"), (1, 2.5, "F"), (3, 4.0, "G"), (2, 1.0, "Am")]);
        let timeline = ProgressionCompiler::compile_with(&progression, &tb(), 4, 2, true).unwrap();
        for pair in timeline.events().windows(2) {
            assert!(pair[0].time_ms < pair[1].time_ms);
        }
    }

    #[test]
    fn zero_valid_events_is_a_configuration_error() {
        let result = ProgressionCompiler::compile_with(&flat(&["Q", "Zm"]), &tb(), 4, 1, false);
        assert!(matches!(result, Err(DomainError::Configuration(_))));
    }

    #[test]
    fn looping_shifts_by_loop_duration() {
        let progression = timed(&[(1, 1.0, "C"), (2, 3.0, "G")]);
        let timeline = ProgressionCompiler::compile_with(&progression, &tb(), 2, 1, true).unwrap();
        assert_relative_eq!(timeline.loop_ms(), 4000.0);
        let third = timeline.lane_target(0, 2).unwrap();
        assert_relative_eq!(third.time_ms, 4000.0);
        assert_eq!(third.id, 2);
        let fourth = timeline.event_at(3).unwrap();
        assert_relative_eq!(fourth.time_ms, 7000.0);
    }

    #[test]
    fn non_looping_timeline_ends() {
        let timeline =
            ProgressionCompiler::compile_with(&flat(&["C"]), &tb(), 2, 1, false).unwrap();
        assert!(timeline.lane_target(0, 1).is_some());
        assert!(timeline.lane_target(0, 2).is_none());
    }

    #[test]
    fn unpinned_events_deal_round_robin() {
        let mut entries = match timed(&[(1, 1.0, "C"), (1, 2.0, "F"), (1, 3.0, "G")]) {
            Progression::Timed(entries) => entries,
            Progression::Flat(_) => unreachable!(),
        };
        entries.push(TimedEntry {
            bar: 2,
            beat: 1.0,
            chord: ChordSpec::from("Am"),
            lane: Some(1),
        });
        let timeline =
            ProgressionCompiler::compile_with(&Progression::Timed(entries), &tb(), 2, 2, true)
                .unwrap();
        assert_eq!(timeline.lane_len(0), 2);
        assert_eq!(timeline.lane_len(1), 2);
        assert_eq!(timeline.lane_target(1, 1).unwrap().chord.to_string(), "Am");
    }

    #[test]
    fn half_broken_timed_list_keeps_its_timing() {
        let progression: Progression = serde_json::from_str(
            r#"[{"bar": 1, "beat": 1, "chord": "C"}, {"bar": 3, "chord": "G"}]"#,
        )
        .unwrap();
        let timeline = ProgressionCompiler::compile_with(&progression, &tb(), 4, 1, false).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.events()[0].measure, 1);
        assert_eq!(timeline.events()[0].chord.to_string(), "C");
    }

    #[test]
    fn pool_draws_are_seeded_and_endless() {
        let pool = ["C", "Dm", "Nope", "G7"].map(ChordSpec::from);
        let a = ProgressionCompiler::compile_pool(&pool, 2, 11).unwrap();
        let b = ProgressionCompiler::compile_pool(&pool, 2, 11).unwrap();
        assert!(a.is_drawn());
        assert_eq!(a.pool().len(), 3);
        for sequence in [0, 1, 50, 10_000] {
            let target = a.lane_target(1, sequence).unwrap();
            assert_eq!(target, b.lane_target(1, sequence).unwrap());
            assert_eq!(target.id, sequence * 2 + 1);
            assert!(a.pool().contains(&target.chord));
        }
        assert!(a.lane_target(2, 0).is_none());
        let names: std::collections::HashSet<String> = (0..64)
            .map(|sequence| a.lane_target(0, sequence).unwrap().chord.to_string())
            .collect();
        assert!(names.len() > 1);
    }

    #[test]
    fn empty_pool_is_a_configuration_error() {
        let result = ProgressionCompiler::compile_pool(&[ChordSpec::from("Zz")], 1, 0);
        assert!(matches!(result, Err(DomainError::Configuration(_))));
    }

    #[test]
    fn compiles_from_stage_config() {
        let mut stage = StageConfig::new("1-1", "Meadow", flat(&["C", "F", "G", "C"]));
        stage.measure_count = 4;
        stage.count_in_measures = 0;
        let timeline = ProgressionCompiler::compile(&stage).unwrap();
        assert_eq!(timeline.len(), 4);
        assert_relative_eq!(timeline.events()[3].time_ms, 6000.0);
    }
}
