//! Per-lane judgment windows.
//!
//! Every lane walks its own sub-sequence of the [`Timeline`]:
//! `Waiting -> Armed -> (Hit | Timeout) -> Waiting(next)`. Transitions are
//! produced one at a time in global time order so the caller can stop as soon
//! as a terminal condition is reached.

use fantasia_domain::{
    HitGrade, InputEvent, JudgeMode, LaneId, StageConfig, TargetEvent, TimeBase,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::Timeline;
use crate::lanes::Lane;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum WindowPolicy {
    /// Arm `arm_lead_ms` early, stay open until just before the lane's next target arms.
    Deadline {
        arm_lead_ms: f64,
        null_interval_ms: f64,
        /// Window length after the nominal time for a lane's final target.
        tail_ms: f64,
    },
    /// Open for `tolerance_ms` either side of the nominal time.
    Symmetric { tolerance_ms: f64, perfect_ms: f64 },
    /// No grid: each target is answerable for `gauge_ms` from the moment it arms.
    Gauge { gauge_ms: f64 },
}

impl WindowPolicy {
    pub fn for_stage(stage: &StageConfig, time_base: &TimeBase) -> Self {
        match stage.mode {
            JudgeMode::Progression => WindowPolicy::Deadline {
                arm_lead_ms: time_base.beats_to_ms(stage.window.arm_lead_beats),
                null_interval_ms: stage.window.null_interval_ms,
                tail_ms: time_base.measure_ms(),
            },
            JudgeMode::Rhythm => WindowPolicy::Symmetric {
                tolerance_ms: stage.window.tolerance_ms,
                perfect_ms: stage.window.perfect_ms,
            },
            JudgeMode::Single => WindowPolicy::Gauge {
                gauge_ms: stage.enemy_gauge_seconds * 1000.0,
            },
        }
    }

    fn grade(&self, offset_ms: f64) -> HitGrade {
        match self {
            WindowPolicy::Deadline { .. } | WindowPolicy::Gauge { .. } => HitGrade::Perfect,
            WindowPolicy::Symmetric { perfect_ms, .. } => {
                if offset_ms.abs() <= *perfect_ms {
                    HitGrade::Perfect
                } else {
                    HitGrade::Good
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum WindowState {
    Pending,
    Hit,
    Timeout,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JudgmentWindow {
    pub target: TargetEvent,
    /// Position of the target in its lane's sub-sequence, across loop passes.
    pub sequence: usize,
    pub open_ms: f64,
    pub close_ms: f64,
    pub state: WindowState,
}

impl JudgmentWindow {
    pub fn contains(&self, t: f64) -> bool {
        self.open_ms <= t && t < self.close_ms
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum LaneState {
    /// Unanswerable until target `next` arms. Covers the null interval after a timeout.
    Waiting { next: usize, since_ms: f64 },
    Armed(JudgmentWindow),
    /// A non-looping timeline has no more targets for this lane.
    Exhausted,
    /// The lane's enemy was defeated and nobody is queued to replace it.
    Retired,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Judgment {
    Armed {
        lane: LaneId,
        window: JudgmentWindow,
    },
    Hit {
        lane: LaneId,
        window: JudgmentWindow,
        grade: HitGrade,
        offset_ms: f64,
    },
    Timeout {
        lane: LaneId,
        window: JudgmentWindow,
    },
}

pub struct JudgmentScheduler {
    timeline: Timeline,
    policy: WindowPolicy,
}

impl JudgmentScheduler {
    pub fn new(timeline: Timeline, policy: WindowPolicy) -> Self {
        Self { timeline, policy }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    /// State a lane starts in.
    pub fn initial_state(&self, lane: LaneId) -> LaneState {
        self.wait_for(lane, 0, f64::NEG_INFINITY)
    }

    /// Window bounds for the `sequence`-th target of `lane`, ignoring lane state.
    ///
    /// Deadline windows always contain their nominal time: a target never arms
    /// before its predecessor's time plus `min(null_interval, half the spacing)`,
    /// and its window closes before the lane's next target arms.
    /// Gauge windows are unplaced until the lane arms them.
    pub fn window_for(&self, lane: LaneId, sequence: usize) -> Option<JudgmentWindow> {
        let target = self.timeline.lane_target(lane, sequence)?;
        let (open_ms, close_ms) = match self.policy {
            WindowPolicy::Deadline {
                arm_lead_ms,
                null_interval_ms,
                tail_ms,
            } => {
                let arm = self.deadline_arm(
                    lane,
                    sequence,
                    target.time_ms,
                    arm_lead_ms,
                    null_interval_ms,
                );
                let close = match self.timeline.lane_target(lane, sequence + 1) {
                    Some(next) => {
                        let next_arm = self.deadline_arm(
                            lane,
                            sequence + 1,
                            next.time_ms,
                            arm_lead_ms,
                            null_interval_ms,
                        );
                        let gap = null_interval_ms
                            .min((next_arm - arm) / 2.0)
                            .min((next_arm - target.time_ms) / 2.0);
                        next_arm - gap
                    }
                    None => target.time_ms + tail_ms,
                };
                (arm, close)
            }
            WindowPolicy::Symmetric { tolerance_ms, .. } => {
                (target.time_ms - tolerance_ms, target.time_ms + tolerance_ms)
            }
            WindowPolicy::Gauge { gauge_ms } => (target.time_ms, target.time_ms + gauge_ms),
        };
        Some(JudgmentWindow {
            target,
            sequence,
            open_ms,
            close_ms,
            state: WindowState::Pending,
        })
    }

    /// The lane's currently answerable target and the time left before its deadline.
    pub fn answerable<'a>(&self, lane: &'a Lane, t: f64) -> Option<(&'a TargetEvent, f64)> {
        match &lane.state {
            LaneState::Armed(window) if window.contains(t) => {
                Some((&window.target, window.close_ms - t))
            }
            _ => None,
        }
    }

    /// Performs the earliest pending arm or timeout at or before `now`, if any.
    pub fn next_transition(&self, lanes: &mut [Lane], now: f64) -> Option<Judgment> {
        let (index, at) = lanes
            .iter()
            .enumerate()
            .filter_map(|(index, lane)| self.transition_time(lane).map(|at| (index, at)))
            .filter(|(_, at)| *at <= now)
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        let lane = &mut lanes[index];
        let state = std::mem::replace(&mut lane.state, LaneState::Exhausted);
        match state {
            LaneState::Waiting { next, since_ms } => {
                let Some(window) = self.window_for(lane.id, next) else {
                    lane.state = LaneState::Exhausted;
                    return self.next_transition(lanes, now);
                };
                let window = self.place(window, since_ms);
                lane.accumulator.clear();
                debug!(
                    lane = lane.id,
                    target = window.target.id,
                    chord = %window.target.chord,
                    open_ms = window.open_ms,
                    close_ms = window.close_ms,
                    "target armed"
                );
                lane.state = LaneState::Armed(window.clone());
                Some(Judgment::Armed {
                    lane: lane.id,
                    window,
                })
            }
            LaneState::Armed(mut window) => {
                window.state = WindowState::Timeout;
                lane.accumulator.clear();
                lane.state = self.wait_for(lane.id, window.sequence + 1, at);
                debug!(lane = lane.id, target = window.target.id, "target timed out");
                Some(Judgment::Timeout {
                    lane: lane.id,
                    window,
                })
            }
            other => {
                lane.state = other;
                None
            }
        }
    }

    /// Feeds one note to every armed lane and resolves each lane whose chord is now satisfied.
    ///
    /// Call [`JudgmentScheduler::next_transition`] up to `at` first so no stale window is judged.
    pub fn apply_input(&self, lanes: &mut [Lane], input: &InputEvent, at: f64) -> Vec<Judgment> {
        let mut judgments = Vec::new();
        for lane in lanes.iter_mut() {
            let LaneState::Armed(window) = &lane.state else {
                continue;
            };
            if !window.contains(at) {
                continue;
            }
            lane.accumulator.push(input);
            if !lane.accumulator.satisfies(&window.target.chord.pitch_classes()) {
                continue;
            }
            let mut window = window.clone();
            window.state = WindowState::Hit;
            let offset_ms = at - window.target.time_ms;
            let grade = self.policy.grade(offset_ms);
            lane.accumulator.clear();
            lane.state = self.wait_for(lane.id, window.sequence + 1, at);
            debug!(lane = lane.id, target = window.target.id, ?grade, offset_ms, "target hit");
            judgments.push(Judgment::Hit {
                lane: lane.id,
                window,
                grade,
                offset_ms,
            });
        }
        judgments
    }

    fn transition_time(&self, lane: &Lane) -> Option<f64> {
        match &lane.state {
            LaneState::Waiting { next, since_ms } => Some(
                self.window_for(lane.id, *next)
                    .map_or(*since_ms, |window| self.place(window, *since_ms).open_ms),
            ),
            LaneState::Armed(window) => Some(window.close_ms),
            LaneState::Exhausted | LaneState::Retired => None,
        }
    }

    fn deadline_arm(
        &self,
        lane: LaneId,
        sequence: usize,
        time_ms: f64,
        arm_lead_ms: f64,
        null_interval_ms: f64,
    ) -> f64 {
        let arm = time_ms - arm_lead_ms;
        let previous = sequence
            .checked_sub(1)
            .and_then(|previous| self.timeline.lane_target(lane, previous));
        match previous {
            Some(previous) => {
                let spacing = time_ms - previous.time_ms;
                arm.max(previous.time_ms + null_interval_ms.min(spacing / 2.0))
            }
            None => arm,
        }
    }

    /// Pins a window to the moment its lane became free at `since_ms`.
    fn place(&self, mut window: JudgmentWindow, since_ms: f64) -> JudgmentWindow {
        match self.policy {
            WindowPolicy::Gauge { gauge_ms } => {
                let start = since_ms.max(0.0);
                window.target.time_ms = start;
                window.open_ms = start;
                window.close_ms = start + gauge_ms;
            }
            _ => window.open_ms = window.open_ms.max(since_ms),
        }
        window
    }

    fn wait_for(&self, lane: LaneId, next: usize, since_ms: f64) -> LaneState {
        if self.timeline.lane_target(lane, next).is_some() {
            LaneState::Waiting { next, since_ms }
        } else {
            LaneState::Exhausted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ProgressionCompiler;
    use approx::assert_relative_eq;
    use fantasia_domain::{ChordSpec, Progression};

    fn scheduler(names: &[&str], lanes: usize, policy: WindowPolicy, looping: bool) -> JudgmentScheduler {
        let tb = TimeBase::new(120.0, 4, 0).unwrap();
        let progression = Progression::Flat(names.iter().map(|n| ChordSpec::from(*n)).collect());
        let timeline =
            ProgressionCompiler::compile_with(&progression, &tb, names.len() as u32, lanes, looping)
                .unwrap();
        JudgmentScheduler::new(timeline, policy)
    }

    fn deadline() -> WindowPolicy {
        WindowPolicy::Deadline {
            arm_lead_ms: 1500.0,
            null_interval_ms: 100.0,
            tail_ms: 2000.0,
        }
    }

    fn symmetric() -> WindowPolicy {
        WindowPolicy::Symmetric {
            tolerance_ms: 200.0,
            perfect_ms: 50.0,
        }
    }

    fn lanes_for(scheduler: &JudgmentScheduler, count: usize) -> Vec<Lane> {
        (0..count)
            .map(|id| Lane::new(id, 5, scheduler.initial_state(id)))
            .collect()
    }

    fn drain(scheduler: &JudgmentScheduler, lanes: &mut [Lane], now: f64) -> Vec<Judgment> {
        std::iter::from_fn(|| scheduler.next_transition(lanes, now)).collect()
    }

    fn play(scheduler: &JudgmentScheduler, lanes: &mut [Lane], notes: &[i32], at: f64) -> Vec<Judgment> {
        drain(scheduler, lanes, at);
        notes
            .iter()
            .flat_map(|note| scheduler.apply_input(lanes, &InputEvent::new(*note, at), at))
            .collect()
    }

    #[test]
    fn deadline_window_closes_before_next_arm() {
        let s = scheduler(&["C", "F", "G"], 1, deadline(), false);
        let first = s.window_for(0, 0).unwrap();
        assert_relative_eq!(first.open_ms, -1500.0);
        assert_relative_eq!(first.close_ms, 400.0);
        let last = s.window_for(0, 2).unwrap();
        assert_relative_eq!(last.close_ms, 6000.0);
    }

    #[test]
    fn null_gap_never_exceeds_half_the_spacing() {
        let policy = WindowPolicy::Deadline {
            arm_lead_ms: 0.0,
            null_interval_ms: 5000.0,
            tail_ms: 2000.0,
        };
        let s = scheduler(&["C", "F"], 1, policy, false);
        let first = s.window_for(0, 0).unwrap();
        assert_relative_eq!(first.close_ms, 1000.0);
    }

    fn dense_timed(policy: WindowPolicy) -> JudgmentScheduler {
        let tb = TimeBase::new(120.0, 4, 0).unwrap();
        let progression = Progression::Timed(
            [(1.0, "C"), (2.0, "F"), (3.0, "G")]
                .iter()
                .map(|(beat, name)| fantasia_domain::TimedEntry {
                    bar: 1,
                    beat: *beat,
                    chord: ChordSpec::from(*name),
                    lane: None,
                })
                .collect(),
        );
        let timeline = ProgressionCompiler::compile_with(&progression, &tb, 1, 1, true).unwrap();
        JudgmentScheduler::new(timeline, policy)
    }

    #[test]
    fn dense_lane_windows_contain_their_beat() {
        let s = dense_timed(deadline());
        let bounds: Vec<(f64, f64, f64)> = (0..6)
            .map(|sequence| {
                let w = s.window_for(0, sequence).unwrap();
                (w.open_ms, w.target.time_ms, w.close_ms)
            })
            .collect();
        for (open, time, close) in &bounds {
            assert!(open <= time && time < close, "{open} {time} {close}");
        }
        for pair in bounds.windows(2) {
            assert!(pair[0].2 <= pair[1].0);
        }
        assert_relative_eq!(bounds[0].0, -1500.0);
        assert_relative_eq!(bounds[0].2, 50.0);
        assert_relative_eq!(bounds[1].0, 100.0);
        assert_relative_eq!(bounds[1].2, 550.0);
        assert_relative_eq!(bounds[2].0, 600.0);
        assert_relative_eq!(bounds[2].2, 1050.0);
        assert_relative_eq!(bounds[3].0, 1100.0);
    }

    #[test]
    fn dense_lane_is_playable_on_the_beat() {
        let s = dense_timed(deadline());
        let mut lanes = lanes_for(&s, 1);
        let opening = drain(&s, &mut lanes, 0.0);
        assert!(opening.iter().all(|j| matches!(j, Judgment::Armed { .. })));
        for (at, notes) in [(20.0, [60, 64, 67]), (520.0, [65, 69, 72]), (1020.0, [67, 71, 74])] {
            let hits = play(&s, &mut lanes, &notes, at);
            assert!(matches!(hits.as_slice(), [Judgment::Hit { .. }]), "at {at}");
        }
    }

    #[test]
    fn gauge_window_starts_when_the_lane_frees() {
        let timeline =
            ProgressionCompiler::compile_pool(&[ChordSpec::from("Am")], 1, 3).unwrap();
        let s = JudgmentScheduler::new(timeline, WindowPolicy::Gauge { gauge_ms: 4000.0 });
        let mut lanes = lanes_for(&s, 1);
        let armed = drain(&s, &mut lanes, 0.0);
        assert!(matches!(
            armed.as_slice(),
            [Judgment::Armed { window, .. }] if window.open_ms == 0.0 && window.close_ms == 4000.0
        ));
        let hits = play(&s, &mut lanes, &[57, 60, 64], 1500.0);
        assert!(matches!(hits.as_slice(), [Judgment::Hit { grade: HitGrade::Perfect, offset_ms, .. }] if *offset_ms == 1500.0));
        let next = drain(&s, &mut lanes, 1500.0);
        assert!(matches!(
            next.as_slice(),
            [Judgment::Armed { window, .. }] if window.open_ms == 1500.0 && window.close_ms == 5500.0
        ));
        let missed = drain(&s, &mut lanes, 5500.0);
        assert!(matches!(missed.as_slice(), [Judgment::Timeout { .. }, Judgment::Armed { window, .. }] if window.open_ms == 5500.0));
    }

    #[test]
    fn arms_then_times_out_exactly_once() {
        let s = scheduler(&["C", "F"], 1, deadline(), false);
        let mut lanes = lanes_for(&s, 1);
        let first = drain(&s, &mut lanes, 0.0);
        assert!(matches!(first.as_slice(), [Judgment::Armed { .. }]));
        let at_deadline = drain(&s, &mut lanes, 400.0);
        assert_eq!(at_deadline.len(), 1);
        assert!(matches!(at_deadline[0], Judgment::Timeout { .. }));
        assert!(drain(&s, &mut lanes, 400.0).is_empty());
        assert!(drain(&s, &mut lanes, 450.0).is_empty());
        assert!(matches!(lanes[0].state, LaneState::Waiting { next: 1, .. }));
        assert!(s.answerable(&lanes[0], 450.0).is_none());
    }

    #[test]
    fn chord_in_any_order_hits_once() {
        let s = scheduler(&["C", "F"], 1, deadline(), false);
        let mut lanes = lanes_for(&s, 1);
        let hits = play(&s, &mut lanes, &[64, 55, 72], 0.0);
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0], Judgment::Hit { ref window, .. } if window.target.id == 0));
        // replaying the same notes cannot hit the resolved target again
        assert!(play(&s, &mut lanes, &[64, 55, 72], 0.0).is_empty());
    }

    #[test]
    fn answerable_reports_remaining_time() {
        let s = scheduler(&["C", "F"], 1, deadline(), false);
        let mut lanes = lanes_for(&s, 1);
        drain(&s, &mut lanes, 100.0);
        let (target, remaining) = s.answerable(&lanes[0], 100.0).unwrap();
        assert_eq!(target.chord.to_string(), "C");
        assert_relative_eq!(remaining, 300.0);
    }

    #[test]
    fn broadcast_resolves_every_lane_with_the_same_chord() {
        let tb = TimeBase::new(120.0, 4, 0).unwrap();
        let progression = Progression::Timed(
            [(0usize, 1.0), (1, 1.5)]
                .iter()
                .map(|(lane, beat)| fantasia_domain::TimedEntry {
                    bar: 1,
                    beat: *beat,
                    chord: ChordSpec::from("G7"),
                    lane: Some(*lane),
                })
                .collect(),
        );
        let timeline = ProgressionCompiler::compile_with(&progression, &tb, 1, 2, false).unwrap();
        let s = JudgmentScheduler::new(timeline, deadline());
        let mut lanes = lanes_for(&s, 2);
        let hits = play(&s, &mut lanes, &[55, 59, 62, 65], 0.0);
        let hit_lanes: Vec<LaneId> = hits
            .iter()
            .filter_map(|j| match j {
                Judgment::Hit { lane, .. } => Some(*lane),
                _ => None,
            })
            .collect();
        assert_eq!(hit_lanes, vec![0, 1]);
    }

    #[test]
    fn symmetric_window_grades_hits() {
        let s = scheduler(&["C", "F", "G"], 1, symmetric(), false);
        let mut lanes = lanes_for(&s, 1);
        assert!(play(&s, &mut lanes, &[0, 4, 7], -300.0).is_empty());
        let hits = play(&s, &mut lanes, &[0, 4, 7], 30.0);
        assert!(matches!(hits[0], Judgment::Hit { grade: HitGrade::Perfect, .. }));
        let hits = play(&s, &mut lanes, &[5, 9, 0], 2150.0);
        assert!(matches!(hits[0], Judgment::Hit { grade: HitGrade::Good, .. }));
    }

    #[test]
    fn large_jump_resolves_windows_in_order() {
        let s = scheduler(&["C", "F", "G"], 1, symmetric(), false);
        let mut lanes = lanes_for(&s, 1);
        let judgments = drain(&s, &mut lanes, 10_000.0);
        let kinds: Vec<&str> = judgments
            .iter()
            .map(|j| match j {
                Judgment::Armed { .. } => "armed",
                Judgment::Hit { .. } => "hit",
                Judgment::Timeout { .. } => "timeout",
            })
            .collect();
        assert_eq!(kinds, vec!["armed", "timeout", "armed", "timeout", "armed", "timeout"]);
        assert_eq!(lanes[0].state, LaneState::Exhausted);
    }

    #[test]
    fn looping_timeline_keeps_arming() {
        let s = scheduler(&["C", "F"], 1, symmetric(), true);
        let mut lanes = lanes_for(&s, 1);
        let judgments = drain(&s, &mut lanes, 4000.0);
        let last_armed = judgments
            .iter()
            .rev()
            .find_map(|j| match j {
                Judgment::Armed { window, .. } => Some(window.target.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_armed.id, 2);
        assert_relative_eq!(last_armed.time_ms, 4000.0);
    }
}
