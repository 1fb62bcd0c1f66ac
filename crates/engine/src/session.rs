//! Session phase tracking and the single `update` entry point.

use fantasia_domain::{
    DomainError, EngineEvent, InputEvent, LaneId, Phase, SessionResult, StageConfig, TargetEvent,
    TimeBase,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analytics::SessionAnalytics;
use crate::compiler::ProgressionCompiler;
use crate::input::InputQueue;
use crate::lanes::{Lane, LaneManager};
use crate::scheduler::{Judgment, JudgmentScheduler, WindowPolicy};
use crate::scoring::{PerformanceReport, ScoringEngine};

/// Observer-facing copy of the mutable session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub lanes: Vec<Lane>,
    pub backlog: usize,
    pub global_hp: u32,
    pub max_hp: u32,
    pub score: u64,
    pub correct_count: u32,
    pub total_count: u32,
    pub combo: u32,
    pub max_combo: u32,
    /// Milliseconds past the count-in of the last processed tick.
    pub clock_ms: f64,
}

/// Drives one play-through of a stage.
///
/// The session is the only writer of its state. An external pump calls
/// [`GameSession::update`] with the raw time since start; everything else is
/// derived from elapsed time, so irregular tick spacing is fine.
pub struct GameSession {
    stage_id: String,
    time_base: TimeBase,
    scheduler: JudgmentScheduler,
    lanes: LaneManager,
    scoring: ScoringEngine,
    phase: Phase,
    global_hp: u32,
    max_hp: u32,
    correct_count: u32,
    total_count: u32,
    required_count: Option<u32>,
    last_now_ms: f64,
    clock_ms: f64,
}

impl GameSession {
    /// Validates the stage and compiles its progression. Fails before any play begins.
    pub fn new(stage: &StageConfig) -> Result<Self, DomainError> {
        stage.validate()?;
        let time_base = stage.time_base()?;
        let timeline = ProgressionCompiler::compile(stage)?;
        let scheduler = JudgmentScheduler::new(timeline, WindowPolicy::for_stage(stage, &time_base));
        let lanes = LaneManager::new(stage, |lane| scheduler.initial_state(lane));
        Ok(Self {
            stage_id: stage.id.clone(),
            time_base,
            scheduler,
            lanes,
            scoring: ScoringEngine::new(),
            phase: Phase::Init,
            global_hp: stage.max_hp,
            max_hp: stage.max_hp,
            correct_count: 0,
            total_count: 0,
            required_count: stage.required_count,
            last_now_ms: 0.0,
            clock_ms: f64::NEG_INFINITY,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    pub fn scheduler(&self) -> &JudgmentScheduler {
        &self.scheduler
    }

    pub fn lanes(&self) -> &[Lane] {
        self.lanes.lanes()
    }

    pub fn global_hp(&self) -> u32 {
        self.global_hp
    }

    pub fn report(&self) -> &PerformanceReport {
        self.scoring.report()
    }

    /// `Init -> CountIn`. Later calls are ignored.
    pub fn start(&mut self, now_ms: f64) -> Vec<EngineEvent> {
        if self.phase != Phase::Init {
            return Vec::new();
        }
        info!(stage = %self.stage_id, count_in_ms = self.time_base.count_in_ms(), "session started");
        self.last_now_ms = now_ms.max(0.0);
        self.clock_ms = self.time_base.session_ms(self.last_now_ms);
        self.phase = Phase::CountIn;
        vec![EngineEvent::PhaseChanged {
            phase: Phase::CountIn,
        }]
    }

    /// Ends the session at once. Clears every lane and window; nothing is emitted afterwards.
    pub fn stop(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        info!(stage = %self.stage_id, "session stopped");
        self.lanes.clear();
        self.phase = Phase::Stopped;
    }

    pub fn update_from_queue(&mut self, now_ms: f64, queue: &mut InputQueue) -> Vec<EngineEvent> {
        let inputs = queue.drain();
        self.update(now_ms, inputs)
    }

    /// Advances the session to `now_ms` (raw ms since start), judging `inputs` in timestamp order.
    ///
    /// Time never runs backwards: an earlier `now_ms` is clamped to the last one seen.
    /// Inputs outside the `Active` phase are discarded.
    pub fn update<I>(&mut self, now_ms: f64, inputs: I) -> Vec<EngineEvent>
    where
        I: IntoIterator<Item = InputEvent>,
    {
        let mut events = Vec::new();
        if matches!(self.phase, Phase::Init) || self.phase.is_terminal() {
            return events;
        }
        if now_ms < self.last_now_ms {
            debug!(now_ms, last_ms = self.last_now_ms, "clock moved backwards, clamping");
        }
        let previous_ms = self.last_now_ms;
        let now_ms = now_ms.max(previous_ms);
        self.last_now_ms = now_ms;
        let now = self.time_base.session_ms(now_ms);

        if self.phase == Phase::CountIn {
            if now < 0.0 {
                self.clock_ms = now;
                return events;
            }
            info!(stage = %self.stage_id, "count-in finished");
            self.phase = Phase::Active;
            events.push(EngineEvent::PhaseChanged {
                phase: Phase::Active,
            });
        }

        let mut inputs: Vec<InputEvent> = inputs.into_iter().collect();
        inputs.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
        for input in inputs {
            if self.phase.is_terminal() {
                break;
            }
            let at = self
                .time_base
                .session_ms(input.timestamp_ms.clamp(previous_ms, now_ms))
                .max(self.clock_ms);
            if at < 0.0 {
                continue;
            }
            self.advance_to(at, &mut events);
            if self.phase.is_terminal() {
                break;
            }
            let judgments = self.scheduler.apply_input(self.lanes.lanes_mut(), &input, at);
            for judgment in judgments {
                self.handle(judgment, &mut events);
                if self.phase.is_terminal() {
                    break;
                }
            }
        }
        self.advance_to(now, &mut events);
        events
    }

    /// The lane's answerable target and remaining time at the last processed tick.
    pub fn answerable(&self, lane: LaneId) -> Option<(&TargetEvent, f64)> {
        if self.phase != Phase::Active {
            return None;
        }
        let lane = self.lanes.lane(lane)?;
        self.scheduler.answerable(lane, self.clock_ms)
    }

    pub fn snapshot(&self) -> SessionState {
        let report = self.scoring.report();
        SessionState {
            phase: self.phase,
            lanes: self.lanes.lanes().to_vec(),
            backlog: self.lanes.backlog(),
            global_hp: self.global_hp,
            max_hp: self.max_hp,
            score: report.score,
            correct_count: self.correct_count,
            total_count: self.total_count,
            combo: self.scoring.combo(),
            max_combo: report.max_combo,
            clock_ms: self.clock_ms,
        }
    }

    /// Result summary once the session has ended with a clear or a game over.
    pub fn analytics(&self) -> Option<SessionAnalytics> {
        let result = match self.phase {
            Phase::Cleared => SessionResult::Clear,
            Phase::GameOver => SessionResult::GameOver,
            _ => return None,
        };
        Some(SessionAnalytics::new(
            self.stage_id.clone(),
            result,
            self.scoring.report().clone(),
        ))
    }

    fn advance_to(&mut self, t: f64, events: &mut Vec<EngineEvent>) {
        while !self.phase.is_terminal() {
            let Some(judgment) = self.scheduler.next_transition(self.lanes.lanes_mut(), t) else {
                break;
            };
            self.handle(judgment, events);
        }
        self.clock_ms = self.clock_ms.max(t);
        self.evaluate_terminal(events);
    }

    fn handle(&mut self, judgment: Judgment, events: &mut Vec<EngineEvent>) {
        match judgment {
            Judgment::Armed { lane, window } => {
                events.push(EngineEvent::TargetArmed {
                    lane,
                    target_id: window.target.id,
                    chord: window.target.chord,
                    deadline_ms: window.close_ms,
                });
            }
            Judgment::Hit {
                lane,
                window,
                grade,
                offset_ms,
            } => {
                self.correct_count += 1;
                self.total_count += 1;
                self.scoring.record_hit(grade, offset_ms);
                let combo = self.scoring.combo();
                self.lanes
                    .apply_hit(lane, &window.target, grade, combo, events);
            }
            Judgment::Timeout { lane, window } => {
                self.total_count += 1;
                self.scoring.record_miss();
                self.lanes
                    .apply_timeout(lane, &window.target, &mut self.global_hp, events);
            }
        }
        self.evaluate_terminal(events);
    }

    fn evaluate_terminal(&mut self, events: &mut Vec<EngineEvent>) {
        if self.phase != Phase::Active {
            return;
        }
        if self.global_hp == 0 {
            self.finish(Phase::GameOver, events);
        } else if self.lanes.all_defeated()
            || self
                .required_count
                .is_some_and(|required| self.correct_count >= required)
            || self.lanes.all_idle()
        {
            self.finish(Phase::Cleared, events);
        }
    }

    fn finish(&mut self, phase: Phase, events: &mut Vec<EngineEvent>) {
        let result = match phase {
            Phase::GameOver => SessionResult::GameOver,
            _ => SessionResult::Clear,
        };
        self.phase = phase;
        let score = self.scoring.report().score;
        info!(
            stage = %self.stage_id,
            ?result,
            score,
            correct = self.correct_count,
            total = self.total_count,
            "session complete"
        );
        events.push(EngineEvent::PhaseChanged { phase });
        events.push(EngineEvent::SessionComplete {
            result,
            score,
            correct_count: self.correct_count,
            total_count: self.total_count,
        });
    }
}
