pub mod analytics;
pub mod compiler;
pub mod input;
pub mod lanes;
pub mod matcher;
pub mod midi;
pub mod scheduler;
pub mod scoring;
pub mod session;

pub use analytics::SessionAnalytics;
pub use compiler::{ProgressionCompiler, Timeline};
pub use input::{input_channel, InputQueue, InputSender};
pub use lanes::{Lane, LaneManager};
pub use matcher::{ChordMatcher, InputAccumulator};
pub use midi::{decode_note_on, MidiBridge, MidiDevice, MidiManager};
pub use scheduler::{Judgment, JudgmentScheduler, JudgmentWindow, LaneState, WindowPolicy, WindowState};
pub use scoring::{PerformanceReport, ScoringEngine};
pub use session::{GameSession, SessionState};
