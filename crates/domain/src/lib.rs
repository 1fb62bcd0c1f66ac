pub mod chord;
pub mod error;
pub mod events;
pub mod io;
pub mod pitch;
pub mod stage;
pub mod tempo;

pub use crate::chord::{ChordQuality, ChordSpec, ChordSymbol, RootSpelling, Voicing};
pub use crate::error::DomainError;
pub use crate::events::{
    EngineEvent, HitGrade, InputEvent, LaneId, Phase, SessionResult, TargetEvent,
};
pub use crate::io::{StageFormat, StageLoader};
pub use crate::pitch::{PitchClass, PitchClassSet};
pub use crate::stage::{
    DamageRange, JudgeMode, Progression, StageConfig, StageRecord, TimedEntry, WindowConfig,
};
pub use crate::tempo::{MusicalPosition, SessionClock, TimeBase};
