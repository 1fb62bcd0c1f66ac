use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A 1-based bar/beat location on the tempo grid. `beat` may be fractional.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MusicalPosition {
    pub measure: u32,
    pub beat: f64,
}

/// Fixed-tempo conversion between wall-clock milliseconds and musical time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimeBase {
    bpm: f64,
    beats_per_measure: u32,
    count_in_measures: u32,
}

impl TimeBase {
    pub fn new(bpm: f64, beats_per_measure: u32, count_in_measures: u32) -> Result<Self, DomainError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(DomainError::configuration(format!(
                "bpm must be a positive number, got {bpm}"
            )));
        }
        if beats_per_measure == 0 {
            return Err(DomainError::configuration(
                "time signature must have at least one beat per measure",
            ));
        }
        Ok(Self {
            bpm,
            beats_per_measure,
            count_in_measures,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    pub fn count_in_measures(&self) -> u32 {
        self.count_in_measures
    }

    pub fn ms_per_beat(&self) -> f64 {
        60_000.0 / self.bpm
    }

    pub fn beats_to_ms(&self, beats: f64) -> f64 {
        beats * 60_000.0 / self.bpm
    }

    pub fn ms_to_beats(&self, ms: f64) -> f64 {
        ms * self.bpm / 60_000.0
    }

    pub fn measure_ms(&self) -> f64 {
        self.beats_to_ms(self.beats_per_measure as f64)
    }

    pub fn count_in_ms(&self) -> f64 {
        self.measure_ms() * self.count_in_measures as f64
    }

    /// Length of one pass over `measure_count` measures.
    pub fn loop_ms(&self, measure_count: u32) -> f64 {
        self.measure_ms() * measure_count as f64
    }

    /// Absolute time of a 1-based bar/beat, measured from the end of the count-in.
    pub fn position_to_ms(&self, measure: u32, beat: f64) -> f64 {
        let beats = (measure.saturating_sub(1) as f64) * self.beats_per_measure as f64 + (beat - 1.0);
        self.beats_to_ms(beats)
    }

    /// Inverse of [`TimeBase::position_to_ms`]. Times before zero clamp to bar 1, beat 1.
    pub fn position_at(&self, ms: f64) -> MusicalPosition {
        let beats = self.ms_to_beats(ms.max(0.0));
        let per_measure = self.beats_per_measure as f64;
        let measure = (beats / per_measure).floor();
        MusicalPosition {
            measure: measure as u32 + 1,
            beat: beats - measure * per_measure + 1.0,
        }
    }

    /// Converts raw elapsed time since session start to time past the count-in.
    /// Negative while the count-in is still running.
    pub fn session_ms(&self, elapsed_ms: f64) -> f64 {
        elapsed_ms - self.count_in_ms()
    }
}

/// Monotonic clock anchored at session start.
///
/// `Copy` so an input thread can timestamp notes against the same origin the
/// clock pump uses.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    origin: Instant,
    offset_ms: f64,
}

impl SessionClock {
    pub fn start(time_base: &TimeBase) -> Self {
        Self::with_origin(Instant::now(), time_base.count_in_ms())
    }

    pub fn with_origin(origin: Instant, offset_ms: f64) -> Self {
        Self { origin, offset_ms }
    }

    /// Raw milliseconds since the session started.
    pub fn elapsed_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    /// Milliseconds since the session started, net of the count-in offset.
    pub fn now(&self) -> f64 {
        self.elapsed_ms() - self.offset_ms
    }
}
