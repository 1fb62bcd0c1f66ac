use fantasia_domain::{ChordSymbol, InputEvent, PitchClass, PitchClassSet};
use serde::{Deserialize, Serialize};

/// Decides whether played pitch classes satisfy a target chord.
///
/// Octave and arrival order never matter, and extra notes are allowed: the
/// input only has to contain every pitch class of the target.
pub struct ChordMatcher;

impl ChordMatcher {
    pub fn matches(input: &PitchClassSet, target: &PitchClassSet) -> bool {
        input.is_superset_of(target)
    }

    pub fn matches_chord(input: &PitchClassSet, chord: &ChordSymbol) -> bool {
        Self::matches(input, &chord.pitch_classes())
    }

    /// Pitch classes of the target the player has not sounded yet.
    pub fn missing(input: &PitchClassSet, target: &PitchClassSet) -> PitchClassSet {
        target.difference(input)
    }

    pub fn matches_notes<I>(notes: I, target: &PitchClassSet) -> bool
    where
        I: IntoIterator<Item = i32>,
    {
        Self::matches(&PitchClassSet::from_notes(notes), target)
    }
}

/// Pitch classes a lane has collected since its current target armed.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputAccumulator {
    notes: PitchClassSet,
}

impl InputAccumulator {
    pub fn push(&mut self, input: &InputEvent) {
        self.push_pitch_class(input.pitch_class());
    }

    pub fn push_pitch_class(&mut self, pc: PitchClass) {
        self.notes.insert(pc);
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn notes(&self) -> PitchClassSet {
        self.notes
    }

    pub fn satisfies(&self, target: &PitchClassSet) -> bool {
        ChordMatcher::matches(&self.notes, target)
    }
}
