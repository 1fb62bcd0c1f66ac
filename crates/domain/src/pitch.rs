use std::fmt;

use serde::{Deserialize, Serialize};

const NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A note identity reduced modulo 12 (C = 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const C: PitchClass = PitchClass(0);

    /// Reduces any raw note number (MIDI or otherwise) to its pitch class.
    pub fn from_note(note: i32) -> Self {
        Self(note.rem_euclid(12) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn transpose(self, semitones: i32) -> Self {
        Self::from_note(self.0 as i32 + semitones)
    }

    pub fn name(self) -> &'static str {
        NAMES[self.0 as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of pitch classes packed into the low 12 bits of a `u16`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchClassSet(u16);

impl PitchClassSet {
    pub const EMPTY: PitchClassSet = PitchClassSet(0);

    pub fn from_notes<I>(notes: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let mut set = Self::EMPTY;
        for note in notes {
            set.insert(PitchClass::from_note(note));
        }
        set
    }

    pub fn insert(&mut self, pc: PitchClass) {
        self.0 |= 1 << pc.value();
    }

    pub fn contains(&self, pc: PitchClass) -> bool {
        self.0 & (1 << pc.value()) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn is_superset_of(&self, other: &PitchClassSet) -> bool {
        other.0 & !self.0 == 0
    }

    pub fn difference(&self, other: &PitchClassSet) -> PitchClassSet {
        PitchClassSet(self.0 & !other.0)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = PitchClass> + '_ {
        (0u8..12)
            .filter(move |pc| self.0 & (1 << pc) != 0)
            .map(PitchClass)
    }
}

impl FromIterator<PitchClass> for PitchClassSet {
    fn from_iter<T: IntoIterator<Item = PitchClass>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for pc in iter {
            set.insert(pc);
        }
        set
    }
}

impl fmt::Display for PitchClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(PitchClass::name).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}
