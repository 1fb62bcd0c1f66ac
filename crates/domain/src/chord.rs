use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::pitch::{PitchClass, PitchClassSet};

/// Letter and accidental used for a root when the author gave no spelling.
const SHARP_SPELLINGS: [(char, i8); 12] = [
    ('C', 0),
    ('C', 1),
    ('D', 0),
    ('D', 1),
    ('E', 0),
    ('F', 0),
    ('F', 1),
    ('G', 0),
    ('G', 1),
    ('A', 0),
    ('A', 1),
    ('B', 0),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Power,
    Sixth,
    MinorSixth,
    Add9,
    Dominant7,
    Major7,
    Minor7,
    HalfDiminished7,
    MinorMajor7,
    Augmented7,
    Diminished7,
    Dominant7Sus4,
    Dominant9,
    Major9,
    Minor9,
}

impl ChordQuality {
    /// Semitone offsets above the root, in close root-position voicing.
    pub fn intervals(self) -> &'static [u8] {
        use ChordQuality::*;
        match self {
            Major => &[0, 4, 7],
            Minor => &[0, 3, 7],
            Diminished => &[0, 3, 6],
            Augmented => &[0, 4, 8],
            Sus2 => &[0, 2, 7],
            Sus4 => &[0, 5, 7],
            Power => &[0, 7],
            Sixth => &[0, 4, 7, 9],
            MinorSixth => &[0, 3, 7, 9],
            Add9 => &[0, 4, 7, 14],
            Dominant7 => &[0, 4, 7, 10],
            Major7 => &[0, 4, 7, 11],
            Minor7 => &[0, 3, 7, 10],
            HalfDiminished7 => &[0, 3, 6, 10],
            MinorMajor7 => &[0, 3, 7, 11],
            Augmented7 => &[0, 4, 8, 10],
            Diminished7 => &[0, 3, 6, 9],
            Dominant7Sus4 => &[0, 5, 7, 10],
            Dominant9 => &[0, 4, 7, 10, 14],
            Major9 => &[0, 4, 7, 11, 14],
            Minor9 => &[0, 3, 7, 10, 14],
        }
    }

    pub fn suffix(self) -> &'static str {
        use ChordQuality::*;
        match self {
            Major => "",
            Minor => "m",
            Diminished => "dim",
            Augmented => "aug",
            Sus2 => "sus2",
            Sus4 => "sus4",
            Power => "5",
            Sixth => "6",
            MinorSixth => "m6",
            Add9 => "add9",
            Dominant7 => "7",
            Major7 => "M7",
            Minor7 => "m7",
            HalfDiminished7 => "m7b5",
            MinorMajor7 => "m/maj7",
            Augmented7 => "aug7",
            Diminished7 => "dim7",
            Dominant7Sus4 => "7sus4",
            Dominant9 => "9",
            Major9 => "M9",
            Minor9 => "m9",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        use ChordQuality::*;
        let quality = match suffix {
            "" | "maj" | "M" => Major,
            "m" | "min" | "-" => Minor,
            "dim" | "°" | "o" => Diminished,
            "aug" | "+" => Augmented,
            "sus2" => Sus2,
            "sus4" | "sus" => Sus4,
            "5" => Power,
            "6" => Sixth,
            "m6" | "min6" => MinorSixth,
            "add9" => Add9,
            "7" => Dominant7,
            "M7" | "maj7" | "Δ7" | "Δ" => Major7,
            "m7" | "min7" | "-7" => Minor7,
            "m7b5" | "m7(b5)" | "ø" | "ø7" => HalfDiminished7,
            "m/maj7" | "mM7" | "m(maj7)" | "mmaj7" => MinorMajor7,
            "aug7" | "+7" | "7#5" => Augmented7,
            "dim7" | "°7" | "o7" => Diminished7,
            "7sus4" | "7sus" => Dominant7Sus4,
            "9" => Dominant9,
            "M9" | "maj9" => Major9,
            "m9" | "min9" => Minor9,
            _ => return None,
        };
        Some(quality)
    }
}

/// Display-only placement hints carried by authored chord entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voicing {
    pub octave: i8,
    pub inversion: u8,
}

impl Default for Voicing {
    fn default() -> Self {
        Self {
            octave: 4,
            inversion: 0,
        }
    }
}

/// How a root was written: `Db` and `C#` share a pitch class but not a spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootSpelling {
    pub letter: char,
    /// -1 flat, 0 natural, 1 sharp.
    pub accidental: i8,
}

impl RootSpelling {
    pub fn sharp(root: PitchClass) -> Self {
        let (letter, accidental) = SHARP_SPELLINGS[root.value() as usize];
        Self { letter, accidental }
    }
}

impl fmt::Display for RootSpelling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.accidental {
            a if a < 0 => "b",
            0 => "",
            _ => "#",
        };
        write!(f, "{}{}", self.letter, accidental)
    }
}

/// Wire form of a chord: its written name plus any voicing hints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChordRepr {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voicing: Option<Voicing>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "ChordRepr", try_from = "ChordRepr")]
pub struct ChordSymbol {
    pub root: PitchClass,
    pub quality: ChordQuality,
    pub spelling: RootSpelling,
    pub voicing: Option<Voicing>,
}

impl ChordSymbol {
    pub fn new(root: PitchClass, quality: ChordQuality) -> Self {
        Self {
            root,
            quality,
            spelling: RootSpelling::sharp(root),
            voicing: None,
        }
    }

    pub fn with_voicing(mut self, voicing: Voicing) -> Self {
        self.voicing = Some(voicing);
        self
    }

    /// The pitch classes a player must sound to satisfy this chord.
    pub fn pitch_classes(&self) -> PitchClassSet {
        self.quality
            .intervals()
            .iter()
            .map(|interval| self.root.transpose(*interval as i32))
            .collect()
    }

    /// Note numbers for on-screen guides, honouring the octave and inversion hints.
    pub fn display_notes(&self) -> Vec<u8> {
        let voicing = self.voicing.unwrap_or_default();
        let base = (voicing.octave as i32 + 1) * 12 + self.root.value() as i32;
        let mut notes: Vec<i32> = self
            .quality
            .intervals()
            .iter()
            .map(|interval| base + *interval as i32)
            .collect();
        let inversion = voicing.inversion as usize % notes.len();
        for note in notes.iter_mut().take(inversion) {
            *note += 12;
        }
        notes.sort_unstable();
        notes
            .into_iter()
            .map(|note| note.clamp(0, 127) as u8)
            .collect()
    }

    pub fn root_name(&self) -> String {
        self.spelling.to_string()
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.spelling, self.quality.suffix())
    }
}

impl FromStr for ChordSymbol {
    type Err = DomainError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        let mut chars = text.chars();
        let (letter, natural) = match chars.next() {
            Some('C') => ('C', 0),
            Some('D') => ('D', 2),
            Some('E') => ('E', 4),
            Some('F') => ('F', 5),
            Some('G') => ('G', 7),
            Some('A') => ('A', 9),
            Some('B') => ('B', 11),
            _ => return Err(DomainError::UnknownChord(input.to_string())),
        };
        let mut rest = chars.as_str();
        let mut offset = 0;
        if let Some(stripped) = rest.strip_prefix('#').or_else(|| rest.strip_prefix('♯')) {
            offset = 1;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('b').or_else(|| rest.strip_prefix('♭')) {
            offset = -1;
            rest = stripped;
        }
        let quality = ChordQuality::from_suffix(rest)
            .ok_or_else(|| DomainError::UnknownChord(input.to_string()))?;
        Ok(Self {
            root: PitchClass::from_note(natural + offset),
            quality,
            spelling: RootSpelling {
                letter,
                accidental: offset as i8,
            },
            voicing: None,
        })
    }
}

impl From<ChordSymbol> for ChordRepr {
    fn from(chord: ChordSymbol) -> Self {
        ChordRepr {
            name: chord.to_string(),
            voicing: chord.voicing,
        }
    }
}

impl TryFrom<ChordRepr> for ChordSymbol {
    type Error = DomainError;

    fn try_from(repr: ChordRepr) -> Result<Self, Self::Error> {
        let chord: ChordSymbol = repr.name.parse()?;
        Ok(match repr.voicing {
            Some(voicing) => chord.with_voicing(voicing),
            None => chord,
        })
    }
}

/// A chord as authored in a stage file: either a bare name or a name with voicing hints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChordSpec {
    Name(String),
    Voiced {
        chord: String,
        #[serde(default)]
        octave: Option<i8>,
        #[serde(default)]
        inversion: Option<u8>,
    },
}

impl ChordSpec {
    pub fn name(&self) -> &str {
        match self {
            ChordSpec::Name(name) => name,
            ChordSpec::Voiced { chord, .. } => chord,
        }
    }

    pub fn resolve(&self) -> Result<ChordSymbol, DomainError> {
        match self {
            ChordSpec::Name(name) => name.parse(),
            ChordSpec::Voiced {
                chord,
                octave,
                inversion,
            } => {
                let symbol: ChordSymbol = chord.parse()?;
                let defaults = Voicing::default();
                Ok(symbol.with_voicing(Voicing {
                    octave: octave.unwrap_or(defaults.octave),
                    inversion: inversion.unwrap_or(defaults.inversion),
                }))
            }
        }
    }
}

impl From<&str> for ChordSpec {
    fn from(name: &str) -> Self {
        ChordSpec::Name(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcs(name: &str) -> Vec<u8> {
        let chord: ChordSymbol = name.parse().unwrap();
        chord.pitch_classes().iter().map(PitchClass::value).collect()
    }

    #[test]
    fn parses_common_symbols() {
        assert_eq!(pcs("C"), vec![0, 4, 7]);
        assert_eq!(pcs("Dm"), vec![2, 5, 9]);
        assert_eq!(pcs("G7"), vec![2, 5, 7, 11]);
        assert_eq!(pcs("F#"), vec![1, 6, 10]);
        assert_eq!(pcs("Bbm"), vec![1, 5, 10]);
        assert_eq!(pcs("Cm7b5"), vec![0, 3, 6, 10]);
        assert_eq!(pcs("Cm/maj7"), vec![0, 3, 7, 11]);
        assert_eq!(pcs("C7sus4"), vec![0, 5, 7, 10]);
        assert_eq!(pcs("Cdim7"), vec![0, 3, 6, 9]);
    }

    #[test]
    fn ninth_folds_into_octave() {
        assert_eq!(pcs("C9"), vec![0, 2, 4, 7, 10]);
    }

    #[test]
    fn rejects_unknown_symbols() {
        assert!(matches!(
            "H7".parse::<ChordSymbol>(),
            Err(DomainError::UnknownChord(_))
        ));
        assert!("Cblah".parse::<ChordSymbol>().is_err());
        assert!("".parse::<ChordSymbol>().is_err());
    }

    #[test]
    fn display_keeps_flat_spelling() {
        let chord: ChordSymbol = "Ebmaj7".parse().unwrap();
        assert_eq!(chord.to_string(), "EbM7");
        let sharp: ChordSymbol = "D#m".parse().unwrap();
        assert_eq!(sharp.to_string(), "D#m");
        let enharmonic: ChordSymbol = "Cb".parse().unwrap();
        assert_eq!(enharmonic.root.value(), 11);
        assert_eq!(enharmonic.to_string(), "Cb");
        assert_eq!(ChordSymbol::new(PitchClass::from_note(6), ChordQuality::Minor).to_string(), "F#m");
    }

    #[test]
    fn serialized_chord_keeps_voicing_and_spelling() {
        let chord = ChordSpec::Voiced {
            chord: "Gbm7".to_string(),
            octave: Some(3),
            inversion: Some(2),
        }
        .resolve()
        .unwrap();
        let json = serde_json::to_value(&chord).unwrap();
        assert_eq!(json["name"], "Gbm7");
        assert_eq!(json["voicing"]["octave"], 3);
        assert_eq!(json["voicing"]["inversion"], 2);
        let back: ChordSymbol = serde_json::from_value(json).unwrap();
        assert_eq!(back, chord);

        let plain = serde_json::to_value("E".parse::<ChordSymbol>().unwrap()).unwrap();
        assert!(plain.get("voicing").is_none());
    }

    #[test]
    fn voicing_applies_inversion() {
        let spec = ChordSpec::Voiced {
            chord: "C".to_string(),
            octave: Some(4),
            inversion: Some(1),
        };
        let chord = spec.resolve().unwrap();
        assert_eq!(chord.display_notes(), vec![64, 67, 72]);
        // Voicing never changes what has to be played.
        assert_eq!(chord.pitch_classes(), "C".parse::<ChordSymbol>().unwrap().pitch_classes());
    }

    #[test]
    fn chord_spec_deserializes_both_forms() {
        let specs: Vec<ChordSpec> =
            serde_json::from_str(r#"["Am", {"chord": "G", "octave": 3}]"#).unwrap();
        assert_eq!(specs[0].name(), "Am");
        let voiced = specs[1].resolve().unwrap();
        assert_eq!(voiced.voicing.map(|v| v.octave), Some(3));
    }
}
