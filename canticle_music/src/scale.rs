// Scales, modes and pitch quantization.
//
// A `Scale` is a validated list of semitone offsets from a root within one
// octave (0 always present, non-decreasing, at most 12 for an optional
// octave-closing degree). Validation happens once, at construction, so
// quantization itself can never fail.
//
// This module provides:
// - Named scale/mode definitions (`ScaleKind`)
// - `quantize`: snap any pitch to the nearest in-scale pitch
// - `build_scale`: enumerate the concrete in-scale MIDI notes in a range
// - `Scale::degree_pitch`: index into an unbounded diatonic degree table
// - `map_to_scale`: select a note from a concrete scale list by value
//
// Used by every generator that turns raw values into pitches, and by
// `transform::quantize_grid`.

use crate::error::{CanticleError, Result};
use crate::mapping::{clamp_midi, map_to_index};
use serde::{Deserialize, Serialize};

/// Named scales and church modes, each an interval pattern from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    /// Ionian: C D E F G A B
    Major,
    /// Natural minor with raised 6th.
    Dorian,
    /// Half step from 1 to 2.
    Phrygian,
    /// Raised 4th.
    Lydian,
    /// Major with lowered 7th.
    Mixolydian,
    /// Natural minor.
    Aeolian,
    Locrian,
    HarmonicMinor,
    MajorPentatonic,
    MinorPentatonic,
    WholeTone,
    Chromatic,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 12] = [
        ScaleKind::Major,
        ScaleKind::Dorian,
        ScaleKind::Phrygian,
        ScaleKind::Lydian,
        ScaleKind::Mixolydian,
        ScaleKind::Aeolian,
        ScaleKind::Locrian,
        ScaleKind::HarmonicMinor,
        ScaleKind::MajorPentatonic,
        ScaleKind::MinorPentatonic,
        ScaleKind::WholeTone,
        ScaleKind::Chromatic,
    ];

    /// Semitone offsets from the root, ascending.
    pub fn offsets(self) -> &'static [u8] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleKind::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleKind::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            ScaleKind::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleKind::Aeolian => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            ScaleKind::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleKind::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleKind::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleKind::WholeTone => &[0, 2, 4, 6, 8, 10],
            ScaleKind::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn scale(self) -> Scale {
        Scale {
            offsets: self.offsets().to_vec(),
        }
    }

    /// Parse a scale name, accepting common aliases ("ionian", "minor").
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_lowercase().replace(['-', ' '], "_").as_str() {
            "major" | "ionian" => ScaleKind::Major,
            "dorian" => ScaleKind::Dorian,
            "phrygian" => ScaleKind::Phrygian,
            "lydian" => ScaleKind::Lydian,
            "mixolydian" => ScaleKind::Mixolydian,
            "aeolian" | "minor" | "natural_minor" => ScaleKind::Aeolian,
            "locrian" => ScaleKind::Locrian,
            "harmonic_minor" => ScaleKind::HarmonicMinor,
            "pentatonic" | "major_pentatonic" => ScaleKind::MajorPentatonic,
            "minor_pentatonic" => ScaleKind::MinorPentatonic,
            "whole_tone" => ScaleKind::WholeTone,
            "chromatic" => ScaleKind::Chromatic,
            _ => return None,
        };
        Some(kind)
    }
}

/// A validated set of pitch-class offsets from a root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Scale {
    offsets: Vec<u8>,
}

impl Scale {
    /// Build a scale from raw offsets.
    ///
    /// Fails with `MalformedScale` unless the offsets are non-empty, start at
    /// 0, never decrease, and stay within [0, 12] (12 being the optional
    /// octave-closing degree).
    pub fn new(offsets: Vec<u8>) -> Result<Self> {
        if offsets.is_empty() {
            return Err(CanticleError::MalformedScale("no offsets".into()));
        }
        if offsets[0] != 0 {
            return Err(CanticleError::MalformedScale(format!(
                "first offset must be 0, got {}",
                offsets[0]
            )));
        }
        if let Some(&bad) = offsets.iter().find(|&&o| o > 12) {
            return Err(CanticleError::MalformedScale(format!(
                "offset {bad} is outside [0, 12]"
            )));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(CanticleError::MalformedScale(format!(
                "offsets must be non-decreasing: {offsets:?}"
            )));
        }
        Ok(Scale { offsets })
    }

    pub fn offsets(&self) -> &[u8] {
        &self.offsets
    }

    /// The distinct degrees within one octave (drops duplicates and the
    /// octave-closing 12). Never empty, since 0 is always present.
    pub fn degrees(&self) -> Vec<u8> {
        let mut degrees: Vec<u8> = self.offsets.iter().copied().filter(|&o| o < 12).collect();
        degrees.dedup();
        degrees
    }

    /// Whether a pitch class (relative to the root) is in the scale.
    pub fn contains_pitch_class(&self, pc: u8) -> bool {
        self.offsets.iter().any(|&o| o % 12 == pc % 12)
    }

    /// Whether a MIDI pitch is in the scale rooted at `root`.
    pub fn contains(&self, pitch: u8, root: u8) -> bool {
        let pc = (pitch as i64 - root as i64).rem_euclid(12) as u8;
        self.contains_pitch_class(pc)
    }

    /// Snap `pitch` to the nearest scale member.
    ///
    /// The pitch is split into octave and pitch class relative to `root`
    /// (floor division, so negative values behave). The offset with the
    /// smallest distance to the pitch class wins; on a tie the lower offset
    /// wins. Distance is measured within the octave only. The result is
    /// clamped to [0, 127].
    pub fn quantize(&self, pitch: i64, root: i64) -> u8 {
        let relative = pitch - root;
        let octave = relative.div_euclid(12);
        let pc = relative.rem_euclid(12);

        let mut best = self.offsets[0] as i64;
        let mut best_distance = (best - pc).abs();
        for &offset in &self.offsets[1..] {
            let distance = (offset as i64 - pc).abs();
            // Strict `<` keeps the first (lowest) offset on ties.
            if distance < best_distance {
                best = offset as i64;
                best_distance = distance;
            }
        }

        clamp_midi(octave * 12 + root + best)
    }

    /// Pitch of scale-degree `index` above `tonic`, for an unbounded index.
    ///
    /// `octave = index div n`, `degree = index mod n` with floor semantics,
    /// so index -1 is the top degree one octave below the tonic. Not clamped;
    /// callers clamp at emission.
    pub fn degree_pitch(&self, index: i64, tonic: i64) -> i64 {
        let degrees = self.degrees();
        let n = degrees.len() as i64;
        let octave = index.div_euclid(n);
        let degree = index.rem_euclid(n) as usize;
        octave * 12 + degrees[degree] as i64 + tonic
    }
}

impl TryFrom<Vec<u8>> for Scale {
    type Error = CanticleError;

    fn try_from(offsets: Vec<u8>) -> Result<Self> {
        Scale::new(offsets)
    }
}

impl From<Scale> for Vec<u8> {
    fn from(scale: Scale) -> Self {
        scale.offsets
    }
}

impl From<ScaleKind> for Scale {
    fn from(kind: ScaleKind) -> Self {
        kind.scale()
    }
}

/// Free-function form of [`Scale::quantize`].
pub fn quantize(pitch: i64, scale: &Scale, root: i64) -> u8 {
    scale.quantize(pitch, root)
}

/// Every MIDI note in `[low, high]` whose pitch class relative to `root`
/// matches one of `intervals` (mod 12), ascending.
pub fn build_scale(root: u8, intervals: &[u8], low: u8, high: u8) -> Vec<u8> {
    let high = high.min(127);
    if low > high {
        return Vec::new();
    }
    let classes: Vec<u8> = intervals.iter().map(|i| i % 12).collect();
    (low..=high)
        .filter(|&p| {
            let interval_class = (p as i64 - root as i64).rem_euclid(12) as u8;
            classes.contains(&interval_class)
        })
        .collect()
}

/// Map a continuous value onto a concrete scale-note list by index.
/// Returns `None` for an empty list.
pub fn map_to_scale(value: f64, in_min: f64, in_max: f64, notes: &[u8]) -> Option<u8> {
    if notes.is_empty() {
        return None;
    }
    Some(notes[map_to_index(value, in_min, in_max, notes.len())])
}
