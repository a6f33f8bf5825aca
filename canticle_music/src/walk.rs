// Random-walk (Brownian) melody.
//
// A scale-degree index starts at `start_index` and moves one degree up or
// down per note. The index is unbounded: it never wraps, and walking past
// the end of the degree table simply continues into the next octave. The
// only bound on pitch is the [0, 127] clamp applied when events are built.
//
// Draw order: the whole index path first (one `next_f64` per step, N-1
// steps for N notes), then one velocity draw per note.
//
// Output time base: beats.

use crate::error::{Result, require_nonzero, require_positive, require_range};
use crate::event::{Event, EventSequence, TimeBase};
use crate::scale::{Scale, ScaleKind};
use canticle_prng::RandomSource;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomWalk {
    /// Degree table the index walks over.
    pub scale: Scale,
    /// Pitch of degree 0.
    pub tonic: i64,
    pub start_index: i64,
    /// Probability of stepping up; otherwise the walk steps down.
    pub up_probability: f64,
    /// Slot length per note, in beats.
    pub note_duration: f64,
    /// Fraction of the slot that sounds.
    pub gate: f64,
    pub velocity_range: (u8, u8),
}

impl Default for RandomWalk {
    /// C major from C4 in eighth notes, a fair coin, bell-like 90-110 velocities.
    fn default() -> Self {
        RandomWalk {
            scale: ScaleKind::Major.scale(),
            tonic: 60,
            start_index: 0,
            up_probability: 0.5,
            note_duration: 0.5,
            gate: 0.9,
            velocity_range: (90, 110),
        }
    }
}

impl RandomWalk {
    pub fn new(scale: Scale, tonic: i64) -> Self {
        RandomWalk {
            scale,
            tonic,
            ..Default::default()
        }
    }

    /// The degree index visited by each of `length` notes.
    pub fn index_path(&self, length: usize, rng: &mut impl RandomSource) -> Vec<i64> {
        let mut path = Vec::with_capacity(length);
        if length == 0 {
            return path;
        }
        let mut index = self.start_index;
        path.push(index);
        for _ in 1..length {
            if rng.chance(self.up_probability) {
                index += 1;
            } else {
                index -= 1;
            }
            path.push(index);
        }
        path
    }

    pub fn pitch_of(&self, index: i64) -> i64 {
        self.scale.degree_pitch(index, self.tonic)
    }

    pub fn generate(&self, length: usize, rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_nonzero(length, "walk length")?;
        require_positive(self.note_duration, "note_duration")?;
        require_range(self.velocity_range, "velocity_range")?;

        let path = self.index_path(length, rng);
        let (lo, hi) = self.velocity_range;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, length);
        for (i, &index) in path.iter().enumerate() {
            let start = i as f64 * self.note_duration;
            let velocity = rng.next_int(lo as i64, hi as i64);
            seq.push(Event::new(
                self.pitch_of(index),
                start,
                self.note_duration * self.gate,
                velocity,
            ));
        }

        let (min_idx, max_idx) = path
            .iter()
            .fold((i64::MAX, i64::MIN), |(a, b), &i| (a.min(i), b.max(i)));
        debug!(notes = length, min_idx, max_idx, "random walk generated");
        Ok(seq)
    }
}
