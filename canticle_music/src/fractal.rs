// Recursive (fractal) generators: the golden tree and the Sierpinski
// triangle.
//
// Golden tree: every call emits one note, then branches twice, a fixed
// interval below and above, starting where the parent ends and lasting
// `GOLDEN_RATIO_CONJUGATE` times as long. Depth D yields a full binary tree
// of 2^D - 1 notes. Pitches are carried unclamped through the recursion and
// clamped only when a note is emitted, so a branch that wanders off the
// keyboard still steers its children back correctly.
//
// Sierpinski: a triangle in normalized (x, y) space, x for time and y for
// pitch, subdivided into its top, left and right halves down to the floor
// level, where each of the 3^(D-1) leaf triangles emits its three vertices.
// Emission order follows the recursion, not time; call `sort()` before
// playback.
//
// Neither generator draws randomness. Output is in beats.

use crate::error::{Result, invalid, require_nonzero, require_positive, require_range};
use crate::event::{Event, EventSequence, TimeBase};
use crate::mapping::{map_unclamped, map_value, midi_from_f64};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// (sqrt(5) - 1) / 2, the reciprocal of the golden ratio.
pub const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_894_9;

/// Deepest tree accepted; depth 20 is already a million notes.
pub const MAX_TREE_DEPTH: u32 = 20;

/// Deepest Sierpinski subdivision accepted.
pub const MAX_SIERPINSKI_DEPTH: u32 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldenTree {
    pub depth: u32,
    pub root_pitch: i64,
    /// Duration of the trunk note, in beats.
    pub initial_duration: f64,
    /// Semitones each branch moves away from its parent.
    pub interval: i64,
    pub velocity: u8,
}

impl Default for GoldenTree {
    fn default() -> Self {
        GoldenTree {
            depth: 8,
            root_pitch: 60,
            initial_duration: 4.0,
            interval: 5,
            velocity: 100,
        }
    }
}

impl GoldenTree {
    pub fn note_count(depth: u32) -> usize {
        (1usize << depth) - 1
    }

    pub fn generate(&self) -> Result<EventSequence> {
        require_nonzero(self.depth as usize, "tree depth")?;
        require_positive(self.initial_duration, "initial_duration")?;
        if self.depth > MAX_TREE_DEPTH {
            return Err(invalid("depth", format!("at most {MAX_TREE_DEPTH}")));
        }

        let mut seq = EventSequence::with_capacity(TimeBase::Beats, Self::note_count(self.depth));
        self.grow(&mut seq, 0.0, self.initial_duration, self.root_pitch, self.depth);
        debug!(depth = self.depth, notes = seq.len(), "golden tree generated");
        Ok(seq)
    }

    fn grow(&self, seq: &mut EventSequence, start: f64, duration: f64, pitch: i64, depth: u32) {
        if depth == 0 {
            return;
        }
        seq.push(Event::new(pitch, start, duration, self.velocity as i64));

        let next_start = start + duration;
        let next_duration = duration * GOLDEN_RATIO_CONJUGATE;
        self.grow(seq, next_start, next_duration, pitch - self.interval, depth - 1);
        self.grow(seq, next_start, next_duration, pitch + self.interval, depth - 1);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sierpinski {
    pub depth: u32,
    /// Top vertex of the outer triangle, in normalized coordinates.
    pub apex: DVec2,
    /// Base width and height of the outer triangle.
    pub size: DVec2,
    /// Beats spanned by x in [0, 1].
    pub total_duration: f64,
    /// Pitches spanned by y in [0, 1].
    pub pitch_range: (u8, u8),
    pub velocity: u8,
}

impl Default for Sierpinski {
    fn default() -> Self {
        Sierpinski {
            depth: 6,
            apex: DVec2::new(0.5, 0.9),
            size: DVec2::new(0.8, 0.8),
            total_duration: 16.0,
            pitch_range: (48, 84),
            velocity: 100,
        }
    }
}

impl Sierpinski {
    /// Leaf triangles visited at `depth`.
    pub fn leaf_count(depth: u32) -> usize {
        3usize.pow(depth.saturating_sub(1))
    }

    /// Notes emitted at `depth`: three vertices per leaf.
    pub fn note_count(depth: u32) -> usize {
        3 * Self::leaf_count(depth)
    }

    /// Every note lasts `0.5 / depth` beats, so deeper (denser) triangles
    /// get shorter notes.
    pub fn note_duration(&self) -> f64 {
        0.5 / self.depth as f64
    }

    pub fn generate(&self) -> Result<EventSequence> {
        require_nonzero(self.depth as usize, "Sierpinski depth")?;
        require_positive(self.total_duration, "total_duration")?;
        require_range(self.pitch_range, "pitch_range")?;
        if self.depth > MAX_SIERPINSKI_DEPTH {
            return Err(invalid("depth", format!("at most {MAX_SIERPINSKI_DEPTH}")));
        }

        let mut seq = EventSequence::with_capacity(TimeBase::Beats, Self::note_count(self.depth));
        self.subdivide(&mut seq, self.apex, self.size, self.depth);
        debug!(depth = self.depth, notes = seq.len(), "sierpinski triangle generated");
        Ok(seq)
    }

    fn subdivide(&self, seq: &mut EventSequence, top: DVec2, size: DVec2, depth: u32) {
        if depth == 1 {
            let (w, h) = (size.x, size.y);
            for vertex in [top, top + DVec2::new(-w / 2.0, -h), top + DVec2::new(w / 2.0, -h)] {
                seq.push(self.note_at(vertex));
            }
            return;
        }
        let half = size / 2.0;
        let (w, h) = (size.x, size.y);
        self.subdivide(seq, top, half, depth - 1);
        self.subdivide(seq, top + DVec2::new(-w / 4.0, -h / 2.0), half, depth - 1);
        self.subdivide(seq, top + DVec2::new(w / 4.0, -h / 2.0), half, depth - 1);
    }

    /// x maps to time without clamping; y maps to pitch, truncated and then
    /// held inside `pitch_range`.
    fn note_at(&self, point: DVec2) -> Event {
        let start = map_unclamped(point.x, 0.0, 1.0, 0.0, self.total_duration);
        let (low, high) = self.pitch_range;
        let raw = map_value(point.y, 0.0, 1.0, low as f64, high as f64, false);
        let pitch = midi_from_f64(raw).clamp(low, high);
        Event::new(pitch as i64, start, self.note_duration(), self.velocity as i64)
    }
}
