// Sequence transforms over (pitch, duration) notes.
//
// Every transform is a pure function: it borrows its input and returns a new
// vector. Transforms assume nothing beyond the `Note` contract, so any chain
// of them is equivalent to applying each one's full effect in turn.
//
// Pitches are `i32` and unclamped here (transposing down two octaves and
// back up again must round-trip); clamping happens once, when `render` turns
// notes into events.
//
// `theme_and_variations` strings the transforms together into the classic
// theme / randomized / elongated+mutated / retrograde-inversion-down /
// recapitulation form, quantized to a scale and grid at the end.

use crate::error::{Result, invalid, require_nonzero, require_positive};
use crate::event::{Event, EventSequence, TimeBase};
use crate::mapping::clamp_channel;
use crate::scale::Scale;
use canticle_prng::RandomSource;
use serde::{Deserialize, Serialize};

/// Pitch steps a mutation may apply.
pub const MUTATION_STEPS: [i32; 4] = [-2, -1, 1, 2];

/// Duration factors a mutation may apply.
pub const MUTATION_FACTORS: [f64; 2] = [0.5, 2.0];

/// A pitch with a duration, the unit the transforms operate on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: i32,
    pub duration: f64,
}

impl Note {
    pub fn new(pitch: i32, duration: f64) -> Self {
        Note { pitch, duration }
    }
}

impl From<(i32, f64)> for Note {
    fn from((pitch, duration): (i32, f64)) -> Self {
        Note { pitch, duration }
    }
}

/// Reverse the order of notes. Durations travel with their pitches.
pub fn retrograde(notes: &[Note]) -> Vec<Note> {
    notes.iter().rev().copied().collect()
}

/// Add `interval` semitones to every pitch. No clamping.
pub fn transpose(notes: &[Note], interval: i32) -> Vec<Note> {
    notes
        .iter()
        .map(|n| Note::new(n.pitch + interval, n.duration))
        .collect()
}

/// Multiply every duration by `factor`.
pub fn elongate(notes: &[Note], factor: f64) -> Vec<Note> {
    notes
        .iter()
        .map(|n| Note::new(n.pitch, n.duration * factor))
        .collect()
}

/// Add a uniform random integer in `[-amount, amount]` to every pitch.
/// One draw per note, in order.
pub fn randomize(notes: &[Note], amount: i32, rng: &mut impl RandomSource) -> Vec<Note> {
    let amount = amount.unsigned_abs() as i64;
    notes
        .iter()
        .map(|n| Note::new(n.pitch + rng.next_int(-amount, amount) as i32, n.duration))
        .collect()
}

/// Apply `count` independent point mutations.
///
/// Per mutation the draws are: note index, then a coin (`> 0.5` mutates the
/// pitch by one of `MUTATION_STEPS`, otherwise the duration by one of
/// `MUTATION_FACTORS`), then the step or factor. The same note may be hit
/// more than once. An empty input is returned unchanged without drawing.
pub fn mutate(notes: &[Note], count: usize, rng: &mut impl RandomSource) -> Vec<Note> {
    let mut out = notes.to_vec();
    if out.is_empty() {
        return out;
    }
    for _ in 0..count {
        let idx = rng.next_index(out.len());
        let note = &mut out[idx];
        if rng.next_f64() > 0.5 {
            note.pitch += MUTATION_STEPS[rng.next_index(MUTATION_STEPS.len())];
        } else {
            note.duration *= MUTATION_FACTORS[rng.next_index(MUTATION_FACTORS.len())];
        }
    }
    out
}

/// Round durations to the nearest multiple of `grid` (ties to even, zero
/// results bumped up to one grid unit) and quantize pitches to `scale`.
pub fn quantize_grid(notes: &[Note], grid: f64, scale: &Scale, root: i64) -> Result<Vec<Note>> {
    require_positive(grid, "grid")?;
    Ok(notes
        .iter()
        .map(|n| {
            let units = (n.duration / grid).round_ties_even();
            let duration = if units <= 0.0 { grid } else { units * grid };
            Note::new(scale.quantize(n.pitch as i64, root) as i32, duration)
        })
        .collect())
}

/// Lay notes end to end from `start`, each sounding for `gate` of its slot.
/// Output is in beats and already time-ordered.
pub fn render(notes: &[Note], start: f64, velocity: u8, gate: f64) -> EventSequence {
    let mut seq = EventSequence::with_capacity(TimeBase::Beats, notes.len());
    let mut cursor = start;
    for n in notes {
        seq.push(Event::new(n.pitch as i64, cursor, n.duration * gate, velocity as i64));
        cursor += n.duration;
    }
    seq
}

/// Total length of a note list.
pub fn total_duration(notes: &[Note]) -> f64 {
    notes.iter().map(|n| n.duration).sum()
}

/// The opening theme used when no other theme is supplied:
/// C4 E4 G4 A4 B4 A4 B4 C5.
pub fn default_theme() -> Vec<Note> {
    [
        (60, 0.5),
        (64, 0.5),
        (67, 1.0),
        (69, 0.25),
        (71, 0.25),
        (69, 0.25),
        (71, 0.25),
        (72, 1.0),
    ]
    .into_iter()
    .map(Note::from)
    .collect()
}

/// Theme followed by four variations, quantized to `scale` on a
/// sixteenth-note grid.
///
/// 1. theme randomized by ±3 semitones
/// 2. theme elongated ×2, then two mutations
/// 3. theme in retrograde, an octave down
/// 4. the theme again
///
/// Random draws happen in that order.
pub fn theme_and_variations(
    theme: &[Note],
    scale: &Scale,
    root: i64,
    rng: &mut impl RandomSource,
) -> Result<Vec<Note>> {
    let var1 = randomize(theme, 3, rng);
    let var2 = mutate(&elongate(theme, 2.0), 2, rng);
    let var3 = transpose(&retrograde(theme), -12);
    let var4 = theme.to_vec();

    let mut all = theme.to_vec();
    for part in [var1, var2, var3, var4] {
        all.extend(part);
    }
    quantize_grid(&all, 0.25, scale, root)
}

/// One voice of a canon: when it enters, how far it is transposed and how
/// much slower (stretch > 1) or faster it runs than the leader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonVoice {
    pub offset: f64,
    pub transposition: i32,
    pub stretch: f64,
}

impl CanonVoice {
    pub fn new(offset: f64, transposition: i32, stretch: f64) -> Self {
        CanonVoice {
            offset,
            transposition,
            stretch,
        }
    }

    /// A voice playing at `tempo` against a leader at `reference_tempo`,
    /// as in phase music where a second player runs slightly ahead.
    pub fn phased(reference_tempo: f64, tempo: f64) -> Self {
        CanonVoice::new(0.0, 0, reference_tempo / tempo)
    }
}

/// Merge one copy of `seq` per voice. Each copy has its times scaled by the
/// voice's stretch, its pitches transposed, and is then shifted to the
/// voice's entry. Voice `i` plays on MIDI channel `i` (clamped to 15), so
/// canon copies never share a channel with each other. Controls are copied
/// the same way.
pub fn canon(seq: &EventSequence, voices: &[CanonVoice]) -> Result<EventSequence> {
    require_nonzero(voices.len(), "canon voices")?;
    for v in voices {
        require_positive(v.stretch, "stretch")?;
        if !v.offset.is_finite() {
            return Err(invalid("offset", format!("must be finite, got {}", v.offset)));
        }
    }

    let mut out = EventSequence::with_capacity(seq.time_base(), seq.len() * voices.len());
    for (channel, v) in voices.iter().enumerate() {
        for e in seq {
            let mut copy = Event::new(
                e.pitch as i64 + v.transposition as i64,
                e.start * v.stretch + v.offset,
                e.duration() * v.stretch,
                e.velocity as i64,
            )
            .with_channel(channel as i64);
            copy.pan = e.pan;
            out.push(copy);
        }
        for c in seq.controls() {
            let mut copy = *c;
            copy.time = c.time * v.stretch + v.offset;
            copy.channel = clamp_channel(channel as i64);
            out.push_control(copy);
        }
    }
    Ok(out.sorted())
}

/// Play `pattern` `repeats` times, one pitch per `step` beats, each
/// sounding for `gate` of its step, then close on the pattern's first pitch
/// held for two steps.
pub fn arpeggiate(pattern: &[i32], step: f64, repeats: usize, gate: f64) -> Result<EventSequence> {
    require_nonzero(pattern.len(), "arpeggio pattern")?;
    require_nonzero(repeats, "arpeggio repeats")?;
    require_positive(step, "step")?;
    require_positive(gate, "gate")?;

    let mut notes: Vec<Note> = std::iter::repeat_n(pattern, repeats)
        .flatten()
        .map(|&pitch| Note::new(pitch, step))
        .collect();
    notes.push(Note::new(pattern[0], step * 2.0));
    Ok(render(&notes, 0.0, ARPEGGIO_VELOCITY, gate))
}

/// Velocity of every arpeggiated note.
pub const ARPEGGIO_VELOCITY: u8 = 100;

/// A descending A-aeolian octave in long-short pairs, the subject of a
/// prolation canon: A5 G5 F5 E5 D5 C5 B4 A4.
pub fn cantus_theme() -> Vec<Note> {
    [81, 79, 77, 76, 74, 72, 71, 69]
        .into_iter()
        .zip([2.0, 1.0].into_iter().cycle())
        .map(Note::from)
        .collect()
}

/// Three voices entering in turn, each an octave lower and twice as slow
/// as the one before.
pub fn prolation_voices() -> Vec<CanonVoice> {
    vec![
        CanonVoice::new(0.0, 0, 1.0),
        CanonVoice::new(3.0, -12, 2.0),
        CanonVoice::new(9.0, -24, 4.0),
    ]
}
