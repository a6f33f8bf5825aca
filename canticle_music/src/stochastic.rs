// Weighted and dice-driven stochastic generators.
//
// - `WeightedPool`: parallel (pitch, duration) choices with integer weights,
//   expanded into a flat pool and drawn uniformly. A pair with weight 3 is
//   three times as likely as one with weight 1.
// - `GranularCloud`: a Xenakis-style cloud of very short particles scattered
//   over a time window, fading out over its tail.
// - `DiceMelody`: a six-sided die mapped onto a pitch table.
// - `BookendedMelody`: random interior notes between a first and last note
//   on the root.
// - `DiceGame`: a measure-by-measure musical dice game whose alternatives
//   may contain chords.
//
// All output is in beats.

use crate::error::{
    CanticleError, Result, invalid, require_nonzero, require_positive, require_range,
};
use crate::event::{ChordSlot, Event, EventSequence, TimeBase};
use canticle_prng::RandomSource;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One weighted (pitch, duration) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedChoice {
    pub pitch: u8,
    pub duration: f64,
    pub weight: u32,
}

/// A weighted pool of (pitch, duration) pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<WeightedChoice>", into = "Vec<WeightedChoice>")]
pub struct WeightedPool {
    choices: Vec<WeightedChoice>,
    /// Index into `choices`, repeated `weight` times per choice.
    pool: Vec<usize>,
}

impl WeightedPool {
    /// Build a pool from parallel lists. Fails with `InvalidWeights` if the
    /// lists differ in length or the weights sum to zero.
    pub fn new(pitches: &[u8], durations: &[f64], weights: &[u32]) -> Result<Self> {
        if pitches.len() != durations.len() || pitches.len() != weights.len() {
            return Err(CanticleError::InvalidWeights(format!(
                "{} pitches, {} durations, {} weights",
                pitches.len(),
                durations.len(),
                weights.len()
            )));
        }
        let choices = pitches
            .iter()
            .zip(durations)
            .zip(weights)
            .map(|((&pitch, &duration), &weight)| WeightedChoice {
                pitch,
                duration,
                weight,
            })
            .collect();
        WeightedPool::from_choices(choices)
    }

    pub fn from_choices(choices: Vec<WeightedChoice>) -> Result<Self> {
        let total: u64 = choices.iter().map(|c| c.weight as u64).sum();
        if total == 0 {
            return Err(CanticleError::InvalidWeights("total weight is zero".into()));
        }
        let pool = expand(&choices);
        Ok(WeightedPool { choices, pool })
    }

    /// C major, biased toward C and G.
    pub fn default_pool() -> Self {
        let choices = [
            (60, 1.0, 5),
            (62, 0.5, 1),
            (64, 1.0, 3),
            (65, 0.5, 2),
            (67, 1.0, 4),
            (69, 0.5, 3),
            (71, 0.25, 1),
            (72, 1.0, 5),
        ]
        .into_iter()
        .map(|(pitch, duration, weight)| WeightedChoice {
            pitch,
            duration,
            weight,
        })
        .collect::<Vec<_>>();
        let pool = expand(&choices);
        WeightedPool { choices, pool }
    }

    pub fn choices(&self) -> &[WeightedChoice] {
        &self.choices
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// One uniform draw over the expanded pool.
    pub fn draw(&self, rng: &mut impl RandomSource) -> (u8, f64) {
        let c = &self.choices[self.pool[rng.next_index(self.pool.len())]];
        (c.pitch, c.duration)
    }

    /// Draw `length` pairs, then one velocity per note, laying notes end to
    /// end with `gate` articulation.
    pub fn generate(
        &self,
        length: usize,
        velocity_range: (u8, u8),
        gate: f64,
        rng: &mut impl RandomSource,
    ) -> Result<EventSequence> {
        require_nonzero(length, "weighted melody length")?;
        require_range(velocity_range, "velocity_range")?;
        let melody: Vec<(u8, f64)> = (0..length).map(|_| self.draw(rng)).collect();

        let (lo, hi) = velocity_range;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, length);
        let mut cursor = 0.0;
        for (pitch, duration) in melody {
            let velocity = rng.next_int(lo as i64, hi as i64);
            seq.push(Event::new(pitch as i64, cursor, duration * gate, velocity));
            cursor += duration;
        }
        debug!(notes = length, beats = cursor, "weighted melody generated");
        Ok(seq)
    }
}

fn expand(choices: &[WeightedChoice]) -> Vec<usize> {
    choices
        .iter()
        .enumerate()
        .flat_map(|(i, c)| std::iter::repeat_n(i, c.weight as usize))
        .collect()
}

impl TryFrom<Vec<WeightedChoice>> for WeightedPool {
    type Error = CanticleError;

    fn try_from(choices: Vec<WeightedChoice>) -> Result<Self> {
        WeightedPool::from_choices(choices)
    }
}

impl From<WeightedPool> for Vec<WeightedChoice> {
    fn from(pool: WeightedPool) -> Self {
        pool.choices
    }
}

impl Default for WeightedPool {
    fn default() -> Self {
        WeightedPool::default_pool()
    }
}

/// A cloud of short random particles over `width` beats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GranularCloud {
    /// Length of the window particles start in, in beats.
    pub width: f64,
    /// Particles per beat.
    pub density: f64,
    /// Upper bound on particle length, in beats.
    pub particle_duration: f64,
    pub pitch_range: (u8, u8),
    pub velocity_range: (u8, u8),
    /// Length of the linear fade-out at the end of the window.
    pub fade_beats: f64,
}

impl Default for GranularCloud {
    fn default() -> Self {
        GranularCloud {
            width: 64.0,
            density: 23.44,
            particle_duration: 0.2,
            pitch_range: (0, 127),
            velocity_range: (30, 110),
            fade_beats: 20.0,
        }
    }
}

impl GranularCloud {
    pub fn particle_count(&self) -> usize {
        (self.density * self.width).max(0.0) as usize
    }

    /// Per particle, draws pitch, start, duration and velocity, in that
    /// order. Particles starting inside the fade region have their velocity
    /// scaled linearly toward zero; particles that end up silent are dropped.
    /// Events come out in draw order, not time order.
    pub fn generate(&self, rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_positive(self.width, "width")?;
        require_positive(self.particle_duration, "particle_duration")?;
        require_range(self.pitch_range, "pitch_range")?;
        require_range(self.velocity_range, "velocity_range")?;
        if self.fade_beats.is_nan() || self.fade_beats < 0.0 {
            return Err(invalid("fade_beats", "must not be negative"));
        }
        let count = self.particle_count();
        require_nonzero(count, "particle count")?;

        let fade_start = self.width - self.fade_beats;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, count);
        for _ in 0..count {
            let pitch = rng.next_int(self.pitch_range.0 as i64, self.pitch_range.1 as i64);
            let start = rng.next_f64() * self.width;
            let duration = rng.next_f64() * self.particle_duration;
            let mut velocity =
                rng.next_int(self.velocity_range.0 as i64, self.velocity_range.1 as i64);
            if self.fade_beats > 0.0 && start > fade_start {
                let fade = (self.width - start) / self.fade_beats;
                velocity = (velocity as f64 * fade) as i64;
            }
            if velocity > 0 {
                seq.push(Event::new(pitch, start, duration, velocity));
            }
        }
        debug!(drawn = count, kept = seq.len(), "granular cloud generated");
        Ok(seq)
    }
}

/// Pitches for die faces 1 through 6: C4 D4 E4 F4 G4 A4.
pub const DICE_FACES: [u8; 6] = [60, 62, 64, 65, 67, 69];

/// Quarter notes picked by rolling a die.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceMelody {
    /// Pitch per die face; the die has as many faces as entries.
    pub faces: Vec<u8>,
    pub note_duration: f64,
    pub gate: f64,
    pub velocity_range: (u8, u8),
}

impl Default for DiceMelody {
    fn default() -> Self {
        DiceMelody {
            faces: DICE_FACES.to_vec(),
            note_duration: 1.0,
            gate: 0.9,
            velocity_range: (90, 110),
        }
    }
}

impl DiceMelody {
    /// All rolls happen first, then one velocity draw per note.
    pub fn generate(&self, count: usize, rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_nonzero(count, "dice melody length")?;
        require_positive(self.note_duration, "note_duration")?;
        require_range(self.velocity_range, "velocity_range")?;
        if self.faces.is_empty() {
            return Err(invalid("faces", "a die needs at least one face"));
        }

        let rolls: Vec<u8> = (0..count)
            .map(|_| self.faces[rng.next_index(self.faces.len())])
            .collect();
        let (lo, hi) = self.velocity_range;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, count);
        for (i, pitch) in rolls.into_iter().enumerate() {
            let velocity = rng.next_int(lo as i64, hi as i64);
            seq.push(Event::new(
                pitch as i64,
                i as f64 * self.note_duration,
                self.note_duration * self.gate,
                velocity,
            ));
        }
        Ok(seq)
    }
}

/// A random melody that opens and closes on the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookendedMelody {
    pub root: u8,
    /// Pitches the interior notes draw from.
    pub pitches: Vec<u8>,
    pub durations: Vec<f64>,
    /// Inclusive range the total note count is drawn from (bookends included).
    pub count_range: (u8, u8),
    pub velocity_range: (u8, u8),
    pub first_duration: f64,
    pub last_duration: f64,
    /// Velocity of both bookends.
    pub bookend_velocity: u8,
    pub gate: f64,
}

impl Default for BookendedMelody {
    /// C major pentatonic, 12 to 18 notes, ending on a half note.
    fn default() -> Self {
        BookendedMelody {
            root: 60,
            pitches: vec![60, 62, 64, 67, 69],
            durations: vec![1.0, 0.75, 0.5, 0.25],
            count_range: (12, 18),
            velocity_range: (80, 120),
            first_duration: 1.0,
            last_duration: 2.0,
            bookend_velocity: 100,
            gate: 0.9,
        }
    }
}

impl BookendedMelody {
    /// Draws the note count, then pitch, duration and velocity per interior
    /// note.
    pub fn generate(&self, rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_range(self.count_range, "count_range")?;
        require_range(self.velocity_range, "velocity_range")?;
        if self.count_range.0 < 2 {
            return Err(invalid("count_range", "at least the two bookends are needed"));
        }
        if self.pitches.is_empty() || self.durations.is_empty() {
            return Err(invalid("pitches", "interior pitches and durations must not be empty"));
        }

        let count = rng.next_int(self.count_range.0 as i64, self.count_range.1 as i64) as usize;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, count);
        let mut cursor = 0.0;
        let mut emit = |seq: &mut EventSequence, pitch: u8, duration: f64, velocity: i64| {
            seq.push(Event::new(pitch as i64, cursor, duration * self.gate, velocity));
            cursor += duration;
        };

        emit(&mut seq, self.root, self.first_duration, self.bookend_velocity as i64);
        for _ in 0..count - 2 {
            let pitch = self.pitches[rng.next_index(self.pitches.len())];
            let duration = self.durations[rng.next_index(self.durations.len())];
            let velocity = rng.next_int(self.velocity_range.0 as i64, self.velocity_range.1 as i64);
            emit(&mut seq, pitch, duration, velocity);
        }
        emit(&mut seq, self.root, self.last_duration, self.bookend_velocity as i64);
        Ok(seq)
    }
}

/// One bar: rhythmic slots, any of which may be a chord.
pub type Measure = Vec<ChordSlot>;

/// A musical dice game: for each bar position, a list of interchangeable
/// measures. A roll picks one alternative per position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceGame {
    pub positions: Vec<Vec<Measure>>,
    pub gate: f64,
    pub velocity_range: (u8, u8),
}

impl DiceGame {
    pub fn new(positions: Vec<Vec<Measure>>) -> Result<Self> {
        if positions.is_empty() {
            return Err(CanticleError::ZeroLength("dice game measures"));
        }
        if positions.iter().any(Vec::is_empty) {
            return Err(invalid("positions", "every bar needs at least one alternative"));
        }
        Ok(DiceGame {
            positions,
            gate: 0.9,
            velocity_range: (90, 110),
        })
    }

    /// Four bars of a waltz excerpt in 3/8, after Mozart's Musikalisches
    /// Würfelspiel (tables 96/32/40, 6/17, 141/158 and 30/5).
    pub fn mozart_excerpt() -> Self {
        const C2: u8 = 36;
        const G2: u8 = 43;
        const B2: u8 = 47;
        const C3: u8 = 48;
        const E3: u8 = 52;
        const G3: u8 = 55;
        const C4: u8 = 60;
        const E4: u8 = 64;
        const G4: u8 = 67;
        const A4: u8 = 69;
        const B4: u8 = 71;
        const C5: u8 = 72;
        const D5: u8 = 74;
        const E5: u8 = 76;
        const F5: u8 = 77;
        const QN: f64 = 1.0;
        const EN: f64 = 0.5;
        const SN: f64 = 0.25;
        const DQN: f64 = 1.5;

        let n = ChordSlot::note;
        let c = |pitches: &[u8], d: f64| ChordSlot::chord(pitches.iter().copied(), d);

        let bar1 = vec![
            vec![c(&[C3, E5], EN), n(C5, EN), n(G4, EN)],
            vec![c(&[C3, E3, G4], EN), n(C5, EN), n(E5, EN)],
            vec![
                c(&[C3, E3, C5], SN),
                n(B4, SN),
                n(C5, SN),
                n(E5, SN),
                n(G4, SN),
                n(C5, SN),
            ],
        ];
        let bar2 = vec![
            vec![c(&[C3, E3, G4], EN), n(C5, EN), n(E5, EN)],
            vec![
                c(&[E3, G3, C5], SN),
                n(G4, SN),
                n(C5, SN),
                n(E5, SN),
                n(G4, SN),
                n(C5, SN),
            ],
        ];
        let bar3 = vec![
            vec![
                c(&[B2, G3, D5], SN),
                n(E5, SN),
                n(F5, SN),
                n(D5, SN),
                c(&[G2, C5], SN),
                n(B4, SN),
            ],
            vec![c(&[G2, B4], EN), n(D5, SN), n(B4, SN), n(A4, SN), n(G4, SN)],
        ];
        let bar4 = vec![
            vec![c(&[C5, G4, E4, C4, C2], DQN)],
            vec![c(&[C2, C5, G4, E4, C4], SN), c(&[G2, B4], SN), c(&[C2, E4, C5], QN)],
        ];

        DiceGame {
            positions: vec![bar1, bar2, bar3, bar4],
            gate: 0.9,
            velocity_range: (90, 110),
        }
    }

    /// One uniform choice per bar position, all made before any velocity.
    pub fn roll(&self, rng: &mut impl RandomSource) -> Vec<usize> {
        self.positions
            .iter()
            .map(|alternatives| rng.next_index(alternatives.len()))
            .collect()
    }

    /// Render the measures picked by `choices`. Each pitch of a slot gets
    /// its own velocity draw.
    pub fn render(&self, choices: &[usize], rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_range(self.velocity_range, "velocity_range")?;
        let (lo, hi) = self.velocity_range;
        let mut seq = EventSequence::new(TimeBase::Beats);
        let mut cursor = 0.0;
        for (alternatives, &choice) in self.positions.iter().zip(choices) {
            let measure = alternatives
                .get(choice)
                .ok_or_else(|| invalid("choices", format!("no alternative {choice}")))?;
            for slot in measure {
                let velocity = || rng.next_int(lo as i64, hi as i64);
                cursor = seq.push_slot(slot, cursor, self.gate, velocity);
            }
        }
        Ok(seq)
    }

    pub fn generate(&self, rng: &mut impl RandomSource) -> Result<EventSequence> {
        let choices = self.roll(rng);
        debug!(?choices, "dice game rolled");
        self.render(&choices, rng)
    }
}
