// First-order Markov melody model.
//
// A `MarkovModel` maps each pitch to a non-empty list of candidate next
// pitches. Duplicates in a list encode weight: `[62, 62, 62, 64, 67]` moves
// C4 to D4 60% of the time. A pitch with no entry falls back to the model's
// `fallback` list. Both invariants (every entry non-empty, fallback
// non-empty) are checked when the model is built or loaded, so `next` can
// never fail mid-sequence.
//
// `MarkovMelody` holds the rhythm/dynamics settings for turning the chain
// into events. Per note the draws are, in order: next pitch, duration,
// velocity. The time cursor advances by the drawn duration.
//
// Models can be written by hand, learned from an existing melody
// (`MarkovModel::learn`), or loaded from JSON.
//
// Output time base: beats.

use crate::error::{CanticleError, Result, require_nonzero, require_positive, require_range};
use crate::event::{Event, EventSequence, TimeBase};
use canticle_prng::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, trace};

/// Candidate next pitches per current pitch.
pub type TransitionTable = BTreeMap<u8, Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkovModel {
    transitions: TransitionTable,
    fallback: Vec<u8>,
}

impl MarkovModel {
    /// Build a model, validating that every list has at least one candidate.
    pub fn new(transitions: TransitionTable, fallback: Vec<u8>) -> Result<Self> {
        let model = MarkovModel {
            transitions,
            fallback,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.fallback.is_empty() {
            return Err(CanticleError::EmptyTransitionTable);
        }
        if let Some((&pitch, _)) = self.transitions.iter().find(|(_, c)| c.is_empty()) {
            return Err(CanticleError::InvalidTransition(pitch));
        }
        Ok(())
    }

    /// A small C-major model: stepwise motion dominates, G and C5 open up
    /// the upper register.
    pub fn default_model() -> Self {
        let transitions = TransitionTable::from([
            (60, vec![62, 62, 62, 64, 67]),
            (62, vec![64, 64, 65, 60]),
            (64, vec![65, 67, 60]),
            (65, vec![67, 62, 60]),
            (67, vec![60, 69, 72]),
            (69, vec![72, 67, 65]),
            (72, vec![60, 67, 69]),
        ]);
        MarkovModel {
            transitions,
            fallback: vec![60, 62, 64, 65, 67],
        }
    }

    /// Learn transitions from a melody: every consecutive pair adds one
    /// candidate. The fallback is the melody's own pitch list, so the chain
    /// restarts somewhere in the melody's vocabulary when it reaches the
    /// final pitch.
    pub fn learn(melody: &[u8]) -> Result<Self> {
        let mut transitions = TransitionTable::new();
        for pair in melody.windows(2) {
            transitions.entry(pair[0]).or_default().push(pair[1]);
        }
        MarkovModel::new(transitions, melody.to_vec())
    }

    /// Load a model from JSON: `{"transitions": {"60": [62, 64]}, "fallback": [60]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let model: MarkovModel = serde_json::from_str(&data)?;
        model.validate()?;
        Ok(model)
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    pub fn fallback(&self) -> &[u8] {
        &self.fallback
    }

    /// Candidates for `current`, or the fallback when it has no entry.
    pub fn candidates(&self, current: u8) -> &[u8] {
        self.transitions
            .get(&current)
            .map(Vec::as_slice)
            .unwrap_or(&self.fallback)
    }

    /// Draw the next pitch uniformly from `current`'s candidate list.
    pub fn next(&self, current: u8, rng: &mut impl RandomSource) -> u8 {
        let candidates = self.candidates(current);
        candidates[rng.next_index(candidates.len())]
    }

    /// Probability of moving from `current` to `next`.
    pub fn probability(&self, current: u8, next: u8) -> f64 {
        let candidates = self.candidates(current);
        let hits = candidates.iter().filter(|&&c| c == next).count();
        hits as f64 / candidates.len() as f64
    }
}

/// Rhythm and dynamics for rendering a Markov chain as a melody.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkovMelody {
    /// Pitch the chain starts from. The first emitted note is already a
    /// step away from it.
    pub start_pitch: u8,
    /// Durations drawn uniformly per note, in beats.
    pub durations: Vec<f64>,
    pub velocity_range: (u8, u8),
}

impl Default for MarkovMelody {
    fn default() -> Self {
        MarkovMelody {
            start_pitch: 60,
            durations: vec![0.25, 0.5, 1.0],
            velocity_range: (80, 110),
        }
    }
}

/// A Markov chain walking a model, owning its current state.
#[derive(Debug, Clone)]
pub struct MarkovChain<'a> {
    model: &'a MarkovModel,
    current: u8,
}

impl<'a> MarkovChain<'a> {
    pub fn new(model: &'a MarkovModel, start_pitch: u8) -> Self {
        MarkovChain {
            model,
            current: start_pitch,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Advance one step and return the new pitch.
    pub fn next(&mut self, rng: &mut impl RandomSource) -> u8 {
        self.current = self.model.next(self.current, rng);
        self.current
    }

    /// Render `length` notes with `melody`'s rhythm and dynamics.
    pub fn generate(
        &mut self,
        length: usize,
        melody: &MarkovMelody,
        rng: &mut impl RandomSource,
    ) -> Result<EventSequence> {
        require_nonzero(length, "Markov sequence length")?;
        require_range(melody.velocity_range, "velocity_range")?;
        if melody.durations.is_empty() {
            return Err(crate::error::invalid("durations", "no durations to choose from"));
        }
        for &d in &melody.durations {
            require_positive(d, "durations")?;
        }

        let (lo, hi) = melody.velocity_range;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, length);
        let mut cursor = 0.0;
        for _ in 0..length {
            let pitch = self.next(rng);
            let duration = melody.durations[rng.next_index(melody.durations.len())];
            let velocity = rng.next_int(lo as i64, hi as i64);
            trace!(pitch, duration, velocity, "markov step");
            seq.push(Event::new(pitch as i64, cursor, duration, velocity));
            cursor += duration;
        }
        debug!(notes = length, beats = cursor, "markov melody generated");
        Ok(seq)
    }
}

/// Convenience: build a chain from `melody.start_pitch` and render it.
pub fn generate_melody(
    model: &MarkovModel,
    length: usize,
    melody: &MarkovMelody,
    rng: &mut impl RandomSource,
) -> Result<EventSequence> {
    MarkovChain::new(model, melody.start_pitch).generate(length, melody, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canticle_prng::ScoreRng;

    #[test]
    fn next_stays_within_candidates() {
        let model = MarkovModel::default_model();
        let mut rng = ScoreRng::new(1);
        for _ in 0..200 {
            let p = model.next(60, &mut rng);
            assert!([62, 64, 67].contains(&p));
        }
    }

    #[test]
    fn duplicates_bias_the_draw() {
        let model = MarkovModel::default_model();
        assert!((model.probability(60, 62) - 0.6).abs() < 1e-12);
        let mut rng = ScoreRng::new(2);
        let n = 10_000;
        let hits = (0..n).filter(|_| model.next(60, &mut rng) == 62).count();
        let pct = hits as f64 / n as f64;
        assert!((0.57..0.63).contains(&pct), "got {pct}");
    }

    #[test]
    fn unknown_pitch_uses_fallback() {
        let model = MarkovModel::default_model();
        assert_eq!(model.candidates(99), model.fallback());
        let mut rng = ScoreRng::new(3);
        let p = model.next(99, &mut rng);
        assert!(model.fallback().contains(&p));
    }

    #[test]
    fn empty_fallback_fails_fast() {
        let err = MarkovModel::new(TransitionTable::new(), vec![]);
        assert!(matches!(err, Err(CanticleError::EmptyTransitionTable)));
        let err = MarkovModel::new(TransitionTable::from([(60, vec![])]), vec![60]);
        assert!(matches!(err, Err(CanticleError::InvalidTransition(60))));
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let model = MarkovModel::default_model();
        let melody = MarkovMelody::default();
        let a = generate_melody(&model, 32, &melody, &mut ScoreRng::new(42)).unwrap();
        let b = generate_melody(&model, 32, &melody, &mut ScoreRng::new(42)).unwrap();
        assert_eq!(a, b);
        let c = generate_melody(&model, 32, &melody, &mut ScoreRng::new(43)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn notes_are_contiguous() {
        let model = MarkovModel::default_model();
        let melody = MarkovMelody::default();
        let seq = generate_melody(&model, 16, &melody, &mut ScoreRng::new(4)).unwrap();
        assert_eq!(seq.len(), 16);
        for w in seq.events().windows(2) {
            assert!((w[0].end - w[1].start).abs() < 1e-12);
        }
        for e in seq.iter() {
            assert!((80..=110).contains(&e.velocity));
            assert!([0.25, 0.5, 1.0].contains(&e.duration()));
        }
    }

    #[test]
    fn chain_tracks_state() {
        let model = MarkovModel::default_model();
        let mut chain = MarkovChain::new(&model, 60);
        let mut rng = ScoreRng::new(5);
        let mut prev = chain.current();
        for _ in 0..50 {
            let next = chain.next(&mut rng);
            assert!(model.candidates(prev).contains(&next));
            prev = next;
        }
    }

    #[test]
    fn learned_model_reproduces_transitions() {
        let model = MarkovModel::learn(&[60, 62, 64, 62, 60]).unwrap();
        assert_eq!(model.candidates(62), &[64, 60]);
        assert_eq!(model.candidates(64), &[62]);
        // 60 appears as a source once (-> 62); the final 60 adds nothing.
        assert_eq!(model.candidates(60), &[62]);
        assert!(MarkovModel::learn(&[]).is_err());
    }

    #[test]
    fn zero_length_is_rejected() {
        let model = MarkovModel::default_model();
        let err = generate_melody(&model, 0, &MarkovMelody::default(), &mut ScoreRng::new(1));
        assert!(matches!(err, Err(CanticleError::ZeroLength(_))));
    }

    #[test]
    fn json_round_trip_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = MarkovModel::default_model();
        std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();
        assert_eq!(MarkovModel::load(&path).unwrap(), model);

        std::fs::write(&path, r#"{"transitions": {"60": [62]}, "fallback": []}"#).unwrap();
        assert!(matches!(
            MarkovModel::load(&path),
            Err(CanticleError::EmptyTransitionTable)
        ));
    }
}
