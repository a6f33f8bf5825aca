// Harmonograph: pendulum curves rendered as controller automation.
//
// Two pendulum arrangements trace a 2-D curve over `total_steps` samples:
//
// - Lateral (two pendula at right angles): x = A sin(t f1), y = A sin(t f2)
// - Rotary (two circular pendula):         x = a1 sin(t f1) - a2 sin(t f2)
//                                          y = a1 cos(t f1) - a2 cos(t f2)
//
// with t = i / density. x drives pan (CC10) and y drives expression (CC11),
// both mapped with clamping from the curve's extent onto [0, 127]. A single
// sustained note spans the whole curve so the automation has something to
// shape. Samples are `step` beats apart.
//
// No randomness. Output time base: beats.

use crate::error::{Result, invalid, require_nonzero, require_positive};
use crate::event::{CC_EXPRESSION, CC_PAN, ControlPoint, Event, EventSequence, TimeBase};
use crate::mapping::{MIDI_MAX, map_clamped};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pendulum {
    Lateral {
        freq_x: f64,
        freq_y: f64,
        amplitude: f64,
    },
    Rotary {
        freq1: f64,
        freq2: f64,
        amplitude1: f64,
        amplitude2: f64,
    },
}

impl Pendulum {
    /// Position at time `t`.
    pub fn position(&self, t: f64) -> DVec2 {
        match *self {
            Pendulum::Lateral {
                freq_x,
                freq_y,
                amplitude,
            } => DVec2::new((t * freq_x).sin(), (t * freq_y).sin()) * amplitude,
            Pendulum::Rotary {
                freq1,
                freq2,
                amplitude1,
                amplitude2,
            } => {
                let (s1, c1) = (t * freq1).sin_cos();
                let (s2, c2) = (t * freq2).sin_cos();
                DVec2::new(amplitude1 * s1 - amplitude2 * s2, amplitude1 * c1 - amplitude2 * c2)
            }
        }
    }

    /// Largest absolute coordinate the curve can reach.
    pub fn extent(&self) -> f64 {
        match *self {
            Pendulum::Lateral { amplitude, .. } => amplitude.abs(),
            Pendulum::Rotary {
                amplitude1,
                amplitude2,
                ..
            } => amplitude1.abs() + amplitude2.abs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Harmonograph {
    pub pendulum: Pendulum,
    /// Samples per unit of t.
    pub density: f64,
    /// Number of 2π turns of t to trace.
    pub cycles: usize,
    /// Beats between samples.
    pub step: f64,
    pub pitch: u8,
    pub velocity: u8,
}

impl Default for Harmonograph {
    fn default() -> Self {
        Harmonograph::lateral()
    }
}

impl Harmonograph {
    /// A 2:3 lateral figure.
    pub fn lateral() -> Self {
        Harmonograph {
            pendulum: Pendulum::Lateral {
                freq_x: 2.0,
                freq_y: 3.0,
                amplitude: 1.0,
            },
            density: 25.0,
            cycles: 6,
            step: 0.05,
            pitch: 60,
            velocity: 100,
        }
    }

    /// An 8:13 rotary figure.
    pub fn rotary() -> Self {
        Harmonograph {
            pendulum: Pendulum::Rotary {
                freq1: 8.0,
                freq2: 13.0,
                amplitude1: 40.0,
                amplitude2: 40.0,
            },
            density: 10.0,
            cycles: 4,
            step: 0.05,
            pitch: 60,
            velocity: 100,
        }
    }

    /// Samples per 2π of t (truncated), times the number of cycles.
    pub fn total_steps(&self) -> usize {
        (TAU * self.density).max(0.0) as usize * self.cycles
    }

    pub fn point(&self, i: usize) -> DVec2 {
        self.pendulum.position(i as f64 / self.density)
    }

    /// Pan and expression values for sample `i`.
    pub fn controls_at(&self, i: usize) -> (i64, i64) {
        let extent = self.pendulum.extent();
        let p = self.point(i);
        let to_cc = |v: f64| map_clamped(v, -extent, extent, 0.0, MIDI_MAX as f64) as i64;
        (to_cc(p.x), to_cc(p.y))
    }

    pub fn generate(&self) -> Result<EventSequence> {
        require_positive(self.density, "density")?;
        require_positive(self.step, "step")?;
        if self.pendulum.extent() == 0.0 {
            return Err(invalid("pendulum", "amplitude must be non-zero"));
        }
        let steps = self.total_steps();
        require_nonzero(steps, "harmonograph steps")?;

        let mut seq = EventSequence::new(TimeBase::Beats);
        let total = steps as f64 * self.step;
        seq.push(Event::new(self.pitch as i64, 0.0, total, self.velocity as i64));
        for i in 0..steps {
            let time = i as f64 * self.step;
            let (pan, expression) = self.controls_at(i);
            seq.push_control(ControlPoint::new(time, CC_PAN, pan));
            seq.push_control(ControlPoint::new(time, CC_EXPRESSION, expression));
        }
        debug!(steps, beats = total, "harmonograph traced");
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_counts_match_classic_figures() {
        // int(2π·25) = 157, int(2π·10) = 62.
        assert_eq!(Harmonograph::lateral().total_steps(), 157 * 6);
        assert_eq!(Harmonograph::rotary().total_steps(), 62 * 4);
    }

    #[test]
    fn lateral_starts_centred() {
        let h = Harmonograph::lateral();
        assert_eq!(h.point(0), DVec2::ZERO);
        // sin 0 = 0 maps to the middle of 0..127, truncated.
        assert_eq!(h.controls_at(0), (63, 63));
    }

    #[test]
    fn rotary_first_sample() {
        let h = Harmonograph::rotary();
        // x = 0, y = 40 - 40 = 0.
        assert!(h.point(0).length() < 1e-12);
        let p = h.point(5);
        assert!(p.x.abs() <= 80.0 && p.y.abs() <= 80.0);
    }

    #[test]
    fn one_note_and_two_curves() {
        let h = Harmonograph::rotary();
        let seq = h.generate().unwrap();
        assert_eq!(seq.len(), 1);
        let steps = h.total_steps();
        assert_eq!(seq.controls().len(), 2 * steps);
        let note = seq.events()[0];
        assert_eq!(note.pitch, 60);
        assert!((note.end - steps as f64 * 0.05).abs() < 1e-9);
        let pans = seq.controls().iter().filter(|c| c.controller == CC_PAN).count();
        assert_eq!(pans, steps);
        assert!(seq.controls().iter().all(|c| c.value <= 127));
    }

    #[test]
    fn lateral_sweeps_the_full_range() {
        let seq = Harmonograph::lateral().generate().unwrap();
        let pans: Vec<u8> = seq
            .controls()
            .iter()
            .filter(|c| c.controller == CC_PAN)
            .map(|c| c.value)
            .collect();
        assert!(*pans.iter().min().unwrap() <= 1);
        assert!(*pans.iter().max().unwrap() >= 126);
    }

    #[test]
    fn degenerate_figures_are_rejected() {
        let h = Harmonograph {
            cycles: 0,
            ..Harmonograph::lateral()
        };
        assert!(h.generate().is_err());
        let flat = Harmonograph {
            pendulum: Pendulum::Lateral {
                freq_x: 1.0,
                freq_y: 1.0,
                amplitude: 0.0,
            },
            ..Harmonograph::lateral()
        };
        assert!(flat.generate().is_err());
    }
}
