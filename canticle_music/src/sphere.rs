// Revolving sphere: points on a sphere's surface sound as they cross the
// prime meridian.
//
// Each point has an azimuth θ in [0, 2π) and a polar angle φ in [0, π),
// drawn θ first then φ per point. Every frame all points rotate by
// `angular_velocity` (θ wraps mod 2π); a point whose θ wrapped this frame
// (old θ > new θ) emits a note at `frame * time_scale`. Its pitch comes from
// φ (north pole low, south pole high) mapped onto `pitch_range` and snapped
// to the scale; its velocity is drawn at emission.
//
// Output time base: beats.

use crate::error::{Result, invalid, require_nonzero, require_positive, require_range};
use crate::event::{Event, EventSequence, TimeBase};
use crate::mapping::map_clamped;
use crate::scale::{Scale, ScaleKind};
use canticle_prng::RandomSource;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpherePoint {
    /// Azimuth, [0, 2π).
    pub theta: f64,
    /// Polar angle, [0, π).
    pub phi: f64,
}

impl SpherePoint {
    /// Cartesian position on a sphere of `radius`, y pointing at the pole.
    pub fn cartesian(&self, radius: f64) -> DVec3 {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_az, cos_az) = (self.theta + FRAC_PI_2).sin_cos();
        DVec3::new(sin_phi * cos_az, cos_phi, sin_phi * sin_az) * radius
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereParams {
    pub radius: f64,
    pub num_points: usize,
    /// Radians per frame.
    pub angular_velocity: f64,
    pub frames: usize,
    /// Beats per frame.
    pub time_scale: f64,
    pub note_duration: f64,
    pub pitch_range: (u8, u8),
    pub scale: Scale,
    pub root: i64,
    pub velocity_range: (u8, u8),
}

impl Default for SphereParams {
    fn default() -> Self {
        SphereParams {
            radius: 200.0,
            num_points: 200,
            angular_velocity: 0.01,
            frames: 1000,
            time_scale: 0.05,
            note_duration: 0.5,
            pitch_range: (36, 96),
            scale: ScaleKind::Major.scale(),
            root: 0,
            velocity_range: (60, 100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MusicalSphere {
    params: SphereParams,
    points: Vec<SpherePoint>,
}

impl MusicalSphere {
    /// Scatter `params.num_points` points uniformly in (θ, φ).
    pub fn new(params: SphereParams, rng: &mut impl RandomSource) -> Result<Self> {
        require_nonzero(params.num_points, "sphere points")?;
        let points = (0..params.num_points)
            .map(|_| {
                let theta = rng.next_f64() * TAU;
                let phi = rng.next_f64() * PI;
                SpherePoint { theta, phi }
            })
            .collect();
        MusicalSphere::from_points(params, points)
    }

    pub fn from_points(params: SphereParams, points: Vec<SpherePoint>) -> Result<Self> {
        require_nonzero(points.len(), "sphere points")?;
        require_positive(params.time_scale, "time_scale")?;
        require_positive(params.note_duration, "note_duration")?;
        // Meridian crossings are detected as a wrap of θ, which needs
        // 0 < ω < 2π.
        require_positive(params.angular_velocity, "angular_velocity")?;
        if params.angular_velocity >= TAU {
            return Err(invalid("angular_velocity", "must be below 2π radians per frame"));
        }
        require_range(params.pitch_range, "pitch_range")?;
        require_range(params.velocity_range, "velocity_range")?;
        Ok(MusicalSphere { params, points })
    }

    pub fn points(&self) -> &[SpherePoint] {
        &self.points
    }

    /// The scale pitch a point at polar angle `phi` sounds.
    pub fn pitch_for(&self, phi: f64) -> u8 {
        let (low, high) = self.params.pitch_range;
        let raw = map_clamped(phi, 0.0, PI, low as f64, high as f64);
        self.params.scale.quantize(raw.trunc() as i64, self.params.root)
    }

    /// Rotate every point once; points crossing the meridian emit a note.
    pub fn rotate(&mut self, frame: usize, rng: &mut impl RandomSource, out: &mut EventSequence) {
        let time = frame as f64 * self.params.time_scale;
        let (lo, hi) = self.params.velocity_range;
        for i in 0..self.points.len() {
            let old = self.points[i].theta;
            let new = (old + self.params.angular_velocity).rem_euclid(TAU);
            if old > new {
                let pitch = self.pitch_for(self.points[i].phi);
                let velocity = rng.next_int(lo as i64, hi as i64);
                out.push(Event::new(pitch as i64, time, self.params.note_duration, velocity));
            }
            self.points[i].theta = new;
        }
    }

    pub fn simulate(&mut self, rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_nonzero(self.params.frames, "sphere frames")?;
        let mut seq = EventSequence::new(TimeBase::Beats);
        for frame in 0..self.params.frames {
            self.rotate(frame, rng, &mut seq);
        }
        debug!(
            points = self.points.len(),
            frames = self.params.frames,
            notes = seq.len(),
            "sphere simulated"
        );
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canticle_prng::ScoreRng;

    #[test]
    fn points_lie_on_the_surface() {
        let sphere = MusicalSphere::new(SphereParams::default(), &mut ScoreRng::new(1)).unwrap();
        assert_eq!(sphere.points().len(), 200);
        for p in sphere.points() {
            assert!((0.0..TAU).contains(&p.theta));
            assert!((0.0..PI).contains(&p.phi));
            assert!((p.cartesian(200.0).length() - 200.0).abs() < 1e-9);
        }
    }

    #[test]
    fn crossing_emits_exactly_once_per_turn() {
        let params = SphereParams {
            frames: 10,
            ..Default::default()
        };
        // One point just short of the meridian, one far from it.
        let points = vec![
            SpherePoint { theta: TAU - 0.025, phi: PI / 2.0 },
            SpherePoint { theta: 1.0, phi: 0.0 },
        ];
        let mut sphere = MusicalSphere::from_points(params, points).unwrap();
        let seq = sphere.simulate(&mut ScoreRng::new(2)).unwrap();
        assert_eq!(seq.len(), 1);
        let e = seq.events()[0];
        // Crosses on the third rotation (frame index 2).
        assert!((e.start - 0.1).abs() < 1e-12);
        // φ = π/2 maps to 66, snapped to F (65) in C major.
        assert_eq!(e.pitch, 65);
        assert!((60..=100).contains(&e.velocity));
    }

    #[test]
    fn poles_map_to_range_ends() {
        let sphere = MusicalSphere::new(SphereParams::default(), &mut ScoreRng::new(3)).unwrap();
        assert_eq!(sphere.pitch_for(0.0), 36);
        assert_eq!(sphere.pitch_for(PI), 96);
    }

    #[test]
    fn full_run_is_in_scale_and_deterministic() {
        let run = |seed| {
            let mut rng = ScoreRng::new(seed);
            let mut sphere = MusicalSphere::new(SphereParams::default(), &mut rng).unwrap();
            sphere.simulate(&mut rng).unwrap()
        };
        let a = run(4);
        assert_eq!(a, run(4));
        // 1000 frames at 0.01 rad cover 10 rad, so every point crosses once
        // or twice.
        assert!(a.len() >= 200 && a.len() <= 400);
        let major = ScaleKind::Major.scale();
        assert!(a.iter().all(|e| major.contains(e.pitch, 0)));
        assert!(a.is_sorted());
    }

    #[test]
    fn angular_velocity_must_be_a_forward_partial_turn() {
        let point = vec![SpherePoint { theta: 0.0, phi: 1.0 }];
        for omega in [-0.01, 0.0, TAU, 7.0, f64::NAN] {
            let params = SphereParams {
                angular_velocity: omega,
                ..Default::default()
            };
            assert!(
                MusicalSphere::from_points(params, point.clone()).is_err(),
                "accepted {omega}"
            );
        }
        let params = SphereParams {
            angular_velocity: 6.0,
            ..Default::default()
        };
        assert!(MusicalSphere::from_points(params, point).is_ok());
    }

    #[test]
    fn empty_sphere_is_rejected() {
        let params = SphereParams {
            num_points: 0,
            ..Default::default()
        };
        assert!(MusicalSphere::new(params, &mut ScoreRng::new(1)).is_err());
    }
}
