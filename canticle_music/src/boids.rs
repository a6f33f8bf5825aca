// Flocking (boids) simulation mapped onto the piano roll.
//
// The universe is `width` wide (x, the time axis, wraps around) and
// `height` tall (y, the pitch axis, clamped). Every tick each boid in turn
// senses the flock, updates its velocity and moves; later boids in the same
// tick see the already-updated positions and velocities of earlier ones.
//
// Velocity update, per boid:
//   separation = -sum(other - self) over others closer than min_separation
//   alignment  = mean velocity of others within flock_threshold - own
//                velocity (zero when there are none)
//   cohesion   = attraction - position
//   velocity   = velocity / friction
//              + separation * separation_factor
//              + alignment * alignment_factor
//              + cohesion * cohesion_factor
//
// After moving, each boid emits one note at `tick * time_scale`: pitch is
// its height plus `pitch_offset`, velocity is its speed times 20 held in
// [40, 127].
//
// Output time base: beats.

use crate::error::{Result, invalid, require_nonzero, require_positive};
use crate::event::{Event, EventSequence, TimeBase};
use canticle_prng::RandomSource;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Largest initial speed along each axis for scattered boids.
const SCATTER_SPEED: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockParams {
    pub width: f64,
    pub height: f64,
    pub min_separation: f64,
    pub flock_threshold: f64,
    pub separation_factor: f64,
    pub alignment_factor: f64,
    pub cohesion_factor: f64,
    /// Velocity divisor applied every tick; must be positive.
    pub friction: f64,
    pub note_length: f64,
    /// Beats per tick.
    pub time_scale: f64,
    pub pitch_offset: i64,
    /// Point every boid is drawn toward. Defaults to the universe centre.
    pub attraction: Option<DVec2>,
}

impl Default for FlockParams {
    fn default() -> Self {
        FlockParams {
            width: 1000.0,
            height: 127.0,
            min_separation: 10.0,
            flock_threshold: 30.0,
            separation_factor: 0.01,
            alignment_factor: 0.16,
            cohesion_factor: 0.01,
            friction: 1.1,
            note_length: 0.25,
            time_scale: 0.1,
            pitch_offset: 36,
            attraction: None,
        }
    }
}

impl FlockParams {
    pub fn attraction_point(&self) -> DVec2 {
        self.attraction
            .unwrap_or_else(|| DVec2::new(self.width / 2.0, self.height / 2.0))
    }

    fn validate(&self) -> Result<()> {
        require_positive(self.width, "width")?;
        require_positive(self.friction, "friction")?;
        require_positive(self.note_length, "note_length")?;
        require_positive(self.time_scale, "time_scale")?;
        if !self.height.is_finite() || self.height < 0.0 {
            return Err(invalid("height", "must be a finite, non-negative number"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boid {
    pub position: DVec2,
    pub velocity: DVec2,
}

impl Boid {
    pub fn new(position: DVec2, velocity: DVec2) -> Self {
        Boid { position, velocity }
    }

    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }
}

#[derive(Debug, Clone)]
pub struct Flock {
    params: FlockParams,
    boids: Vec<Boid>,
}

impl Flock {
    pub fn new(params: FlockParams, boids: Vec<Boid>) -> Result<Self> {
        params.validate()?;
        require_nonzero(boids.len(), "flock size")?;
        Ok(Flock { params, boids })
    }

    /// `count` boids at random integer positions with random velocities.
    /// Draws per boid: x, y, then the two velocity components.
    pub fn scattered(
        params: FlockParams,
        count: usize,
        rng: &mut impl RandomSource,
    ) -> Result<Self> {
        params.validate()?;
        require_nonzero(count, "flock size")?;
        let boids = (0..count)
            .map(|_| {
                let x = rng.next_int(0, params.width as i64) as f64;
                let y = rng.next_int(0, params.height as i64) as f64;
                let vx = rng.range_f64(-SCATTER_SPEED, SCATTER_SPEED);
                let vy = rng.range_f64(-SCATTER_SPEED, SCATTER_SPEED);
                Boid::new(DVec2::new(x, y), DVec2::new(vx, vy))
            })
            .collect();
        Ok(Flock { params, boids })
    }

    pub fn params(&self) -> &FlockParams {
        &self.params
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    /// The velocity boid `index` would take given the flock's current state.
    pub fn steer(&self, index: usize) -> DVec2 {
        let p = &self.params;
        let me = self.boids[index];

        let mut separation = DVec2::ZERO;
        let mut velocity_sum = DVec2::ZERO;
        let mut neighbours = 0usize;
        for (j, other) in self.boids.iter().enumerate() {
            if j == index {
                continue;
            }
            let distance = me.position.distance(other.position);
            if distance < p.min_separation {
                separation -= other.position - me.position;
            }
            if distance < p.flock_threshold {
                velocity_sum += other.velocity;
                neighbours += 1;
            }
        }
        let alignment = if neighbours > 0 {
            velocity_sum / neighbours as f64 - me.velocity
        } else {
            DVec2::ZERO
        };
        let cohesion = p.attraction_point() - me.position;

        me.velocity / p.friction
            + separation * p.separation_factor
            + alignment * p.alignment_factor
            + cohesion * p.cohesion_factor
    }

    fn advance(&mut self, index: usize) {
        let velocity = self.steer(index);
        let (width, height) = (self.params.width, self.params.height);
        let boid = &mut self.boids[index];
        boid.velocity = velocity;
        let moved = boid.position + velocity;
        boid.position = DVec2::new(moved.x.rem_euclid(width), moved.y.clamp(0.0, height));
    }

    fn note_for(&self, boid: &Boid, tick: usize) -> Event {
        let start = tick as f64 * self.params.time_scale;
        let pitch = boid.position.y.floor() as i64 + self.params.pitch_offset;
        let velocity = (boid.speed() * 20.0).clamp(40.0, 127.0) as i64;
        Event::new(pitch, start, self.params.note_length, velocity)
    }

    /// Advance every boid once, in order, emitting a note after each move.
    pub fn tick(&mut self, tick: usize, out: &mut EventSequence) {
        for i in 0..self.boids.len() {
            self.advance(i);
            out.push(self.note_for(&self.boids[i], tick));
        }
        trace!(tick, "flock advanced");
    }

    /// Run `ticks` ticks and return one note per boid per tick.
    pub fn simulate(&mut self, ticks: usize) -> Result<EventSequence> {
        require_nonzero(ticks, "flock ticks")?;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, ticks * self.boids.len());
        for t in 0..ticks {
            self.tick(t, &mut seq);
        }
        debug!(boids = self.boids.len(), ticks, notes = seq.len(), "flock simulated");
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canticle_prng::ScoreRng;

    fn lone_boid() -> Flock {
        Flock::new(
            FlockParams::default(),
            vec![Boid::new(DVec2::new(400.0, 20.0), DVec2::ZERO)],
        )
        .unwrap()
    }

    #[test]
    fn lone_boid_feels_only_cohesion() {
        let flock = lone_boid();
        let v = flock.steer(0);
        let expected = (DVec2::new(500.0, 63.5) - DVec2::new(400.0, 20.0)) * 0.01;
        assert!((v - expected).length() < 1e-12);
    }

    #[test]
    fn lone_boid_converges_on_attraction() {
        let mut flock = lone_boid();
        let target = flock.params().attraction_point();
        let initial = flock.boids()[0].position.distance(target);
        let mut late_max: f64 = 0.0;
        for t in 0..300 {
            let mut seq = EventSequence::new(TimeBase::Beats);
            flock.tick(t, &mut seq);
            if t >= 200 {
                late_max = late_max.max(flock.boids()[0].position.distance(target));
            }
        }
        assert!(late_max < initial * 1e-3, "still {late_max} away");
    }

    #[test]
    fn close_pair_pushes_apart() {
        let params = FlockParams {
            cohesion_factor: 0.0,
            alignment_factor: 0.0,
            ..Default::default()
        };
        let boids = vec![
            Boid::new(DVec2::new(100.0, 50.0), DVec2::ZERO),
            Boid::new(DVec2::new(104.0, 50.0), DVec2::ZERO),
        ];
        let flock = Flock::new(params, boids).unwrap();
        assert!(flock.steer(0).x < 0.0);
        assert!(flock.steer(1).x > 0.0);
    }

    #[test]
    fn positions_wrap_and_clamp() {
        let params = FlockParams {
            cohesion_factor: 0.0,
            friction: 1.0,
            ..Default::default()
        };
        let boids = vec![Boid::new(DVec2::new(995.0, 125.0), DVec2::new(10.0, 10.0))];
        let mut flock = Flock::new(params, boids).unwrap();
        let mut seq = EventSequence::new(TimeBase::Beats);
        flock.tick(0, &mut seq);
        let b = flock.boids()[0];
        assert!((b.position.x - 5.0).abs() < 1e-9);
        assert_eq!(b.position.y, 127.0);
        // 127 + 36 clamps to the top of the keyboard.
        assert_eq!(seq.events()[0].pitch, 127);
    }

    #[test]
    fn one_note_per_boid_per_tick() {
        let mut rng = ScoreRng::new(12);
        let mut flock = Flock::scattered(FlockParams::default(), 30, &mut rng).unwrap();
        let seq = flock.simulate(40).unwrap();
        assert_eq!(seq.len(), 30 * 40);
        for e in seq.iter() {
            assert!((40..=127).contains(&e.velocity));
            assert!(e.pitch >= 36);
        }
        assert!((seq.events().last().unwrap().start - 3.9).abs() < 1e-9);
    }

    #[test]
    fn invalid_setups_are_rejected() {
        let mut rng = ScoreRng::new(1);
        assert!(Flock::scattered(FlockParams::default(), 0, &mut rng).is_err());
        let frictionless = FlockParams {
            friction: 0.0,
            ..Default::default()
        };
        assert!(Flock::scattered(frictionless, 5, &mut rng).is_err());
        assert!(lone_boid().simulate(0).is_err());
    }
}
