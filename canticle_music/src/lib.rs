// Canticle: a generative note-sequence engine.
//
// Algorithms (random walks, Markov chains, weighted pools, fractals, flocks,
// pendulum curves, a revolving sphere) and data sonifiers (text,
// biosignals, images, audio onsets, planetary orbits) each produce an
// in-memory `EventSequence` in a declared time base. Generation is pure and
// deterministic given a seeded `RandomSource`; the finished sequence is
// handed once to an `EventSink` (in-memory, MIDI file or JSON).
//
// Architecture:
// - error.rs: `CanticleError` and the crate-wide `Result`
// - mapping.rs: linear range mapping, MIDI clamping, index mapping
// - scale.rs: scale tables, quantization to a scale, degree arithmetic
// - event.rs: `Event`, `ControlPoint`, `ChordSlot`, `EventSequence`, time bases
// - transform.rs: retrograde, transpose, elongate, randomize, mutate, grid
//   quantization, theme-and-variations, canons and the arpeggiator
// - walk.rs: random walk over scale degrees
// - markov.rs: first-order Markov melody model and chain
// - stochastic.rs: weighted pools, granular clouds, dice melodies, dice games
// - fractal.rs: golden-ratio tree and Sierpinski triangle
// - boids.rs: flocking simulation sonified per tick
// - harmonograph.rs: pendulum curves as pan/expression automation
// - sphere.rs: points on a rotating sphere sounding at the meridian
// - sonify.rs: text, biosignal, image, onset and orbital sonification
// - analysis.rs: pitch histograms and Zipf fits
// - config.rs: `GenerationConfig`, loaded from JSON with defaults
// - pipeline.rs: `compose`, dispatching a config to its generator
// - sink.rs: `EventSink`, `Placement` and the collect/MIDI/JSON sinks

pub mod analysis;
pub mod boids;
pub mod config;
pub mod error;
pub mod event;
pub mod fractal;
pub mod harmonograph;
pub mod mapping;
pub mod markov;
pub mod pipeline;
pub mod scale;
pub mod sink;
pub mod sonify;
pub mod sphere;
pub mod stochastic;
pub mod transform;
pub mod walk;

pub use error::{CanticleError, Result};
pub use event::{Event, EventSequence, TimeBase};
