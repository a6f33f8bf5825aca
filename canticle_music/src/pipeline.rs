// Composition pipeline: run the configured generator and return its
// sequence.
//
// `compose` is pure apart from reading the data file a data-driven
// algorithm names (`GenerationConfig::input`). It never writes anything;
// handing the result to a sink is the caller's job.

use crate::boids::Flock;
use crate::config::{Algorithm, GenerationConfig};
use crate::error::{CanticleError, Result, invalid};
use crate::event::EventSequence;
use crate::fractal::{GoldenTree, Sierpinski};
use crate::harmonograph::Harmonograph;
use crate::mapping::data_range;
use crate::markov::{MarkovModel, generate_melody};
use crate::sonify::{BiosignalSonifier, PLANET_VELOCITIES, onsets_to_sequence};
use crate::sphere::MusicalSphere;
use crate::stochastic::DiceGame;
use crate::transform::{arpeggiate, canon, default_theme, render, theme_and_variations};
use canticle_prng::RandomSource;
use std::path::Path;
use tracing::{debug, info};

/// Run `config.algorithm` with `rng` as its only source of randomness.
pub fn compose(config: &GenerationConfig, rng: &mut impl RandomSource) -> Result<EventSequence> {
    let length = config.length;
    let seq = match config.algorithm {
        Algorithm::Walk => config.walk.generate(length, rng)?,
        Algorithm::Markov => {
            let model = match &config.markov.model_path {
                Some(path) => MarkovModel::load(path)?,
                None => MarkovModel::default_model(),
            };
            generate_melody(&model, length, &config.markov.melody, rng)?
        }
        Algorithm::Weighted => {
            let w = &config.weighted;
            w.pool.generate(length, w.velocity_range, w.gate, rng)?
        }
        Algorithm::Cloud => config.cloud.generate(rng)?,
        Algorithm::Dice => config.dice.generate(length, rng)?,
        Algorithm::Bookended => config.bookended.generate(rng)?,
        Algorithm::DiceGame => match &config.dice_game {
            Some(game) => DiceGame::new(game.positions.clone())
                .map(|g| DiceGame {
                    gate: game.gate,
                    velocity_range: game.velocity_range,
                    ..g
                })?
                .generate(rng)?,
            None => DiceGame::mozart_excerpt().generate(rng)?,
        },
        Algorithm::Variations => {
            let v = &config.variations;
            let notes = theme_and_variations(&default_theme(), &v.scale, v.root, rng)?;
            render(&notes, 0.0, v.velocity, v.gate)
        }
        Algorithm::Canon => {
            let c = &config.canon;
            canon(&render(&c.theme, 0.0, c.velocity, c.gate), &c.voices)?
        }
        Algorithm::Arpeggio => {
            let a = &config.arpeggio;
            arpeggiate(&a.pattern, a.step, a.repeats, a.gate)?
        }
        Algorithm::GoldenTree => GoldenTree {
            depth: config.depth.unwrap_or(config.golden_tree.depth),
            ..config.golden_tree.clone()
        }
        .generate()?,
        Algorithm::Sierpinski => Sierpinski {
            depth: config.depth.unwrap_or(config.sierpinski.depth),
            ..config.sierpinski.clone()
        }
        .generate()?,
        Algorithm::Boids => {
            let b = &config.boids;
            Flock::scattered(b.params.clone(), b.count, rng)?.simulate(length)?
        }
        Algorithm::HarmonographLateral => config
            .harmonograph
            .clone()
            .unwrap_or_else(Harmonograph::lateral)
            .generate()?,
        Algorithm::HarmonographRotary => config
            .harmonograph
            .clone()
            .unwrap_or_else(Harmonograph::rotary)
            .generate()?,
        Algorithm::Sphere => MusicalSphere::new(config.sphere.clone(), rng)?.simulate(rng)?,
        Algorithm::Text => config.text_sonifier.generate(&config.text, rng)?,
        Algorithm::Biosignal => {
            let table = std::fs::read_to_string(require_input(config)?)?;
            let (primary, secondary) = BiosignalSonifier::parse_table(&table)?;
            config.biosignal.generate(&primary, &secondary)?
        }
        Algorithm::Image => {
            let image = image::open(require_input(config)?)?.to_rgb8();
            config.image.generate(&image, rng)?
        }
        Algorithm::Onsets => {
            let o = &config.onsets;
            let samples = read_samples(require_input(config)?)?;
            onsets_to_sequence(&samples, o.channels, o.sample_rate, &o.detector, &o.notes)?
        }
        Algorithm::Orbital => {
            let (min, max) = data_range(&PLANET_VELOCITIES).unwrap_or((0.0, 0.0));
            config.orbital.generate(config.orbital_value, min, max, rng)?
        }
        Algorithm::SolarSystem => config.orbital.solar_system(rng)?,
    };
    info!(
        algorithm = %config.algorithm,
        notes = seq.len(),
        controls = seq.controls().len(),
        duration = seq.total_duration(),
        "composition finished"
    );
    Ok(seq.sorted())
}

fn require_input(config: &GenerationConfig) -> Result<&Path> {
    config.input.as_deref().ok_or_else(|| {
        invalid(
            "input",
            format!("algorithm '{}' needs an input file", config.algorithm),
        )
    })
}

/// Read whitespace-separated audio samples.
pub fn read_samples(path: &Path) -> Result<Vec<f32>> {
    let text = std::fs::read_to_string(path)?;
    let samples = text
        .split_whitespace()
        .enumerate()
        .map(|(i, token)| {
            token.parse::<f32>().map_err(|e| CanticleError::InvalidParameter {
                name: "input",
                reason: format!("sample {}: '{token}': {e}", i + 1),
            })
        })
        .collect::<Result<Vec<f32>>>()?;
    debug!(path = %path.display(), samples = samples.len(), "samples read");
    Ok(samples)
}
