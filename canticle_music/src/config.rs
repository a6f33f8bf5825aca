// Generation configuration: which algorithm to run and with what settings.
//
// Every field has a named default, so a JSON file only needs to mention what
// it changes (`#[serde(default)]` throughout). The `generate` binary loads a
// file with `GenerationConfig::load` and then lets command-line flags
// override individual fields.
//
// Per-algorithm parameter structs are the generators' own types (they all
// derive serde with defaults); the small `*Settings` wrappers here only add
// what a generator takes as call arguments rather than fields.

use crate::boids::FlockParams;
use crate::error::{CanticleError, Result};
use crate::fractal::{GoldenTree, Sierpinski};
use crate::harmonograph::Harmonograph;
use crate::markov::MarkovMelody;
use crate::scale::{Scale, ScaleKind};
use crate::sonify::{
    BiosignalSonifier, ImageSonifier, OnsetDetector, OnsetNotes, OrbitalVoice, TextSonifier,
};
use crate::sphere::SphereParams;
use crate::stochastic::{BookendedMelody, DiceGame, DiceMelody, GranularCloud, WeightedPool};
use crate::transform::{CanonVoice, Note, cantus_theme, prolation_voices};
use crate::walk::RandomWalk;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Walk,
    Markov,
    Weighted,
    Cloud,
    Dice,
    Bookended,
    DiceGame,
    Variations,
    Canon,
    Arpeggio,
    GoldenTree,
    Sierpinski,
    Boids,
    HarmonographLateral,
    HarmonographRotary,
    Sphere,
    Text,
    Biosignal,
    Image,
    Onsets,
    Orbital,
    SolarSystem,
}

impl Algorithm {
    pub const ALL: [Algorithm; 22] = [
        Algorithm::Walk,
        Algorithm::Markov,
        Algorithm::Weighted,
        Algorithm::Cloud,
        Algorithm::Dice,
        Algorithm::Bookended,
        Algorithm::DiceGame,
        Algorithm::Variations,
        Algorithm::Canon,
        Algorithm::Arpeggio,
        Algorithm::GoldenTree,
        Algorithm::Sierpinski,
        Algorithm::Boids,
        Algorithm::HarmonographLateral,
        Algorithm::HarmonographRotary,
        Algorithm::Sphere,
        Algorithm::Text,
        Algorithm::Biosignal,
        Algorithm::Image,
        Algorithm::Onsets,
        Algorithm::Orbital,
        Algorithm::SolarSystem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Walk => "walk",
            Algorithm::Markov => "markov",
            Algorithm::Weighted => "weighted",
            Algorithm::Cloud => "cloud",
            Algorithm::Dice => "dice",
            Algorithm::Bookended => "bookended",
            Algorithm::DiceGame => "dice_game",
            Algorithm::Variations => "variations",
            Algorithm::Canon => "canon",
            Algorithm::Arpeggio => "arpeggio",
            Algorithm::GoldenTree => "golden_tree",
            Algorithm::Sierpinski => "sierpinski",
            Algorithm::Boids => "boids",
            Algorithm::HarmonographLateral => "harmonograph_lateral",
            Algorithm::HarmonographRotary => "harmonograph_rotary",
            Algorithm::Sphere => "sphere",
            Algorithm::Text => "text",
            Algorithm::Biosignal => "biosignal",
            Algorithm::Image => "image",
            Algorithm::Onsets => "onsets",
            Algorithm::Orbital => "orbital",
            Algorithm::SolarSystem => "solar_system",
        }
    }

    /// Whether the algorithm reads `GenerationConfig::input`.
    pub fn needs_input(self) -> bool {
        matches!(
            self,
            Algorithm::Biosignal | Algorithm::Image | Algorithm::Onsets
        )
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    /// Accepts the snake_case name, with `-` allowed in place of `_`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Algorithm::ALL.iter().map(|a| a.name()).collect();
                format!("unknown algorithm '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MarkovSettings {
    /// JSON transition table to load; the built-in C-major model otherwise.
    pub model_path: Option<PathBuf>,
    pub melody: MarkovMelody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedSettings {
    pub pool: WeightedPool,
    pub velocity_range: (u8, u8),
    pub gate: f64,
}

impl Default for WeightedSettings {
    fn default() -> Self {
        WeightedSettings {
            pool: WeightedPool::default_pool(),
            velocity_range: (80, 110),
            gate: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationSettings {
    pub scale: Scale,
    pub root: i64,
    pub velocity: u8,
    pub gate: f64,
}

impl Default for VariationSettings {
    fn default() -> Self {
        VariationSettings {
            scale: ScaleKind::Major.scale(),
            root: 0,
            velocity: 100,
            gate: 0.9,
        }
    }
}

/// A theme played as a canon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonSettings {
    pub theme: Vec<Note>,
    pub voices: Vec<CanonVoice>,
    pub velocity: u8,
    pub gate: f64,
}

impl Default for CanonSettings {
    /// The cantus subject in a three-voice prolation canon.
    fn default() -> Self {
        CanonSettings {
            theme: cantus_theme(),
            voices: prolation_voices(),
            velocity: 100,
            gate: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpeggioSettings {
    pub pattern: Vec<i32>,
    /// Beats per pattern note.
    pub step: f64,
    pub repeats: usize,
    pub gate: f64,
}

impl Default for ArpeggioSettings {
    /// A C-major arpeggio up and back in thirty-second notes.
    fn default() -> Self {
        ArpeggioSettings {
            pattern: vec![60, 64, 67, 72, 67, 64],
            step: 0.125,
            repeats: 4,
            gate: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoidSettings {
    pub params: FlockParams,
    pub count: usize,
}

impl Default for BoidSettings {
    fn default() -> Self {
        BoidSettings {
            params: FlockParams::default(),
            count: 20,
        }
    }
}

/// Raw audio arrives as a whitespace-separated list of samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetSettings {
    pub sample_rate: u32,
    /// Interleaved channels in the sample list.
    pub channels: usize,
    pub detector: OnsetDetector,
    pub notes: OnsetNotes,
}

impl Default for OnsetSettings {
    fn default() -> Self {
        OnsetSettings {
            sample_rate: 44_100,
            channels: 1,
            detector: OnsetDetector::default(),
            notes: OnsetNotes::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Random seed. Drawn from entropy (and logged) when absent.
    pub seed: Option<u64>,
    pub tempo_bpm: f64,
    pub algorithm: Algorithm,
    /// Note count for the melodic generators, tick count for the flock.
    pub length: usize,
    /// Recursion depth override for the fractal generators.
    pub depth: Option<u32>,
    /// Data file for the data-driven algorithms.
    pub input: Option<PathBuf>,
    /// Text to sonify for `text`.
    pub text: String,

    pub walk: RandomWalk,
    pub markov: MarkovSettings,
    pub weighted: WeightedSettings,
    pub cloud: GranularCloud,
    pub dice: DiceMelody,
    pub bookended: BookendedMelody,
    /// A custom dice game; the Mozart excerpt otherwise.
    pub dice_game: Option<DiceGame>,
    pub variations: VariationSettings,
    pub canon: CanonSettings,
    pub arpeggio: ArpeggioSettings,
    pub golden_tree: GoldenTree,
    pub sierpinski: Sierpinski,
    pub boids: BoidSettings,
    /// A custom figure; the classic lateral or rotary one otherwise.
    pub harmonograph: Option<Harmonograph>,
    pub sphere: SphereParams,
    pub text_sonifier: TextSonifier,
    pub biosignal: BiosignalSonifier,
    pub image: ImageSonifier,
    pub onsets: OnsetSettings,
    pub orbital: OrbitalVoice,
    /// Value sonified by `orbital`, within the planets' velocity range.
    pub orbital_value: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            seed: None,
            tempo_bpm: 120.0,
            algorithm: Algorithm::Walk,
            length: 32,
            depth: None,
            input: None,
            text: "Canticle".to_string(),
            walk: RandomWalk::default(),
            markov: MarkovSettings::default(),
            weighted: WeightedSettings::default(),
            cloud: GranularCloud::default(),
            dice: DiceMelody::default(),
            bookended: BookendedMelody::default(),
            dice_game: None,
            variations: VariationSettings::default(),
            canon: CanonSettings::default(),
            arpeggio: ArpeggioSettings::default(),
            golden_tree: GoldenTree::default(),
            sierpinski: Sierpinski::default(),
            boids: BoidSettings::default(),
            harmonograph: None,
            sphere: SphereParams::default(),
            text_sonifier: TextSonifier::default(),
            biosignal: BiosignalSonifier::default(),
            image: ImageSonifier::default(),
            onsets: OnsetSettings::default(),
            orbital: OrbitalVoice::default(),
            orbital_value: 29.79,
        }
    }
}

impl GenerationConfig {
    /// Load a JSON config. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: GenerationConfig = serde_json::from_str(json)?;
        if config.algorithm.needs_input() && config.input.is_none() {
            return Err(CanticleError::InvalidParameter {
                name: "input",
                reason: format!("algorithm '{}' needs an input file", config.algorithm),
            });
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_round_trip() {
        for a in Algorithm::ALL {
            assert_eq!(a.name().parse::<Algorithm>().unwrap(), a);
            let json = serde_json::to_string(&a).unwrap();
            assert_eq!(json, format!("\"{}\"", a.name()));
        }
        assert_eq!("Golden-Tree".parse::<Algorithm>().unwrap(), Algorithm::GoldenTree);
        let err = "fugue".parse::<Algorithm>().unwrap_err();
        assert!(err.contains("walk"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GenerationConfig::from_json(
            r#"{ "algorithm": "sierpinski", "seed": 7, "sierpinski": { "depth": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::Sierpinski);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.sierpinski.depth, 3);
        assert_eq!(config.sierpinski.total_duration, 16.0);
        assert_eq!(config.tempo_bpm, 120.0);
        assert_eq!(config.length, 32);
    }

    #[test]
    fn data_algorithms_need_an_input() {
        let err = GenerationConfig::from_json(r#"{ "algorithm": "image" }"#).unwrap_err();
        assert!(matches!(err, CanticleError::InvalidParameter { name: "input", .. }));
        let image = r#"{ "algorithm": "image", "input": "a.png" }"#;
        assert!(GenerationConfig::from_json(image).is_ok());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            GenerationConfig::from_json("{ \"algorithm\": 3 }"),
            Err(CanticleError::Json(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = GenerationConfig {
            algorithm: Algorithm::Boids,
            length: 50,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = GenerationConfig::load(&path).unwrap();
        assert_eq!(loaded.algorithm, Algorithm::Boids);
        assert_eq!(loaded.length, 50);
        assert_eq!(loaded.boids.count, 20);
    }
}
