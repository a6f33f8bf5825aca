// Canticle generator: CLI entry point.
//
// Runs one generation algorithm and writes the result as a MIDI file (or
// JSON with `--json`).
//
// Usage:
//   cargo run -p canticle_music --bin generate -- [output.mid] [--algorithm NAME]
//     [--seed N] [--tempo BPM] [--config FILE] [--length N] [--depth N]
//     [--input FILE] [--text TEXT] [--json]
//
// Logging goes through `tracing`; set RUST_LOG (e.g. `RUST_LOG=debug`) for
// per-generator detail.

use anyhow::{Context, Result};
use canticle_music::config::{Algorithm, GenerationConfig};
use canticle_music::pipeline::compose;
use canticle_music::sink::{EventSink, MidiFileSink, Placement, json_file_sink};
use canticle_prng::ScoreRng;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "generate")]
#[command(about = "Generate a note sequence and write it as MIDI or JSON")]
#[command(version)]
struct Cli {
    /// Output file
    #[arg(default_value = "output.mid")]
    output: PathBuf,

    /// Algorithm to run (walk, markov, weighted, cloud, sierpinski, boids, ...)
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Random seed (drawn from entropy when absent)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Tempo in BPM
    #[arg(short, long)]
    tempo: Option<f64>,

    /// JSON configuration file; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Note count (ticks for boids)
    #[arg(short, long)]
    length: Option<usize>,

    /// Recursion depth for golden_tree and sierpinski
    #[arg(short, long)]
    depth: Option<u32>,

    /// Data file for biosignal, image and onsets
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Text for the text sonifier
    #[arg(long)]
    text: Option<String>,

    /// Write JSON instead of MIDI
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> Result<(GenerationConfig, PathBuf, bool)> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => GenerationConfig::default(),
        };
        if let Some(a) = self.algorithm {
            config.algorithm = a;
        }
        if let Some(s) = self.seed {
            config.seed = Some(s);
        }
        if let Some(t) = self.tempo {
            config.tempo_bpm = t;
        }
        if let Some(l) = self.length {
            config.length = l;
        }
        if let Some(d) = self.depth {
            config.depth = Some(d);
        }
        if let Some(i) = self.input {
            config.input = Some(i);
        }
        if let Some(t) = self.text {
            config.text = t;
        }
        Ok((config, self.output, self.json))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (config, output, json) = Cli::parse().into_config()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(
        algorithm = %config.algorithm,
        seed,
        tempo = config.tempo_bpm,
        output = %output.display(),
        "generating"
    );

    let mut rng = ScoreRng::new(seed);
    let sequence = compose(&config, &mut rng)
        .with_context(|| format!("running algorithm '{}'", config.algorithm))?;

    let placement = Placement {
        tempo_bpm: config.tempo_bpm,
        ..Default::default()
    };
    if json {
        let mut sink = json_file_sink(&output)
            .with_context(|| format!("creating {}", output.display()))?;
        sink.receive(sequence, placement)?;
        sink.into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flushing {}", output.display()))?;
    } else {
        MidiFileSink::new(&output)
            .receive(sequence, placement)
            .with_context(|| format!("writing {}", output.display()))?;
    }
    info!(output = %output.display(), "done");
    Ok(())
}
