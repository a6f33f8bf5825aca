// End-to-end: generate, transform, place and write.

use canticle_music::analysis::pitch_zipf;
use canticle_music::config::{Algorithm, GenerationConfig};
use canticle_music::event::{EventSequence, TimeBase};
use canticle_music::markov::{MarkovChain, MarkovMelody, MarkovModel};
use canticle_music::pipeline::compose;
use canticle_music::scale::ScaleKind;
use canticle_music::sink::{CollectSink, EventSink, JsonSink, MidiFileSink, Placement};
use canticle_music::transform::{quantize_grid, render, retrograde, transpose};
use canticle_music::walk::RandomWalk;
use canticle_prng::ScoreRng;
use midly::{MidiMessage, Smf, TrackEventKind};

fn note_ons(smf: &Smf) -> usize {
    smf.tracks
        .iter()
        .flatten()
        .filter(|e| {
            matches!(
                e.kind,
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                }
            )
        })
        .count()
}

#[test]
fn walk_transformed_and_written_to_midi() {
    let mut rng = ScoreRng::new(2024);
    let walk = RandomWalk::new(ScaleKind::Dorian.scale(), 62);
    let seq = walk.generate(24, &mut rng).unwrap();

    let notes = transpose(&retrograde(&seq.notes()), 5);
    let notes = quantize_grid(&notes, 0.25, &ScaleKind::Major.scale(), 0).unwrap();
    let answer = render(&notes, 0.0, 96, 0.9);
    assert_eq!(answer.len(), 24);
    let major = ScaleKind::Major.scale();
    assert!(answer.iter().all(|e| major.contains(e.pitch, 0)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("walk.mid");
    MidiFileSink::new(&path)
        .receive(answer, Placement::at(2.0))
        .unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(note_ons(&smf), 24);
    // Two beats of lead-in at 480 ticks per beat before the first note.
    let mut first_note_tick = 0;
    for e in &smf.tracks[1] {
        first_note_tick += e.delta.as_int();
        if matches!(e.kind, TrackEventKind::Midi { .. }) {
            break;
        }
    }
    assert_eq!(first_note_tick, 960);
}

#[test]
fn two_voices_share_one_sink() {
    let model = MarkovModel::default_model();
    let melody = MarkovMelody::default();
    let mut rng = ScoreRng::new(9);
    let upper = MarkovChain::new(&model, 72).generate(16, &melody, &mut rng).unwrap();
    let lower = MarkovChain::new(&model, 48).generate(16, &melody, &mut rng).unwrap();

    let mut sink = CollectSink::new();
    sink.receive(upper, Placement::default()).unwrap();
    sink.receive(lower.on_channel(1), Placement::at(4.0)).unwrap();
    let merged = sink.merged().unwrap().unwrap();
    assert_eq!(merged.len(), 32);
    assert!(merged.is_sorted());
    assert!(merged.iter().filter(|e| e.channel == 1).all(|e| e.start >= 4.0));
}

#[test]
fn onset_sequences_convert_to_beats_at_hand_off() {
    let mut seq = EventSequence::new(TimeBase::Seconds);
    seq.push(canticle_music::Event::new(60, 1.5, 0.5, 100));
    let mut sink = JsonSink::new(Vec::new());
    sink.receive(seq, Placement { tempo_bpm: 60.0, ..Default::default() })
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
    assert_eq!(value["time_base"], "beats");
    assert_eq!(value["events"][0]["start"], 1.5);
    assert_eq!(value["events"][0]["end"], 2.0);
}

#[test]
fn configured_composition_is_reproducible_and_analysable() {
    let json = r#"{ "algorithm": "markov", "length": 200 }"#;
    let config = GenerationConfig::from_json(json).unwrap();
    let a = compose(&config, &mut ScoreRng::new(77)).unwrap();
    let b = compose(&config, &mut ScoreRng::new(77)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 200);
    let fit = pitch_zipf(&a);
    assert!(fit.slope < 0.0);
    assert!((0.0..=1.0).contains(&fit.r_squared));
}

#[test]
fn every_fractal_and_simulation_writes_valid_midi() {
    let dir = tempfile::tempdir().unwrap();
    for algorithm in [
        Algorithm::GoldenTree,
        Algorithm::Sierpinski,
        Algorithm::Boids,
        Algorithm::HarmonographRotary,
        Algorithm::SolarSystem,
    ] {
        let config = GenerationConfig {
            algorithm,
            length: 10,
            depth: Some(4),
            ..Default::default()
        };
        let seq = compose(&config, &mut ScoreRng::new(3)).unwrap();
        let expected = seq.len();
        let path = dir.path().join(format!("{algorithm}.mid"));
        MidiFileSink::new(&path)
            .receive(seq, Placement::default())
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(note_ons(&smf), expected, "{algorithm}");
    }
}
