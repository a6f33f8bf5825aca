// Sinks: where finished sequences go.
//
// Generators never talk to a host. They return an `EventSequence`, and the
// caller hands it, by value and exactly once, to an `EventSink` together
// with a `Placement` saying where it goes (offset, time base, tempo).
// Conversion between beats and seconds happens in one place, at hand-off,
// via `EventSequence::to_time_base`.
//
// Provided sinks:
// - `CollectSink`: keeps placed sequences in memory (tests, embedding).
// - `MidiFileSink`: writes a Standard MIDI File through `midly`. Format 1:
//   a tempo track plus one track per MIDI channel in use. Per-note pan and
//   controller curves become CC messages.
// - `JsonSink`: serializes the placed, sorted sequence with serde_json.

use crate::error::{CanticleError, Result, require_positive};
use crate::event::{CC_PAN, EventSequence, TimeBase};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

const MAX_U24: u32 = (1 << 24) - 1;
const MAX_U28: u32 = (1 << 28) - 1;

/// Where a sequence lands in the host's timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Offset added to every event, in `time_base` units.
    pub start_offset: f64,
    /// Time base the host expects.
    pub time_base: TimeBase,
    pub tempo_bpm: f64,
}

impl Default for Placement {
    fn default() -> Self {
        Placement {
            start_offset: 0.0,
            time_base: TimeBase::Beats,
            tempo_bpm: 120.0,
        }
    }
}

impl Placement {
    pub fn at(start_offset: f64) -> Self {
        Placement {
            start_offset,
            ..Default::default()
        }
    }

    /// Convert `sequence` into this placement's time base, shift it and
    /// sort it for playback.
    pub fn apply(&self, sequence: EventSequence) -> Result<EventSequence> {
        require_positive(self.tempo_bpm, "tempo_bpm")?;
        let converted = if sequence.time_base() == self.time_base {
            sequence
        } else {
            sequence.to_time_base(self.time_base, self.tempo_bpm)
        };
        Ok(converted.shifted(self.start_offset).sorted())
    }
}

/// The single hand-off point between generation and a host.
pub trait EventSink {
    fn receive(&mut self, sequence: EventSequence, placement: Placement) -> Result<()>;
}

/// Keeps every placed sequence in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub received: Vec<(EventSequence, Placement)>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All received sequences merged into one, in the first placement's
    /// time base. `Ok(None)` when nothing was received; placements in
    /// different time bases fail with `TimeBaseMismatch`.
    pub fn merged(&self) -> Result<Option<EventSequence>> {
        let Some((first, _)) = self.received.first() else {
            return Ok(None);
        };
        let mut all = EventSequence::new(first.time_base());
        for (seq, _) in &self.received {
            all.append(seq.clone(), 0.0)?;
        }
        Ok(Some(all.sorted()))
    }
}

impl EventSink for CollectSink {
    fn receive(&mut self, sequence: EventSequence, placement: Placement) -> Result<()> {
        let placed = placement.apply(sequence)?;
        self.received.push((placed, placement));
        Ok(())
    }
}

/// Writes each received sequence to a Standard MIDI File.
#[derive(Debug, Clone)]
pub struct MidiFileSink {
    path: PathBuf,
    track_name: String,
}

impl MidiFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MidiFileSink {
            path: path.into(),
            track_name: "canticle".to_string(),
        }
    }

    pub fn with_track_name(mut self, name: impl Into<String>) -> Self {
        self.track_name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for MidiFileSink {
    /// MIDI is metrical, so the sequence is always placed in beats; the
    /// placement's offset is read in its own time base first.
    fn receive(&mut self, sequence: EventSequence, placement: Placement) -> Result<()> {
        let offset_beats =
            placement
                .time_base
                .convert(placement.start_offset, TimeBase::Beats, placement.tempo_bpm);
        let beats = Placement {
            start_offset: offset_beats,
            time_base: TimeBase::Beats,
            tempo_bpm: placement.tempo_bpm,
        };
        let placed = beats.apply(sequence)?;
        let bytes = encode_midi(&placed, placement.tempo_bpm, &self.track_name)?;
        std::fs::write(&self.path, &bytes)?;
        info!(
            path = %self.path.display(),
            notes = placed.len(),
            bytes = bytes.len(),
            "MIDI file written"
        );
        Ok(())
    }
}

/// Encode a sequence as SMF bytes at `tempo_bpm`.
pub fn encode_midi(sequence: &EventSequence, tempo_bpm: f64, track_name: &str) -> Result<Vec<u8>> {
    let smf = sequence_to_smf(sequence, tempo_bpm, track_name)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)
        .map_err(|e| CanticleError::Midi(e.to_string()))?;
    Ok(buf)
}

/// One timed MIDI message before delta encoding.
struct Timed {
    tick: u32,
    /// Orders messages sharing a tick: note-offs, then controllers, then
    /// note-ons.
    rank: u8,
    message: MidiMessage,
}

fn to_tick(beats: f64) -> u32 {
    (beats * TICKS_PER_QUARTER as f64).round().clamp(0.0, u32::MAX as f64) as u32
}

/// A note in ticks, after same-pitch overlaps are resolved.
#[derive(Clone, Copy)]
struct Sounding {
    pitch: u8,
    on: u32,
    off: u32,
    velocity: u8,
    pan: Option<u8>,
}

/// The notes of one channel in ticks. MIDI has a single voice per key and
/// channel, so where two notes of the same pitch overlap the earlier one is
/// cut off where the later one starts. Notes of the same pitch starting on
/// the same tick collapse into one that releases at the later end.
fn channel_notes(sequence: &EventSequence, channel: u8) -> Vec<Sounding> {
    let mut notes: Vec<Sounding> = sequence
        .iter()
        .filter(|e| e.channel == channel)
        .map(|e| {
            let on = to_tick(e.start);
            Sounding {
                pitch: e.pitch,
                on,
                // A note always lasts at least one tick.
                off: to_tick(e.end).max(on.saturating_add(1)),
                velocity: e.velocity,
                pan: e.pan,
            }
        })
        .collect();
    notes.sort_by_key(|n| (n.pitch, n.on));

    let mut kept: Vec<Sounding> = Vec::with_capacity(notes.len());
    for n in notes {
        if let Some(prev) = kept.last_mut().filter(|p| p.pitch == n.pitch && p.off > n.on) {
            if prev.on == n.on {
                let off = prev.off.max(n.off);
                *prev = Sounding { off, ..n };
                continue;
            }
            prev.off = n.on;
        }
        kept.push(n);
    }
    kept
}

/// Convert a sequence into an in-memory SMF (Format 1). Overlapping notes of
/// the same pitch on one channel are resolved as in `channel_notes`, so
/// every note-on has its own note-off.
pub fn sequence_to_smf<'a>(
    sequence: &EventSequence,
    tempo_bpm: f64,
    track_name: &'a str,
) -> Result<Smf<'a>> {
    require_positive(tempo_bpm, "tempo_bpm")?;
    let beats = match sequence.time_base() {
        TimeBase::Beats => sequence.clone(),
        TimeBase::Seconds => sequence.to_time_base(TimeBase::Beats, tempo_bpm),
    };

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo
    let tempo_us = (60_000_000.0 / tempo_bpm).round().clamp(1.0, MAX_U24 as f64) as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_us))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    let channels: BTreeSet<u8> = beats
        .events()
        .iter()
        .map(|e| e.channel)
        .chain(beats.controls().iter().map(|c| c.channel))
        .collect();

    for channel in channels {
        let mut timed = Vec::new();
        for n in channel_notes(&beats, channel) {
            if let Some(pan) = n.pan {
                timed.push(Timed {
                    tick: n.on,
                    rank: 1,
                    message: MidiMessage::Controller {
                        controller: u7::new(CC_PAN),
                        value: u7::new(pan),
                    },
                });
            }
            timed.push(Timed {
                tick: n.on,
                rank: 2,
                message: MidiMessage::NoteOn {
                    key: u7::new(n.pitch),
                    vel: u7::new(n.velocity),
                },
            });
            timed.push(Timed {
                tick: n.off,
                rank: 0,
                message: MidiMessage::NoteOff {
                    key: u7::new(n.pitch),
                    vel: u7::new(0),
                },
            });
        }
        for c in beats.controls().iter().filter(|c| c.channel == channel) {
            timed.push(Timed {
                tick: to_tick(c.time),
                rank: 1,
                message: MidiMessage::Controller {
                    controller: u7::new(c.controller),
                    value: u7::new(c.value),
                },
            });
        }
        timed.sort_by_key(|t| (t.tick, t.rank));

        let mut track: Track<'a> = Vec::with_capacity(timed.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track_name.as_bytes())),
        });
        let mut last_tick = 0u32;
        for t in timed {
            let delta = (t.tick - last_tick).min(MAX_U28);
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message: t.message,
                },
            });
            last_tick = t.tick;
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    Ok(smf)
}

/// The document `JsonSink` writes.
#[derive(Serialize)]
struct JsonScore<'a> {
    tempo_bpm: f64,
    #[serde(flatten)]
    sequence: &'a EventSequence,
}

/// Serializes each received sequence as one JSON document.
#[derive(Debug)]
pub struct JsonSink<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        JsonSink {
            writer,
            pretty: true,
        }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonSink<W> {
    fn receive(&mut self, sequence: EventSequence, placement: Placement) -> Result<()> {
        let placed = placement.apply(sequence)?;
        let doc = JsonScore {
            tempo_bpm: placement.tempo_bpm,
            sequence: &placed,
        };
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &doc)?;
        } else {
            serde_json::to_writer(&mut self.writer, &doc)?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Open `path` for a `JsonSink`.
pub fn json_file_sink(path: &Path) -> Result<JsonSink<std::io::BufWriter<std::fs::File>>> {
    let file = std::fs::File::create(path).map_err(CanticleError::Io)?;
    Ok(JsonSink::new(std::io::BufWriter::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CC_EXPRESSION, ControlPoint, Event};

    fn two_notes() -> EventSequence {
        let mut seq = EventSequence::new(TimeBase::Beats);
        seq.push(Event::new(64, 1.0, 1.0, 90));
        seq.push(Event::new(60, 0.0, 1.0, 100).with_pan(20));
        seq
    }

    #[test]
    fn collect_sink_places_and_sorts() {
        let mut sink = CollectSink::new();
        sink.receive(two_notes(), Placement::at(4.0)).unwrap();
        let (seq, _) = &sink.received[0];
        assert!(seq.is_sorted());
        assert_eq!(seq.events()[0].start, 4.0);
        assert_eq!(seq.events()[0].pitch, 60);
    }

    #[test]
    fn collect_sink_converts_time_base() {
        let mut sink = CollectSink::new();
        let placement = Placement {
            start_offset: 1.0,
            time_base: TimeBase::Seconds,
            tempo_bpm: 120.0,
        };
        sink.receive(two_notes(), placement).unwrap();
        let (seq, _) = &sink.received[0];
        assert_eq!(seq.time_base(), TimeBase::Seconds);
        // Beat 1 at 120 BPM is 0.5 s, plus the 1 s offset.
        assert_eq!(seq.events()[1].start, 1.5);
        let merged = sink.merged().unwrap().unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merging_mixed_time_bases_fails() {
        let mut sink = CollectSink::new();
        assert!(sink.merged().unwrap().is_none());
        sink.receive(two_notes(), Placement::default()).unwrap();
        let seconds = Placement {
            time_base: TimeBase::Seconds,
            ..Default::default()
        };
        sink.receive(two_notes(), seconds).unwrap();
        assert!(matches!(sink.merged(), Err(CanticleError::TimeBaseMismatch)));
    }

    #[test]
    fn smf_has_tempo_and_channel_tracks() {
        let mut seq = two_notes();
        seq.push(Event::new(48, 0.0, 2.0, 80).with_channel(3));
        seq.push_control(ControlPoint::new(0.5, CC_EXPRESSION, 90));
        let smf = sequence_to_smf(&seq, 120.0, "test").unwrap();
        // Tempo track, channel 0, channel 3.
        assert_eq!(smf.tracks.len(), 3);
        let tempo = &smf.tracks[0][0];
        assert!(matches!(
            tempo.kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000
        ));

        let ch0 = &smf.tracks[1];
        let midi: Vec<&MidiMessage> = ch0
            .iter()
            .filter_map(|e| match &e.kind {
                TrackEventKind::Midi { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        // Pan CC, note on 60, CC11, note off 60, note on 64, note off 64.
        assert_eq!(midi.len(), 6);
        assert!(matches!(midi[0], MidiMessage::Controller { controller, value }
            if controller.as_int() == CC_PAN && value.as_int() == 20));
        assert!(matches!(midi[1], MidiMessage::NoteOn { key, .. } if key.as_int() == 60));
        assert!(matches!(midi[3], MidiMessage::NoteOff { key, .. } if key.as_int() == 60));
        assert!(matches!(midi[4], MidiMessage::NoteOn { key, .. } if key.as_int() == 64));
    }

    /// (absolute tick, is note-on) for every note message on `key`.
    fn key_timeline(track: &Track, key: u8) -> Vec<(u32, bool)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for e in track {
            tick += e.delta.as_int();
            let (k, on) = match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => (key, true),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { key, .. },
                    ..
                } => (key, false),
                _ => continue,
            };
            if k.as_int() == key {
                out.push((tick, on));
            }
        }
        out
    }

    #[test]
    fn overlapping_same_pitch_notes_are_cut_off() {
        let mut seq = EventSequence::new(TimeBase::Beats);
        seq.push(Event::new(60, 0.0, 2.0, 100));
        seq.push(Event::new(60, 1.0, 2.0, 90));
        // Same pitch, same start: one note held to the later end.
        seq.push(Event::new(62, 0.0, 1.0, 100));
        seq.push(Event::new(62, 0.0, 2.0, 80));
        let smf = sequence_to_smf(&seq, 120.0, "t").unwrap();
        let track = &smf.tracks[1];
        assert_eq!(
            key_timeline(track, 60),
            vec![(0, true), (480, false), (480, true), (1440, false)]
        );
        assert_eq!(key_timeline(track, 62), vec![(0, true), (960, false)]);
    }

    #[test]
    fn seconds_sequences_are_converted_to_ticks() {
        let mut seq = EventSequence::new(TimeBase::Seconds);
        seq.push(Event::new(60, 0.5, 0.5, 100));
        let smf = sequence_to_smf(&seq, 120.0, "t").unwrap();
        let track = &smf.tracks[1];
        // Name, note on at beat 1 (480 ticks), note off 480 ticks later.
        assert_eq!(track[1].delta.as_int(), 480);
        assert_eq!(track[2].delta.as_int(), 480);
    }

    #[test]
    fn midi_file_round_trips_through_midly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");
        let mut sink = MidiFileSink::new(&path);
        sink.receive(two_notes(), Placement::default()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        let note_ons = smf.tracks[1]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(note_ons, 2);
    }

    #[test]
    fn json_sink_writes_sorted_events() {
        let mut sink = JsonSink::new(Vec::new()).compact();
        sink.receive(two_notes(), Placement::default()).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["tempo_bpm"], 120.0);
        assert_eq!(value["time_base"], "beats");
        assert_eq!(value["events"][0]["pitch"], 60);
        assert_eq!(value["events"][1]["pitch"], 64);
    }

    #[test]
    fn bad_tempo_is_rejected() {
        let mut sink = CollectSink::new();
        let placement = Placement {
            tempo_bpm: 0.0,
            ..Default::default()
        };
        assert!(sink.receive(two_notes(), placement).is_err());
    }
}
