// The event model: musical events, chord slots and event sequences.
//
// An `Event` is one sounding note with pitch, start/end time, velocity and
// optional pan. Constructors clamp every MIDI field and raise any
// non-positive duration to `MIN_DURATION`, so an `Event` always satisfies
// `end > start` with fields in range.
//
// An `EventSequence` is what generators return and what sinks consume. It
// records its `TimeBase` (beats or seconds, never mixed) and may carry
// controller samples (`ControlPoint`) alongside the notes, e.g. the
// harmonograph's pan/expression curves. Generators may emit events out of
// time order; `sort()` makes a sequence playable (stable by start time, so
// simultaneous events keep emission order).
//
// `ChordSlot` replaces the "single pitch or list of pitches" representation:
// every slot holds a set of pitches, and a chord is just a slot with more
// than one.

use crate::error::{CanticleError, Result};
use crate::mapping::{clamp_channel, clamp_midi};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Smallest duration an event may have, in its sequence's time base.
pub const MIN_DURATION: f64 = 1e-3;

/// Centre pan position.
pub const PAN_CENTER: u8 = 64;

/// MIDI controller number for pan.
pub const CC_PAN: u8 = 10;

/// MIDI controller number for expression.
pub const CC_EXPRESSION: u8 = 11;

/// The time unit of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    /// Quarter-note beats.
    #[default]
    Beats,
    Seconds,
}

impl TimeBase {
    /// Convert a time value from this base into `target` at `tempo_bpm`.
    pub fn convert(self, value: f64, target: TimeBase, tempo_bpm: f64) -> f64 {
        let seconds_per_beat = 60.0 / tempo_bpm;
        match (self, target) {
            (TimeBase::Beats, TimeBase::Seconds) => value * seconds_per_beat,
            (TimeBase::Seconds, TimeBase::Beats) => value / seconds_per_beat,
            _ => value,
        }
    }
}

/// One musical occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// MIDI note number, 0-127.
    pub pitch: u8,
    pub start: f64,
    /// Always greater than `start`.
    pub end: f64,
    /// 0-127.
    pub velocity: u8,
    /// 0-127, 64 = centre. `None` leaves the channel's pan alone.
    pub pan: Option<u8>,
    /// 0-15.
    pub channel: u8,
}

impl Event {
    /// Build an event from unconstrained values.
    ///
    /// Pitch and velocity are clamped to [0, 127]; a duration below
    /// `MIN_DURATION` (including zero, negative and NaN) becomes
    /// `MIN_DURATION`.
    /// A non-finite start becomes 0. Where `start + duration` rounds back to
    /// `start` (very large starts), `end` is the next representable time.
    pub fn new(pitch: i64, start: f64, duration: f64, velocity: i64) -> Self {
        let start = if start.is_finite() { start } else { 0.0 };
        let duration = if duration >= MIN_DURATION && duration.is_finite() {
            duration
        } else {
            MIN_DURATION
        };
        let end = start + duration;
        Event {
            pitch: clamp_midi(pitch),
            start,
            end: if end > start { end } else { next_after(start) },
            velocity: clamp_midi(velocity),
            pan: None,
            channel: 0,
        }
    }

    pub fn with_pan(mut self, pan: i64) -> Self {
        self.pan = Some(clamp_midi(pan));
        self
    }

    pub fn with_channel(mut self, channel: i64) -> Self {
        self.channel = clamp_channel(channel);
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A timed controller value, e.g. a pan or expression curve sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub time: f64,
    pub controller: u8,
    pub value: u8,
    pub channel: u8,
}

// Smallest f64 strictly greater than a finite `x`.
fn next_after(x: f64) -> f64 {
    if x == 0.0 {
        f64::from_bits(1)
    } else if x > 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        f64::from_bits(x.to_bits() - 1)
    }
}

impl ControlPoint {
    pub fn new(time: f64, controller: u8, value: i64) -> Self {
        ControlPoint {
            time,
            controller: clamp_midi(controller as i64),
            value: clamp_midi(value),
            channel: 0,
        }
    }
}

/// A rhythmic slot holding one or more simultaneous pitches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSlot {
    pub pitches: BTreeSet<u8>,
    pub duration: f64,
}

impl ChordSlot {
    pub fn note(pitch: u8, duration: f64) -> Self {
        ChordSlot {
            pitches: BTreeSet::from([pitch]),
            duration,
        }
    }

    pub fn chord(pitches: impl IntoIterator<Item = u8>, duration: f64) -> Self {
        ChordSlot {
            pitches: pitches.into_iter().collect(),
            duration,
        }
    }

    pub fn is_chord(&self) -> bool {
        self.pitches.len() > 1
    }
}

/// An ordered collection of events in a single time base.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventSequence {
    time_base: TimeBase,
    events: Vec<Event>,
    #[serde(default)]
    controls: Vec<ControlPoint>,
}

impl EventSequence {
    pub fn new(time_base: TimeBase) -> Self {
        EventSequence {
            time_base,
            events: Vec::new(),
            controls: Vec::new(),
        }
    }

    pub fn with_capacity(time_base: TimeBase, capacity: usize) -> Self {
        EventSequence {
            time_base,
            events: Vec::with_capacity(capacity),
            controls: Vec::new(),
        }
    }

    pub fn from_events(time_base: TimeBase, events: Vec<Event>) -> Self {
        EventSequence {
            time_base,
            events,
            controls: Vec::new(),
        }
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn push_control(&mut self, control: ControlPoint) {
        self.controls.push(control);
    }

    /// Emit every pitch of `slot` at `start`, sounding for `gate` of the
    /// slot's duration. Velocities are produced per pitch by `velocity`, in
    /// ascending pitch order. Returns the time at which the slot ends.
    pub fn push_slot(
        &mut self,
        slot: &ChordSlot,
        start: f64,
        gate: f64,
        mut velocity: impl FnMut() -> i64,
    ) -> f64 {
        for &pitch in &slot.pitches {
            self.events.push(Event::new(pitch as i64, start, slot.duration * gate, velocity()));
        }
        start + slot.duration
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn controls(&self) -> &[ControlPoint] {
        &self.controls
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Stable sort of events (and controls) by start time.
    pub fn sort(&mut self) {
        self.events.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.controls.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    pub fn sorted(mut self) -> Self {
        self.sort();
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.events.windows(2).all(|w| w[0].start <= w[1].start)
    }

    /// Latest event end, or 0 when there are no events. Controls are not
    /// counted; see `span`.
    pub fn total_duration(&self) -> f64 {
        self.events.iter().map(|e| e.end).fold(0.0, f64::max)
    }

    /// Latest time touched by an event end or a control point, or 0 when
    /// empty.
    pub fn span(&self) -> f64 {
        let control_end = self.controls.iter().map(|c| c.time).fold(0.0, f64::max);
        self.total_duration().max(control_end)
    }

    /// Shift every event and control by `offset` in this sequence's base.
    pub fn shifted(mut self, offset: f64) -> Self {
        for e in &mut self.events {
            e.start += offset;
            e.end += offset;
        }
        for c in &mut self.controls {
            c.time += offset;
        }
        self
    }

    /// Re-express every time value in `target` at `tempo_bpm`.
    pub fn to_time_base(&self, target: TimeBase, tempo_bpm: f64) -> EventSequence {
        let from = self.time_base;
        let mut out = self.clone();
        out.time_base = target;
        for e in &mut out.events {
            e.start = from.convert(e.start, target, tempo_bpm);
            e.end = from.convert(e.end, target, tempo_bpm);
        }
        for c in &mut out.controls {
            c.time = from.convert(c.time, target, tempo_bpm);
        }
        out
    }

    /// Move all events onto `channel`.
    pub fn on_channel(mut self, channel: i64) -> Self {
        let channel = clamp_channel(channel);
        for e in &mut self.events {
            e.channel = channel;
        }
        for c in &mut self.controls {
            c.channel = channel;
        }
        self
    }

    /// Append `other` after shifting it by `offset`. Both sequences must use
    /// the same time base.
    pub fn append(&mut self, other: EventSequence, offset: f64) -> Result<()> {
        if other.time_base != self.time_base {
            return Err(CanticleError::TimeBaseMismatch);
        }
        let other = other.shifted(offset);
        self.events.extend(other.events);
        self.controls.extend(other.controls);
        Ok(())
    }

    /// The (pitch, duration) view of the sorted sequence, the input shape of
    /// the transforms in `transform.rs`.
    pub fn notes(&self) -> Vec<crate::transform::Note> {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.start.total_cmp(&b.start));
        events
            .iter()
            .map(|e| crate::transform::Note::new(e.pitch as i32, e.duration()))
            .collect()
    }
}

impl IntoIterator for EventSequence {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventSequence {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
