// Data sonification: turning text, sensor data, images, audio and
// astronomical constants into note sequences.
//
// Each sonifier normalizes its input against a known or measured range with
// `map_value`, so constant input (a zero-width range) maps every value to
// the bottom of the output range instead of failing. That case is logged at
// `warn` because it almost always means the data was not what the caller
// expected.
//
// - `TextSonifier`: one note per character. The character code picks both
//   a pentatonic degree and a duration. A long closing note repeats the
//   last pitch.
// - `BiosignalSonifier`: two parallel channels. The first sets a base
//   pitch, the second adds a variation and sets the velocity.
// - `ImageSonifier`: five pixel rows scanned left to right. Luminosity sets
//   pitch, red sets duration and blue sets velocity.
// - `OnsetDetector` + `OnsetNotes`: amplitude-envelope onset detection on
//   a mono sample buffer, one note per onset. Output is in seconds.
// - `OrbitalVoice`: a constant pitch picked from a value (e.g. a planet's
//   orbital speed), with pan and dynamics oscillating at a rate set by that
//   same value.
//
// Everything except the onset notes is in beats.

use crate::error::{
    CanticleError, Result, invalid, require_nonzero, require_positive, require_range,
};
use crate::event::{Event, EventSequence, TimeBase};
use crate::mapping::{data_range, map_clamped, map_to_index, map_unclamped};
use crate::scale::{Scale, ScaleKind, build_scale, map_to_scale};
use canticle_prng::RandomSource;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The measured range of a data stream, warning when it is degenerate.
fn measured_range(values: &[f64], what: &str) -> (f64, f64) {
    match data_range(values) {
        Some((lo, hi)) => {
            if lo == hi {
                warn!(what, value = lo, "constant input; every value maps to the range floor");
            }
            (lo, hi)
        }
        None => {
            warn!(what, "input holds no numbers");
            (0.0, 0.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSonifier {
    pub scale: Scale,
    /// Pitch of degree 0.
    pub base_pitch: i64,
    /// Number of scale degrees the character range is spread over.
    pub degree_count: usize,
    /// Duration table, longest first; low character codes get long notes.
    pub durations: Vec<f64>,
    /// Character codes mapped onto the degree and duration tables.
    pub char_range: (u32, u32),
    pub velocity_range: (u8, u8),
    pub closing_duration: f64,
    pub closing_velocity: u8,
    pub gate: f64,
}

impl Default for TextSonifier {
    /// Major pentatonic from C3 over four octaves, printable ASCII.
    fn default() -> Self {
        TextSonifier {
            scale: ScaleKind::MajorPentatonic.scale(),
            base_pitch: 48,
            degree_count: 20,
            durations: vec![2.0, 1.0, 1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 0.5, 0.25, 0.25],
            char_range: (32, 126),
            velocity_range: (60, 120),
            closing_duration: 4.0,
            closing_velocity: 100,
            gate: 0.9,
        }
    }
}

impl TextSonifier {
    /// Pitch and duration for one character.
    pub fn note_for(&self, c: char) -> (i64, f64) {
        let code = c as u32 as f64;
        let (lo, hi) = (self.char_range.0 as f64, self.char_range.1 as f64);
        let degree = map_to_index(code, lo, hi, self.degree_count);
        let duration = self.durations[map_to_index(code, lo, hi, self.durations.len())];
        (self.scale.degree_pitch(degree as i64, self.base_pitch), duration)
    }

    /// One note per character (one velocity draw each), then the closing
    /// note.
    pub fn generate(&self, text: &str, rng: &mut impl RandomSource) -> Result<EventSequence> {
        require_nonzero(text.chars().count(), "text length")?;
        require_nonzero(self.degree_count, "degree_count")?;
        require_range(self.velocity_range, "velocity_range")?;
        if self.durations.is_empty() {
            return Err(invalid("durations", "no durations to choose from"));
        }

        let (vlo, vhi) = self.velocity_range;
        let mut seq = EventSequence::new(TimeBase::Beats);
        let mut cursor = 0.0;
        let mut last_pitch = self.base_pitch;
        for c in text.chars() {
            let (pitch, duration) = self.note_for(c);
            let velocity = rng.next_int(vlo as i64, vhi as i64);
            seq.push(Event::new(pitch, cursor, duration * self.gate, velocity));
            cursor += duration;
            last_pitch = pitch;
        }
        seq.push(Event::new(
            last_pitch,
            cursor,
            self.closing_duration * self.gate,
            self.closing_velocity as i64,
        ));
        debug!(chars = seq.len() - 1, beats = cursor + self.closing_duration, "text sonified");
        Ok(seq)
    }
}

// ---------------------------------------------------------------------------
// Biosignals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiosignalSonifier {
    /// Pitch range the primary channel spans.
    pub base_range: (f64, f64),
    /// Semitones the secondary channel adds on top.
    pub variation_range: (f64, f64),
    pub velocity_range: (f64, f64),
    pub scale: Scale,
    pub root: i64,
    /// Beats per sample.
    pub step: f64,
    pub gate: f64,
}

impl Default for BiosignalSonifier {
    fn default() -> Self {
        BiosignalSonifier {
            base_range: (48.0, 84.0),
            variation_range: (0.0, 24.0),
            velocity_range: (60.0, 110.0),
            scale: ScaleKind::Major.scale(),
            root: 0,
            step: 0.125,
            gate: 0.9,
        }
    }
}

impl BiosignalSonifier {
    /// Parse a whitespace-separated table (time, primary, secondary per
    /// line). Lines with fewer than three columns are skipped.
    pub fn parse_table(text: &str) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 3 {
                continue;
            }
            let parse = |s: &str| {
                s.parse::<f64>()
                    .map_err(|e| invalid("biosignal table", format!("line {}: {e}", n + 1)))
            };
            primary.push(parse(cols[1])?);
            secondary.push(parse(cols[2])?);
        }
        Ok((primary, secondary))
    }

    /// One note per sample pair. No randomness.
    pub fn generate(&self, primary: &[f64], secondary: &[f64]) -> Result<EventSequence> {
        require_nonzero(primary.len(), "biosignal samples")?;
        require_positive(self.step, "step")?;
        if primary.len() != secondary.len() {
            return Err(invalid(
                "secondary",
                format!("{} samples against {} primary samples", secondary.len(), primary.len()),
            ));
        }

        let (p_lo, p_hi) = measured_range(primary, "primary channel");
        let (s_lo, s_hi) = measured_range(secondary, "secondary channel");
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, primary.len());
        for (i, (&p, &s)) in primary.iter().zip(secondary).enumerate() {
            let base = map_unclamped(p, p_lo, p_hi, self.base_range.0, self.base_range.1);
            let (v_lo, v_hi) = self.variation_range;
            let variation = map_unclamped(s, s_lo, s_hi, v_lo, v_hi);
            let pitch = self.scale.quantize((base + variation).trunc() as i64, self.root);
            let (vel_lo, vel_hi) = self.velocity_range;
            let velocity = map_unclamped(s, s_lo, s_hi, vel_lo, vel_hi);
            seq.push(Event::new(
                pitch as i64,
                i as f64 * self.step,
                self.step * self.gate,
                velocity.trunc() as i64,
            ));
        }
        debug!(samples = primary.len(), "biosignal sonified");
        Ok(seq)
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// The rows scanned for an image of `height` pixels: top, quarter, middle,
/// three quarters and bottom, without repeats.
pub fn select_rows(height: u32) -> Vec<u32> {
    if height == 0 {
        return Vec::new();
    }
    let mut rows = vec![0, height / 4, height / 2, (3 * height) / 4, height - 1];
    rows.dedup();
    rows
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSonifier {
    pub pitch_range: (f64, f64),
    pub scale: Scale,
    pub root: i64,
    pub duration_range: (f64, f64),
    pub velocity_range: (f64, f64),
    /// Offsets, in beats, one of which is added to each column's start.
    pub displacements: Vec<f64>,
}

impl Default for ImageSonifier {
    fn default() -> Self {
        ImageSonifier {
            pitch_range: (36.0, 96.0),
            scale: ScaleKind::Mixolydian.scale(),
            root: 0,
            duration_range: (0.8, 6.0),
            velocity_range: (40.0, 110.0),
            displacements: vec![0.75, 0.5, 0.25, 0.125],
        }
    }
}

impl ImageSonifier {
    /// The note one pixel sounds, before its start displacement.
    pub fn pixel_note(&self, rgb: [u8; 3], column: u32, displacement: f64) -> Event {
        let [r, g, b] = rgb;
        let lum = (r as f64 + g as f64 + b as f64) / 3.0;
        let raw = map_clamped(lum, 0.0, 255.0, self.pitch_range.0, self.pitch_range.1);
        let pitch = self.scale.quantize(raw.trunc() as i64, self.root);
        let (d_lo, d_hi) = self.duration_range;
        let duration = map_clamped(r as f64, 0.0, 255.0, d_lo, d_hi);
        let (v_lo, v_hi) = self.velocity_range;
        let velocity = map_clamped(b as f64, 0.0, 255.0, v_lo, v_hi);
        Event::new(
            pitch as i64,
            column as f64 + displacement,
            duration,
            velocity.trunc() as i64,
        )
    }

    /// Scan the selected rows column by column, one displacement draw per
    /// pixel. Each column is one beat; rows overlap in time.
    pub fn generate(&self, image: &RgbImage, rng: &mut impl RandomSource) -> Result<EventSequence> {
        let (width, height) = image.dimensions();
        require_nonzero(width as usize, "image width")?;
        require_nonzero(height as usize, "image height")?;
        if self.displacements.is_empty() {
            return Err(invalid("displacements", "no displacements to choose from"));
        }

        let rows = select_rows(height);
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, rows.len() * width as usize);
        for &y in &rows {
            for x in 0..width {
                let displacement = self.displacements[rng.next_index(self.displacements.len())];
                seq.push(self.pixel_note(image.get_pixel(x, y).0, x, displacement));
            }
        }
        debug!(width, height, rows = rows.len(), notes = seq.len(), "image sonified");
        Ok(seq)
    }
}

// ---------------------------------------------------------------------------
// Audio onsets
// ---------------------------------------------------------------------------

/// Average interleaved frames down to one channel.
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Scale a buffer so its largest magnitude is 1. Silence is left alone.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// A detected onset: the sample it was found at and its time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Onset {
    pub sample: usize,
    pub time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetDetector {
    /// Normalized rise an onset must exceed, in (0, 1).
    pub threshold: f64,
    /// Minimum gap between onsets, in seconds.
    pub min_distance: f64,
    /// Envelope smoothing window, in seconds.
    pub window: f64,
}

impl Default for OnsetDetector {
    fn default() -> Self {
        OnsetDetector {
            threshold: 0.3,
            min_distance: 0.05,
            window: 0.01,
        }
    }
}

impl OnsetDetector {
    /// Rectified, moving-average amplitude envelope. The window is centred
    /// on each sample (the earlier half gets the extra sample for even
    /// windows) and shrinks at the buffer edges while still dividing by the
    /// full window length.
    pub fn envelope(&self, samples: &[f32], sample_rate: u32) -> Vec<f64> {
        let n = ((sample_rate as f64 * self.window) as usize).max(1);
        let len = samples.len();
        // Prefix sums of |x| for O(1) window sums.
        let mut prefix = Vec::with_capacity(len + 1);
        prefix.push(0.0f64);
        for s in samples {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + s.abs() as f64);
        }
        let lead = (n - 1) / 2;
        (0..len)
            .map(|k| {
                let hi = (k + lead).min(len - 1);
                let lo = (k + lead + 1).saturating_sub(n);
                (prefix[hi + 1] - prefix[lo]) / n as f64
            })
            .collect()
    }

    /// Onsets in a mono buffer: positive envelope rises, normalized to the
    /// largest rise, above `threshold` and at least `min_distance` apart.
    pub fn detect(&self, samples: &[f32], sample_rate: u32) -> Vec<Onset> {
        if samples.len() < 2 || sample_rate == 0 {
            return Vec::new();
        }
        let env = self.envelope(samples, sample_rate);
        let mut rise: Vec<f64> = env.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
        let peak = rise.iter().copied().fold(0.0, f64::max);
        if peak > 0.0 {
            for r in &mut rise {
                *r /= peak;
            }
        } else {
            warn!(samples = samples.len(), "flat envelope; no onsets");
        }

        let min_samples = (self.min_distance * sample_rate as f64) as i64;
        let mut last = -min_samples;
        let mut onsets = Vec::new();
        // rise[i] is the step from envelope sample i to i + 1; the onset is
        // the sample the envelope rises onto.
        for (i, &r) in rise.iter().enumerate() {
            let sample = i + 1;
            if r > self.threshold && sample as i64 - last > min_samples {
                onsets.push(Onset {
                    sample,
                    time: sample as f64 / sample_rate as f64,
                });
                last = sample as i64;
            }
        }
        debug!(onsets = onsets.len(), "onsets detected");
        onsets
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetNotes {
    pub base_pitch: u8,
    /// Pitches cycle through `base_pitch + (i mod pitch_range)`.
    pub pitch_range: u8,
    /// Longest note, in seconds.
    pub max_duration: f64,
    /// Length of the final note, which has no successor to run up to.
    pub last_duration: f64,
    pub min_velocity: u8,
}

impl Default for OnsetNotes {
    fn default() -> Self {
        OnsetNotes {
            base_pitch: 60,
            pitch_range: 12,
            max_duration: 0.5,
            last_duration: 0.1,
            min_velocity: 40,
        }
    }
}

impl OnsetNotes {
    /// One note per onset, in seconds. Velocity follows the signal's
    /// magnitude at the onset sample.
    pub fn to_sequence(&self, signal: &[f32], onsets: &[Onset]) -> Result<EventSequence> {
        if self.pitch_range == 0 {
            return Err(invalid("pitch_range", "must be at least 1"));
        }
        let mut seq = EventSequence::with_capacity(TimeBase::Seconds, onsets.len());
        for (i, onset) in onsets.iter().enumerate() {
            let amplitude = signal.get(onset.sample).map_or(0.5, |s| s.abs() as f64);
            let velocity = (amplitude * 127.0).clamp(self.min_velocity as f64, 127.0) as i64;
            let pitch = self.base_pitch as i64 + (i % self.pitch_range as usize) as i64;
            let duration = match onsets.get(i + 1) {
                Some(next) => (next.time - onset.time).min(self.max_duration),
                None => self.last_duration,
            };
            seq.push(Event::new(pitch, onset.time, duration, velocity));
        }
        Ok(seq)
    }
}

/// Detect onsets in an interleaved buffer and render them, in seconds.
pub fn onsets_to_sequence(
    interleaved: &[f32],
    channels: usize,
    sample_rate: u32,
    detector: &OnsetDetector,
    notes: &OnsetNotes,
) -> Result<EventSequence> {
    require_nonzero(interleaved.len(), "audio samples")?;
    require_nonzero(sample_rate as usize, "sample rate")?;
    let mut mono = mix_to_mono(interleaved, channels);
    normalize_peak(&mut mono);
    let onsets = detector.detect(&mono, sample_rate);
    notes.to_sequence(&mono, &onsets)
}

// ---------------------------------------------------------------------------
// Orbital voices
// ---------------------------------------------------------------------------

/// Mean orbital velocities (km/s), Mercury through Neptune with Ceres in
/// place of the asteroid belt.
pub const PLANET_VELOCITIES: [f64; 9] = [
    47.89, 35.03, 29.79, 24.13, 17.882, 13.06, 9.64, 6.81, 5.43,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitalVoice {
    pub root: u8,
    pub intervals: Vec<u8>,
    /// Range of the concrete scale notes a value selects from.
    pub low: u8,
    pub high: u8,
    /// Durations drawn uniformly per note.
    pub durations: Vec<f64>,
    /// How fast pan and dynamics oscillate per unit of value.
    pub speed_factor: f64,
    pub notes: usize,
    pub dynamics_range: (f64, f64),
}

impl Default for OrbitalVoice {
    /// Mixolydian on C4, notes from C3 to C6.
    fn default() -> Self {
        OrbitalVoice {
            root: 60,
            intervals: vec![0, 2, 4, 5, 7, 9, 10, 12],
            low: 48,
            high: 84,
            durations: vec![0.25, 1.0],
            speed_factor: 0.01,
            notes: 100,
            dynamics_range: (40.0, 127.0),
        }
    }
}

impl OrbitalVoice {
    /// A voice for `value` within `[min, max]`: one constant pitch, pan
    /// oscillating as sin(2·i·value·speed) and velocity as
    /// cos(3·i·value·speed). One duration draw per note.
    pub fn generate(
        &self,
        value: f64,
        min: f64,
        max: f64,
        rng: &mut impl RandomSource,
    ) -> Result<EventSequence> {
        require_nonzero(self.notes, "orbital voice notes")?;
        if self.durations.is_empty() {
            return Err(invalid("durations", "no durations to choose from"));
        }
        let scale_notes = build_scale(self.root, &self.intervals, self.low, self.high);
        let pitch = map_to_scale(value, min, max, &scale_notes).ok_or_else(|| {
            CanticleError::MalformedScale(format!(
                "no notes of {:?} between {} and {}",
                self.intervals, self.low, self.high
            ))
        })?;

        let rate = value * self.speed_factor;
        let mut seq = EventSequence::with_capacity(TimeBase::Beats, self.notes);
        let mut cursor = 0.0;
        for i in 0..self.notes {
            let duration = self.durations[rng.next_index(self.durations.len())];
            let phase = i as f64 * rate;
            let pan = map_clamped((phase * 2.0).sin(), -1.0, 1.0, 0.0, 127.0) as i64;
            let (dyn_lo, dyn_hi) = self.dynamics_range;
            let dynamics = map_clamped((phase * 3.0).cos(), -1.0, 1.0, dyn_lo, dyn_hi) as i64;
            seq.push(Event::new(pitch as i64, cursor, duration, dynamics).with_pan(pan));
            cursor += duration;
        }
        Ok(seq)
    }

    /// One voice per planet, each on its own channel, all starting at 0.
    pub fn solar_system(&self, rng: &mut impl RandomSource) -> Result<EventSequence> {
        let (min, max) = data_range(&PLANET_VELOCITIES).unwrap_or((0.0, 0.0));
        let mut all = EventSequence::new(TimeBase::Beats);
        for (channel, &v) in PLANET_VELOCITIES.iter().enumerate() {
            let voice = self.generate(v, min, max, rng)?.on_channel(channel as i64);
            all.append(voice, 0.0)?;
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canticle_prng::ScoreRng;

    #[test]
    fn text_maps_characters() {
        let s = TextSonifier::default();
        // Space is the bottom of the range: degree 0, longest duration.
        assert_eq!(s.note_for(' '), (48, 2.0));
        // '~' (126) is the top: degree 19 is A6, shortest duration.
        assert_eq!(s.note_for('~'), (48 + 36 + 9, 0.25));
        // Non-ASCII clamps to the top.
        assert_eq!(s.note_for('é'), s.note_for('~'));
    }

    #[test]
    fn text_ends_on_a_long_note() {
        let seq = TextSonifier::default()
            .generate("Call me Ishmael.", &mut ScoreRng::new(1))
            .unwrap();
        assert_eq!(seq.len(), 17);
        let last = seq.events()[16];
        let penultimate = seq.events()[15];
        assert_eq!(last.pitch, penultimate.pitch);
        assert!((last.duration() - 3.6).abs() < 1e-9);
        assert_eq!(last.velocity, 100);
        let pentatonic = ScaleKind::MajorPentatonic.scale();
        assert!(seq.iter().all(|e| pentatonic.contains(e.pitch, 0)));
        assert!(TextSonifier::default().generate("", &mut ScoreRng::new(1)).is_err());
    }

    #[test]
    fn biosignal_channels_drive_pitch_and_velocity() {
        let s = BiosignalSonifier::default();
        let skin = [0.0, 5.0, 10.0];
        let heart = [60.0, 90.0, 120.0];
        let seq = s.generate(&skin, &heart).unwrap();
        let e = seq.events();
        assert_eq!(e[0].pitch, 48);
        assert_eq!(e[0].velocity, 60);
        // 66 + 12 = 78 is F#5, snapped down to F.
        assert_eq!(e[1].pitch, 77);
        assert_eq!(e[1].velocity, 85);
        // 84 + 24 = 108 is C8.
        assert_eq!(e[2].pitch, 108);
        assert_eq!(e[2].velocity, 110);
        assert_eq!(e[2].start, 0.25);
    }

    #[test]
    fn constant_biosignal_falls_back_to_range_floor() {
        let s = BiosignalSonifier::default();
        let seq = s.generate(&[3.0, 3.0], &[7.0, 7.0]).unwrap();
        assert!(seq.iter().all(|e| e.pitch == 48 && e.velocity == 60));
        assert!(s.generate(&[1.0], &[1.0, 2.0]).is_err());
        assert!(s.generate(&[], &[]).is_err());
    }

    #[test]
    fn biosignal_table_parses_columns() {
        let text = "0.0 1.5 70\n# header\n0.1 2.5 72\n";
        let (a, b) = BiosignalSonifier::parse_table(text).unwrap();
        assert_eq!(a, vec![1.5, 2.5]);
        assert_eq!(b, vec![70.0, 72.0]);
        assert!(BiosignalSonifier::parse_table("0 x 1").is_err());
    }

    #[test]
    fn image_rows_are_spread_and_deduplicated() {
        assert_eq!(select_rows(300), vec![0, 75, 150, 225, 299]);
        assert_eq!(select_rows(1), vec![0]);
        assert!(select_rows(0).is_empty());
    }

    #[test]
    fn image_pixels_become_notes() {
        let img = RgbImage::from_fn(8, 8, |x, y| image::Rgb([(x * 32) as u8, 128, (y * 32) as u8]));
        let s = ImageSonifier::default();
        let seq = s.generate(&img, &mut ScoreRng::new(5)).unwrap();
        assert_eq!(seq.len(), 5 * 8);
        let mixolydian = ScaleKind::Mixolydian.scale();
        for e in seq.iter() {
            assert!(mixolydian.contains(e.pitch, 0));
            assert!((40..=110).contains(&e.velocity));
            let column = e.start.floor();
            assert!([0.75, 0.5, 0.25, 0.125].contains(&(e.start - column)));
            assert!(e.duration() >= 0.8 - 1e-9 && e.duration() <= 6.0 + 1e-9);
        }
        let black = s.pixel_note([0, 0, 0], 3, 0.5);
        assert_eq!((black.pitch, black.start, black.velocity), (36, 3.5, 40));
    }

    #[test]
    fn mono_mix_averages_frames() {
        assert_eq!(mix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        let mut buf = vec![0.25, -0.5];
        normalize_peak(&mut buf);
        assert_eq!(buf, vec![0.5, -1.0]);
    }

    #[test]
    fn envelope_matches_centred_box_filter() {
        let det = OnsetDetector {
            window: 0.003,
            ..Default::default()
        };
        // 1 kHz: a 3-sample window.
        let env = det.envelope(&[0.0, 3.0, 0.0, 0.0, 3.0], 1000);
        let expected = [1.0, 1.0, 1.0, 1.0, 1.0];
        for (a, b) in env.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    fn clicks(sample_rate: u32, at: &[f64], seconds: f64) -> Vec<f32> {
        let mut buf = vec![0.0f32; (sample_rate as f64 * seconds) as usize];
        for &t in at {
            let start = (t * sample_rate as f64) as usize;
            for s in buf.iter_mut().skip(start).take(400) {
                *s = 0.9;
            }
        }
        buf
    }

    #[test]
    fn detects_separated_clicks() {
        let sr = 8000;
        let buf = clicks(sr, &[0.1, 0.4, 0.7], 1.0);
        let onsets = OnsetDetector::default().detect(&buf, sr);
        assert_eq!(onsets.len(), 3);
        for (o, t) in onsets.iter().zip([0.1, 0.4, 0.7]) {
            assert!((o.time - t).abs() < 0.01, "onset at {}", o.time);
        }
    }

    #[test]
    fn onset_lands_on_the_first_loud_sample() {
        let det = OnsetDetector {
            window: 0.0,
            ..Default::default()
        };
        let mut buf = vec![0.0f32; 100];
        buf.extend([0.8f32; 50]);
        let onsets = det.detect(&buf, 1000);
        assert_eq!(onsets.len(), 1);
        assert_eq!(onsets[0].sample, 100);
        assert_eq!(onsets[0].time, 0.1);

        // A step on the second sample is still found.
        let onsets = det.detect(&[0.0, 1.0], 1000);
        assert_eq!(onsets.iter().map(|o| o.sample).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn silence_has_no_onsets() {
        assert!(OnsetDetector::default().detect(&[0.0; 1000], 8000).is_empty());
        assert!(OnsetDetector::default().detect(&[], 8000).is_empty());
    }

    #[test]
    fn onset_notes_run_to_the_next_onset() {
        let sr = 8000;
        let buf = clicks(sr, &[0.1, 0.4, 1.5], 2.0);
        let detector = OnsetDetector::default();
        let seq = onsets_to_sequence(&buf, 1, sr, &detector, &OnsetNotes::default()).unwrap();
        assert_eq!(seq.time_base(), TimeBase::Seconds);
        let e = seq.events();
        assert_eq!(e.len(), 3);
        assert_eq!((e[0].pitch, e[1].pitch, e[2].pitch), (60, 61, 62));
        assert!((e[0].duration() - 0.3).abs() < 0.01);
        assert!((e[1].duration() - 0.5).abs() < 1e-9);
        assert!((e[2].duration() - 0.1).abs() < 1e-9);
        assert!(e.iter().all(|n| n.velocity >= 40));
    }

    #[test]
    fn orbital_voice_is_constant_pitch_with_moving_pan() {
        let voice = OrbitalVoice::default();
        let mut rng = ScoreRng::new(3);
        let seq = voice.generate(29.79, 5.43, 47.89, &mut rng).unwrap();
        assert_eq!(seq.len(), 100);
        let first = seq.events()[0];
        assert!(seq.iter().all(|e| e.pitch == first.pitch));
        assert_eq!(first.pan, Some(63));
        assert_eq!(first.velocity, 127);
        let pans: std::collections::BTreeSet<_> = seq.iter().filter_map(|e| e.pan).collect();
        assert!(pans.len() > 10);
        assert!(seq.iter().all(|e| [0.25, 1.0].contains(&e.duration())));
    }

    #[test]
    fn solar_system_spans_the_scale() {
        let seq = OrbitalVoice::default().solar_system(&mut ScoreRng::new(9)).unwrap();
        assert_eq!(seq.len(), 900);
        let lowest = seq.iter().filter(|e| e.channel == 8).map(|e| e.pitch).next();
        let highest = seq.iter().filter(|e| e.channel == 0).map(|e| e.pitch).next();
        // Neptune is slowest (C3), Mercury fastest (C6).
        assert_eq!(lowest, Some(48));
        assert_eq!(highest, Some(84));
    }
}
