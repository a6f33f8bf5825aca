// Linear value mapping and MIDI range clamping.
//
// Every generator funnels raw algorithmic output (coordinates, angles, data
// samples, character codes) through `map_value` before it becomes a pitch,
// velocity, pan or time. Pitch/velocity/pan mappings clamp; time-axis
// mappings usually do not.

/// Highest MIDI data value (pitch, velocity, pan, controller value).
pub const MIDI_MAX: u8 = 127;

/// Highest MIDI channel index.
pub const CHANNEL_MAX: u8 = 15;

/// Map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// A zero-width input range (`in_min == in_max`) returns `out_min` for any
/// value. With `clamp`, the result is held inside the output range whichever
/// way round its bounds are given.
pub fn map_value(
    value: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
    clamp: bool,
) -> f64 {
    if in_max == in_min {
        return out_min;
    }
    let mapped = (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min;
    if clamp {
        mapped.clamp(out_min.min(out_max), out_min.max(out_max))
    } else {
        mapped
    }
}

/// `map_value` with clamping, the default for pitch, velocity and pan.
pub fn map_clamped(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    map_value(value, in_min, in_max, out_min, out_max, true)
}

/// `map_value` without clamping, for time axes.
pub fn map_unclamped(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    map_value(value, in_min, in_max, out_min, out_max, false)
}

/// Clamp any integer into the MIDI data range [0, 127].
pub fn clamp_midi(value: i64) -> u8 {
    value.clamp(0, MIDI_MAX as i64) as u8
}

/// Clamp any integer into the MIDI channel range [0, 15].
pub fn clamp_channel(value: i64) -> u8 {
    value.clamp(0, CHANNEL_MAX as i64) as u8
}

/// Truncate a real value toward zero and clamp it into [0, 127].
/// NaN maps to 0.
pub fn midi_from_f64(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(0.0, MIDI_MAX as f64) as u8
}

/// Map a value to an index into a list of `len` items (clamped), as used
/// when a continuous input selects from a discrete table.
pub fn map_to_index(value: f64, in_min: f64, in_max: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let idx = map_clamped(value, in_min, in_max, 0.0, (len - 1) as f64);
    (idx.trunc() as usize).min(len - 1)
}

/// Min and max of a data stream, ignoring NaN. `None` when nothing is left.
pub fn data_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
