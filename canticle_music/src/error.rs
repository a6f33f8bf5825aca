// Error taxonomy for the composition engine.
//
// Only configuration-time problems are errors: a malformed scale, an empty
// Markov fallback list, a zero-length request, inconsistent weights. Numeric
// edge cases met while generating (out-of-range pitch or velocity, a
// degenerate mapping range, a non-positive duration) are repaired in place by
// clamping or by a defined fallback and never surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanticleError {
    #[error("malformed scale: {0}")]
    MalformedScale(String),

    #[error("Markov fallback candidate list is empty")]
    EmptyTransitionTable,

    #[error("Markov transition for pitch {0} has no candidates")]
    InvalidTransition(u8),

    #[error("zero-length generation request: {0} must be at least 1")]
    ZeroLength(&'static str),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("cannot combine sequences in different time bases")]
    TimeBaseMismatch,

    #[error("MIDI encoding failed: {0}")]
    Midi(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = CanticleError> = std::result::Result<T, E>;

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> CanticleError {
    CanticleError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// Reject zero for any count-like request (notes, depth, frames, steps).
pub(crate) fn require_nonzero(value: usize, what: &'static str) -> Result<()> {
    if value == 0 {
        Err(CanticleError::ZeroLength(what))
    } else {
        Ok(())
    }
}

/// Reject non-finite or non-positive values (durations, grids, tempos).
pub(crate) fn require_positive(value: f64, name: &'static str) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a positive number, got {value}")))
    }
}

/// Reject an inverted `(low, high)` integer range.
pub(crate) fn require_range(range: (u8, u8), name: &'static str) -> Result<()> {
    if range.0 <= range.1 {
        Ok(())
    } else {
        Err(invalid(
            name,
            format!("low {} is above high {}", range.0, range.1),
        ))
    }
}
