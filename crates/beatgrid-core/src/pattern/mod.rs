//! Pattern model: 8 voices × 2 variations × 16 steps.
//!
//! - [`StepSequence`] - One voice's steps in one variation
//! - [`Voice`] - An instrument slot holding both variations
//! - [`VariationMetadata`] - Per-variation accent map
//! - [`Pattern`] - The complete grid
//!
//! All per-step data lives in fixed-size arrays, so no mutation can resize
//! a sequence. Index arguments are validated with [`in_range`]: an
//! out-of-range index trips a debug assertion and is ignored in release
//! builds, since these indices only ever come from the UI layer.

mod model;
mod sequence;

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use model::{Pattern, VariationMetadata, Voice};
pub use sequence::{quantize_velocity, StepSequence};

/// Number of instrument voices in a pattern.
pub const NUM_VOICES: usize = 8;
/// Number of alternate variations per voice.
pub const NUM_VARIATIONS: usize = 2;
/// Steps in one bar.
pub const STEPS_PER_PATTERN: usize = 16;

/// Smallest timing nudge level.
pub const MIN_TIMING_NUDGE: i8 = -2;
/// Largest timing nudge level.
pub const MAX_TIMING_NUDGE: i8 = 2;

/// Velocity given to a step when it is switched on.
pub const DEFAULT_VELOCITY: f32 = 1.0;
/// Velocity resolution.
pub const VELOCITY_STEP: f32 = 0.01;

/// One of the two alternate variations of a pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variation {
    #[default]
    A,
    B,
}

impl Variation {
    /// Both variations in index order.
    pub const ALL: [Variation; NUM_VARIATIONS] = [Variation::A, Variation::B];

    /// Array index of this variation (A = 0, B = 1).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Variation::A => 0,
            Variation::B => 1,
        }
    }

    /// Variation for an array index.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Variation::A),
            1 => Some(Variation::B),
            _ => None,
        }
    }

    /// The other variation.
    pub fn other(self) -> Self {
        match self {
            Variation::A => Variation::B,
            Variation::B => Variation::A,
        }
    }
}

impl TryFrom<usize> for Variation {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(Error::VariationOutOfRange(index))
    }
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variation::A => write!(f, "A"),
            Variation::B => write!(f, "B"),
        }
    }
}

/// Check an index against its bound.
///
/// Fatal in debug builds, `false` (caller no-ops) in release builds.
#[inline]
pub(crate) fn in_range(index: usize, bound: usize, what: &str) -> bool {
    let ok = index < bound;
    debug_assert!(ok, "{what} index {index} out of range (0..{bound})");
    ok
}
