//! Error types for the beatgrid-core crate.
//!
//! Playback never surfaces these: the scheduler recovers locally by skipping
//! or clamping. They are returned by the checked accessors, chain authoring,
//! the clipboard and configuration loading.

use thiserror::Error;

/// Errors returned by fallible, non-playback operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A voice index outside `0..NUM_VOICES`.
    #[error("Voice index {0} out of range")]
    VoiceOutOfRange(usize),

    /// A step index outside `0..STEPS_PER_PATTERN`.
    #[error("Step index {0} out of range")]
    StepOutOfRange(usize),

    /// A variation index other than 0 (A) or 1 (B).
    #[error("Variation index {0} out of range")]
    VariationOutOfRange(usize),

    /// A chain slot beyond the authored chain or beyond `MAX_CHAIN_STEPS`.
    #[error("Chain step {index} out of range (chain holds {len} of {max} steps)")]
    ChainStepOutOfRange {
        index: usize,
        len: usize,
        max: usize,
    },

    /// Paste was asked to write a clip into a destination of a different shape.
    #[error("Cannot paste {clip} clip into {destination} destination")]
    ClipboardMismatch {
        clip: &'static str,
        destination: &'static str,
    },

    /// Paste was called with nothing copied.
    #[error("Clipboard is empty")]
    ClipboardEmpty,

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
