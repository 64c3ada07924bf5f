//! Copy/paste buffer and pattern randomisation.
//!
//! Clips are deep copies: pasting never aliases the source, so editing the
//! destination afterwards leaves the source untouched.

use crate::error::{Error, Result};
use crate::pattern::{
    Pattern, StepSequence, Variation, VariationMetadata, NUM_VOICES, STEPS_PER_PATTERN,
};
use rand::Rng;

/// Share of steps switched on by [`random_sequence`].
pub const DEFAULT_RANDOM_DENSITY: f64 = 0.3;
/// Quietest velocity a randomised step gets.
pub const RANDOM_MIN_VELOCITY: f32 = 0.5;

/// What is held in the clipboard.
#[derive(Clone, Debug, PartialEq)]
pub enum Clip {
    /// One voice's steps in one variation.
    Voice(StepSequence),
    /// All voices of a variation plus its accents.
    Variation {
        sequences: [StepSequence; NUM_VOICES],
        metadata: VariationMetadata,
    },
}

impl Clip {
    fn kind(&self) -> &'static str {
        match self {
            Clip::Voice(_) => "voice",
            Clip::Variation { .. } => "variation",
        }
    }
}

/// Where a paste lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasteTarget {
    Voice { voice: usize, variation: Variation },
    Variation(Variation),
}

impl PasteTarget {
    fn kind(&self) -> &'static str {
        match self {
            PasteTarget::Voice { .. } => "voice",
            PasteTarget::Variation(_) => "variation",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Clipboard {
    clip: Option<Clip>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clip(&self) -> Option<&Clip> {
        self.clip.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.clip.is_none()
    }

    pub fn clear(&mut self) {
        self.clip = None;
    }

    pub fn copy_voice(&mut self, pattern: &Pattern, voice: usize, variation: Variation) -> Result<()> {
        let sequence = pattern.checked_sequence(voice, variation)?;
        self.clip = Some(Clip::Voice(sequence.clone()));
        Ok(())
    }

    pub fn copy_variation(&mut self, pattern: &Pattern, variation: Variation) -> Result<()> {
        self.clip = Some(Clip::Variation {
            sequences: std::array::from_fn(|voice| {
                pattern.voices[voice].sequence(variation).clone()
            }),
            metadata: pattern.metadata(variation).clone(),
        });
        Ok(())
    }

    /// Write the held clip into `pattern`. The clip stays available for
    /// further pastes.
    pub fn paste(&self, pattern: &mut Pattern, target: PasteTarget) -> Result<()> {
        let clip = self.clip.as_ref().ok_or(Error::ClipboardEmpty)?;
        match (clip, target) {
            (Clip::Voice(sequence), PasteTarget::Voice { voice, variation }) => {
                if voice >= NUM_VOICES {
                    return Err(Error::VoiceOutOfRange(voice));
                }
                pattern.put_sequence(voice, variation, sequence);
                Ok(())
            }
            (Clip::Variation { sequences, metadata }, PasteTarget::Variation(variation)) => {
                for (voice, sequence) in sequences.iter().enumerate() {
                    pattern.put_sequence(voice, variation, sequence);
                }
                pattern.variation_metadata[variation.index()].clone_from(metadata);
                Ok(())
            }
            (clip, target) => Err(Error::ClipboardMismatch {
                clip: clip.kind(),
                destination: target.kind(),
            }),
        }
    }
}

/// Replace `sequence`'s triggers and velocities with random ones.
///
/// Each step is switched on with probability `density`; active steps get a
/// velocity in `[RANDOM_MIN_VELOCITY, 1]`. Ratchets, flams and the nudge
/// are kept.
pub fn randomize_with<R: Rng + ?Sized>(sequence: &mut StepSequence, rng: &mut R, density: f64) {
    let density = if density.is_finite() {
        density.clamp(0.0, 1.0)
    } else {
        DEFAULT_RANDOM_DENSITY
    };
    sequence.clear();
    for step in 0..STEPS_PER_PATTERN {
        if rng.random_bool(density) {
            sequence.toggle_step(step);
            sequence.set_velocity(step, rng.random_range(RANDOM_MIN_VELOCITY..=1.0));
        }
    }
}

/// A fresh random sequence drawn from `rng`.
pub fn random_sequence_with<R: Rng + ?Sized>(rng: &mut R, density: f64) -> StepSequence {
    let mut sequence = StepSequence::new();
    randomize_with(&mut sequence, rng, density);
    sequence
}

/// A fresh random sequence at the default density, using the thread RNG.
pub fn random_sequence() -> StepSequence {
    random_sequence_with(&mut rand::rng(), DEFAULT_RANDOM_DENSITY)
}
