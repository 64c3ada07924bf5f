//! Voices, variation metadata and the full pattern grid.

use super::sequence::StepSequence;
use super::{in_range, Variation, NUM_VARIATIONS, NUM_VOICES, STEPS_PER_PATTERN};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An instrument slot with its A and B step sequences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    /// Instrument slot this voice drives (equal to its position in the pattern).
    pub instrument_index: usize,
    /// Index 0 is variation A, index 1 is variation B.
    pub variations: [StepSequence; NUM_VARIATIONS],
}

impl Voice {
    /// An empty voice bound to an instrument slot.
    pub fn new(instrument_index: usize) -> Self {
        Self {
            instrument_index,
            variations: [StepSequence::new(), StepSequence::new()],
        }
    }

    pub fn sequence(&self, variation: Variation) -> &StepSequence {
        &self.variations[variation.index()]
    }

    pub fn sequence_mut(&mut self, variation: Variation) -> &mut StepSequence {
        &mut self.variations[variation.index()]
    }
}

/// Variation-level data shared by all voices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariationMetadata {
    /// Accented steps. Annotation only: the scheduler does not read it.
    pub accent: [bool; STEPS_PER_PATTERN],
}

impl VariationMetadata {
    pub fn is_accented(&self, step: usize) -> bool {
        self.accent.get(step).copied().unwrap_or(false)
    }

    pub fn toggle_accent(&mut self, step: usize) -> bool {
        if !in_range(step, STEPS_PER_PATTERN, "step") {
            return false;
        }
        self.accent[step] = !self.accent[step];
        true
    }
}

/// The complete 8 × 2 × 16 grid plus per-variation accents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub voices: [Voice; NUM_VOICES],
    pub variation_metadata: [VariationMetadata; NUM_VARIATIONS],
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern {
    /// An empty pattern with voice `i` bound to instrument slot `i`.
    pub fn new() -> Self {
        Self {
            voices: std::array::from_fn(Voice::new),
            variation_metadata: Default::default(),
        }
    }

    // === Reads ===

    pub fn voice(&self, voice: usize) -> Option<&Voice> {
        self.voices.get(voice)
    }

    /// Sequence for a voice/variation, or `None` for a bad voice index.
    pub fn sequence(&self, voice: usize, variation: Variation) -> Option<&StepSequence> {
        self.voices.get(voice).map(|v| v.sequence(variation))
    }

    /// Sequence lookup that reports bad indices as errors.
    pub fn checked_sequence(&self, voice: usize, variation: Variation) -> Result<&StepSequence> {
        self.sequence(voice, variation)
            .ok_or(Error::VoiceOutOfRange(voice))
    }

    /// Whether a step plays, reporting bad voice or step indices as errors.
    pub fn checked_step(&self, voice: usize, variation: Variation, step: usize) -> Result<bool> {
        let sequence = self.checked_sequence(voice, variation)?;
        if step >= STEPS_PER_PATTERN {
            return Err(Error::StepOutOfRange(step));
        }
        Ok(sequence.is_active(step))
    }

    pub fn metadata(&self, variation: Variation) -> &VariationMetadata {
        &self.variation_metadata[variation.index()]
    }

    pub fn is_accented(&self, variation: Variation, step: usize) -> bool {
        self.metadata(variation).is_accented(step)
    }

    /// True when no voice fires in either variation.
    pub fn is_empty(&self) -> bool {
        self.voices
            .iter()
            .all(|v| v.variations.iter().all(StepSequence::is_empty))
    }

    // === Mutations ===

    fn sequence_mut(&mut self, voice: usize, variation: Variation) -> Option<&mut StepSequence> {
        if !in_range(voice, NUM_VOICES, "voice") {
            return None;
        }
        Some(self.voices[voice].sequence_mut(variation))
    }

    pub fn toggle_step(&mut self, voice: usize, variation: Variation, step: usize) -> bool {
        self.sequence_mut(voice, variation)
            .is_some_and(|seq| seq.toggle_step(step))
    }

    pub fn set_velocity(&mut self, voice: usize, variation: Variation, step: usize, value: f32) -> bool {
        self.sequence_mut(voice, variation)
            .is_some_and(|seq| seq.set_velocity(step, value))
    }

    pub fn clear_step_sequence(&mut self, voice: usize, variation: Variation) -> bool {
        match self.sequence_mut(voice, variation) {
            Some(seq) => {
                seq.clear();
                true
            }
            None => false,
        }
    }

    pub fn toggle_accent(&mut self, variation: Variation, step: usize) -> bool {
        self.variation_metadata[variation.index()].toggle_accent(step)
    }

    pub fn toggle_ratchet(&mut self, voice: usize, variation: Variation, step: usize) -> bool {
        self.sequence_mut(voice, variation)
            .is_some_and(|seq| seq.toggle_ratchet(step))
    }

    pub fn toggle_flam(&mut self, voice: usize, variation: Variation, step: usize) -> bool {
        self.sequence_mut(voice, variation)
            .is_some_and(|seq| seq.toggle_flam(step))
    }

    pub fn set_timing_nudge(&mut self, voice: usize, variation: Variation, level: i8) -> bool {
        match self.sequence_mut(voice, variation) {
            Some(seq) => {
                seq.set_timing_nudge(level);
                true
            }
            None => false,
        }
    }

    pub fn adjust_timing_nudge(&mut self, voice: usize, variation: Variation, delta: i8) -> bool {
        match self.sequence_mut(voice, variation) {
            Some(seq) => {
                seq.adjust_timing_nudge(delta);
                true
            }
            None => false,
        }
    }

    /// Overwrite one voice/variation with a copy of `sequence`.
    pub fn put_sequence(&mut self, voice: usize, variation: Variation, sequence: &StepSequence) -> bool {
        match self.sequence_mut(voice, variation) {
            Some(seq) => {
                seq.clone_from(sequence);
                true
            }
            None => false,
        }
    }

    /// Re-establish value invariants and slot bindings after bulk loading.
    pub fn sanitize(&mut self) {
        for (slot, voice) in self.voices.iter_mut().enumerate() {
            voice.instrument_index = slot;
            for seq in voice.variations.iter_mut() {
                seq.sanitize();
            }
        }
    }
}
