//! Edit modes: what a press on one of the 16 pads means.
//!
//! [`EditState::press_pad`] turns a pad press into an [`EngineCommand`]
//! for the current mode. It never touches the pattern itself.

use crate::chain::MAX_CHAIN_STEPS;
use crate::clipboard::PasteTarget;
use crate::commands::EngineCommand;
use crate::pattern::{Variation, MAX_TIMING_NUDGE, MIN_TIMING_NUDGE, NUM_VOICES, STEPS_PER_PATTERN};

/// Pad interpretation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EditMode {
    /// Pads toggle steps of the selected voice.
    #[default]
    Steps,
    /// Pads pick the voice to edit, then return to `Steps`.
    SelectVoice,
    /// Pads toggle accents of the selected variation.
    Accent,
    Ratchet { voice: usize },
    Flam { voice: usize },
    /// Pads write `level` as the step velocity.
    Velocity { voice: usize, level: f32 },
    /// Pads 0..=4 set nudge levels -2..=2.
    Nudge { voice: usize },
    /// Pads select chain slots; the A/B buttons punch variations at `step`.
    VariationChain { step: usize },
    Mute,
    Solo,
    /// Pads pick the voice to copy.
    CopyVoice,
    /// Pads pick the voice to paste into.
    PasteVoice,
}

/// Editor selection state.
#[derive(Clone, Debug, Default)]
pub struct EditState {
    mode: EditMode,
    voice: usize,
}

impl EditState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EditMode) {
        log::debug!("edit mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    /// Voice edited in `Steps` mode.
    pub fn voice(&self) -> usize {
        self.voice
    }

    pub fn select_voice(&mut self, voice: usize) -> bool {
        if voice >= NUM_VOICES {
            return false;
        }
        self.voice = voice;
        true
    }

    /// Keep the chain mode's slot in step with the controller's cursor.
    pub fn sync_chain_step(&mut self, edit_step: usize) {
        if let EditMode::VariationChain { step } = &mut self.mode {
            *step = edit_step;
        }
    }

    /// Translate a pad press. `variation` is the variation being edited.
    ///
    /// Returns `None` for pads the mode does not use.
    pub fn press_pad(&mut self, pad: usize, variation: Variation) -> Option<EngineCommand> {
        if pad >= STEPS_PER_PATTERN {
            return None;
        }
        let voice_pad = (pad < NUM_VOICES).then_some(pad);
        match self.mode {
            EditMode::Steps => Some(EngineCommand::ToggleStep {
                voice: self.voice,
                variation,
                step: pad,
            }),
            EditMode::SelectVoice => {
                let voice = voice_pad?;
                self.voice = voice;
                self.mode = EditMode::Steps;
                None
            }
            EditMode::Accent => Some(EngineCommand::ToggleAccent {
                variation,
                step: pad,
            }),
            EditMode::Ratchet { voice } => Some(EngineCommand::ToggleRatchet {
                voice,
                variation,
                step: pad,
            }),
            EditMode::Flam { voice } => Some(EngineCommand::ToggleFlam {
                voice,
                variation,
                step: pad,
            }),
            EditMode::Velocity { voice, level } => Some(EngineCommand::SetVelocity {
                voice,
                variation,
                step: pad,
                value: level,
            }),
            EditMode::Nudge { voice } => {
                let level = MIN_TIMING_NUDGE + i8::try_from(pad).ok()?;
                (level <= MAX_TIMING_NUDGE).then_some(EngineCommand::SetTimingNudge {
                    voice,
                    variation,
                    level,
                })
            }
            EditMode::VariationChain { .. } => (pad < MAX_CHAIN_STEPS)
                .then_some(EngineCommand::SelectChainEditStep { index: pad }),
            EditMode::Mute => voice_pad.map(|voice| EngineCommand::ToggleMute { voice }),
            EditMode::Solo => voice_pad.map(|voice| EngineCommand::ToggleSolo { voice }),
            EditMode::CopyVoice => {
                voice_pad.map(|voice| EngineCommand::CopyVoice { voice, variation })
            }
            EditMode::PasteVoice => voice_pad.map(|voice| EngineCommand::Paste {
                target: PasteTarget::Voice { voice, variation },
            }),
        }
    }

    /// Translate an A/B button press: punches the chain in chain mode,
    /// otherwise switches the edited variation.
    pub fn press_variation(&self, variation: Variation) -> EngineCommand {
        match self.mode {
            EditMode::VariationChain { .. } => EngineCommand::SetChainEditStep { variation },
            _ => EngineCommand::SelectVariation(variation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_mode_targets_selected_voice() {
        let mut edit = EditState::new();
        edit.select_voice(3);
        assert_eq!(
            edit.press_pad(9, Variation::B),
            Some(EngineCommand::ToggleStep { voice: 3, variation: Variation::B, step: 9 })
        );
        assert_eq!(edit.press_pad(16, Variation::B), None);
    }

    #[test]
    fn test_select_voice_returns_to_steps() {
        let mut edit = EditState::new();
        edit.set_mode(EditMode::SelectVoice);
        assert_eq!(edit.press_pad(12, Variation::A), None);
        assert_eq!(edit.mode(), EditMode::SelectVoice);
        assert_eq!(edit.press_pad(6, Variation::A), None);
        assert_eq!(edit.voice(), 6);
        assert_eq!(edit.mode(), EditMode::Steps);
    }

    #[test]
    fn test_modifier_modes_carry_their_voice() {
        let mut edit = EditState::new();
        edit.set_mode(EditMode::Flam { voice: 1 });
        assert_eq!(
            edit.press_pad(2, Variation::A),
            Some(EngineCommand::ToggleFlam { voice: 1, variation: Variation::A, step: 2 })
        );
        edit.set_mode(EditMode::Ratchet { voice: 7 });
        assert_eq!(
            edit.press_pad(15, Variation::B),
            Some(EngineCommand::ToggleRatchet { voice: 7, variation: Variation::B, step: 15 })
        );
        edit.set_mode(EditMode::Velocity { voice: 0, level: 0.4 });
        assert_eq!(
            edit.press_pad(0, Variation::A),
            Some(EngineCommand::SetVelocity {
                voice: 0,
                variation: Variation::A,
                step: 0,
                value: 0.4
            })
        );
    }

    #[test]
    fn test_nudge_pads() {
        let mut edit = EditState::new();
        edit.set_mode(EditMode::Nudge { voice: 2 });
        let levels: Vec<_> = (0..6)
            .map(|pad| match edit.press_pad(pad, Variation::A) {
                Some(EngineCommand::SetTimingNudge { level, .. }) => Some(level),
                _ => None,
            })
            .collect();
        assert_eq!(
            levels,
            vec![Some(-2), Some(-1), Some(0), Some(1), Some(2), None]
        );
    }

    #[test]
    fn test_chain_mode_buttons() {
        let mut edit = EditState::new();
        assert_eq!(
            edit.press_variation(Variation::B),
            EngineCommand::SelectVariation(Variation::B)
        );
        edit.set_mode(EditMode::VariationChain { step: 0 });
        assert_eq!(
            edit.press_variation(Variation::B),
            EngineCommand::SetChainEditStep { variation: Variation::B }
        );
        assert_eq!(
            edit.press_pad(4, Variation::A),
            Some(EngineCommand::SelectChainEditStep { index: 4 })
        );
        edit.sync_chain_step(4);
        assert_eq!(edit.mode(), EditMode::VariationChain { step: 4 });
    }

    #[test]
    fn test_voice_pads_ignore_upper_row() {
        let mut edit = EditState::new();
        for mode in [EditMode::Mute, EditMode::Solo, EditMode::CopyVoice, EditMode::PasteVoice] {
            edit.set_mode(mode);
            assert_eq!(edit.press_pad(NUM_VOICES, Variation::A), None);
            assert!(edit.press_pad(NUM_VOICES - 1, Variation::A).is_some());
        }
    }
}
