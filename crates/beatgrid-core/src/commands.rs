//! Engine commands and change notifications.
//!
//! Every edit to the sequencer is an [`EngineCommand`] variant applied with
//! `SequencerEngine::apply`. The convenience methods on the engine build a
//! command and apply it, so there is a single mutation path to log,
//! version and broadcast.

use crate::chain::{ChainMode, FixedCycle};
use crate::clipboard::PasteTarget;
use crate::pattern::{Pattern, Variation};

/// Messages that mutate sequencer state.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCommand {
    // === Pattern ===
    ToggleStep {
        voice: usize,
        variation: Variation,
        step: usize,
    },
    SetVelocity {
        voice: usize,
        variation: Variation,
        step: usize,
        value: f32,
    },
    ClearStepSequence {
        voice: usize,
        variation: Variation,
    },
    ToggleAccent {
        variation: Variation,
        step: usize,
    },
    ToggleRatchet {
        voice: usize,
        variation: Variation,
        step: usize,
    },
    ToggleFlam {
        voice: usize,
        variation: Variation,
        step: usize,
    },
    SetTimingNudge {
        voice: usize,
        variation: Variation,
        level: i8,
    },
    AdjustTimingNudge {
        voice: usize,
        variation: Variation,
        delta: i8,
    },
    /// Swap in a whole new pattern (preset load).
    ReplacePattern(Box<Pattern>),

    // === Variation & chain ===
    /// Select the variation shown in the editor.
    SelectVariation(Variation),
    SetChainMode(ChainMode),
    SetFixedCycle(FixedCycle),
    /// Move the chain authoring cursor.
    SelectChainEditStep { index: usize },
    /// Write a variation at the chain authoring cursor.
    SetChainEditStep { variation: Variation },
    UpdateChainStepRepeat { index: usize, repeats: u8 },
    RemoveChainStep { index: usize },
    ClearChain,
    ToggleChainEnabled,

    // === Instruments ===
    ToggleMute { voice: usize },
    ToggleSolo { voice: usize },

    // === Clipboard ===
    CopyVoice { voice: usize, variation: Variation },
    CopyVariation { variation: Variation },
    Paste { target: PasteTarget },
    RandomSequence { voice: usize, variation: Variation },
}

/// Notifications broadcast to engine subscribers after a change.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// Pattern data changed. `version` increases with every edit.
    PatternChanged { version: u64 },
    /// Chain configuration or authoring cursor changed.
    ChainChanged,
    /// The editor's selected variation changed.
    VariationSelected(Variation),
    /// Mute or solo flags changed.
    MixChanged,
    /// Something was copied.
    ClipboardChanged,
    PlaybackStarted,
    PlaybackStopped,
}
