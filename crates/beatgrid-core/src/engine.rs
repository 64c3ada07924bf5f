//! The sequencer engine: owns all state and is the single mutation path.
//!
//! Edits arrive as [`EngineCommand`]s (directly through [`SequencerEngine::apply`]
//! or through the typed helper methods). Playback is driven by calling
//! [`SequencerEngine::tick`] with the transport and audio sink, and the UI
//! playhead by [`SequencerEngine::on_frame`].

use crate::chain::{ChainController, ChainMode, FixedCycle, PlaybackCursor};
use crate::clipboard::{Clipboard, PasteTarget, DEFAULT_RANDOM_DENSITY};
use crate::commands::{EngineCommand, EngineEvent};
use crate::config::EngineConfig;
use crate::edit::{EditMode, EditState};
use crate::error::Result;
use crate::instrument::InstrumentBank;
use crate::pattern::{in_range, Pattern, Variation, NUM_VOICES};
use crate::scheduler::{PlaybackContext, PollReport, StepScheduler};
use crate::timing::TimingResolver;
use crate::transport::{AudioSink, Transport};
use crate::ui_sync::UiSyncBridge;
use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::Rng;
use std::time::Instant;

/// Drum sequencer state and playback.
pub struct SequencerEngine {
    config: EngineConfig,
    pattern: Pattern,
    chain: ChainController,
    instruments: InstrumentBank,
    clipboard: Clipboard,
    edit: EditState,
    scheduler: StepScheduler,
    ui: UiSyncBridge,
    subscribers: Vec<Sender<EngineEvent>>,
    version: u64,
}

impl Default for SequencerEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl SequencerEngine {
    /// An engine with an empty pattern.
    pub fn new(mut config: EngineConfig) -> Self {
        config.sanitize();
        let scheduler = StepScheduler::new(
            TimingResolver::new(config.timing.clone()),
            &config.scheduler,
        );
        Self {
            pattern: Pattern::new(),
            chain: ChainController::new(),
            instruments: InstrumentBank::new(config.scheduler.chokes.clone()),
            clipboard: Clipboard::new(),
            edit: EditState::new(),
            scheduler,
            ui: UiSyncBridge::new(config.ui.clone()),
            subscribers: Vec::new(),
            version: 0,
            config,
        }
    }

    // === Reads ===

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn chain(&self) -> &ChainController {
        &self.chain
    }

    pub fn instruments(&self) -> &InstrumentBank {
        &self.instruments
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn edit(&self) -> &EditState {
        &self.edit
    }

    pub fn scheduler(&self) -> &StepScheduler {
        &self.scheduler
    }

    pub fn ui(&self) -> &UiSyncBridge {
        &self.ui
    }

    /// Register playhead listeners and set reduced motion here.
    pub fn ui_mut(&mut self) -> &mut UiSyncBridge {
        &mut self.ui
    }

    /// Pattern version, bumped on every pattern edit.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The variation shown in the editor.
    pub fn selected_variation(&self) -> Variation {
        self.chain.selected_variation()
    }

    pub fn playback_cursor(&self) -> PlaybackCursor {
        self.chain.cursor()
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Position of the last dispatched step inside its bar.
    pub fn current_step(&self) -> Option<usize> {
        self.scheduler.current_step()
    }

    // === Events ===

    /// Receive change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: EngineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn pattern_changed(&mut self) {
        self.version += 1;
        self.emit(EngineEvent::PatternChanged {
            version: self.version,
        });
    }

    // === Mutations ===

    /// Apply a command. Returns whether anything changed.
    ///
    /// Out-of-range pattern indices follow the pattern's policy (debug
    /// assertion, no-op in release). Chain and clipboard failures are errors.
    pub fn apply(&mut self, command: EngineCommand) -> Result<bool> {
        log::trace!("apply {:?}", command);
        match command {
            EngineCommand::ToggleStep {
                voice,
                variation,
                step,
            } => Ok(self.pattern_edit(|p| p.toggle_step(voice, variation, step))),
            EngineCommand::SetVelocity {
                voice,
                variation,
                step,
                value,
            } => Ok(self.pattern_edit(|p| p.set_velocity(voice, variation, step, value))),
            EngineCommand::ClearStepSequence { voice, variation } => {
                Ok(self.pattern_edit(|p| p.clear_step_sequence(voice, variation)))
            }
            EngineCommand::ToggleAccent { variation, step } => {
                Ok(self.pattern_edit(|p| p.toggle_accent(variation, step)))
            }
            EngineCommand::ToggleRatchet {
                voice,
                variation,
                step,
            } => Ok(self.pattern_edit(|p| p.toggle_ratchet(voice, variation, step))),
            EngineCommand::ToggleFlam {
                voice,
                variation,
                step,
            } => Ok(self.pattern_edit(|p| p.toggle_flam(voice, variation, step))),
            EngineCommand::SetTimingNudge {
                voice,
                variation,
                level,
            } => Ok(self.pattern_edit(|p| p.set_timing_nudge(voice, variation, level))),
            EngineCommand::AdjustTimingNudge {
                voice,
                variation,
                delta,
            } => Ok(self.pattern_edit(|p| p.adjust_timing_nudge(voice, variation, delta))),
            EngineCommand::ReplacePattern(pattern) => {
                self.replace_pattern(*pattern);
                Ok(true)
            }

            EngineCommand::SelectVariation(variation) => {
                if self.chain.selected_variation() == variation {
                    return Ok(false);
                }
                self.chain.select_variation(variation);
                self.emit(EngineEvent::VariationSelected(variation));
                Ok(true)
            }
            EngineCommand::SetChainMode(mode) => {
                self.chain.set_mode(mode);
                self.chain_changed()
            }
            EngineCommand::SetFixedCycle(cycle) => {
                self.chain.set_fixed_cycle(cycle);
                self.chain_changed()
            }
            EngineCommand::SelectChainEditStep { index } => {
                self.chain.set_edit_step(index)?;
                self.chain_changed()
            }
            EngineCommand::SetChainEditStep { variation } => {
                self.chain.set_chain_edit_step(variation)?;
                self.chain_changed()
            }
            EngineCommand::UpdateChainStepRepeat { index, repeats } => {
                self.chain.update_chain_step_repeat(index, repeats)?;
                self.chain_changed()
            }
            EngineCommand::RemoveChainStep { index } => {
                self.chain.remove_chain_step(index)?;
                self.chain_changed()
            }
            EngineCommand::ClearChain => {
                self.chain.clear_chain();
                self.chain_changed()
            }
            EngineCommand::ToggleChainEnabled => {
                let enabled = self.chain.toggle_enabled();
                log::debug!("chaining {}", if enabled { "on" } else { "off" });
                self.chain_changed()
            }

            EngineCommand::ToggleMute { voice } => {
                let changed = self.instruments.toggle_mute(voice);
                if changed {
                    self.emit(EngineEvent::MixChanged);
                }
                Ok(changed)
            }
            EngineCommand::ToggleSolo { voice } => {
                let changed = self.instruments.toggle_solo(voice);
                if changed {
                    self.emit(EngineEvent::MixChanged);
                }
                Ok(changed)
            }

            EngineCommand::CopyVoice { voice, variation } => {
                self.clipboard.copy_voice(&self.pattern, voice, variation)?;
                self.emit(EngineEvent::ClipboardChanged);
                Ok(true)
            }
            EngineCommand::CopyVariation { variation } => {
                self.clipboard.copy_variation(&self.pattern, variation)?;
                self.emit(EngineEvent::ClipboardChanged);
                Ok(true)
            }
            EngineCommand::Paste { target } => {
                self.clipboard.paste(&mut self.pattern, target)?;
                self.pattern_changed();
                Ok(true)
            }
            EngineCommand::RandomSequence { voice, variation } => {
                Ok(self.randomize_with(voice, variation, &mut rand::rng()))
            }
        }
    }

    fn pattern_edit<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut Pattern) -> bool,
    {
        let changed = edit(&mut self.pattern);
        if changed {
            self.pattern_changed();
        }
        changed
    }

    fn chain_changed(&mut self) -> Result<bool> {
        self.edit.sync_chain_step(self.chain.edit_step());
        self.emit(EngineEvent::ChainChanged);
        Ok(true)
    }

    pub fn toggle_step(&mut self, voice: usize, variation: Variation, step: usize) -> bool {
        self.pattern_edit(|p| p.toggle_step(voice, variation, step))
    }

    pub fn set_velocity(&mut self, voice: usize, variation: Variation, step: usize, value: f32) -> bool {
        self.pattern_edit(|p| p.set_velocity(voice, variation, step, value))
    }

    pub fn clear_step_sequence(&mut self, voice: usize, variation: Variation) -> bool {
        self.pattern_edit(|p| p.clear_step_sequence(voice, variation))
    }

    pub fn toggle_accent(&mut self, variation: Variation, step: usize) -> bool {
        self.pattern_edit(|p| p.toggle_accent(variation, step))
    }

    pub fn toggle_ratchet(&mut self, voice: usize, variation: Variation, step: usize) -> bool {
        self.pattern_edit(|p| p.toggle_ratchet(voice, variation, step))
    }

    pub fn toggle_flam(&mut self, voice: usize, variation: Variation, step: usize) -> bool {
        self.pattern_edit(|p| p.toggle_flam(voice, variation, step))
    }

    pub fn set_timing_nudge(&mut self, voice: usize, variation: Variation, level: i8) -> bool {
        self.pattern_edit(|p| p.set_timing_nudge(voice, variation, level))
    }

    pub fn adjust_timing_nudge(&mut self, voice: usize, variation: Variation, delta: i8) -> bool {
        self.pattern_edit(|p| p.adjust_timing_nudge(voice, variation, delta))
    }

    /// Swap in a whole pattern. Chain, mix and playback state are kept.
    pub fn replace_pattern(&mut self, mut pattern: Pattern) {
        pattern.sanitize();
        self.pattern = pattern;
        log::debug!("pattern replaced");
        self.pattern_changed();
    }

    pub fn select_variation(&mut self, variation: Variation) -> bool {
        matches!(self.apply(EngineCommand::SelectVariation(variation)), Ok(true))
    }

    pub fn set_chain_mode(&mut self, mode: ChainMode) -> Result<bool> {
        self.apply(EngineCommand::SetChainMode(mode))
    }

    pub fn set_fixed_cycle(&mut self, cycle: FixedCycle) -> Result<bool> {
        self.apply(EngineCommand::SetFixedCycle(cycle))
    }

    pub fn select_chain_edit_step(&mut self, index: usize) -> Result<bool> {
        self.apply(EngineCommand::SelectChainEditStep { index })
    }

    pub fn set_chain_edit_step(&mut self, variation: Variation) -> Result<bool> {
        self.apply(EngineCommand::SetChainEditStep { variation })
    }

    pub fn update_chain_step_repeat(&mut self, index: usize, repeats: u8) -> Result<bool> {
        self.apply(EngineCommand::UpdateChainStepRepeat { index, repeats })
    }

    pub fn remove_chain_step(&mut self, index: usize) -> Result<bool> {
        self.apply(EngineCommand::RemoveChainStep { index })
    }

    pub fn clear_chain(&mut self) -> Result<bool> {
        self.apply(EngineCommand::ClearChain)
    }

    pub fn toggle_chain_enabled(&mut self) -> Result<bool> {
        self.apply(EngineCommand::ToggleChainEnabled)
    }

    pub fn toggle_mute(&mut self, voice: usize) -> Result<bool> {
        self.apply(EngineCommand::ToggleMute { voice })
    }

    pub fn toggle_solo(&mut self, voice: usize) -> Result<bool> {
        self.apply(EngineCommand::ToggleSolo { voice })
    }

    pub fn copy_voice(&mut self, voice: usize, variation: Variation) -> Result<bool> {
        self.apply(EngineCommand::CopyVoice { voice, variation })
    }

    pub fn copy_variation(&mut self, variation: Variation) -> Result<bool> {
        self.apply(EngineCommand::CopyVariation { variation })
    }

    pub fn paste(&mut self, target: PasteTarget) -> Result<bool> {
        self.apply(EngineCommand::Paste { target })
    }

    /// Randomise one voice/variation with the thread RNG.
    pub fn random_sequence(&mut self, voice: usize, variation: Variation) -> Result<bool> {
        self.apply(EngineCommand::RandomSequence { voice, variation })
    }

    /// Randomise one voice/variation from a caller-supplied RNG.
    pub fn randomize_with<R: Rng + ?Sized>(
        &mut self,
        voice: usize,
        variation: Variation,
        rng: &mut R,
    ) -> bool {
        if !in_range(voice, NUM_VOICES, "voice") {
            return false;
        }
        let sequence = self.pattern.voices[voice].sequence_mut(variation);
        crate::clipboard::randomize_with(sequence, rng, DEFAULT_RANDOM_DENSITY);
        self.pattern_changed();
        true
    }

    // === Editor ===

    pub fn set_edit_mode(&mut self, mode: EditMode) {
        self.edit.set_mode(mode);
        self.edit.sync_chain_step(self.chain.edit_step());
    }

    pub fn select_edit_voice(&mut self, voice: usize) -> bool {
        self.edit.select_voice(voice)
    }

    /// Press one of the 16 pads in the current edit mode.
    pub fn press_pad(&mut self, pad: usize) -> Result<bool> {
        match self.edit.press_pad(pad, self.selected_variation()) {
            Some(command) => self.apply(command),
            None => Ok(false),
        }
    }

    /// Press the A or B button in the current edit mode.
    pub fn press_variation(&mut self, variation: Variation) -> Result<bool> {
        let command = self.edit.press_variation(variation);
        self.apply(command)
    }

    // === Playback ===

    /// Start the transport and rewind the chain to bar 0.
    pub fn start<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        transport.start();
        self.scheduler.start(&mut self.chain);
        self.ui.wake();
        log::info!("playback started at {:.1} BPM", transport.bpm());
        self.emit(EngineEvent::PlaybackStarted);
    }

    /// Stop the transport and release sounding voices. Pattern and chain
    /// state are kept.
    pub fn stop<T, S>(&mut self, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: AudioSink + ?Sized,
    {
        self.scheduler.stop(&*transport, sink);
        transport.stop();
        log::info!("playback stopped");
        self.emit(EngineEvent::PlaybackStopped);
    }

    /// Sample the transport and dispatch due steps.
    pub fn tick<T, S>(&mut self, transport: &T, sink: &mut S) -> PollReport
    where
        T: Transport + ?Sized,
        S: AudioSink + ?Sized,
    {
        self.scheduler.poll(
            transport,
            PlaybackContext {
                pattern: &self.pattern,
                chain: &mut self.chain,
                instruments: &self.instruments,
                sink,
            },
        )
    }

    /// Drive the UI playhead from the host's frame callback.
    pub fn on_frame<T: Transport + ?Sized>(&mut self, now: Instant, transport: &T) -> bool {
        self.ui.on_frame(now, transport)
    }
}
