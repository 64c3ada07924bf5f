//! Variation chaining: which of A/B plays in a given bar.
//!
//! - [`FixedCycle`] - Built-in `A`, `B`, `AB` and `AAAB` cycles
//! - [`ChainState`] - Authored chain configuration
//! - [`PlaybackCursor`] - Bar counter and live variation, owned by the controller
//! - [`ChainController`] - Resolves the live variation and authors custom chains
//!
//! Variation lookup is stateless: the variation for bar `n` is a function of
//! `n` modulo the cycle length, so transport jumps never need to replay the
//! bars in between.

use crate::error::{Error, Result};
use crate::pattern::Variation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest custom chain.
pub const MAX_CHAIN_STEPS: usize = 16;
/// Fewest bars a chain step may hold.
pub const MIN_CHAIN_REPEAT: u8 = 1;
/// Most bars a chain step may hold.
pub const MAX_CHAIN_REPEAT: u8 = 16;

/// Whether playback follows a built-in cycle or the authored chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainMode {
    #[default]
    Fixed,
    Custom,
}

/// Built-in variation cycles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedCycle {
    #[default]
    A,
    B,
    AB,
    AAAB,
}

impl FixedCycle {
    pub const ALL: [FixedCycle; 4] = [FixedCycle::A, FixedCycle::B, FixedCycle::AB, FixedCycle::AAAB];

    /// One full cycle, bar by bar.
    pub fn bars(self) -> &'static [Variation] {
        use crate::pattern::Variation::{A, B};
        match self {
            FixedCycle::A => &[A],
            FixedCycle::B => &[B],
            FixedCycle::AB => &[A, B],
            FixedCycle::AAAB => &[A, A, A, B],
        }
    }

    pub fn cycle_length_bars(self) -> u64 {
        self.bars().len() as u64
    }

    pub fn variation_for_bar(self, bar: u64) -> Variation {
        let bars = self.bars();
        bars[(bar % bars.len() as u64) as usize]
    }
}

impl fmt::Display for FixedCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FixedCycle::A => "A",
            FixedCycle::B => "B",
            FixedCycle::AB => "AB",
            FixedCycle::AAAB => "AAAB",
        };
        f.write_str(name)
    }
}

/// One slot of a custom chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub variation: Variation,
    /// Bars this slot plays before moving on.
    pub repeats: u8,
}

impl ChainStep {
    /// A slot with its repeat count clamped into range.
    pub fn new(variation: Variation, repeats: u8) -> Self {
        Self {
            variation,
            repeats: clamp_repeats(repeats),
        }
    }
}

fn clamp_repeats(repeats: u8) -> u8 {
    repeats.clamp(MIN_CHAIN_REPEAT, MAX_CHAIN_REPEAT)
}

/// The chain configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub mode: ChainMode,
    pub fixed_cycle: FixedCycle,
    pub steps: Vec<ChainStep>,
    /// When false, playback mirrors the selected edit variation.
    pub enabled: bool,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            mode: ChainMode::Fixed,
            fixed_cycle: FixedCycle::A,
            steps: Vec::with_capacity(MAX_CHAIN_STEPS),
            enabled: true,
        }
    }
}

impl ChainState {
    /// Bars in one full cycle of the active chain. An empty custom chain
    /// behaves like fixed `A`.
    pub fn cycle_length_bars(&self) -> u64 {
        match self.mode {
            ChainMode::Fixed => self.fixed_cycle.cycle_length_bars(),
            ChainMode::Custom if self.steps.is_empty() => 1,
            ChainMode::Custom => self.steps.iter().map(|s| s.repeats as u64).sum(),
        }
    }

    /// Variation the chain assigns to an absolute bar number.
    pub fn variation_for_bar(&self, bar: u64) -> Variation {
        match self.mode {
            ChainMode::Fixed => self.fixed_cycle.variation_for_bar(bar),
            ChainMode::Custom => {
                // Deserialized or hand-built chains may hold zero-repeat slots.
                let cycle = self.cycle_length_bars();
                if cycle == 0 {
                    return Variation::A;
                }
                let mut position = bar % cycle;
                for step in &self.steps {
                    let repeats = step.repeats as u64;
                    if position < repeats {
                        return step.variation;
                    }
                    position -= repeats;
                }
                Variation::A
            }
        }
    }

    /// Re-establish repeat ranges and the length cap after bulk loading.
    pub fn sanitize(&mut self) {
        self.steps.truncate(MAX_CHAIN_STEPS);
        for step in self.steps.iter_mut() {
            step.repeats = clamp_repeats(step.repeats);
        }
    }
}

/// Live playback position. Written only by the scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    /// Bars completed since playback started.
    pub current_bar: u64,
    pub playback_variation: Variation,
}

/// Owns the chain configuration, the playback cursor and the authoring cursor.
#[derive(Clone, Debug, Default)]
pub struct ChainController {
    state: ChainState,
    cursor: PlaybackCursor,
    selected_variation: Variation,
    edit_step: usize,
}

impl ChainController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(mut state: ChainState) -> Self {
        state.sanitize();
        let edit_step = state.steps.len().min(MAX_CHAIN_STEPS - 1);
        Self {
            state,
            edit_step,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    /// The variation shown in the editor.
    pub fn selected_variation(&self) -> Variation {
        self.selected_variation
    }

    /// Authoring position inside the custom chain.
    pub fn edit_step(&self) -> usize {
        self.edit_step
    }

    pub fn cycle_length_bars(&self) -> u64 {
        self.state.cycle_length_bars()
    }

    /// Variation the current configuration assigns to `bar`, ignoring `enabled`.
    pub fn variation_for_bar(&self, bar: u64) -> Variation {
        self.state.variation_for_bar(bar)
    }

    // === Playback (scheduler side) ===

    fn resolve(&self, bar: u64) -> Variation {
        if self.state.enabled {
            self.state.variation_for_bar(bar)
        } else {
            self.selected_variation
        }
    }

    /// Reset to bar 0.
    pub fn begin_playback(&mut self) {
        self.cursor = PlaybackCursor {
            current_bar: 0,
            playback_variation: self.resolve(0),
        };
        log::debug!("chain: playback begins on {}", self.cursor.playback_variation);
    }

    /// Move the cursor forward by whole bars and re-resolve the variation.
    pub fn advance_bars(&mut self, bars: u64) {
        if bars == 0 {
            return;
        }
        self.cursor.current_bar = self.cursor.current_bar.saturating_add(bars);
        let next = self.resolve(self.cursor.current_bar);
        if next != self.cursor.playback_variation {
            log::debug!(
                "chain: bar {} switches {} -> {}",
                self.cursor.current_bar,
                self.cursor.playback_variation,
                next
            );
        }
        self.cursor.playback_variation = next;
    }

    /// The variation to play for the step being dispatched.
    ///
    /// With chaining disabled this follows the edit selection step by step;
    /// otherwise it is the value resolved at the last bar top.
    pub fn live_variation(&mut self) -> Variation {
        if !self.state.enabled {
            self.cursor.playback_variation = self.selected_variation;
        }
        self.cursor.playback_variation
    }

    // === Configuration (editor side) ===

    pub fn select_variation(&mut self, variation: Variation) {
        self.selected_variation = variation;
    }

    pub fn set_mode(&mut self, mode: ChainMode) {
        self.state.mode = mode;
    }

    pub fn set_fixed_cycle(&mut self, cycle: FixedCycle) {
        self.state.fixed_cycle = cycle;
    }

    /// Flip chaining on or off. Returns the new state.
    pub fn toggle_enabled(&mut self) -> bool {
        self.state.enabled = !self.state.enabled;
        self.state.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
    }

    /// Move the authoring cursor. It may sit on any authored slot or on the
    /// first free one.
    pub fn set_edit_step(&mut self, index: usize) -> Result<()> {
        self.check_index(index, self.state.steps.len())?;
        self.edit_step = index;
        Ok(())
    }

    /// Write `variation` at the authoring cursor.
    ///
    /// Overwriting an authored slot keeps its repeats. Punching a new slot
    /// appends it with the minimum repeat count and advances the cursor.
    pub fn set_chain_edit_step(&mut self, variation: Variation) -> Result<()> {
        let index = self.edit_step;
        let len = self.state.steps.len();
        self.check_index(index, len)?;

        if index < len {
            self.state.steps[index].variation = variation;
        } else {
            self.state
                .steps
                .push(ChainStep::new(variation, MIN_CHAIN_REPEAT));
            self.edit_step = (index + 1).min(MAX_CHAIN_STEPS - 1);
        }
        Ok(())
    }

    /// Set a slot's repeat count, clamped to the legal range.
    pub fn update_chain_step_repeat(&mut self, index: usize, repeats: u8) -> Result<()> {
        let len = self.state.steps.len();
        let step = self
            .state
            .steps
            .get_mut(index)
            .ok_or(Error::ChainStepOutOfRange {
                index,
                len,
                max: MAX_CHAIN_STEPS,
            })?;
        step.repeats = clamp_repeats(repeats);
        Ok(())
    }

    /// Remove a slot, keeping the authoring cursor on a valid position.
    pub fn remove_chain_step(&mut self, index: usize) -> Result<ChainStep> {
        let len = self.state.steps.len();
        if index >= len {
            return Err(Error::ChainStepOutOfRange {
                index,
                len,
                max: MAX_CHAIN_STEPS,
            });
        }
        let removed = self.state.steps.remove(index);
        if self.edit_step > index {
            self.edit_step -= 1;
        }
        self.edit_step = self.edit_step.min(self.state.steps.len());
        Ok(removed)
    }

    pub fn clear_chain(&mut self) {
        self.state.steps.clear();
        self.edit_step = 0;
    }

    /// Replace the configuration wholesale. The playback cursor is untouched.
    pub fn replace_state(&mut self, mut state: ChainState) {
        state.sanitize();
        self.edit_step = self.edit_step.min(state.steps.len()).min(MAX_CHAIN_STEPS - 1);
        self.state = state;
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index > len || index >= MAX_CHAIN_STEPS {
            return Err(Error::ChainStepOutOfRange {
                index,
                len,
                max: MAX_CHAIN_STEPS,
            });
        }
        Ok(())
    }
}
