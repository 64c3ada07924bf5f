//! A single voice's 16 steps in one variation.

use super::{
    in_range, DEFAULT_VELOCITY, MAX_TIMING_NUDGE, MIN_TIMING_NUDGE, STEPS_PER_PATTERN,
    VELOCITY_STEP,
};
use serde::{Deserialize, Serialize};

/// Clamp a velocity to `[0, 1]` and snap it to the 0.01 grid.
///
/// NaN maps to silence.
pub fn quantize_velocity(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    let steps = (value.clamp(0.0, 1.0) / VELOCITY_STEP).round();
    (steps * VELOCITY_STEP).clamp(0.0, 1.0)
}

/// Step data for one voice in one variation.
///
/// Ratchet and flam flags are independent of the trigger flag so they can
/// be staged on a step before it is switched on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSequence {
    triggers: [bool; STEPS_PER_PATTERN],
    velocities: [f32; STEPS_PER_PATTERN],
    ratchets: [bool; STEPS_PER_PATTERN],
    flams: [bool; STEPS_PER_PATTERN],
    timing_nudge: i8,
}

impl Default for StepSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl StepSequence {
    /// An empty sequence: no triggers, full velocity everywhere, no nudge.
    pub fn new() -> Self {
        Self {
            triggers: [false; STEPS_PER_PATTERN],
            velocities: [DEFAULT_VELOCITY; STEPS_PER_PATTERN],
            ratchets: [false; STEPS_PER_PATTERN],
            flams: [false; STEPS_PER_PATTERN],
            timing_nudge: 0,
        }
    }

    /// Build a sequence from trigger flags, leaving everything else at defaults.
    pub fn from_triggers(triggers: [bool; STEPS_PER_PATTERN]) -> Self {
        Self {
            triggers,
            ..Self::new()
        }
    }

    // === Reads ===

    /// Whether the step fires.
    pub fn is_active(&self, step: usize) -> bool {
        self.triggers.get(step).copied().unwrap_or(false)
    }

    /// Stored velocity of a step (meaningful only when active).
    pub fn velocity(&self, step: usize) -> f32 {
        self.velocities.get(step).copied().unwrap_or(0.0)
    }

    /// Whether the step is ratcheted.
    pub fn has_ratchet(&self, step: usize) -> bool {
        self.ratchets.get(step).copied().unwrap_or(false)
    }

    /// Whether the step carries a flam.
    pub fn has_flam(&self, step: usize) -> bool {
        self.flams.get(step).copied().unwrap_or(false)
    }

    /// Micro-timing nudge level in `[-2, 2]`.
    pub fn timing_nudge(&self) -> i8 {
        self.timing_nudge
    }

    pub fn triggers(&self) -> &[bool; STEPS_PER_PATTERN] {
        &self.triggers
    }

    pub fn velocities(&self) -> &[f32; STEPS_PER_PATTERN] {
        &self.velocities
    }

    pub fn ratchets(&self) -> &[bool; STEPS_PER_PATTERN] {
        &self.ratchets
    }

    pub fn flams(&self) -> &[bool; STEPS_PER_PATTERN] {
        &self.flams
    }

    /// Indices of active steps, in order.
    pub fn active_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.triggers
            .iter()
            .enumerate()
            .filter_map(|(i, on)| on.then_some(i))
    }

    /// True when no step fires.
    pub fn is_empty(&self) -> bool {
        !self.triggers.iter().any(|t| *t)
    }

    // === Mutations ===

    /// Flip a step. Switching a step on resets its velocity to 1.0.
    ///
    /// Returns `false` if the step index was rejected.
    pub fn toggle_step(&mut self, step: usize) -> bool {
        if !in_range(step, STEPS_PER_PATTERN, "step") {
            return false;
        }
        let now_active = !self.triggers[step];
        self.triggers[step] = now_active;
        if now_active {
            self.velocities[step] = DEFAULT_VELOCITY;
        }
        true
    }

    /// Store a clamped, quantized velocity. The step need not be active.
    pub fn set_velocity(&mut self, step: usize, value: f32) -> bool {
        if !in_range(step, STEPS_PER_PATTERN, "step") {
            return false;
        }
        self.velocities[step] = quantize_velocity(value);
        true
    }

    /// Switch every step off and restore full velocities.
    ///
    /// Ratchets, flams and the nudge are kept.
    pub fn clear(&mut self) {
        self.triggers = [false; STEPS_PER_PATTERN];
        self.velocities = [DEFAULT_VELOCITY; STEPS_PER_PATTERN];
    }

    pub fn toggle_ratchet(&mut self, step: usize) -> bool {
        if !in_range(step, STEPS_PER_PATTERN, "step") {
            return false;
        }
        self.ratchets[step] = !self.ratchets[step];
        true
    }

    pub fn toggle_flam(&mut self, step: usize) -> bool {
        if !in_range(step, STEPS_PER_PATTERN, "step") {
            return false;
        }
        self.flams[step] = !self.flams[step];
        true
    }

    /// Set the nudge level, clamped to `[-2, 2]`.
    pub fn set_timing_nudge(&mut self, level: i8) {
        self.timing_nudge = level.clamp(MIN_TIMING_NUDGE, MAX_TIMING_NUDGE);
    }

    /// Move the nudge level by `delta`, clamped to `[-2, 2]`.
    pub fn adjust_timing_nudge(&mut self, delta: i8) {
        self.set_timing_nudge(self.timing_nudge.saturating_add(delta));
    }

    /// Re-establish value invariants on data that did not come through the
    /// mutators (e.g. a deserialized preset).
    pub fn sanitize(&mut self) {
        for v in self.velocities.iter_mut() {
            *v = quantize_velocity(*v);
        }
        self.set_timing_nudge(self.timing_nudge);
    }
}
