//! Timing primitives and step-to-hit resolution.
//!
//! - [`BeatTime`] - Fixed-point beat representation for exact grid arithmetic
//! - [`TimingConfig`] - Ratchet and flam constants
//! - [`TimingResolver`] - Turns an active step into one or more [`StepHit`]s
//!
//! Offsets are musical fractions, not milliseconds: a nudge unit is 1/96 of
//! a beat by default (configurable to 1/48 or 1/24), so micro-timing feel
//! stays constant when the tempo changes.

use crate::pattern::{quantize_velocity, StepSequence, MAX_TIMING_NUDGE, STEPS_PER_PATTERN};
use serde::{Deserialize, Serialize};

/// Fixed-point beat representation.
///
/// The scale is divisible by 96 (the finest nudge unit) and by every ratchet
/// subdivision of a 16th note up to [`MAX_RATCHET_COUNT`], so grid positions
/// are exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BeatTime {
    units: i64,
}

impl BeatTime {
    const SCALE: i64 = 26_880;

    /// Zero beat time constant.
    pub const ZERO: BeatTime = BeatTime { units: 0 };

    /// Length of one 16th-note step.
    pub const STEP: BeatTime = BeatTime {
        units: Self::SCALE / STEPS_PER_BEAT as i64,
    };

    /// One nudge unit at the default resolution (1/96 beat).
    pub const NUDGE_UNIT: BeatTime = BeatTime {
        units: Self::SCALE / NUDGE_DIVISIONS_PER_BEAT,
    };

    /// Create a BeatTime from a floating-point beat value.
    #[inline]
    pub fn from_float(value: f64) -> Self {
        Self {
            units: (value * Self::SCALE as f64).round() as i64,
        }
    }

    /// Convert to a floating-point beat value.
    #[inline]
    pub fn to_float(self) -> f64 {
        self.units as f64 / Self::SCALE as f64
    }

    /// Exact `numerator / denominator` beats (rounded if the scale does not divide).
    pub fn from_ratio(numerator: i64, denominator: i64) -> Self {
        if denominator == 0 {
            return Self::ZERO;
        }
        let scaled = numerator.saturating_mul(Self::SCALE);
        Self {
            units: (scaled as f64 / denominator as f64).round() as i64,
        }
    }

    /// Multiply by an integer factor.
    pub fn times(self, factor: i64) -> Self {
        Self {
            units: self.units.saturating_mul(factor),
        }
    }

    /// Divide by an integer divisor (zero yields zero).
    pub fn div(self, divisor: i64) -> Self {
        if divisor == 0 {
            return Self::ZERO;
        }
        Self {
            units: self.units / divisor,
        }
    }

    /// Scale by a float factor.
    pub fn scale(self, factor: f64) -> Self {
        Self::from_float(self.to_float() * factor)
    }

    /// Convert to seconds at the given tempo.
    #[inline]
    pub fn to_seconds(self, bpm: f64) -> f64 {
        beats_to_seconds(self.to_float(), bpm)
    }
}

impl std::ops::Add for BeatTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            units: self.units.saturating_add(rhs.units),
        }
    }
}

impl std::ops::Sub for BeatTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            units: self.units.saturating_sub(rhs.units),
        }
    }
}

impl std::ops::Neg for BeatTime {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            units: self.units.saturating_neg(),
        }
    }
}

impl From<f64> for BeatTime {
    fn from(value: f64) -> Self {
        BeatTime::from_float(value)
    }
}

impl From<BeatTime> for f64 {
    fn from(value: BeatTime) -> Self {
        value.to_float()
    }
}

/// 16th-note steps per quarter-note beat.
pub const STEPS_PER_BEAT: usize = 4;
/// Beats per bar (one pattern).
pub const BEATS_PER_BAR: usize = STEPS_PER_PATTERN / STEPS_PER_BEAT;
/// Default nudge resolution: one unit is 1/96 beat.
pub const NUDGE_DIVISIONS_PER_BEAT: i64 = 96;
/// Nudge resolutions accepted from configuration (units per beat).
pub const NUDGE_DIVISION_CHOICES: [u16; 3] = [24, 48, 96];

/// Most sub-hits a ratchet may produce.
pub const MAX_RATCHET_COUNT: u8 = 8;
/// Largest flam pre-offset, in steps. Swing can pull the previous step up to
/// half a step later, so a quarter step keeps the grace hit clear of it.
pub const MAX_FLAM_OFFSET_STEPS: f32 = 0.25;

/// Convert beats to seconds at a tempo. Non-positive tempos yield zero.
#[inline]
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    if bpm <= 0.0 {
        return 0.0;
    }
    beats * 60.0 / bpm
}

/// Ratchet and flam constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Sub-hits per ratcheted step.
    pub ratchet_count: u8,
    /// Velocity lost per successive ratchet sub-hit (sub-hit `i` plays at
    /// `v * max(0, 1 - taper * i)`).
    pub ratchet_taper: f32,
    /// Flam grace-hit lead, as a fraction of one 16th-note step.
    pub flam_offset_steps: f32,
    /// Grace-hit velocity relative to the main hit.
    pub flam_velocity_scale: f32,
    /// Nudge units per beat: 96 (fine), 48 or 24 (coarse).
    pub nudge_divisions_per_beat: u16,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ratchet_count: 3,
            ratchet_taper: 0.15,
            flam_offset_steps: 0.2,
            flam_velocity_scale: 0.5,
            nudge_divisions_per_beat: NUDGE_DIVISIONS_PER_BEAT as u16,
        }
    }
}

impl TimingConfig {
    /// Clamp every field into its legal range.
    pub fn sanitize(&mut self) {
        self.ratchet_count = self.ratchet_count.clamp(2, MAX_RATCHET_COUNT);
        self.ratchet_taper = finite_or(self.ratchet_taper, 0.0).clamp(0.0, 1.0);
        self.flam_offset_steps = finite_or(self.flam_offset_steps, 0.0)
            .clamp(0.0, MAX_FLAM_OFFSET_STEPS);
        self.flam_velocity_scale = finite_or(self.flam_velocity_scale, 0.0).clamp(0.0, 1.0);
        let wanted = self.nudge_divisions_per_beat;
        self.nudge_divisions_per_beat = NUDGE_DIVISION_CHOICES
            .into_iter()
            .min_by_key(|choice| choice.abs_diff(wanted))
            .unwrap_or(NUDGE_DIVISIONS_PER_BEAT as u16);
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// What produced a hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitKind {
    /// The step's single hit.
    Main,
    /// One of the equally spaced ratchet sub-hits (index 0 is on the step).
    Ratchet { index: u8 },
    /// The quiet grace hit before a flammed step.
    FlamGrace,
}

/// A resolved trigger for one voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepHit {
    pub voice: usize,
    pub velocity: f32,
    /// Offset from the step's nominal grid position.
    pub offset: BeatTime,
    pub kind: HitKind,
}

impl StepHit {
    /// Offset in seconds at the given tempo.
    pub fn offset_seconds(&self, bpm: f64) -> f64 {
        self.offset.to_seconds(bpm)
    }
}

/// Resolves active steps into timed hits.
#[derive(Clone, Debug, Default)]
pub struct TimingResolver {
    config: TimingConfig,
}

impl TimingResolver {
    pub fn new(mut config: TimingConfig) -> Self {
        config.sanitize();
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Length of one nudge unit.
    pub fn nudge_unit(&self) -> BeatTime {
        BeatTime::from_ratio(1, self.config.nudge_divisions_per_beat as i64)
    }

    /// Beat offset of a nudge level.
    pub fn nudge_offset(&self, nudge: i8) -> BeatTime {
        self.nudge_unit().times(nudge as i64)
    }

    /// Nudge offset in seconds at a tempo.
    pub fn nudge_offset_seconds(&self, nudge: i8, bpm: f64) -> f64 {
        self.nudge_offset(nudge).to_seconds(bpm)
    }

    /// Furthest any hit can land before its step's grid position: a full
    /// negative nudge plus the flam lead.
    pub fn max_lead(&self) -> BeatTime {
        self.nudge_offset(MAX_TIMING_NUDGE)
            + BeatTime::STEP.scale(self.config.flam_offset_steps as f64)
    }

    /// Swing delay of a step relative to the straight grid: odd 16ths are
    /// pushed back by `swing * half a step`.
    pub fn swing_offset(step: usize, swing: f32) -> BeatTime {
        if step % 2 == 0 || swing <= 0.0 || !swing.is_finite() {
            return BeatTime::ZERO;
        }
        BeatTime::STEP.scale(swing.min(1.0) as f64 * 0.5)
    }

    /// Position of a step within the bar, in beats, before swing and nudge.
    pub fn step_grid_time(step: usize) -> BeatTime {
        BeatTime::STEP.times(step as i64)
    }

    /// Offset of the main hit: swing first, then the voice's nudge.
    pub fn resolved_offset(&self, step: usize, nudge: i8, swing: f32) -> BeatTime {
        Self::swing_offset(step, swing) + self.nudge_offset(nudge)
    }

    /// Append the hits for `step` of `sequence` to `hits`, in dispatch order
    /// (flam grace first). Inactive steps append nothing.
    pub fn resolve_step(
        &self,
        voice: usize,
        sequence: &StepSequence,
        step: usize,
        swing: f32,
        hits: &mut Vec<StepHit>,
    ) {
        if !sequence.is_active(step) {
            return;
        }
        let velocity = sequence.velocity(step);
        let base = self.resolved_offset(step, sequence.timing_nudge(), swing);

        if sequence.has_flam(step) {
            let lead = BeatTime::STEP.scale(self.config.flam_offset_steps as f64);
            hits.push(StepHit {
                voice,
                velocity: quantize_velocity(velocity * self.config.flam_velocity_scale),
                offset: base - lead,
                kind: HitKind::FlamGrace,
            });
        }

        if sequence.has_ratchet(step) {
            let count = self.config.ratchet_count;
            let spacing = BeatTime::STEP.div(count as i64);
            for index in 0..count {
                hits.push(StepHit {
                    voice,
                    velocity: self.ratchet_velocity(velocity, index),
                    offset: base + spacing.times(index as i64),
                    kind: HitKind::Ratchet { index },
                });
            }
        } else {
            hits.push(StepHit {
                voice,
                velocity,
                offset: base,
                kind: HitKind::Main,
            });
        }
    }

    /// Velocity of ratchet sub-hit `index`.
    pub fn ratchet_velocity(&self, velocity: f32, index: u8) -> f32 {
        let factor = (1.0 - self.config.ratchet_taper * index as f32).max(0.0);
        quantize_velocity(velocity * factor)
    }
}
