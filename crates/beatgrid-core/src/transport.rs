//! Contracts with the outside world: the clock we follow and the sink we drive.
//!
//! - [`Transport`] - Query/control contract of the sample-accurate clock
//! - [`AudioSink`] - Trigger/release contract of the audio backend
//! - [`ClockTransport`] - Wall-clock transport for hosts without their own clock

use crate::timing::{BeatTime, STEPS_PER_BEAT};
use std::time::Instant;

/// The external transport the scheduler follows.
///
/// Queries take `&self`: the scheduler and the UI bridge only sample it.
pub trait Transport {
    /// Absolute tick position since the transport started.
    fn current_tick(&self) -> u64;
    /// Ticks per 16th-note step.
    fn ticks_per_step(&self) -> u64;
    fn bpm(&self) -> f64;
    fn is_playing(&self) -> bool;
    /// Static swing amount in `[0, 1]`.
    fn swing(&self) -> f32 {
        0.0
    }
    fn start(&mut self);
    fn stop(&mut self);
}

/// The audio backend.
///
/// `time` is in seconds relative to the instant the scheduler sampled the
/// transport. Steps are handed over a lookahead window early, so flam grace
/// hits and negative nudges normally arrive with positive times. Only steps
/// that were already overdue when polled (catch-up after a stall, the opening
/// step's lead-ins) arrive with negative times and should play at once.
pub trait AudioSink {
    fn trigger(&mut self, voice: usize, velocity: f32, time: f64);
    fn release(&mut self, voice: usize, time: f64);
}

/// Pulses per quarter note of [`ClockTransport`].
pub const CLOCK_PPQN: u64 = 96;

/// Transport driven by the system monotonic clock.
///
/// Position is kept as an anchor (instant, beat) pair so tempo changes
/// never shift the current beat.
#[derive(Clone, Debug)]
pub struct ClockTransport {
    bpm: f64,
    swing: f32,
    running: bool,
    anchor_instant: Instant,
    anchor_beat: BeatTime,
}

impl Default for ClockTransport {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl ClockTransport {
    /// A stopped transport at beat 0.
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            swing: 0.0,
            running: false,
            anchor_instant: Instant::now(),
            anchor_beat: BeatTime::ZERO,
        }
    }

    pub fn with_swing(mut self, swing: f32) -> Self {
        self.set_swing(swing);
        self
    }

    pub fn set_swing(&mut self, swing: f32) {
        self.swing = if swing.is_finite() {
            swing.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Set the BPM, preserving the current beat position.
    pub fn set_bpm(&mut self, bpm: f64, now: Instant) {
        self.anchor_beat = self.beat_at(now);
        self.anchor_instant = now;
        self.bpm = clamp_bpm(bpm);
    }

    /// Start running from the current beat position.
    pub fn start_at(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.anchor_instant = now;
        self.running = true;
    }

    /// Stop, preserving the current beat position.
    pub fn stop_at(&mut self, now: Instant) {
        self.anchor_beat = self.beat_at(now);
        self.anchor_instant = now;
        self.running = false;
    }

    /// Jump to a beat position.
    pub fn seek(&mut self, beat: BeatTime, now: Instant) {
        self.anchor_beat = beat;
        self.anchor_instant = now;
    }

    /// Beat position at a given instant.
    pub fn beat_at(&self, time: Instant) -> BeatTime {
        if !self.running || time <= self.anchor_instant {
            return self.anchor_beat;
        }

        let elapsed = time.duration_since(self.anchor_instant).as_secs_f64();
        let beats_elapsed = (elapsed / 60.0) * self.bpm;
        self.anchor_beat + BeatTime::from_float(beats_elapsed)
    }

    /// Tick position at a given instant. Negative positions read as 0.
    pub fn tick_at(&self, time: Instant) -> u64 {
        let ticks = self.beat_at(time).to_float() * CLOCK_PPQN as f64;
        if ticks <= 0.0 {
            0
        } else {
            ticks.floor() as u64
        }
    }
}

fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(1.0, 999.0)
    } else {
        120.0
    }
}

impl Transport for ClockTransport {
    fn current_tick(&self) -> u64 {
        self.tick_at(Instant::now())
    }

    fn ticks_per_step(&self) -> u64 {
        CLOCK_PPQN / STEPS_PER_BEAT as u64
    }

    fn bpm(&self) -> f64 {
        self.bpm
    }

    fn is_playing(&self) -> bool {
        self.running
    }

    fn swing(&self) -> f32 {
        self.swing
    }

    fn start(&mut self) {
        self.start_at(Instant::now());
    }

    fn stop(&mut self) {
        self.stop_at(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stopped_clock_holds_position() {
        let clock = ClockTransport::new(120.0);
        let later = Instant::now() + Duration::from_secs(3);
        assert_eq!(clock.tick_at(later), 0);
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_running_clock_advances_at_tempo() {
        let mut clock = ClockTransport::new(120.0);
        let t0 = Instant::now();
        clock.start_at(t0);
        // 120 BPM: one beat every half second.
        assert_eq!(clock.tick_at(t0 + Duration::from_millis(500)), CLOCK_PPQN);
        assert_eq!(clock.tick_at(t0 + Duration::from_secs(1)), 2 * CLOCK_PPQN);
        assert_eq!(clock.ticks_per_step(), 24);
    }

    #[test]
    fn test_bpm_change_preserves_position() {
        let mut clock = ClockTransport::new(120.0);
        let t0 = Instant::now();
        clock.start_at(t0);
        let t1 = t0 + Duration::from_secs(1);
        clock.set_bpm(60.0, t1);
        assert!((clock.beat_at(t1).to_float() - 2.0).abs() < 1e-3);
        assert!((clock.beat_at(t1 + Duration::from_secs(1)).to_float() - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_stop_and_resume() {
        let mut clock = ClockTransport::new(120.0);
        let t0 = Instant::now();
        clock.start_at(t0);
        clock.stop_at(t0 + Duration::from_secs(1));
        let frozen = clock.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(frozen, 2 * CLOCK_PPQN);

        clock.start_at(t0 + Duration::from_secs(5));
        assert_eq!(clock.tick_at(t0 + Duration::from_millis(5500)), 3 * CLOCK_PPQN);
    }

    #[test]
    fn test_swing_and_bpm_are_clamped() {
        let clock = ClockTransport::new(f64::NAN).with_swing(4.0);
        assert_eq!(clock.bpm(), 120.0);
        assert_eq!(clock.swing(), 1.0);
        assert_eq!(ClockTransport::new(5000.0).bpm(), 999.0);
    }
}
