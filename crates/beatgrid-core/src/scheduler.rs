//! Step scheduler.
//!
//! Samples the transport, works out which 16th-note steps became due since
//! the last poll and dispatches their hits to the audio sink. The scheduler
//! is the only writer of the chain's playback cursor.
//!
//! Steps are tracked by absolute index, so a repeated poll inside the same
//! step is a no-op and a late poll catches up in step order.
//!
//! A step is dispatched a lookahead window before its grid position: the
//! window always covers the furthest a flam grace hit or a negative nudge can
//! pull a hit ahead of the grid, plus `lookahead_ms` of poll jitter. Hit times
//! handed to the sink are therefore non-negative whenever polls arrive within
//! that margin.

use crate::chain::ChainController;
use crate::instrument::{ChokePair, InstrumentBank};
use crate::pattern::{Pattern, NUM_VOICES, STEPS_PER_PATTERN};
use crate::timing::{
    beats_to_seconds, BeatTime, StepHit, TimingResolver, MAX_RATCHET_COUNT, STEPS_PER_BEAT,
};
use crate::transport::{AudioSink, Transport};
use serde::{Deserialize, Serialize};

/// Largest catch-up window accepted from configuration.
pub const MAX_CATCH_UP_STEPS: u32 = 64;
/// Largest extra lookahead accepted from configuration.
pub const MAX_LOOKAHEAD_MS: u64 = 250;

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Most missed steps dispatched late after a slow poll. Older steps are
    /// dropped (their bar crossings still count).
    pub max_catch_up_steps: u32,
    /// Choke groups applied at trigger time.
    pub chokes: Vec<ChokePair>,
    /// Extra lookahead on top of the timing lead, for poll jitter.
    pub lookahead_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_catch_up_steps: 4,
            chokes: vec![ChokePair::HI_HAT],
            lookahead_ms: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn sanitize(&mut self) {
        self.max_catch_up_steps = self.max_catch_up_steps.clamp(1, MAX_CATCH_UP_STEPS);
        self.lookahead_ms = self.lookahead_ms.min(MAX_LOOKAHEAD_MS);
    }
}

/// Everything a poll reads or writes besides the transport.
pub struct PlaybackContext<'a, S: AudioSink + ?Sized> {
    pub pattern: &'a Pattern,
    pub chain: &'a mut ChainController,
    pub instruments: &'a InstrumentBank,
    pub sink: &'a mut S,
}

/// Outcome of one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Steps dispatched by this poll (0 for a duplicate poll).
    pub steps_dispatched: u32,
    /// Steps skipped because they fell outside the catch-up window.
    pub steps_dropped: u64,
    /// Bar tops crossed, dispatched or not.
    pub bars_advanced: u64,
}

/// Where one dispatched step sits relative to the poll instant.
#[derive(Clone, Copy, Debug)]
struct StepClock {
    /// Seconds from the poll instant to the step's grid position.
    base_time: f64,
    /// The step's grid position in transport ticks.
    grid_tick: f64,
    ticks_per_beat: f64,
    bpm: f64,
    swing: f32,
}

/// Turns transport position into trigger/release calls.
pub struct StepScheduler {
    resolver: TimingResolver,
    max_catch_up_steps: u64,
    lookahead_ms: u64,
    /// Absolute index of the last dispatched step.
    last_step: Option<u64>,
    running: bool,
    /// Transport tick of the latest hit handed to the sink per voice, for
    /// voices triggered since their last release.
    sounding: [Option<f64>; NUM_VOICES],
    /// Reused per-voice hit buffer.
    hits: Vec<StepHit>,
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new(TimingResolver::default(), &SchedulerConfig::default())
    }
}

impl StepScheduler {
    pub fn new(resolver: TimingResolver, config: &SchedulerConfig) -> Self {
        let mut config = config.clone();
        config.sanitize();
        Self {
            resolver,
            max_catch_up_steps: config.max_catch_up_steps as u64,
            lookahead_ms: config.lookahead_ms,
            last_step: None,
            running: false,
            sounding: [None; NUM_VOICES],
            hits: Vec::with_capacity(MAX_RATCHET_COUNT as usize + 1),
        }
    }

    pub fn resolver(&self) -> &TimingResolver {
        &self.resolver
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Absolute index of the last dispatched step.
    pub fn last_step(&self) -> Option<u64> {
        self.last_step
    }

    /// Position of the last dispatched step inside its bar.
    pub fn current_step(&self) -> Option<usize> {
        self.last_step
            .map(|s| (s % STEPS_PER_PATTERN as u64) as usize)
    }

    /// Voices that have been triggered and not yet released.
    pub fn sounding_voices(&self) -> impl Iterator<Item = usize> + '_ {
        self.sounding
            .iter()
            .enumerate()
            .filter_map(|(voice, latest)| latest.map(|_| voice))
    }

    /// Lookahead window in transport ticks: the timing lead plus the
    /// configured jitter margin, rounded up.
    pub fn lookahead_ticks(&self, ticks_per_step: u64, bpm: f64) -> u64 {
        let margin_beats = if bpm > 0.0 {
            self.lookahead_ms as f64 / 1000.0 * bpm / 60.0
        } else {
            0.0
        };
        let beats = self.resolver.max_lead().to_float() + margin_beats;
        let ticks_per_beat = (ticks_per_step * STEPS_PER_BEAT as u64) as f64;
        (beats * ticks_per_beat).ceil().max(0.0) as u64
    }

    /// Arm the scheduler and rewind the chain cursor to bar 0.
    pub fn start(&mut self, chain: &mut ChainController) {
        self.running = true;
        self.last_step = None;
        chain.begin_playback();
        log::debug!("scheduler: started");
    }

    /// Halt scheduling and release every voice that sounded. A voice with
    /// hits still pending is released at its last hit, never before it.
    /// Pattern and chain state are left alone.
    ///
    /// Call this before the transport itself stops so its position is current.
    pub fn stop<T, S>(&mut self, transport: &T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: AudioSink + ?Sized,
    {
        let ticks_per_step = transport.ticks_per_step().max(1);
        let ticks_per_beat = (ticks_per_step * STEPS_PER_BEAT as u64) as f64;
        let now_tick = transport.current_tick() as f64;
        let bpm = transport.bpm();
        for voice in 0..NUM_VOICES {
            if let Some(latest) = self.sounding[voice].take() {
                let pending = beats_to_seconds((latest - now_tick) / ticks_per_beat, bpm);
                sink.release(voice, pending.max(0.0));
            }
        }
        self.running = false;
        self.last_step = None;
        log::debug!("scheduler: stopped");
    }

    /// Sample the transport and dispatch every step that became due.
    pub fn poll<T, S>(&mut self, transport: &T, ctx: PlaybackContext<'_, S>) -> PollReport
    where
        T: Transport + ?Sized,
        S: AudioSink + ?Sized,
    {
        let mut report = PollReport::default();
        if !self.running || !transport.is_playing() {
            return report;
        }

        let ticks_per_step = transport.ticks_per_step().max(1);
        let tick = transport.current_tick();
        let bpm = transport.bpm();
        let swing = transport.swing();
        // Newest step whose grid position falls inside the lookahead window.
        let horizon = tick.saturating_add(self.lookahead_ticks(ticks_per_step, bpm));
        let step = horizon / ticks_per_step;
        let bar_len = STEPS_PER_PATTERN as u64;

        // Step under the playhead; a fresh start dispatches from here.
        let current = tick / ticks_per_step;

        let first = match self.last_step {
            None => current,
            Some(last) if step == last => return report,
            Some(last) if step < last => {
                log::debug!("scheduler: transport moved back from step {last} to {step}, resyncing");
                if current % bar_len == 0 {
                    ctx.chain.advance_bars(1);
                    report.bars_advanced += 1;
                }
                self.last_step = None;
                current
            }
            Some(last) => {
                let window_start = (step + 1).saturating_sub(self.max_catch_up_steps);
                let first = window_start.max(last + 1);
                if first > last + 1 {
                    // Bar tops among the dropped steps still move the chain.
                    let dropped_bars = (first - 1) / bar_len - last / bar_len;
                    ctx.chain.advance_bars(dropped_bars);
                    report.bars_advanced += dropped_bars;
                    report.steps_dropped = first - last - 1;
                    log::warn!(
                        "scheduler: late poll, dropped {} steps",
                        report.steps_dropped
                    );
                }
                first
            }
        };

        let fresh = self.last_step.is_none();
        let step_seconds = BeatTime::STEP.to_seconds(bpm);
        let ticks_per_beat = (ticks_per_step * STEPS_PER_BEAT as u64) as f64;
        let PlaybackContext {
            pattern,
            chain,
            instruments,
            sink,
        } = ctx;

        for absolute in first..=step {
            // The first step after a start or resync opens the current bar.
            if absolute % bar_len == 0 && !(fresh && absolute == first) {
                chain.advance_bars(1);
                report.bars_advanced += 1;
            }
            let grid_tick = (absolute * ticks_per_step) as f64;
            let clock = StepClock {
                base_time: (grid_tick - tick as f64) / ticks_per_step as f64 * step_seconds,
                grid_tick,
                ticks_per_beat,
                bpm,
                swing,
            };
            self.dispatch_step(
                (absolute % bar_len) as usize,
                clock,
                pattern,
                chain,
                instruments,
                sink,
            );
            report.steps_dispatched += 1;
        }

        self.last_step = Some(step);
        report
    }

    fn dispatch_step<S: AudioSink + ?Sized>(
        &mut self,
        step: usize,
        clock: StepClock,
        pattern: &Pattern,
        chain: &mut ChainController,
        instruments: &InstrumentBank,
        sink: &mut S,
    ) {
        let variation = chain.live_variation();
        let any_soloed = instruments.any_soloed();
        log::trace!("scheduler: step {step} variation {variation}");

        for voice in 0..NUM_VOICES {
            if !instruments.is_audible(voice, any_soloed) {
                continue;
            }
            let Some(data) = pattern.voice(voice) else {
                log::warn!("scheduler: no data for voice {voice}, skipping");
                continue;
            };
            if instruments.slot(data.instrument_index).is_none() {
                log::warn!(
                    "scheduler: voice {voice} bound to missing instrument {}, skipping",
                    data.instrument_index
                );
                continue;
            }
            let sequence = data.sequence(variation);
            if !sequence.is_active(step) {
                continue;
            }

            self.hits.clear();
            self.resolver
                .resolve_step(voice, sequence, step, clock.swing, &mut self.hits);
            let (Some(first_hit), Some(last_hit)) = (self.hits.first(), self.hits.last()) else {
                continue;
            };

            let onset = clock.base_time + first_hit.offset_seconds(clock.bpm);
            for choked in instruments.choked_by(voice) {
                sink.release(choked, onset);
                self.sounding[choked] = None;
            }
            for hit in &self.hits {
                sink.trigger(
                    voice,
                    hit.velocity,
                    clock.base_time + hit.offset_seconds(clock.bpm),
                );
            }
            let latest = clock.grid_tick + last_hit.offset.to_float() * clock.ticks_per_beat;
            self.sounding[voice] = Some(latest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FixedCycle;
    use crate::pattern::Variation;
    use std::cell::Cell;

    struct FakeTransport {
        tick: Cell<u64>,
        playing: bool,
    }

    impl FakeTransport {
        fn at_step(step: u64) -> Self {
            Self {
                tick: Cell::new(step * 24),
                playing: true,
            }
        }

        fn goto_step(&self, step: u64) {
            self.tick.set(step * 24);
        }
    }

    impl Transport for FakeTransport {
        fn current_tick(&self) -> u64 {
            self.tick.get()
        }
        fn ticks_per_step(&self) -> u64 {
            24
        }
        fn bpm(&self) -> f64 {
            120.0
        }
        fn is_playing(&self) -> bool {
            self.playing
        }
        fn start(&mut self) {
            self.playing = true;
        }
        fn stop(&mut self) {
            self.playing = false;
        }
    }

    #[derive(Debug, PartialEq)]
    enum Call {
        Trigger(usize, f32),
        Release(usize),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        /// Time of each call, parallel to `calls`.
        times: Vec<f64>,
    }

    impl Recorder {
        fn trigger_times(&self, voice: usize) -> Vec<f64> {
            self.calls
                .iter()
                .zip(&self.times)
                .filter(|(call, _)| matches!(call, Call::Trigger(v, _) if *v == voice))
                .map(|(_, time)| *time)
                .collect()
        }
    }

    impl AudioSink for Recorder {
        fn trigger(&mut self, voice: usize, velocity: f32, time: f64) {
            self.calls.push(Call::Trigger(voice, velocity));
            self.times.push(time);
        }
        fn release(&mut self, voice: usize, time: f64) {
            self.calls.push(Call::Release(voice));
            self.times.push(time);
        }
    }

    struct Rig {
        scheduler: StepScheduler,
        pattern: Pattern,
        chain: ChainController,
        instruments: InstrumentBank,
        sink: Recorder,
    }

    impl Rig {
        fn new() -> Self {
            Self::with_config(&SchedulerConfig::default())
        }

        fn with_config(config: &SchedulerConfig) -> Self {
            let mut rig = Self {
                scheduler: StepScheduler::new(TimingResolver::default(), config),
                pattern: Pattern::new(),
                chain: ChainController::new(),
                instruments: InstrumentBank::default(),
                sink: Recorder::default(),
            };
            rig.scheduler.start(&mut rig.chain);
            rig
        }

        fn poll(&mut self, transport: &FakeTransport) -> PollReport {
            self.scheduler.poll(
                transport,
                PlaybackContext {
                    pattern: &self.pattern,
                    chain: &mut self.chain,
                    instruments: &self.instruments,
                    sink: &mut self.sink,
                },
            )
        }
    }

    #[test]
    fn test_duplicate_polls_are_ignored() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 0);
        let transport = FakeTransport::at_step(0);
        assert_eq!(rig.poll(&transport).steps_dispatched, 1);
        transport.tick.set(10);
        assert_eq!(rig.poll(&transport).steps_dispatched, 0);
        assert_eq!(rig.sink.calls, vec![Call::Trigger(0, 1.0)]);
    }

    #[test]
    fn test_bar_advances_once_per_cycle() {
        let mut rig = Rig::new();
        let transport = FakeTransport::at_step(0);
        for step in 0..48 {
            transport.goto_step(step);
            rig.poll(&transport);
            rig.poll(&transport);
        }
        assert_eq!(rig.chain.cursor().current_bar, 2);
        assert_eq!(rig.scheduler.current_step(), Some(15));
    }

    #[test]
    fn test_variation_switches_at_bar_top() {
        let mut rig = Rig::new();
        rig.chain.set_fixed_cycle(FixedCycle::AB);
        rig.scheduler.start(&mut rig.chain);
        rig.pattern.toggle_step(0, Variation::A, 0);
        rig.pattern.toggle_step(1, Variation::B, 0);
        let transport = FakeTransport::at_step(0);
        for step in 0..32 {
            transport.goto_step(step);
            rig.poll(&transport);
        }
        assert_eq!(
            rig.sink.calls,
            vec![Call::Trigger(0, 1.0), Call::Trigger(1, 1.0)]
        );
    }

    #[test]
    fn test_choke_release_precedes_trigger() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(3, Variation::A, 0);
        rig.pattern.toggle_step(2, Variation::A, 2);
        let transport = FakeTransport::at_step(0);
        for step in 0..3 {
            transport.goto_step(step);
            rig.poll(&transport);
        }
        assert_eq!(
            rig.sink.calls,
            vec![Call::Trigger(3, 1.0), Call::Release(3), Call::Trigger(2, 1.0)]
        );
    }

    #[test]
    fn test_late_poll_catches_up_in_order() {
        let mut rig = Rig::new();
        for (voice, step) in [(0, 1), (1, 2), (4, 3)] {
            rig.pattern.toggle_step(voice, Variation::A, step);
        }
        let transport = FakeTransport::at_step(0);
        rig.poll(&transport);
        transport.goto_step(3);
        let report = rig.poll(&transport);
        assert_eq!(report.steps_dispatched, 3);
        assert_eq!(report.steps_dropped, 0);
        assert_eq!(
            rig.sink.calls,
            vec![Call::Trigger(0, 1.0), Call::Trigger(1, 1.0), Call::Trigger(4, 1.0)]
        );
    }

    #[test]
    fn test_long_stall_drops_steps_but_counts_bars() {
        let mut rig = Rig::new();
        let transport = FakeTransport::at_step(0);
        rig.poll(&transport);
        // Jump 3 bars + 2 steps ahead: only the last 4 steps are played.
        transport.goto_step(50);
        let report = rig.poll(&transport);
        assert_eq!(report.steps_dispatched, 4);
        assert_eq!(report.steps_dropped, 46);
        assert_eq!(report.bars_advanced, 3);
        assert_eq!(rig.chain.cursor().current_bar, 3);
    }

    #[test]
    fn test_backwards_transport_resyncs() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 0);
        let transport = FakeTransport::at_step(0);
        for step in 0..20 {
            transport.goto_step(step);
            rig.poll(&transport);
        }
        transport.goto_step(0);
        let report = rig.poll(&transport);
        assert_eq!(report.steps_dispatched, 1);
        assert_eq!(rig.chain.cursor().current_bar, 2);
        assert_eq!(rig.sink.calls.len(), 3);
    }

    #[test]
    fn test_stop_releases_sounding_voices_only() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 0);
        rig.pattern.toggle_step(5, Variation::A, 0);
        let transport = FakeTransport::at_step(0);
        rig.poll(&transport);
        rig.sink.calls.clear();

        rig.scheduler.stop(&transport, &mut rig.sink);
        assert_eq!(rig.sink.calls, vec![Call::Release(0), Call::Release(5)]);
        assert!(!rig.scheduler.is_running());
        assert_eq!(rig.scheduler.sounding_voices().count(), 0);

        // Stopped scheduler ignores polls.
        transport.goto_step(1);
        assert_eq!(rig.poll(&transport), PollReport::default());
    }

    #[test]
    fn test_accent_does_not_change_velocity() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 0);
        rig.pattern.set_velocity(0, Variation::A, 0, 0.6);
        rig.pattern.toggle_accent(Variation::A, 0);
        rig.poll(&FakeTransport::at_step(0));
        assert_eq!(rig.sink.calls, vec![Call::Trigger(0, 0.6)]);
    }

    #[test]
    fn test_unbound_instrument_is_skipped() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 0);
        rig.pattern.toggle_step(1, Variation::A, 0);
        rig.pattern.voices[0].instrument_index = 42;
        rig.poll(&FakeTransport::at_step(0));
        assert_eq!(rig.sink.calls, vec![Call::Trigger(1, 1.0)]);
    }

    #[test]
    fn test_lookahead_covers_default_lead() {
        let scheduler = StepScheduler::default();
        let lead = scheduler.resolver().max_lead().to_float() * 96.0;
        let ticks = scheduler.lookahead_ticks(24, 120.0);
        assert!(ticks as f64 >= lead);
        assert!(ticks < 24);
    }

    #[test]
    fn test_lead_ins_are_dispatched_ahead_of_time() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 4);
        rig.pattern.toggle_flam(0, Variation::A, 4);
        rig.pattern.toggle_step(1, Variation::A, 4);
        rig.pattern.set_timing_nudge(1, Variation::A, -2);
        rig.pattern.toggle_step(5, Variation::A, 4);

        let lookahead = rig.scheduler.lookahead_ticks(24, 120.0);
        let transport = FakeTransport::at_step(0);
        rig.poll(&transport);
        // Nothing is due until the window reaches step 4.
        transport.tick.set(4 * 24 - lookahead - 1);
        assert_eq!(rig.poll(&transport).steps_dispatched, 3);
        assert!(rig.sink.calls.is_empty());

        transport.tick.set(4 * 24 - lookahead);
        assert_eq!(rig.poll(&transport).steps_dispatched, 1);
        assert!(rig.sink.times.iter().all(|t| *t >= 0.0), "{:?}", rig.sink.times);

        let flam = rig.sink.trigger_times(0);
        let nudged = rig.sink.trigger_times(1);
        let straight = rig.sink.trigger_times(5);
        assert_eq!(flam.len(), 2);
        assert!(flam[0] < flam[1]);
        assert!((flam[1] - straight[0]).abs() < 1e-12);
        // Nudge -2 lands two 96ths of a beat (at 120 BPM) before the grid.
        assert!((straight[0] - nudged[0] - 2.0 * 0.5 / 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_wide_lookahead_survives_step_boundary_polls() {
        let config = SchedulerConfig {
            lookahead_ms: 130,
            ..SchedulerConfig::default()
        };
        let mut rig = Rig::with_config(&config);
        for step in [0, 4, 8, 12] {
            rig.pattern.toggle_step(1, Variation::A, step);
            rig.pattern.toggle_flam(1, Variation::A, step);
            rig.pattern.toggle_step(4, Variation::A, step);
            rig.pattern.set_timing_nudge(4, Variation::A, -2);
        }
        let transport = FakeTransport::at_step(0);
        // The window reaches one step ahead, so the poll at step 14 already
        // dispatches step 15.
        for step in 0..15 {
            transport.goto_step(step);
            rig.poll(&transport);
        }
        assert_eq!(rig.scheduler.last_step(), Some(15));
        // Step 0 is due at the very first poll; every later lead-in is early.
        let late: Vec<f64> = rig
            .sink
            .times
            .iter()
            .skip(3)
            .copied()
            .filter(|t| *t < 0.0)
            .collect();
        assert!(late.is_empty(), "{late:?}");
        assert_eq!(rig.sink.trigger_times(1).len(), 8);
        assert_eq!(rig.sink.trigger_times(4).len(), 4);
    }

    #[test]
    fn test_stop_waits_for_pending_ratchet_hits() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(6, Variation::A, 0);
        rig.pattern.toggle_ratchet(6, Variation::A, 0);
        rig.pattern.toggle_step(7, Variation::A, 0);
        rig.pattern.set_timing_nudge(7, Variation::A, 2);
        let transport = FakeTransport::at_step(0);
        rig.poll(&transport);
        let ratchet_last = *rig.sink.trigger_times(6).last().unwrap();
        let nudged = rig.sink.trigger_times(7)[0];
        assert!(ratchet_last > 0.08);

        rig.sink.calls.clear();
        rig.sink.times.clear();
        rig.scheduler.stop(&transport, &mut rig.sink);
        assert_eq!(rig.sink.calls, vec![Call::Release(6), Call::Release(7)]);
        assert!(rig.sink.times[0] >= ratchet_last - 1e-9);
        assert!(rig.sink.times[1] >= nudged - 1e-9);
    }

    #[test]
    fn test_stop_after_hits_played_releases_now() {
        let mut rig = Rig::new();
        rig.pattern.toggle_step(0, Variation::A, 0);
        let transport = FakeTransport::at_step(0);
        rig.poll(&transport);
        transport.goto_step(2);
        rig.sink.times.clear();
        rig.scheduler.stop(&transport, &mut rig.sink);
        assert_eq!(rig.sink.times.last(), Some(&0.0));
    }
}
