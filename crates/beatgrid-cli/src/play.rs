//! The `play` subcommand: demo pattern, wall-clock transport, logging sink.

use anyhow::{Context, Result};
use beatgrid_core::{
    AudioSink, ChainMode, ClockTransport, DrumInstrument, EngineConfig, FixedCycle,
    SequencerEngine, Transport, Variation, MAX_CHAIN_STEPS, STEPS_PER_PATTERN,
};
use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll interval of the playback loop.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Tempo in beats per minute
    #[arg(short, long, default_value_t = 120.0)]
    bpm: f64,

    /// Stop after this many bars
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u64).range(1..))]
    bars: u64,

    /// Swing amount (0.0 - 1.0)
    #[arg(long, default_value_t = 0.0)]
    swing: f32,

    /// Variation cycle
    #[arg(long, value_enum, default_value_t = CycleArg::Aaab)]
    cycle: CycleArg,

    /// Custom chain such as "A2,B1" (overrides --cycle)
    #[arg(long, value_name = "CHAIN")]
    chain: Option<String>,

    /// Engine configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Refresh the playhead at the reduced-motion rate
    #[arg(long)]
    reduced_motion: bool,

    /// Randomise the tom voices from this seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CycleArg {
    A,
    B,
    Ab,
    Aaab,
}

impl From<CycleArg> for FixedCycle {
    fn from(arg: CycleArg) -> Self {
        match arg {
            CycleArg::A => FixedCycle::A,
            CycleArg::B => FixedCycle::B,
            CycleArg::Ab => FixedCycle::AB,
            CycleArg::Aaab => FixedCycle::AAAB,
        }
    }
}

/// Logs triggers instead of rendering them.
struct LogSink {
    triggers: u64,
}

impl AudioSink for LogSink {
    fn trigger(&mut self, voice: usize, velocity: f32, time: f64) {
        self.triggers += 1;
        let name = DrumInstrument::KIT
            .get(voice)
            .map(|i| i.short_name())
            .unwrap_or("??");
        log::info!("{name} vel {velocity:.2} at {:+.1} ms", time * 1000.0);
    }

    fn release(&mut self, voice: usize, time: f64) {
        log::debug!("release voice {voice} at {:+.1} ms", time * 1000.0);
    }
}

pub fn play(args: PlayArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.reduced_motion {
        config.ui.reduced_motion = true;
    }

    let mut engine = SequencerEngine::new(config);
    load_demo_pattern(&mut engine);
    if let Some(seed) = args.seed {
        let mut rng = StdRng::seed_from_u64(seed);
        for voice in [5, 6] {
            engine.randomize_with(voice, Variation::B, &mut rng);
        }
        log::info!("randomised toms from seed {seed}");
    }
    match &args.chain {
        Some(chain) => author_chain(&mut engine, chain)?,
        None => {
            engine.set_fixed_cycle(args.cycle.into())?;
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("Failed to install Ctrl-C handler")?;

    let (_listener, playhead) = engine.ui_mut().subscribe_channel();
    let mut transport = ClockTransport::new(args.bpm).with_swing(args.swing);
    let mut sink = LogSink { triggers: 0 };

    log::info!(
        "Playing {} bars at {:.1} BPM (cycle length {} bars)",
        args.bars,
        transport.bpm(),
        engine.chain().cycle_length_bars()
    );
    engine.start(&mut transport);

    let tps = transport.ticks_per_step();
    let lookahead = engine.scheduler().lookahead_ticks(tps, transport.bpm());
    let final_tick = final_poll_tick(args.bars, tps, lookahead);

    let mut last_bar = 0;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            log::info!("Interrupted");
            break;
        }
        let frame = CappedTransport::capture(&transport, final_tick);
        engine.tick(&frame, &mut sink);
        engine.on_frame(Instant::now(), &transport);

        let cursor = engine.playback_cursor();
        if cursor.current_bar != last_bar {
            last_bar = cursor.current_bar;
            log::info!("-- bar {} ({})", cursor.current_bar, cursor.playback_variation);
        }
        for snapshot in playhead.try_iter() {
            log::trace!("playhead {:?}", snapshot.current_step);
        }
        if frame.tick >= final_tick {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    engine.stop(&mut transport, &mut sink);
    log::info!("{} triggers", sink.triggers);
    Ok(())
}

/// Last tick to poll at so the lookahead horizon stays inside the final bar.
fn final_poll_tick(bars: u64, ticks_per_step: u64, lookahead: u64) -> u64 {
    let end = bars * STEPS_PER_PATTERN as u64 * ticks_per_step;
    end.saturating_sub(lookahead + 1)
}

/// One sample of the clock, held back at `final_poll_tick`.
struct CappedTransport {
    tick: u64,
    ticks_per_step: u64,
    bpm: f64,
    swing: f32,
    playing: bool,
}

impl CappedTransport {
    fn capture<T: Transport + ?Sized>(transport: &T, cap: u64) -> Self {
        Self {
            tick: transport.current_tick().min(cap),
            ticks_per_step: transport.ticks_per_step(),
            bpm: transport.bpm(),
            swing: transport.swing(),
            playing: transport.is_playing(),
        }
    }
}

impl Transport for CappedTransport {
    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn ticks_per_step(&self) -> u64 {
        self.ticks_per_step
    }

    fn bpm(&self) -> f64 {
        self.bpm
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn swing(&self) -> f32 {
        self.swing
    }

    fn start(&mut self) {}

    fn stop(&mut self) {}
}

/// A two-variation groove: straight in A, busier with ratchets and flams in B.
fn load_demo_pattern(engine: &mut SequencerEngine) {
    use Variation::{A, B};

    for variation in [A, B] {
        for step in [0, 8] {
            engine.toggle_step(0, variation, step);
        }
        for step in [4, 12] {
            engine.toggle_step(1, variation, step);
        }
        for step in (0..16).step_by(2) {
            engine.toggle_step(2, variation, step);
            engine.set_velocity(2, variation, step, if step % 4 == 0 { 0.9 } else { 0.6 });
        }
        engine.toggle_accent(variation, 0);
    }

    engine.toggle_step(0, B, 10);
    engine.toggle_step(3, B, 14);
    engine.toggle_flam(1, B, 12);
    engine.toggle_ratchet(2, B, 14);
    engine.set_timing_nudge(1, B, 1);
}

/// Parse "A2,B1" into chain steps and switch to custom mode.
fn author_chain(engine: &mut SequencerEngine, chain: &str) -> Result<()> {
    let items: Vec<&str> = chain.split(',').map(str::trim).collect();
    if items.len() > MAX_CHAIN_STEPS {
        anyhow::bail!("Chain has {} steps, at most {MAX_CHAIN_STEPS} allowed", items.len());
    }
    engine.set_chain_mode(ChainMode::Custom)?;
    engine.clear_chain()?;
    for (index, item) in items.into_iter().enumerate() {
        let mut chars = item.chars();
        let variation = match chars.next() {
            Some('A' | 'a') => Variation::A,
            Some('B' | 'b') => Variation::B,
            _ => anyhow::bail!("Invalid chain step '{item}': expected A or B"),
        };
        let tail = chars.as_str();
        let repeats = if tail.is_empty() {
            1
        } else {
            tail.parse::<u8>()
                .with_context(|| format!("Invalid repeat count in '{item}'"))?
        };
        engine
            .set_chain_edit_step(variation)
            .with_context(|| format!("Chain step {index} does not fit"))?;
        engine.update_chain_step_repeat(index, repeats)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        triggers: Vec<(usize, f64)>,
    }

    impl AudioSink for Counter {
        fn trigger(&mut self, voice: usize, _velocity: f32, time: f64) {
            self.triggers.push((voice, time));
        }

        fn release(&mut self, _voice: usize, _time: f64) {}
    }

    struct Fixed {
        tick: u64,
        playing: bool,
    }

    impl Transport for Fixed {
        fn current_tick(&self) -> u64 {
            self.tick
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

    #[test]
    fn test_chain_with_multibyte_step_is_rejected() {
        let mut engine = SequencerEngine::default();
        assert!(author_chain(&mut engine, "é2").is_err());
        assert!(author_chain(&mut engine, "A2,ü").is_err());
        assert!(author_chain(&mut engine, "").is_err());
    }

    #[test]
    fn test_chain_parses_steps_and_repeats() {
        let mut engine = SequencerEngine::default();
        author_chain(&mut engine, "A2, b, B3").unwrap();

        let steps = &engine.chain().state().steps;
        let parsed: Vec<(Variation, u8)> = steps.iter().map(|s| (s.variation, s.repeats)).collect();
        assert_eq!(
            parsed,
            vec![(Variation::A, 2), (Variation::B, 1), (Variation::B, 3)]
        );
        assert_eq!(engine.chain().cycle_length_bars(), 6);
    }

    #[test]
    fn test_chain_rejects_bad_repeat_count() {
        let mut engine = SequencerEngine::default();
        assert!(author_chain(&mut engine, "A300").is_err());
        assert!(author_chain(&mut engine, "Bx").is_err());
    }

    #[test]
    fn test_capped_polls_stop_before_next_downbeat() {
        let mut engine = SequencerEngine::default();
        engine.toggle_step(0, Variation::A, 0);
        engine.toggle_step(1, Variation::A, 15);

        let mut transport = Fixed {
            tick: 0,
            playing: false,
        };
        let mut sink = Counter::default();
        let lookahead = engine.scheduler().lookahead_ticks(24, 120.0);
        let final_tick = final_poll_tick(2, 24, lookahead);

        engine.start(&mut transport);
        // Overshoot well past the end of bar 1, as a late frame would.
        for tick in (0..=final_tick + 200).step_by(6) {
            transport.tick = tick;
            let frame = CappedTransport::capture(&transport, final_tick);
            engine.tick(&frame, &mut sink);
            if frame.tick >= final_tick {
                break;
            }
        }

        let kicks = sink.triggers.iter().filter(|(v, _)| *v == 0).count();
        let lasts = sink.triggers.iter().filter(|(v, _)| *v == 1).count();
        assert_eq!(kicks, 2, "one downbeat per bar, none for bar 2");
        assert_eq!(lasts, 2, "the final step of the last bar still plays");
        assert_eq!(engine.playback_cursor().current_bar, 1);
    }

    #[test]
    fn test_final_poll_tick_keeps_horizon_in_last_bar() {
        assert_eq!(final_poll_tick(1, 24, 9), 384 - 10);
        assert_eq!(final_poll_tick(1, 24, 1000), 0);
    }
}
