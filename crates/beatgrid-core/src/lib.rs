//! Beatgrid Core - Pattern model, variation chaining and step scheduling for a
//! 16-step, 8-voice drum sequencer.
//!
//! This crate provides:
//!
//! - **Pattern** - Steps, velocities, accents, ratchets, flams and nudges for two variations
//! - **Timing** - Fixed-point beat time and step-to-hit resolution
//! - **Chain** - Fixed A/B/AB/AAAB cycles and custom variation chains
//! - **Scheduler** - Transport-driven step dispatch with dedupe, catch-up and chokes
//! - **Engine** - The owned state and single mutation path, with change events
//! - **UI Sync** - Rate-limited playhead snapshots for the interface
//!
//! # Architecture
//!
//! All edits flow through the [`EngineCommand`] enum and are applied by the
//! [`SequencerEngine`]. Audio rendering stays outside the crate: the engine
//! samples a [`Transport`] and drives an [`AudioSink`].
//!
//! ```no_run
//! use beatgrid_core::{ClockTransport, SequencerEngine, Variation, AudioSink};
//!
//! struct Printer;
//! impl AudioSink for Printer {
//!     fn trigger(&mut self, voice: usize, velocity: f32, time: f64) {
//!         println!("{voice} {velocity:.2} @ {time:+.4}s");
//!     }
//!     fn release(&mut self, _voice: usize, _time: f64) {}
//! }
//!
//! let mut engine = SequencerEngine::default();
//! for step in (0..16).step_by(4) {
//!     engine.toggle_step(0, Variation::A, step);
//! }
//! let mut transport = ClockTransport::new(120.0);
//! let mut sink = Printer;
//! engine.start(&mut transport);
//! loop {
//!     engine.tick(&transport, &mut sink);
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! ```

pub mod chain;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod edit;
pub mod engine;
pub mod error;
pub mod instrument;
pub mod pattern;
pub mod scheduler;
pub mod timing;
pub mod transport;
pub mod ui_sync;

// Re-export main types for convenience
pub use chain::{
    ChainController, ChainMode, ChainState, ChainStep, FixedCycle, PlaybackCursor,
    MAX_CHAIN_REPEAT, MAX_CHAIN_STEPS, MIN_CHAIN_REPEAT,
};
pub use clipboard::{random_sequence, random_sequence_with, Clip, Clipboard, PasteTarget};
pub use commands::{EngineCommand, EngineEvent};
pub use config::EngineConfig;
pub use edit::{EditMode, EditState};
pub use engine::SequencerEngine;
pub use error::{Error, Result};
pub use instrument::{ChokePair, DrumInstrument, InstrumentBank};
pub use pattern::{
    Pattern, StepSequence, Variation, VariationMetadata, Voice, NUM_VARIATIONS, NUM_VOICES,
    STEPS_PER_PATTERN,
};
pub use scheduler::{PollReport, SchedulerConfig, StepScheduler};
pub use timing::{BeatTime, HitKind, StepHit, TimingConfig, TimingResolver};
pub use transport::{AudioSink, ClockTransport, Transport};
pub use ui_sync::{ListenerId, PlayheadSnapshot, UiConfig, UiSyncBridge};
