//! Instrument slots: which drum each voice plays, mute/solo flags and choke groups.

use crate::pattern::{in_range, NUM_VOICES};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The drum sound bound to a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumInstrument {
    /// Bass drum
    Kick,
    Snare,
    ClosedHat,
    OpenHat,
    Clap,
    LowTom,
    HighTom,
    /// Crash cymbal
    Cymbal,
}

impl DrumInstrument {
    /// Default slot order.
    pub const KIT: [DrumInstrument; NUM_VOICES] = [
        DrumInstrument::Kick,
        DrumInstrument::Snare,
        DrumInstrument::ClosedHat,
        DrumInstrument::OpenHat,
        DrumInstrument::Clap,
        DrumInstrument::LowTom,
        DrumInstrument::HighTom,
        DrumInstrument::Cymbal,
    ];

    /// Short label for grids and logs.
    pub fn short_name(self) -> &'static str {
        match self {
            DrumInstrument::Kick => "BD",
            DrumInstrument::Snare => "SD",
            DrumInstrument::ClosedHat => "CH",
            DrumInstrument::OpenHat => "OH",
            DrumInstrument::Clap => "CP",
            DrumInstrument::LowTom => "LT",
            DrumInstrument::HighTom => "HT",
            DrumInstrument::Cymbal => "CY",
        }
    }
}

impl fmt::Display for DrumInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// `choker` hitting silences `choked` (closed hat cuts the open hat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChokePair {
    pub choker: usize,
    pub choked: usize,
}

impl ChokePair {
    /// Closed hat (slot 2) chokes open hat (slot 3).
    pub const HI_HAT: ChokePair = ChokePair {
        choker: 2,
        choked: 3,
    };

    fn is_valid(&self) -> bool {
        self.choker < NUM_VOICES && self.choked < NUM_VOICES && self.choker != self.choked
    }
}

/// Per-slot mixer flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrumentSlot {
    pub instrument: DrumInstrument,
    pub muted: bool,
    pub soloed: bool,
}

/// The eight instrument slots the pattern's voices drive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentBank {
    slots: [InstrumentSlot; NUM_VOICES],
    chokes: Vec<ChokePair>,
}

impl Default for InstrumentBank {
    fn default() -> Self {
        Self::new(vec![ChokePair::HI_HAT])
    }
}

impl InstrumentBank {
    /// The default kit with the given choke pairs. Invalid pairs are dropped.
    pub fn new(chokes: Vec<ChokePair>) -> Self {
        let mut bank = Self {
            slots: DrumInstrument::KIT.map(|instrument| InstrumentSlot {
                instrument,
                muted: false,
                soloed: false,
            }),
            chokes: Vec::new(),
        };
        bank.set_chokes(chokes);
        bank
    }

    pub fn slot(&self, voice: usize) -> Option<&InstrumentSlot> {
        self.slots.get(voice)
    }

    pub fn instrument(&self, voice: usize) -> Option<DrumInstrument> {
        self.slots.get(voice).map(|s| s.instrument)
    }

    pub fn set_instrument(&mut self, voice: usize, instrument: DrumInstrument) -> bool {
        if !in_range(voice, NUM_VOICES, "voice") {
            return false;
        }
        self.slots[voice].instrument = instrument;
        true
    }

    pub fn is_muted(&self, voice: usize) -> bool {
        self.slots.get(voice).is_some_and(|s| s.muted)
    }

    pub fn is_soloed(&self, voice: usize) -> bool {
        self.slots.get(voice).is_some_and(|s| s.soloed)
    }

    pub fn any_soloed(&self) -> bool {
        self.slots.iter().any(|s| s.soloed)
    }

    /// Whether a voice may sound. Solo overrides mute: once any slot is
    /// soloed only soloed slots play, muted or not.
    pub fn is_audible(&self, voice: usize, any_soloed: bool) -> bool {
        match self.slots.get(voice) {
            Some(slot) if any_soloed => slot.soloed,
            Some(slot) => !slot.muted,
            None => false,
        }
    }

    pub fn toggle_mute(&mut self, voice: usize) -> bool {
        if !in_range(voice, NUM_VOICES, "voice") {
            return false;
        }
        self.slots[voice].muted = !self.slots[voice].muted;
        true
    }

    pub fn toggle_solo(&mut self, voice: usize) -> bool {
        if !in_range(voice, NUM_VOICES, "voice") {
            return false;
        }
        self.slots[voice].soloed = !self.slots[voice].soloed;
        true
    }

    pub fn set_muted(&mut self, voice: usize, muted: bool) -> bool {
        if !in_range(voice, NUM_VOICES, "voice") {
            return false;
        }
        self.slots[voice].muted = muted;
        true
    }

    pub fn set_soloed(&mut self, voice: usize, soloed: bool) -> bool {
        if !in_range(voice, NUM_VOICES, "voice") {
            return false;
        }
        self.slots[voice].soloed = soloed;
        true
    }

    pub fn chokes(&self) -> &[ChokePair] {
        &self.chokes
    }

    pub fn set_chokes(&mut self, chokes: Vec<ChokePair>) {
        self.chokes = chokes
            .into_iter()
            .filter(|pair| {
                let ok = pair.is_valid();
                if !ok {
                    log::warn!("ignoring invalid choke pair {} -> {}", pair.choker, pair.choked);
                }
                ok
            })
            .collect();
    }

    /// Voices silenced when `voice` triggers.
    pub fn choked_by(&self, voice: usize) -> impl Iterator<Item = usize> + '_ {
        self.chokes
            .iter()
            .filter(move |pair| pair.choker == voice)
            .map(|pair| pair.choked)
    }
}
