//! Engine configuration.
//!
//! Stored as TOML. Every section and field is optional; missing values take
//! their defaults and out-of-range values are clamped on load:
//!
//! ```toml
//! [timing]
//! ratchet_count = 4
//! flam_offset_steps = 0.15
//! nudge_divisions_per_beat = 24
//!
//! [scheduler]
//! max_catch_up_steps = 8
//! lookahead_ms = 20
//!
//! [[scheduler.chokes]]
//! choker = 2
//! choked = 3
//!
//! [ui]
//! reduced_motion = true
//! ```

use crate::error::Result;
use crate::scheduler::SchedulerConfig;
use crate::timing::TimingConfig;
use crate::ui_sync::UiConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ratchet and flam shaping
    pub timing: TimingConfig,
    /// Catch-up window and choke groups
    pub scheduler: SchedulerConfig,
    /// Playhead refresh rates
    pub ui: UiConfig,
}

impl EngineConfig {
    /// Parse and sanitize a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: EngineConfig = toml::from_str(content)?;
        config.sanitize();
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("using default config ({}): {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Clamp every value into range.
    pub fn sanitize(&mut self) {
        self.timing.sanitize();
        self.scheduler.sanitize();
        self.ui.sanitize();
    }
}
