use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{BrowserError, Result};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_LOAD_MORE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 400;
pub const DEFAULT_SPEED_WINDOW_SECS: u64 = 60;

/// Tuning knobs for a browsing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Number of children requested per page
    pub page_size: usize,
    /// Fraction of loaded rows that must be scrolled past before loading more
    pub load_more_threshold: f64,
    pub search_debounce_ms: u64,
    /// Window used to estimate upload speed
    pub speed_window_secs: u64,
    pub default_crypted: bool,
    pub default_compressed: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            load_more_threshold: DEFAULT_LOAD_MORE_THRESHOLD,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            speed_window_secs: DEFAULT_SPEED_WINDOW_SECS,
            default_crypted: true,
            default_compressed: false,
        }
    }
}

impl BrowserConfig {
    /// Load and validate a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrowserConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 1000 {
            return Err(BrowserError::InvalidConfig(format!(
                "page_size must be between 1 and 1000, got {}",
                self.page_size
            )));
        }

        if !(self.load_more_threshold > 0.0 && self.load_more_threshold <= 1.0) {
            return Err(BrowserError::InvalidConfig(format!(
                "load_more_threshold must be in (0, 1], got {}",
                self.load_more_threshold
            )));
        }

        if self.search_debounce_ms > 10_000 {
            return Err(BrowserError::InvalidConfig(format!(
                "search_debounce_ms cannot exceed 10000, got {}",
                self.search_debounce_ms
            )));
        }

        if self.speed_window_secs == 0 || self.speed_window_secs > 3600 {
            return Err(BrowserError::InvalidConfig(format!(
                "speed_window_secs must be between 1 and 3600, got {}",
                self.speed_window_secs
            )));
        }

        Ok(())
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_secs(self.speed_window_secs)
    }
}
