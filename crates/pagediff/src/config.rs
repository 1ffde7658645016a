//! Engine configuration.
//!
//! Defaults match the canonical capture setup (1280x800 viewport, 30s
//! timeout, 0.1 tolerance). A YAML file can override any field.

use crate::diff::{DiffConfig, DEFAULT_TOLERANCE};
use crate::result::{PageDiffError, PageDiffResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Canonical capture viewport width
pub const CANONICAL_WIDTH: u32 = 1280;

/// Canonical capture viewport height
pub const CANONICAL_HEIGHT: u32 = 800;

/// Hard capture timeout in milliseconds
pub const CAPTURE_TIMEOUT_MS: u64 = 30_000;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capture viewport width
    pub viewport_width: u32,
    /// Capture viewport height
    pub viewport_height: u32,
    /// Hard capture timeout
    pub capture_timeout_ms: u64,
    /// Per-pixel diff tolerance (0.0-1.0)
    pub tolerance: f64,
    /// Opacity of unchanged pixels in diff images
    pub diff_alpha: f64,
    /// Directory holding stored images
    pub store_dir: PathBuf,
    /// JSON file holding websites, pages, comparisons
    pub state_file: PathBuf,
    /// Run the browser headless
    pub headless: bool,
    /// Keep the Chromium sandbox enabled
    pub sandbox: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport_width: CANONICAL_WIDTH,
            viewport_height: CANONICAL_HEIGHT,
            capture_timeout_ms: CAPTURE_TIMEOUT_MS,
            tolerance: DEFAULT_TOLERANCE,
            diff_alpha: 0.1,
            store_dir: PathBuf::from("screenshots"),
            state_file: PathBuf::from("pagediff-state.json"),
            headless: true,
            sandbox: false,
            chromium_path: None,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn from_yaml_file(path: impl AsRef<Path>) -> PageDiffResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Parse from YAML text
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be parsed or fails validation
    pub fn from_yaml_str(raw: &str) -> PageDiffResult<Self> {
        let config: Self = serde_yaml_ng::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_yaml(&self) -> PageDiffResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject values the engine cannot work with
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid field
    pub fn validate(&self) -> PageDiffResult<()> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(PageDiffError::config(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport_width, self.viewport_height
            )));
        }
        if !(0.0..=1.0).contains(&self.tolerance) {
            return Err(PageDiffError::config(format!(
                "tolerance must be within [0, 1], got {}",
                self.tolerance
            )));
        }
        if !(0.0..=1.0).contains(&self.diff_alpha) {
            return Err(PageDiffError::config(format!(
                "diff_alpha must be within [0, 1], got {}",
                self.diff_alpha
            )));
        }
        if self.capture_timeout_ms == 0 {
            return Err(PageDiffError::config("capture_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set capture timeout
    #[must_use]
    pub const fn with_capture_timeout_ms(mut self, ms: u64) -> Self {
        self.capture_timeout_ms = ms;
        self
    }

    /// Set diff tolerance
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the image directory
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    /// Set the state file
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Capture viewport as `(width, height)`
    #[must_use]
    pub const fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    /// Capture timeout as a duration
    #[must_use]
    pub const fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Diff engine settings derived from this configuration
    #[must_use]
    pub fn diff_config(&self) -> DiffConfig {
        DiffConfig::default()
            .with_tolerance(self.tolerance)
            .with_alpha(self.diff_alpha)
    }
}
