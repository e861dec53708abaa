//! Progress indicators for long-running downloads
//!
//! Wraps `indicatif` with oldloom's styling. Progress is switched off by the `--no-progress`
//! and `--quiet` flags (carried in [`crate::config::Settings`]), in which case a hidden bar
//! is created and every call is a no-op.
//!
//! ```rust
//! use oldloom_cli::utils::progress::ProgressBar;
//!
//! let progress = ProgressBar::new(3, false);
//! progress.set_message("Downloading assets");
//! for _ in 0..3 {
//!     progress.inc(1);
//! }
//! progress.finish_with_message("Assets ready");
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

/// A progress bar with consistent styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a bar tracking `len` units; hidden unless `enabled`.
    pub fn new(len: u64, enabled: bool) -> Self {
        let inner = if enabled {
            let bar = IndicatifBar::new(len);
            bar.set_style(default_style());
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self { inner }
    }

    /// Sets the message displayed next to the bar.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Advances the bar.
    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Current position, mostly useful in tests.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// Completes the bar, leaving `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Removes the bar from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("=>-")
}
