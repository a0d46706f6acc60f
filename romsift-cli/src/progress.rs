//! Progress display for concurrent installs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use romsift_lib::InstallOutcome;

use crate::commands::install::describe;

/// A bar counting finished installs, showing the most recent one.
pub(crate) struct InstallProgress {
    bar: ProgressBar,
}

impl InstallProgress {
    /// When `quiet` is true the bar is hidden.
    pub(crate) fn new(total: u64, quiet: bool) -> Self {
        let bar = ProgressBar::new(total);
        if quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(
            ProgressStyle::with_template("  {spinner:.cyan} [{pos}/{len}] {wide_msg}")
                .expect("static pattern")
                .tick_chars("/-\\|"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub(crate) fn record(&self, outcome: &InstallOutcome) {
        if let Err(e) = &outcome.result {
            self.bar.suspend(|| log::warn!("{}: {e}", outcome.machine));
        }
        self.bar.set_message(describe(outcome));
        self.bar.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}
