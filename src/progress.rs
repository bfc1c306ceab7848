//! Scan progress reporting.
//!
//! A library scan has two phases: walking the directory (unknown length, a
//! spinner) and reading tags (one tick per file, a bar). `--log-only` hides
//! both and prints `[phase] n/total` lines to stderr every few hundred files,
//! for runs from cron or over ssh.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "0.8s", "12.4s", "3.2m"
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Progress for one scan phase. Safe to tick from rayon workers.
pub struct PhaseProgress {
    phase: &'static str,
    bar: ProgressBar,
    total: u64,
    done: AtomicU64,
    log_every: u64,
}

impl PhaseProgress {
    /// Bar over `total` files.
    pub fn files(phase: &'static str, total: u64, log_every: u64) -> Self {
        let bar = ProgressBar::new(total);
        if !is_log_only() {
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(BAR_TEMPLATE)
                    .unwrap()
                    .progress_chars("=> "),
            );
        }
        Self::with_bar(phase, bar, total, log_every)
    }

    /// Spinner for a phase whose size is not known up front.
    pub fn walking(phase: &'static str) -> Self {
        let bar = ProgressBar::new_spinner();
        if !is_log_only() {
            bar.set_style(ProgressStyle::default_spinner().template(SPINNER_TEMPLATE).unwrap());
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        Self::with_bar(phase, bar, 0, 0)
    }

    fn with_bar(phase: &'static str, bar: ProgressBar, total: u64, log_every: u64) -> Self {
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(phase);
        Self {
            phase,
            bar,
            total,
            done: AtomicU64::new(0),
            log_every: log_every.max(1),
        }
    }

    /// One file done.
    pub fn tick(&self) {
        self.bar.inc(1);
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if is_log_only() && self.total > 0 && (done % self.log_every == 0 || done == self.total) {
            let pct = 100.0 * done as f64 / self.total as f64;
            eprintln!("[{}] {}/{} ({:.1}%)", self.phase, done, self.total, pct);
        }
    }

    pub fn completed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Replace the bar with a summary line (stderr in log-only mode).
    pub fn finish(&self, summary: String) {
        if is_log_only() {
            eprintln!("{}", summary);
        }
        self.bar.finish_with_message(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(800)), "0.8s");
        assert_eq!(format_duration(Duration::from_secs(192)), "3.2m");
    }

    #[test]
    fn test_tick_counts() {
        let progress = PhaseProgress::files("Reading tags", 3, 2);
        progress.tick();
        progress.tick();
        assert_eq!(progress.completed(), 2);
        progress.finish("done".to_string());
    }
}
