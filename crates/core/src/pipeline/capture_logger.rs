use std::collections::HashMap;

use crate::shared::capture_stats::CaptureStats;

/// Cross-cutting logger for capture orchestration events.
///
/// Keeps the capture use case independent of where progress ends up
/// (log crate, tests, a future UI).
pub trait CaptureLogger: Send {
    /// Report that `kept` of `target` frames are stored.
    fn progress(&mut self, kept: usize, target: usize);

    /// Record a point-in-time metric (e.g. received frames, rejected frames).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit the end-of-run summary. Default: no-op.
    fn summary(&self, _stats: &CaptureStats) {}
}

/// Silent logger that discards all events.
pub struct NullCaptureLogger;

impl CaptureLogger for NullCaptureLogger {
    fn progress(&mut self, _kept: usize, _target: usize) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger that forwards to the `log` facade.
///
/// Progress output is throttled to every `throttle_frames` kept frames.
pub struct LogCaptureLogger {
    throttle_frames: usize,
    metrics: HashMap<String, f64>,
    last_progress: Option<(usize, usize)>,
}

impl LogCaptureLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            metrics: HashMap::new(),
            last_progress: None,
        }
    }

    /// Latest value recorded for a metric.
    pub fn metric_value(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Last progress line that was actually logged.
    pub fn last_progress(&self) -> Option<(usize, usize)> {
        self.last_progress
    }
}

impl Default for LogCaptureLogger {
    fn default() -> Self {
        Self::new(crate::shared::constants::PROGRESS_LOG_EVERY)
    }
}

impl CaptureLogger for LogCaptureLogger {
    fn progress(&mut self, kept: usize, target: usize) {
        if target > 0 && (kept % self.throttle_frames == 0 || kept == target) {
            let pct = kept as f64 / target as f64 * 100.0;
            log::info!("Captured {kept}/{target} frames ({pct:.1}%)");
            self.last_progress = Some((kept, target));
        }
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
        log::debug!("{name} = {value}");
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self, stats: &CaptureStats) {
        log::info!("{stats}");
    }
}
