use std::time::{Duration, Instant};

use crate::shared::capture_config::CaptureConfig;

/// Outcome of offering one arriving frame to the pacer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingDecision {
    /// The frame may take output slot `index`.
    Keep { index: usize },
    Drop,
}

/// Temporal decimator: keeps at most one arriving frame per pacing window.
///
/// Pacing runs on elapsed wall-clock time, not on frame counts, so bursts
/// and stalls of the source do not shift the output timeline. A frame is
/// kept iff `kept < target && floor(elapsed / interval) > kept`.
///
/// The clock starts one interval before the first arrival, so that frame
/// fills slot 0 and source startup never counts as capture time.
///
/// `decide` only reserves a slot; the slot counts once `commit` is called.
/// A caller that rejects the frame afterwards simply does not commit, and
/// the next arrival is offered the same slot.
pub struct Pacer {
    interval: Duration,
    interval_nanos: u128,
    target: usize,
    capture_start: Option<Instant>,
    kept: usize,
}

impl Pacer {
    pub fn new(interval: Duration, target: usize) -> Self {
        Self {
            interval,
            interval_nanos: interval.as_nanos().max(1),
            target,
            capture_start: None,
            kept: 0,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.frame_interval(), config.target_frame_count())
    }

    /// Start of the pacing clock, set by the first `decide`.
    pub fn capture_start(&self) -> Option<Instant> {
        self.capture_start
    }

    pub fn decide(&mut self, now: Instant) -> PacingDecision {
        let interval = self.interval;
        let start = *self
            .capture_start
            .get_or_insert_with(|| now.checked_sub(interval).unwrap_or(now));
        if self.kept >= self.target {
            return PacingDecision::Drop;
        }
        let elapsed = now.saturating_duration_since(start).as_nanos();
        let expected = elapsed / self.interval_nanos;
        if expected > self.kept as u128 {
            PacingDecision::Keep { index: self.kept }
        } else {
            PacingDecision::Drop
        }
    }

    /// Counts the slot handed out by the last `Keep`. Returns the new total.
    pub fn commit(&mut self) -> usize {
        debug_assert!(self.kept < self.target, "commit past target");
        self.kept = (self.kept + 1).min(self.target);
        self.kept
    }

    pub fn kept(&self) -> usize {
        self.kept
    }

    pub fn target(&self) -> usize {
        self.target
    }
}
