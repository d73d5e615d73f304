use std::fmt;
use std::time::Duration;

use super::error::CaptureProgress;

/// Counters and timings of one capture run.
///
/// Mutated only by the pacing loop; frozen once `finish` has been called.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureStats {
    pub frames_received: usize,
    pub frames_kept: usize,
    pub frames_rejected_invalid: usize,
    /// Gap between consecutive received frames, in arrival order.
    pub inter_arrival: Vec<Duration>,
    pub elapsed: Duration,
    pub achieved_frame_rate: f64,
}

/// Min/median/max of the inter-arrival gaps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntervalSummary {
    pub min: Duration,
    pub median: Duration,
    pub max: Duration,
}

impl CaptureStats {
    /// Counts one received frame. The first frame of a run has no gap.
    pub fn record_arrival(&mut self, since_previous: Option<Duration>) {
        self.frames_received += 1;
        self.inter_arrival.extend(since_previous);
    }

    /// Freezes the elapsed wall clock and derives the achieved rate from it.
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        self.achieved_frame_rate = achieved_frame_rate(self.frames_kept, elapsed);
    }

    pub fn interval_summary(&self) -> IntervalSummary {
        if self.inter_arrival.is_empty() {
            return IntervalSummary::default();
        }
        let mut sorted = self.inter_arrival.clone();
        sorted.sort_unstable();
        IntervalSummary {
            min: sorted[0],
            median: sorted[sorted.len() / 2],
            max: sorted[sorted.len() - 1],
        }
    }

    pub fn progress(&self, target_frames: usize, elapsed: Duration) -> CaptureProgress {
        CaptureProgress {
            frames_received: self.frames_received,
            frames_kept: self.frames_kept,
            target_frames,
            elapsed,
        }
    }
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let intervals = self.interval_summary();
        write!(
            f,
            "stored {} frames (received {}, skipped {}) in {:.2}s (~{:.2} fps); \
             frame intervals (ms) min/median/max: {}/{}/{}",
            self.frames_kept,
            self.frames_received,
            self.frames_rejected_invalid,
            self.elapsed.as_secs_f64(),
            self.achieved_frame_rate,
            intervals.min.as_millis(),
            intervals.median.as_millis(),
            intervals.max.as_millis()
        )
    }
}

/// Frames actually kept per second of wall clock. Zero for an empty interval.
pub fn achieved_frame_rate(frames_kept: usize, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    frames_kept as f64 / elapsed.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_record_arrival_counts_and_keeps_order() {
        let mut stats = CaptureStats::default();
        stats.record_arrival(None);
        stats.record_arrival(Some(ms(30)));
        stats.record_arrival(Some(ms(10)));
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.inter_arrival, vec![ms(30), ms(10)]);
    }

    #[test]
    fn test_interval_summary() {
        let mut stats = CaptureStats::default();
        for v in [40, 10, 25, 60, 20] {
            stats.record_arrival(Some(ms(v)));
        }
        let summary = stats.interval_summary();
        assert_eq!(summary.min, ms(10));
        assert_eq!(summary.median, ms(25));
        assert_eq!(summary.max, ms(60));
        // Summary must not reorder the recorded sequence.
        assert_eq!(stats.inter_arrival[0], ms(40));
    }

    #[test]
    fn test_interval_summary_empty() {
        assert_eq!(
            CaptureStats::default().interval_summary(),
            IntervalSummary::default()
        );
    }

    #[test]
    fn test_finish_computes_achieved_rate() {
        let mut stats = CaptureStats {
            frames_kept: 20,
            ..CaptureStats::default()
        };
        stats.finish(Duration::from_secs(2));
        assert_eq!(stats.elapsed, Duration::from_secs(2));
        assert_relative_eq!(stats.achieved_frame_rate, 10.0);
    }

    #[test]
    fn test_achieved_rate_below_target_is_reported_as_is() {
        assert_relative_eq!(achieved_frame_rate(15, ms(2500)), 6.0);
    }

    #[test]
    fn test_achieved_rate_zero_elapsed() {
        assert_eq!(achieved_frame_rate(5, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_display_summary_line() {
        let mut stats = CaptureStats {
            frames_kept: 3,
            frames_rejected_invalid: 1,
            ..CaptureStats::default()
        };
        stats.record_arrival(None);
        for v in [20, 30, 50, 25] {
            stats.record_arrival(Some(ms(v)));
        }
        stats.finish(ms(1500));
        let line = stats.to_string();
        assert!(line.starts_with("stored 3 frames (received 5, skipped 1) in 1.50s"));
        assert!(line.contains("~2.00 fps"));
        assert!(line.ends_with("min/median/max: 20/30/50"));
    }

    #[test]
    fn test_progress_snapshot() {
        let stats = CaptureStats {
            frames_received: 9,
            frames_kept: 4,
            ..CaptureStats::default()
        };
        let progress = stats.progress(20, ms(800));
        assert_eq!(progress.frames_kept, 4);
        assert_eq!(progress.frames_received, 9);
        assert_eq!(progress.target_frames, 20);
        assert_eq!(progress.elapsed, ms(800));
    }
}
