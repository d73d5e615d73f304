use std::time::Instant;

use crate::pacing::domain::completion_gate::CompletionGate;
use crate::pacing::domain::frame_validator::FrameValidator;
use crate::pacing::domain::pacer::{Pacer, PacingDecision};
use crate::persistence::domain::frame_sink::{FrameSink, PersistError};
use crate::pipeline::capture_logger::{CaptureLogger, NullCaptureLogger};
use crate::shared::capture_config::CaptureConfig;
use crate::shared::capture_stats::CaptureStats;
use crate::shared::error::{CaptureError, CaptureProgress};
use crate::shared::frame::KeptFrame;
use crate::shared::persisted_sequence::PersistedSequence;
use crate::source::domain::frame_source::FrameSource;
use crate::source::infrastructure::source_adapter::{
    SourceAdapter, SourceEvent, DEFAULT_CHANNEL_CAPACITY,
};

/// Result of a completed capture.
#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub stats: CaptureStats,
    pub sequence: PersistedSequence,
}

enum Failure {
    Source(String),
    Write(PersistError),
}

impl Failure {
    fn into_error(self, progress: CaptureProgress) -> CaptureError {
        match self {
            Failure::Source(reason) => CaptureError::SourceTerminated { reason, progress },
            Failure::Write(e) => CaptureError::WriteFailure {
                index: e.index,
                source: e.source,
                progress,
            },
        }
    }
}

/// Captures a paced, validated frame sequence from a live source.
///
/// Flow: `source → adapter relay → pacer → validator → sink`, all decisions
/// taken on this thread in arrival order. The completion gate stops the
/// source the moment the target count is stored, then the sink is flushed.
/// On failure the source is stopped and whatever was captured is still
/// flushed before the error is returned.
pub struct CaptureScreencastUseCase {
    source: Option<Box<dyn FrameSource>>,
    sink: Option<Box<dyn FrameSink>>,
    config: CaptureConfig,
    logger: Box<dyn CaptureLogger>,
}

impl CaptureScreencastUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        config: CaptureConfig,
        logger: Option<Box<dyn CaptureLogger>>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            source: Some(source),
            sink: Some(sink),
            config,
            logger: logger.unwrap_or_else(|| Box::new(NullCaptureLogger)),
        })
    }

    pub fn execute(&mut self) -> Result<CaptureReport, CaptureError> {
        let source = self.source.take().ok_or(CaptureError::AlreadyExecuted)?;
        let mut sink = self.sink.take().ok_or(CaptureError::AlreadyExecuted)?;

        let target = self.config.target_frame_count();
        let mut pacer = Pacer::from_config(&self.config);
        let validator = FrameValidator::from_config(&self.config);
        let mut gate = CompletionGate::new(target);
        let mut stats = CaptureStats::default();

        self.logger.info(&format!(
            "Capturing {target} frames at {} fps ({}x{} {}, {:?} persistence)",
            self.config.frame_rate,
            self.config.viewport.width,
            self.config.viewport.height,
            self.config.image_format.extension(),
            self.config.persistence_mode
        ));

        let run_start = Instant::now();

        let (mut adapter, events) = match SourceAdapter::start(source, DEFAULT_CHANNEL_CAPACITY) {
            Ok(started) => started,
            Err(e) => {
                gate.fail();
                let progress = stats.progress(target, run_start.elapsed());
                return Err(Failure::Source(format!("failed to open frame source: {e}"))
                    .into_error(progress));
            }
        };

        let mut last_arrival: Option<Instant> = None;
        let mut last_kept: Option<Instant> = None;

        let outcome = loop {
            let event = match events.recv() {
                Ok(event) => event,
                Err(_) => break Err(Failure::Source("event channel closed".to_string())),
            };

            let (raw, ack) = match event {
                SourceEvent::Frame(raw, ack) => (raw, ack),
                SourceEvent::Ended(end) => break Err(Failure::Source(end.to_string())),
            };

            let arrival = raw.arrival();
            let gap = last_arrival.map(|prev| arrival.saturating_duration_since(prev));
            stats.record_arrival(gap);
            last_arrival = Some(arrival);

            let index = match pacer.decide(arrival) {
                PacingDecision::Keep { index } => index,
                PacingDecision::Drop => continue,
            };

            if let Err(e) = validator.validate(raw.payload()) {
                stats.frames_rejected_invalid += 1;
                log::debug!("Skipping invalid frame {}: {e}", raw.sequence_hint());
                continue;
            }

            if let Err(e) = sink.accept(KeptFrame::new(index, raw.into_payload())) {
                adapter.stop();
                break Err(Failure::Write(e));
            }

            let kept = pacer.commit();
            stats.frames_kept = kept;
            last_kept = Some(arrival);
            self.logger.progress(kept, target);

            if gate.observe(kept) {
                // Stop before acking so the source never delivers past the target.
                adapter.stop();
                drop(ack);
                break Ok(());
            }
        };

        adapter.stop();
        drop(events);
        adapter.join();

        // Measured on the pacing clock; a run without frames has none.
        let capture_start = pacer.capture_start().unwrap_or(run_start);
        let elapsed = match (&outcome, last_kept) {
            (Ok(()), Some(kept_at)) => kept_at.saturating_duration_since(capture_start),
            _ => capture_start.elapsed(),
        };

        let result = match (outcome, sink.flush()) {
            (Ok(()), Ok(())) => {
                gate.finish();
                Ok(())
            }
            (Ok(()), Err(e)) => {
                gate.fail();
                Err(Failure::Write(e))
            }
            (Err(failure), flushed) => {
                gate.fail();
                if let Err(e) = flushed {
                    log::warn!("Flushing partial capture failed: {e}");
                }
                Err(failure)
            }
        };

        stats.finish(elapsed);
        let sequence = sink.frames();
        drop(sink);

        self.logger
            .metric("frames_received", stats.frames_received as f64);
        self.logger
            .metric("frames_rejected_invalid", stats.frames_rejected_invalid as f64);
        self.logger
            .metric("achieved_frame_rate", stats.achieved_frame_rate);
        self.logger.summary(&stats);
        log::debug!("Capture finished in state {:?}", gate.state());

        match result {
            Ok(()) => Ok(CaptureReport { stats, sequence }),
            Err(failure) => Err(failure.into_error(stats.progress(target, elapsed))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::domain::frame_store::FrameStore;
    use crate::persistence::infrastructure::buffered_frame_sink::BufferedFrameSink;
    use crate::persistence::infrastructure::memory_frame_store::MemoryFrameStore;
    use crate::persistence::infrastructure::sink_factory::create_sink;
    use crate::persistence::infrastructure::streaming_frame_sink::StreamingFrameSink;
    use crate::shared::capture_config::{ImageFormat, PersistenceMode, Viewport};
    use crate::shared::persisted_sequence::SequenceLocation;
    use crate::source::domain::frame_source::{SourceError, SourceFrame};
    use crate::source::infrastructure::replay_frame_source::ReplayFrameSource;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const WIDTH: u32 = 32;
    const HEIGHT: u32 = 24;

    // --- Stubs ---

    struct FailingOpenSource;

    impl FrameSource for FailingOpenSource {
        fn open(&mut self) -> Result<(), SourceError> {
            Err("browser not reachable".into())
        }

        fn next_frame(&mut self) -> Result<Option<SourceFrame>, SourceError> {
            Ok(None)
        }

        fn ack(&mut self, _ack_id: u64) -> Result<(), SourceError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    struct SlowOpenSource {
        inner: ReplayFrameSource,
        startup: Duration,
    }

    impl FrameSource for SlowOpenSource {
        fn open(&mut self) -> Result<(), SourceError> {
            std::thread::sleep(self.startup);
            self.inner.open()
        }

        fn next_frame(&mut self) -> Result<Option<SourceFrame>, SourceError> {
            self.inner.next_frame()
        }

        fn ack(&mut self, ack_id: u64) -> Result<(), SourceError> {
            self.inner.ack(ack_id)
        }

        fn close(&mut self) {
            self.inner.close();
        }
    }

    struct FailingStore {
        inner: MemoryFrameStore,
        fail_at: usize,
    }

    impl FrameStore for FailingStore {
        fn put(&self, index: usize, payload: &[u8]) -> std::io::Result<()> {
            if index == self.fail_at {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.inner.put(index, payload)
        }

        fn location(&self) -> SequenceLocation {
            SequenceLocation::Memory
        }
    }

    struct ConcurrencyStore {
        inner: MemoryFrameStore,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl FrameStore for ConcurrencyStore {
        fn put(&self, index: usize, payload: &[u8]) -> std::io::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(15));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.put(index, payload)
        }

        fn location(&self) -> SequenceLocation {
            SequenceLocation::Memory
        }
    }

    struct RecordingLogger {
        progress: Arc<Mutex<Vec<usize>>>,
        summaries: Arc<Mutex<Vec<CaptureStats>>>,
    }

    impl CaptureLogger for RecordingLogger {
        fn progress(&mut self, kept: usize, _target: usize) {
            self.progress.lock().unwrap().push(kept);
        }
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn info(&mut self, _message: &str) {}
        fn summary(&self, stats: &CaptureStats) {
            self.summaries.lock().unwrap().push(stats.clone());
        }
    }

    // --- Helpers ---

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn config(frame_rate: f64, duration_secs: f64, mode: PersistenceMode) -> CaptureConfig {
        CaptureConfig {
            frame_rate,
            duration_secs,
            viewport: Viewport {
                width: WIDTH,
                height: HEIGHT,
            },
            image_format: ImageFormat::Png,
            persistence_mode: mode,
            max_pending_writes: 4,
        }
    }

    fn replay(rate: f64, limit: usize) -> Box<dyn FrameSource> {
        Box::new(
            ReplayFrameSource::new(vec![png(WIDTH, HEIGHT)], rate)
                .unwrap()
                .with_limit(limit),
        )
    }

    // --- Tests ---

    #[test]
    fn test_twenty_of_forty_frames_kept_at_half_rate() {
        let config = config(10.0, 2.0, PersistenceMode::Streaming);
        let store = Arc::new(MemoryFrameStore::new());
        let sink = create_sink(&config, store.clone());

        let mut use_case =
            CaptureScreencastUseCase::new(replay(20.0, 45), sink, config, None).unwrap();
        let report = use_case.execute().unwrap();

        assert_eq!(report.stats.frames_kept, 20);
        assert_eq!(report.sequence.frame_count(), 20);
        assert_eq!(store.indices(), (0..20).collect::<Vec<_>>());
        assert!(report.stats.frames_received >= 39);
        assert_relative_eq!(report.stats.achieved_frame_rate, 10.0, max_relative = 0.05);
    }

    #[test]
    fn test_slow_source_startup_is_not_capture_time() {
        let config = config(10.0, 1.0, PersistenceMode::Buffered);
        let source = SlowOpenSource {
            inner: ReplayFrameSource::new(vec![png(WIDTH, HEIGHT)], 20.0)
                .unwrap()
                .with_limit(100),
            startup: Duration::from_millis(500),
        };
        let store = Arc::new(MemoryFrameStore::new());
        let sink = create_sink(&config, store.clone());

        let mut use_case =
            CaptureScreencastUseCase::new(Box::new(source), sink, config, None).unwrap();
        let report = use_case.execute().unwrap();

        let stats = &report.stats;
        assert_eq!(stats.frames_kept, 10);
        // A 20 fps source paced to 10 fps keeps about every other frame.
        assert!(
            stats.frames_received >= 2 * stats.frames_kept - 2,
            "kept {} of only {} arrivals",
            stats.frames_kept,
            stats.frames_received
        );
        assert!(stats.elapsed < Duration::from_millis(1300));
        assert_relative_eq!(stats.achieved_frame_rate, 10.0, max_relative = 0.1);
        assert_eq!(stats.inter_arrival.len(), stats.frames_received - 1);
        assert!(stats.interval_summary().max < Duration::from_millis(300));
    }

    #[rstest]
    #[case(PersistenceMode::Buffered)]
    #[case(PersistenceMode::Streaming)]
    fn test_exact_target_with_contiguous_indices(#[case] mode: PersistenceMode) {
        let config = config(50.0, 0.2, mode);
        let store = Arc::new(MemoryFrameStore::new());
        let sink = create_sink(&config, store.clone());

        let mut use_case =
            CaptureScreencastUseCase::new(replay(200.0, 1000), sink, config, None).unwrap();
        let report = use_case.execute().unwrap();

        assert_eq!(report.stats.frames_kept, 10);
        assert_eq!(store.indices(), (0..10).collect::<Vec<_>>());
        assert_eq!(report.stats.frames_rejected_invalid, 0);
        assert_eq!(*report.sequence.location(), SequenceLocation::Memory);
    }

    #[test]
    fn test_source_terminating_early_keeps_partial_sequence() {
        let config = config(10.0, 2.0, PersistenceMode::Buffered);
        let store = Arc::new(MemoryFrameStore::new());
        let sink = Box::new(BufferedFrameSink::new(store.clone(), ImageFormat::Png));

        // Slower than the target rate, so every frame the source sends is kept.
        let mut use_case =
            CaptureScreencastUseCase::new(replay(5.0, 5), sink, config, None).unwrap();
        let err = use_case.execute().unwrap_err();

        match &err {
            CaptureError::SourceTerminated { progress, .. } => {
                assert_eq!(progress.frames_kept, 5);
                assert_eq!(progress.target_frames, 20);
                assert_eq!(progress.frames_received, 5);
            }
            other => panic!("expected SourceTerminated, got {other}"),
        }
        assert_eq!(store.indices(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_open_failure_is_source_terminated() {
        let config = config(10.0, 1.0, PersistenceMode::Streaming);
        let sink = create_sink(&config, Arc::new(MemoryFrameStore::new()));
        let mut use_case =
            CaptureScreencastUseCase::new(Box::new(FailingOpenSource), sink, config, None)
                .unwrap();

        let err = use_case.execute().unwrap_err();
        assert!(matches!(err, CaptureError::SourceTerminated { .. }));
        assert!(err.to_string().contains("browser not reachable"));
        assert_eq!(err.progress().unwrap().frames_kept, 0);
    }

    #[test]
    fn test_invalid_frames_do_not_consume_slots() {
        let config = config(10.0, 0.3, PersistenceMode::Streaming);
        let good = png(WIDTH, HEIGHT);
        let bad = png(WIDTH * 2, HEIGHT);
        // At 40 fps the first frame offered each 100 ms slot is invalid; the
        // valid frame 25 ms later must still take the slot.
        let source = ReplayFrameSource::new(
            vec![bad, good.clone(), good.clone(), good.clone()],
            40.0,
        )
        .unwrap()
        .with_limit(200);
        let store = Arc::new(MemoryFrameStore::new());
        let sink = create_sink(&config, store.clone());

        let mut use_case =
            CaptureScreencastUseCase::new(Box::new(source), sink, config, None).unwrap();
        let report = use_case.execute().unwrap();

        assert_eq!(report.stats.frames_kept, 3);
        assert!(report.stats.frames_rejected_invalid >= 1);
        assert_eq!(store.indices(), vec![0, 1, 2]);
        assert!(store.frames().iter().all(|frame| *frame == good));
    }

    #[test]
    fn test_write_failure_surfaces_with_index() {
        let config = config(50.0, 0.2, PersistenceMode::Streaming);
        let store = Arc::new(FailingStore {
            inner: MemoryFrameStore::new(),
            fail_at: 1,
        });
        let sink = create_sink(&config, store.clone());

        let mut use_case =
            CaptureScreencastUseCase::new(replay(200.0, 1000), sink, config, None).unwrap();
        let err = use_case.execute().unwrap_err();

        match err {
            CaptureError::WriteFailure { index, progress, .. } => {
                assert_eq!(index, 1);
                assert!(progress.frames_kept <= 10);
            }
            other => panic!("expected WriteFailure, got {other}"),
        }
        assert!(!store.inner.indices().contains(&1));
    }

    #[test]
    fn test_buffered_write_failure_happens_on_flush() {
        let config = config(50.0, 0.1, PersistenceMode::Buffered);
        let store = Arc::new(FailingStore {
            inner: MemoryFrameStore::new(),
            fail_at: 3,
        });
        let sink = create_sink(&config, store.clone());

        let mut use_case =
            CaptureScreencastUseCase::new(replay(200.0, 1000), sink, config, None).unwrap();
        let err = use_case.execute().unwrap_err();

        match err {
            CaptureError::WriteFailure { index, progress, .. } => {
                assert_eq!(index, 3);
                assert_eq!(progress.frames_kept, 5);
            }
            other => panic!("expected WriteFailure, got {other}"),
        }
        assert_eq!(store.inner.indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_streaming_never_exceeds_pending_bound() {
        let mut config = config(100.0, 0.12, PersistenceMode::Streaming);
        config.max_pending_writes = 2;
        let store = Arc::new(ConcurrencyStore {
            inner: MemoryFrameStore::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let sink = Box::new(StreamingFrameSink::new(store.clone(), ImageFormat::Png, 2));

        let mut use_case =
            CaptureScreencastUseCase::new(replay(400.0, 10_000), sink, config, None).unwrap();
        let report = use_case.execute().unwrap();

        assert_eq!(report.stats.frames_kept, 12);
        assert!(store.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.inner.indices(), (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_logger_sees_progress_and_one_summary() {
        let config = config(50.0, 0.1, PersistenceMode::Buffered);
        let progress = Arc::new(Mutex::new(Vec::new()));
        let summaries = Arc::new(Mutex::new(Vec::new()));
        let logger = RecordingLogger {
            progress: progress.clone(),
            summaries: summaries.clone(),
        };
        let sink = create_sink(&config, Arc::new(MemoryFrameStore::new()));

        let mut use_case =
            CaptureScreencastUseCase::new(replay(200.0, 1000), sink, config, Some(Box::new(logger)))
                .unwrap();
        use_case.execute().unwrap();

        assert_eq!(*progress.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        let summaries = summaries.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].frames_kept, 5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = config(0.0, 1.0, PersistenceMode::Streaming);
        let sink = create_sink(&CaptureConfig::default(), Arc::new(MemoryFrameStore::new()));
        let result = CaptureScreencastUseCase::new(replay(10.0, 1), sink, config, None);
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }

    #[test]
    fn test_execute_twice_returns_already_executed() {
        let config = config(50.0, 0.04, PersistenceMode::Buffered);
        let sink = create_sink(&config, Arc::new(MemoryFrameStore::new()));
        let mut use_case =
            CaptureScreencastUseCase::new(replay(200.0, 1000), sink, config, None).unwrap();

        use_case.execute().unwrap();
        assert!(matches!(
            use_case.execute(),
            Err(CaptureError::AlreadyExecuted)
        ));
    }
}
