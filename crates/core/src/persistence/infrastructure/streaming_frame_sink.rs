use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::persistence::domain::frame_sink::{FrameSink, PersistError};
use crate::persistence::domain::frame_store::FrameStore;
use crate::shared::capture_config::ImageFormat;
use crate::shared::constants::MAX_WRITE_WORKERS;
use crate::shared::frame::KeptFrame;
use crate::shared::persisted_sequence::PersistedSequence;

#[derive(Default)]
struct Pending {
    outstanding: usize,
    peak: usize,
    written: usize,
    error: Option<PersistError>,
}

#[derive(Default)]
struct WriteState {
    pending: Mutex<Pending>,
    changed: Condvar,
}

/// Writes kept frames as they arrive, with at most `max_pending` writes
/// queued or in flight.
///
/// Layout: `accept → jobs channel → write workers → store`. Writes may
/// finish out of order; each targets its own index. The first write error
/// is reported by the next `accept` or `flush`.
pub struct StreamingFrameSink {
    store: Arc<dyn FrameStore>,
    format: ImageFormat,
    max_pending: usize,
    state: Arc<WriteState>,
    jobs: Option<Sender<KeptFrame>>,
    workers: Vec<JoinHandle<()>>,
}

impl StreamingFrameSink {
    pub fn new(store: Arc<dyn FrameStore>, format: ImageFormat, max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        let (jobs_tx, jobs_rx) = crossbeam_channel::bounded::<KeptFrame>(max_pending);
        let state = Arc::new(WriteState::default());

        let worker_count = max_pending.min(MAX_WRITE_WORKERS);
        let workers = (0..worker_count)
            .map(|_| spawn_writer(store.clone(), jobs_rx.clone(), state.clone()))
            .collect();

        Self {
            store,
            format,
            max_pending,
            state,
            jobs: Some(jobs_tx),
            workers,
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Highest number of writes that were outstanding at once.
    pub fn peak_pending(&self) -> usize {
        self.state.pending.lock().unwrap().peak
    }

    fn shutdown(&mut self) {
        self.jobs = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Frame write worker panicked");
            }
        }
    }
}

impl FrameSink for StreamingFrameSink {
    fn accept(&mut self, frame: KeptFrame) -> Result<(), PersistError> {
        {
            let mut pending = self.state.pending.lock().unwrap();
            while pending.outstanding >= self.max_pending && pending.error.is_none() {
                pending = self.state.changed.wait(pending).unwrap();
            }
            if let Some(e) = pending.error.take() {
                return Err(e);
            }
            pending.outstanding += 1;
            pending.peak = pending.peak.max(pending.outstanding);
        }

        let index = frame.index();
        let sent = match &self.jobs {
            Some(jobs) => jobs.send(frame).is_ok(),
            None => false,
        };
        if !sent {
            self.state.pending.lock().unwrap().outstanding -= 1;
            return Err(PersistError {
                index,
                source: std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "write workers are gone",
                ),
            });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistError> {
        let mut pending = self.state.pending.lock().unwrap();
        while pending.outstanding > 0 {
            pending = self.state.changed.wait(pending).unwrap();
        }
        match pending.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn frames(&self) -> PersistedSequence {
        let written = self.state.pending.lock().unwrap().written;
        PersistedSequence::new(self.store.location(), self.format, written)
    }
}

impl Drop for StreamingFrameSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_writer(
    store: Arc<dyn FrameStore>,
    jobs: Receiver<KeptFrame>,
    state: Arc<WriteState>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for frame in jobs {
            let index = frame.index();
            let result = store.put(index, frame.payload());
            drop(frame);

            let mut pending = state.pending.lock().unwrap();
            pending.outstanding -= 1;
            match result {
                Ok(()) => pending.written += 1,
                Err(source) => {
                    log::warn!("Failed to write frame {index}: {source}");
                    if pending.error.is_none() {
                        pending.error = Some(PersistError { index, source });
                    }
                }
            }
            state.changed.notify_all();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::infrastructure::directory_frame_store::DirectoryFrameStore;
    use crate::persistence::infrastructure::memory_frame_store::MemoryFrameStore;
    use crate::shared::persisted_sequence::SequenceLocation;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // --- Stubs ---

    /// Slow store that records how many puts run at the same time.
    struct SlowStore {
        inner: MemoryFrameStore,
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        fail_at: Option<usize>,
    }

    impl SlowStore {
        fn new(delay_ms: u64) -> Self {
            Self {
                inner: MemoryFrameStore::new(),
                delay: Duration::from_millis(delay_ms),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                fail_at: None,
            }
        }
    }

    impl FrameStore for SlowStore {
        fn put(&self, index: usize, payload: &[u8]) -> std::io::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail_at == Some(index) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.inner.put(index, payload)
        }

        fn location(&self) -> SequenceLocation {
            SequenceLocation::Memory
        }
    }

    fn kept(index: usize) -> KeptFrame {
        KeptFrame::new(index, vec![index as u8; 16])
    }

    // --- Tests ---

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(8)]
    fn test_outstanding_writes_never_exceed_bound(#[case] max_pending: usize) {
        let store = Arc::new(SlowStore::new(3));
        let mut sink = StreamingFrameSink::new(store.clone(), ImageFormat::Png, max_pending);
        for i in 0..24 {
            sink.accept(kept(i)).unwrap();
        }
        sink.flush().unwrap();

        assert!(sink.peak_pending() <= max_pending);
        assert!(store.max_active.load(Ordering::SeqCst) <= max_pending);
        assert_eq!(store.inner.indices(), (0..24).collect::<Vec<_>>());
        assert_eq!(sink.frames().frame_count(), 24);
    }

    #[test]
    fn test_bound_is_reached_with_slow_store() {
        let store = Arc::new(SlowStore::new(20));
        let mut sink = StreamingFrameSink::new(store, ImageFormat::Png, 2);
        for i in 0..6 {
            sink.accept(kept(i)).unwrap();
        }
        sink.flush().unwrap();
        assert_eq!(sink.peak_pending(), 2);
    }

    #[test]
    fn test_flush_implies_every_file_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(DirectoryFrameStore::new(tmp.path(), ImageFormat::Png).unwrap());
        let mut sink = StreamingFrameSink::new(store, ImageFormat::Png, 4);
        for i in 0..30 {
            sink.accept(kept(i)).unwrap();
        }
        sink.flush().unwrap();

        let sequence = sink.frames();
        assert_eq!(sequence.frame_count(), 30);
        for i in 0..30 {
            let path = sequence.frame_path(i).unwrap();
            assert_eq!(std::fs::read(path).unwrap(), vec![i as u8; 16]);
        }
    }

    #[test]
    fn test_write_error_surfaces_on_flush() {
        let mut store = SlowStore::new(20);
        store.fail_at = Some(1);
        let store = Arc::new(store);
        let mut sink = StreamingFrameSink::new(store, ImageFormat::Png, 8);
        sink.accept(kept(0)).unwrap();
        sink.accept(kept(1)).unwrap();
        sink.accept(kept(2)).unwrap();

        let err = sink.flush().unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(sink.frames().frame_count(), 2);
    }

    #[test]
    fn test_write_error_surfaces_on_accept() {
        let mut store = SlowStore::new(1);
        store.fail_at = Some(0);
        let store = Arc::new(store);
        let mut sink = StreamingFrameSink::new(store, ImageFormat::Png, 1);
        sink.accept(kept(0)).unwrap();

        let err = sink.accept(kept(1)).unwrap_err();
        assert_eq!(err.index, 0);
    }

    #[test]
    fn test_flush_with_nothing_accepted() {
        let store = Arc::new(MemoryFrameStore::new());
        let mut sink = StreamingFrameSink::new(store, ImageFormat::Png, 8);
        sink.flush().unwrap();
        assert_eq!(sink.frames().frame_count(), 0);
    }

    #[test]
    fn test_zero_bound_is_clamped_to_one() {
        let store = Arc::new(MemoryFrameStore::new());
        let sink = StreamingFrameSink::new(store, ImageFormat::Png, 0);
        assert_eq!(sink.max_pending(), 1);
    }
}
