use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::shared::frame::RawFrame;
use crate::source::domain::frame_source::{FrameSource, SourceError};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Why the event stream ended on the source side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEnd {
    /// The source reported that it has no more frames.
    Exhausted,
    /// The source failed while producing or acknowledging a frame.
    Failed(String),
}

impl fmt::Display for SourceEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEnd::Exhausted => write!(f, "source ended"),
            SourceEnd::Failed(reason) => write!(f, "source failed: {reason}"),
        }
    }
}

pub enum SourceEvent {
    Frame(RawFrame, FrameAck),
    Ended(SourceEnd),
}

/// Acknowledgment token for one delivered frame.
///
/// Acks exactly once: on `ack()` or, failing that, on drop. The relay does
/// not pull the next frame from the source until it has seen this ack.
pub struct FrameAck {
    ack_id: u64,
    tx: Option<Sender<u64>>,
}

impl FrameAck {
    fn new(ack_id: u64, tx: Sender<u64>) -> Self {
        Self {
            ack_id,
            tx: Some(tx),
        }
    }

    pub fn ack_id(&self) -> u64 {
        self.ack_id
    }

    pub fn ack(mut self) {
        self.send();
    }

    fn send(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(self.ack_id);
        }
    }
}

impl Drop for FrameAck {
    fn drop(&mut self) {
        self.send();
    }
}

/// Relays frames from a `FrameSource` onto a bounded channel.
///
/// Layout: `source → relay thread → events channel → consumer`, with acks
/// flowing back through each frame's `FrameAck`. Once `stop` is called the
/// relay suppresses the pending ack, discards late frames and closes the
/// source.
pub struct SourceAdapter {
    stopped: Arc<AtomicBool>,
    relay: Option<JoinHandle<()>>,
}

impl SourceAdapter {
    /// Opens the source and starts relaying. Open failures are returned
    /// directly, before any thread is spawned.
    pub fn start(
        mut source: Box<dyn FrameSource>,
        capacity: usize,
    ) -> Result<(Self, Receiver<SourceEvent>), SourceError> {
        if let Err(e) = source.open() {
            source.close();
            return Err(e);
        }

        let (event_tx, event_rx) = crossbeam_channel::bounded(capacity.max(1));
        let stopped = Arc::new(AtomicBool::new(false));
        let relay = spawn_relay(source, event_tx, stopped.clone());

        Ok((
            Self {
                stopped,
                relay: Some(relay),
            },
            event_rx,
        ))
    }

    /// Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::debug!("Frame source stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stops the source and waits for the relay thread to release it.
    ///
    /// Drop or drain the event receiver first: a relay blocked on a full
    /// channel only exits once the receiver is gone.
    pub fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.relay.take() {
            if handle.join().is_err() {
                log::error!("Source relay thread panicked");
            }
        }
    }
}

impl Drop for SourceAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_relay(
    mut source: Box<dyn FrameSource>,
    events: Sender<SourceEvent>,
    stopped: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded::<u64>(1);
        relay_frames(&mut *source, &events, &stopped, &ack_tx, &ack_rx);
        source.close();
    })
}

fn relay_frames(
    source: &mut dyn FrameSource,
    events: &Sender<SourceEvent>,
    stopped: &AtomicBool,
    ack_tx: &Sender<u64>,
    ack_rx: &Receiver<u64>,
) {
    loop {
        if stopped.load(Ordering::SeqCst) {
            return;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                let _ = events.send(SourceEvent::Ended(SourceEnd::Exhausted));
                return;
            }
            Err(e) => {
                let _ = events.send(SourceEvent::Ended(SourceEnd::Failed(e.to_string())));
                return;
            }
        };
        let arrival = Instant::now();

        if stopped.load(Ordering::SeqCst) {
            log::debug!("Discarding frame {} received after stop", frame.ack_id);
            return;
        }

        let ack_id = frame.ack_id;
        let raw = RawFrame::new(frame.payload, arrival, ack_id);
        let ack = FrameAck::new(ack_id, ack_tx.clone());
        if events.send(SourceEvent::Frame(raw, ack)).is_err() {
            return;
        }

        match ack_rx.recv() {
            Ok(acked) => debug_assert_eq!(acked, ack_id),
            Err(_) => return,
        }

        if stopped.load(Ordering::SeqCst) {
            return;
        }

        if let Err(e) = source.ack(ack_id) {
            let _ = events.send(SourceEvent::Ended(SourceEnd::Failed(e.to_string())));
            return;
        }
    }
}
