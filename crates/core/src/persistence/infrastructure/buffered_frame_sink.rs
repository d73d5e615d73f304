use std::sync::Arc;

use crate::persistence::domain::frame_sink::{FrameSink, PersistError};
use crate::persistence::domain::frame_store::FrameStore;
use crate::shared::capture_config::ImageFormat;
use crate::shared::frame::KeptFrame;
use crate::shared::persisted_sequence::PersistedSequence;

/// Holds every kept frame in memory and writes them all on `flush`.
///
/// `accept` never blocks and never touches the store. The buffer is
/// released by `flush`, whether or not every write succeeded.
pub struct BufferedFrameSink {
    store: Arc<dyn FrameStore>,
    format: ImageFormat,
    buffer: Vec<KeptFrame>,
    written: usize,
}

impl BufferedFrameSink {
    pub fn new(store: Arc<dyn FrameStore>, format: ImageFormat) -> Self {
        Self {
            store,
            format,
            buffer: Vec::new(),
            written: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl FrameSink for BufferedFrameSink {
    fn accept(&mut self, frame: KeptFrame) -> Result<(), PersistError> {
        self.buffer.push(frame);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistError> {
        let frames = std::mem::take(&mut self.buffer);
        log::debug!("Flushing {} buffered frames", frames.len());

        for frame in frames {
            let index = frame.index();
            self.store
                .put(index, frame.payload())
                .map_err(|source| PersistError { index, source })?;
            self.written += 1;
        }
        Ok(())
    }

    fn frames(&self) -> PersistedSequence {
        PersistedSequence::new(self.store.location(), self.format, self.written)
    }
}
