use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use crate::persistence::domain::frame_store::FrameStore;
use crate::shared::persisted_sequence::SequenceLocation;

/// Keeps persisted payloads in memory, ordered by index.
///
/// Storing the same index twice is an error, which lets tests catch sinks
/// that target a filename more than once.
#[derive(Default)]
pub struct MemoryFrameStore {
    frames: Mutex<BTreeMap<usize, Vec<u8>>>,
}

impl MemoryFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads in index order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().values().cloned().collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.frames.lock().unwrap().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameStore for MemoryFrameStore {
    fn put(&self, index: usize, payload: &[u8]) -> io::Result<()> {
        let mut frames = self.frames.lock().unwrap();
        if frames.contains_key(&index) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("frame {index} already stored"),
            ));
        }
        frames.insert(index, payload.to_vec());
        Ok(())
    }

    fn location(&self) -> SequenceLocation {
        SequenceLocation::Memory
    }
}
