use thiserror::Error;

use crate::shared::frame::KeptFrame;
use crate::shared::persisted_sequence::PersistedSequence;

/// A frame that could not be persisted.
#[derive(Error, Debug)]
#[error("failed to write frame {index}: {source}")]
pub struct PersistError {
    pub index: usize,
    #[source]
    pub source: std::io::Error,
}

/// Persistence strategy for kept frames.
///
/// The pacing loop hands over frames in index order; after a successful
/// `flush` every accepted frame is durable in the underlying store.
pub trait FrameSink: Send {
    /// Takes ownership of a kept frame. May block to apply back-pressure.
    fn accept(&mut self, frame: KeptFrame) -> Result<(), PersistError>;

    /// Completes all outstanding writes.
    fn flush(&mut self) -> Result<(), PersistError>;

    /// Descriptor of what has been written so far.
    fn frames(&self) -> PersistedSequence;
}
