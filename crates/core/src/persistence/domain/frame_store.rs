use crate::shared::persisted_sequence::SequenceLocation;

/// Byte-level destination for kept frames.
///
/// Shared between the pacing loop and write workers, so implementations
/// must tolerate concurrent `put` calls for distinct indices.
pub trait FrameStore: Send + Sync {
    /// Stores the payload for `index` exactly as received.
    fn put(&self, index: usize, payload: &[u8]) -> std::io::Result<()>;

    fn location(&self) -> SequenceLocation;
}
