pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// One encoded frame as emitted by a source, tagged with the id the source
/// expects back as acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFrame {
    pub payload: Vec<u8>,
    pub ack_id: u64,
}

/// Push-style producer of encoded frames.
///
/// A source emits one frame at a time and will not emit another until the
/// previous one has been acknowledged. Implementations handle transport
/// details (process pipes, files) while the pipeline only sees frames.
pub trait FrameSource: Send {
    /// Starts the underlying session.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Blocks until the next frame arrives. `Ok(None)` means the source ended.
    fn next_frame(&mut self) -> Result<Option<SourceFrame>, SourceError>;

    /// Acknowledges a delivered frame so the source may emit the next one.
    fn ack(&mut self, ack_id: u64) -> Result<(), SourceError>;

    /// Releases the underlying session. Safe to call more than once.
    fn close(&mut self);
}
