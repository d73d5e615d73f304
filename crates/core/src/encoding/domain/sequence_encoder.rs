use std::path::Path;

use crate::shared::persisted_sequence::PersistedSequence;

pub type EncoderError = Box<dyn std::error::Error + Send + Sync>;

/// Turns a persisted image sequence into a single video file.
///
/// `frame_rate` is the declared input rate of the sequence; only success or
/// failure of the call is interpreted by the pipeline.
pub trait SequenceEncoder: Send {
    fn encode(
        &self,
        sequence: &PersistedSequence,
        frame_rate: f64,
        output: &Path,
    ) -> Result<(), EncoderError>;
}
