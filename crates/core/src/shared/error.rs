use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// How far a capture run got before it ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureProgress {
    pub frames_received: usize,
    pub frames_kept: usize,
    pub target_frames: usize,
    pub elapsed: Duration,
}

impl fmt::Display for CaptureProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} frames kept, {} received, {:.2}s elapsed",
            self.frames_kept,
            self.target_frames,
            self.frames_received,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Fatal outcomes of a capture run.
///
/// Invalid frames are not listed here: they are recovered inside the
/// pacing loop and only show up in the stats.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),
    #[error("capture already executed")]
    AlreadyExecuted,
    #[error("frame source terminated early ({progress}): {reason}")]
    SourceTerminated {
        reason: String,
        progress: CaptureProgress,
    },
    #[error("failed to persist frame {index} ({progress}): {source}")]
    WriteFailure {
        index: usize,
        #[source]
        source: std::io::Error,
        progress: CaptureProgress,
    },
    #[error("encoder failed: {0}")]
    EncoderFailure(String),
}

impl CaptureError {
    /// Progress snapshot for run-terminating errors.
    pub fn progress(&self) -> Option<&CaptureProgress> {
        match self {
            CaptureError::SourceTerminated { progress, .. }
            | CaptureError::WriteFailure { progress, .. } => Some(progress),
            _ => None,
        }
    }
}
