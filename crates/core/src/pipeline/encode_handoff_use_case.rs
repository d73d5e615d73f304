use std::path::{Path, PathBuf};

use crate::encoding::domain::sequence_encoder::SequenceEncoder;
use crate::pipeline::capture_screencast_use_case::CaptureReport;
use crate::shared::error::CaptureError;

/// Hands a completed capture to the encoder at its achieved frame rate.
///
/// The achieved rate, not the configured one, is declared as the input
/// rate so playback duration matches the wall-clock duration of the capture.
pub struct EncodeHandoffUseCase {
    encoder: Box<dyn SequenceEncoder>,
}

impl EncodeHandoffUseCase {
    pub fn new(encoder: Box<dyn SequenceEncoder>) -> Self {
        Self { encoder }
    }

    pub fn execute(&self, report: &CaptureReport, output: &Path) -> Result<PathBuf, CaptureError> {
        let frame_rate = report.stats.achieved_frame_rate;
        if report.sequence.frame_count() == 0 {
            return Err(CaptureError::EncoderFailure(
                "no frames were captured".to_string(),
            ));
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(CaptureError::EncoderFailure(format!(
                "achieved frame rate {frame_rate} is not usable"
            )));
        }

        log::info!(
            "Encoding {} frames at achieved {frame_rate:.2} fps",
            report.sequence.frame_count()
        );
        self.encoder
            .encode(&report.sequence, frame_rate, output)
            .map_err(|e| CaptureError::EncoderFailure(e.to_string()))?;
        Ok(output.to_path_buf())
    }
}
