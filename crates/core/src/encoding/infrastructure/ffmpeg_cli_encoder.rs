use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::encoding::domain::sequence_encoder::{EncoderError, SequenceEncoder};
use crate::shared::constants::DEFAULT_CRF;
use crate::shared::persisted_sequence::PersistedSequence;

/// Lines of ffmpeg stderr kept in an error message.
const STDERR_TAIL_LINES: usize = 5;

/// Encodes an on-disk sequence to H.264 by running the `ffmpeg` executable.
pub struct FfmpegCliEncoder {
    program: OsString,
    crf: u32,
}

impl FfmpegCliEncoder {
    pub fn new() -> Self {
        Self {
            program: OsString::from("ffmpeg"),
            crf: DEFAULT_CRF,
        }
    }

    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_crf(mut self, crf: u32) -> Self {
        self.crf = crf;
        self
    }

    /// Returns true if the configured program runs `-version` successfully.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    pub fn build_args(&self, input_pattern: &Path, frame_rate: f64, output: &Path) -> Vec<OsString> {
        let rate = format!("{frame_rate:.3}");
        let crf = self.crf.to_string();

        let mut args: Vec<OsString> = ["-framerate", rate.as_str(), "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input_pattern.as_os_str().to_owned());
        args.extend(
            [
                "-c:v", "libx264", "-profile:v", "high", "-pix_fmt", "yuv420p",
                "-preset", "slow", "-crf", crf.as_str(),
                "-b:v", "5000k", "-maxrate", "5000k", "-bufsize", "10000k",
                "-r", rate.as_str(), "-an", "-movflags", "+faststart", "-y",
            ]
            .iter()
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl Default for FfmpegCliEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceEncoder for FfmpegCliEncoder {
    fn encode(
        &self,
        sequence: &PersistedSequence,
        frame_rate: f64,
        output: &Path,
    ) -> Result<(), EncoderError> {
        let pattern = sequence
            .input_pattern()
            .ok_or("in-memory sequences cannot be encoded by ffmpeg")?;
        if sequence.frame_count() == 0 {
            return Err("sequence has no frames".into());
        }

        let args = self.build_args(&pattern, frame_rate, output);
        log::info!(
            "Encoding {} frames at {frame_rate:.2} fps to {}",
            sequence.frame_count(),
            output.display()
        );
        log::debug!("{} {:?}", self.program.to_string_lossy(), args);

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.program.to_string_lossy()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(format!("ffmpeg exited with {}: {tail}", result.status).into());
        }
        Ok(())
    }
}
