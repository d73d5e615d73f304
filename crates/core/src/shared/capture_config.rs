use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_DURATION_SECS, DEFAULT_FRAME_RATE, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
    MAX_STREAM_PENDING_WRITES,
};
use super::error::CaptureError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Encoding the source is asked to produce frames in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg { .. } => "jpeg",
        }
    }
}

/// How kept frames reach storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Hold every frame in memory, write them all on flush.
    Buffered,
    /// Write each frame as it is kept, bounded by `max_pending_writes`.
    #[default]
    Streaming,
}

/// Parameters of one capture run. Immutable once the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub frame_rate: f64,
    pub duration_secs: f64,
    pub viewport: Viewport,
    pub image_format: ImageFormat,
    pub persistence_mode: PersistenceMode,
    pub max_pending_writes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            duration_secs: DEFAULT_DURATION_SECS,
            viewport: Viewport::default(),
            image_format: ImageFormat::Png,
            persistence_mode: PersistenceMode::default(),
            max_pending_writes: MAX_STREAM_PENDING_WRITES,
        }
    }
}

impl CaptureConfig {
    /// `round(frame_rate * duration_secs)`.
    pub fn target_frame_count(&self) -> usize {
        (self.frame_rate * self.duration_secs).round() as usize
    }

    /// Spacing between kept frames, rounded to whole nanoseconds.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos((1e9 / self.frame_rate).round().max(1.0) as u64)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(invalid(format!(
                "frame rate must be greater than 0, got {}",
                self.frame_rate
            )));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(invalid(format!(
                "duration must be greater than 0, got {}",
                self.duration_secs
            )));
        }
        if self.target_frame_count() == 0 {
            return Err(invalid(format!(
                "{} fps for {}s yields no frames",
                self.frame_rate, self.duration_secs
            )));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(invalid(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if let ImageFormat::Jpeg { quality } = self.image_format {
            if !(1..=100).contains(&quality) {
                return Err(invalid(format!(
                    "jpeg quality must be between 1 and 100, got {quality}"
                )));
            }
        }
        if self.max_pending_writes == 0 {
            return Err(invalid("max pending writes must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> CaptureError {
    CaptureError::InvalidConfig(message)
}
