use std::time::Duration;

pub const DEFAULT_FRAME_RATE: f64 = 40.0;
pub const DEFAULT_DURATION_SECS: f64 = 15.0;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1732;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Upper bound on in-flight writes in streaming mode.
pub const MAX_STREAM_PENDING_WRITES: usize = 8;

/// Writer threads never exceed this, whatever the pending-write bound.
pub const MAX_WRITE_WORKERS: usize = 4;

pub const FRAME_FILE_PREFIX: &str = "frame_";
pub const VIDEO_FILE_NAME: &str = "capture.mp4";
pub const RUN_DIR_PREFIX: &str = "capture_";
pub const DEFAULT_BASE_DIR: &str = "tmp";

/// Extensions picked up when replaying a directory of frames.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Default x264 CRF handed to the ffmpeg executable.
pub const DEFAULT_CRF: u32 = 18;

/// Throttle for progress log lines.
pub const PROGRESS_LOG_EVERY: usize = 25;

/// Grace period granted to a bridge process after it is asked to stop.
pub const BRIDGE_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
