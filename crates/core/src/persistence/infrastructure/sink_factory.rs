use std::sync::Arc;

use crate::persistence::domain::frame_sink::FrameSink;
use crate::persistence::domain::frame_store::FrameStore;
use crate::shared::capture_config::{CaptureConfig, PersistenceMode};

use super::buffered_frame_sink::BufferedFrameSink;
use super::streaming_frame_sink::StreamingFrameSink;

/// Creates the sink for the configured persistence mode.
pub fn create_sink(config: &CaptureConfig, store: Arc<dyn FrameStore>) -> Box<dyn FrameSink> {
    match config.persistence_mode {
        PersistenceMode::Buffered => {
            log::info!("Using buffered persistence (frames written on flush)");
            Box::new(BufferedFrameSink::new(store, config.image_format))
        }
        PersistenceMode::Streaming => {
            log::info!(
                "Using streaming persistence (max_pending_writes={})",
                config.max_pending_writes
            );
            Box::new(StreamingFrameSink::new(
                store,
                config.image_format,
                config.max_pending_writes,
            ))
        }
    }
}
