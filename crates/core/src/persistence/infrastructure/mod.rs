pub mod buffered_frame_sink;
pub mod directory_frame_store;
pub mod memory_frame_store;
pub mod sink_factory;
pub mod streaming_frame_sink;
