pub mod frame_sink;
pub mod frame_store;
