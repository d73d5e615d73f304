pub mod replay_frame_source;
pub mod screencast_bridge_source;
pub mod source_adapter;
