pub mod encoding;
pub mod pacing;
pub mod persistence;
pub mod pipeline;
pub mod shared;
pub mod source;
