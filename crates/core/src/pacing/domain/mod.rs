pub mod completion_gate;
pub mod frame_validator;
pub mod pacer;
