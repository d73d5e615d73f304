pub mod capture_logger;
pub mod capture_screencast_use_case;
pub mod encode_handoff_use_case;
