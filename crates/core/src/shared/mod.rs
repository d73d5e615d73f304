pub mod capture_config;
pub mod capture_stats;
pub mod constants;
pub mod error;
pub mod frame;
pub mod persisted_sequence;
