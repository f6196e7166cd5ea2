pub mod config;
pub mod language;
pub mod redis;
pub mod types;
