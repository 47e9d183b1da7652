//! Videotool - decode and re-encode video through supervised pipelines
//!
//! This library crate exposes the configuration, stage backends and encode
//! job used by the binary.

pub mod backends;
pub mod config;
pub mod encode;
