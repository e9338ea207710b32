//! framelink demo host library — configuration and run loop shared
//! with the binary entry point.

pub mod config;
pub mod host;
