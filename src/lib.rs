//! civic-reporter library crate.
//!
//! Capture a civic issue on camera, locate it, have it analyzed by Gemini
//! and post the drafted tweet to X.

pub mod analysis;
pub mod camera;
pub mod cli;
pub mod config;
pub mod geo;
pub mod report;
pub mod server;
pub mod social;
