//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction, ReportArgs};
pub use commands::{
    build_analyzer, build_geocode_chain, build_twitter, capture_media, ctrlc_received, handle_config_action,
    run_capture, run_report, run_server, setup_ctrlc_handler, CommandError,
};
pub use enums::{Facing, Mode};
