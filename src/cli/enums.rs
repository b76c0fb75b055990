//! CLI enum types for capture mode and camera facing.

use clap::ValueEnum;

use crate::camera::{CaptureMode, FacingMode};

/// Photo or video capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    #[default]
    Photo,
    Video,
}

impl From<Mode> for CaptureMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Photo => CaptureMode::Photo,
            Mode::Video => CaptureMode::Video,
        }
    }
}

/// Which camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Facing {
    #[default]
    Front,
    Back,
}

impl From<Facing> for FacingMode {
    fn from(f: Facing) -> Self {
        match f {
            Facing::Front => FacingMode::Front,
            Facing::Back => FacingMode::Back,
        }
    }
}
