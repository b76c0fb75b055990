//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{Facing, Mode};

/// Photograph or film a civic issue, get an AI-drafted report and post it
#[derive(Parser, Debug)]
#[command(name = "civic-reporter")]
#[command(version, about = "Report civic issues with AI-drafted tweets", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the analysis and posting server
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Take a photo or record a video with the camera
    Capture {
        /// Photo or video
        #[arg(long, short, default_value = "photo")]
        mode: Mode,

        /// Which camera to use
        #[arg(long, short, default_value = "front")]
        facing: Facing,

        /// Output file (default: the capture's own file name)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Stop a video recording after this many seconds (default: Ctrl+C)
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Analyze a report and optionally post it
    Report(ReportArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Photo or video to attach
    #[arg(long, short, conflicts_with = "capture")]
    pub media: Option<PathBuf>,

    /// Take a photo with the camera instead of using a file
    #[arg(long)]
    pub capture: bool,

    /// Description of the issue
    #[arg(long, short)]
    pub text: Option<String>,

    /// Location typed by hand
    #[arg(long, short, conflicts_with_all = ["lat", "detect"])]
    pub location: Option<String>,

    /// Latitude of a known position (requires --lng)
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude of a known position (requires --lat)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lng: Option<f64>,

    /// Detect an approximate position from the network
    #[arg(long, conflicts_with = "lat")]
    pub detect: bool,

    /// Server URL (overrides report.server_url)
    #[arg(long)]
    pub server: Option<String>,

    /// Post the drafted tweet
    #[arg(long)]
    pub post: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let args = Args::parse_from(["civic-reporter", "serve"]);
        assert!(args.config.is_none());
        assert!(matches!(args.command, Command::Serve { bind: None }));
    }

    #[test]
    fn test_capture_defaults() {
        let args = Args::parse_from(["civic-reporter", "capture"]);
        match args.command {
            Command::Capture {
                mode,
                facing,
                output,
                duration,
            } => {
                assert_eq!(mode, Mode::Photo);
                assert_eq!(facing, Facing::Front);
                assert!(output.is_none());
                assert!(duration.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_capture_video_back() {
        let args = Args::parse_from(["civic-reporter", "capture", "-m", "video", "-f", "back", "--duration", "5"]);
        match args.command {
            Command::Capture {
                mode, facing, duration, ..
            } => {
                assert_eq!(mode, Mode::Video);
                assert_eq!(facing, Facing::Back);
                assert_eq!(duration, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_report_manual_location() {
        let args = Args::parse_from([
            "civic-reporter",
            "report",
            "--media",
            "pothole.jpg",
            "--location",
            "Connaught Place, Delhi",
            "--post",
        ]);
        match args.command {
            Command::Report(report) => {
                assert_eq!(report.media, Some(PathBuf::from("pothole.jpg")));
                assert_eq!(report.location.as_deref(), Some("Connaught Place, Delhi"));
                assert!(report.post);
                assert!(!report.detect);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_report_coordinates_need_both() {
        assert!(Args::try_parse_from(["civic-reporter", "report", "--lat", "28.63"]).is_err());
        let args = Args::try_parse_from(["civic-reporter", "report", "--lat", "-33.86", "--lng", "151.2"]).unwrap();
        match args.command {
            Command::Report(report) => {
                assert_eq!(report.lat, Some(-33.86));
                assert_eq!(report.lng, Some(151.2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_report_location_conflicts() {
        assert!(Args::try_parse_from(["civic-reporter", "report", "--location", "Pune", "--detect"]).is_err());
        assert!(Args::try_parse_from(["civic-reporter", "report", "--media", "a.jpg", "--capture"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let args = Args::parse_from(["civic-reporter", "config", "show", "--config", "/tmp/c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
    }
}
