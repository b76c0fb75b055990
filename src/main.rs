use clap::Parser;
use tracing_subscriber::EnvFilter;

use civic_reporter::cli::{self, Args, Command};
use civic_reporter::config::Config;

/// Load .env file, don't override existing env vars.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

/// Make a misconfigured server obvious at startup.
fn warn_missing_keys() {
    for var in [
        civic_reporter::analysis::GEMINI_API_KEY_ENV,
        civic_reporter::social::X_ACCESS_TOKEN_ENV,
    ] {
        if std::env::var(var).is_err() {
            log::warn!("{} environment variable not set.", var);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() {
    // .env may carry RUST_LOG, so it is read before the subscriber is built.
    load_env();
    init_logging();
    warn_missing_keys();

    let args = Args::parse();

    if let Command::Config { action } = args.command {
        if let Err(e) = cli::handle_config_action(action, args.config.as_deref()) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl+C ends a recording gracefully; the server keeps the default behaviour.
    if !matches!(args.command, Command::Serve { .. }) {
        if let Err(e) = cli::setup_ctrlc_handler() {
            log::warn!("Could not install Ctrl+C handler: {}", e);
        }
    }

    let result = match args.command {
        Command::Serve { bind } => cli::run_server(&config, bind).await,
        Command::Capture {
            mode,
            facing,
            output,
            duration,
        } => cli::run_capture(&config, mode, facing, output, duration).await,
        Command::Report(report) => cli::run_report(&config, report).await,
        Command::Config { .. } => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
