//! Subcommand handlers for serve, capture, report and config.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::args::{ConfigAction, ReportArgs};
use super::enums::{Facing, Mode};
use crate::analysis::{Analyzer, GeminiClient, RetryPolicy};
use crate::camera::{
    CaptureController, CaptureError, CaptureMode, CapturedMedia, FacingMode, FfmpegDevices, FfmpegEncoderBackend,
};
use crate::config::{self, Config, ConfigError};
use crate::geo::{
    Coordinates, FixedPosition, GeolocationError, GoogleGeocoder, IpGeolocation, NominatimGeocoder,
    PositionSource, ReverseGeocodeChain, GOOGLE_MAPS_API_KEY_ENV,
};
use crate::report::{MediaFile, ReportClient, ReportError, ReportFlow};
use crate::server::{self, AppState, ServerError};
use crate::social::{TwitterClient, TwitterError};

static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler. Call once at startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if CTRLC_RECEIVED.swap(true, Ordering::SeqCst) {
            // Second Ctrl+C: give up on a graceful stop.
            std::process::exit(130);
        }
        eprintln!("\nReceived Ctrl+C, stopping...");
    })
}

/// How long to wait for the first frame before giving up on a photo.
const PHOTO_FRAME_WAIT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("{0}")]
    Capture(String),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Geolocation(#[from] GeolocationError),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<(), CommandError> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(config::default_path);
    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path))?;
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found, showing defaults)", config_path.display());
            }
            for var in [
                crate::analysis::GEMINI_API_KEY_ENV,
                crate::social::X_ACCESS_TOKEN_ENV,
                GOOGLE_MAPS_API_KEY_ENV,
            ] {
                let state = if std::env::var(var).is_ok() { "set" } else { "not set" };
                println!("# {}: {}", var, state);
            }
            println!();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init => {
            config::init_config(&config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}

/// Build the analyzer from `GEMINI_API_KEY` and the `[gemini]` section.
pub fn build_analyzer(config: &Config) -> Analyzer {
    let api_key = match std::env::var(crate::analysis::GEMINI_API_KEY_ENV) {
        Ok(key) if !key.is_empty() => key,
        _ => return Analyzer::new(None),
    };
    let retry = RetryPolicy {
        max_retries: config.gemini.max_retries,
        ..RetryPolicy::default()
    };
    match GeminiClient::with_base_url(api_key, config.gemini.base_url.clone()) {
        Ok(client) => Analyzer::new(Some(
            client.with_model(config.gemini.model.clone()).with_retry_policy(retry),
        )),
        Err(e) => {
            log::error!("Failed to create Gemini client: {}", e);
            Analyzer::new(None)
        }
    }
}

/// Build the X client from `X_ACCESS_TOKEN` and the `[twitter]` section.
pub fn build_twitter(config: &Config) -> Option<TwitterClient> {
    let token = std::env::var(crate::social::X_ACCESS_TOKEN_ENV).ok()?;
    match TwitterClient::with_base_url(token, config.twitter.base_url.clone()) {
        Ok(client) => Some(client),
        Err(TwitterError::MissingToken) => None,
        Err(e) => {
            log::error!("Failed to create X client: {}", e);
            None
        }
    }
}

/// Google (when a key is set), then Nominatim, then coordinates.
pub fn build_geocode_chain(config: &Config) -> ReverseGeocodeChain {
    let mut chain = ReverseGeocodeChain::new();
    let geo = &config.geocoding;

    match std::env::var(GOOGLE_MAPS_API_KEY_ENV) {
        Ok(key) if !key.is_empty() => match GoogleGeocoder::new(key) {
            Ok(google) => chain.push(Box::new(google.with_locale(geo.language.clone(), geo.region.clone()))),
            Err(e) => log::warn!("Google geocoder unavailable: {}", e),
        },
        _ => log::warn!("{} is not set; skipping Google geocoding", GOOGLE_MAPS_API_KEY_ENV),
    }

    match NominatimGeocoder::with_base_url(geo.nominatim_url.clone()) {
        Ok(nominatim) => chain.push(Box::new(nominatim.with_language(geo.language.clone()))),
        Err(e) => log::warn!("Nominatim geocoder unavailable: {}", e),
    }

    chain
}

/// Run the HTTP server until the process is stopped.
pub async fn run_server(config: &Config, bind: Option<String>) -> Result<(), CommandError> {
    let addr = match bind {
        Some(bind) => bind.parse().map_err(|_| ConfigError::InvalidValue {
            key: "--bind",
            value: bind.clone(),
        })?,
        None => config.bind_addr()?,
    };
    let state = Arc::new(AppState::new(build_analyzer(config), build_twitter(config)));
    server::serve(addr, state, config.body_limit()).await?;
    Ok(())
}

fn capture_error(controller: &CaptureController, error: CaptureError) -> CommandError {
    let message = controller
        .error_message()
        .unwrap_or_else(|| error.user_message(controller.locale()));
    CommandError::Capture(message)
}

/// Open the camera, take a photo or record until Ctrl+C / `duration`.
pub async fn capture_media(
    config: &Config,
    mode: Mode,
    facing: Facing,
    duration: Option<Duration>,
) -> Result<CapturedMedia, CommandError> {
    let camera = &config.camera;
    let devices = FfmpegDevices::new(
        camera.ffmpeg.clone(),
        camera.device(FacingMode::Front),
        camera.device(FacingMode::Back),
    )
    .with_input_format(camera.input_format());
    let encoder = FfmpegEncoderBackend::new(camera.ffmpeg.clone());

    let mut controller = CaptureController::mount(Arc::new(devices), Arc::new(encoder), config.capture_settings()).await;

    if FacingMode::from(facing) != controller.facing() {
        controller
            .toggle_facing()
            .await
            .map_err(|e| capture_error(&controller, e))?;
    }
    if CaptureMode::from(mode) != controller.mode() {
        controller.toggle_mode().await.map_err(|e| capture_error(&controller, e))?;
    }
    if !controller.is_ready() {
        let message = controller
            .error_message()
            .unwrap_or_else(|| CaptureError::NotReady.user_message(controller.locale()));
        return Err(CommandError::Capture(message));
    }

    match mode {
        Mode::Photo => {
            let deadline = tokio::time::Instant::now() + PHOTO_FRAME_WAIT;
            loop {
                if let Some(photo) = controller.capture_photo().map_err(|e| capture_error(&controller, e))? {
                    return Ok(photo);
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(capture_error(&controller, CaptureError::NotReady));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        Mode::Video => record_video(&mut controller, duration).await,
    }
}

async fn record_video(controller: &mut CaptureController, duration: Option<Duration>) -> Result<CapturedMedia, CommandError> {
    controller.start_recording().map_err(|e| capture_error(controller, e))?;
    match duration {
        Some(d) => eprintln!("Recording for {}s (Ctrl+C to stop early)", d.as_secs()),
        None => eprintln!("Recording... press Ctrl+C to stop"),
    }

    let started = tokio::time::Instant::now();
    let mut shown = u64::MAX;
    loop {
        if let Some(result) = controller.poll() {
            eprintln!();
            return result.map_err(|e| capture_error(controller, e));
        }
        if ctrlc_received() || duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        let elapsed = controller.elapsed_secs();
        if elapsed != shown {
            shown = elapsed;
            eprint!("\r● REC {}", controller.elapsed_display());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    eprintln!();
    let video = controller
        .stop_recording()
        .await
        .map_err(|e| capture_error(controller, e))?;
    if let Some(warning) = controller.error_message() {
        eprintln!("Warning: {}", warning);
    }
    Ok(video)
}

/// `capture` subcommand: write the capture to `output`.
pub async fn run_capture(
    config: &Config,
    mode: Mode,
    facing: Facing,
    output: Option<PathBuf>,
    duration: Option<u64>,
) -> Result<(), CommandError> {
    let media = capture_media(config, mode, facing, duration.map(Duration::from_secs)).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(media.file_name()));
    std::fs::write(&path, media.payload()).map_err(|source| CommandError::Write {
        path: path.clone(),
        source,
    })?;
    println!("Saved {} ({}, {} bytes) to {}", media.kind(), media.mime_type(), media.len(), path.display());
    Ok(())
}

fn position_source(config: &Config, args: &ReportArgs) -> Result<Option<Box<dyn PositionSource>>, CommandError> {
    if let (Some(lat), Some(lng)) = (args.lat, args.lng) {
        return Ok(Some(Box::new(FixedPosition(Coordinates::new(lat, lng)?))));
    }
    if args.detect {
        let source = IpGeolocation::with_base_url(config.geocoding.ip_lookup_url.clone())
            .map_err(|_| GeolocationError::Unsupported)?;
        return Ok(Some(Box::new(source)));
    }
    Ok(None)
}

/// `report` subcommand: attach media, set the location, analyze and
/// optionally post.
pub async fn run_report(config: &Config, args: ReportArgs) -> Result<(), CommandError> {
    let mut flow = ReportFlow::new();

    let media = match (&args.media, args.capture) {
        (Some(path), _) => MediaFile::from_path(path)?,
        (None, true) => MediaFile::from(capture_media(config, Mode::Photo, Facing::Back, None).await?),
        (None, false) => {
            return Err(ReportError::Media("Pass --media PATH or --capture to attach a photo or video".to_string()).into())
        }
    };
    flow.attach_media(media);

    if let Some(text) = &args.text {
        flow.set_issue_text(text.clone());
    }

    if let Some(location) = &args.location {
        flow.set_manual_location(location.clone());
    } else if let Some(source) = position_source(config, &args)? {
        let chain = build_geocode_chain(config);
        flow.detect_location(source.as_ref(), &chain, config.locate_timeout()).await;
        if let Some(message) = flow.location_error() {
            eprintln!("Location: {}", message);
        }
    }

    let server_url = args.server.clone().unwrap_or_else(|| config.report.server_url.clone());
    let client = ReportClient::new(server_url)?;

    eprintln!("Analyzing report...");
    let response = match flow.submit(&client).await {
        Ok(response) => response,
        Err(e) => {
            if let Some(message) = flow.location_error() {
                eprintln!("Location: {}", message);
            }
            return Err(e.into());
        }
    };

    println!("Issue:       {}", response.detected_issue);
    println!("Location:    {}", response.location_detected);
    println!("Authority:   {}", response.responsible_authority);
    println!("Handles:     {}", response.twitter_handles.join(" "));
    println!("Hashtags:    {}", response.hashtags.join(" "));
    println!();
    println!("{}", response.final_tweet);
    println!("({} characters)", response.tweet_len());

    if args.post {
        eprintln!("Posting tweet...");
        let result = flow.post(&client).await?;
        if let Some(url) = result.tweet_url {
            println!("Tweet posted: {}", url);
        }
    }
    Ok(())
}
