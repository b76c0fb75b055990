//! Report authoring: capture, fill in the form, analyze, post.
//!
//! Each network call is split into `begin_*` (validate, snapshot the
//! inputs, mark the operation pending) and `finish_*` (apply the result).
//! The snapshot carries the generation it was taken in; results for an
//! older generation are dropped, so a [`ReportFlow::reset`] while a request
//! is in flight never lets that request land in the fresh report.

use std::time::Duration;

use super::client::{ReportClient, ReportError};
use super::media::MediaFile;
use crate::analysis::AiResponse;
use crate::geo::{locate, GeoFix, GeolocationError, LocationChoice, PositionSource, ReverseGeocodeChain};
use crate::social::TweetResult;

/// Screen the report flow is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    Capture,
    Form,
    Processing,
    Result,
}

/// State of one asynchronous operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncOp<T, E> {
    Idle,
    Pending,
    Succeeded(T),
    Failed(E),
}

impl<T, E> Default for AsyncOp<T, E> {
    fn default() -> Self {
        AsyncOp::Idle
    }
}

impl<T, E> AsyncOp<T, E> {
    pub fn is_idle(&self) -> bool {
        matches!(self, AsyncOp::Idle)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AsyncOp::Pending)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            AsyncOp::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            AsyncOp::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn settle(&mut self, result: Result<T, E>) {
        *self = match result {
            Ok(value) => AsyncOp::Succeeded(value),
            Err(error) => AsyncOp::Failed(error),
        };
    }
}

/// Inputs of one analysis request, frozen when it was submitted.
#[derive(Debug, Clone)]
pub struct Submission {
    pub generation: u64,
    pub media: Option<MediaFile>,
    pub issue_text: String,
    pub location: String,
}

impl Submission {
    pub async fn send(&self, client: &ReportClient) -> Result<AiResponse, ReportError> {
        client
            .analyze_or_fallback(self.media.as_ref(), &self.issue_text, &self.location)
            .await
    }
}

/// Inputs of one post request.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub generation: u64,
    pub text: String,
    pub media: MediaFile,
}

impl PostRequest {
    pub async fn send(&self, client: &ReportClient) -> Result<TweetResult, ReportError> {
        client.post_tweet(&self.text, &self.media).await
    }
}

/// Everything the user has entered for one report.
#[derive(Debug, Default)]
pub struct ReportFlow {
    step: Step,
    media: Option<MediaFile>,
    issue_text: String,
    location: LocationChoice,
    location_error: Option<String>,
    error: Option<String>,
    locating: AsyncOp<GeoFix, GeolocationError>,
    analysis: AsyncOp<AiResponse, ReportError>,
    posting: AsyncOp<TweetResult, ReportError>,
    generation: u64,
    locate_ticket: u64,
}

impl ReportFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn media(&self) -> Option<&MediaFile> {
        self.media.as_ref()
    }

    pub fn issue_text(&self) -> &str {
        &self.issue_text
    }

    pub fn location(&self) -> &LocationChoice {
        &self.location
    }

    /// Message shown under the location field.
    pub fn location_error(&self) -> Option<&str> {
        self.location_error.as_deref()
    }

    /// Message shown in the general error area.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn locating(&self) -> &AsyncOp<GeoFix, GeolocationError> {
        &self.locating
    }

    pub fn analysis(&self) -> &AsyncOp<AiResponse, ReportError> {
        &self.analysis
    }

    pub fn posting(&self) -> &AsyncOp<TweetResult, ReportError> {
        &self.posting
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Attach a capture or picked file and move on to the form.
    pub fn attach_media(&mut self, media: MediaFile) {
        log::info!("Attached {} ({} bytes)", media.file_name, media.len());
        self.media = Some(media);
        self.error = None;
        self.step = Step::Form;
    }

    /// Drop the attached media and return to the capture screen.
    pub fn back_to_capture(&mut self) {
        self.media = None;
        self.step = Step::Capture;
    }

    pub fn set_issue_text(&mut self, text: impl Into<String>) {
        self.issue_text = text.into();
    }

    /// Switch to a typed location. Any detection still in flight is ignored.
    pub fn set_manual_location(&mut self, text: impl Into<String>) {
        self.locate_ticket += 1;
        self.location.set_manual(text);
        self.locating = AsyncOp::Idle;
        self.location_error = None;
    }

    /// Start a position lookup; returns the ticket to finish it with.
    pub fn begin_locate(&mut self) -> u64 {
        self.locate_ticket += 1;
        self.locating = AsyncOp::Pending;
        self.location_error = None;
        self.locate_ticket
    }

    /// Apply a lookup result. Returns `false` if the result was stale.
    ///
    /// `warning` is shown even on success, e.g. when the address fell back
    /// to raw coordinates because of a geocoding key problem.
    pub fn finish_locate(&mut self, ticket: u64, result: Result<GeoFix, GeolocationError>, warning: Option<String>) -> bool {
        if ticket != self.locate_ticket {
            log::debug!("Ignoring stale location result (ticket {} != {})", ticket, self.locate_ticket);
            return false;
        }
        match &result {
            Ok(fix) => {
                log::info!("Location detected: {}", fix.location_string());
                self.location.set_detected(fix.clone());
                self.location_error = warning;
            }
            Err(e) => {
                log::warn!("Location detection failed: {}", e);
                self.location_error = Some(e.user_message().to_string());
            }
        }
        self.locating.settle(result);
        true
    }

    /// Detect the position and resolve it to an address.
    pub async fn detect_location(&mut self, source: &dyn PositionSource, geocoder: &ReverseGeocodeChain, timeout: Duration) {
        let ticket = self.begin_locate();
        let (result, warning) = match locate(source, timeout).await {
            Ok(coords) => {
                let resolved = geocoder.resolve(coords).await;
                (Ok(GeoFix::new(coords).with_address(resolved.label)), resolved.warning)
            }
            Err(e) => (Err(e), None),
        };
        self.finish_locate(ticket, result, warning);
    }

    /// Validate the form and snapshot it for analysis.
    pub fn begin_submit(&mut self) -> Result<Submission, ReportError> {
        self.location_error = None;
        self.error = None;

        let Some(media) = self.media.clone() else {
            self.step = Step::Capture;
            return Err(ReportError::Media("Please capture or choose a photo or video first".to_string()));
        };

        let location = match self.location.to_location_string() {
            Ok(location) => location,
            Err(e) => {
                self.location_error = Some(e.to_string());
                return Err(e.into());
            }
        };

        self.generation += 1;
        self.step = Step::Processing;
        self.analysis = AsyncOp::Pending;

        Ok(Submission {
            generation: self.generation,
            media: Some(media),
            issue_text: self.issue_text.trim().to_string(),
            location,
        })
    }

    /// Apply an analysis result. Returns `false` if it was stale.
    pub fn finish_submit(&mut self, generation: u64, result: Result<AiResponse, ReportError>) -> bool {
        if generation != self.generation || self.step != Step::Processing {
            log::debug!("Ignoring stale analysis result (generation {})", generation);
            return false;
        }
        match &result {
            Ok(response) => {
                log::info!("Analysis complete: {}", response.detected_issue);
                self.step = Step::Result;
            }
            Err(e) => {
                log::error!("Error processing report: {}", e);
                if e.is_location_error() {
                    self.location_error = Some(e.to_string());
                } else {
                    self.error = Some(e.user_message());
                }
                self.step = Step::Form;
            }
        }
        self.analysis.settle(result);
        true
    }

    /// Submit the report and wait for the analysis.
    pub async fn submit(&mut self, client: &ReportClient) -> Result<AiResponse, ReportError> {
        let submission = self.begin_submit()?;
        let result = submission.send(client).await;
        self.finish_submit(submission.generation, result.clone());
        result
    }

    /// Posting needs both an analysis result and media.
    pub fn can_post(&self) -> bool {
        self.analysis.value().is_some() && self.media.is_some()
    }

    pub fn begin_post(&mut self) -> Result<PostRequest, ReportError> {
        let (Some(response), Some(media)) = (self.analysis.value(), self.media.as_ref()) else {
            return Err(ReportError::NothingToPost);
        };
        let request = PostRequest {
            generation: self.generation,
            text: response.final_tweet.clone(),
            media: media.clone(),
        };
        self.posting = AsyncOp::Pending;
        Ok(request)
    }

    /// Apply a post result. Returns `false` if it was stale.
    pub fn finish_post(&mut self, generation: u64, result: Result<TweetResult, ReportError>) -> bool {
        if generation != self.generation {
            log::debug!("Ignoring stale post result (generation {})", generation);
            return false;
        }
        match &result {
            Ok(tweet) => log::info!("Tweet posted: {}", tweet.tweet_url.as_deref().unwrap_or("")),
            Err(e) => {
                log::error!("Error posting tweet: {}", e);
                self.error = Some(e.to_string());
            }
        }
        self.posting.settle(result);
        true
    }

    pub async fn post(&mut self, client: &ReportClient) -> Result<TweetResult, ReportError> {
        let request = self.begin_post()?;
        let result = request.send(client).await;
        self.finish_post(request.generation, result.clone());
        result
    }

    /// Start over. Requests still in flight will be ignored.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        let locate_ticket = self.locate_ticket + 1;
        *self = Self {
            generation,
            locate_ticket,
            ..Self::default()
        };
    }
}
