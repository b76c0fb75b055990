//! Reverse geocoding with a fallback chain.
//!
//! Each configured geocoder is tried in order. When all of them fail the
//! formatted coordinate string is used, so resolution always yields a
//! non-empty label.

use std::time::Duration;

use serde::Deserialize;

use super::position::Coordinates;

/// Environment variable holding the Google Maps key.
pub const GOOGLE_MAPS_API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

pub const GOOGLE_GEOCODE_BASE_URL: &str = "https://maps.googleapis.com";

pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

pub const DEFAULT_LANGUAGE: &str = "en";

pub const DEFAULT_REGION: &str = "in";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("civic-reporter/", env!("CARGO_PKG_VERSION"));

/// Why a single geocoder could not produce an address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeocodeError {
    #[error("Geocoding API key rejected: {0}")]
    ApiKey(String),

    #[error("Network error while geocoding: {0}")]
    Network(String),

    #[error("Geocoding request failed with status {status}")]
    Http { status: u16 },

    #[error("No address found for these coordinates")]
    NoResults,

    #[error("Unexpected geocoding response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GeocodeError::Malformed(e.to_string())
        } else {
            GeocodeError::Network(e.to_string())
        }
    }
}

impl GeocodeError {
    /// Warning to show when this failure forced a coordinate fallback.
    ///
    /// Only key and network problems are worth telling the user about.
    pub fn user_warning(&self) -> Option<&'static str> {
        match self {
            GeocodeError::ApiKey(_) => {
                Some("Google Maps API key is invalid or restricted. Using coordinates instead.")
            }
            GeocodeError::Network(_) => Some("Network error while getting address. Using coordinates instead."),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn reverse(&self, coords: Coordinates) -> Result<String, GeocodeError>;
}

fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

#[derive(Debug, Deserialize)]
struct GoogleGeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleGeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleGeocodeResult {
    formatted_address: String,
}

/// Google Geocoding API client, asking for rooftop precision.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    api_key: String,
    base_url: String,
    language: String,
    region: String,
    http_client: reqwest::Client,
}

impl GoogleGeocoder {
    pub fn new(api_key: String) -> Result<Self, GeocodeError> {
        Self::with_base_url(api_key, GOOGLE_GEOCODE_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GeocodeError> {
        if api_key.is_empty() {
            return Err(GeocodeError::ApiKey("no API key configured".to_string()));
        }
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            region: DEFAULT_REGION.to_string(),
            http_client: build_http_client()?,
        })
    }

    pub fn with_locale(mut self, language: impl Into<String>, region: impl Into<String>) -> Self {
        self.language = language.into();
        self.region = region.into();
        self
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for GoogleGeocoder {
    fn name(&self) -> &str {
        "google"
    }

    async fn reverse(&self, coords: Coordinates) -> Result<String, GeocodeError> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let latlng = format!("{},{}", coords.latitude(), coords.longitude());

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("latlng", latlng.as_str()),
                ("key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("region", self.region.as_str()),
                ("location_type", "ROOFTOP"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Http {
                status: response.status().as_u16(),
            });
        }

        let body: GoogleGeocodeResponse = response.json().await?;
        let detail = body.error_message.unwrap_or_default();
        match body.status.as_str() {
            "OK" => body
                .results
                .into_iter()
                .map(|r| r.formatted_address)
                .find(|a| !a.trim().is_empty())
                .ok_or(GeocodeError::NoResults),
            "ZERO_RESULTS" => Err(GeocodeError::NoResults),
            "REQUEST_DENIED" | "OVER_DAILY_LIMIT" => Err(GeocodeError::ApiKey(format!(
                "{} {}",
                body.status, detail
            )
            .trim()
            .to_string())),
            other => Err(GeocodeError::Malformed(format!("{} {}", other, detail).trim().to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Direct HTTP lookup against an OpenStreetMap Nominatim instance.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    language: String,
    http_client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self, GeocodeError> {
        Self::with_base_url(NOMINATIM_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, GeocodeError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            http_client: build_http_client()?,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(&self, coords: Coordinates) -> Result<String, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let lat = coords.latitude().to_string();
        let lon = coords.longitude().to_string();

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("accept-language", self.language.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Http {
                status: response.status().as_u16(),
            });
        }

        let body: NominatimResponse = response.json().await?;
        if let Some(error) = body.error {
            log::debug!("Nominatim returned error: {}", error);
            return Err(GeocodeError::NoResults);
        }
        body.display_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(GeocodeError::NoResults)
    }
}

/// Where a resolved label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    /// The first geocoder in the chain
    Primary,
    /// A later geocoder in the chain
    Fallback,
    /// Nothing answered; the label is the coordinate string
    Coordinates,
}

/// Outcome of reverse geocoding. `label` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub label: String,
    pub source: AddressSource,
    /// Set when a key or network problem forced the coordinate fallback
    pub warning: Option<String>,
}

impl ResolvedAddress {
    /// True when the user should be nudged towards typing a location.
    pub fn suggests_manual_entry(&self) -> bool {
        self.source == AddressSource::Coordinates && self.warning.is_some()
    }
}

/// Ordered list of geocoders ending in the coordinate string.
#[derive(Default)]
pub struct ReverseGeocodeChain {
    geocoders: Vec<Box<dyn ReverseGeocoder>>,
}

impl std::fmt::Debug for ReverseGeocodeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.geocoders.iter().map(|g| g.name()).collect();
        f.debug_struct("ReverseGeocodeChain").field("geocoders", &names).finish()
    }
}

impl ReverseGeocodeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, geocoder: impl ReverseGeocoder + 'static) -> Self {
        self.geocoders.push(Box::new(geocoder));
        self
    }

    pub fn push(&mut self, geocoder: Box<dyn ReverseGeocoder>) {
        self.geocoders.push(geocoder);
    }

    pub fn len(&self) -> usize {
        self.geocoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geocoders.is_empty()
    }

    /// Resolve `coords` to a label, trying each geocoder in turn.
    pub async fn resolve(&self, coords: Coordinates) -> ResolvedAddress {
        let mut warning = None;

        for (index, geocoder) in self.geocoders.iter().enumerate() {
            match geocoder.reverse(coords).await {
                Ok(label) if !label.trim().is_empty() => {
                    log::debug!("Resolved {} via {}", coords, geocoder.name());
                    let source = if index == 0 {
                        AddressSource::Primary
                    } else {
                        AddressSource::Fallback
                    };
                    return ResolvedAddress {
                        label,
                        source,
                        warning: None,
                    };
                }
                Ok(_) => log::warn!("{} geocoder returned an empty address", geocoder.name()),
                Err(e) => {
                    log::warn!("{} geocoder failed: {}", geocoder.name(), e);
                    if warning.is_none() {
                        warning = e.user_warning().map(str::to_string);
                    }
                }
            }
        }

        log::info!("Using coordinates for {}", coords);
        ResolvedAddress {
            label: coords.coordinate_string(),
            source: AddressSource::Coordinates,
            warning,
        }
    }
}
