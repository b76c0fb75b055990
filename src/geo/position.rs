//! Position fixes and the sources that produce them.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Upper bound on a single position lookup.
pub const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default base URL of the approximate (IP based) lookup service.
pub const IP_LOOKUP_BASE_URL: &str = "http://ip-api.com";

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Validate and build a coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeolocationError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(GeolocationError::InvalidCoordinates);
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `"lat, lng"` with six decimals, used when no address is known.
    pub fn coordinate_string(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// A detected position, optionally enriched with an address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFix {
    pub coords: Coordinates,
    pub address: Option<String>,
}

impl GeoFix {
    pub fn new(coords: Coordinates) -> Self {
        Self { coords, address: None }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.address = if address.trim().is_empty() { None } else { Some(address) };
        self
    }

    /// The address when known, otherwise `"lat,lng"`.
    pub fn location_string(&self) -> String {
        match &self.address {
            Some(address) => address.clone(),
            None => self.coords.to_string(),
        }
    }
}

/// Why a position could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeolocationError {
    #[error("Location detection is not supported here")]
    Unsupported,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location information is unavailable")]
    Unavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location coordinates are missing or invalid")]
    InvalidCoordinates,
}

impl GeolocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            GeolocationError::Unsupported => {
                "Location detection is not supported on this device. Please enter your location manually."
            }
            GeolocationError::PermissionDenied => {
                "Location permission denied. Please enable location services in your browser settings."
            }
            GeolocationError::Unavailable => {
                "Location information is unavailable. Please try again or enter location manually."
            }
            GeolocationError::Timeout => {
                "Location request timed out. Please try again or enter location manually."
            }
            GeolocationError::InvalidCoordinates => {
                "Location information is missing or invalid. Please try getting your location again or enter it manually."
            }
        }
    }

    /// Every geolocation failure can be recovered from by typing a location.
    pub fn suggests_manual_entry(&self) -> bool {
        true
    }
}

/// Something that can report where the user is.
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

/// A position given up front, e.g. on the command line.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

#[async_trait::async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Ok(self.0)
    }
}

/// Source used when location detection is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPositionSource;

#[async_trait::async_trait]
impl PositionSource for NoPositionSource {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

/// Approximate position from the public IP address (ip-api.com format).
#[derive(Debug, Clone)]
pub struct IpGeolocation {
    base_url: String,
    http_client: reqwest::Client,
}

impl IpGeolocation {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_base_url(IP_LOOKUP_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_LOCATE_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl PositionSource for IpGeolocation {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        let url = format!("{}/json/", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", "status,message,lat,lon")])
            .send()
            .await
            .map_err(|e| {
                log::warn!("IP location lookup failed: {}", e);
                GeolocationError::Unavailable
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GeolocationError::PermissionDenied);
        }
        if !status.is_success() {
            log::warn!("IP location lookup returned {}", status);
            return Err(GeolocationError::Unavailable);
        }

        let body: IpLookupResponse = response.json().await.map_err(|e| {
            log::warn!("IP location lookup returned malformed JSON: {}", e);
            GeolocationError::Unavailable
        })?;

        if body.status != "success" {
            log::warn!(
                "IP location lookup failed: {}",
                body.message.as_deref().unwrap_or("unknown reason")
            );
            return Err(GeolocationError::Unavailable);
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
            _ => Err(GeolocationError::InvalidCoordinates),
        }
    }
}

/// Ask `source` for a position, giving up after `timeout`.
pub async fn locate(source: &dyn PositionSource, timeout: Duration) -> Result<Coordinates, GeolocationError> {
    match tokio::time::timeout(timeout, source.current_position()).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Location lookup timed out after {:?}", timeout);
            Err(GeolocationError::Timeout)
        }
    }
}
