//! Geolocation: position sources, reverse geocoding and the report's
//! location choice.

mod geocode;
mod location;
mod position;

pub use geocode::{
    AddressSource, GeocodeError, GoogleGeocoder, NominatimGeocoder, ResolvedAddress, ReverseGeocodeChain,
    ReverseGeocoder, DEFAULT_LANGUAGE, DEFAULT_REGION, GOOGLE_GEOCODE_BASE_URL, GOOGLE_MAPS_API_KEY_ENV,
    NOMINATIM_BASE_URL,
};
pub use location::{LocationChoice, LocationError};
pub use position::{
    locate, Coordinates, FixedPosition, GeoFix, GeolocationError, IpGeolocation, NoPositionSource, PositionSource,
    DEFAULT_LOCATE_TIMEOUT, IP_LOOKUP_BASE_URL,
};
