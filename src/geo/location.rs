//! The single location value attached to a report.
//!
//! Whatever the user did last wins: typing a location discards a detected
//! fix, and a new detection replaces a typed location.

use super::position::{GeoFix, GeolocationError};

/// Validation failures when turning a choice into the submitted string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Please enter your location in the text field")]
    ManualEmpty,

    #[error("Location information is missing or invalid. Please try getting your location again or enter it manually.")]
    Missing,

    #[error("{}", .0.user_message())]
    Detection(GeolocationError),
}

/// How the report's location was obtained.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LocationChoice {
    #[default]
    Unset,
    Detected(GeoFix),
    Manual(String),
}

impl LocationChoice {
    pub fn is_unset(&self) -> bool {
        matches!(self, LocationChoice::Unset)
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, LocationChoice::Manual(_))
    }

    /// Replace whatever was chosen with a typed location.
    pub fn set_manual(&mut self, text: impl Into<String>) {
        *self = LocationChoice::Manual(text.into());
    }

    /// Replace whatever was chosen with a detected fix.
    pub fn set_detected(&mut self, fix: GeoFix) {
        *self = LocationChoice::Detected(fix);
    }

    pub fn clear(&mut self) {
        *self = LocationChoice::Unset;
    }

    /// The location string to submit.
    ///
    /// Manual text is trimmed and must not be empty. A detected fix yields
    /// its address, or `"lat,lng"` when no address was resolved.
    pub fn to_location_string(&self) -> Result<String, LocationError> {
        match self {
            LocationChoice::Unset => Err(LocationError::Missing),
            LocationChoice::Manual(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Err(LocationError::ManualEmpty)
                } else {
                    Ok(text.to_string())
                }
            }
            LocationChoice::Detected(fix) => Ok(fix.location_string()),
        }
    }

    /// Location string if one can be produced; `None` otherwise.
    pub fn location(&self) -> Option<String> {
        self.to_location_string().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinates;

    fn fix() -> GeoFix {
        GeoFix::new(Coordinates::new(19.076, 72.8777).unwrap())
    }

    #[test]
    fn test_unset_is_missing() {
        assert_eq!(LocationChoice::Unset.to_location_string(), Err(LocationError::Missing));
    }

    #[test]
    fn test_manual_is_trimmed_and_required() {
        let mut choice = LocationChoice::default();
        choice.set_manual("   ");
        assert_eq!(choice.to_location_string(), Err(LocationError::ManualEmpty));
        choice.set_manual("  Connaught Place, Delhi ");
        assert_eq!(choice.to_location_string().unwrap(), "Connaught Place, Delhi");
    }

    #[test]
    fn test_detected_without_address_uses_raw_coordinates() {
        let choice = LocationChoice::Detected(fix());
        assert_eq!(choice.to_location_string().unwrap(), "19.076,72.8777");
    }

    #[test]
    fn test_latest_action_wins() {
        let mut choice = LocationChoice::default();
        choice.set_detected(fix().with_address("Bandra, Mumbai"));
        choice.set_manual("Andheri East");
        assert!(choice.is_manual());
        assert_eq!(choice.location().as_deref(), Some("Andheri East"));

        choice.set_detected(fix().with_address("Bandra, Mumbai"));
        assert_eq!(choice.location().as_deref(), Some("Bandra, Mumbai"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LocationError::ManualEmpty.to_string(),
            "Please enter your location in the text field"
        );
        assert!(LocationError::Detection(GeolocationError::Timeout)
            .to_string()
            .contains("timed out"));
    }
}
