//! Structured analysis result and its deterministic fallbacks.

use serde::{Deserialize, Serialize};

const DEFAULT_AUTHORITY: &str = "Local Municipal Corporation";

const DEFAULT_HANDLES: [&str; 2] = ["@SwachhBharat", "@MyGovIndia"];

/// What the model (or a fallback) says about a reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiResponse {
    #[serde(default)]
    pub detected_issue: String,
    #[serde(default)]
    pub location_detected: String,
    #[serde(default)]
    pub responsible_authority: String,
    #[serde(default)]
    pub twitter_handles: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub final_tweet: String,
}

impl AiResponse {
    /// Parse the JSON object embedded in a model's reply.
    ///
    /// Returns `None` when no usable object is found or it has no tweet.
    /// An empty `location_detected` is filled from `location`.
    pub fn from_model_output(text: &str, location: Option<&str>) -> Option<Self> {
        let json = extract_json(text)?;
        let mut response: AiResponse = match serde_json::from_str(json) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Model output is not valid JSON: {}", e);
                return None;
            }
        };
        if response.final_tweet.trim().is_empty() {
            log::warn!("Model output has no tweet");
            return None;
        }
        if response.location_detected.trim().is_empty() {
            response.location_detected = location_or(location, "Location not specified");
        }
        Some(response)
    }

    /// Used when the model answered but its output could not be parsed.
    pub fn unparseable_fallback(location: Option<&str>) -> Self {
        let place = location_or(location, "unspecified location");
        Self {
            detected_issue: "Public infrastructure issue detected".to_string(),
            location_detected: location_or(location, "Location not specified"),
            responsible_authority: DEFAULT_AUTHORITY.to_string(),
            twitter_handles: DEFAULT_HANDLES.iter().map(|h| h.to_string()).collect(),
            hashtags: vec![
                "#PublicIssue".to_string(),
                "#SwachhBharat".to_string(),
                "#FixIt".to_string(),
            ],
            final_tweet: format!(
                "Public infrastructure issue reported at {}. Kindly resolve promptly. @SwachhBharat @MyGovIndia #PublicIssue #SwachhBharat #FixIt",
                place
            ),
        }
    }

    /// Used when the AI service failed but a location is known.
    pub fn service_error_fallback(location: &str) -> Self {
        let location = location.trim();
        let location_detected = if location.is_empty() {
            "Unknown location".to_string()
        } else {
            location.to_string()
        };
        Self {
            detected_issue: "Public infrastructure issue".to_string(),
            final_tweet: format!(
                "Public infrastructure issue reported at {}. Authorities please take action. @SwachhBharat @MyGovIndia #CivicIssue #FixOurCity",
                location_detected
            ),
            location_detected,
            responsible_authority: DEFAULT_AUTHORITY.to_string(),
            twitter_handles: DEFAULT_HANDLES.iter().map(|h| h.to_string()).collect(),
            hashtags: vec![
                "#CivicIssue".to_string(),
                "#FixOurCity".to_string(),
                "#PublicInfrastructure".to_string(),
            ],
        }
    }

    /// Tweet length in characters (not bytes).
    pub fn tweet_len(&self) -> usize {
        self.final_tweet.chars().count()
    }
}

fn location_or(location: Option<&str>, default: &str) -> String {
    location
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Slice from the first `{` to the last `}` of `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nThanks";
        assert_eq!(extract_json(reply), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_from_model_output() {
        let reply = r##"```json
{
  "detected_issue": "Pothole on main road",
  "location_detected": "MG Road, Bengaluru",
  "responsible_authority": "BBMP",
  "twitter_handles": ["@BBMPCOMM"],
  "hashtags": ["#Potholes", "#Bengaluru"],
  "final_tweet": "Large pothole on MG Road. @BBMPCOMM please fix. #Potholes #Bengaluru"
}
```"##;
        let response = AiResponse::from_model_output(reply, Some("MG Road")).unwrap();
        assert_eq!(response.responsible_authority, "BBMP");
        assert_eq!(response.location_detected, "MG Road, Bengaluru");
        assert_eq!(response.hashtags.len(), 2);
    }

    #[test]
    fn test_empty_location_is_filled() {
        let reply = r#"{"detected_issue":"Broken streetlight","location_detected":"","final_tweet":"Streetlight out"}"#;
        let response = AiResponse::from_model_output(reply, Some("Sector 17, Chandigarh")).unwrap();
        assert_eq!(response.location_detected, "Sector 17, Chandigarh");

        let response = AiResponse::from_model_output(reply, None).unwrap();
        assert_eq!(response.location_detected, "Location not specified");
    }

    #[test]
    fn test_unusable_output_is_rejected() {
        assert!(AiResponse::from_model_output("I cannot help with that", None).is_none());
        assert!(AiResponse::from_model_output("{not json}", None).is_none());
        assert!(AiResponse::from_model_output(r#"{"detected_issue":"x"}"#, None).is_none());
    }

    #[test]
    fn test_unparseable_fallback() {
        let fallback = AiResponse::unparseable_fallback(Some("Connaught Place, Delhi"));
        assert_eq!(fallback.detected_issue, "Public infrastructure issue detected");
        assert_eq!(fallback.location_detected, "Connaught Place, Delhi");
        assert_eq!(fallback.twitter_handles, vec!["@SwachhBharat", "@MyGovIndia"]);
        assert_eq!(fallback.hashtags, vec!["#PublicIssue", "#SwachhBharat", "#FixIt"]);
        assert_eq!(
            fallback.final_tweet,
            "Public infrastructure issue reported at Connaught Place, Delhi. Kindly resolve promptly. @SwachhBharat @MyGovIndia #PublicIssue #SwachhBharat #FixIt"
        );

        let anonymous = AiResponse::unparseable_fallback(None);
        assert_eq!(anonymous.location_detected, "Location not specified");
        assert!(anonymous.final_tweet.contains("unspecified location"));
    }

    #[test]
    fn test_service_error_fallback() {
        let fallback = AiResponse::service_error_fallback("Connaught Place, Delhi");
        assert_eq!(fallback.detected_issue, "Public infrastructure issue");
        assert_eq!(fallback.hashtags, vec!["#CivicIssue", "#FixOurCity", "#PublicInfrastructure"]);
        assert_eq!(
            fallback.final_tweet,
            "Public infrastructure issue reported at Connaught Place, Delhi. Authorities please take action. @SwachhBharat @MyGovIndia #CivicIssue #FixOurCity"
        );
        assert!(fallback.tweet_len() <= 280);
    }
}
