//! Prompt sent with every civic-issue analysis.

const NO_DESCRIPTION: &str = "No description provided";

const NO_LOCATION: &str = "Not specified";

/// Build the analysis prompt for the given description and location.
///
/// Missing values are spelled out so the model never sees an empty slot.
pub fn build_prompt(issue_text: Option<&str>, location: Option<&str>) -> String {
    let description = issue_text.filter(|t| !t.trim().is_empty()).unwrap_or(NO_DESCRIPTION);
    let location = location.filter(|l| !l.trim().is_empty()).unwrap_or(NO_LOCATION);

    format!(
        r##"You are an AI assistant for a civic reporting app. Based on the user's description, the attached media (if any) and location information, provide a JSON response with the following structure:

{{
  "detected_issue": "Brief description of the civic issue based on user's input",
  "location_detected": "{location}",
  "responsible_authority": "Name of the local government authority responsible for this type of issue",
  "twitter_handles": ["@handle1", "@handle2"] (relevant official Twitter handles),
  "hashtags": ["#tag1", "#tag2", "#tag3"] (relevant civic hashtags),
  "final_tweet": "A respectful, clear tweet mentioning the issue, location, tagging authorities, and using hashtags"
}}

User's description: {description}
Location info: {location}

Focus on Indian civic authorities and use appropriate Hindi/English civic hashtags. Keep the tweet under 280 characters and maintain a respectful, solution-seeking tone.

Respond only with valid JSON."##
    )
}

/// Short prompt used to check that the key and model work.
pub const VERIFY_PROMPT: &str = "Reply with one short sentence confirming you are working.";
