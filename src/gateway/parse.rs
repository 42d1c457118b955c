use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::GatewayError;

static FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?:[\w-]+)?\s*([\s\S]*?)\s*```$").expect("valid fence regex"));

/// Removes one surrounding code fence (with optional language tag) and trims.
/// Unfenced text is only trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    match FENCED.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Parses the model answer as JSON, falling back to the span between the
/// first `{` and the last `}` when the whole text is not valid JSON.
pub fn parse_json_from_content(text: &str) -> Result<Value, GatewayError> {
    let sanitized = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(&sanitized) {
        return Ok(value);
    }

    match (sanitized.find('{'), sanitized.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&sanitized[start..=end])
            .map_err(|e| GatewayError::MalformedContent(format!("unable to parse JSON: {e}"))),
        _ => Err(GatewayError::MalformedContent(
            "response did not contain parseable JSON".to_string(),
        )),
    }
}
