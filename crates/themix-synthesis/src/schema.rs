//! Explicit schema for the model's themed answer.
//!
//! The summarizer's output is mapped onto these structs at the boundary;
//! anything that does not parse is a synthesis error, never patched up.

use serde::Deserialize;

use themix_common::error::{Result, ThemixError};

#[derive(Debug, Deserialize)]
pub struct RawThemedResponse {
    pub themes: Vec<RawTheme>,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct RawTheme {
    pub theme: String,
    pub description: String,
    #[serde(default)]
    pub term_ids: Vec<String>,
    #[serde(default)]
    pub paper_ids: Vec<String>,
    #[serde(default)]
    pub genes: Vec<String>,
}

/// Parse the model's reply. Chat endpoints occasionally wrap the JSON in a
/// markdown fence even in JSON mode; the object between the outermost braces
/// is what gets parsed.
pub fn parse_response(content: &str) -> Result<RawThemedResponse> {
    let json = extract_json(content)
        .ok_or_else(|| ThemixError::Synthesis("model reply contains no JSON object".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| ThemixError::Synthesis(format!("model reply does not match schema: {e}")))
}

fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "themes": [
            {
                "theme": "Cell cycle progression",
                "description": "Mitotic regulators dominate the list.",
                "term_ids": ["GO:0007049"],
                "paper_ids": ["12345678"],
                "genes": ["TOP2A", "CCNB1"]
            }
        ],
        "summary": "Proliferating cells."
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let parsed = parse_response(VALID).unwrap();
        assert_eq!(parsed.themes.len(), 1);
        assert_eq!(parsed.themes[0].term_ids, vec!["GO:0007049"]);
        assert_eq!(parsed.summary, "Proliferating cells.");
    }

    #[test]
    fn test_parse_fenced_response() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_response(&fenced).is_ok());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_response("I could not produce themes.").unwrap_err();
        assert!(matches!(err, ThemixError::Synthesis(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = parse_response(r#"{"wrong": true}"#).unwrap_err();
        assert!(matches!(err, ThemixError::Synthesis(_)));
    }

    #[test]
    fn test_missing_optional_arrays_default_empty() {
        let minimal = r#"{"themes": [{"theme": "t", "description": "d"}], "summary": "s"}"#;
        let parsed = parse_response(minimal).unwrap();
        assert!(parsed.themes[0].term_ids.is_empty());
        assert!(parsed.themes[0].paper_ids.is_empty());
    }
}
