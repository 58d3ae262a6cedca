//! Gemini `generateContent` client for book recommendations.

use std::time::Duration;

use folio_core::{RecommendError, Recommendation, Recommender, recommendation_prompt};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-pro".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeminiClient {
    config: GeminiConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl Recommender for GeminiClient {
    fn recommend(
        &self,
        title: &str,
        api_key: &str,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RecommendError::MissingCredential);
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": recommendation_prompt(title) }] }],
        });
        let body_str = serde_json::to_string(&body).map_err(|e| RecommendError::Request {
            message: format!("JSON serialize error: {e}"),
        })?;

        tracing::info!(model = %self.config.model, title, "requesting recommendations");
        // Key travels in a header so transport errors never echo it via the URL.
        let resp = match agent
            .post(&self.endpoint())
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", api_key)
            .send_string(&body_str)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(RecommendError::Request {
                    message: format!("HTTP {code}: {}", body.trim()),
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(RecommendError::Request {
                    message: t.to_string(),
                });
            }
        };

        let resp_str = resp.into_string().map_err(|e| RecommendError::Request {
            message: e.to_string(),
        })?;
        let text = response_text(&resp_str)?;
        parse_recommendations(&text)
    }
}

/// Pulls the first candidate's text out of a `generateContent` response.
pub fn response_text(raw: &str) -> Result<String, RecommendError> {
    let response: GenerateResponse =
        serde_json::from_str(raw).map_err(|e| RecommendError::Parse {
            message: e.to_string(),
        })?;
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(RecommendError::Parse {
            message: "response contained no text".into(),
        });
    }
    Ok(text)
}

/// Parses model output as a JSON array of `{title, description}`, tolerating
/// a surrounding Markdown code fence.
pub fn parse_recommendations(text: &str) -> Result<Vec<Recommendation>, RecommendError> {
    let body = strip_code_fence(text);
    serde_json::from_str(body).map_err(|e| RecommendError::Parse {
        message: e.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_targets_model() {
        let client = GeminiClient::new(GeminiConfig {
            base_url: "http://localhost:9/".to_string(),
            ..Default::default()
        });
        assert_eq!(
            client.endpoint(),
            "http://localhost:9/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn blank_key_is_missing_credential() {
        let client = GeminiClient::default();
        assert!(matches!(
            client.recommend("Dune", "  "),
            Err(RecommendError::MissingCredential)
        ));
    }

    #[test]
    fn unreachable_host_is_request_error() {
        let client = GeminiClient::new(GeminiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        });
        assert!(matches!(
            client.recommend("Dune", "key"),
            Err(RecommendError::Request { .. })
        ));
    }

    #[test]
    fn extracts_first_candidate_text() -> anyhow::Result<()> {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"[]"}],"role":"model"}}]}"#;
        assert_eq!(response_text(raw)?, "[]");
        Ok(())
    }

    #[test]
    fn empty_candidates_are_parse_errors() {
        assert!(matches!(
            response_text(r#"{"candidates":[]}"#),
            Err(RecommendError::Parse { .. })
        ));
        assert!(matches!(
            response_text("<html>"),
            Err(RecommendError::Parse { .. })
        ));
    }

    #[test]
    fn parses_plain_array() -> anyhow::Result<()> {
        let text = r#"[{"title":"Hyperion","description":"Pilgrims on Hyperion."}]"#;
        let recs = parse_recommendations(text)?;
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "Hyperion");
        Ok(())
    }

    #[test]
    fn parses_fenced_array() -> anyhow::Result<()> {
        let text = "```json\n[{\"title\":\"Foundation\",\"description\":\"Psychohistory.\"},\n{\"title\":\"Solaris\",\"description\":\"An ocean.\"}]\n```\n";
        let recs = parse_recommendations(text)?;
        let titles: Vec<_> = recs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Foundation", "Solaris"]);
        Ok(())
    }

    #[test]
    fn prose_is_a_parse_error() {
        assert!(matches!(
            parse_recommendations("Sure! Here are some books."),
            Err(RecommendError::Parse { .. })
        ));
    }
}
