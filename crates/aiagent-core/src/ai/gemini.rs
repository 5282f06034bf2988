use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{InferenceClient, InferenceError, Prompt};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for the hosted Gemini `generateContent` API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-1.5-flash".to_string(),
            "gemini-1.5-flash-8b".to_string(),
            "gemini-1.5-pro".to_string(),
            "gemini-2.0-flash".to_string(),
        ]
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    fn describe(&self) -> String {
        format!("gemini:{}", self.model)
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Option<String>, InferenceError> {
        let request = build_request(prompt);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::RequestFailed(error_message(status, &body)));
        }

        let body: GenerateResponse = response.json().await?;
        completion_text(body)
    }
}

/// Image part first, then the text, as a single user turn
fn build_request(prompt: &Prompt) -> GenerateRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &prompt.image {
        parts.push(Part::InlineData(InlineData {
            mime_type: image.mime_type().to_string(),
            data: image.to_base64(),
        }));
    }
    parts.push(Part::Text(prompt.text.clone()));

    GenerateRequest {
        contents: vec![Content { role: "user", parts }],
    }
}

/// Only a candidate that finished normally yields text; a missing or
/// stopped candidate is a failure, an empty `STOP` candidate is `None`.
fn completion_text(response: GenerateResponse) -> Result<Option<String>, InferenceError> {
    let feedback = response.prompt_feedback;
    if let Some(reason) = feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
        return Err(InferenceError::RequestFailed(format!("Prompt was blocked: {}", reason)));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        if feedback.is_some() {
            return Ok(None);
        }
        return Err(InferenceError::RequestFailed(
            "Malformed response: no candidates".to_string(),
        ));
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            return Err(InferenceError::RequestFailed(format!("Response stopped: {}", reason)));
        }
    }

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(if text.is_empty() { None } else { Some(text) })
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => format!("Gemini API error {}: {}", status, parsed.error.message),
        Err(_) if body.trim().is_empty() => format!("Gemini API error {}", status),
        Err(_) => format!("Gemini API error {}: {}", status, body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ImagePayload;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> Result<Option<String>, InferenceError> {
        completion_text(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_text_request_shape() {
        let request = build_request(&Prompt::text("Hello"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"contents": [{"role": "user", "parts": [{"text": "Hello"}]}]})
        );
    }

    #[test]
    fn test_image_request_puts_image_first() {
        let image = ImagePayload::new(b"abc".to_vec(), "image/jpeg", 1, 1);
        let request = build_request(&Prompt::with_image("What is this?", image));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"contents": [{"role": "user", "parts": [
                {"inlineData": {"mimeType": "image/jpeg", "data": "YWJj"}},
                {"text": "What is this?"}
            ]}]})
        );
    }

    #[test]
    fn test_completion_joins_text_parts() {
        let text = parse(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Hi "}, {"text": "there"}]}, "finishReason": "STOP"},
                {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
            ]
        }));
        assert_eq!(text, Ok(Some("Hi there".to_string())));
    }

    #[test]
    fn test_empty_stop_candidate_is_empty_completion() {
        let empty = json!({"candidates": [{"content": {"parts": [{"text": ""}]}, "finishReason": "STOP"}]});
        assert_eq!(parse(empty), Ok(None));
        assert_eq!(parse(json!({"candidates": [{"content": {"parts": []}}]})), Ok(None));
        assert_eq!(parse(json!({"promptFeedback": {}})), Ok(None));
    }

    #[test]
    fn test_missing_candidates_is_failure() {
        assert_eq!(
            parse(json!({})),
            Err(InferenceError::RequestFailed("Malformed response: no candidates".to_string()))
        );
    }

    #[test]
    fn test_stopped_candidate_is_failure() {
        for reason in ["SAFETY", "RECITATION", "MAX_TOKENS"] {
            let body = json!({"candidates": [{
                "content": {"parts": [{"text": "partial"}]},
                "finishReason": reason
            }]});
            assert_eq!(
                parse(body),
                Err(InferenceError::RequestFailed(format!("Response stopped: {}", reason)))
            );
        }
        assert_eq!(
            parse(json!({"candidates": [{"finishReason": "SAFETY"}]})),
            Err(InferenceError::RequestFailed("Response stopped: SAFETY".to_string()))
        );
    }

    #[test]
    fn test_blocked_prompt_is_failure() {
        let result = parse(json!({"promptFeedback": {"blockReason": "SAFETY"}}));
        assert_eq!(
            result,
            Err(InferenceError::RequestFailed("Prompt was blocked: SAFETY".to_string()))
        );
    }

    #[test]
    fn test_error_message_prefers_service_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(
            error_message(reqwest::StatusCode::BAD_REQUEST, body),
            "Gemini API error 400 Bad Request: API key not valid."
        );
        assert_eq!(
            error_message(reqwest::StatusCode::SERVICE_UNAVAILABLE, ""),
            "Gemini API error 503 Service Unavailable"
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::with_base_url("key", "gemini-1.5-pro", "http://localhost:8080/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-1.5-pro:generateContent"
        );
        assert_eq!(client.describe(), "gemini:gemini-1.5-pro");
    }
}
