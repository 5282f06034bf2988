use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{InferenceClient, InferenceError, Prompt};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llava:latest";

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Client for a local Ollama server; images need a vision model such as llava
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response.models.into_iter().map(|model| model.name).collect())
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Option<String>, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = build_request(&self.model, prompt);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(InferenceError::RequestFailed(format!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        let text = ollama_response.response;
        Ok(if text.trim().is_empty() { None } else { Some(text) })
    }
}

fn build_request(model: &str, prompt: &Prompt) -> OllamaRequest {
    OllamaRequest {
        model: model.to_string(),
        prompt: prompt.text.clone(),
        stream: false,
        images: prompt.image.iter().map(|image| image.to_base64()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ImagePayload;
    use serde_json::json;

    #[test]
    fn test_text_request_omits_images() {
        let request = build_request("llama3.2", &Prompt::text("Hello"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"model": "llama3.2", "prompt": "Hello", "stream": false})
        );
    }

    #[test]
    fn test_image_request_carries_base64() {
        let image = ImagePayload::new(b"abc".to_vec(), "image/png", 1, 1);
        let request = build_request("llava", &Prompt::with_image("Describe", image));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"model": "llava", "prompt": "Describe", "stream": false, "images": ["YWJj"]})
        );
    }

    #[test]
    fn test_describe() {
        let client = OllamaClient::new("http://localhost:11434/", "llava:latest");
        assert_eq!(client.describe(), "ollama:llava:latest");
        assert_eq!(client.base_url, "http://localhost:11434");
    }
}
