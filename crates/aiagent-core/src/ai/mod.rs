pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::provider::Provider;
use crate::state::ImagePayload;

/// What a single turn sends to a model
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub image: Option<ImagePayload>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(text: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            text: text.into(),
            image: Some(image),
        }
    }
}

/// The one way a model call can fail; carries the transport or service message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    #[error("{0}")]
    RequestFailed(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        InferenceError::RequestFailed(err.to_string())
    }
}

/// Adapter to a generative model service
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Short label such as `gemini:gemini-1.5-flash`
    fn describe(&self) -> String;

    /// Completion text for the prompt; `None` when the service returned none
    async fn generate(&self, prompt: &Prompt) -> Result<Option<String>, InferenceError>;
}

/// Build the client for a provider from config, with an optional model override
pub fn connect(config: &Config, provider: Provider, model: Option<&str>) -> Result<Arc<dyn InferenceClient>> {
    let model = model
        .map(str::to_string)
        .unwrap_or_else(|| config.model_for(provider));

    match provider {
        Provider::Gemini => {
            let api_key = config.gemini_api_key().ok_or_else(|| {
                anyhow!("Gemini API key not configured. Set GEMINI_API_KEY or add gemini_api_key to the config file")
            })?;
            Ok(Arc::new(GeminiClient::new(&api_key, &model)))
        }
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(&config.ollama_url(), &model))),
    }
}
