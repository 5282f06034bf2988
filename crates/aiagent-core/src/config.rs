use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::provider::Provider;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_url: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("aiagent").join("config.json"))
    }

    /// Configured provider; unknown names fall back to Gemini
    pub fn provider(&self) -> Provider {
        match self.provider.as_deref().map(str::parse::<Provider>) {
            Some(Ok(provider)) => provider,
            Some(Err(err)) => {
                tracing::warn!("{}; using gemini", err);
                Provider::Gemini
            }
            None => Provider::Gemini,
        }
    }

    /// Switching provider forgets a model chosen for the previous one
    pub fn set_provider(&mut self, provider: Provider) {
        if self.provider() != provider {
            self.model = None;
        }
        self.provider = Some(provider.as_str().to_string());
    }

    /// The configured model belongs to the configured provider; any other
    /// provider gets its default
    pub fn model_for(&self, provider: Provider) -> String {
        match &self.model {
            Some(model) if provider == self.provider() => model.clone(),
            _ => provider.default_model().to_string(),
        }
    }

    /// `GEMINI_API_KEY` wins over the config file
    pub fn gemini_api_key(&self) -> Option<String> {
        resolve_key(std::env::var(API_KEY_ENV).ok(), self.gemini_api_key.as_deref())
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| crate::ai::ollama::DEFAULT_BASE_URL.to_string())
    }
}

fn resolve_key(from_env: Option<String>, from_config: Option<&str>) -> Option<String> {
    from_env
        .filter(|key| !key.trim().is_empty())
        .or_else(|| from_config.filter(|key| !key.trim().is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Gemini);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            provider: Some("ollama".to_string()),
            model: Some("llava:13b".to_string()),
            gemini_api_key: None,
            ollama_url: Some("http://gpu-box:11434".to_string()),
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!fs::read_to_string(&path).unwrap().contains("gemini_api_key"));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let config = Config {
            provider: Some("claude".to_string()),
            ..Config::default()
        };
        assert_eq!(config.provider(), Provider::Gemini);
    }

    #[test]
    fn test_model_applies_to_configured_provider_only() {
        let config = Config {
            provider: Some("ollama".to_string()),
            model: Some("llava:13b".to_string()),
            ..Config::default()
        };
        assert_eq!(config.model_for(Provider::Ollama), "llava:13b");
        assert_eq!(config.model_for(Provider::Gemini), "gemini-1.5-flash");
    }

    #[test]
    fn test_switching_provider_drops_model() {
        let mut config = Config {
            provider: Some("ollama".to_string()),
            model: Some("llava:13b".to_string()),
            ..Config::default()
        };

        config.set_provider(Provider::Ollama);
        assert_eq!(config.model.as_deref(), Some("llava:13b"));

        config.set_provider(Provider::Gemini);
        assert_eq!(config.provider.as_deref(), Some("gemini"));
        assert_eq!(config.model, None);
        assert_eq!(config.model_for(Provider::Gemini), "gemini-1.5-flash");
    }

    #[test]
    fn test_env_key_wins_over_config() {
        assert_eq!(resolve_key(Some("env".into()), Some("file")), Some("env".to_string()));
        assert_eq!(resolve_key(None, Some("file")), Some("file".to_string()));
        assert_eq!(resolve_key(Some("  ".into()), Some("file")), Some("file".to_string()));
        assert_eq!(resolve_key(None, Some("")), None);
    }

    #[test]
    fn test_ollama_url_default() {
        assert_eq!(Config::new().ollama_url(), "http://localhost:11434");
    }
}
