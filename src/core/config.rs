use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::backend::{BackendConfig, BackendKind, ConfigurationError};

/// Persisted defaults. Everything here can be overridden per invocation
/// with CLI flags; API keys are deliberately not stored.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub default_backend: Option<String>,
    #[serde(default)]
    pub default_models: HashMap<String, String>,
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn get_config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "chameleon")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.default_backend {
            Some(backend) => println!("  default-backend: {backend}"),
            None => println!("  default-backend: (unset)"),
        }
        if self.default_models.is_empty() {
            println!("  default-models: (none set)");
        } else {
            println!("  default-models:");
            for (backend, model) in &self.default_models {
                println!("    {backend}: {model}");
            }
        }
        if self.base_urls.is_empty() {
            println!("  base-urls: (none set)");
        } else {
            println!("  base-urls:");
            for (backend, url) in &self.base_urls {
                println!("    {backend}: {url}");
            }
        }
    }

    pub fn get_default_model(&self, backend: &str) -> Option<&String> {
        self.default_models.get(backend)
    }

    pub fn set_default_model(&mut self, backend: String, model: String) {
        self.default_models.insert(backend, model);
    }

    pub fn unset_default_model(&mut self, backend: &str) {
        self.default_models.remove(backend);
    }

    pub fn get_base_url(&self, backend: &str) -> Option<&String> {
        self.base_urls.get(backend)
    }

    pub fn set_base_url(&mut self, backend: String, url: String) {
        self.base_urls.insert(backend, url);
    }

    pub fn unset_base_url(&mut self, backend: &str) {
        self.base_urls.remove(backend);
    }

    /// Merge explicit overrides, the environment, and persisted defaults
    /// into a backend selection. Overrides win; built-in literal defaults
    /// for still-absent fields are applied later by the factory.
    pub fn resolve_backend(
        &self,
        backend_override: Option<&str>,
        model_override: Option<&str>,
        base_url_override: Option<&str>,
        api_key_override: Option<&str>,
    ) -> Result<(BackendKind, BackendConfig), ConfigurationError> {
        let kind_name = backend_override
            .map(str::to_string)
            .or_else(|| self.default_backend.clone())
            .unwrap_or_else(|| BackendKind::OpenAi.as_str().to_string());
        let kind: BackendKind = kind_name.parse()?;

        let api_key = api_key_override
            .map(str::to_string)
            .or_else(|| env_api_key(kind));
        let model = model_override
            .map(str::to_string)
            .or_else(|| self.get_default_model(kind.as_str()).cloned());
        let base_url = base_url_override
            .map(str::to_string)
            .or_else(|| self.get_base_url(kind.as_str()).cloned());

        Ok((
            kind,
            BackendConfig {
                api_key,
                model,
                base_url,
            },
        ))
    }
}

/// The environment variable a hosted backend's key falls back to.
pub fn env_api_key(kind: BackendKind) -> Option<String> {
    let var = match kind {
        BackendKind::OpenAi => "OPENAI_API_KEY",
        BackendKind::Gemini => "GEMINI_API_KEY",
        _ => return None,
    };
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.default_backend.is_none());
        assert!(config.default_models.is_empty());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config {
            default_backend: Some("ollama".to_string()),
            ..Default::default()
        };
        config.set_default_model("ollama".to_string(), "llama3.2:latest".to_string());
        config.set_base_url("ollama".to_string(), "http://box:11434".to_string());
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.default_backend.as_deref(), Some("ollama"));
        assert_eq!(
            loaded.get_default_model("ollama").map(String::as_str),
            Some("llama3.2:latest")
        );
        assert_eq!(
            loaded.get_base_url("ollama").map(String::as_str),
            Some("http://box:11434")
        );
    }

    #[test]
    fn unset_removes_entries() {
        let mut config = Config::default();
        config.set_default_model("openai".to_string(), "gpt-4o".to_string());
        config.unset_default_model("openai");
        assert!(config.get_default_model("openai").is_none());
    }

    #[test]
    fn overrides_win_over_persisted_defaults() {
        let mut config = Config {
            default_backend: Some("ollama".to_string()),
            ..Default::default()
        };
        config.set_default_model("ollama".to_string(), "llama3.2:latest".to_string());

        let (kind, backend_config) = config
            .resolve_backend(Some("gemini"), Some("gemini-pro"), None, Some("key"))
            .unwrap();
        assert_eq!(kind, BackendKind::Gemini);
        assert_eq!(backend_config.model.as_deref(), Some("gemini-pro"));
        assert_eq!(backend_config.api_key.as_deref(), Some("key"));
    }

    #[test]
    fn persisted_defaults_fill_in_when_overrides_are_absent() {
        let mut config = Config {
            default_backend: Some("ollama".to_string()),
            ..Default::default()
        };
        config.set_default_model("ollama".to_string(), "llama3.2:latest".to_string());
        config.set_base_url("ollama".to_string(), "http://box:11434".to_string());

        let (kind, backend_config) = config.resolve_backend(None, None, None, None).unwrap();
        assert_eq!(kind, BackendKind::Ollama);
        assert_eq!(backend_config.model.as_deref(), Some("llama3.2:latest"));
        assert_eq!(backend_config.base_url.as_deref(), Some("http://box:11434"));
    }

    #[test]
    fn unknown_backend_override_is_an_error() {
        let config = Config::default();
        let err = config
            .resolve_backend(Some("claude"), None, None, None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownBackend(_)));
    }
}
