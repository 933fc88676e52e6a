//! `-m` without a value: list the models a backend can serve.

use std::error::Error;

use crate::api::models::{fetch_models, sort_models};
use crate::backend::{ollama, openai, BackendConfig, BackendKind, ConfigurationError};

pub async fn list_models(kind: BackendKind, config: &BackendConfig) -> Result<(), Box<dyn Error>> {
    match kind {
        BackendKind::OpenAi => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|key| !key.trim().is_empty())
                .ok_or(ConfigurationError::MissingField {
                    kind,
                    field: "api_key",
                })?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string());

            let client = reqwest::Client::new();
            let mut response = fetch_models(&client, &base_url, api_key).await?;
            sort_models(&mut response.data);

            println!("Available models ({}):", kind.display_name());
            for model in &response.data {
                match &model.owned_by {
                    Some(owner) => println!("  {} ({owner})", model.id),
                    None => println!("  {}", model.id),
                }
            }
            Ok(())
        }
        BackendKind::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string());
            let mut models = ollama::list_models(&base_url).await?;
            models.sort();

            if models.is_empty() {
                println!("No models installed on {base_url}. Pull one with `ollama pull <model>`.");
            } else {
                println!("Models installed on {base_url}:");
                for model in models {
                    println!("  {model}");
                }
            }
            Ok(())
        }
        BackendKind::Gemini | BackendKind::Local => Err(format!(
            "model listing is not supported for the {} backend",
            kind.display_name()
        )
        .into()),
    }
}
