//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod model_list;
pub mod say;

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::backend::BackendKind;
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::core::config::Config;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "chameleon")]
#[command(about = "A terminal-based chat interface with swappable AI backends")]
#[command(
    long_about = "Chameleon is a full-screen terminal chat interface that can talk to any of \
four interchangeable backends: an OpenAI-compatible API, Google Gemini, a local Ollama \
server, or an in-process model.\n\n\
Backends:\n\
  openai            OpenAI-compatible chat API (needs OPENAI_API_KEY or --api-key)\n\
  gemini            Google Gemini (needs GEMINI_API_KEY or --api-key)\n\
  ollama            Local Ollama server (needs --model; pulls it when missing)\n\
  local             In-process model (needs --model pointing at a GGUF file;\n\
                    requires a build with the `local-llm` feature)\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Up/Down/Mouse     Scroll through chat history\n\
  Ctrl+C            Quit the application\n\
  Backspace         Delete characters in the input field\n\n\
Commands:\n\
  /backend <name>   Switch to another backend (clears the conversation)\n\
  /backend          Show the active backend"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend to use (openai, gemini, local, ollama)
    #[arg(short = 'b', long, global = true, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Model to use for chat, or list available models if no model specified
    #[arg(short = 'm', long, global = true, value_name = "MODEL", num_args = 0..=1, default_missing_value = "")]
    pub model: Option<String>,

    /// Override the backend's base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// API key for hosted backends (falls back to OPENAI_API_KEY / GEMINI_API_KEY)
    #[arg(long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Enable transcript logging to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send a single prompt and print the reply, without the TUI
    Say {
        /// The prompt to send
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set (default-backend, default-model, base-url)
        key: String,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Option<Vec<String>>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Backend the key applies to (for default-model and base-url)
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load()?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            run_set(config, &key, value)?;
            Ok(())
        }
        Commands::Unset { key, value } => {
            run_unset(config, &key, value)?;
            Ok(())
        }
        Commands::Say { prompt } => {
            let model_flag = args.model.as_deref().filter(|m| !m.is_empty());
            let (kind, backend_config) = config.resolve_backend(
                args.backend.as_deref(),
                model_flag,
                args.base_url.as_deref(),
                args.api_key.as_deref(),
            )?;
            run_say(prompt, kind, backend_config).await
        }
        Commands::Chat => match args.model.as_deref() {
            Some("") => {
                // -m was provided without a value: list available models.
                let (kind, backend_config) = config.resolve_backend(
                    args.backend.as_deref(),
                    None,
                    args.base_url.as_deref(),
                    args.api_key.as_deref(),
                )?;
                list_models(kind, &backend_config).await
            }
            model_flag => {
                let (kind, backend_config) = config.resolve_backend(
                    args.backend.as_deref(),
                    model_flag,
                    args.base_url.as_deref(),
                    args.api_key.as_deref(),
                )?;
                run_chat(kind, backend_config, args.log, config).await
            }
        },
    }
}

fn run_set(
    mut config: Config,
    key: &str,
    value: Option<Vec<String>>,
) -> Result<(), Box<dyn Error>> {
    let words = value.unwrap_or_default();
    match key {
        "default-backend" => match words.first() {
            Some(backend) => {
                // Reject typos now rather than at the next launch.
                let kind: BackendKind = backend.parse()?;
                config.default_backend = Some(kind.as_str().to_string());
                config.save()?;
                println!("✅ Set default-backend to: {kind}");
            }
            None => config.print_all(),
        },
        "default-model" => {
            if words.len() == 2 {
                let kind: BackendKind = words[0].parse()?;
                config.set_default_model(kind.as_str().to_string(), words[1].clone());
                config.save()?;
                println!("✅ Set default-model for backend '{kind}' to: {}", words[1]);
            } else if words.is_empty() {
                config.print_all();
            } else {
                eprintln!("⚠️  To set a default model, specify the backend and model:");
                eprintln!("Example: chameleon set default-model ollama llama3.2:latest");
                std::process::exit(1);
            }
        }
        "base-url" => {
            if words.len() == 2 {
                let kind: BackendKind = words[0].parse()?;
                config.set_base_url(kind.as_str().to_string(), words[1].clone());
                config.save()?;
                println!("✅ Set base-url for backend '{kind}' to: {}", words[1]);
            } else if words.is_empty() {
                config.print_all();
            } else {
                eprintln!("⚠️  To set a base URL, specify the backend and URL:");
                eprintln!("Example: chameleon set base-url ollama http://localhost:11434");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("❌ Unknown config key: {key}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_unset(
    mut config: Config,
    key: &str,
    value: Option<String>,
) -> Result<(), Box<dyn Error>> {
    match key {
        "default-backend" => {
            config.default_backend = None;
            config.save()?;
            println!("✅ Unset default-backend");
        }
        "default-model" => {
            if let Some(backend) = value {
                config.unset_default_model(&backend);
                config.save()?;
                println!("✅ Unset default-model for backend: {backend}");
            } else {
                eprintln!("⚠️  To unset a default model, specify the backend:");
                eprintln!("Example: chameleon unset default-model ollama");
                std::process::exit(1);
            }
        }
        "base-url" => {
            if let Some(backend) = value {
                config.unset_base_url(&backend);
                config.save()?;
                println!("✅ Unset base-url for backend: {backend}");
            } else {
                eprintln!("⚠️  To unset a base URL, specify the backend:");
                eprintln!("Example: chameleon unset base-url ollama");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("❌ Unknown config key: {key}");
            std::process::exit(1);
        }
    }
    Ok(())
}
