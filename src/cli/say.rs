//! TUI-less "say" command

use std::error::Error;

use crate::backend::{create_backend, BackendConfig, BackendKind, ResponseGenerator};

/// Send one prompt with an empty history and print the complete reply.
pub async fn run_say(
    prompt: Vec<String>,
    kind: BackendKind,
    config: BackendConfig,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: chameleon say <prompt>");
        std::process::exit(1);
    }

    let generator = create_backend(kind, &config).await?;
    let reply = generator.generate(&prompt, &[]).await?;
    println!("{reply}");
    Ok(())
}
