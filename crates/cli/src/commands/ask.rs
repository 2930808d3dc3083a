//! `chatscout ask`: one message, one answer.

use crate::session::{Session, render};
use chatscout_core::{Chat, GenerateOptions, ResponseFormat};
use std::path::Path;

pub async fn run(
    config: Option<&Path>,
    message: &str,
    schema: Option<&Path>,
    schema_name: &str,
    tools: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;

    let mut options = GenerateOptions::new();
    if let Some(path) = schema {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read schema {}: {e}", path.display()))?;
        let schema: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid JSON schema {}: {e}", path.display()))?;
        options = options.with_response_format(ResponseFormat::new(schema_name, schema));
    }

    let mut session = Session::start(&config, "ask", tools, Chat::new())?.with_options(options);
    let result = session.send(message).await;
    session.finish("normal");

    match result {
        Ok(produced) => {
            render(&produced);
            Ok(())
        }
        Err(e) => {
            render(e.produced());
            Err(e.into())
        }
    }
}
