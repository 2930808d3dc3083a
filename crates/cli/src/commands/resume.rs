//! `chatscout resume`: pick up a chat persisted after a quota failure.

use crate::commands::chat::converse;
use crate::session::{Session, render};
use chatscout_core::Chat;
use std::path::Path;

pub async fn run(
    config: Option<&Path>,
    path: &Path,
    name: &str,
    tools: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    let chat = Chat::load(std::io::BufReader::new(file))?;
    println!("📂 Loaded {} messages from {}", chat.len(), path.display());

    let mut session = Session::start(&config, name, tools, chat)?;
    if session.awaiting_reply() {
        match session.run().await {
            Ok(produced) => render(&produced),
            Err(e) => {
                render(e.produced());
                eprintln!("❌ {e}");
            }
        }
        println!();
    }

    let reason = converse(&mut session).await;
    session.finish(reason);
    Ok(())
}
