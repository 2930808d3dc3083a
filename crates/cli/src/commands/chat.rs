//! `chatscout chat`: interactive session on stdin.

use crate::session::{Admission, Session, render};
use chatscout_core::Chat;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(config: Option<&Path>, name: &str, tools: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;
    let mut session = Session::start(&config, name, tools, Chat::new())?;

    println!("🔍 chatscout | model: {}", config.primary);
    println!("   Empty line to quit.\n");

    let reason = converse(&mut session).await;
    session.finish(reason);
    Ok(())
}

/// Read user lines until an empty line or end of input.
///
/// Returns the reason the session ended.
pub async fn converse(session: &mut Session) -> &'static str {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match session.admission() {
            Admission::Open => {}
            Admission::Cooldown(secs) => {
                println!("⏳ Rate limited. Please wait {secs} seconds.");
                tokio::time::sleep(std::time::Duration::from_secs(secs.max(1))).await;
                continue;
            }
            Admission::Exhausted(cap) => {
                println!("🛑 Session limit reached ({cap} messages). Start a new session.");
                return "session_limit";
            }
        }

        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return "eof",
            Err(e) => {
                eprintln!("❌ Failed to read input: {e}");
                return "error";
            }
        };
        let line = line.trim();
        if line.is_empty() {
            return "normal";
        }

        match session.send(line).await {
            Ok(produced) => render(&produced),
            Err(e) => {
                render(e.produced());
                eprintln!("❌ {e}");
            }
        }
        println!();
    }
}
