//! `ax chat`: interactive client.

use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

use crate::client::{ApiClient, parse_completion};

/// Run the interactive REPL.
pub async fn run(state_root: &Path, session: Option<String>) -> Result<()> {
    let client = ApiClient::new(state_root);
    client.health().await?;

    let mut session_id = session;
    println!("{}", "ax chat (/quit to exit)".dimmed());

    loop {
        print!("{} ", ">".cyan().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        match client.chat(line, session_id.as_deref()).await {
            Ok(value) => {
                let (text, new_session) = parse_completion(&value);
                if let Some(new_session) = new_session {
                    session_id = Some(new_session);
                }
                println!("{text}");
            },
            Err(e) => {
                eprintln!("{} {e:#}", "error:".red());
            },
        }
    }

    Ok(())
}
