//! `ax send`: one-shot message.

use anyhow::Result;
use std::path::Path;

use crate::client::{ApiClient, parse_completion};

/// Send one message and print the reply.
pub async fn run(state_root: &Path, message: &str, session: Option<String>) -> Result<()> {
    let client = ApiClient::new(state_root);
    let value = client.chat(message, session.as_deref()).await?;
    let (text, _) = parse_completion(&value);
    println!("{text}");
    Ok(())
}
