//! Conversation list, user search and deletion.

use anyhow::{Context, Result};
use chat::{ChatUpdate, presence::PresenceTracker};
use clap::Args;
use shared::{config::Config, models::ConversationSummary};
use std::fmt::Write as _;

use super::session::Session;

#[derive(Args, Debug)]
#[command(about = "Search users to start a conversation with")]
pub struct SearchArgs {
    /// Name fragment to search for (at least two characters)
    #[arg()]
    pub query: String,
}

#[derive(Args, Debug)]
#[command(about = "Delete a conversation and all of its messages")]
pub struct DeleteArgs {
    /// Peer identifier of the conversation to delete
    #[arg(long)]
    pub peer: String,
}

pub async fn handle_conversations(config: Config) -> Result<()> {
    let mut session = Session::offline(config)?;
    session.load_conversations().await?;

    let summaries = session.client.conversations().visible();
    if summaries.is_empty() {
        println!("No conversations yet.");
    } else {
        print!("{}", render_summaries(summaries, session.client.presence()));
    }
    Ok(())
}

pub async fn handle_search(config: Config, args: SearchArgs) -> Result<()> {
    let mut session = Session::offline(config)?;
    if !session.client.search(&args.query) {
        println!(
            "Search needs at least {} characters.",
            session.client.settings().search_min_chars
        );
        return Ok(());
    }
    session
        .wait_for("search results", |u| *u == ChatUpdate::Search)
        .await?;

    let results = session.client.conversations().visible();
    if results.is_empty() {
        println!("No users match '{}'.", args.query.trim());
    } else {
        print!("{}", render_summaries(results, session.client.presence()));
    }
    Ok(())
}

pub async fn handle_delete(config: Config, args: DeleteArgs) -> Result<()> {
    let mut session = Session::connect(config).await?;
    let peer = session.resolve_peer(&args.peer);
    session
        .client
        .delete_conversation(&peer.id)
        .await
        .with_context(|| format!("failed to delete conversation with {}", peer.id))?;
    println!("Deleted conversation with {}.", peer.display_name());
    session.client.sign_out();
    Ok(())
}

/// One line per summary: presence dot, name, id, timestamp and preview.
pub fn render_summaries(summaries: &[ConversationSummary], presence: &PresenceTracker) -> String {
    let mut output = String::new();
    for summary in summaries {
        let dot = if presence.is_online(summary.peer_id()) {
            '●'
        } else {
            '○'
        };
        let _ = write!(
            output,
            "{dot} {} ({})",
            summary.user.display_name(),
            summary.peer_id()
        );
        if let Some(at) = &summary.last_message_at {
            let _ = write!(output, "  [{at}]");
        }
        if let Some(preview) = &summary.last_message {
            let _ = write!(output, "  {}", preview_line(preview));
        }
        output.push('\n');
    }
    output
}

fn preview_line(text: &str) -> String {
    const MAX: usize = 48;
    let first = text.lines().next().unwrap_or_default();
    if first.chars().count() > MAX {
        let cut: String = first.chars().take(MAX - 1).collect();
        format!("{cut}…")
    } else {
        first.to_string()
    }
}
