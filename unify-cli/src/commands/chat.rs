use std::time::Duration;

use anyhow::{Result, anyhow};
use chat::{ChatUpdate, DeliveryState, LogEntry, ReceiveOutcome, reconciler::LoadOutcome};
use clap::Args;
use shared::{config::Config, models::Message};
use tokio::time::timeout;

use super::{conversations::render_summaries, session::Session};

#[derive(Args, Debug)]
#[command(about = "Show the message history with a peer")]
pub struct HistoryArgs {
    /// Peer identifier of the conversation
    #[arg(long)]
    pub peer: String,
}

#[derive(Args, Debug)]
#[command(about = "Send a private message")]
pub struct SendArgs {
    /// Peer identifier to send to
    #[arg(long)]
    pub peer: String,

    /// Message text
    #[arg()]
    pub text: String,
}

#[derive(Args, Debug)]
#[command(about = "Follow live messages, conversations and presence")]
pub struct FollowArgs {
    /// Also open the conversation with this peer and print its messages
    #[arg(long)]
    pub peer: Option<String>,
}

async fn open(session: &mut Session, peer: &str) -> Result<()> {
    // Known peers render with their names; a failed list load is not fatal here.
    if let Err(err) = session.load_conversations().await {
        eprintln!("warning: {err}");
    }
    let peer = session.resolve_peer(peer);
    session.client.open_conversation(peer);
    session
        .wait_for("message history", |u| {
            *u == ChatUpdate::History(LoadOutcome::Applied)
        })
        .await?;
    if let Some(err) = session.client.reconciler().load_error() {
        eprintln!("warning: history unavailable: {err}");
    }
    Ok(())
}

pub async fn handle_history(config: Config, args: HistoryArgs) -> Result<()> {
    let mut session = Session::offline(config)?;
    open(&mut session, &args.peer).await?;

    let log = session.client.reconciler().log();
    if log.is_empty() {
        println!("No messages yet.");
    }
    for entry in log {
        println!("{}", render_entry(entry));
    }
    Ok(())
}

pub async fn handle_send(config: Config, args: SendArgs) -> Result<()> {
    let mut session = Session::connect(config).await?;
    open(&mut session, &args.peer).await?;

    let token = session.client.send_message(&args.text)?;
    let window = Duration::from_millis(session.client.settings().match_window_ms);

    // Wait for the echo or the fallback result, up to one match window.
    let _ = timeout(window, async {
        while let Some(update) = session.client.next_update().await {
            if let ChatUpdate::PrivateMessage(ReceiveOutcome::Reconciled(t))
            | ChatUpdate::Delivery { token: t, .. } = update
                && t == token
            {
                return;
            }
        }
    })
    .await;

    let result = match session.client.reconciler().pending(token).map(|p| &p.state) {
        None => {
            println!("Delivered.");
            Ok(())
        }
        Some(DeliveryState::Failed { reason }) => Err(anyhow!("message not delivered: {reason}")),
        Some(DeliveryState::Sending) => {
            println!("Sent; no confirmation received yet.");
            Ok(())
        }
    };
    session.client.sign_out();
    result
}

pub async fn handle_follow(config: Config, args: FollowArgs) -> Result<()> {
    let mut session = Session::connect(config).await?;
    if !session.client.is_connected() {
        return Err(anyhow!("live chat is unavailable"));
    }
    match &args.peer {
        Some(peer) => open(&mut session, peer).await?,
        None => session.load_conversations().await?,
    }
    println!("Following live chat... (press Ctrl+C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = session.client.next_update() => {
                let Some(update) = update else { break };
                print_update(&session, &update);
            }
        }
    }

    session.client.sign_out();
    Ok(())
}

fn print_update(session: &Session, update: &ChatUpdate) {
    let client = &session.client;
    match update {
        ChatUpdate::Presence => {
            println!("[presence] {} online", client.presence().online_count());
        }
        ChatUpdate::Conversations => {
            print!("{}", render_summaries(client.conversations().entries(), client.presence()));
        }
        ChatUpdate::PrivateMessage(ReceiveOutcome::Appended) => {
            if let Some(entry) = client.reconciler().log().last() {
                println!("{}", render_entry(entry));
            }
        }
        ChatUpdate::PrivateMessage(ReceiveOutcome::Ignored) => {
            if let Some(latest) = client.conversations().entries().first() {
                println!(
                    "[{}] {}",
                    latest.user.display_name(),
                    latest.last_message.as_deref().unwrap_or_default()
                );
            }
        }
        ChatUpdate::ConversationDeleted { peer, was_open } => {
            println!("[deleted] conversation with {peer}");
            if *was_open {
                println!("(the open conversation was closed)");
            }
        }
        _ => {}
    }
}

/// Formats one log row with its delivery state.
pub fn render_entry(entry: &LogEntry) -> String {
    let line = render_message(entry.message());
    match entry {
        LogEntry::Confirmed(_) => line,
        LogEntry::Pending(pending) => match &pending.state {
            DeliveryState::Sending => format!("{line}  (sending)"),
            DeliveryState::Failed { reason } => format!("{line}  (failed: {reason})"),
        },
    }
}

pub fn render_message(message: &Message) -> String {
    let sender = message.sender.to_user();
    format!(
        "[{}] {}: {}",
        message.created_at,
        sender.display_name(),
        message.content
    )
}
