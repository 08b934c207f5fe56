//! College room: history, broadcast and live follow.

use anyhow::{Context, Result};
use chat::{ChatUpdate, ReceiveOutcome, reconciler::LoadOutcome};
use clap::Args;
use shared::config::Config;

use super::{chat::render_message, session::Session};

#[derive(Args, Debug)]
#[command(about = "Join a college room, show its history and follow broadcasts")]
pub struct RoomArgs {
    /// College identifier of the room
    #[arg(long)]
    pub college: String,

    /// Broadcast a message to the room after joining
    #[arg(long)]
    pub say: Option<String>,

    /// Keep printing broadcasts until interrupted
    #[arg(long)]
    pub follow: bool,
}

pub async fn handle_room(config: Config, args: RoomArgs) -> Result<()> {
    let mut session = Session::connect(config).await?;
    session.client.join_room(&args.college);
    session
        .wait_for("room history", |u| {
            *u == ChatUpdate::RoomHistory(LoadOutcome::Applied)
        })
        .await?;

    let room = session.client.room();
    if let Some(err) = room.load_error() {
        eprintln!("warning: room history unavailable: {err}");
    }
    for message in room.messages() {
        println!("{}", render_message(message));
    }

    if let Some(text) = &args.say {
        session
            .client
            .send_room_message(text)
            .context("failed to broadcast to the room")?;
        // Room messages show up when the broadcast comes back.
        let update = session
            .wait_for("room broadcast", |u| {
                *u == ChatUpdate::RoomMessage(ReceiveOutcome::Appended)
            })
            .await?;
        print_latest(&session, &update);
    }

    if args.follow {
        println!("Following {}... (press Ctrl+C to stop)", args.college);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                update = session.client.next_update() => {
                    let Some(update) = update else { break };
                    print_latest(&session, &update);
                }
            }
        }
    }

    session.client.leave_room();
    session.client.sign_out();
    Ok(())
}

fn print_latest(session: &Session, update: &ChatUpdate) {
    if *update == ChatUpdate::RoomMessage(ReceiveOutcome::Appended)
        && let Some(message) = session.client.room().messages().last()
    {
        println!("{}", render_message(message));
    }
}
