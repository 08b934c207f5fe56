//! Signed-in session: identity, REST client and an optional live channel.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use chat::{ChatClient, ChatUpdate, RestChatApi};
use shared::{
    config::Config,
    models::{User, UserId},
};
use tokio::time::timeout;
use tracing::warn;

/// How long one-shot commands wait for a REST result.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything a command needs to talk to the backend as the signed-in user.
#[derive(Debug)]
pub struct Session {
    pub config: Config,
    pub client: ChatClient,
}

impl Session {
    /// Builds a session from the resolved configuration without opening the
    /// push channel.
    pub fn offline(config: Config) -> Result<Self> {
        let user_id = config
            .session
            .user_id
            .clone()
            .ok_or_else(|| anyhow!("no signed-in user; pass --user or set UNIFY_USER_ID"))?;
        let token = config.session.token.clone();
        if token.is_none() {
            warn!("no session token configured; requests will be unauthenticated");
        }

        let api = RestChatApi::new(config.api_url().context("invalid API URL")?, token);
        let me = User::stub(UserId::new(user_id));
        let client = ChatClient::new(me, Arc::new(api), config.chat.clone());
        Ok(Self { config, client })
    }

    /// Builds a session and tries to open the push channel. A failed
    /// connection is reported but not fatal.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut session = Self::offline(config)?;
        let url = session.config.socket_url().context("invalid socket URL")?;
        let token = session.config.session.token.clone();
        if let Err(err) = session.client.connect(&url, token.as_deref()).await {
            eprintln!("warning: not connected to live chat ({err}); continuing over REST");
        }
        Ok(session)
    }

    /// Waits for the next update matching `pred`, applying everything before it.
    pub async fn wait_for<F>(&mut self, what: &str, mut pred: F) -> Result<ChatUpdate>
    where
        F: FnMut(&ChatUpdate) -> bool,
    {
        let result = timeout(FETCH_TIMEOUT, async {
            while let Some(update) = self.client.next_update().await {
                if pred(&update) {
                    return Some(update);
                }
            }
            None
        })
        .await
        .with_context(|| format!("timed out waiting for {what}"))?;
        result.ok_or_else(|| anyhow!("chat session ended while waiting for {what}"))
    }

    /// Loads the conversation list.
    pub async fn load_conversations(&mut self) -> Result<()> {
        self.client.refresh_conversations();
        self.wait_for("conversation list", |u| *u == ChatUpdate::Conversations)
            .await?;
        if let Some(err) = self.client.conversations().load_error() {
            return Err(anyhow!("failed to fetch conversations: {err}"));
        }
        Ok(())
    }

    /// Resolves a peer id to a known user, falling back to a bare identifier.
    pub fn resolve_peer(&self, peer: &str) -> User {
        let id = UserId::from(peer);
        self.client
            .conversations()
            .get(&id)
            .map_or_else(|| User::stub(id), |summary| summary.user.clone())
    }
}
