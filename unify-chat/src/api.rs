//! REST endpoints consumed by the chat core.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};
use shared::models::{ConversationSummary, ErrorResponse, Message, User, UserId};
use tracing::debug;
use url::Url;

use crate::error::{ChatError, ChatResult};

/// Chat REST surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /chat/conversations`
    ///
    /// # Errors
    /// [`ChatError::Http`] or [`ChatError::Rejected`].
    async fn conversations(&self) -> ChatResult<Vec<ConversationSummary>>;

    /// `GET /chat/private/:peerId`, oldest first.
    ///
    /// # Errors
    /// [`ChatError::Http`] or [`ChatError::Rejected`].
    async fn private_messages(&self, peer: &UserId) -> ChatResult<Vec<Message>>;

    /// `POST /chat/private/:peerId`, used when the push channel is unavailable.
    ///
    /// # Errors
    /// [`ChatError::Http`] or [`ChatError::Rejected`].
    async fn send_private_message(&self, peer: &UserId, content: &str) -> ChatResult<Message>;

    /// `DELETE /chat/conversation/:peerId`
    ///
    /// # Errors
    /// [`ChatError::Http`] or [`ChatError::Rejected`].
    async fn delete_conversation(&self, peer: &UserId) -> ChatResult<()>;

    /// `GET /chat/search/:query`
    ///
    /// # Errors
    /// [`ChatError::Http`] or [`ChatError::Rejected`].
    async fn search_users(&self, query: &str) -> ChatResult<Vec<User>>;

    /// `GET /chat/college/:collegeId`, oldest first.
    ///
    /// # Errors
    /// [`ChatError::Http`] or [`ChatError::Rejected`].
    async fn college_messages(&self, college: &str) -> ChatResult<Vec<Message>>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
}

/// [`ChatApi`] over HTTP with bearer authentication.
#[derive(Debug, Clone)]
pub struct RestChatApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl RestChatApi {
    /// Creates a client rooted at the backend's base URL.
    #[must_use]
    pub fn new(base: Url, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base, token)
    }

    /// Creates a client reusing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: Client, base: Url, token: Option<String>) -> Self {
        Self {
            client,
            base,
            token,
        }
    }

    /// Builds `<base>/chat/<segments...>`; segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> ChatResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ChatError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("chat")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, endpoint: &str) -> ChatResult<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| ChatError::http(endpoint, err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(endpoint, %status, "request rejected");
        Err(ChatError::Rejected {
            endpoint: endpoint.to_string(),
            status,
            body: ErrorResponse::from_body(&body),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> ChatResult<T> {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();
        self.send(self.client.get(url), &endpoint)
            .await?
            .json()
            .await
            .map_err(|err| ChatError::http(endpoint, err))
    }
}

#[async_trait]
impl ChatApi for RestChatApi {
    async fn conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        self.get_json(&["conversations"]).await
    }

    async fn private_messages(&self, peer: &UserId) -> ChatResult<Vec<Message>> {
        self.get_json(&["private", peer.as_str()]).await
    }

    async fn send_private_message(&self, peer: &UserId, content: &str) -> ChatResult<Message> {
        let url = self.endpoint(&["private", peer.as_str()])?;
        let endpoint = url.path().to_string();
        let request = self.client.post(url).json(&SendMessageRequest { content });
        self.send(request, &endpoint)
            .await?
            .json()
            .await
            .map_err(|err| ChatError::http(endpoint, err))
    }

    async fn delete_conversation(&self, peer: &UserId) -> ChatResult<()> {
        let url = self.endpoint(&["conversation", peer.as_str()])?;
        let endpoint = url.path().to_string();
        self.send(self.client.delete(url), &endpoint).await?;
        Ok(())
    }

    async fn search_users(&self, query: &str) -> ChatResult<Vec<User>> {
        self.get_json(&["search", query]).await
    }

    async fn college_messages(&self, college: &str) -> ChatResult<Vec<Message>> {
        self.get_json(&["college", college]).await
    }
}
