//! WebSocket implementation of [`Transport`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use shared::models::{ClientEvent, EventKind, ServerEvent, UserId};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message as Frame,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ChatError, ChatResult},
    transport::{Listener, ListenerRegistry, Subscription, Transport},
};

#[derive(Debug)]
enum Outgoing {
    Frame(String),
    Close,
}

/// Push channel over a WebSocket carrying `{"event", "data"}` JSON frames.
///
/// Frames are written by a single writer task so they leave in emit order.
/// A reader task decodes inbound frames and dispatches them to listeners.
#[derive(Debug)]
pub struct SocketTransport {
    identity: UserId,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    registry: Arc<ListenerRegistry>,
    reader: JoinHandle<()>,
}

impl SocketTransport {
    /// Opens the channel for `identity` and announces it online.
    ///
    /// # Errors
    /// Returns an error if the handshake fails or the token is not a valid
    /// header value.
    pub async fn connect(url: &Url, identity: UserId, token: Option<&str>) -> ChatResult<Self> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| ChatError::Socket(Box::new(err)))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| ChatError::Connect(format!("invalid token: {err}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|err| ChatError::Connect(err.to_string()))?;
        info!(url = %url, user = %identity, "push channel connected");

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut queue) = mpsc::unbounded_channel::<Outgoing>();
        let connected = Arc::new(AtomicBool::new(true));
        let registry = Arc::new(ListenerRegistry::default());

        let writer_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(item) = queue.recv().await {
                match item {
                    Outgoing::Frame(text) => {
                        if let Err(err) = sink.send(Frame::Text(text)).await {
                            warn!(error = %err, "push channel write failed");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        if let Err(err) = sink.close().await {
                            debug!(error = %err, "push channel close failed");
                        }
                        break;
                    }
                }
            }
            writer_connected.store(false, Ordering::SeqCst);
        });

        let reader_connected = Arc::clone(&connected);
        let reader_registry = Arc::clone(&registry);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Frame::Text(text)) => match ServerEvent::decode(&text) {
                        Ok(event) => {
                            reader_registry.dispatch(&event);
                        }
                        Err(err) => debug!(error = %err, "ignoring malformed inbound frame"),
                    },
                    Ok(Frame::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "push channel read failed");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            info!("push channel closed");
        });

        let transport = Self {
            identity,
            connected,
            closed: AtomicBool::new(false),
            outgoing,
            registry,
            reader,
        };
        transport.emit(ClientEvent::UserOnline(transport.identity.clone()))?;
        Ok(transport)
    }
}

impl Transport for SocketTransport {
    fn identity(&self) -> &UserId {
        &self.identity
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        if !self.is_connected() {
            return Err(ChatError::NotConnected);
        }
        let frame = event.encode()?;
        debug!(event = event.name(), "emitting");
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| ChatError::NotConnected)
    }

    fn on(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.registry.subscribe(kind, listener)
    }

    fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // userOffline must be queued ahead of the close frame.
        if self.connected.load(Ordering::SeqCst) {
            match ClientEvent::UserOffline(self.identity.clone()).encode() {
                Ok(frame) => {
                    let _ = self.outgoing.send(Outgoing::Frame(frame));
                }
                Err(err) => warn!(error = %err, "failed to encode departure"),
            }
        }
        let _ = self.outgoing.send(Outgoing::Close);
        info!(user = %self.identity, "push channel disconnecting");
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.disconnect();
        self.reader.abort();
    }
}
