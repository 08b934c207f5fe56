//! Realtime chat core for the Unify campus portal.
//!
//! - [`transport`] / [`socket`]: the push-channel handle.
//! - [`presence`]: who is online.
//! - [`conversations`]: the ordered conversation sidebar.
//! - [`reconciler`]: the open conversation's log and optimistic-send merging.
//! - [`room`]: college broadcast rooms.
//! - [`client`]: the session owner that wires them to the REST [`api`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod client;
pub mod conversations;
pub mod error;
pub mod presence;
pub mod reconciler;
pub mod room;
pub mod socket;
pub mod transport;

pub use api::{ChatApi, RestChatApi};
pub use client::{ChatClient, ChatUpdate, Inbound};
pub use error::{ChatError, ChatResult};
pub use reconciler::{CorrelationToken, DeliveryState, LogEntry, ReceiveOutcome};
pub use transport::{LoopbackTransport, Transport};
