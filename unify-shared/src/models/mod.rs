//! Wire models exchanged with the Unify chat server over REST and the push channel.

pub mod conversation;
pub mod errors;
pub mod events;
pub mod message;
pub mod presence;
pub mod timestamp;
pub mod user;

pub use conversation::ConversationSummary;
pub use errors::ErrorResponse;
pub use events::{
    ClientEvent, CollegeMessagePayload, ConversationDeletedPayload, DeleteConversationPayload,
    EventKind, PrivateMessagePayload, ServerEvent,
};
pub use message::{Message, MessageId, MessageScope, SenderRef};
pub use presence::PresenceMap;
pub use timestamp::Timestamp;
pub use user::{User, UserId};
