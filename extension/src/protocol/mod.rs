// Cross-context request/response protocol
// Envelopes, dispatch table and send helpers shared by every context

#[cfg(target_arch = "wasm32")]
pub mod chrome;
pub mod error;
pub mod message;
pub mod messenger;
pub mod router;
pub mod tabs;

pub use error::ProtocolError;
pub use message::{
    ActionAck, ActionRequest, ActionStatus, FeatureAccess, FeatureQuery, Message, MessageType,
    PageInfo, Response,
};
pub use messenger::{Messenger, Transport};
pub use router::{Handler, HandlerResult, Reply, Router};
pub use tabs::{MessageSender, TabId, TabInfo, TabQuery};
