use super::message::MessageType;

/// Failures decoding an incoming envelope. Reported to the sender as a failed
/// response, never raised across the channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Carries the offending envelope as JSON text
    #[error("Unknown message type: {0}")]
    MissingType(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: MessageType, reason: String },
}
