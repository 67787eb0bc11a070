use crate::domain::models::Channel;
use thiserror::Error;

/// Failures reported by platform collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The receiver was never registered or has already been removed
    #[error("receiver not registered")]
    NotRegistered,
    #[error("platform rejected the request: {0}")]
    Rejected(String),
    #[error("platform operation failed with code {code}")]
    Failed { code: i32 },
}

/// Errors raised inside the event bridge.
///
/// None of these escape the coordinator: sequence errors become no-ops and
/// malformed events are dropped, each with a log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("{0} events already subscribed")]
    AlreadySubscribed(Channel),
    #[error("{0} events not subscribed")]
    NotSubscribed(Channel),
    #[error("malformed `{action}` broadcast: {reason}")]
    MalformedEvent { action: String, reason: String },
    #[error(transparent)]
    Platform(#[from] PlatformError),
}
