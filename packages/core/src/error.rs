//! Error types for the shuttle protocol.

use shuttle_wire::{ClosureType, ContextId, TokenId, WireError};
use thiserror::Error;

/// Errors surfaced by the protocol layer.
///
/// Only `InvalidArgument` and `Marshal` reach a local caller of
/// `Shuttle::shuttle`. Everything that happens on the receiving side is
/// logged and dropped by the dispatcher.
#[derive(Debug, Error)]
pub enum ShuttleError {
    /// Descriptor and registered closure kind disagree on shape or types.
    #[error("cannot marshal closure {type_id}: {message}")]
    Marshal {
        type_id: ClosureType,
        message: String,
    },

    /// Reconstruction produced something that is not invocable.
    #[error("invalid closure: {type_id}")]
    InvalidClosure { type_id: ClosureType },

    /// The context has nothing the host can launch.
    #[error("no launchable entry point in context {0}")]
    NoEntryPoint(ContextId),

    /// No reverse token has been cached for the context yet.
    #[error("no channel to context {0} yet")]
    ChannelAbsent(ContextId),

    /// A programming error on the caller's side.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A hub-only operation was called elsewhere.
    #[error("context {0} is not the hub")]
    NotHub(ContextId),

    /// The host refused an operation.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

impl ShuttleError {
    pub(crate) fn marshal(type_id: &ClosureType, message: impl Into<String>) -> Self {
        ShuttleError::Marshal {
            type_id: type_id.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ShuttleError::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Errors reported by a host implementation.
#[derive(Debug, Error)]
pub enum HostError {
    /// The token was revoked, replaced, or never existed.
    #[error("token is no longer valid: {0}")]
    TokenInvalid(TokenId),

    /// The host declined to create a token.
    #[error("host could not issue a token")]
    TokenUnavailable,

    /// The host does not know the context.
    #[error("unknown context: {0}")]
    UnknownContext(ContextId),

    /// The context exists but has no launchable entry point.
    #[error("no entry point in context {0}")]
    NoEntryPoint(ContextId),

    /// Durable storage failed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// The receiving context's delivery queue is full.
    #[error("delivery queue of context {0} is full")]
    QueueFull(ContextId),

    /// A message could not be carried across the boundary.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ShuttleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_display_names_the_type() {
        let e = ShuttleError::marshal(&ClosureType::from_static("demo.greet"), "arity");
        let display = e.to_string();
        assert!(display.contains("demo.greet"));
        assert!(display.contains("arity"));
    }

    #[test]
    fn host_errors_convert() {
        let e: ShuttleError = HostError::UnknownContext(ContextId(4)).into();
        assert!(matches!(e, ShuttleError::Host(HostError::UnknownContext(_))));
        assert!(e.to_string().contains("unknown context: 4"));
    }
}
