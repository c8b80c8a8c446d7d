//! Error types for the chat relay
//!
//! Defines application-level errors, handshake rejection reasons and
//! message send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::types::ClientId;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// handshake errors (explanatory line sent to the client, then close).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error, including over-long input lines (fatal)
    #[error("Line codec error: {0}")]
    Lines(#[from] LinesCodecError),

    /// Invite code rejected by the gate
    #[error("Invite rejected: {0}")]
    Invite(#[from] InviteError),

    /// Username rejected by the validator
    #[error("Username rejected: {0}")]
    Username(#[from] UsernameError),

    /// The registry actor is gone (fatal - internal channel broken)
    #[error("Client registry closed")]
    RegistryClosed,

    /// The same connection registered twice (internal consistency fault)
    #[error("Client {0} is already registered")]
    AlreadyRegistered(ClientId),
}

/// Reasons the invite gate refuses a presented token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InviteError {
    /// The token is not valid base64 or does not decode to UTF-8
    #[error("malformed invite token")]
    Malformed,

    /// The token decodes but is not one of the accepted codes
    #[error("invite code not accepted")]
    NotAccepted,

    /// The code was already consumed (single-use policy)
    #[error("invite code already used")]
    AlreadyUsed,
}

/// Reasons the username validator refuses a name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsernameError {
    /// Nothing left after trimming whitespace
    #[error("name is empty")]
    Empty,

    /// More characters than allowed
    #[error("name is too long ({len} > {max} characters)")]
    TooLong { len: usize, max: usize },

    /// A character outside the allowed classes
    #[error("character {0:?} is not allowed")]
    InvalidChar(char),
}

/// Message send errors
///
/// Occurs when a line cannot be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The peer did not accept the line within the write deadline
    #[error("Write deadline exceeded")]
    Timeout,
}
