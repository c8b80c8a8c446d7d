//! Line protocol definitions
//!
//! Every server → client message is a single line of UTF-8 text. The line
//! codec appends the terminating newline, so the `Display` output here never
//! contains one.

use std::fmt;

use crate::error::{AppError, InviteError};
use crate::username::MAX_USERNAME_LENGTH;

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Ask for the invite code
    InvitePrompt,
    /// Ask for a display name
    UsernamePrompt,
    /// Registration succeeded
    Welcome { username: String },
    /// Another client joined
    Joined { username: String },
    /// Another client left
    Left { username: String },
    /// Relayed chat text
    Chat { from: String, content: String },
    /// Handshake failure, sent right before the connection closes
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invite token was not valid base64
    MalformedInvite,
    /// Invite code not in the accepted set
    InvalidInvite,
    /// Single-use invite code was already consumed
    InviteUsed,
    /// Username failed validation
    InvalidUsername,
    /// Anything else
    Internal,
}

impl ServerMessage {
    /// Render into the line handed to the codec
    pub fn into_line(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::InvitePrompt => write!(f, "Enter invite code (Base64):"),
            ServerMessage::UsernamePrompt => write!(f, "Enter your username:"),
            ServerMessage::Welcome { username } => {
                write!(f, "Welcome, {}! You're now in the chat.", username)
            }
            ServerMessage::Joined { username } => write!(f, "👋 {} has joined the chat!", username),
            ServerMessage::Left { username } => write!(f, "❌ {} has left the chat.", username),
            ServerMessage::Chat { from, content } => write!(f, "[{}]: {}", from, content),
            ServerMessage::Error { message, .. } => write!(f, "{}", message),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::Invite(InviteError::Malformed) => (
                ErrorCode::MalformedInvite,
                "Invalid Base64 code format.".to_string(),
            ),
            AppError::Invite(InviteError::NotAccepted) => (
                ErrorCode::InvalidInvite,
                "Invalid invite code. Connection refused.".to_string(),
            ),
            AppError::Invite(InviteError::AlreadyUsed) => (
                ErrorCode::InviteUsed,
                "Invite code has already been used. Connection refused.".to_string(),
            ),
            AppError::Username(reason) => (
                ErrorCode::InvalidUsername,
                format!(
                    "Invalid username: {}. Must be 1-{} chars: letters, digits, space, - or _.",
                    reason, MAX_USERNAME_LENGTH
                ),
            ),
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };
        ServerMessage::Error { code, message }
    }
}
