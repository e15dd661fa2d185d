//! Error types for the weeb.sh client core.
//!
//! # Design
//! Two families share one enum. The classified variants (`ScopeDenied`,
//! `TransferDenied`, `Failure`, `TransportFailure`) describe what the server
//! or the transport reported. The local variants (`InvalidArgument`,
//! `DocumentTooLarge`, `Serialization`) are raised before any cache write or
//! network call. A 404 is not an error at all: it surfaces as `Ok(None)`.

use crate::types::{DenialReason, User};

/// Errors returned by `WeebClient` operations.
#[derive(Debug, thiserror::Error)]
pub enum WeebError {
    /// The server returned 403: the token lacks a scope the endpoint needs.
    #[error("missing scope: {}", .message.as_deref().unwrap_or("no message"))]
    ScopeDenied { message: Option<String> },

    /// A reputation transfer was refused for a known reason.
    #[error("reputation transfer denied ({reason:?}): {}", .message.as_deref().unwrap_or("no message"))]
    TransferDenied {
        reason: DenialReason,
        message: Option<String>,
        user: Box<User>,
    },

    /// Any other non-success status.
    #[error("unexpected status code {status}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Failure { status: u16, message: Option<String> },

    /// No interpretable response: connection failure, timeout, broken
    /// compression envelope or an undecodable success body.
    #[error("transport failure: {reason}")]
    TransportFailure { reason: String },

    /// A request argument failed local validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A setting document is larger than the server accepts.
    #[error("document is {size} bytes, limit is {limit}")]
    DocumentTooLarge { size: usize, limit: usize },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl WeebError {
    pub(crate) fn transport(reason: impl ToString) -> Self {
        WeebError::TransportFailure {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        WeebError::InvalidArgument(message.into())
    }

    /// The HTTP status carried by a classified server error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            WeebError::ScopeDenied { .. } | WeebError::TransferDenied { .. } => Some(403),
            WeebError::Failure { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error was raised locally before anything left the process.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            WeebError::InvalidArgument(_)
                | WeebError::DocumentTooLarge { .. }
                | WeebError::Serialization(_)
        )
    }
}
