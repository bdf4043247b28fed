// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy shared by the trust and persistence layers.
//!
//! Each layer owns a focused error enum; [`RelayError`] unifies them for
//! callers (the sync poller, `main`) that only need to log and move on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Missing or malformed process configuration. Fatal, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("required configuration `{0}` is missing")]
    Missing(String),

    #[error("configuration `{name}` is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// Key or signature problems on the signing side, or a rejected inbound
/// signature when the trust policy enforces verification.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid input for canonical message: {0}")]
    InvalidInput(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature from `{signer}` did not verify")]
    VerificationFailed { signer: String },
}

/// No usable HTTP response from the Coordinator.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },
}

/// A reply arrived but violates the envelope protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("reply is missing the `{0}` header")]
    MissingHeader(&'static str),

    #[error("reply signed by `{actual}`, expected `{expected}`")]
    UnexpectedSigner { expected: String, actual: String },

    #[error("reply body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("`response` field for {peer} is not encoded as {expected}")]
    UnexpectedEncoding { peer: &'static str, expected: &'static str },

    #[error("{peer} response has the wrong shape: {reason}")]
    WrongShape { peer: &'static str, reason: String },
}

/// Database failures that survived the bounded retry.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl PersistenceError {
    pub fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }
}

/// Any failure surfaced by the trust or persistence layers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RelayError {
    /// Short machine-readable category used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Configuration(_) => "configuration",
            RelayError::Signature(_) => "signature",
            RelayError::Transport(_) => "transport",
            RelayError::Protocol(_) => "protocol",
            RelayError::Persistence(_) => "persistence",
        }
    }
}

/// JSON error body for the health API.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let status = match &err {
            RelayError::Configuration(_) | RelayError::Persistence(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RelayError::Signature(_) | RelayError::Transport(_) | RelayError::Protocol(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, err.to_string())
    }
}
