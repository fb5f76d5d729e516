//! Wire-facing error taxonomy.
//!
//! Every failure that can reach a client is represented by one of these
//! variants. Internal errors (`anyhow::Error`, `std::io::Error`, ...) are
//! converted at the boundary — callers should never construct a
//! `CodecellError` from a raw string when a more specific variant exists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-facing failure kind, one per client-visible error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    SandboxRejection,
    TimedOut,
    PayloadTooLarge,
    TokenLimitExceeded,
    Overloaded,
    UnknownIntent,
    BackendUnavailable,
    InternalError,
}

impl ErrorCode {
    /// HTTP-shaped numeric status an embedder may want to surface.
    pub fn wire_status(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::SandboxRejection => 403,
            Self::TimedOut => 408,
            Self::PayloadTooLarge => 413,
            Self::TokenLimitExceeded | Self::Overloaded => 429,
            Self::UnknownIntent => 501,
            Self::BackendUnavailable => 503,
            Self::InternalError => 500,
        }
    }

    /// Whether this error kind is an infrastructure failure eligible for
    /// hybrid-mode fallback to the protocol collaborator.
    pub fn is_fallback_eligible(self) -> bool {
        matches!(
            self,
            Self::SandboxRejection | Self::UnknownIntent | Self::InternalError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::SandboxRejection => "sandbox_rejection",
            Self::TimedOut => "timed_out",
            Self::PayloadTooLarge => "payload_too_large",
            Self::TokenLimitExceeded => "token_limit_exceeded",
            Self::Overloaded => "overloaded",
            Self::UnknownIntent => "unknown_intent",
            Self::BackendUnavailable => "backend_unavailable",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

/// A wire-facing error: code plus a human-readable message.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CodecellError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodecellError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn unknown_intent(name: &str) -> Self {
        Self::new(ErrorCode::UnknownIntent, format!("unknown intent: {name}"))
    }

    pub fn token_limit_exceeded(estimated: u64, max: u64) -> Self {
        Self::new(
            ErrorCode::TokenLimitExceeded,
            format!("estimated {estimated} tokens exceeds max {max}"),
        )
    }

    pub fn overloaded() -> Self {
        Self::new(ErrorCode::Overloaded, "concurrency cap reached")
    }

    pub fn payload_too_large(size: u64, max: u64) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!("value of {size} bytes exceeds max {max}"),
        )
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}
