//! Classified failures of the token lifecycle and of authenticated calls.
//!
//! `AuthError` covers everything that happens against the authorization
//! server. `ApiError` is what callers of the executor see, and tells apart
//! "log in again" from "the upstream rejected this request".

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no refresh token is held")]
    NoRefreshToken,

    #[error("not authenticated, the OAuth login flow must be completed")]
    Unauthenticated,

    #[error("token refresh rejected with status {status}: {body}")]
    RefreshFailed { status: u16, body: String },

    #[error("authorization code exchange rejected with status {status}: {body}")]
    ExchangeFailed { status: u16, body: String },

    #[error("authorization server unreachable: {0}")]
    Transport(String),

    #[error("authorization server returned an unreadable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not authenticated, the OAuth login flow must be completed")]
    Unauthenticated,

    #[error("access token rejected after refresh, re-authentication required")]
    AuthExpired,

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Upstream error subtype: the request exceeded its timeout.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// Upstream error subtype: connection failed before a status was received.
    #[error("upstream unreachable: {0}")]
    UpstreamTransport(String),

    #[error("upstream returned an unreadable body: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// True when the client should be sent back through the login flow.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, ApiError::Unauthenticated | ApiError::AuthExpired)
    }
}
