//! Error types
//!
//! Authorization failures are ordinary outcomes rendered as HTTP 401s;
//! only configuration resolution can fail in the `Result` sense.

use thiserror::Error;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No header, cookie or query credential was presented.
    #[error("Unauthorized")]
    MissingCredential,

    /// A credential was presented but matches no stored secret.
    #[error("Invalid token")]
    InvalidCredential,
}

/// Settings that cannot be turned into a working gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid cookie name '{0}': must be a non-empty RFC 6265 token")]
    InvalidCookieName(String),

    #[error("invalid token parameter '{0}': must not contain '&', '=' or '#'")]
    InvalidTokenParam(String),

    #[error("invalid realm '{0}': must not contain quotes, backslashes or control characters")]
    InvalidRealm(String),
}
