//! Per-request authorization decision
//!
//! Bearer variant:
//! - `Authorization` matches a stored `"Bearer " + token` → forward
//! - otherwise → 401 with a `WWW-Authenticate: Bearer realm="..."` challenge
//!
//! Session variant, evaluated in order:
//! - session cookie present and valid → forward
//! - query token present and valid → upgrade (cookie + 307 to scrubbed URL)
//! - no query token, or an empty one → 401 `Unauthorized`
//! - query token present but invalid → 401 `Invalid token`

use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::config::{BearerConfig, GateConfig, GateSettings, SessionConfig};
use crate::error::{AuthError, ConfigError};
use crate::extract;
use crate::upgrade::SessionUpgrade;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Hand the request, unmodified, to the next stage.
    Forward,
    /// Answer with a 401 and stop.
    Reject(Rejection),
    /// Set the session cookie and redirect to the scrubbed URL.
    Upgrade(SessionUpgrade),
}

/// A refused request and how to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub error: AuthError,
    /// `WWW-Authenticate` value, bearer variant only.
    pub challenge: Option<String>,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self.challenge {
            // Bearer rejections never tell the caller which way they failed.
            Some(challenge) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, challenge)],
                AuthError::MissingCredential.to_string(),
            )
                .into_response(),
            None => (StatusCode::UNAUTHORIZED, self.error.to_string()).into_response(),
        }
    }
}

impl IntoResponse for Decision {
    /// `Forward` has no response of its own; rendering it yields an empty 200
    /// and is only meaningful when there is no next stage.
    fn into_response(self) -> Response {
        match self {
            Self::Forward => StatusCode::OK.into_response(),
            Self::Reject(rejection) => rejection.into_response(),
            Self::Upgrade(upgrade) => upgrade.into_response(),
        }
    }
}

/// Authorization gate owning its resolved configuration.
///
/// Immutable after construction; share it behind an `Arc` (see
/// [`GateLayer`](crate::layer::GateLayer)) across concurrent requests.
#[derive(Debug, Clone)]
pub struct Gate {
    config: GateConfig,
}

impl Gate {
    pub fn new(config: GateConfig) -> Self {
        if config.store().is_empty() {
            warn!("No tokens configured: the gate will reject every request");
        }
        info!(
            "Gate ready: mode={:?}, {} accepted token(s)",
            config.mode(),
            config.store().len()
        );
        Self { config }
    }

    pub fn from_settings(settings: GateSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.resolve()?))
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Constant-time check of a credential in its carrier form (the full
    /// `Authorization` value for bearer gates, the raw token for session gates).
    pub fn validate(&self, candidate: &str) -> bool {
        self.config.store().contains(candidate)
    }

    /// Decide what to do with a request, given its headers and target.
    pub fn decide(&self, headers: &HeaderMap, uri: &Uri) -> Decision {
        match &self.config {
            GateConfig::Bearer(config) => decide_bearer(config, headers),
            GateConfig::Session(config) => decide_session(config, headers, uri),
        }
    }
}

fn decide_bearer(config: &BearerConfig, headers: &HeaderMap) -> Decision {
    // An empty header still goes through the full comparison loop.
    let candidate = extract::authorization(headers);
    if config.store.contains(candidate) {
        return Decision::Forward;
    }
    let error = if candidate.is_empty() {
        AuthError::MissingCredential
    } else {
        AuthError::InvalidCredential
    };
    Decision::Reject(Rejection {
        error,
        challenge: Some(format!("Bearer realm=\"{}\"", config.realm)),
    })
}

fn decide_session(config: &SessionConfig, headers: &HeaderMap, uri: &Uri) -> Decision {
    let cookie_valid = extract::cookie(headers, &config.cookie_name)
        .is_some_and(|value| !value.is_empty() && config.store.contains(&value));
    if cookie_valid {
        return Decision::Forward;
    }

    let token = match extract::query_param(uri, &config.token_param) {
        Some(token) if !token.is_empty() => token,
        _ => {
            return Decision::Reject(Rejection {
                error: AuthError::MissingCredential,
                challenge: None,
            });
        }
    };

    if !config.store.contains(&token) {
        return Decision::Reject(Rejection {
            error: AuthError::InvalidCredential,
            challenge: None,
        });
    }

    Decision::Upgrade(SessionUpgrade::new(
        uri,
        &config.token_param,
        &config.cookie_name,
        &token,
        config.cookie_max_age_secs,
    ))
}
